use std::fs;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use miette::IntoDiagnostic;
use miette::WrapErr;
use nitrogen::{Config, ReferenceError, RunMode, Stage};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nitrogen", version, about = "Runs nitrogen source files")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the tokens of a source file
    Tokenize { filename: PathBuf },
    /// Print the syntax tree of a source file
    Parse { filename: PathBuf },
    /// Run a source file
    Run {
        filename: PathBuf,
        /// Print the tokens before running
        #[arg(short, long, visible_alias = "log")]
        debug: bool,
        /// Stop after lexing
        #[arg(long)]
        no_parse: bool,
        /// Compile instead of interpreting (not supported yet)
        #[arg(short, long, value_name = "TARGET", num_args = 0..=1, default_missing_value = "asm")]
        compile: Option<String>,
    },
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let (filename, config) = match args.command {
        Commands::Tokenize { filename } => (filename, Config::tokenize()),
        Commands::Parse { filename } => (filename, Config::parse()),
        Commands::Run {
            filename,
            debug,
            no_parse,
            compile,
        } => {
            let config = Config {
                dump_tokens: debug,
                last_stage: if no_parse { Stage::Lex } else { Stage::Evaluate },
                mode: compile.map_or(RunMode::Interpret, RunMode::Compile),
                ..Config::default()
            };
            (filename, config)
        }
    };

    let file_contents = fs::read_to_string(&filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;
    let name = filename.display().to_string();

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = nitrogen::run(&config, &name, &file_contents, &mut stdout) {
        stdout.flush().into_diagnostic()?;
        if let Some(location) = nitrogen::fatal_location(&e) {
            eprintln!("{location}: {e}");
            eprintln!("{e:?}");

            let code = if e.downcast_ref::<ReferenceError>().is_some() {
                70
            } else {
                65
            };
            std::process::exit(code);
        }
        return Err(e);
    }
    Ok(())
}
