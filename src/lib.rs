use std::io::Write;

use miette::{Error, IntoDiagnostic};
use tracing::{debug, warn};

pub mod config;
pub mod eval;
pub mod lex;
pub mod parse;
pub mod system;

pub use config::{Config, RunMode, Stage};
pub use eval::{Interpreter, ReferenceError, Value, interpret};
pub use lex::{Lexer, StringTerminationError, Token, TokenKind, TokenStream, lex};
pub use parse::{Ast, NodeKind, Parser, SyntaxError, parse};

/// Lexes, parses and runs `source` as configured, writing all output to `out`.
pub fn run<W: Write>(
    config: &Config,
    filename: &str,
    source: &str,
    out: &mut W,
) -> Result<(), Error> {
    let tokens = lex(source, filename)?;
    debug!(tokens = tokens.len(), "lexed");
    if config.dump_tokens {
        for token in &tokens {
            writeln!(out, "{token}").into_diagnostic()?;
        }
    }
    if !config.runs(Stage::Parse) {
        return Ok(());
    }

    let ast = parse(tokens)?;
    debug!(nodes = ast.len(), "parsed");
    if config.dump_ast {
        write!(out, "{ast}").into_diagnostic()?;
    }
    if !config.runs(Stage::Evaluate) {
        return Ok(());
    }

    match &config.mode {
        RunMode::Interpret => Interpreter::new(&ast, out).run(),
        RunMode::Compile(target) => {
            warn!(
                to = target.as_str(),
                "UnsupportedFeature: compilation is not yet supported"
            );
            writeln!(out, "Compilation is not yet supported").into_diagnostic()
        }
    }
}

/// The `file:line:column` a fatal pipeline error points at.
pub fn fatal_location(error: &Error) -> Option<&str> {
    if let Some(e) = error.downcast_ref::<StringTerminationError>() {
        Some(e.location.as_str())
    } else if let Some(e) = error.downcast_ref::<SyntaxError>() {
        Some(e.location.as_str())
    } else if let Some(e) = error.downcast_ref::<ReferenceError>() {
        Some(e.location.as_str())
    } else {
        None
    }
}
