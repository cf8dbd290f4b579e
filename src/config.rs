/// The last pipeline stage a run goes through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Lex,
    Parse,
    #[default]
    Evaluate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Interpret,
    /// Not supported yet. Holds the requested target, e.g. `asm`.
    Compile(String),
}

/// How a single run of the pipeline behaves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub dump_tokens: bool,
    pub dump_ast: bool,
    pub last_stage: Stage,
    pub mode: RunMode,
}

impl Config {
    pub fn tokenize() -> Self {
        Config {
            dump_tokens: true,
            last_stage: Stage::Lex,
            ..Config::default()
        }
    }

    pub fn parse() -> Self {
        Config {
            dump_ast: true,
            last_stage: Stage::Parse,
            ..Config::default()
        }
    }

    pub fn runs(&self, stage: Stage) -> bool {
        stage <= self.last_stage
    }
}
