use std::{
    borrow::Cow,
    fmt::Display,
    io::{self, Write},
};

use miette::{Diagnostic, Error, IntoDiagnostic, NamedSource, SourceSpan};
use thiserror::Error;
use tracing::debug;

use crate::{
    lex::TokenKind,
    parse::{Ast, Node, NodeId, NodeKind},
    system,
};

#[derive(Error, Debug, Diagnostic)]
#[error("ReferenceError: {message}")]
#[diagnostic(help("`print` is the only builtin function"))]
pub struct ReferenceError {
    #[source_code]
    src: NamedSource<String>,

    #[label("called here")]
    bad_bit: SourceSpan,

    pub location: String,
    pub message: String,
}

impl ReferenceError {
    fn build(ast: &Ast<'_>, node: &Node<'_>, message: String) -> Self {
        let (bad_bit, location) = match &node.token {
            Some(token) => (token.span, token.location.to_string()),
            None => (SourceSpan::from(0..0), ast.filename().to_string()),
        };
        ReferenceError {
            src: NamedSource::new(ast.filename(), ast.source().to_string()),
            bad_bit,
            location,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value<'de> {
    Null,
    Int(i64),
    Float(f64),
    Char(char),
    Str(Cow<'de, str>),
    IntPtr(usize),
    FloatPtr(usize),
    /// The values of a node's children, in order.
    Composite(Vec<Value<'de>>),
}

impl<'de> Value<'de> {
    /// The value that gets rendered: composites render their first element.
    pub fn leaf(&self) -> &Value<'de> {
        match self {
            Value::Composite(values) => values.first().map_or(self, Value::leaf),
            value => value,
        }
    }
}

impl Display for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(_) => write!(f, "<unsupported: float>"),
            Value::Char(c) => write!(f, "{c}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::IntPtr(address) => write!(f, "int*: 0x{address}"),
            Value::FloatPtr(address) => write!(f, "float*: 0x{address}"),
            Value::Composite(values) => match values.first() {
                Some(first) => write!(f, "{first}"),
                None => write!(f, "null"),
            },
        }
    }
}

/// Runs a syntax tree for its side effects, writing program output to stdout.
pub fn interpret(ast: &Ast<'_>) -> Result<(), Error> {
    Interpreter::new(ast, io::stdout().lock()).run()
}

pub struct Interpreter<'a, 'de, W> {
    ast: &'a Ast<'de>,
    out: W,
}

impl<'a, 'de, W: Write> Interpreter<'a, 'de, W> {
    pub fn new(ast: &'a Ast<'de>, out: W) -> Self {
        Self { ast, out }
    }

    pub fn run(&mut self) -> Result<(), Error> {
        debug!(file = self.ast.filename(), nodes = self.ast.len(), "interpreting");
        let result = self.evaluate(self.ast.root());
        self.out.flush().into_diagnostic()?;
        result.map(|_| ())
    }

    /// Evaluates `id` after all of its children, left to right.
    pub fn evaluate(&mut self, id: NodeId<'de>) -> Result<Value<'de>, Error> {
        let ast = self.ast;
        let node = &ast[id];

        if let Some(token) = &node.token {
            match token.kind {
                TokenKind::String => {
                    return Ok(Value::Str(token.text.clone().unwrap_or_default()));
                }
                TokenKind::Int(n) => return Ok(Value::Int(n)),
                _ => {}
            }
        }

        let mut values = node
            .children()
            .iter()
            .map(|&child| self.evaluate(child))
            .collect::<Result<Vec<_>, _>>()?;
        if values.is_empty() {
            values.push(Value::Null);
        }

        if node.kind == NodeKind::Call {
            self.call(node, &values)?;
        }

        Ok(Value::Composite(values))
    }

    fn call(&mut self, node: &Node<'de>, args: &[Value<'de>]) -> Result<Value<'de>, Error> {
        let Some(name) = node.text() else {
            return Err(ReferenceError::build(
                self.ast,
                node,
                "function with an undefined name".to_string(),
            )
            .into());
        };
        let Some(builtin) = system::lookup(name) else {
            return Err(ReferenceError::build(
                self.ast,
                node,
                format!("cannot find function `{name}`"),
            )
            .into());
        };
        debug!(name, "calling builtin");
        builtin(&mut self.out, args)
    }
}
