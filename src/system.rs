use std::io::Write;

use miette::{Error, miette};
use tracing::warn;

use crate::eval::Value;

/// A function implemented by the interpreter itself.
pub type Builtin = for<'de> fn(&mut dyn Write, &[Value<'de>]) -> Result<Value<'de>, Error>;

pub fn lookup(name: &str) -> Option<Builtin> {
    match name {
        "print" => Some(print),
        _ => None,
    }
}

pub fn print<'de>(out: &mut dyn Write, input: &[Value<'de>]) -> Result<Value<'de>, Error> {
    let Some(value) = input.first() else {
        writeln!(out, "null").map_err(|e| miette!("{e}"))?;
        return Ok(Value::Null);
    };
    if let Value::Float(_) = value.leaf() {
        warn!("UnsupportedFeature: floating-point values cannot be printed yet");
    }
    writeln!(out, "{value}").map_err(|e| miette!("{e}"))?;
    Ok(Value::Null)
}
