//! Purpose: Describe the calls a probe makes against a loaded module.
//! Exports: `Operation`, `Arg`, `CallValue`.
//! Role: Shared vocabulary between profiles, the CLI `--call` flag, and module backends.
//! Invariants: Arguments are literals only (integers or strings).
//! Invariants: `Operation` displays in the same syntax `Operation::parse` accepts.
use std::fmt;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Arg {
    Int(i64),
    Str(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CallValue {
    Int(i64),
    Str(String),
    Unit,
}

impl fmt::Display for CallValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallValue::Int(value) => write!(f, "{value}"),
            CallValue::Str(value) => f.write_str(value),
            CallValue::Unit => f.write_str("None"),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(value) => write!(f, "{value}"),
            Arg::Str(value) => {
                f.write_str("\"")?;
                for ch in value.chars() {
                    match ch {
                        '\\' => f.write_str("\\\\")?,
                        '"' => f.write_str("\\\"")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// A single call: a free function (`add`) or a method on a fresh instance
/// of an exported class (`Logger.log`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    class: Option<String>,
    name: String,
    args: Vec<Arg>,
}

impl Operation {
    pub fn function(name: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            class: None,
            name: name.into(),
            args,
        }
    }

    pub fn method(class: impl Into<String>, name: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            class: Some(class.into()),
            name: name.into(),
            args,
        }
    }

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn parse(expr: &str) -> Result<Self, Error> {
        Parser::new(expr).operation()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(class) = &self.class {
            write!(f, "{class}.")?;
        }
        write!(f, "{}(", self.name)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

struct Parser<'a> {
    expr: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self {
            expr,
            chars: expr.char_indices().peekable(),
        }
    }

    fn operation(mut self) -> Result<Operation, Error> {
        self.skip_ws();
        let first = self.ident()?;
        let (class, name) = if self.eat('.') {
            (Some(first), self.ident()?)
        } else {
            (None, first)
        };
        self.skip_ws();
        self.expect('(')?;
        let mut args = Vec::new();
        self.skip_ws();
        if !self.eat(')') {
            loop {
                self.skip_ws();
                args.push(self.arg()?);
                self.skip_ws();
                if self.eat(')') {
                    break;
                }
                self.expect(',')?;
            }
        }
        self.skip_ws();
        if let Some(&(pos, _)) = self.chars.peek() {
            return Err(self.error(format!("unexpected trailing input at offset {pos}")));
        }
        Ok(Operation { class, name, args })
    }

    fn ident(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            let ok = if out.is_empty() {
                ch.is_ascii_alphabetic() || ch == '_'
            } else {
                ch.is_ascii_alphanumeric() || ch == '_'
            };
            if !ok {
                break;
            }
            out.push(ch);
            self.chars.next();
        }
        if out.is_empty() {
            return Err(self.error("expected a function or class name"));
        }
        Ok(out)
    }

    fn arg(&mut self) -> Result<Arg, Error> {
        match self.chars.peek() {
            Some(&(_, quote @ ('"' | '\''))) => {
                self.chars.next();
                self.string(quote).map(Arg::Str)
            }
            Some(&(_, ch)) if ch == '-' || ch == '+' || ch.is_ascii_digit() => self.int(),
            _ => Err(self.error("expected an integer or quoted string argument")),
        }
    }

    fn int(&mut self) -> Result<Arg, Error> {
        let mut digits = String::new();
        if let Some(&(_, sign @ ('-' | '+'))) = self.chars.peek() {
            digits.push(sign);
            self.chars.next();
        }
        while let Some(&(_, ch)) = self.chars.peek() {
            if !ch.is_ascii_digit() {
                break;
            }
            digits.push(ch);
            self.chars.next();
        }
        digits
            .parse::<i64>()
            .map(Arg::Int)
            .map_err(|_| self.error(format!("invalid integer literal `{digits}`")))
    }

    fn string(&mut self, quote: char) -> Result<String, Error> {
        let mut out = String::new();
        while let Some((_, ch)) = self.chars.next() {
            if ch == quote {
                return Ok(out);
            }
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match self.chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, esc @ ('\\' | '"' | '\''))) => out.push(esc),
                Some((_, other)) => {
                    return Err(self.error(format!("unsupported escape `\\{other}`")));
                }
                None => break,
            }
        }
        Err(self.error("unterminated string literal"))
    }

    fn skip_ws(&mut self) {
        while self.chars.next_if(|(_, ch)| ch.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, want: char) -> bool {
        self.chars.next_if(|&(_, ch)| ch == want).is_some()
    }

    fn expect(&mut self, want: char) -> Result<(), Error> {
        if self.eat(want) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{want}`")))
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid call `{}`: {}", self.expr, message.into()))
            .with_hint("Calls look like add(5, 7), get_greeting(\"World\") or Logger.log(\"hi\").")
    }
}

#[cfg(test)]
mod tests {
    use super::{Arg, CallValue, Operation};
    use crate::core::error::ErrorKind;

    #[test]
    fn parses_free_function_with_ints() {
        let op = Operation::parse("add(5, 7)").expect("parse");
        assert_eq!(op, Operation::function("add", vec![Arg::Int(5), Arg::Int(7)]));
        assert_eq!(op.class(), None);
    }

    #[test]
    fn parses_method_with_string() {
        let op = Operation::parse("  Logger.log( 'Hello from bindprobe!' ) ").expect("parse");
        assert_eq!(op.class(), Some("Logger"));
        assert_eq!(op.name(), "log");
        assert_eq!(op.args(), &[Arg::Str("Hello from bindprobe!".to_string())]);
    }

    #[test]
    fn parses_escapes_and_negative_ints() {
        let op = Operation::parse(r#"f("a\"b\n", -3, +4)"#).expect("parse");
        assert_eq!(
            op.args(),
            &[
                Arg::Str("a\"b\n".to_string()),
                Arg::Int(-3),
                Arg::Int(4)
            ]
        );
    }

    #[test]
    fn parses_empty_argument_list() {
        let op = Operation::parse("ping()").expect("parse");
        assert!(op.args().is_empty());
    }

    #[test]
    fn display_matches_parse_syntax() {
        for expr in ["add(5, 7)", "get_greeting(\"World\")", "Logger.log(\"hi\")"] {
            let op = Operation::parse(expr).expect("parse");
            assert_eq!(op.to_string(), expr);
        }
    }

    #[test]
    fn unusual_strings_survive_display_and_parse() {
        let text = "tab\there\nquote\" back\\slash cr\r bell\u{7} é 'single'";
        let op = Operation::method("Logger", "log", vec![Arg::Str(text.to_string())]);
        let rendered = op.to_string();
        assert!(rendered.contains("tab\\there\\nquote\\\" back\\\\slash"));
        assert!(!rendered.contains("\\u{"));
        assert_eq!(Operation::parse(&rendered).expect("parse"), op);
    }

    #[test]
    fn malformed_calls_are_usage_errors() {
        for expr in [
            "",
            "add",
            "add(5,",
            "add(5 7)",
            "get_greeting(\"World)",
            "add(5) extra",
            "7add(1)",
            "f(x)",
            "f(\"\\q\")",
        ] {
            let err = Operation::parse(expr).expect_err(expr);
            assert_eq!(err.kind(), ErrorKind::Usage, "{expr}");
        }
    }

    #[test]
    fn call_values_render_like_print() {
        assert_eq!(CallValue::Int(12).to_string(), "12");
        assert_eq!(CallValue::Str("Hello, World!".into()).to_string(), "Hello, World!");
        assert_eq!(CallValue::Unit.to_string(), "None");
    }
}
