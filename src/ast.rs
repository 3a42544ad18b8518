//! The abstract syntax tree produced by the parser.
//!
//! The tree is deliberately tiny: every composite form is an
//! [`Expression::SExpression`] with an optional head and ordered arguments.
//! Dictionary literals `{ k v }` and quoted lists `'(a b)` are desugared by
//! the parser into `(dict k v)` and `(list a b)` respectively, so neither
//! the compiler nor the evaluator ever sees them as distinct node kinds.
//!
//! `Display` renders the canonical source form: for any well-formed program,
//! parsing the displayed text yields an equal tree.

use std::fmt;

use crate::object::format_number;

/// A single expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Float(f64),
    Str(String),
    Ident(String),
    /// A parenthesized form. `func: None` is the empty form `()`, which
    /// denotes the empty list.
    SExpression {
        func: Option<Box<Expression>>,
        args: Vec<Expression>,
    },
}

impl Expression {
    /// Interpret this node as a lambda parameter list, returning the
    /// parameter names in order. `()` is a valid empty list; every entry
    /// must be an identifier.
    ///
    /// The parser has no notion of a parameter list, so `(a b c)` arrives
    /// here as an s-expression whose head is the first parameter.
    pub fn parameter_names(&self) -> Option<Vec<String>> {
        let Expression::SExpression { func, args } = self else {
            return None;
        };

        let mut names = Vec::with_capacity(args.len() + 1);
        if let Some(head) = func {
            match head.as_ref() {
                Expression::Ident(name) => names.push(name.clone()),
                _ => return None,
            }
        }
        for arg in args {
            match arg {
                Expression::Ident(name) => names.push(name.clone()),
                _ => return None,
            }
        }

        Some(names)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Float(value) => write!(f, "{}", format_number(*value)),
            Expression::Str(s) => write!(f, "\"{s}\""),
            Expression::Ident(name) => write!(f, "{name}"),
            Expression::SExpression { func, args } => {
                write!(f, "(")?;
                if let Some(head) = func {
                    write!(f, "{head}")?;
                }
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// An ordered sequence of top-level expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub expressions: Vec<Expression>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, expr) in self.expressions.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{expr}")?;
        }
        Ok(())
    }
}
