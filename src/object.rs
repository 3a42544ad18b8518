//! The runtime object model shared by the VM and the tree-walking evaluator.
//!
//! Values are tagged by the [`Object`] enum. Lists and dictionaries carry
//! `Rc<RefCell<_>>` interiors so that the mutating builtins (`push!`, `pop!`,
//! `set`) are observed through every alias, while everything else behaves as
//! an immutable value. Errors are first-class values that flow through the
//! same channel as results.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;
use std::rc::Rc;

use fnv::FnvHasher;

use crate::ast::Expression;
use crate::builtins::Builtin;
use crate::code::Instructions;
use crate::evaluator::Environment;

pub const TRUE: Object = Object::Boolean(true);
pub const FALSE: Object = Object::Boolean(false);
pub const NULL: Object = Object::Null;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Object {
    Number(f64),
    Str(String),
    Boolean(bool),
    Null,
    List(Rc<RefCell<Vec<Object>>>),
    Dict(Rc<RefCell<HashMap<HashKey, DictPair>>>),
    /// A user lambda on the evaluator path: AST body plus captured environment.
    Lambda(Rc<Lambda>),
    /// Compiler output: an instruction block living in the constant pool.
    CompiledFunction(Rc<CompiledFunction>),
    /// A compiled function paired with its captured free values (VM path).
    Closure(Rc<Closure>),
    Builtin(&'static Builtin),
    Error(String),
}

/// A user lambda as the evaluator sees it.
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Vec<Expression>,
    pub env: Rc<Environment>,
}

// The captured environment can reach back to this lambda, so the derived
// Debug would recurse forever. Print the shape only.
impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lambda({})", self.params.join(" "))
    }
}

/// A compiled lambda body: its instruction stream, how many local slots the
/// frame must reserve (parameters included), and its declared arity.
#[derive(Debug, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_params: usize,
}

/// A compiled function plus the free values captured when the enclosing
/// scope materialized it.
#[derive(Debug)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Object>,
}

/// A dictionary entry keeps the original key object so inspection can print
/// it; lookups go through the digest.
#[derive(Debug, Clone, PartialEq)]
pub struct DictPair {
    pub key: Object,
    pub value: Object,
}

/// Stable digest for a hashable dictionary key.
///
/// Numbers hash as the bit pattern of the canonicalized double (-0.0 folds
/// into 0.0), strings as an FNV-1a content hash, booleans as themselves.
/// The digest is stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKey {
    Number(u64),
    Str(u64),
    Boolean(bool),
}

impl Object {
    pub fn list(values: Vec<Object>) -> Object {
        Object::List(Rc::new(RefCell::new(values)))
    }

    pub fn dict(entries: HashMap<HashKey, DictPair>) -> Object {
        Object::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn error(message: impl Into<String>) -> Object {
        Object::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Object::Error(_))
    }

    /// Only `null` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Object::Null | Object::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Number(_) => "NUMBER",
            Object::Str(_) => "STRING",
            Object::Boolean(_) => "BOOLEAN",
            Object::Null => "NULL",
            Object::List(_) => "LIST",
            Object::Dict(_) => "DICT",
            Object::Lambda(_) => "LAMBDA",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION",
            Object::Closure(_) => "CLOSURE",
            Object::Builtin(_) => "BUILTIN",
            Object::Error(_) => "ERROR",
        }
    }

    /// The digest used for dictionary keys, if this value is hashable.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Object::Number(n) => {
                let canonical = if *n == 0.0 { 0.0 } else { *n };
                Some(HashKey::Number(canonical.to_bits()))
            }
            Object::Str(s) => {
                let mut hasher = FnvHasher::default();
                hasher.write(s.as_bytes());
                Some(HashKey::Str(hasher.finish()))
            }
            Object::Boolean(b) => Some(HashKey::Boolean(*b)),
            _ => None,
        }
    }

    /// The canonical printed form.
    pub fn inspect(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Number(n) => write!(f, "{}", format_number(*n)),
            Object::Str(s) => write!(f, "\"{s}\""),
            Object::Boolean(b) => write!(f, "{b}"),
            Object::Null => write!(f, "null"),
            Object::List(values) => {
                write!(f, "(")?;
                for (i, value) in values.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, ")")
            }
            Object::Dict(entries) => {
                write!(f, "{{")?;
                for (i, pair) in entries.borrow().values().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{} {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Object::Lambda(_) | Object::CompiledFunction(_) | Object::Closure(_) => {
                write!(f, "<lambda>")
            }
            Object::Builtin(builtin) => write!(f, "{}", builtin.name),
            Object::Error(message) => write!(f, "ERROR: {message}"),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Number(a), Object::Number(b)) => a == b,
            (Object::Str(a), Object::Str(b)) => a == b,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Null, Object::Null) => true,
            (Object::List(a), Object::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Object::Dict(a), Object::Dict(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Object::Lambda(a), Object::Lambda(b)) => Rc::ptr_eq(a, b),
            (Object::CompiledFunction(a), Object::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Object::Closure(a), Object::Closure(b)) => Rc::ptr_eq(a, b),
            (Object::Builtin(a), Object::Builtin(b)) => a.name == b.name,
            (Object::Error(a), Object::Error(b)) => a == b,
            _ => false,
        }
    }
}

/// Render a number the way the language prints it: integral values without a
/// fractional part, everything else in Rust's shortest `f64` form.
///
/// Both engines share this helper, which is where the original's
/// integer-versus-float object split is isolated.
pub(crate) fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.2e18 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
