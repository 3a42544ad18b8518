//! Larch - a small Lisp expression language with two execution engines.
//!
//! Source text runs through a fixed pipeline: the lexer turns it into
//! tokens, the parser builds an AST of s-expressions, and then either
//!
//! - the **compiler** lowers the AST to stack-machine bytecode executed by
//!   the **VM**, or
//! - the **tree-walking evaluator** interprets the AST directly against an
//!   environment chain.
//!
//! Both engines share one object model and one builtin library, and agree
//! on results for every program:
//!
//! ```
//! let vm_result = larch::run("(def double (lambda (n) (* n 2))) (double 21)").unwrap();
//! let walked = larch::interpret("(def double (lambda (n) (* n 2))) (double 21)").unwrap();
//! assert_eq!(vm_result, walked);
//! assert_eq!(vm_result.inspect(), "42");
//! ```
//!
//! ## Language sketch
//!
//! ```lisp
//! (def fib (lambda (n)
//!   (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))))
//! (fib 10)
//!
//! (def scores { "ada" 3 "grace" 5 })
//! (get scores "grace")
//!
//! '(1 2 3)        ; quoted list, sugar for (list 1 2 3)
//! { "k" "v" }     ; dict literal, sugar for (dict "k" "v")
//! ```
//!
//! Special forms are `def`, `if` and `lambda`; everything else is a call.
//! Only `null` and `false` are falsy. Runtime failures are first-class
//! error values that flow through the program like any other object; only
//! the VM's unrecoverable faults (wrong lambda arity, calling a
//! non-callable, stack overflow, undecodable opcode) abort a run.

use std::fmt;

pub mod ast;
pub mod builtins;
pub mod code;
pub mod compiler;
pub mod evaluator;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod symbol_table;
pub mod token;
pub mod vm;

use ast::Program;
use compiler::Compiler;
use evaluator::Environment;
use object::Object;
use vm::Vm;

/// Maximum evaluator recursion depth. The VM bounds recursion with its
/// frame stack instead; the walker needs an explicit guard because it
/// recurses on the Rust stack.
pub const MAX_EVAL_DEPTH: usize = 1024;

/// A failure in one of the pipeline stages.
///
/// Value-level errors (a builtin rejecting its arguments, an unresolved
/// name on the evaluator path) are *not* represented here; they are
/// [`Object::Error`] values flowing through the program.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The parser recorded diagnostics; the program is not usable.
    Parse(Vec<String>),
    /// Name resolution or emission failed during compilation.
    Compile(String),
    /// The VM hit an unrecoverable fault and aborted.
    Runtime(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(diagnostics) => {
                write!(f, "parse error: {}", diagnostics.join("; "))
            }
            Error::Compile(message) => write!(f, "compile error: {message}"),
            Error::Runtime(message) => write!(f, "runtime error: {message}"),
        }
    }
}

impl std::error::Error for Error {}

/// Parse a program, failing if the parser recorded any diagnostic.
pub fn parse(source: &str) -> Result<Program, Error> {
    let mut parser = parser::Parser::new(source);
    let program = parser.parse_program();
    if parser.errors().is_empty() {
        Ok(program)
    } else {
        Err(Error::Parse(parser.errors().to_vec()))
    }
}

/// Run a program on the compiler/VM pipeline and return the value of its
/// final expression.
pub fn run(source: &str) -> Result<Object, Error> {
    let program = parse(source)?;
    let bytecode = Compiler::new().compile(&program)?;
    let mut vm = Vm::new(bytecode);
    vm.run()?;
    Ok(vm.last_popped())
}

/// Run a program on the tree-walking evaluator in a fresh global
/// environment. The result may be an [`Object::Error`] value.
pub fn interpret(source: &str) -> Result<Object, Error> {
    let program = parse(source)?;
    Ok(evaluator::eval_program(&program, &Environment::new()))
}
