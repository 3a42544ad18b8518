//! The tree-walking evaluator: the second execution engine over the AST.
//!
//! Semantics mirror the compiler/VM pipeline: same special forms, same
//! builtin registry, same truthiness. Names live in an environment
//! chain instead of indexed slots, and lambdas capture their defining
//! environment instead of compiled free-variable lists.
//!
//! Errors are first-class [`Object::Error`] values and propagate to the top
//! of the program; the evaluator itself never fails. A depth limit turns
//! runaway recursion into an error value where the VM would abort.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::MAX_EVAL_DEPTH;
use crate::ast::{Expression, Program};
use crate::builtins;
use crate::object::{FALSE, Lambda, NULL, Object, TRUE};

/// A scope of name bindings, linked to the scope it was created inside.
#[derive(Debug, Default)]
pub struct Environment {
    bindings: RefCell<HashMap<String, Object>>,
    outer: Option<Rc<Environment>>,
}

impl Environment {
    pub fn new() -> Rc<Environment> {
        Rc::new(Environment::default())
    }

    pub fn enclosed(outer: Rc<Environment>) -> Rc<Environment> {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            outer: Some(outer),
        })
    }

    pub fn define(&self, name: &str, value: Object) {
        self.bindings.borrow_mut().insert(name.to_string(), value);
    }

    /// Look a name up here or in any enclosing environment.
    pub fn get(&self, name: &str) -> Option<Object> {
        if let Some(value) = self.bindings.borrow().get(name) {
            return Some(value.clone());
        }
        self.outer.as_ref()?.get(name)
    }
}

/// Evaluate a program, returning the value of its final expression. An
/// error value anywhere stops evaluation and surfaces immediately.
pub fn eval_program(program: &Program, env: &Rc<Environment>) -> Object {
    let mut result = NULL;
    for expr in &program.expressions {
        result = eval_expression(expr, env, 0);
        if result.is_error() {
            return result;
        }
    }
    result
}

fn eval_expression(expr: &Expression, env: &Rc<Environment>, depth: usize) -> Object {
    if depth >= MAX_EVAL_DEPTH {
        return Object::error(format!(
            "evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        ));
    }

    match expr {
        Expression::Float(value) => Object::Number(*value),
        Expression::Str(s) => Object::Str(s.clone()),
        Expression::Ident(name) => eval_identifier(name, env),
        Expression::SExpression { func: None, .. } => Object::list(vec![]),
        Expression::SExpression {
            func: Some(head),
            args,
        } => {
            if let Expression::Ident(name) = head.as_ref() {
                match name.as_str() {
                    "def" => return eval_def(args, env, depth),
                    "if" => return eval_if(args, env, depth),
                    "lambda" => return eval_lambda(args, env),
                    _ => {}
                }
            }
            eval_call(head, args, env, depth)
        }
    }
}

fn eval_identifier(name: &str, env: &Rc<Environment>) -> Object {
    match name {
        "true" => return TRUE,
        "false" => return FALSE,
        _ => {}
    }

    if let Some(value) = env.get(name) {
        return value;
    }
    // Unresolved names fall back to the builtin registry.
    match builtins::lookup(name) {
        Some(builtin) => Object::Builtin(builtin),
        None => Object::error(format!("undefined name: {name}")),
    }
}

/// `(def NAME VALUE)`: bind in the current environment; yields null.
fn eval_def(args: &[Expression], env: &Rc<Environment>, depth: usize) -> Object {
    let [Expression::Ident(name), value] = args else {
        return Object::error("def requires an identifier and a value");
    };

    let value = eval_expression(value, env, depth + 1);
    if value.is_error() {
        return value;
    }
    env.define(name, value);
    NULL
}

/// `(if COND THEN [ELSE])`: a false condition without an alternative
/// yields null.
fn eval_if(args: &[Expression], env: &Rc<Environment>, depth: usize) -> Object {
    if args.len() != 2 && args.len() != 3 {
        return Object::error(format!(
            "if requires a condition and a consequence, got {} arguments",
            args.len()
        ));
    }

    let condition = eval_expression(&args[0], env, depth + 1);
    if condition.is_error() {
        return condition;
    }

    if condition.is_truthy() {
        eval_expression(&args[1], env, depth + 1)
    } else {
        match args.get(2) {
            Some(alternative) => eval_expression(alternative, env, depth + 1),
            None => NULL,
        }
    }
}

/// `(lambda (PARAMS...) BODY...)`: captures the current environment.
fn eval_lambda(args: &[Expression], env: &Rc<Environment>) -> Object {
    let Some((params_expr, body)) = args.split_first() else {
        return Object::error("lambda requires a parameter list");
    };
    let Some(params) = params_expr.parameter_names() else {
        return Object::error("lambda parameters must be identifiers");
    };

    Object::Lambda(Rc::new(Lambda {
        params,
        body: body.to_vec(),
        env: Rc::clone(env),
    }))
}

fn eval_call(
    head: &Expression,
    args: &[Expression],
    env: &Rc<Environment>,
    depth: usize,
) -> Object {
    let callee = eval_expression(head, env, depth + 1);
    if callee.is_error() {
        return callee;
    }

    // Arguments evaluate left to right; the first error short-circuits.
    let mut evaluated = Vec::with_capacity(args.len());
    for arg in args {
        let value = eval_expression(arg, env, depth + 1);
        if value.is_error() {
            return value;
        }
        evaluated.push(value);
    }

    apply(&callee, &evaluated, depth)
}

fn apply(callee: &Object, args: &[Object], depth: usize) -> Object {
    match callee {
        Object::Builtin(builtin) => (builtin.func)(args),
        Object::Lambda(lambda) => {
            if args.len() != lambda.params.len() {
                return Object::error(format!(
                    "wrong number of arguments: expected={} got={}",
                    lambda.params.len(),
                    args.len()
                ));
            }

            let call_env = Environment::enclosed(Rc::clone(&lambda.env));
            for (param, arg) in lambda.params.iter().zip(args) {
                call_env.define(param, arg.clone());
            }

            let mut result = NULL;
            for expr in &lambda.body {
                result = eval_expression(expr, &call_env, depth + 1);
                if result.is_error() {
                    return result;
                }
            }
            result
        }
        _ => Object::error("calling non-lambda and non-builtin"),
    }
}
