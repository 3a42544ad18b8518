//! The builtin function library shared by both execution engines.
//!
//! Every builtin has the canonical signature `fn(&[Object]) -> Object`;
//! failures are reported as first-class [`Object::Error`] values rather than
//! Rust errors, so they flow through the same channel as results.
//!
//! Registration order matters: the compiler refers to builtins by their
//! position in [`BUILTINS`], which is the operand of the `LoadBuiltin`
//! opcode. Append new builtins at the end.

use std::collections::HashMap;

use crate::object::{DictPair, FALSE, NULL, Object, TRUE};

/// A named builtin with a variadic implementation.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub func: fn(&[Object]) -> Object,
}

/// The registry. Positions are `LoadBuiltin` operands.
pub static BUILTINS: &[Builtin] = &[
    Builtin { name: "+", func: builtin_add },
    Builtin { name: "*", func: builtin_mul },
    Builtin { name: "-", func: builtin_sub },
    Builtin { name: "/", func: builtin_div },
    Builtin { name: "rem", func: builtin_rem },
    Builtin { name: "=", func: builtin_eq },
    Builtin { name: "<", func: builtin_lt },
    Builtin { name: ">", func: builtin_gt },
    Builtin { name: "not", func: builtin_not },
    Builtin { name: "and", func: builtin_and },
    Builtin { name: "or", func: builtin_or },
    Builtin { name: "list", func: builtin_list },
    Builtin { name: "dict", func: builtin_dict },
    Builtin { name: "first", func: builtin_first },
    Builtin { name: "rest", func: builtin_rest },
    Builtin { name: "last", func: builtin_last },
    Builtin { name: "len", func: builtin_len },
    Builtin { name: "push", func: builtin_push },
    Builtin { name: "push!", func: builtin_push_mut },
    Builtin { name: "pop!", func: builtin_pop_mut },
    Builtin { name: "str", func: builtin_str },
    Builtin { name: "print", func: builtin_print },
    Builtin { name: "get", func: builtin_get },
    Builtin { name: "set", func: builtin_set },
];

/// Find a builtin by name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

/// Registry position of a builtin that is known to be registered.
pub(crate) fn position(name: &str) -> usize {
    BUILTINS
        .iter()
        .position(|b| b.name == name)
        .expect("builtin must be registered")
}

//
// Error helpers
//

fn bad_type(name: &str, arg: &Object) -> Object {
    Object::error(format!(
        "wrong type of argument for {name}: {}",
        arg.type_name()
    ))
}

fn wrong_arg_count(name: &str, expected: &str, got: usize) -> Object {
    Object::error(format!(
        "wrong number of arguments for {name}: expected={expected} got={got}"
    ))
}

fn bad_key(arg: &Object) -> Object {
    Object::error(format!("unusable as dict key: {}", arg.type_name()))
}

/// Extract every argument as a number, or produce the type error to return.
fn number_args(name: &str, args: &[Object]) -> Result<Vec<f64>, Object> {
    let mut nums = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Object::Number(n) => nums.push(*n),
            other => return Err(bad_type(name, other)),
        }
    }
    Ok(nums)
}

//
// Arithmetic
//

fn builtin_add(args: &[Object]) -> Object {
    match number_args("+", args) {
        Ok(nums) => Object::Number(nums.iter().sum()),
        Err(e) => e,
    }
}

fn builtin_mul(args: &[Object]) -> Object {
    match number_args("*", args) {
        Ok(nums) => Object::Number(nums.iter().product()),
        Err(e) => e,
    }
}

fn builtin_sub(args: &[Object]) -> Object {
    if args.is_empty() {
        return wrong_arg_count("-", "at least 1", 0);
    }
    let nums = match number_args("-", args) {
        Ok(nums) => nums,
        Err(e) => return e,
    };

    if nums.len() == 1 {
        Object::Number(-nums[0])
    } else {
        Object::Number(nums[0] - nums[1..].iter().sum::<f64>())
    }
}

fn builtin_div(args: &[Object]) -> Object {
    if args.is_empty() {
        return wrong_arg_count("/", "at least 1", 0);
    }
    let nums = match number_args("/", args) {
        Ok(nums) => nums,
        Err(e) => return e,
    };

    if nums.len() == 1 {
        return Object::Number(1.0 / nums[0]);
    }

    let mut result = nums[0];
    for divisor in &nums[1..] {
        if *divisor == 0.0 {
            return Object::error("Attempted to divide by 0");
        }
        result /= divisor;
    }
    Object::Number(result)
}

fn builtin_rem(args: &[Object]) -> Object {
    if args.len() != 2 {
        return wrong_arg_count("rem", "2", args.len());
    }
    let nums = match number_args("rem", args) {
        Ok(nums) => nums,
        Err(e) => return e,
    };

    if nums[1] == 0.0 {
        return Object::error("Attempted rem of 0");
    }

    // Truncating remainder: the sign follows the dividend.
    Object::Number(nums[0] % nums[1])
}

//
// Comparison
//

fn builtin_eq(args: &[Object]) -> Object {
    let Some(first) = args.first() else {
        return TRUE;
    };

    // Equality is specialized on the first argument's variant; containers
    // and null are not comparable with `=`.
    match first {
        Object::Number(_)
        | Object::Str(_)
        | Object::Boolean(_)
        | Object::Lambda(_)
        | Object::Closure(_)
        | Object::Builtin(_) => {}
        other => return bad_type("=", other),
    }

    for other in &args[1..] {
        if first != other {
            return FALSE;
        }
    }
    TRUE
}

macro_rules! numeric_chain {
    ($func:ident, $op:tt, $name:expr) => {
        fn $func(args: &[Object]) -> Object {
            if args.is_empty() {
                return wrong_arg_count($name, "at least 1", 0);
            }
            let nums = match number_args($name, args) {
                Ok(nums) => nums,
                Err(e) => return e,
            };

            // Strictly monotonic over every adjacent pair.
            for pair in nums.windows(2) {
                if !(pair[0] $op pair[1]) {
                    return FALSE;
                }
            }
            TRUE
        }
    };
}

numeric_chain!(builtin_lt, <, "<");
numeric_chain!(builtin_gt, >, ">");

//
// Logic
//

fn builtin_not(args: &[Object]) -> Object {
    if args.len() != 1 {
        return wrong_arg_count("not", "1", args.len());
    }
    if args[0].is_error() {
        return args[0].clone();
    }
    if args[0].is_truthy() { FALSE } else { TRUE }
}

fn builtin_and(args: &[Object]) -> Object {
    for arg in args {
        if arg.is_error() {
            return arg.clone();
        }
        if !arg.is_truthy() {
            return FALSE;
        }
    }
    TRUE
}

fn builtin_or(args: &[Object]) -> Object {
    for arg in args {
        if arg.is_error() {
            return arg.clone();
        }
        if arg.is_truthy() {
            return TRUE;
        }
    }
    FALSE
}

//
// Lists
//

fn builtin_list(args: &[Object]) -> Object {
    Object::list(args.to_vec())
}

fn builtin_first(args: &[Object]) -> Object {
    let [Object::List(values)] = args else {
        return list_arg_error("first", args);
    };
    values.borrow().first().cloned().unwrap_or(NULL)
}

fn builtin_rest(args: &[Object]) -> Object {
    let [Object::List(values)] = args else {
        return list_arg_error("rest", args);
    };
    let values = values.borrow();
    if values.is_empty() {
        return NULL;
    }
    Object::list(values[1..].to_vec())
}

fn builtin_last(args: &[Object]) -> Object {
    let [Object::List(values)] = args else {
        return list_arg_error("last", args);
    };
    values.borrow().last().cloned().unwrap_or(NULL)
}

fn builtin_len(args: &[Object]) -> Object {
    if args.len() != 1 {
        return wrong_arg_count("len", "1", args.len());
    }
    match &args[0] {
        Object::List(values) => Object::Number(values.borrow().len() as f64),
        Object::Str(s) => Object::Number(s.len() as f64),
        other => bad_type("len", other),
    }
}

fn builtin_push(args: &[Object]) -> Object {
    let (values, item) = match args {
        [Object::List(values), item] => (values, item),
        [other, _] => return bad_type("push", other),
        _ => return wrong_arg_count("push", "2", args.len()),
    };

    let mut copied = values.borrow().clone();
    copied.push(item.clone());
    Object::list(copied)
}

fn builtin_push_mut(args: &[Object]) -> Object {
    let (values, item) = match args {
        [Object::List(values), item] => (values, item),
        [other, _] => return bad_type("push!", other),
        _ => return wrong_arg_count("push!", "2", args.len()),
    };

    values.borrow_mut().push(item.clone());
    args[0].clone()
}

fn builtin_pop_mut(args: &[Object]) -> Object {
    let [Object::List(values)] = args else {
        return list_arg_error("pop!", args);
    };

    match values.borrow_mut().pop() {
        Some(value) => value,
        None => Object::error("attempted to pop from empty list"),
    }
}

fn list_arg_error(name: &str, args: &[Object]) -> Object {
    if args.len() != 1 {
        wrong_arg_count(name, "1", args.len())
    } else {
        bad_type(name, &args[0])
    }
}

//
// Dictionaries
//

fn builtin_dict(args: &[Object]) -> Object {
    if args.len() % 2 != 0 {
        return wrong_arg_count("dict", "even number", args.len());
    }

    let mut entries = HashMap::new();
    for pair in args.chunks_exact(2) {
        let Some(digest) = pair[0].hash_key() else {
            return bad_key(&pair[0]);
        };
        entries.insert(
            digest,
            DictPair {
                key: pair[0].clone(),
                value: pair[1].clone(),
            },
        );
    }
    Object::dict(entries)
}

fn builtin_get(args: &[Object]) -> Object {
    if args.len() != 2 {
        return wrong_arg_count("get", "2", args.len());
    }
    let Object::Dict(entries) = &args[0] else {
        return bad_type("get", &args[0]);
    };
    let Some(digest) = args[1].hash_key() else {
        return bad_key(&args[1]);
    };

    match entries.borrow().get(&digest) {
        Some(pair) => pair.value.clone(),
        None => NULL,
    }
}

fn builtin_set(args: &[Object]) -> Object {
    if args.len() != 3 {
        return wrong_arg_count("set", "3", args.len());
    }
    let Object::Dict(entries) = &args[0] else {
        return bad_type("set", &args[0]);
    };
    let Some(digest) = args[1].hash_key() else {
        return bad_key(&args[1]);
    };

    entries.borrow_mut().insert(
        digest,
        DictPair {
            key: args[1].clone(),
            value: args[2].clone(),
        },
    );
    args[0].clone()
}

//
// Strings and output
//

fn builtin_str(args: &[Object]) -> Object {
    let mut result = String::new();
    for arg in args {
        result.push_str(&arg.inspect());
    }
    Object::Str(result)
}

fn builtin_print(args: &[Object]) -> Object {
    let rendered: Vec<String> = args.iter().map(Object::inspect).collect();
    println!("{}", rendered.join(" "));
    NULL
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Object {
        Object::Number(n)
    }

    fn string(s: &str) -> Object {
        Object::Str(s.to_string())
    }

    /// Invoke a builtin through the registry, the way both engines do.
    fn call(name: &str, args: &[Object]) -> Object {
        (lookup(name).expect("builtin not found").func)(args)
    }

    /// `None` means "any Error object".
    type Case = (&'static str, Vec<Object>, Option<Object>);

    fn run_cases(test_cases: Vec<Case>) {
        for (i, (name, args, expected)) in test_cases.iter().enumerate() {
            let actual = call(name, args);
            match expected {
                Some(value) => assert_eq!(
                    &actual,
                    value,
                    "case #{} ({name} {args:?}) mismatch",
                    i + 1
                ),
                None => assert!(
                    actual.is_error(),
                    "case #{} ({name} {args:?}) expected error, got {actual:?}",
                    i + 1
                ),
            }
        }
    }

    #[test]
    fn test_arithmetic() {
        run_cases(vec![
            // Identities
            ("+", vec![], Some(num(0.0))),
            ("*", vec![], Some(num(1.0))),
            ("-", vec![], None),
            ("/", vec![], None),
            // Folds
            ("+", vec![num(1.0), num(2.0), num(3.0)], Some(num(6.0))),
            ("*", vec![num(2.0), num(3.0), num(4.0)], Some(num(24.0))),
            ("-", vec![num(10.0), num(3.0), num(2.0)], Some(num(5.0))),
            ("/", vec![num(12.0), num(3.0), num(2.0)], Some(num(2.0))),
            // Unary forms
            ("-", vec![num(5.0)], Some(num(-5.0))),
            ("/", vec![num(4.0)], Some(num(0.25))),
            // Division by zero
            ("/", vec![num(1.0), num(0.0)], None),
            // Remainder: truncating, sign follows the dividend
            ("rem", vec![num(7.0), num(3.0)], Some(num(1.0))),
            ("rem", vec![num(-7.0), num(3.0)], Some(num(-1.0))),
            ("rem", vec![num(7.0), num(-3.0)], Some(num(1.0))),
            ("rem", vec![num(5.0), num(0.0)], None),
            ("rem", vec![num(1.0)], None),
            // Type errors
            ("+", vec![string("x")], None),
            ("-", vec![num(1.0), TRUE], None),
        ]);
    }

    #[test]
    fn test_comparison() {
        run_cases(vec![
            ("=", vec![], Some(TRUE)),
            ("=", vec![num(5.0)], Some(TRUE)),
            ("=", vec![num(5.0), num(5.0), num(5.0)], Some(TRUE)),
            ("=", vec![num(5.0), num(6.0)], Some(FALSE)),
            ("=", vec![string("a"), string("a")], Some(TRUE)),
            ("=", vec![string("a"), string("b")], Some(FALSE)),
            ("=", vec![TRUE, TRUE], Some(TRUE)),
            // Mismatched variants compare unequal rather than erroring
            ("=", vec![num(1.0), string("1")], Some(FALSE)),
            // Containers are not `=`-comparable
            ("=", vec![Object::list(vec![])], None),
            ("=", vec![NULL, NULL], None),
            // Strict monotonic chains
            ("<", vec![num(1.0), num(2.0), num(3.0)], Some(TRUE)),
            ("<", vec![num(1.0), num(3.0), num(2.0)], Some(FALSE)),
            ("<", vec![num(1.0), num(1.0)], Some(FALSE)),
            ("<", vec![num(1.0)], Some(TRUE)),
            ("<", vec![], None),
            (">", vec![num(3.0), num(2.0), num(1.0)], Some(TRUE)),
            (">", vec![num(3.0), num(2.0), num(4.0)], Some(FALSE)),
            (">", vec![string("a"), num(1.0)], None),
        ]);
    }

    #[test]
    fn test_logic() {
        run_cases(vec![
            ("not", vec![TRUE], Some(FALSE)),
            ("not", vec![FALSE], Some(TRUE)),
            ("not", vec![NULL], Some(TRUE)),
            ("not", vec![num(0.0)], Some(FALSE)),
            ("not", vec![], None),
            ("not", vec![TRUE, FALSE], None),
            // An error argument passes through untouched
            (
                "not",
                vec![Object::error("boom")],
                Some(Object::error("boom")),
            ),
            ("and", vec![], Some(TRUE)),
            ("and", vec![TRUE, TRUE], Some(TRUE)),
            ("and", vec![TRUE, FALSE, TRUE], Some(FALSE)),
            ("and", vec![num(1.0), string("")], Some(TRUE)),
            (
                "and",
                vec![Object::error("boom"), FALSE],
                Some(Object::error("boom")),
            ),
            ("or", vec![], Some(FALSE)),
            ("or", vec![FALSE, NULL], Some(FALSE)),
            ("or", vec![FALSE, num(0.0)], Some(TRUE)),
            (
                "or",
                vec![Object::error("boom"), TRUE],
                Some(Object::error("boom")),
            ),
        ]);
    }

    #[test]
    fn test_lists() {
        let one_two = || Object::list(vec![num(1.0), num(2.0)]);

        run_cases(vec![
            ("list", vec![], Some(Object::list(vec![]))),
            ("list", vec![num(1.0), num(2.0)], Some(one_two())),
            ("first", vec![one_two()], Some(num(1.0))),
            ("first", vec![Object::list(vec![])], Some(NULL)),
            ("first", vec![num(1.0)], None),
            ("rest", vec![one_two()], Some(Object::list(vec![num(2.0)]))),
            ("rest", vec![Object::list(vec![])], Some(NULL)),
            ("last", vec![one_two()], Some(num(2.0))),
            ("last", vec![Object::list(vec![])], Some(NULL)),
            ("len", vec![one_two()], Some(num(2.0))),
            ("len", vec![string("hello")], Some(num(5.0))),
            ("len", vec![num(1.0)], None),
            ("len", vec![], None),
            (
                "push",
                vec![one_two(), num(3.0)],
                Some(Object::list(vec![num(1.0), num(2.0), num(3.0)])),
            ),
            ("push", vec![num(1.0), num(2.0)], None),
            ("pop!", vec![Object::list(vec![])], None),
        ]);
    }

    #[test]
    fn test_push_copies_but_push_mut_aliases() {
        let original = Object::list(vec![num(1.0)]);

        // push returns a fresh copy; the original is untouched
        let copied = call("push", &[original.clone(), num(2.0)]);
        assert_eq!(original, Object::list(vec![num(1.0)]));
        assert_eq!(copied, Object::list(vec![num(1.0), num(2.0)]));

        // push! mutates through the alias and returns the same list
        let alias = original.clone();
        let returned = call("push!", &[original.clone(), num(9.0)]);
        assert_eq!(alias, Object::list(vec![num(1.0), num(9.0)]));
        assert_eq!(returned, alias);

        // pop! removes through the alias and hands the element back
        let popped = call("pop!", &[alias.clone()]);
        assert_eq!(popped, num(9.0));
        assert_eq!(original, Object::list(vec![num(1.0)]));
    }

    #[test]
    fn test_dicts() {
        let d = call("dict", &[string("a"), num(1.0), num(2.0), string("two")]);
        assert!(matches!(d, Object::Dict(_)));

        assert_eq!(call("get", &[d.clone(), string("a")]), num(1.0));
        assert_eq!(call("get", &[d.clone(), num(2.0)]), string("two"));
        assert_eq!(call("get", &[d.clone(), string("missing")]), NULL);

        // set mutates in place and returns the dict
        let returned = call("set", &[d.clone(), string("a"), num(7.0)]);
        assert_eq!(returned, d);
        assert_eq!(call("get", &[d.clone(), string("a")]), num(7.0));

        run_cases(vec![
            // Odd argument count
            ("dict", vec![string("a")], None),
            // Non-hashable key
            ("dict", vec![Object::list(vec![]), num(1.0)], None),
            ("get", vec![num(1.0), num(1.0)], None),
            ("get", vec![d.clone(), Object::list(vec![])], None),
            ("set", vec![num(1.0), num(1.0), num(1.0)], None),
        ]);
    }

    #[test]
    fn test_str_concatenates_inspect_forms() {
        run_cases(vec![
            ("str", vec![], Some(string(""))),
            ("str", vec![num(1.0), num(2.5)], Some(string("12.5"))),
            // String arguments keep their quotes, as inspection renders them
            ("str", vec![string("a")], Some(string("\"a\""))),
            ("str", vec![TRUE, NULL], Some(string("truenull"))),
            (
                "str",
                vec![Object::list(vec![num(1.0), num(2.0)])],
                Some(string("(1 2)")),
            ),
        ]);
    }

    #[test]
    fn test_registration_order_is_stable() {
        // LoadBuiltin operands bake these positions into compiled programs.
        let names: Vec<&str> = BUILTINS.iter().map(|b| b.name).collect();
        assert_eq!(
            names,
            vec![
                "+", "*", "-", "/", "rem", "=", "<", ">", "not", "and", "or", "list", "dict",
                "first", "rest", "last", "len", "push", "push!", "pop!", "str", "print", "get",
                "set",
            ]
        );
    }
}
