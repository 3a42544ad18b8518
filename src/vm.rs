//! The virtual machine: a frame-based stack machine over compiled bytecode.
//!
//! The value stack is bounded; overflowing it, calling a non-callable,
//! calling a lambda with the wrong argument count, or meeting an undecodable
//! opcode aborts the run with [`Error::Runtime`]. Every other failure mode
//! flows through the stack as an ordinary [`Object::Error`] value.
//!
//! Whenever a `Pop` instruction discards a value it lands in the
//! *last-popped* slot, which is how observers read the result of the final
//! top-level expression after the main frame runs off the end of its
//! instruction stream.

use std::rc::Rc;

use crate::Error;
use crate::builtins::BUILTINS;
use crate::code::{self, Op};
use crate::compiler::Bytecode;
use crate::object::{Closure, CompiledFunction, FALSE, NULL, Object, TRUE};

/// Value stack depth. Exceeding it is fatal.
pub const STACK_SIZE: usize = 2048;
/// Call depth. Exceeding it is fatal.
pub const MAX_FRAMES: usize = 1024;

/// One in-progress call: the closure being executed, its instruction
/// pointer, and where its local-variable region starts on the value stack.
struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    base_pointer: usize,
}

pub struct Vm {
    constants: Vec<Object>,
    stack: Vec<Object>,
    sp: usize,
    globals: Vec<Object>,
    frames: Vec<Frame>,
    last_popped: Object,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, Vec::new())
    }

    /// Build a VM that reuses an existing globals array, so a REPL can carry
    /// definitions across inputs. Recover the array with
    /// [`Vm::into_globals`].
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Object>) -> Self {
        // A synthetic main frame wraps the top-level instruction stream.
        let main_func = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_params: 0,
        });
        let main_frame = Frame {
            closure: Rc::new(Closure {
                func: main_func,
                free: Vec::new(),
            }),
            ip: 0,
            base_pointer: 0,
        };

        Vm {
            constants: bytecode.constants,
            stack: vec![NULL; STACK_SIZE],
            sp: 0,
            globals,
            frames: vec![main_frame],
            last_popped: NULL,
        }
    }

    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    /// The most recently discarded stack value: after a successful run, the
    /// result of the program's final expression.
    pub fn last_popped(&self) -> Object {
        self.last_popped.clone()
    }

    /// Execute until the main frame's instruction pointer reaches the end of
    /// its stream.
    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            let frame = self.current_frame();
            if frame.ip >= frame.closure.func.instructions.len() {
                break;
            }

            let byte = frame.closure.func.instructions[frame.ip];
            let op = Op::try_from(byte)
                .map_err(|_| Error::Runtime(format!("unknown opcode: {byte}")))?;
            self.current_frame_mut().ip += 1;

            match op {
                Op::LoadConst => {
                    let idx = self.read_u16_operand();
                    let constant = self.constants[idx].clone();
                    self.push(constant)?;
                }
                Op::Pop => {
                    self.last_popped = self.pop();
                }
                Op::LoadTrue => self.push(TRUE)?,
                Op::LoadFalse => self.push(FALSE)?,
                Op::LoadNull => self.push(NULL)?,
                Op::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame_mut().ip = target;
                }
                Op::JumpIfFalse => {
                    let target = self.read_u16_operand();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }
                Op::DefineGlobal => {
                    let idx = self.read_u16_operand();
                    let value = self.pop();
                    if idx >= self.globals.len() {
                        self.globals.resize(idx + 1, NULL);
                    }
                    self.globals[idx] = value;
                }
                Op::LoadGlobal => {
                    let idx = self.read_u16_operand();
                    let value = self.globals[idx].clone();
                    self.push(value)?;
                }
                Op::DefineLocal => {
                    let idx = self.read_u8_operand();
                    let value = self.pop();
                    let base = self.current_frame().base_pointer;
                    self.stack[base + idx] = value;
                }
                Op::LoadLocal => {
                    let idx = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + idx].clone();
                    self.push(value)?;
                }
                Op::LoadBuiltin => {
                    let idx = self.read_u8_operand();
                    self.push(Object::Builtin(&BUILTINS[idx]))?;
                }
                Op::LoadFree => {
                    let idx = self.read_u8_operand();
                    let value = self.current_frame().closure.free[idx].clone();
                    self.push(value)?;
                }
                Op::Closure => {
                    let const_idx = self.read_u16_operand();
                    let num_free = self.read_u8_operand();

                    let Object::CompiledFunction(func) = self.constants[const_idx].clone() else {
                        return Err(Error::Runtime(format!(
                            "constant {const_idx} is not a compiled lambda"
                        )));
                    };
                    let free = self.stack[self.sp - num_free..self.sp].to_vec();
                    self.sp -= num_free;
                    self.push(Object::Closure(Rc::new(Closure { func, free })))?;
                }
                Op::Call => {
                    let num_args = self.read_u8_operand();
                    self.call(num_args)?;
                }
                Op::ReturnValue => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("frame stack is never empty");
                    // Drop the callee and its arguments in one move.
                    self.sp = frame.base_pointer - 1;
                    self.push(result)?;
                }
            }
        }

        Ok(())
    }

    fn call(&mut self, num_args: usize) -> Result<(), Error> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Object::Closure(closure) => self.call_closure(closure, num_args),
            Object::Builtin(builtin) => {
                let args = self.stack[self.sp - num_args..self.sp].to_vec();
                let result = (builtin.func)(&args);
                self.sp -= num_args + 1;
                self.push(result)
            }
            _ => Err(Error::Runtime("calling non-lambda and non-builtin".into())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<(), Error> {
        if num_args != closure.func.num_params {
            return Err(Error::Runtime(format!(
                "wrong number of arguments: expected={} got={}",
                closure.func.num_params, num_args
            )));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(Error::Runtime("stack overflow".into()));
        }

        let base_pointer = self.sp - num_args;
        let new_sp = base_pointer + closure.func.num_locals;
        if new_sp >= STACK_SIZE {
            return Err(Error::Runtime("stack overflow".into()));
        }

        self.frames.push(Frame {
            closure,
            ip: 0,
            base_pointer,
        });
        self.sp = new_sp;
        Ok(())
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn read_u16_operand(&mut self) -> usize {
        let frame = self.frames.last_mut().expect("frame stack is never empty");
        let value = code::read_u16(&frame.closure.func.instructions, frame.ip);
        frame.ip += 2;
        value
    }

    fn read_u8_operand(&mut self) -> usize {
        let frame = self.frames.last_mut().expect("frame stack is never empty");
        let value = code::read_u8(&frame.closure.func.instructions, frame.ip);
        frame.ip += 1;
        value
    }

    fn push(&mut self, object: Object) -> Result<(), Error> {
        if self.sp >= STACK_SIZE {
            return Err(Error::Runtime("stack overflow".into()));
        }
        self.stack[self.sp] = object;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Object {
        self.sp -= 1;
        std::mem::replace(&mut self.stack[self.sp], NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::object::Object;

    fn run_source(source: &str) -> Result<Object, Error> {
        let program = crate::parse(source)?;
        let bytecode = Compiler::new().compile(&program)?;
        let mut vm = Vm::new(bytecode);
        vm.run()?;
        Ok(vm.last_popped())
    }

    fn num(n: f64) -> Object {
        Object::Number(n)
    }

    fn string(s: &str) -> Object {
        Object::Str(s.to_string())
    }

    fn run_cases(test_cases: Vec<(&str, Object)>) {
        for (i, (source, expected)) in test_cases.iter().enumerate() {
            let actual = run_source(source)
                .unwrap_or_else(|e| panic!("case #{} {source:?} failed: {e}", i + 1));
            assert_eq!(&actual, expected, "case #{} {source:?}", i + 1);
        }
    }

    #[test]
    fn test_literals_and_last_popped() {
        run_cases(vec![
            ("1", num(1.0)),
            ("2", num(2.0)),
            ("1 2", num(2.0)),
            ("2.5", num(2.5)),
            ("\"string\"", string("string")),
            ("true", TRUE),
            ("false", FALSE),
        ]);
    }

    #[test]
    fn test_conditionals() {
        run_cases(vec![
            ("(if true 10)", num(10.0)),
            ("(if false 10)", NULL),
            ("(if true 10 20)", num(10.0)),
            ("(if false 10 20)", num(20.0)),
            ("(if 1 10)", num(10.0)),
            ("(if 1 10 20)", num(10.0)),
            ("(if (if false 10) 10 20)", num(20.0)),
            // Every value but null and false is truthy
            ("(if 0 1 2)", num(1.0)),
            ("(if \"\" 1 2)", num(1.0)),
            ("(if () 1 2)", num(1.0)),
        ]);
    }

    #[test]
    fn test_global_defs() {
        run_cases(vec![
            ("(def one 1) one", num(1.0)),
            ("(def one 1) (def two 2) one", num(1.0)),
            ("(def one 1) (def two one) two", num(1.0)),
            ("(def a \"string\") a", string("string")),
        ]);
    }

    #[test]
    fn test_lambda_calls() {
        run_cases(vec![
            ("(def func (lambda () 5)) (func)", num(5.0)),
            (
                "(def one (lambda () 1))
                 (def two (lambda () (one)))
                 (def three (lambda () (two)))
                 (three)",
                num(1.0),
            ),
            (
                "(def truth (lambda () true))
                 (def two (lambda () (if (truth) 2 1)))
                 (two)",
                num(2.0),
            ),
            ("((lambda ()))", NULL),
            (
                "(def one (lambda () 1))
                 (def oneBuilder (lambda () one))
                 ((oneBuilder))",
                num(1.0),
            ),
            ("(def identity (lambda (a) a)) (identity 4)", num(4.0)),
            ("((lambda (a b) a b) 1 2)", num(2.0)),
        ]);
    }

    #[test]
    fn test_lambda_local_bindings() {
        run_cases(vec![
            ("(def one (lambda () (def num 1) num)) (one)", num(1.0)),
            (
                "(def wrong (lambda ()
                              (def result false)
                              result))
                 (def answer (lambda ()
                               (def result 16)
                               result))
                 (if (wrong) 0 (answer))",
                num(16.0),
            ),
            (
                "(def threeIfTrue
                   (lambda (n)
                     (def result (if n 3 0))
                     result))
                 (threeIfTrue true)",
                num(3.0),
            ),
            (
                "(def four 4)
                 (def threeElseFour
                   (lambda (n)
                     (def result (if n 3 four))
                     result))
                 (def outer
                   (lambda (n)
                     (def result (threeElseFour n))
                     result))
                 (outer false)",
                num(4.0),
            ),
        ]);
    }

    #[test]
    fn test_closures() {
        run_cases(vec![
            (
                "(def make-adder (lambda (n) (lambda (x) (+ x n))))
                 (def add5 (make-adder 5))
                 (add5 3)",
                num(8.0),
            ),
            (
                "(def make-adder (lambda (n) (lambda (x) (+ x n))))
                 ((make-adder 2) 40)",
                num(42.0),
            ),
            // Capture through two lambda levels
            (
                "(def outer (lambda (a) (lambda (b) (lambda (c) (+ a (+ b c))))))
                 (((outer 100) 20) 3)",
                num(123.0),
            ),
            // The captured slot is independent per closure instance
            (
                "(def make-adder (lambda (n) (lambda (x) (+ x n))))
                 (def add1 (make-adder 1))
                 (def add9 (make-adder 9))
                 (+ (add1 0) (add9 0))",
                num(10.0),
            ),
            // Global recursion through the globals array, no capture needed
            (
                "(def countdown (lambda (n) (if (< n 1) 0 (countdown (- n 1)))))
                 (countdown 10)",
                num(0.0),
            ),
        ]);
    }

    #[test]
    fn test_builtin_calls() {
        run_cases(vec![
            ("(+ 1 2)", num(3.0)),
            ("(+ 1 2 3)", num(6.0)),
            ("(+)", num(0.0)),
            ("(*)", num(1.0)),
            ("(- 10 3 2)", num(5.0)),
            ("(/ 12 3 2)", num(2.0)),
            ("(rem 7 3)", num(1.0)),
            ("(= 1 1 1)", TRUE),
            ("(< 1 2 3)", TRUE),
            ("(> 1 2)", FALSE),
            ("(not false)", TRUE),
            ("(and true 1)", TRUE),
            ("(or false false)", FALSE),
            ("(len \"hello\")", num(5.0)),
            ("(first (list 1 2 3))", num(1.0)),
            ("(last (list 1 2 3))", num(3.0)),
            ("(rest (list 1 2 3))", Object::list(vec![num(2.0), num(3.0)])),
            ("(len (push (list) 1))", num(1.0)),
            ("(print \"hello\")", NULL),
        ]);
    }

    #[test]
    fn test_value_level_errors_flow_through_the_stack() {
        // Builtins return Error objects; the VM keeps running.
        run_cases(vec![
            ("(len 1)", Object::error("wrong type of argument for len: NUMBER")),
            ("(/ 1 0)", Object::error("Attempted to divide by 0")),
            ("(str (len 1))", string("ERROR: wrong type of argument for len: NUMBER")),
        ]);
    }

    #[test]
    fn test_lists_and_dicts() {
        run_cases(vec![
            ("()", Object::list(vec![])),
            ("(list 1 2)", Object::list(vec![num(1.0), num(2.0)])),
            ("'(1 2)", Object::list(vec![num(1.0), num(2.0)])),
            ("(get { \"a\" 1 } \"a\")", num(1.0)),
            ("(get { \"a\" 1 } \"b\")", NULL),
            ("(get (set { } 2 \"two\") 2)", string("two")),
            (
                "(def xs (list 1))
                 (push! xs 2)
                 xs",
                Object::list(vec![num(1.0), num(2.0)]),
            ),
            (
                "(def xs (list 1 2))
                 (pop! xs)
                 xs",
                Object::list(vec![num(1.0)]),
            ),
            // push copies, the original is untouched
            (
                "(def xs (list 1))
                 (push xs 2)
                 xs",
                Object::list(vec![num(1.0)]),
            ),
        ]);
    }

    #[test]
    fn test_string_builtins() {
        run_cases(vec![
            ("(str 1 2)", string("12")),
            ("(str \"a\")", string("\"a\"")),
            ("(str (list 1 2))", string("(1 2)")),
        ]);
    }

    #[test]
    fn test_wrong_argument_counts_abort() {
        let test_cases = vec![
            ("((lambda () 1) 1)", "wrong number of arguments: expected=0 got=1"),
            (
                "((lambda () 1) 1 2)",
                "wrong number of arguments: expected=0 got=2",
            ),
            ("((lambda (a) a))", "wrong number of arguments: expected=1 got=0"),
            (
                "((lambda (a b) a b) 1)",
                "wrong number of arguments: expected=2 got=1",
            ),
        ];

        for (source, expected) in test_cases {
            match run_source(source) {
                Err(Error::Runtime(message)) => {
                    assert_eq!(message, expected, "for {source:?}")
                }
                other => panic!("expected runtime error for {source:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_calling_a_non_callable_aborts() {
        for source in ["(1 2)", "(\"f\" 1)", "((list 1) 2)"] {
            match run_source(source) {
                Err(Error::Runtime(message)) => {
                    assert_eq!(message, "calling non-lambda and non-builtin", "for {source:?}")
                }
                other => panic!("expected runtime error for {source:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_runaway_recursion_overflows() {
        let source = "(def loop (lambda () (loop))) (loop)";
        match run_source(source) {
            Err(Error::Runtime(message)) => assert_eq!(message, "stack overflow"),
            other => panic!("expected stack overflow, got {other:?}"),
        }
    }

    #[test]
    fn test_globals_survive_across_runs() {
        let mut compiler = Compiler::new();

        let bytecode = compiler.compile(&crate::parse("(def one 1)").unwrap()).unwrap();
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        let globals = vm.into_globals();

        let bytecode = compiler.compile(&crate::parse("(+ one 1)").unwrap()).unwrap();
        let mut vm = Vm::with_globals(bytecode, globals);
        vm.run().unwrap();
        assert_eq!(vm.last_popped(), num(2.0));
    }
}
