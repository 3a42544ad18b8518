//! The interactive shell and file loader: a thin collaborator around the
//! interpreter core. Run with a filename to execute it, or with no
//! arguments for a prompt.

use std::process;
use std::rc::Rc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use larch::compiler::Compiler;
use larch::evaluator::{self, Environment};
use larch::object::Object;
use larch::vm::Vm;

/// Which execution engine the session is using.
#[derive(Clone, Copy, PartialEq)]
enum Engine {
    Vm,
    Walker,
}

fn main() {
    let mut args = std::env::args().skip(1);
    match args.next() {
        Some(path) => run_file(&path),
        None => run_repl(),
    }
}

fn run_file(path: &str) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("could not read {path}: {e}");
            process::exit(1);
        }
    };

    match larch::run(&source) {
        Ok(result) => println!("{result}"),
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

/// A session holds whichever engine state must survive between inputs: the
/// compiler's symbol table plus the VM globals, and the walker's global
/// environment.
struct Session {
    engine: Engine,
    compiler: Compiler,
    globals: Vec<Object>,
    env: Rc<Environment>,
}

impl Session {
    fn new() -> Self {
        Session {
            engine: Engine::Vm,
            compiler: Compiler::new(),
            globals: Vec::new(),
            env: Environment::new(),
        }
    }

    fn eval_line(&mut self, line: &str) -> Result<Object, larch::Error> {
        let program = larch::parse(line)?;

        match self.engine {
            Engine::Vm => {
                let bytecode = self.compiler.compile(&program)?;
                let mut vm = Vm::with_globals(bytecode, std::mem::take(&mut self.globals));
                let outcome = vm.run();
                let result = vm.last_popped();
                self.globals = vm.into_globals();
                outcome?;
                Ok(result)
            }
            Engine::Walker => Ok(evaluator::eval_program(&program, &self.env)),
        }
    }
}

fn run_repl() {
    println!("larch - a small lisp with a bytecode VM and a tree walker");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("could not initialize the line editor: {e}");
            process::exit(1);
        }
    };
    let mut session = Session::new();

    loop {
        match rl.readline("larch> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":engine" => {
                        session.engine = match session.engine {
                            Engine::Vm => Engine::Walker,
                            Engine::Walker => Engine::Vm,
                        };
                        // Definitions live per engine, so switching starts
                        // from that engine's own state.
                        match session.engine {
                            Engine::Vm => println!("engine: bytecode VM"),
                            Engine::Walker => println!("engine: tree walker"),
                        }
                        continue;
                    }
                    ":quit" | ":exit" => break,
                    _ => {}
                }

                match session.eval_line(line) {
                    Ok(result) => println!("{result}"),
                    Err(e) => println!("{e}"),
                }
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help    - show this help");
    println!("  :engine  - toggle between the bytecode VM and the tree walker");
    println!("  :quit    - exit (also :exit, Ctrl+C, Ctrl+D)");
    println!();
    println!("The language:");
    println!("  numbers 1 2.5, strings \"hi\", booleans true/false");
    println!("  special forms: (def name value) (if cond then else) (lambda (a b) body)");
    println!("  lists: (list 1 2), '(1 2), dicts: {{ \"key\" \"value\" }}");
    println!("  builtins: + * - / rem = < > not and or list dict first rest last");
    println!("            len push push! pop! str print get set");
}
