//! The bytecode compiler: AST to an instruction stream plus constant pool.
//!
//! The compiler keeps a stack of compilation scopes, one per lambda body
//! being compiled, with the innermost scope receiving emissions. The symbol
//! table is pushed to an enclosed table on scope entry and popped on exit,
//! so name resolution always matches the scope under compilation.
//!
//! A `Compiler` retains its symbol table and constant pool across
//! [`Compiler::compile`] calls, which is what lets a REPL keep global
//! definitions alive from line to line.

use std::rc::Rc;

use crate::Error;
use crate::ast::{Expression, Program};
use crate::builtins;
use crate::code::{self, Instructions, Op};
use crate::object::{CompiledFunction, Object};
use crate::symbol_table::{Symbol, SymbolScope, SymbolTable};

/// The unit of compilation handed to the VM.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}

#[derive(Default)]
struct CompilationScope {
    instructions: Instructions,
}

pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in builtins::BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Compiler {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Compile a program into bytecode. Global symbols and constants persist
    /// on the compiler, so subsequent calls see earlier definitions.
    pub fn compile(&mut self, program: &Program) -> Result<Bytecode, Error> {
        self.scopes = vec![CompilationScope::default()];
        // A failed earlier compile may have left the table mid-lambda.
        while !self.symbol_table.is_global() {
            let table = std::mem::take(&mut self.symbol_table);
            self.symbol_table = table.into_outer().unwrap_or_default();
        }

        for expr in &program.expressions {
            self.compile_expression(expr)?;
            // def leaves nothing on the stack, so there is nothing to pop.
            if !is_def(expr) {
                self.emit(Op::Pop, &[]);
            }
        }

        Ok(Bytecode {
            instructions: self.scopes[0].instructions.clone(),
            constants: self.constants.clone(),
        })
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), Error> {
        match expr {
            Expression::Float(value) => {
                let idx = self.add_constant(Object::Number(*value))?;
                self.emit(Op::LoadConst, &[idx]);
            }
            Expression::Str(s) => {
                let idx = self.add_constant(Object::Str(s.clone()))?;
                self.emit(Op::LoadConst, &[idx]);
            }
            Expression::Ident(name) => self.compile_identifier(name)?,
            Expression::SExpression { func: None, .. } => {
                // The empty form () denotes the empty list.
                self.emit(Op::LoadBuiltin, &[builtins::position("list")]);
                self.emit(Op::Call, &[0]);
            }
            Expression::SExpression {
                func: Some(head),
                args,
            } => {
                if let Expression::Ident(name) = head.as_ref() {
                    match name.as_str() {
                        "def" => return self.compile_def(args),
                        "if" => return self.compile_if(args),
                        "lambda" => return self.compile_lambda(args),
                        _ => {}
                    }
                }
                self.compile_call(head, args)?;
            }
        }
        Ok(())
    }

    fn compile_identifier(&mut self, name: &str) -> Result<(), Error> {
        match name {
            "true" => {
                self.emit(Op::LoadTrue, &[]);
                return Ok(());
            }
            "false" => {
                self.emit(Op::LoadFalse, &[]);
                return Ok(());
            }
            _ => {}
        }

        match self.symbol_table.resolve(name) {
            Some(symbol) => {
                self.load_symbol(&symbol);
                Ok(())
            }
            None => Err(Error::Compile(format!("undefined name: {name}"))),
        }
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::LoadGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::LoadLocal, &[symbol.index]),
            SymbolScope::Free => self.emit(Op::LoadFree, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::LoadBuiltin, &[symbol.index]),
        };
    }

    /// `(def NAME VALUE)`: bind a name in the current scope. Leaves nothing
    /// on the stack. The name is defined before its value is compiled so a
    /// global lambda can refer to itself.
    fn compile_def(&mut self, args: &[Expression]) -> Result<(), Error> {
        let [Expression::Ident(name), value] = args else {
            return Err(Error::Compile(
                "def requires an identifier and a value".to_string(),
            ));
        };

        let symbol = self.symbol_table.define(name);
        self.compile_value_of(value)?;
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::DefineGlobal, &[symbol.index]),
            _ => self.emit(Op::DefineLocal, &[symbol.index]),
        };
        Ok(())
    }

    /// `(if COND THEN [ELSE])`: a missing alternative yields null.
    fn compile_if(&mut self, args: &[Expression]) -> Result<(), Error> {
        if args.len() != 2 && args.len() != 3 {
            return Err(Error::Compile(format!(
                "if requires a condition and a consequence, got {} arguments",
                args.len()
            )));
        }

        self.compile_value_of(&args[0])?;
        let jump_to_alt = self.emit(Op::JumpIfFalse, &[0xffff]);

        self.compile_value_of(&args[1])?;
        let jump_to_end = self.emit(Op::Jump, &[0xffff]);

        let alt_position = self.current_position();
        self.patch_jump(jump_to_alt, alt_position)?;

        match args.get(2) {
            Some(alternative) => self.compile_value_of(alternative)?,
            None => {
                self.emit(Op::LoadNull, &[]);
            }
        }

        let end_position = self.current_position();
        self.patch_jump(jump_to_end, end_position)?;
        Ok(())
    }

    /// `(lambda (PARAMS...) BODY...)`: compiles the body in a fresh scope
    /// and emits a Closure instruction capturing the body's free variables.
    fn compile_lambda(&mut self, args: &[Expression]) -> Result<(), Error> {
        let Some((params_expr, body)) = args.split_first() else {
            return Err(Error::Compile(
                "lambda requires a parameter list".to_string(),
            ));
        };
        let Some(params) = params_expr.parameter_names() else {
            return Err(Error::Compile(
                "lambda parameters must be identifiers".to_string(),
            ));
        };
        if params.len() > u8::MAX as usize {
            return Err(Error::Compile(format!(
                "too many parameters: {}",
                params.len()
            )));
        }

        self.enter_scope();
        for param in &params {
            self.symbol_table.define(param);
        }

        if body.is_empty() {
            self.emit(Op::LoadNull, &[]);
        } else {
            let last = body.len() - 1;
            for (i, expr) in body.iter().enumerate() {
                if i == last {
                    self.compile_value_of(expr)?;
                } else {
                    self.compile_expression(expr)?;
                    if !is_def(expr) {
                        self.emit(Op::Pop, &[]);
                    }
                }
            }
        }
        self.emit(Op::ReturnValue, &[]);

        let num_locals = self.symbol_table.num_definitions();
        let free_symbols = self.symbol_table.free_symbols().to_vec();
        let instructions = self.leave_scope();

        if free_symbols.len() > u8::MAX as usize {
            return Err(Error::Compile(format!(
                "too many captured variables: {}",
                free_symbols.len()
            )));
        }
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let func = Object::CompiledFunction(Rc::new(CompiledFunction {
            instructions,
            num_locals,
            num_params: params.len(),
        }));
        let idx = self.add_constant(func)?;
        self.emit(Op::Closure, &[idx, free_symbols.len()]);
        Ok(())
    }

    fn compile_call(&mut self, head: &Expression, args: &[Expression]) -> Result<(), Error> {
        if args.len() > u8::MAX as usize {
            return Err(Error::Compile(format!(
                "too many arguments in call: {}",
                args.len()
            )));
        }

        self.compile_value_of(head)?;
        for arg in args {
            self.compile_value_of(arg)?;
        }
        self.emit(Op::Call, &[args.len()]);
        Ok(())
    }

    /// Compile an expression in a position that needs a value on the stack.
    /// A def leaves nothing, so one is supplied.
    fn compile_value_of(&mut self, expr: &Expression) -> Result<(), Error> {
        self.compile_expression(expr)?;
        if is_def(expr) {
            self.emit(Op::LoadNull, &[]);
        }
        Ok(())
    }

    fn add_constant(&mut self, object: Object) -> Result<usize, Error> {
        // Plain literals are deduplicated; compiled functions are always
        // distinct.
        if matches!(object, Object::Number(_) | Object::Str(_)) {
            if let Some(idx) = self.constants.iter().position(|existing| *existing == object) {
                return Ok(idx);
            }
        }
        if self.constants.len() > u16::MAX as usize {
            return Err(Error::Compile("too many constants".to_string()));
        }
        self.constants.push(object);
        Ok(self.constants.len() - 1)
    }

    /// Append one instruction to the active scope, returning its position.
    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let encoded = code::make(op, operands);
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        let position = scope.instructions.len();
        scope.instructions.extend(encoded);
        position
    }

    fn current_position(&self) -> usize {
        self.scopes
            .last()
            .expect("scope stack is never empty")
            .instructions
            .len()
    }

    /// Rewrite the u16 operand of the jump emitted at `position`.
    fn patch_jump(&mut self, position: usize, target: usize) -> Result<(), Error> {
        if target > u16::MAX as usize {
            return Err(Error::Compile("jump target out of range".to_string()));
        }
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        scope.instructions[position + 1..position + 3]
            .copy_from_slice(&(target as u16).to_be_bytes());
        Ok(())
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack is never empty");
        let table = std::mem::take(&mut self.symbol_table);
        self.symbol_table = table.into_outer().unwrap_or_default();
        scope.instructions
    }
}

fn is_def(expr: &Expression) -> bool {
    let Expression::SExpression {
        func: Some(head), ..
    } = expr
    else {
        return false;
    };
    matches!(head.as_ref(), Expression::Ident(name) if name == "def")
}
