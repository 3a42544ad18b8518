//! Lexical scopes for the compiler.
//!
//! A table is either the root (Global scope) or an enclosed table (Local
//! scope) created for a lambda body. Indices count from 0 separately in
//! every table, so nested lambdas reuse slot 0. Resolution walks outward;
//! when a name is found in an enclosing *local* scope it is recorded as a
//! free variable of the current table, which is how the compiler knows what
//! a closure must capture.
//!
//! Tables own their outer table through a `Box`: entering a scope moves the
//! current table inside the new one and leaving moves it back out, so no
//! shared mutable pointers are involved.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    /// Captured from an enclosing local scope; the index points into the
    /// closure's free-value list.
    Free,
    /// A builtin function; the index is its registry position.
    Builtin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..SymbolTable::default()
        }
    }

    /// Recover the outer table when leaving a scope. `None` on the root.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|boxed| *boxed)
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Count of names defined directly in this table (parameters included).
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// The symbols this scope captures from enclosing local scopes, in
    /// capture order. Their positions are `LoadFree` operands.
    pub fn free_symbols(&self) -> &[Symbol] {
        &self.free_symbols
    }

    /// Bind a name to the next unused slot in this table's scope.
    /// Redefining a name reuses the new slot; inner definitions shadow
    /// outer ones.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.is_global() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Register a builtin at its registry position. Only meaningful on the
    /// root table, where the compiler seeds the registry once.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Look a name up in this table or any enclosing table. A hit in an
    /// enclosing local scope is converted into a free symbol of this table
    /// (recursively, so captures propagate through every intermediate
    /// lambda).
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer_symbol = self.outer.as_mut()?.resolve(name)?;
        match outer_symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(outer_symbol),
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(outer_symbol)),
        }
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }
}
