use std::fmt::{self, Write};
use std::ops::{Deref, DerefMut};

use indexmap::IndexMap;
use log::trace;
use thiserror::Error;

use crate::lexer::Position;
use crate::value::Value;

use super::Ty;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("cannot exit scope '{0}': it has no parent")]
    NoParentScope(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Clone, Debug, PartialEq)]
pub struct SymbolEntry {
    pub name: String,
    pub ty: Ty,
    pub value: Option<Value>,
    pub initialized: bool,
    /// Declaration position, `0` when unknown.
    pub line: usize,
    pub col: usize,
    pub address: Option<String>,
    pub size_bytes: usize,
    /// Negative for locals, positive for parameters.
    pub stack_offset: i64,
    pub is_global: bool,
    pub is_parameter: bool,
}

impl SymbolEntry {
    fn new(name: &str, ty: Ty, line: usize, col: usize) -> Self {
        Self {
            name: name.to_string(),
            ty,
            value: None,
            initialized: false,
            line,
            col,
            address: None,
            size_bytes: ty.sizeof(),
            stack_offset: 0,
            is_global: false,
            is_parameter: false,
        }
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = Some(value);
        self.initialized = true;
    }
}

impl fmt::Display for SymbolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<12} {:<8}", self.name, self.ty.to_string())?;
        if let Some(address) = &self.address {
            write!(f, " @{:<12}", address)?;
        }
        if let (true, Some(value)) = (self.initialized, self.value) {
            write!(f, " = {}", value)?;
        }
        if self.is_global {
            write!(f, " [GLOBAL]")?;
        }
        if self.is_parameter {
            write!(f, " [PARAM]")?;
        }
        write!(f, " (line {}, col {})", self.line, self.col)
    }
}

/// Code generation details attached to a symbol at declaration time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Storage {
    pub address: String,
    pub size_bytes: usize,
    pub stack_offset: i64,
    pub is_global: bool,
    pub is_parameter: bool,
    /// Where the name was declared in the source.
    pub pos: Position,
}

impl Storage {
    /// A local slot at `-offset(%rbp)`.
    pub fn local(offset: i64, size_bytes: usize) -> Self {
        Self {
            address: format!("-{}(%rbp)", offset),
            size_bytes,
            stack_offset: -offset,
            ..Default::default()
        }
    }

    /// A caller-pushed argument at `offset(%rbp)`.
    pub fn parameter(offset: i64, size_bytes: usize) -> Self {
        Self {
            address: format!("{}(%rbp)", offset),
            size_bytes,
            stack_offset: offset,
            is_parameter: true,
            ..Default::default()
        }
    }

    pub fn at(mut self, pos: Position) -> Self {
        self.pos = pos;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub name: String,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub symbols: IndexMap<String, SymbolEntry>,
    pub level: usize,
}

impl Scope {
    fn new(name: String, parent: Option<(ScopeId, usize)>) -> Self {
        Self {
            name,
            parent: parent.map(|(id, _)| id),
            children: vec![],
            symbols: IndexMap::new(),
            level: parent.map_or(0, |(_, level)| level + 1),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scope[{}] (level={}, symbols={})",
            self.name,
            self.level,
            self.symbols.len()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statistics {
    pub total_scopes: usize,
    pub total_symbols: usize,
    pub current_scope: String,
    pub current_level: usize,
    pub stack_offset: i64,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total scopes:        {}", self.total_scopes)?;
        writeln!(f, "Total symbols:       {}", self.total_symbols)?;
        writeln!(f, "Current scope:       {}", self.current_scope)?;
        writeln!(f, "Current scope level: {}", self.current_level)?;
        write!(f, "Stack offset:        {}", self.stack_offset)
    }
}

/// A tree of lexical scopes with a cursor on the active one.
///
/// Scopes live in an arena and refer to each other through [`ScopeId`]s.
/// The root scope is called `global` and is never removed.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: ScopeId,
    scope_counter: usize,
    stack_offset: i64,
}

const ROOT: ScopeId = ScopeId(0);

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new("global".to_string(), None)],
            current: ROOT,
            scope_counter: 0,
            stack_offset: 0,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn root(&self) -> ScopeId {
        ROOT
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    pub fn current_scope(&self) -> &Scope {
        &self.scopes[self.current.0]
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0)
    }

    pub fn current_level(&self) -> usize {
        self.current_scope().level
    }

    fn create_scope(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        self.scope_counter += 1;
        let full_name = format!("{}_{}", name, self.scope_counter);
        let id = ScopeId(self.scopes.len());
        let level = self.scopes[parent.0].level;

        trace!("enter scope {} (level {})", full_name, level + 1);
        self.scopes
            .push(Scope::new(full_name, Some((parent, level))));
        self.scopes[parent.0].children.push(id);
        self.current = id;
        id
    }

    /// Opens a child of the current scope. Leaving the guard returns to the
    /// scope that was active before.
    pub fn enter_scope(&mut self, name: &str) -> ScopeGuard<'_> {
        let previous = self.current;
        let scope = self.create_scope(previous, name);
        ScopeGuard {
            table: self,
            scope,
            previous,
            transient: None,
        }
    }

    /// Like [`enter_scope`](Self::enter_scope), but the new scope and
    /// everything created under it is dropped with the guard.
    pub fn enter_transient_scope(&mut self, name: &str) -> ScopeGuard<'_> {
        let parent = self.current;
        self.enter_transient_scope_under(parent, name)
    }

    pub fn enter_transient_scope_under(&mut self, parent: ScopeId, name: &str) -> ScopeGuard<'_> {
        let previous = self.current;
        let transient = Transient {
            arena_len: self.scopes.len(),
            scope_counter: self.scope_counter,
            parent,
        };
        let scope = self.create_scope(parent, name);
        ScopeGuard {
            table: self,
            scope,
            previous,
            transient: Some(transient),
        }
    }

    /// Moves the cursor to the parent of the current scope.
    pub fn exit_scope(&mut self) -> Result<ScopeId, SymbolError> {
        let scope = self.current_scope();
        let parent = scope
            .parent
            .ok_or_else(|| SymbolError::NoParentScope(scope.name.clone()))?;
        trace!("exit scope {}", scope.name);
        self.current = parent;
        Ok(parent)
    }

    pub fn declare(&mut self, name: &str, ty: Ty, line: usize, col: usize) -> bool {
        let scope = &mut self.scopes[self.current.0];
        if scope.symbols.contains_key(name) {
            return false;
        }
        trace!("declare {} {} in {}", ty, name, scope.name);
        scope
            .symbols
            .insert(name.to_string(), SymbolEntry::new(name, ty, line, col));
        true
    }

    pub fn declare_with_storage(&mut self, name: &str, ty: Ty, storage: Storage) -> bool {
        if !self.declare(name, ty, storage.pos.line, storage.pos.col) {
            return false;
        }
        if let Some(entry) = self.scopes[self.current.0].symbols.get_mut(name) {
            entry.address = Some(storage.address);
            entry.size_bytes = storage.size_bytes;
            entry.stack_offset = storage.stack_offset;
            entry.is_global = storage.is_global;
            entry.is_parameter = storage.is_parameter;
        }
        true
    }

    fn resolve(&self, name: &str) -> Option<ScopeId> {
        let mut id = Some(self.current);
        while let Some(scope_id) = id {
            let scope = &self.scopes[scope_id.0];
            if scope.symbols.contains_key(name) {
                return Some(scope_id);
            }
            id = scope.parent;
        }
        None
    }

    /// Finds the nearest declaration of `name`, walking outwards.
    pub fn lookup(&self, name: &str) -> Option<&SymbolEntry> {
        let id = self.resolve(name)?;
        self.scopes[id.0].symbols.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut SymbolEntry> {
        let id = self.resolve(name)?;
        self.scopes[id.0].symbols.get_mut(name)
    }

    pub fn lookup_local(&self, name: &str) -> Option<&SymbolEntry> {
        self.current_scope().symbols.get(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn exists_local(&self, name: &str) -> bool {
        self.current_scope().symbols.contains_key(name)
    }

    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.lookup_mut(name) {
            Some(entry) => {
                entry.set_value(value);
                true
            }
            None => false,
        }
    }

    pub fn allocate_stack_space(&mut self, size: usize) -> i64 {
        self.stack_offset += size as i64;
        self.stack_offset
    }

    pub fn reset_stack_offset(&mut self) {
        self.stack_offset = 0;
    }

    pub fn stack_offset(&self) -> i64 {
        self.stack_offset
    }

    pub(crate) fn set_stack_offset(&mut self, offset: i64) {
        self.stack_offset = offset;
    }

    pub fn statistics(&self) -> Statistics {
        let scope = self.current_scope();
        Statistics {
            total_scopes: self.scopes.len(),
            total_symbols: self.scopes.iter().map(|s| s.symbols.len()).sum(),
            current_scope: scope.name.clone(),
            current_level: scope.level,
            stack_offset: self.stack_offset,
        }
    }

    /// Renders every scope depth-first, indented by level.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_scope(&mut out, ROOT);
        out
    }

    fn dump_scope(&self, out: &mut String, id: ScopeId) {
        let scope = &self.scopes[id.0];
        let indent = "  ".repeat(scope.level);
        let _ = writeln!(out, "{indent}├─ {scope}");
        for entry in scope.symbols.values() {
            let _ = writeln!(out, "{indent}│  └─ {entry}");
        }
        for child in &scope.children {
            self.dump_scope(out, *child);
        }
    }
}

#[derive(Debug)]
struct Transient {
    arena_len: usize,
    scope_counter: usize,
    parent: ScopeId,
}

/// Keeps a scope open for as long as it lives.
///
/// Derefs to the [`SymbolTable`], so the open scope is used through the guard.
#[derive(Debug)]
pub struct ScopeGuard<'a> {
    table: &'a mut SymbolTable,
    scope: ScopeId,
    previous: ScopeId,
    transient: Option<Transient>,
}

impl ScopeGuard<'_> {
    /// The scope this guard opened.
    pub fn id(&self) -> ScopeId {
        self.scope
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = SymbolTable;

    fn deref(&self) -> &SymbolTable {
        self.table
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut SymbolTable {
        self.table
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(scope) = self.table.scopes.get(self.scope.0) {
            trace!("leave scope {}", scope.name);
        }
        if let Some(t) = self.transient.take() {
            self.table.scopes.truncate(t.arena_len);
            self.table.scope_counter = t.scope_counter;
            if let Some(parent) = self.table.scopes.get_mut(t.parent.0) {
                parent.children.retain(|&child| child != self.scope);
            }
        }
        self.table.current = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_rejects_duplicates_in_same_scope() {
        let mut table = SymbolTable::new();
        assert!(table.declare("x", Ty::Int, 1, 5));
        assert!(!table.declare("x", Ty::Bool, 2, 5));
        assert_eq!(table.lookup("x").map(|e| e.ty), Some(Ty::Int));
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        table.declare("x", Ty::Int, 0, 0);
        table.assign("x", Value::Int(1));
        {
            let mut scope = table.enter_scope("block");
            assert!(scope.declare("x", Ty::Bool, 0, 0));
            assert!(scope.assign("x", Value::Bool(true)));
            assert_eq!(scope.lookup("x").map(|e| e.ty), Some(Ty::Bool));
            assert!(scope.exists("x"));
            assert!(!scope.exists_local("y"));
        }
        assert_eq!(table.lookup("x").and_then(|e| e.value), Some(Value::Int(1)));
    }

    #[test]
    fn guards_restore_the_previous_scope() {
        let mut table = SymbolTable::new();
        let before = table.current();
        {
            let mut a = table.enter_scope("a");
            {
                let b = a.enter_scope("b");
                assert_eq!(b.current_level(), 2);
                assert_eq!(b.current_scope().name, "b_2");
            }
            assert_eq!(a.current_scope().name, "a_1");
        }
        assert_eq!(table.current(), before);
        assert_eq!(table.statistics().total_scopes, 3);
    }

    #[test]
    fn transient_scopes_are_discarded() {
        let mut table = SymbolTable::new();
        let root = table.root();
        {
            let mut sim = table.enter_transient_scope_under(root, "call");
            sim.declare("tmp", Ty::Int, 0, 0);
            let _nested = sim.enter_scope("while_body");
        }
        let stats = table.statistics();
        assert_eq!(stats.total_scopes, 1);
        assert_eq!(stats.total_symbols, 0);
        assert!(table.current_scope().children.is_empty());
    }

    #[test]
    fn exit_scope_fails_at_root() {
        let mut table = SymbolTable::new();
        assert_eq!(
            table.exit_scope(),
            Err(SymbolError::NoParentScope("global".to_string()))
        );
    }

    #[test]
    fn storage_is_attached_on_declare() {
        let mut table = SymbolTable::new();
        let offset = table.allocate_stack_space(8);
        let storage = Storage::local(offset, 8).at(Position::new(2, 9));
        assert!(table.declare_with_storage("x", Ty::Int, storage));
        assert!(table.declare_with_storage("n", Ty::Int, Storage::parameter(16, 8)));
        assert!(!table.declare_with_storage("x", Ty::Int, Storage::local(16, 8)));

        let x = table.lookup("x").unwrap();
        assert_eq!(x.address.as_deref(), Some("-8(%rbp)"));
        assert_eq!(x.stack_offset, -8);
        assert_eq!((x.line, x.col), (2, 9));
        assert!(table.lookup("n").unwrap().is_parameter);
        assert_eq!(table.stack_offset(), 8);

        table.reset_stack_offset();
        assert_eq!(table.stack_offset(), 0);
    }

    #[test]
    fn dump_lists_scopes_and_symbols() {
        let mut table = SymbolTable::new();
        let mut scope = table.enter_scope("main");
        scope.declare("flag", Ty::Bool, 3, 10);
        scope.assign("flag", Value::Bool(true));
        let dump = scope.dump();
        assert!(dump.contains("Scope[global] (level=0, symbols=0)"));
        assert!(dump.contains("  ├─ Scope[main_1] (level=1, symbols=1)"));
        assert!(dump.contains("= true"));
        assert!(dump.contains("(line 3, col 10)"));
    }
}
