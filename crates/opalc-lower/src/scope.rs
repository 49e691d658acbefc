//! Lexically scoped symbol table.
//!
//! A stack of frames mapping identifiers to IR values (functions, globals,
//! local allocas). `enter`/`exit` push and pop a frame; lookup searches
//! outward so inner declarations shadow outer ones.

use std::collections::HashMap;

use opalc_ir::ValueRef;

/// The symbol table used during lowering.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<HashMap<String, ValueRef>>,
}

impl ScopeStack {
    /// A fresh stack with the single global frame.
    pub fn new() -> Self {
        ScopeStack {
            frames: vec![HashMap::new()],
        }
    }

    pub fn enter(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn exit(&mut self) {
        debug_assert!(self.frames.len() > 1, "popping the global frame");
        self.frames.pop();
    }

    /// `true` while only the global frame is open.
    pub fn in_global(&self) -> bool {
        self.frames.len() == 1
    }

    /// Binds a name in the innermost frame. Returns `false` when the name
    /// was already bound there (the binding is replaced).
    pub fn declare(&mut self, name: &str, value: ValueRef) -> bool {
        self.frames
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), value)
            .is_none()
    }

    /// Searches frames innermost-first.
    pub fn lookup(&self, name: &str) -> Option<ValueRef> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
    }
}
