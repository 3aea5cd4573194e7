use anyhow::Result;

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{Symbol, Val};

use super::error::VmError;

/// Global binding table: symbol -> value for top-level definitions.
///
/// Owned by exactly one [`Vm`](super::Vm); `STG` inserts or replaces,
/// `LDG` fails with `UnboundSymbol` for names never bound.
#[derive(Debug, Clone, Default)]
pub struct GlobalEnv {
    bindings: FastHashMap<Symbol, Val>,
}

impl GlobalEnv {
    pub fn new() -> Self {
        Self {
            bindings: fast_hash_map_new(),
        }
    }

    /// Add or replace a binding, returning the bound value.
    pub fn bind(&mut self, sym: Symbol, value: Val) -> Val {
        self.bindings.insert(sym, value.clone());
        value
    }

    /// Symbol for `name`, sharing the key's allocation when already bound.
    pub fn intern(&self, name: &str) -> Symbol {
        match self.bindings.get_key_value(name) {
            Some((sym, _)) => sym.clone(),
            None => Symbol::new(name),
        }
    }

    #[inline]
    pub fn get(&self, sym: &Symbol) -> Option<&Val> {
        self.bindings.get(sym)
    }

    pub fn value_of(&self, sym: &Symbol) -> Result<Val> {
        match self.bindings.get(sym) {
            Some(val) => Ok(val.clone()),
            None => Err(VmError::UnboundSymbol(sym.name().to_string()).into()),
        }
    }

    #[inline]
    pub fn contains(&self, sym: &Symbol) -> bool {
        self.bindings.contains_key(sym)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}
