//! Lexical environments.
//!
//! A scope starts life on the operand stack: its slots sit directly below a
//! three-slot descriptor `[start, count, link]`, and the environment register
//! holds `EnvRef::Stack(envptr)` pointing at the descriptor. When a scope must
//! outlive its frame it is copied to a [`HeapEnv`] together with every scope
//! it links to, and the descriptor's count slot is overwritten with the heap
//! copy. Any stack reference that still names the old descriptor follows that
//! forward, so a chain can mix stack and heap scopes in either order.

use std::{cell::RefCell, ops::Range, rc::Rc};

use anyhow::Result;

use crate::val::Val;
use crate::vm::error::VmError;

use super::Vm;

pub(crate) const DESCRIPTOR_SLOTS: usize = 3;

/// Heap-resident scope: owned slots plus a link to the enclosing scope.
#[derive(Debug)]
pub struct HeapEnv {
    slots: RefCell<Vec<Val>>,
    parent: Option<Rc<HeapEnv>>,
}

impl HeapEnv {
    pub fn new(slots: Vec<Val>, parent: Option<Rc<HeapEnv>>) -> Self {
        Self {
            slots: RefCell::new(slots),
            parent,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn parent(&self) -> Option<&Rc<HeapEnv>> {
        self.parent.as_ref()
    }

    pub fn get(&self, index: usize) -> Result<Val> {
        let slots = self.slots.borrow();
        slots.get(index).cloned().ok_or_else(|| {
            VmError::HeapEnvironmentIndexExceeded {
                index,
                count: slots.len(),
            }
            .into()
        })
    }

    pub fn set(&self, index: usize, val: Val) -> Result<()> {
        let mut slots = self.slots.borrow_mut();
        let count = slots.len();
        match slots.get_mut(index) {
            Some(slot) => {
                *slot = val;
                Ok(())
            }
            None => Err(VmError::HeapEnvironmentIndexExceeded { index, count }.into()),
        }
    }

    pub fn slots(&self) -> Vec<Val> {
        self.slots.borrow().clone()
    }
}

impl Drop for HeapEnv {
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(env) = next {
            match Rc::try_unwrap(env) {
                Ok(mut env) => next = env.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// Contents of the environment register.
#[derive(Debug, Clone, Default)]
pub enum EnvRef {
    #[default]
    Nil,
    /// Stack index of a scope descriptor.
    Stack(usize),
    Heap(Rc<HeapEnv>),
}

impl EnvRef {
    pub fn from_val(val: &Val) -> Option<Self> {
        match val {
            Val::Nil => Some(EnvRef::Nil),
            Val::StackEnv(ptr) => Some(EnvRef::Stack(*ptr)),
            Val::HeapEnv(env) => Some(EnvRef::Heap(Rc::clone(env))),
            _ => None,
        }
    }

    pub fn to_val(&self) -> Val {
        match self {
            EnvRef::Nil => Val::Nil,
            EnvRef::Stack(ptr) => Val::StackEnv(*ptr),
            EnvRef::Heap(env) => Val::HeapEnv(Rc::clone(env)),
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, EnvRef::Nil)
    }

    #[inline]
    pub fn is_heap(&self) -> bool {
        matches!(self, EnvRef::Heap(_))
    }

    pub fn as_heap(&self) -> Option<&Rc<HeapEnv>> {
        match self {
            EnvRef::Heap(env) => Some(env),
            _ => None,
        }
    }
}

impl From<Option<Rc<HeapEnv>>> for EnvRef {
    fn from(env: Option<Rc<HeapEnv>>) -> Self {
        match env {
            Some(env) => EnvRef::Heap(env),
            None => EnvRef::Nil,
        }
    }
}

/// One scope resolved to where its slots currently live.
pub(crate) enum Scope {
    Stack { start: usize, count: usize, link: EnvRef },
    Heap(Rc<HeapEnv>),
}

fn descriptor_field(val: &Val) -> Result<usize> {
    val.as_fixnum()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| VmError::type_error("environment", "stack environment descriptor", val).into())
}

impl Vm {
    /// Resolve the descriptor at `envptr`, following a heap forward if present.
    pub(crate) fn scope(&self, envptr: usize) -> Result<Scope> {
        let count_slot = self.stack_index(envptr + 1)?;
        if let Val::HeapEnv(env) = count_slot {
            return Ok(Scope::Heap(Rc::clone(env)));
        }
        let start = descriptor_field(self.stack_index(envptr)?)?;
        let count = descriptor_field(count_slot)?;
        if start + count > envptr {
            return Err(VmError::type_error("environment", "stack environment descriptor", count_slot).into());
        }
        let link_slot = self.stack_index(envptr + 2)?;
        let link =
            EnvRef::from_val(link_slot).ok_or_else(|| VmError::type_error("environment", "environment link", link_slot))?;
        Ok(Scope::Stack { start, count, link })
    }

    /// Stack slots occupied by the scope whose descriptor is at `envptr`,
    /// descriptor included. Still valid after the scope has been forwarded.
    pub(crate) fn env_region(&self, envptr: usize) -> Result<Range<usize>> {
        let start = descriptor_field(self.stack_index(envptr)?)?;
        Ok(start..envptr + DESCRIPTOR_SLOTS)
    }

    fn enclosing(&self, scope: &Scope) -> EnvRef {
        match scope {
            Scope::Stack { link, .. } => link.clone(),
            Scope::Heap(env) => EnvRef::from(env.parent().cloned()),
        }
    }

    fn resolve(&self, env: &EnvRef) -> Result<Option<Scope>> {
        match env {
            EnvRef::Nil => Ok(None),
            EnvRef::Stack(envptr) => self.scope(*envptr).map(Some),
            EnvRef::Heap(env) => Ok(Some(Scope::Heap(Rc::clone(env)))),
        }
    }

    /// Walk `depth` links out from the current environment.
    fn find_scope(&self, depth: usize) -> Result<Scope> {
        let mut env = self.env.clone();
        for _ in 0..depth {
            match self.resolve(&env)? {
                Some(scope) => env = self.enclosing(&scope),
                None => break,
            }
        }
        self.resolve(&env)?
            .ok_or_else(|| VmError::EnvironmentDepthExceeded { depth }.into())
    }

    /// Build a stack environment from the top `prev_size` pushed values plus
    /// `extra_size` fresh unbound slots, and make it current.
    pub fn mkenv(&mut self, prev_size: usize, extra_size: usize) -> Result<()> {
        self.ensure_room(extra_size + DESCRIPTOR_SLOTS)?;
        for _ in 0..extra_size {
            self.push_unchecked(Val::Unbound);
        }
        let count = prev_size + extra_size;
        let start = self.sp.checked_sub(count).ok_or(VmError::StackUnderflow)?;
        let envptr = self.sp;
        let link = self.env.to_val();
        self.push_unchecked(Val::Fixnum(start as i64));
        self.push_unchecked(Val::Fixnum(count as i64));
        self.push_unchecked(link);
        self.env = EnvRef::Stack(envptr);
        Ok(())
    }

    pub fn lookup(&self, depth: usize, index: usize) -> Result<Val> {
        match self.find_scope(depth)? {
            Scope::Stack { start, count, .. } => {
                if index >= count {
                    return Err(VmError::StackEnvironmentIndexExceeded { index, count }.into());
                }
                Ok(self.stack_index(start + index)?.clone())
            }
            Scope::Heap(env) => env.get(index),
        }
    }

    pub fn store(&mut self, depth: usize, index: usize, val: Val) -> Result<()> {
        match self.find_scope(depth)? {
            Scope::Stack { start, count, .. } => {
                if index >= count {
                    return Err(VmError::StackEnvironmentIndexExceeded { index, count }.into());
                }
                self.set_stack_index(start + index, val)
            }
            Scope::Heap(env) => env.set(index, val),
        }
    }

    /// Move the current environment, and every scope it links to, to the heap.
    /// Returns the new register contents; a no-op for heap or nil environments.
    pub fn heapify_env(&mut self) -> Result<EnvRef> {
        self.env = EnvRef::from(self.promote_env()?);
        Ok(self.env.clone())
    }

    /// Heap copy of the current environment chain. The register keeps naming
    /// the (now forwarded) stack descriptor, so `MENV` can still release it.
    pub(crate) fn promote_env(&mut self) -> Result<Option<Rc<HeapEnv>>> {
        let env = self.env.clone();
        let mut regions = Vec::new();
        self.heapify_env_chain(&env, &mut regions)
    }

    /// Heapify the chain starting at `env`, outermost scope first. The stack
    /// region of every stack scope met on the way (forwarded or not) is
    /// appended to `regions`.
    pub(crate) fn heapify_env_chain(
        &mut self,
        env: &EnvRef,
        regions: &mut Vec<Range<usize>>,
    ) -> Result<Option<Rc<HeapEnv>>> {
        let mut pending = Vec::new();
        let mut cur = env.clone();
        let mut parent = loop {
            match cur {
                EnvRef::Nil => break None,
                EnvRef::Heap(env) => break Some(env),
                EnvRef::Stack(envptr) => {
                    regions.push(self.env_region(envptr)?);
                    match self.scope(envptr)? {
                        Scope::Heap(env) => {
                            self.forwarded_regions(envptr, regions)?;
                            break Some(env);
                        }
                        Scope::Stack { start, count, link } => {
                            pending.push((envptr, start, count));
                            cur = link;
                        }
                    }
                }
            }
        };
        for (envptr, start, count) in pending.into_iter().rev() {
            let slots = self.stack[start..start + count].to_vec();
            let env = Rc::new(HeapEnv::new(slots, parent.take()));
            self.stack[envptr + 1] = Val::HeapEnv(Rc::clone(&env));
            self.stats.envs_heapified += 1;
            parent = Some(env);
        }
        Ok(parent)
    }

    /// Ancestors of a forwarded scope were promoted along with it; their
    /// descriptors still hold the old stack links, which give their regions.
    fn forwarded_regions(&self, envptr: usize, regions: &mut Vec<Range<usize>>) -> Result<()> {
        let mut link = self.stack_index(envptr + 2)?;
        while let Val::StackEnv(ptr) = link {
            regions.push(self.env_region(*ptr)?);
            link = self.stack_index(*ptr + 2)?;
        }
        Ok(())
    }
}
