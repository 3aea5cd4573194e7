//! Calling convention: APPLY over every callee kind, and the callee-side
//! frame setup done by ENV, ENVR and MENV.

use std::{mem, rc::Rc};

use anyhow::Result;

use crate::val::{Arity, Primitive, PrimitiveBody, Val, list_from_iter};
use crate::vm::error::VmError;
use crate::vm::vm::env::Scope;
use crate::vm::vm::{ContRef, EnvRef, Vm};

impl Vm {
    /// Apply the accumulator to the top `argc` stack values.
    ///
    /// Closures jump to their entry with their captured environment and leave
    /// argument handling to the callee's `ENV`/`ENVR`. Everything else
    /// produces its result immediately and returns through the continuation.
    pub fn apply(&mut self, argc: usize) -> Result<()> {
        self.argc = argc;
        let callee = self.acc.clone();
        match &callee {
            Val::Closure(closure) => {
                self.env = EnvRef::from(closure.env.clone());
                self.ip = closure.entry;
                Ok(())
            }
            Val::Primitive(prim) => self.apply_primitive(prim),
            Val::Cont(k) => {
                self.argcheck(Arity::exact(1))?;
                self.acc = self.pop()?;
                self.cont = ContRef::Heap(Rc::clone(k));
                self.restore_continuation()
            }
            Val::Cons(_) => {
                self.argcheck(Arity::exact(1))?;
                let index = self.pop()?;
                self.acc = list_ref(&callee, &index)?;
                self.restore_continuation()
            }
            Val::Vector(items) => {
                self.argcheck(Arity::exact(1))?;
                let index = self.pop()?;
                let found = index
                    .as_fixnum()
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| items.borrow().get(i).cloned());
                self.acc = found.ok_or_else(|| VmError::type_error("APPLY", "vector index in range", &index))?;
                self.restore_continuation()
            }
            other => Err(VmError::type_error("APPLY", "callable", other).into()),
        }
    }

    fn apply_primitive(&mut self, prim: &Primitive) -> Result<()> {
        self.argcheck(prim.arity)?;
        match &prim.body {
            PrimitiveBody::Native(f) => {
                let args = self.pop_args(self.argc)?;
                self.acc = f(&args)?;
                self.restore_continuation()
            }
            PrimitiveBody::CallCc => {
                let receiver = self.pop()?;
                let k = self.capture_continuation()?;
                self.push(k)?;
                self.acc = receiver;
                self.apply(1)
            }
        }
    }

    /// `ENV`: fixed arity with `optional` trailing optionals. Missing
    /// optionals start out unbound.
    pub(crate) fn enter_env(&mut self, min: usize, extra: usize, optional: usize) -> Result<()> {
        let max = min + optional;
        self.argcheck(Arity::range(min, max))?;
        let argc = self.argc;
        self.mkenv(argc, max - argc + extra)
    }

    /// `ENVR`: like `ENV`, plus a final slot holding the remaining arguments
    /// as a list.
    pub(crate) fn enter_env_rest(&mut self, min: usize, extra: usize, optional: usize) -> Result<()> {
        self.argcheck(Arity::at_least(min))?;
        let fixed = min + optional;
        let argc = self.argc;
        if argc > fixed {
            let rest = self.pop_args(argc - fixed)?;
            self.push(list_from_iter(rest))?;
        } else {
            for _ in argc..fixed {
                self.push(Val::Unbound)?;
            }
            self.push(Val::Nil)?;
        }
        self.mkenv(fixed + 1, extra)
    }

    /// `MENV n`: drop the current stack scope under the top `n` values so a
    /// tail call reuses its space, then continue in the enclosing scope. A
    /// forwarded scope's stack region is released the same way; a scope that
    /// lives only on the heap leaves the stack alone.
    pub(crate) fn merge_env(&mut self, n: usize) -> Result<()> {
        let envptr = match &self.env {
            EnvRef::Nil => return Ok(()),
            EnvRef::Heap(env) => {
                self.env = EnvRef::from(env.parent().cloned());
                return Ok(());
            }
            EnvRef::Stack(envptr) => *envptr,
        };
        let (start, link) = match self.scope(envptr)? {
            Scope::Heap(env) => (self.env_region(envptr)?.start, EnvRef::from(env.parent().cloned())),
            Scope::Stack { start, link, .. } => (start, link),
        };
        let from = self.sp.checked_sub(n).ok_or(VmError::StackUnderflow)?;
        let frame_above = matches!(self.cont, ContRef::Stack(ptr) if ptr > start);
        if from >= envptr && !frame_above {
            for i in 0..n {
                self.stack[start + i] = mem::take(&mut self.stack[from + i]);
            }
            self.truncate_to(start + n);
        }
        self.env = link;
        Ok(())
    }
}

/// Element `index` of a list, nil past the end.
fn list_ref(list: &Val, index: &Val) -> Result<Val> {
    let Some(n) = index.as_fixnum().and_then(|i| usize::try_from(i).ok()) else {
        return Err(VmError::type_error("APPLY", "non-negative fixnum index", index).into());
    };
    let mut cur = list.clone();
    for _ in 0..n {
        cur = match &cur {
            Val::Cons(cell) => cell.cdr(),
            _ => return Ok(Val::Nil),
        };
    }
    match &cur {
        Val::Cons(cell) => Ok(cell.car()),
        _ => Ok(Val::Nil),
    }
}
