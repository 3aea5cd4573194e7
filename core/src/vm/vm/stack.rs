use std::mem;

use anyhow::Result;

use crate::val::Val;
use crate::vm::error::VmError;

use super::Vm;

impl Vm {
    /// Push onto the operand stack. A full stack is reclaimed once; if that
    /// does not free a slot the push fails with `StackOverflow`.
    pub fn push(&mut self, val: Val) -> Result<()> {
        self.ensure_room(1)?;
        self.push_unchecked(val);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Val> {
        if self.sp == 0 {
            return Err(VmError::StackUnderflow.into());
        }
        self.sp -= 1;
        Ok(mem::take(&mut self.stack[self.sp]))
    }

    /// Value at the top of the stack, without popping it.
    pub fn top(&self) -> Result<&Val> {
        match self.sp.checked_sub(1) {
            Some(index) => Ok(&self.stack[index]),
            None => Err(VmError::StackUnderflow.into()),
        }
    }

    pub fn stack_index(&self, index: usize) -> Result<&Val> {
        if index < self.sp {
            Ok(&self.stack[index])
        } else {
            Err(VmError::StackIndexOutOfRange { index, sp: self.sp }.into())
        }
    }

    pub fn set_stack_index(&mut self, index: usize, val: Val) -> Result<()> {
        if index < self.sp {
            self.stack[index] = val;
            Ok(())
        } else {
            Err(VmError::StackIndexOutOfRange { index, sp: self.sp }.into())
        }
    }

    /// Guarantee `n` free slots, reclaiming the stack if needed. Multi-slot
    /// structures (descriptors, frames) reserve up front so reclamation can
    /// never run between their writes.
    pub(crate) fn ensure_room(&mut self, n: usize) -> Result<()> {
        if self.sp + n <= self.stack.len() {
            return Ok(());
        }
        self.reclaim_stack()?;
        if self.sp + n > self.stack.len() {
            return Err(VmError::StackOverflow {
                capacity: self.stack.len(),
            }
            .into());
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn push_unchecked(&mut self, val: Val) {
        debug_assert!(self.sp < self.stack.len(), "push_unchecked without reserved room");
        self.stack[self.sp] = val;
        self.sp += 1;
    }

    /// Pop `n` values, returned in the order they were pushed.
    pub(crate) fn pop_args(&mut self, n: usize) -> Result<Vec<Val>> {
        let start = self.sp.checked_sub(n).ok_or(VmError::StackUnderflow)?;
        let args = self.stack[start..self.sp].iter_mut().map(mem::take).collect();
        self.sp = start;
        Ok(args)
    }

    /// Drop everything at and above `new_sp`, releasing the values held there.
    pub(crate) fn truncate_to(&mut self, new_sp: usize) {
        if new_sp < self.sp {
            self.stack[new_sp..self.sp].fill(Val::Nil);
        }
        self.sp = new_sp;
    }
}
