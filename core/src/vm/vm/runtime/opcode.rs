use std::{mem, rc::Rc};

use anyhow::Result;

use crate::val::{Closure, Symbol, Val, list_to_vec};
use crate::vm::bytecode::Opcode;
use crate::vm::error::VmError;
use crate::vm::vm::Vm;

use super::math::fixnum_binop;

impl Vm {
    pub(super) fn execute(&mut self, op: Opcode) -> Result<()> {
        match op {
            Opcode::Nop => {}
            Opcode::Push => {
                let acc = self.acc.clone();
                self.push(acc)?;
            }
            Opcode::Pop => self.acc = self.pop()?,
            Opcode::Ret => self.restore_continuation()?,
            Opcode::No => self.acc = Val::from_bool(self.acc.is_nil()),
            Opcode::True => self.acc = Val::True,
            Opcode::Nil => self.acc = Val::Nil,
            Opcode::Hlt => self.runnable = false,
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let lhs = self.pop()?;
                self.acc = fixnum_binop(op, &lhs, &self.acc)?;
            }
            Opcode::Cons => {
                let cdr = self.pop()?;
                self.acc = Val::cons(mem::take(&mut self.acc), cdr);
            }
            Opcode::Consr => {
                let car = self.pop()?;
                self.acc = Val::cons(car, mem::take(&mut self.acc));
            }
            Opcode::Car => self.acc = car_of(&self.acc, "CAR", Val::Nil)?,
            Opcode::Cdr => self.acc = cdr_of(&self.acc, "CDR", Val::Nil)?,
            Opcode::Dcar => self.acc = car_of(&self.acc, "DCAR", Val::Unbound)?,
            Opcode::Dcdr => self.acc = cdr_of(&self.acc, "DCDR", Val::Unbound)?,
            Opcode::Scar | Opcode::Scdr => {
                let pair = self.pop()?;
                let Val::Cons(cell) = &pair else {
                    return Err(VmError::type_error(op.mnemonic(), "cons", &pair).into());
                };
                if op == Opcode::Scar {
                    cell.set_car(self.acc.clone());
                } else {
                    cell.set_cdr(self.acc.clone());
                }
            }
            Opcode::Is => {
                let other = self.pop()?;
                self.acc = Val::from_bool(other.is(&self.acc));
            }
            Opcode::Dup => self.acc = self.top()?.clone(),
            Opcode::Spl => {
                let list = self.pop()?;
                let items = list_to_vec(&list).ok_or_else(|| VmError::type_error("SPL", "proper list", &list))?;
                let tail = mem::take(&mut self.acc);
                self.acc = items.into_iter().rev().fold(tail, |tail, item| Val::cons(item, tail));
            }
            Opcode::Ldl => {
                let index = self.fetch_word()?;
                self.acc = self.literal(index)?;
            }
            Opcode::Ldi => self.acc = Val::Fixnum(self.fetch_word()?),
            Opcode::Ldg => {
                let index = self.fetch_word()?;
                let sym = self.literal_symbol(op, index)?;
                self.acc = self.value_of(&sym)?;
            }
            Opcode::Stg => {
                let index = self.fetch_word()?;
                let sym = self.literal_symbol(op, index)?;
                let value = self.acc.clone();
                self.bind(sym, value);
            }
            Opcode::Apply => {
                let argc = self.fetch_u8()? as usize;
                self.apply(argc)?;
            }
            Opcode::Cls => {
                let offset = self.fetch_word()?;
                let entry = self.relative(offset)?;
                let env = self.promote_env()?;
                self.acc = Val::Closure(Rc::new(Closure { entry, env }));
            }
            Opcode::Jmp => {
                let offset = self.fetch_word()?;
                self.jump(offset)?;
            }
            Opcode::Jt | Opcode::Jf | Opcode::Jbnd => {
                let offset = self.fetch_word()?;
                let taken = match op {
                    Opcode::Jt => self.acc.is_truthy(),
                    Opcode::Jf => self.acc.is_nil(),
                    _ => !self.acc.is_unbound(),
                };
                if taken {
                    self.jump(offset)?;
                }
            }
            Opcode::Menv => {
                let n = self.fetch_u8()? as usize;
                self.merge_env(n)?;
            }
            Opcode::Lde0 => {
                let index = self.fetch_u8()? as usize;
                self.acc = self.lookup(0, index)?;
            }
            Opcode::Ste0 => {
                let index = self.fetch_u8()? as usize;
                self.store(0, index, self.acc.clone())?;
            }
            Opcode::Lde => {
                let depth = self.fetch_u8()? as usize;
                let index = env_index(op, self.fetch_word()?)?;
                self.acc = self.lookup(depth, index)?;
            }
            Opcode::Ste => {
                let depth = self.fetch_u8()? as usize;
                let index = env_index(op, self.fetch_word()?)?;
                self.store(depth, index, self.acc.clone())?;
            }
            Opcode::Cont => {
                let offset = self.fetch_word()?;
                self.make_continuation(offset)?;
            }
            Opcode::Env | Opcode::Envr => {
                let min = self.fetch_u8()? as usize;
                let extra = self.fetch_u8()? as usize;
                let optional = self.fetch_u8()? as usize;
                if op == Opcode::Env {
                    self.enter_env(min, extra, optional)?;
                } else {
                    self.enter_env_rest(min, extra, optional)?;
                }
            }
        }
        Ok(())
    }

    fn literal_symbol(&self, op: Opcode, index: i64) -> Result<Symbol> {
        match self.literal(index)? {
            Val::Symbol(sym) => Ok(sym),
            other => Err(VmError::type_error(op.mnemonic(), "symbol literal", &other).into()),
        }
    }
}

fn car_of(val: &Val, op: &'static str, on_nil: Val) -> Result<Val> {
    match val {
        Val::Nil => Ok(on_nil),
        Val::Cons(cell) => Ok(cell.car()),
        other => Err(VmError::type_error(op, "cons", other).into()),
    }
}

fn cdr_of(val: &Val, op: &'static str, on_nil: Val) -> Result<Val> {
    match val {
        Val::Nil => Ok(on_nil),
        Val::Cons(cell) => Ok(cell.cdr()),
        other => Err(VmError::type_error(op, "cons", other).into()),
    }
}

fn env_index(op: Opcode, index: i64) -> Result<usize> {
    usize::try_from(index).map_err(|_| VmError::type_error(op.mnemonic(), "non-negative index", &Val::Fixnum(index)).into())
}
