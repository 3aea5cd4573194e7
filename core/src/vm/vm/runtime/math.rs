use anyhow::Result;

use crate::val::Val;
use crate::vm::bytecode::Opcode;
use crate::vm::error::VmError;

/// Fixnum arithmetic: `lhs` comes off the stack, `rhs` is the accumulator.
/// Results wrap on overflow; division truncates toward zero.
pub(super) fn fixnum_binop(op: Opcode, lhs: &Val, rhs: &Val) -> Result<Val> {
    let name = op.mnemonic();
    let (Val::Fixnum(a), Val::Fixnum(b)) = (lhs, rhs) else {
        let bad = if matches!(lhs, Val::Fixnum(_)) { rhs } else { lhs };
        return Err(VmError::type_error(name, "fixnum", bad).into());
    };
    let (a, b) = (*a, *b);
    let n = match op {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::Div => {
            if b == 0 {
                return Err(VmError::DivisionByZero.into());
            }
            a.wrapping_div(b)
        }
        _ => return Err(VmError::type_error(name, "arithmetic opcode", lhs).into()),
    };
    Ok(Val::Fixnum(n))
}
