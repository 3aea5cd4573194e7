use anyhow::{Context, Result};

use crate::vm::bytecode::{Opcode, decode_word};
use crate::vm::error::VmError;
use crate::vm::vm::Vm;

impl Vm {
    /// Execute until the machine halts, either through `HLT` or by returning
    /// past the outermost continuation.
    pub fn run(&mut self) -> Result<()> {
        if !self.loaded {
            return Err(VmError::NotLoaded.into());
        }
        while self.runnable {
            self.step()?;
        }
        Ok(())
    }

    /// Fetch, decode and execute a single instruction.
    pub fn step(&mut self) -> Result<()> {
        if !self.loaded {
            return Err(VmError::NotLoaded.into());
        }
        let at = self.ip;
        let byte = self.fetch_u8()?;
        let op = Opcode::from_byte(byte).ok_or(VmError::InvalidInstruction { opcode: byte, ip: at })?;
        if self.config.trace_dispatch {
            tracing::trace!(
                target: "arcvm::vm::dispatch",
                ip = at,
                op = op.mnemonic(),
                sp = self.sp,
                acc = %self.acc,
            );
        }
        self.stats.instructions += 1;
        self.execute(op).with_context(|| format!("{op} at ip {at}"))
    }

    pub(crate) fn fetch_u8(&mut self) -> Result<u8> {
        match self.code.get(self.ip) {
            Some(&byte) => {
                self.ip += 1;
                Ok(byte)
            }
            None => Err(VmError::CodeOverrun {
                ip: self.ip,
                len: self.code.len(),
            }
            .into()),
        }
    }

    /// Fetch a 4-byte operand, sign-extended.
    pub(crate) fn fetch_word(&mut self) -> Result<i64> {
        let end = self.ip + 4;
        let bytes: [u8; 4] = self
            .code
            .get(self.ip..end)
            .and_then(|b| b.try_into().ok())
            .ok_or(VmError::CodeOverrun {
                ip: self.ip,
                len: self.code.len(),
            })?;
        self.ip = end;
        Ok(decode_word(bytes))
    }

    /// Absolute target of an offset relative to the current ip.
    pub(crate) fn relative(&self, offset: i64) -> Result<usize> {
        usize::try_from(self.ip as i64 + offset).map_err(|_| {
            VmError::CodeOverrun {
                ip: self.ip,
                len: self.code.len(),
            }
            .into()
        })
    }

    #[inline]
    pub(crate) fn jump(&mut self, offset: i64) -> Result<()> {
        self.ip = self.relative(offset)?;
        Ok(())
    }
}
