//! Bytecode assembler with labels and a deduplicating literal table.
//!
//! ```
//! use arcvm_core::vm::{Assembler, Opcode, Vm};
//!
//! let mut asm = Assembler::new();
//! asm.ldi(40)?.op(Opcode::Push)?.ldi(2)?.op(Opcode::Add)?.op(Opcode::Hlt)?;
//! let program = asm.finish()?;
//!
//! let mut vm = Vm::new();
//! vm.load_program(&program);
//! vm.run()?;
//! assert_eq!(vm.acc().as_fixnum(), Some(42));
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, bail, ensure};

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{Symbol, Val};

use super::bytecode::{Opcode, Operands, Program, encode_word};

/// Jump target handed out by [`Assembler::label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

struct Fixup {
    /// Where the 4-byte operand lives.
    at: usize,
    label: Label,
}

#[derive(Default)]
pub struct Assembler {
    code: Vec<u8>,
    literals: Vec<Val>,
    symbols: FastHashMap<Symbol, usize>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    entry: usize,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            symbols: fast_hash_map_new(),
            ..Self::default()
        }
    }

    /// Offset of the next instruction.
    #[inline]
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Start execution at the current position instead of offset 0.
    pub fn entry_here(&mut self) -> &mut Self {
        self.entry = self.code.len();
        self
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current position.
    pub fn bind(&mut self, label: Label) -> Result<&mut Self> {
        let here = self.code.len();
        let Some(slot) = self.labels.get_mut(label.0) else {
            bail!("label {} was not created by this assembler", label.0);
        };
        if let Some(at) = slot {
            bail!("label {} already bound at {at}", label.0);
        }
        *slot = Some(here);
        Ok(self)
    }

    /// Index of `val` in the literal table. Symbols are stored once.
    pub fn literal(&mut self, val: Val) -> Result<i32> {
        if let Val::Symbol(sym) = &val
            && let Some(&index) = self.symbols.get(sym)
        {
            return Ok(index as i32);
        }
        let index = self.literals.len();
        ensure!(index <= i32::MAX as usize, "literal table full");
        if let Val::Symbol(sym) = &val {
            self.symbols.insert(sym.clone(), index);
        }
        self.literals.push(val);
        Ok(index as i32)
    }

    fn expect_operands(op: Opcode, operands: Operands) -> Result<()> {
        ensure!(
            op.operands() == operands,
            "{op} takes {:?} operands, not {operands:?}",
            op.operands()
        );
        Ok(())
    }

    /// An instruction without operands.
    pub fn op(&mut self, op: Opcode) -> Result<&mut Self> {
        Self::expect_operands(op, Operands::None)?;
        self.code.push(op as u8);
        Ok(self)
    }

    /// An instruction with a 4-byte operand.
    pub fn op_word(&mut self, op: Opcode, operand: i32) -> Result<&mut Self> {
        Self::expect_operands(op, Operands::Word)?;
        self.code.push(op as u8);
        self.code.extend_from_slice(&encode_word(operand));
        Ok(self)
    }

    /// An instruction with a 1-byte operand.
    pub fn op_byte(&mut self, op: Opcode, operand: u8) -> Result<&mut Self> {
        Self::expect_operands(op, Operands::Byte)?;
        self.code.extend_from_slice(&[op as u8, operand]);
        Ok(self)
    }

    /// A relative-offset instruction aimed at `label`, patched in `finish`.
    pub fn op_label(&mut self, op: Opcode, label: Label) -> Result<&mut Self> {
        ensure!(op.is_relative(), "{op} does not take a label");
        self.code.push(op as u8);
        self.fixups.push(Fixup {
            at: self.code.len(),
            label,
        });
        self.code.extend_from_slice(&[0; 4]);
        Ok(self)
    }

    pub fn ldi(&mut self, n: i32) -> Result<&mut Self> {
        self.op_word(Opcode::Ldi, n)
    }

    pub fn ldl(&mut self, val: impl Into<Val>) -> Result<&mut Self> {
        let index = self.literal(val.into())?;
        self.op_word(Opcode::Ldl, index)
    }

    pub fn ldg(&mut self, name: &str) -> Result<&mut Self> {
        let index = self.literal(Val::symbol(name))?;
        self.op_word(Opcode::Ldg, index)
    }

    pub fn stg(&mut self, name: &str) -> Result<&mut Self> {
        let index = self.literal(Val::symbol(name))?;
        self.op_word(Opcode::Stg, index)
    }

    pub fn apply(&mut self, argc: u8) -> Result<&mut Self> {
        self.op_byte(Opcode::Apply, argc)
    }

    pub fn lde(&mut self, depth: u8, index: i32) -> Result<&mut Self> {
        self.depth_index(Opcode::Lde, depth, index)
    }

    pub fn ste(&mut self, depth: u8, index: i32) -> Result<&mut Self> {
        self.depth_index(Opcode::Ste, depth, index)
    }

    fn depth_index(&mut self, op: Opcode, depth: u8, index: i32) -> Result<&mut Self> {
        Self::expect_operands(op, Operands::ByteWord)?;
        self.code.extend_from_slice(&[op as u8, depth]);
        self.code.extend_from_slice(&encode_word(index));
        Ok(self)
    }

    /// `ENV min extra optional`.
    pub fn env(&mut self, min: u8, extra: u8, optional: u8) -> Result<&mut Self> {
        self.code.extend_from_slice(&[Opcode::Env as u8, min, extra, optional]);
        Ok(self)
    }

    /// `ENVR min extra optional`; the rest list lands in slot `min + optional`.
    pub fn envr(&mut self, min: u8, extra: u8, optional: u8) -> Result<&mut Self> {
        self.code.extend_from_slice(&[Opcode::Envr as u8, min, extra, optional]);
        Ok(self)
    }

    /// Resolve labels and produce the program.
    pub fn finish(self) -> Result<Program> {
        let Assembler {
            mut code,
            literals,
            labels,
            fixups,
            entry,
            ..
        } = self;
        for Fixup { at, label } in fixups {
            let Some(Some(target)) = labels.get(label.0).copied() else {
                bail!("label {} used at {} but never bound", label.0, at - 1);
            };
            let offset = target as i64 - (at + 4) as i64;
            let offset = i32::try_from(offset).map_err(|_| anyhow::anyhow!("jump at {} out of range", at - 1))?;
            code[at..at + 4].copy_from_slice(&encode_word(offset));
        }
        Ok(Program::new(code, entry, literals))
    }
}
