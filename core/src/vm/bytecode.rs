//! Instruction set: opcode byte assignments, operand layouts and decoding.
//!
//! The byte values and operand encodings are fixed; externally produced
//! instruction streams depend on them. Wide operands are 4-byte little-endian
//! signed integers, narrow operands a single unsigned byte.

use std::fmt;
use std::rc::Rc;

use anyhow::Result;

use crate::val::Val;

use super::error::VmError;

/// Operand layout that follows an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    None,
    /// One 4-byte signed operand.
    Word,
    /// One 1-byte operand.
    Byte,
    /// 1-byte depth then 4-byte index (`LDE`/`STE`).
    ByteWord,
    /// Three 1-byte operands: min args, extra slots, optional args (`ENV`/`ENVR`).
    EnvSpec,
}

impl Operands {
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            Operands::None => 0,
            Operands::Word => 4,
            Operands::Byte => 1,
            Operands::ByteWord => 5,
            Operands::EnvSpec => 3,
        }
    }
}

macro_rules! opcodes {
    ($($name:ident = $byte:literal, $mnemonic:literal, $operands:ident;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $byte,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            pub const fn operands(self) -> Operands {
                match self {
                    $(Opcode::$name => Operands::$operands,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "NOP", None;
    Push = 0x01, "PUSH", None;
    Pop = 0x02, "POP", None;
    Ret = 0x0d, "RET", None;
    No = 0x11, "NO", None;
    True = 0x12, "TRUE", None;
    Nil = 0x13, "NIL", None;
    Hlt = 0x14, "HLT", None;
    Add = 0x15, "ADD", None;
    Sub = 0x16, "SUB", None;
    Mul = 0x17, "MUL", None;
    Div = 0x18, "DIV", None;
    Cons = 0x19, "CONS", None;
    Car = 0x1a, "CAR", None;
    Cdr = 0x1b, "CDR", None;
    Scar = 0x1c, "SCAR", None;
    Scdr = 0x1d, "SCDR", None;
    Is = 0x1f, "IS", None;
    Dup = 0x22, "DUP", None;
    Consr = 0x24, "CONSR", None;
    Dcar = 0x26, "DCAR", None;
    Dcdr = 0x27, "DCDR", None;
    Spl = 0x28, "SPL", None;
    Ldl = 0x43, "LDL", Word;
    Ldi = 0x44, "LDI", Word;
    Ldg = 0x45, "LDG", Word;
    Stg = 0x46, "STG", Word;
    Apply = 0x4c, "APPLY", Byte;
    Cls = 0x4d, "CLS", Word;
    Jmp = 0x4e, "JMP", Word;
    Jt = 0x4f, "JT", Word;
    Jf = 0x50, "JF", Word;
    Jbnd = 0x51, "JBND", Word;
    Menv = 0x65, "MENV", Byte;
    Lde0 = 0x69, "LDE0", Byte;
    Ste0 = 0x6a, "STE0", Byte;
    Lde = 0x87, "LDE", ByteWord;
    Ste = 0x88, "STE", ByteWord;
    Cont = 0x89, "CONT", Word;
    Env = 0xca, "ENV", EnvSpec;
    Envr = 0xcb, "ENVR", EnvSpec;
}

/// Sparse opcode table; gaps stay `None` and decode to `InvalidInstruction`.
static OPCODE_TABLE: [Option<Opcode>; 256] = build_opcode_table();

const fn build_opcode_table() -> [Option<Opcode>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < Opcode::ALL.len() {
        let op = Opcode::ALL[i];
        table[op as usize] = Some(op);
        i += 1;
    }
    table
}

impl Opcode {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        OPCODE_TABLE[byte as usize]
    }

    /// Opcode byte plus operand bytes.
    #[inline]
    pub const fn encoded_len(self) -> usize {
        1 + self.operands().width()
    }

    /// Instructions whose word operand is an ip-relative offset.
    pub const fn is_relative(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jt | Opcode::Jf | Opcode::Jbnd | Opcode::Cls | Opcode::Cont
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Decode a 4-byte little-endian operand, sign-extending to 64 bits.
#[inline]
pub fn decode_word(bytes: [u8; 4]) -> i64 {
    i32::from_le_bytes(bytes) as i64
}

#[inline]
pub fn encode_word(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

/// An immutable loaded program: instruction bytes, entry point and literals.
/// Cloning shares the underlying tables.
#[derive(Debug, Clone)]
pub struct Program {
    pub code: Rc<[u8]>,
    pub entry: usize,
    pub literals: Rc<[Val]>,
}

impl Program {
    pub fn new(code: Vec<u8>, entry: usize, literals: Vec<Val>) -> Self {
        Self {
            code: Rc::from(code),
            entry,
            literals: Rc::from(literals),
        }
    }
}

/// One decoded instruction, as produced by [`disassemble`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstr {
    pub offset: usize,
    pub opcode: Opcode,
    pub operands: Vec<i64>,
}

impl DecodedInstr {
    #[inline]
    pub fn next_offset(&self) -> usize {
        self.offset + self.opcode.encoded_len()
    }

    /// Absolute target of a relative jump/closure/continuation instruction.
    pub fn target(&self) -> Option<i64> {
        if self.opcode.is_relative() {
            self.operands.first().map(|ofs| self.next_offset() as i64 + ofs)
        } else {
            None
        }
    }
}

impl fmt::Display for DecodedInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}  {}", self.offset, self.opcode)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {operand}")?;
            } else {
                write!(f, ", {operand}")?;
            }
        }
        if let Some(target) = self.target() {
            write!(f, "    ; -> {target:04}")?;
        }
        Ok(())
    }
}

/// Decode the instruction at `offset`.
pub fn decode_at(code: &[u8], offset: usize) -> Result<DecodedInstr> {
    let byte = *code.get(offset).ok_or(VmError::CodeOverrun {
        ip: offset,
        len: code.len(),
    })?;
    let opcode = Opcode::from_byte(byte).ok_or(VmError::InvalidInstruction { opcode: byte, ip: offset })?;
    let start = offset + 1;
    let end = start + opcode.operands().width();
    let bytes = code.get(start..end).ok_or(VmError::CodeOverrun {
        ip: end.saturating_sub(1),
        len: code.len(),
    })?;
    let word = |at: usize| decode_word([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let operands = match opcode.operands() {
        Operands::None => Vec::new(),
        Operands::Word => vec![word(0)],
        Operands::Byte => vec![bytes[0] as i64],
        Operands::ByteWord => vec![bytes[0] as i64, word(1)],
        Operands::EnvSpec => bytes.iter().map(|b| *b as i64).collect(),
    };
    Ok(DecodedInstr {
        offset,
        opcode,
        operands,
    })
}

/// Decode a whole instruction stream front to back.
pub fn disassemble(code: &[u8]) -> Result<Vec<DecodedInstr>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let instr = decode_at(code, offset)?;
        offset = instr.next_offset();
        out.push(instr);
    }
    Ok(out)
}

/// Human-readable listing, one instruction per line.
pub fn listing(code: &[u8]) -> Result<String> {
    let mut out = String::new();
    for instr in disassemble(code)? {
        out.push_str(&instr.to_string());
        out.push('\n');
    }
    Ok(out)
}
