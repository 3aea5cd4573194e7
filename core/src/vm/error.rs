use std::fmt;

use crate::val::Arity;

/// Faults raised by the engine. All of them abort the current `run`.
///
/// Engine functions return `anyhow::Result`; use [`VmError::of`] to recover
/// the kind from an `anyhow::Error`, even after context has been attached.
#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    /// Push failed even after stack reclamation.
    StackOverflow { capacity: usize },
    UnboundSymbol(String),
    EnvironmentDepthExceeded { depth: usize },
    StackEnvironmentIndexExceeded { index: usize, count: usize },
    HeapEnvironmentIndexExceeded { index: usize, count: usize },
    InvalidContinuation(String),
    InvalidInstruction { opcode: u8, ip: usize },
    ArityError { expected: Arity, got: usize },
    TypeError { op: &'static str, expected: &'static str, got: &'static str },
    DivisionByZero,
    StackIndexOutOfRange { index: usize, sp: usize },
    StackUnderflow,
    LiteralIndexOutOfRange { index: i64, len: usize },
    CodeOverrun { ip: usize, len: usize },
    NotLoaded,
}

impl VmError {
    /// Find the engine fault behind an error, looking through context layers.
    pub fn of(err: &anyhow::Error) -> Option<&VmError> {
        err.downcast_ref::<VmError>()
    }

    pub(crate) fn type_error(op: &'static str, expected: &'static str, got: &crate::val::Val) -> Self {
        VmError::TypeError {
            op,
            expected,
            got: got.type_name(),
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::StackOverflow { capacity } => write!(f, "stack overflow ({capacity} slots)"),
            VmError::UnboundSymbol(sym) => write!(f, "Unbound symbol {sym}"),
            VmError::EnvironmentDepthExceeded { depth } => {
                write!(f, "environment depth exceeded (depth {depth})")
            }
            VmError::StackEnvironmentIndexExceeded { index, count } => {
                write!(f, "stack environment index exceeded ({index} of {count})")
            }
            VmError::HeapEnvironmentIndexExceeded { index, count } => {
                write!(f, "heap environment index exceeded ({index} of {count})")
            }
            VmError::InvalidContinuation(what) => write!(f, "invalid continuation: {what}"),
            VmError::InvalidInstruction { opcode, ip } => {
                write!(f, "invalid instruction 0x{opcode:02x} at {ip}")
            }
            VmError::ArityError { expected, got } => match expected.max {
                _ if *got < expected.min => write!(
                    f,
                    "too few arguments, at least {} required, {} passed",
                    expected.min, got
                ),
                Some(max) => write!(f, "too many arguments, at most {max} allowed, {got} passed"),
                None => write!(f, "wrong number of arguments ({got} for {expected})"),
            },
            VmError::TypeError { op, expected, got } => {
                write!(f, "{op}: expected {expected}, got {got}")
            }
            VmError::DivisionByZero => f.write_str("division by zero"),
            VmError::StackIndexOutOfRange { index, sp } => {
                write!(f, "stack index {index} out of range (sp={sp})")
            }
            VmError::LiteralIndexOutOfRange { index, len } => {
                write!(f, "literal index {index} out of range ({len} literals)")
            }
            VmError::CodeOverrun { ip, len } => {
                write!(f, "instruction fetch at {ip} past end of code ({len} bytes)")
            }
            VmError::StackUnderflow => f.write_str("pop from empty stack"),
            VmError::NotLoaded => f.write_str("no program loaded"),
        }
    }
}

impl std::error::Error for VmError {}
