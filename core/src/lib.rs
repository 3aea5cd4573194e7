//! `arcvm-core`: a stack-and-accumulator bytecode machine for a small Lisp.
//!
//! Environments and continuations are allocated on the operand stack and
//! promoted to the heap only when they escape or when the stack fills up.

pub mod util;
pub mod val;
pub mod vm;
