//! Bytecode virtual machine: instruction set, engine, assembler and images.

mod builder;
mod bytecode;
mod config;
mod context;
mod error;
mod image;
#[allow(clippy::module_inception)]
mod vm;

pub use builder::{Assembler, Label};
pub use bytecode::*;
pub use config::{DEFAULT_STACK_SIZE, MIN_STACK_SIZE, VmConfig};
pub use context::GlobalEnv;
pub use error::VmError;
pub use image::{Image, Literal};
pub use vm::*;

#[cfg(test)]
mod vm_test;
