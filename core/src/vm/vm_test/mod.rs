pub(super) use crate::{
    val::{Arity, Primitive, Val},
    vm::{Assembler, ContRef, EnvRef, Opcode, Program, Vm, VmError},
};

/// Load `program` into a fresh machine and run it to completion.
pub(super) fn run_program(program: &Program) -> Vm {
    run_with_stack(program, crate::vm::DEFAULT_STACK_SIZE)
}

pub(super) fn run_with_stack(program: &Program, stack_size: usize) -> Vm {
    let mut vm = Vm::with_stack_size(stack_size);
    vm.bind_primitive(Primitive::call_cc());
    vm.load_program(program);
    vm.run().unwrap();
    vm
}

/// Run expecting failure; returns the engine fault behind the error.
pub(super) fn run_err(program: &Program) -> VmError {
    let mut vm = Vm::new();
    vm.load_program(program);
    let err = vm.run().unwrap_err();
    VmError::of(&err).cloned().unwrap_or_else(|| panic!("not an engine fault: {err:#}"))
}

/// A machine holding `code` with no literals, ready to step.
pub(super) fn loaded(code: Vec<u8>) -> Vm {
    let mut vm = Vm::new();
    vm.load_program(&Program::new(code, 0, Vec::new()));
    vm
}

pub(super) fn fixnum(vm: &Vm) -> i64 {
    vm.acc().as_fixnum().unwrap_or_else(|| panic!("acc is {}", vm.acc()))
}

mod bytecode;
mod env;
mod semantics;
