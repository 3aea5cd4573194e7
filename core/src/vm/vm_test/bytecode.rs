use super::*;

#[test]
fn test_hlt_leaves_acc_and_advances_ip() {
    let mut vm = loaded(vec![0x14]);
    vm.set_acc(Val::Fixnum(1234));
    vm.run().unwrap();
    assert!(!vm.runnable());
    assert_eq!(vm.acc(), &Val::Fixnum(1234));
    assert_eq!(vm.ip(), 1);
}

#[test]
fn test_nop_then_hlt() {
    let mut vm = loaded(vec![0x00, 0x14]);
    vm.set_acc(Val::Fixnum(1234));
    vm.run().unwrap();
    assert!(!vm.runnable());
    assert_eq!(vm.acc(), &Val::Fixnum(1234));
    assert_eq!(vm.ip(), 2);
}

#[test]
fn test_nil_then_hlt() {
    let mut vm = loaded(vec![0x13, 0x14]);
    vm.set_acc(Val::Fixnum(1234));
    vm.run().unwrap();
    assert!(vm.acc().is_nil());
    assert_eq!(vm.ip(), 2);
}

#[test]
fn test_ldi_sign_extends_operand() {
    let mut vm = loaded(vec![0x44, 0xFF, 0xFF, 0xFF, 0xFF, 0x14]);
    vm.run().unwrap();
    assert_eq!(vm.acc(), &Val::Fixnum(-1));

    let mut vm = loaded(vec![0x44, 0xD2, 0x04, 0x00, 0x00, 0x14]);
    vm.run().unwrap();
    assert_eq!(vm.acc(), &Val::Fixnum(1234));
    assert_eq!(vm.stats().instructions, 2);
}

#[test]
fn test_step_executes_one_instruction() {
    let mut vm = loaded(vec![0x12, 0x13, 0x14]);
    vm.step().unwrap();
    assert_eq!(vm.acc(), &Val::True);
    assert_eq!(vm.ip(), 1);
    assert!(vm.runnable());
}

#[test]
fn test_unassigned_opcode_is_invalid_instruction() {
    let mut vm = loaded(vec![0x00, 0x03]);
    let err = vm.run().unwrap_err();
    assert_eq!(VmError::of(&err), Some(&VmError::InvalidInstruction { opcode: 0x03, ip: 1 }));
}

#[test]
fn test_truncated_operand_is_code_overrun() {
    let mut vm = loaded(vec![0x44, 0x01, 0x00]);
    let err = vm.run().unwrap_err();
    assert!(matches!(VmError::of(&err), Some(VmError::CodeOverrun { ip: 1, len: 3 })));
}

#[test]
fn test_running_off_the_end_is_code_overrun() {
    let mut vm = loaded(vec![0x00]);
    let err = vm.run().unwrap_err();
    assert_eq!(VmError::of(&err), Some(&VmError::CodeOverrun { ip: 1, len: 1 }));
}

#[test]
fn test_run_requires_load() {
    let mut vm = Vm::new();
    let err = vm.run().unwrap_err();
    assert_eq!(VmError::of(&err), Some(&VmError::NotLoaded));
}

#[test]
fn test_errors_carry_instruction_context() {
    let mut asm = Assembler::new();
    asm.op(Opcode::Nil).unwrap().op(Opcode::Push).unwrap();
    asm.ldi(1).unwrap().op(Opcode::Add).unwrap();
    let mut vm = Vm::new();
    vm.load_program(&asm.finish().unwrap());
    let err = vm.run().unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("ADD at ip 7"), "{msg}");
    assert!(msg.contains("expected fixnum, got nil"), "{msg}");
    // state is left as of the failing instruction
    assert_eq!(vm.ip(), 8);
    assert_eq!(vm.sp(), 0);
}

#[test]
fn test_reload_resets_registers_but_keeps_globals() {
    let mut asm = Assembler::new();
    asm.ldi(5).unwrap().stg("x").unwrap().op(Opcode::Push).unwrap().op(Opcode::Hlt).unwrap();
    let program = asm.finish().unwrap();
    let mut vm = Vm::new();
    vm.load_program(&program);
    vm.run().unwrap();
    assert_eq!(vm.sp(), 1);

    let mut asm = Assembler::new();
    asm.ldg("x").unwrap().op(Opcode::Hlt).unwrap();
    vm.load_program(&asm.finish().unwrap());
    assert!(vm.runnable());
    assert_eq!(vm.sp(), 0);
    assert!(vm.acc().is_nil());
    vm.run().unwrap();
    assert_eq!(fixnum(&vm), 5);
}
