use super::*;

fn eval(build: impl FnOnce(&mut Assembler)) -> Val {
    let mut asm = Assembler::new();
    build(&mut asm);
    asm.op(Opcode::Hlt).unwrap();
    run_program(&asm.finish().unwrap()).acc().clone()
}

fn list(items: &[i64]) -> Val {
    Val::from(items.to_vec())
}

#[test]
fn test_arithmetic_takes_left_operand_from_stack() {
    let r = eval(|asm| {
        asm.ldi(10).unwrap().op(Opcode::Push).unwrap().ldi(4).unwrap().op(Opcode::Sub).unwrap();
    });
    assert_eq!(r, Val::Fixnum(6));
    let r = eval(|asm| {
        asm.ldi(17).unwrap().op(Opcode::Push).unwrap().ldi(5).unwrap().op(Opcode::Div).unwrap();
    });
    assert_eq!(r, Val::Fixnum(3));
}

#[test]
fn test_division_by_zero() {
    let mut asm = Assembler::new();
    asm.ldi(1).unwrap().op(Opcode::Push).unwrap().ldi(0).unwrap().op(Opcode::Div).unwrap();
    assert_eq!(run_err(&asm.finish().unwrap()), VmError::DivisionByZero);
}

#[test]
fn test_cons_and_consr_order() {
    let r = eval(|asm| {
        asm.ldi(2).unwrap().op(Opcode::Push).unwrap().ldi(1).unwrap().op(Opcode::Cons).unwrap();
    });
    assert_eq!(r, Val::cons(Val::Fixnum(1), Val::Fixnum(2)));
    let r = eval(|asm| {
        asm.ldi(2).unwrap().op(Opcode::Push).unwrap().ldi(1).unwrap().op(Opcode::Consr).unwrap();
    });
    assert_eq!(r, Val::cons(Val::Fixnum(2), Val::Fixnum(1)));
    assert_eq!(r.to_string(), "(2 . 1)");
}

#[test]
fn test_car_cdr() {
    assert_eq!(eval(|asm| {
        asm.ldl(list(&[1, 2, 3])).unwrap().op(Opcode::Cdr).unwrap().op(Opcode::Car).unwrap();
    }), Val::Fixnum(2));
    assert!(eval(|asm| {
        asm.op(Opcode::Nil).unwrap().op(Opcode::Car).unwrap();
    })
    .is_nil());
    assert!(eval(|asm| {
        asm.op(Opcode::Nil).unwrap().op(Opcode::Dcdr).unwrap();
    })
    .is_unbound());

    let mut asm = Assembler::new();
    asm.ldi(3).unwrap().op(Opcode::Car).unwrap();
    assert_eq!(
        run_err(&asm.finish().unwrap()),
        VmError::TypeError {
            op: "CAR",
            expected: "cons",
            got: "fixnum"
        }
    );
}

#[test]
fn test_scar_scdr_mutate_in_place() {
    let r = eval(|asm| {
        asm.ldl(list(&[1, 2])).unwrap();
        asm.op(Opcode::Push).unwrap().op(Opcode::Push).unwrap().op(Opcode::Push).unwrap();
        asm.ldi(9).unwrap().op(Opcode::Scar).unwrap();
        asm.op(Opcode::Nil).unwrap().op(Opcode::Scdr).unwrap();
        asm.op(Opcode::Pop).unwrap();
    });
    assert_eq!(r, list(&[9]));
}

#[test]
fn test_is_compares_identity() {
    let same = eval(|asm| {
        asm.ldl(list(&[1])).unwrap().op(Opcode::Push).unwrap().op(Opcode::Is).unwrap();
    });
    assert_eq!(same, Val::True);
    let different = eval(|asm| {
        asm.ldl(list(&[1])).unwrap().op(Opcode::Push).unwrap();
        asm.ldi(1).unwrap().op(Opcode::Push).unwrap().op(Opcode::Nil).unwrap().op(Opcode::Consr).unwrap();
        asm.op(Opcode::Is).unwrap();
    });
    assert!(different.is_nil());
    let symbols = eval(|asm| {
        asm.ldl(Val::symbol("a")).unwrap().op(Opcode::Push).unwrap();
        asm.ldl(Val::symbol("a")).unwrap().op(Opcode::Is).unwrap();
    });
    assert_eq!(symbols, Val::True);
}

#[test]
fn test_dup_reads_top_without_popping() {
    let mut asm = Assembler::new();
    asm.ldi(4).unwrap().op(Opcode::Push).unwrap().op(Opcode::Nil).unwrap().op(Opcode::Dup).unwrap();
    asm.op(Opcode::Hlt).unwrap();
    let vm = run_program(&asm.finish().unwrap());
    assert_eq!(fixnum(&vm), 4);
    assert_eq!(vm.sp(), 1);
}

#[test]
fn test_splice_copies_the_stacked_list() {
    let mut asm = Assembler::new();
    asm.ldl(list(&[1, 2])).unwrap().stg("xs").unwrap();
    asm.op(Opcode::Push).unwrap().ldl(list(&[3])).unwrap().op(Opcode::Spl).unwrap();
    asm.op(Opcode::Hlt).unwrap();
    let vm = run_program(&asm.finish().unwrap());
    assert_eq!(vm.acc(), &list(&[1, 2, 3]));
    // the original list is untouched
    assert_eq!(vm.value_of(&vm.intern("xs")).unwrap(), list(&[1, 2]));

    let mut asm = Assembler::new();
    asm.ldi(1).unwrap().op(Opcode::Push).unwrap().op(Opcode::Nil).unwrap().op(Opcode::Spl).unwrap();
    assert!(matches!(run_err(&asm.finish().unwrap()), VmError::TypeError { op: "SPL", .. }));
}

#[test]
fn test_pop_on_empty_stack() {
    let mut asm = Assembler::new();
    asm.op(Opcode::Pop).unwrap();
    assert_eq!(run_err(&asm.finish().unwrap()), VmError::StackUnderflow);
}

#[test]
fn test_apply_list_and_vector() {
    let r = eval(|asm| {
        asm.ldi(1).unwrap().op(Opcode::Push).unwrap().ldl(list(&[10, 20, 30])).unwrap().apply(1).unwrap();
    });
    assert_eq!(r, Val::Fixnum(20));
    let r = eval(|asm| {
        asm.ldi(5).unwrap().op(Opcode::Push).unwrap().ldl(list(&[10])).unwrap().apply(1).unwrap();
    });
    assert!(r.is_nil());
    let r = eval(|asm| {
        asm.ldi(2).unwrap().op(Opcode::Push).unwrap();
        asm.ldl(Val::vector(vec![Val::Nil, Val::True, Val::Fixnum(8)])).unwrap().apply(1).unwrap();
    });
    assert_eq!(r, Val::Fixnum(8));

    let mut asm = Assembler::new();
    asm.ldi(3).unwrap().op(Opcode::Push).unwrap();
    asm.ldl(Val::vector(vec![Val::Nil])).unwrap().apply(1).unwrap();
    assert!(matches!(run_err(&asm.finish().unwrap()), VmError::TypeError { op: "APPLY", .. }));
}

#[test]
fn test_apply_non_callable() {
    let mut asm = Assembler::new();
    asm.ldi(3).unwrap().apply(0).unwrap();
    assert_eq!(
        run_err(&asm.finish().unwrap()),
        VmError::TypeError {
            op: "APPLY",
            expected: "callable",
            got: "fixnum"
        }
    );
}
