use super::*;

fn stack_ptr(vm: &Vm) -> usize {
    match vm.env() {
        EnvRef::Stack(ptr) => *ptr,
        other => panic!("expected a stack environment, got {other:?}"),
    }
}

fn err_kind(result: anyhow::Result<Val>) -> VmError {
    VmError::of(&result.unwrap_err()).cloned().unwrap()
}

#[test]
fn test_mkenv_lays_out_descriptor() {
    let mut vm = loaded(vec![0x14]);
    vm.push(Val::Fixnum(10)).unwrap();
    vm.push(Val::Fixnum(20)).unwrap();
    vm.mkenv(2, 1).unwrap();

    let ptr = stack_ptr(&vm);
    assert_eq!(ptr, 3);
    assert_eq!(vm.sp(), 6);
    assert_eq!(vm.stack_index(3).unwrap(), &Val::Fixnum(0));
    assert_eq!(vm.stack_index(4).unwrap(), &Val::Fixnum(3));
    assert!(vm.stack_index(5).unwrap().is_nil());
    assert_eq!(vm.lookup(0, 0).unwrap(), Val::Fixnum(10));
    assert_eq!(vm.lookup(0, 1).unwrap(), Val::Fixnum(20));
    assert!(vm.lookup(0, 2).unwrap().is_unbound());
}

#[test]
fn test_store_then_lookup_on_stack() {
    let mut vm = loaded(vec![0x14]);
    vm.mkenv(0, 3).unwrap();
    vm.store(0, 2, Val::Fixnum(7)).unwrap();
    assert_eq!(vm.lookup(0, 2).unwrap(), Val::Fixnum(7));
}

#[test]
fn test_index_and_depth_errors() {
    let mut vm = loaded(vec![0x14]);
    vm.mkenv(0, 3).unwrap();
    assert_eq!(
        err_kind(vm.lookup(0, 3)),
        VmError::StackEnvironmentIndexExceeded { index: 3, count: 3 }
    );
    assert_eq!(err_kind(vm.lookup(1, 0)), VmError::EnvironmentDepthExceeded { depth: 1 });

    vm.heapify_env().unwrap();
    assert_eq!(
        err_kind(vm.lookup(0, 5)),
        VmError::HeapEnvironmentIndexExceeded { index: 5, count: 3 }
    );
    let err = vm.store(0, 3, Val::Nil).unwrap_err();
    assert!(matches!(VmError::of(&err), Some(VmError::HeapEnvironmentIndexExceeded { .. })));
}

#[test]
fn test_lookup_with_no_environment() {
    let vm = loaded(vec![0x14]);
    assert_eq!(err_kind(vm.lookup(0, 0)), VmError::EnvironmentDepthExceeded { depth: 0 });
}

#[test]
fn test_heapify_preserves_every_slot() {
    let mut vm = loaded(vec![0x14]);
    vm.push(Val::Fixnum(1)).unwrap();
    vm.mkenv(1, 1).unwrap();
    vm.store(0, 1, Val::symbol("outer")).unwrap();
    vm.push(Val::Fixnum(2)).unwrap();
    vm.mkenv(1, 0).unwrap();

    let before: Vec<Val> = [(0, 0), (1, 0), (1, 1)].iter().map(|&(d, i)| vm.lookup(d, i).unwrap()).collect();
    let env = vm.heapify_env().unwrap();
    assert!(env.is_heap());
    assert!(vm.env().is_heap());
    assert_eq!(vm.stats().envs_heapified, 2);
    let after: Vec<Val> = [(0, 0), (1, 0), (1, 1)].iter().map(|&(d, i)| vm.lookup(d, i).unwrap()).collect();
    assert_eq!(before, after);

    vm.store(1, 0, Val::Fixnum(11)).unwrap();
    assert_eq!(vm.lookup(1, 0).unwrap(), Val::Fixnum(11));

    // already on the heap: nothing more to do
    vm.heapify_env().unwrap();
    assert_eq!(vm.stats().envs_heapified, 2);
}

#[test]
fn test_stack_scope_over_heap_parent() {
    let mut vm = loaded(vec![0x14]);
    vm.push(Val::Fixnum(1)).unwrap();
    vm.mkenv(1, 0).unwrap();
    vm.heapify_env().unwrap();

    vm.push(Val::Fixnum(2)).unwrap();
    vm.mkenv(1, 0).unwrap();
    stack_ptr(&vm);
    assert_eq!(vm.lookup(0, 0).unwrap(), Val::Fixnum(2));
    assert_eq!(vm.lookup(1, 0).unwrap(), Val::Fixnum(1));
    vm.store(1, 0, Val::Fixnum(5)).unwrap();
    assert_eq!(vm.lookup(1, 0).unwrap(), Val::Fixnum(5));
}

#[test]
fn test_stack_scope_over_forwarded_parent() {
    let mut vm = loaded(vec![0x14]);
    vm.push(Val::Fixnum(1)).unwrap();
    vm.mkenv(1, 0).unwrap();
    let outer = stack_ptr(&vm);
    vm.push(Val::Fixnum(2)).unwrap();
    vm.mkenv(1, 0).unwrap();
    let inner = stack_ptr(&vm);

    // promote only the outer scope; the inner one still links to its old descriptor
    vm.set_env(Val::StackEnv(outer)).unwrap();
    let heap = vm.heapify_env().unwrap();
    vm.set_env(Val::StackEnv(inner)).unwrap();

    vm.store(1, 0, Val::Fixnum(9)).unwrap();
    assert_eq!(vm.lookup(1, 0).unwrap(), Val::Fixnum(9));
    assert_eq!(heap.as_heap().unwrap().get(0).unwrap(), Val::Fixnum(9));
    // the abandoned stack slot is not written
    assert_eq!(vm.stack_index(0).unwrap(), &Val::Fixnum(1));

    // a stale reference to the outer descriptor resolves to the heap copy too
    vm.set_env(Val::StackEnv(outer)).unwrap();
    assert_eq!(vm.lookup(0, 0).unwrap(), Val::Fixnum(9));
}

#[test]
fn test_set_env_rejects_non_environments() {
    let mut vm = Vm::new();
    let err = vm.set_env(Val::Fixnum(3)).unwrap_err();
    assert!(matches!(VmError::of(&err), Some(VmError::TypeError { .. })));
}

#[test]
fn test_heap_env_parent_chain() {
    let outer = std::rc::Rc::new(crate::vm::HeapEnv::new(vec![Val::Fixnum(1)], None));
    let inner = crate::vm::HeapEnv::new(vec![Val::Nil, Val::True], Some(outer.clone()));
    assert_eq!(inner.len(), 2);
    assert!(std::rc::Rc::ptr_eq(inner.parent().unwrap(), &outer));
    inner.set(1, Val::Fixnum(4)).unwrap();
    assert_eq!(inner.slots(), vec![Val::Nil, Val::Fixnum(4)]);
}

#[test]
fn test_long_heap_env_chain_drops() {
    let mut env: Option<std::rc::Rc<crate::vm::HeapEnv>> = None;
    for i in 0..500_000 {
        env = Some(std::rc::Rc::new(crate::vm::HeapEnv::new(vec![Val::Fixnum(i)], env.take())));
    }
    let innermost = env.unwrap();
    assert_eq!(innermost.get(0).unwrap(), Val::Fixnum(499_999));
    assert_eq!(innermost.parent().unwrap().get(0).unwrap(), Val::Fixnum(499_998));
    drop(innermost);
}
