use std::{borrow::Borrow, cell::RefCell, fmt, rc::Rc};

use crate::util::fast_map::{FastHashSet, fast_hash_set_new};
use crate::vm::{HeapCont, HeapEnv};

mod cons;
mod convert;
mod display;
mod primitive;

pub use cons::{Cons, list_from_iter, list_to_vec};
pub use primitive::{Arity, NativeFn, Primitive, PrimitiveBody};

/// Symbol compared by name. Two symbols spelled the same are the same symbol.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A closure: an entry point in the loaded instruction stream plus the
/// environment captured by `CLS` (always heap-resident or empty).
#[derive(Debug)]
pub struct Closure {
    pub entry: usize,
    pub env: Option<Rc<HeapEnv>>,
}

/// Tagged runtime value. Every stack slot and register holds one of these.
///
/// `StackEnv` and `StackCont` carry a stack index and only ever live in
/// registers, environment descriptors and continuation frames on the stack;
/// they never escape into heap structure.
#[derive(Clone, Default)]
pub enum Val {
    #[default]
    Nil,
    True,
    /// Allocated-but-unassigned environment slot.
    Unbound,
    Fixnum(i64),
    Symbol(Symbol),
    Cons(Rc<Cons>),
    Vector(Rc<RefCell<Vec<Val>>>),
    Closure(Rc<Closure>),
    Primitive(Rc<Primitive>),
    StackEnv(usize),
    HeapEnv(Rc<HeapEnv>),
    StackCont(usize),
    Cont(Rc<HeapCont>),
}

impl Val {
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    #[inline]
    pub fn is_unbound(&self) -> bool {
        matches!(self, Val::Unbound)
    }

    /// Only nil is false.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !self.is_nil()
    }

    #[inline]
    pub fn from_bool(b: bool) -> Val {
        if b { Val::True } else { Val::Nil }
    }

    pub fn symbol(name: &str) -> Val {
        Val::Symbol(Symbol::new(name))
    }

    pub fn cons(car: Val, cdr: Val) -> Val {
        Val::Cons(Rc::new(Cons::new(car, cdr)))
    }

    pub fn vector(items: Vec<Val>) -> Val {
        Val::Vector(Rc::new(RefCell::new(items)))
    }

    #[inline]
    pub fn as_fixnum(&self) -> Option<i64> {
        match self {
            Val::Fixnum(n) => Some(*n),
            _ => None,
        }
    }

    /// Identity comparison used by `IS`: immediates compare by value, heap
    /// objects by address.
    pub fn is(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) | (Val::True, Val::True) | (Val::Unbound, Val::Unbound) => true,
            (Val::Fixnum(a), Val::Fixnum(b)) => a == b,
            (Val::Symbol(a), Val::Symbol(b)) => a == b,
            (Val::Cons(a), Val::Cons(b)) => Rc::ptr_eq(a, b),
            (Val::Vector(a), Val::Vector(b)) => Rc::ptr_eq(a, b),
            (Val::Closure(a), Val::Closure(b)) => Rc::ptr_eq(a, b),
            (Val::Primitive(a), Val::Primitive(b)) => Rc::ptr_eq(a, b),
            (Val::StackEnv(a), Val::StackEnv(b)) => a == b,
            (Val::HeapEnv(a), Val::HeapEnv(b)) => Rc::ptr_eq(a, b),
            (Val::StackCont(a), Val::StackCont(b)) => a == b,
            (Val::Cont(a), Val::Cont(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Nil => "nil",
            Val::True => "t",
            Val::Unbound => "unbound",
            Val::Fixnum(_) => "fixnum",
            Val::Symbol(_) => "symbol",
            Val::Cons(_) => "cons",
            Val::Vector(_) => "vector",
            Val::Closure(_) => "closure",
            Val::Primitive(_) => "primitive",
            Val::StackEnv(_) => "stack-env",
            Val::HeapEnv(_) => "heap-env",
            Val::StackCont(_) => "stack-continuation",
            Val::Cont(_) => "continuation",
        }
    }
}

/// Structural equality for lists and vectors, identity for everything else.
///
/// Walks with an explicit worklist. A pair of cells already under comparison
/// is assumed equal when met again, so circular structure terminates.
impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self.clone(), other.clone())];
        let mut seen: FastHashSet<(usize, usize)> = fast_hash_set_new();
        while let Some((a, b)) = pending.pop() {
            match (&a, &b) {
                (Val::Cons(x), Val::Cons(y)) => {
                    if Rc::ptr_eq(x, y) || !seen.insert((Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize)) {
                        continue;
                    }
                    pending.push((x.cdr(), y.cdr()));
                    pending.push((x.car(), y.car()));
                }
                (Val::Vector(x), Val::Vector(y)) => {
                    if Rc::ptr_eq(x, y) || !seen.insert((Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize)) {
                        continue;
                    }
                    let (xs, ys) = (RefCell::borrow(x), RefCell::borrow(y));
                    if xs.len() != ys.len() {
                        return false;
                    }
                    pending.extend(xs.iter().cloned().zip(ys.iter().cloned()));
                }
                _ if !a.is(&b) => return false,
                _ => {}
            }
        }
        true
    }
}
