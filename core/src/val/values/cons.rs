use std::{cell::RefCell, rc::Rc};

use super::Val;

/// Mutable pair. `SCAR`/`SCDR` mutate through shared references.
#[derive(Debug)]
pub struct Cons {
    car: RefCell<Val>,
    cdr: RefCell<Val>,
}

impl Cons {
    pub fn new(car: Val, cdr: Val) -> Self {
        Self {
            car: RefCell::new(car),
            cdr: RefCell::new(cdr),
        }
    }

    #[inline]
    pub fn car(&self) -> Val {
        self.car.borrow().clone()
    }

    #[inline]
    pub fn cdr(&self) -> Val {
        self.cdr.borrow().clone()
    }

    #[inline]
    pub fn set_car(&self, val: Val) {
        *self.car.borrow_mut() = val;
    }

    #[inline]
    pub fn set_cdr(&self, val: Val) {
        *self.cdr.borrow_mut() = val;
    }
}

/// Long lists are released one cell at a time instead of recursing down the cdr.
impl Drop for Cons {
    fn drop(&mut self) {
        let mut next = self.cdr.take();
        while let Val::Cons(cell) = next {
            match Rc::try_unwrap(cell) {
                Ok(cell) => next = cell.cdr.take(),
                Err(_) => break,
            }
        }
    }
}

/// Build a proper list from the items, in order.
pub fn list_from_iter<I>(items: I) -> Val
where
    I: IntoIterator<Item = Val>,
    I::IntoIter: DoubleEndedIterator,
{
    items.into_iter().rev().fold(Val::Nil, |tail, item| Val::cons(item, tail))
}

/// Collect the elements of a list. Returns `None` for an improper list.
pub fn list_to_vec(list: &Val) -> Option<Vec<Val>> {
    let mut out = Vec::new();
    let mut cur = list.clone();
    loop {
        match cur {
            Val::Nil => return Some(out),
            Val::Cons(cell) => {
                out.push(cell.car());
                cur = cell.cdr();
            }
            _ => return None,
        }
    }
}
