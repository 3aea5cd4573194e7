use std::fmt;

use super::Val;

// Circular lists built with SCDR would otherwise print forever.
const MAX_PRINT_ELEMS: usize = 4096;

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Nil => f.write_str("nil"),
            Val::True => f.write_str("t"),
            Val::Unbound => f.write_str("#<unbound>"),
            Val::Fixnum(n) => write!(f, "{n}"),
            Val::Symbol(sym) => write!(f, "{sym}"),
            Val::Cons(_) => write_list(f, self),
            Val::Vector(items) => {
                f.write_str("#(")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Val::Closure(clos) => write!(f, "#<closure @{}>", clos.entry),
            Val::Primitive(prim) => write!(f, "#<primitive {}>", prim.name),
            Val::StackEnv(ptr) => write!(f, "#<stack-env @{ptr}>"),
            Val::HeapEnv(env) => write!(f, "#<env [{}]>", env.len()),
            Val::StackCont(ptr) => write!(f, "#<stack-continuation @{ptr}>"),
            Val::Cont(cont) => write!(f, "#<continuation ip={}>", cont.ip),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, list: &Val) -> fmt::Result {
    f.write_str("(")?;
    let mut cur = list.clone();
    let mut first = true;
    let mut printed = 0usize;
    while let Val::Cons(cell) = cur {
        if printed == MAX_PRINT_ELEMS {
            return f.write_str(" ...)");
        }
        if !first {
            f.write_str(" ")?;
        }
        write!(f, "{}", cell.car())?;
        first = false;
        printed += 1;
        cur = cell.cdr();
    }
    if !cur.is_nil() {
        write!(f, " . {cur}")?;
    }
    f.write_str(")")
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Symbol(sym) => write!(f, "{sym:?}"),
            other => write!(f, "{other}"),
        }
    }
}
