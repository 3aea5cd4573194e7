use std::{fmt, rc::Rc};

use anyhow::Result;

use super::Val;

/// Host function signature. Arguments arrive in the order they were pushed.
pub type NativeFn = Rc<dyn Fn(&[Val]) -> Result<Val>>;

/// Declared argument count range. `max == None` accepts any number of extra arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exact(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    #[inline]
    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.min && self.max.is_none_or(|max| argc <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{}..={}", self.min, max),
            None => write!(f, "{}..", self.min),
        }
    }
}

pub enum PrimitiveBody {
    Native(NativeFn),
    /// call-with-current-continuation; handled by the engine because it
    /// needs the continuation register.
    CallCc,
}

pub struct Primitive {
    pub name: String,
    pub arity: Arity,
    pub body: PrimitiveBody,
}

impl Primitive {
    pub fn native<F>(name: &str, arity: Arity, f: F) -> Self
    where
        F: Fn(&[Val]) -> Result<Val> + 'static,
    {
        Self {
            name: name.to_string(),
            arity,
            body: PrimitiveBody::Native(Rc::new(f)),
        }
    }

    pub fn call_cc() -> Self {
        Self {
            name: "ccc".to_string(),
            arity: Arity::exact(1),
            body: PrimitiveBody::CallCc,
        }
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}
