use super::{Symbol, Val};

impl From<i64> for Val {
    #[inline]
    fn from(n: i64) -> Self {
        Val::Fixnum(n)
    }
}

impl From<i32> for Val {
    #[inline]
    fn from(n: i32) -> Self {
        Val::Fixnum(n as i64)
    }
}

impl From<bool> for Val {
    #[inline]
    fn from(b: bool) -> Self {
        Val::from_bool(b)
    }
}

impl From<Symbol> for Val {
    #[inline]
    fn from(sym: Symbol) -> Self {
        Val::Symbol(sym)
    }
}

impl<T> From<Vec<T>> for Val
where
    T: Into<Val>,
{
    /// Vectors of host values become proper lists.
    fn from(items: Vec<T>) -> Self {
        super::list_from_iter(items.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl TryFrom<&Val> for i64 {
    type Error = anyhow::Error;

    fn try_from(val: &Val) -> Result<Self, Self::Error> {
        val.as_fixnum()
            .ok_or_else(|| anyhow::anyhow!("expected fixnum, got {}", val.type_name()))
    }
}
