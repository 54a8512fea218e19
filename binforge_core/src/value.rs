use crate::error::TreeError;
use crate::scope::Scope;
use crate::transform::Transform;
use crate::tree::NodeId;
use std::fmt;
use std::sync::Arc;

/// A concrete, fully reduced value.
///
/// How it turns into bytes depends on the node holding it: numeric nodes pack
/// `Int` into their fixed width, string nodes render `Int` as decimal text, and
/// `Bytes` pass through string nodes untouched.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Int(i128),
    Bytes(Vec<u8>),
    Bool(bool),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bytes(_) => "bytes",
            Value::Bool(_) => "bool",
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i128::from(*b)),
            Value::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Truthiness used by conditional predicates: non-zero, non-empty, or `true`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Bytes(b) => !b.is_empty(),
            Value::Bool(b) => *b,
        }
    }

    /// Text rendering used wherever a value lands in a byte-string context.
    pub fn to_text_bytes(&self) -> Vec<u8> {
        match self {
            Value::Int(v) => v.to_string().into_bytes(),
            Value::Bytes(b) => b.clone(),
            Value::Bool(b) => b.to_string().into_bytes(),
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i128::from(v))
            }
        })*
    };
}

value_from_int!(u8, u16, u32, u64, i8, i16, i32, i64, i128);

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i128)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Bytes(v.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Bytes(v.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Closure type behind [`ValueCell::Deferred`].
pub type DeferredFn = Arc<dyn Fn(&mut Scope<'_>) -> Result<Value, TreeError> + Send + Sync>;

/// Where a [`ValueCell::Bound`] value comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    /// A node looked up by path from the bound node's scope.
    Path(String),
    /// `field` inside element `index` of a repeated `group`. An empty `field`
    /// means the element itself.
    Element {
        group: NodeId,
        index: usize,
        field: String,
    },
}

/// The value slot of a field node.
#[derive(Clone, Default)]
pub enum ValueCell {
    /// No value; a random default within the node's bounds is drawn on resolution.
    #[default]
    Unset,
    Literal(Value),
    /// Evaluated against the owning composite's [`Scope`] at resolution time.
    Deferred(DeferredFn),
    /// A transform run over the resolved bytes of the `sources` paths.
    Computed {
        transform: Transform,
        sources: Vec<String>,
    },
    Bound(Binding),
}

impl ValueCell {
    pub fn literal(value: impl Into<Value>) -> Self {
        ValueCell::Literal(value.into())
    }

    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> Result<Value, TreeError> + Send + Sync + 'static,
    {
        ValueCell::Deferred(Arc::new(f))
    }

    pub fn computed<T, I, S>(transform: T, sources: I) -> Self
    where
        T: Into<Transform>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ValueCell::Computed {
            transform: transform.into(),
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    pub fn bind(path: impl Into<String>) -> Self {
        ValueCell::Bound(Binding::Path(path.into()))
    }

    /// Byte offset of the field at `path`, measured from the tree root.
    pub fn offset_of(path: impl Into<String>) -> Self {
        let path = path.into();
        ValueCell::deferred(move |scope| Ok(Value::from(scope.offset(&path)?)))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, ValueCell::Unset)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ValueCell::Unset => "unset",
            ValueCell::Literal(_) => "literal",
            ValueCell::Deferred(_) => "deferred",
            ValueCell::Computed { .. } => "computed",
            ValueCell::Bound(_) => "bound",
        }
    }
}

impl From<Value> for ValueCell {
    fn from(value: Value) -> Self {
        ValueCell::Literal(value)
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueCell::Unset => write!(f, "Unset"),
            ValueCell::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            ValueCell::Deferred(_) => write!(f, "Deferred(..)"),
            ValueCell::Computed { transform, sources } => f
                .debug_struct("Computed")
                .field("transform", &transform.name())
                .field("sources", sources)
                .finish(),
            ValueCell::Bound(b) => f.debug_tuple("Bound").field(b).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rendering_matches_kind() {
        assert_eq!(Value::from(258u16).to_text_bytes(), b"258".to_vec());
        assert_eq!(Value::from(-7i32).to_text_bytes(), b"-7".to_vec());
        assert_eq!(Value::from("abc").to_text_bytes(), b"abc".to_vec());
        assert_eq!(Value::from(true).to_text_bytes(), b"true".to_vec());
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(3).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Bytes(Vec::new()).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::from("x").as_int(), None);
    }

    #[test]
    fn cell_constructors() {
        assert!(ValueCell::default().is_unset());
        assert_eq!(ValueCell::bind("a.b").kind_name(), "bound");
        assert_eq!(ValueCell::offset_of("data").kind_name(), "deferred");
        match ValueCell::literal(5u8) {
            ValueCell::Literal(Value::Int(5)) => {}
            other => panic!("unexpected cell {other:?}"),
        }
    }
}
