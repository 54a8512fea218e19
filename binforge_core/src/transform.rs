use crate::action::{Action, ActionError, Reversible};
use crate::error::TreeError;
use crate::scope::Scope;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

pub type Predicate = Arc<dyn Fn(&mut Scope<'_>) -> Result<bool, TreeError> + Send + Sync>;

/// An action as it is attached to a tree: either a plain [`Action`] or a
/// conditional that picks one at resolution time.
#[derive(Clone)]
pub enum Transform {
    Action(Arc<dyn Action>),
    If(Arc<Conditional>),
}

impl Transform {
    pub fn new<A: Action + 'static>(action: A) -> Self {
        Transform::Action(Arc::new(action))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Action(a) => a.name(),
            Transform::If(_) => "if",
        }
    }

    /// Runs once over `inputs`. Conditionals evaluate their predicates against `scope`.
    pub fn run(&self, scope: &mut Scope<'_>, inputs: &[Vec<u8>]) -> Result<Value, TreeError> {
        match self {
            Transform::Action(action) => Ok(action.apply(inputs)?),
            Transform::If(cond) => cond.run(scope, inputs),
        }
    }

    /// The inverse of a plain reversible action; conditionals have none because
    /// the branch taken depends on tree state.
    pub fn reversible(&self) -> Option<&dyn Reversible> {
        match self {
            Transform::Action(action) => action.reversible(),
            Transform::If(_) => None,
        }
    }

    pub fn invert(&self, data: &[u8]) -> Result<Vec<u8>, ActionError> {
        self.reversible()
            .ok_or(ActionError::NotReversible {
                action: self.name(),
            })?
            .invert(data)
    }
}

impl<A: Action + 'static> From<A> for Transform {
    fn from(action: A) -> Self {
        Transform::new(action)
    }
}

impl From<Conditional> for Transform {
    fn from(cond: Conditional) -> Self {
        Transform::If(Arc::new(cond))
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Action(a) => write!(f, "Action({})", a.name()),
            Transform::If(c) => write!(f, "If({} branches)", c.branches.len()),
        }
    }
}

/// Ordered `(predicate, transform)` branches with an optional fallback.
///
/// The first predicate that holds selects its transform. With no match and no
/// fallback the result is empty bytes.
#[derive(Clone, Default)]
pub struct Conditional {
    branches: Vec<(Predicate, Transform)>,
    otherwise: Option<Transform>,
}

impl Conditional {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when<P, T>(mut self, predicate: P, then: T) -> Self
    where
        P: Fn(&mut Scope<'_>) -> Result<bool, TreeError> + Send + Sync + 'static,
        T: Into<Transform>,
    {
        self.branches.push((Arc::new(predicate), then.into()));
        self
    }

    pub fn otherwise<T: Into<Transform>>(mut self, fallback: T) -> Self {
        self.otherwise = Some(fallback.into());
        self
    }

    fn run(&self, scope: &mut Scope<'_>, inputs: &[Vec<u8>]) -> Result<Value, TreeError> {
        for (predicate, then) in &self.branches {
            if predicate(scope)? {
                return then.run(scope, inputs);
            }
        }
        match &self.otherwise {
            Some(fallback) => fallback.run(scope, inputs),
            None => Ok(Value::Bytes(Vec::new())),
        }
    }
}
