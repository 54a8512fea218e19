use crate::action::ActionError;
use thiserror::Error;

/// Errors raised while building, resolving or restructuring a [`Tree`](crate::tree::Tree).
///
/// Resolution is deterministic, so none of these are worth retrying: the same
/// call against the same tree reproduces the same failure.
#[derive(Error, Debug)]
pub enum TreeError {
    /// A bound reference points at a node that is not (yet) reachable from the root,
    /// or at a repeated-group element that does not exist.
    #[error("Binding of '{field}' to '{target}' cannot be resolved")]
    BindingUnresolved { field: String, target: String },

    /// A resolved value has a shape the node kind cannot pack,
    /// e.g. raw bytes assigned to a numeric field.
    #[error("Field '{field}' cannot encode a {found} value")]
    UnknownValueKind { field: String, found: &'static str },

    /// A custom leaf codec was asked for something it does not provide.
    #[error("{kind} does not implement '{method}'")]
    NotImplemented {
        kind: &'static str,
        method: &'static str,
    },

    /// A path lookup did not match any child.
    #[error("No field at path '{path}' (looked up from '{from}')")]
    FieldNotFound { from: String, path: String },

    /// The id refers to a node that was discarded (e.g. a regenerated group element).
    #[error("Node id {0} is not part of the tree")]
    UnknownNode(usize),

    /// A count operation was requested on something that is not a repeated group.
    #[error("Field '{0}' is not a repeated group")]
    NotRepeated(String),

    /// Resolving the field re-entered itself.
    #[error("Cyclic dependency while resolving '{0}'")]
    CyclicDependency(String),

    /// An action over the field's inputs failed.
    #[error("Action failed: {0}")]
    Action(#[from] ActionError),
}
