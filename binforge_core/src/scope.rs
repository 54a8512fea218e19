use crate::error::TreeError;
use crate::tree::{NodeId, Tree};
use crate::value::Value;
use rand_chacha::ChaCha8Rng;

/// Salt separating [`Scope::rng`] from the generator behind random defaults.
const SCOPE_SALT: u64 = 0x5c0e_5a17;

/// The view a deferred value, computed value or conditional predicate gets of
/// the tree while its owning node resolves.
///
/// Paths are looked up relative to `base`, the node's enclosing composite.
/// Every read is recorded against `reader`, so changing what was read later
/// invalidates the reader's cache.
pub struct Scope<'t> {
    tree: &'t mut Tree,
    base: NodeId,
    reader: NodeId,
}

impl<'t> Scope<'t> {
    pub(crate) fn new(tree: &'t mut Tree, base: NodeId, reader: NodeId) -> Self {
        Self { tree, base, reader }
    }

    pub fn base(&self) -> NodeId {
        self.base
    }

    /// The node being resolved.
    pub fn reader(&self) -> NodeId {
        self.reader
    }

    /// Read-only access for structural queries. Reads through it are not tracked.
    pub fn tree(&self) -> &Tree {
        &*self.tree
    }

    /// Resolves `path` without recording a read.
    pub fn field(&mut self, path: &str) -> Result<NodeId, TreeError> {
        self.tree.find(self.base, path)
    }

    fn track(&mut self, path: &str) -> Result<NodeId, TreeError> {
        let id = self.field(path)?;
        self.tree.depend(id, self.reader);
        Ok(id)
    }

    pub fn bytes(&mut self, path: &str) -> Result<Vec<u8>, TreeError> {
        let id = self.track(path)?;
        self.tree.to_bytes(id)
    }

    pub fn value(&mut self, path: &str) -> Result<Value, TreeError> {
        let id = self.track(path)?;
        self.tree.value(id)
    }

    pub fn int(&mut self, path: &str) -> Result<i128, TreeError> {
        let value = self.value(path)?;
        value.as_int().ok_or_else(|| TreeError::UnknownValueKind {
            field: path.to_string(),
            found: value.kind_name(),
        })
    }

    pub fn flag(&mut self, path: &str) -> Result<bool, TreeError> {
        Ok(self.value(path)?.is_truthy())
    }

    /// Element count of the repeated group at `path`.
    pub fn count(&mut self, path: &str) -> Result<usize, TreeError> {
        let id = self.track(path)?;
        self.tree.count(id)
    }

    pub fn length(&mut self, path: &str) -> Result<usize, TreeError> {
        let id = self.track(path)?;
        self.tree.result_length(id)
    }

    /// Offset from the root. Anything before the field can move it, so the read
    /// is recorded against the root.
    pub fn offset(&mut self, path: &str) -> Result<usize, TreeError> {
        let id = self.field(path)?;
        let root = self.tree.root();
        self.tree.depend(root, self.reader);
        self.tree.offset(id)
    }

    /// Deterministic generator for the reader, stable across re-resolution.
    pub fn rng(&self) -> Result<ChaCha8Rng, TreeError> {
        self.tree.node_rng(self.reader, SCOPE_SALT)
    }
}
