//! The live format tree.
//!
//! Nodes live in an arena owned by [`Tree`] and refer to each other by
//! [`NodeId`]: parents own their children's ids, children keep a non-owning
//! parent id. Every node memoizes its resolved bytes. While a node resolves,
//! each field it reads through a [`Scope`] records it as a dependent, so that
//! [`Tree::reset`] can invalidate exactly the caches a change can reach: the
//! node itself, its ancestors, and everything that read any of them.

use crate::codec::LeafCodec;
use crate::error::TreeError;
use crate::packing::{DEFAULT_CHARSET, IntSpec, StrSpec, ordered};
use crate::scope::Scope;
use crate::template::{CountRule, FieldTemplate, FuzzOptions, TemplateKind};
use crate::transform::Transform;
use crate::value::{Binding, Value, ValueCell};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Salt for the generator behind random defaults.
const DEFAULT_SALT: u64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug)]
pub(crate) enum LeafKind {
    Int(IntSpec),
    Str(StrSpec),
    Bool,
    Custom(Arc<dyn LeafCodec>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GroupState {
    Uninit,
    Initializing,
    Ready,
    /// The bound source changed count; re-initialize on next access.
    Stale,
}

#[derive(Clone, Debug)]
pub(crate) struct Group {
    pub(crate) element: Arc<FieldTemplate>,
    pub(crate) rule: CountRule,
    pub(crate) state: GroupState,
    /// Groups whose count is bound to this one.
    pub(crate) watchers: BTreeSet<NodeId>,
}

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    Leaf(LeafKind),
    Composite,
    Repeated(Group),
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) children: Vec<NodeId>,
    pub(crate) cell: ValueCell,
    pub(crate) action: Option<Transform>,
    pub(crate) cache: Option<Vec<u8>>,
    pub(crate) hidden: bool,
    pub(crate) fuzz: FuzzOptions,
    /// Nodes whose last resolution read this one.
    pub(crate) dependents: BTreeSet<NodeId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Leaf,
    Composite,
    Repeated,
}

/// How `result_length` can be answered without (or only by) encoding.
enum Measure {
    Fixed(usize),
    Codec(Arc<dyn LeafCodec>),
    Encode,
    Children,
}

#[derive(Clone, Debug)]
pub struct Tree {
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) root: NodeId,
    seed: u64,
    counters: HashMap<String, i128>,
    resolving: Vec<NodeId>,
}

impl Tree {
    /// Instantiates `template` as the root of a new tree and initializes every
    /// repeated group in it.
    pub fn new(template: &FieldTemplate, seed: u64) -> Result<Self, TreeError> {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            seed,
            counters: HashMap::new(),
            resolving: Vec::new(),
        };
        tree.root = tree.instantiate(template, None, None);
        tree.initialize_groups(tree.root)?;
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn instantiate(
        &mut self,
        template: &FieldTemplate,
        name: Option<String>,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let kind = match &template.kind {
            TemplateKind::Int(spec) => NodeKind::Leaf(LeafKind::Int(*spec)),
            TemplateKind::Str(spec) => NodeKind::Leaf(LeafKind::Str(spec.clone())),
            TemplateKind::Bool => NodeKind::Leaf(LeafKind::Bool),
            TemplateKind::Custom(codec) => NodeKind::Leaf(LeafKind::Custom(Arc::clone(codec))),
            TemplateKind::Composite(_) => NodeKind::Composite,
            TemplateKind::Repeated { element, count } => NodeKind::Repeated(Group {
                element: Arc::clone(element),
                rule: count.clone(),
                state: GroupState::Uninit,
                watchers: BTreeSet::new(),
            }),
        };
        let cell = match &template.counter {
            Some(counter) => {
                let next = self
                    .counters
                    .entry(counter.name.clone())
                    .or_insert(counter.start);
                let value = *next;
                *next += counter.step;
                ValueCell::Literal(Value::Int(value))
            }
            None => template.cell.clone(),
        };
        self.nodes.push(Some(Node {
            name: name.unwrap_or_else(|| template.name.clone()),
            parent,
            kind,
            children: Vec::new(),
            cell,
            action: template.action.clone(),
            cache: None,
            hidden: template.hidden,
            fuzz: template.fuzz.clone(),
            dependents: BTreeSet::new(),
        }));
        if let TemplateKind::Composite(children) = &template.kind {
            let ids: Vec<NodeId> = children
                .iter()
                .map(|child| self.instantiate(child, None, Some(id)))
                .collect();
            if let Some(Some(node)) = self.nodes.get_mut(id.0) {
                node.children = ids;
            }
        }
        id
    }

    /// Initializes every repeated group below (and including) `from`.
    pub(crate) fn initialize_groups(&mut self, from: NodeId) -> Result<(), TreeError> {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if self.shape(id)? == Shape::Repeated {
                self.ensure_group(id)?;
            }
            stack.extend(self.node(id)?.children.iter().rev());
        }
        Ok(())
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(TreeError::UnknownNode(id.0))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::UnknownNode(id.0))
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    fn shape(&self, id: NodeId) -> Result<Shape, TreeError> {
        Ok(match self.node(id)?.kind {
            NodeKind::Leaf(_) => Shape::Leaf,
            NodeKind::Composite => Shape::Composite,
            NodeKind::Repeated(_) => Shape::Repeated,
        })
    }

    pub fn name(&self, id: NodeId) -> Result<&str, TreeError> {
        Ok(&self.node(id)?.name)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, TreeError> {
        Ok(self.node(id)?.parent)
    }

    /// Children in serialization order, hidden ones included. For a repeated
    /// group these are its current elements.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], TreeError> {
        Ok(&self.node(id)?.children)
    }

    pub fn is_atomic(&self, id: NodeId) -> Result<bool, TreeError> {
        Ok(self.shape(id)? == Shape::Leaf)
    }

    pub fn is_group(&self, id: NodeId) -> Result<bool, TreeError> {
        Ok(self.shape(id)? == Shape::Repeated)
    }

    pub fn is_hidden(&self, id: NodeId) -> Result<bool, TreeError> {
        Ok(self.node(id)?.hidden)
    }

    pub fn cell(&self, id: NodeId) -> Result<&ValueCell, TreeError> {
        Ok(&self.node(id)?.cell)
    }

    pub fn fuzz_options(&self, id: NodeId) -> Result<&FuzzOptions, TreeError> {
        Ok(&self.node(id)?.fuzz)
    }

    pub fn kind_name(&self, id: NodeId) -> Result<&'static str, TreeError> {
        Ok(match &self.node(id)?.kind {
            NodeKind::Leaf(LeafKind::Int(_)) => "int",
            NodeKind::Leaf(LeafKind::Str(_)) => "str",
            NodeKind::Leaf(LeafKind::Bool) => "bool",
            NodeKind::Leaf(LeafKind::Custom(codec)) => codec.name(),
            NodeKind::Composite => "composite",
            NodeKind::Repeated(_) => "repeated",
        })
    }

    /// Dotted path from the root, e.g. `ihdr.data.width` or `plte.data.entries[2].red`.
    /// The root's own name is omitted, as are repeated groups (their elements
    /// already carry the group name).
    pub fn full_name(&self, id: NodeId) -> Result<String, TreeError> {
        let node = self.node(id)?;
        let mut names = vec![node.name.as_str()];
        let mut current = node.parent;
        while let Some(pid) = current {
            let parent = self.node(pid)?;
            if parent.parent.is_none() {
                break;
            }
            if !matches!(parent.kind, NodeKind::Repeated(_)) {
                names.push(parent.name.as_str());
            }
            current = parent.parent;
        }
        names.reverse();
        Ok(names.join("."))
    }

    fn display_name(&self, id: NodeId) -> String {
        self.full_name(id).unwrap_or_else(|_| format!("#{}", id.0))
    }

    /// `true` if `node` is `ancestor` or lies below it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).ok().and_then(|n| n.parent);
        }
        false
    }

    /// The composite whose context closures of `id` evaluate in: the nearest
    /// composite ancestor, skipping repeated groups.
    pub(crate) fn scope_base(&self, id: NodeId) -> Result<NodeId, TreeError> {
        let mut current = self.node(id)?.parent;
        while let Some(pid) = current {
            let parent = self.node(pid)?;
            if matches!(parent.kind, NodeKind::Composite) {
                return Ok(pid);
            }
            current = parent.parent;
        }
        Ok(id)
    }

    /// Looks up `path` starting at `from`.
    ///
    /// Segments are separated by `.`; `^` climbs to the enclosing composite,
    /// `name[i]` selects element `i` of a repeated group, and a leading `/`
    /// starts at the root. Groups along the way are initialized on demand.
    pub fn find(&mut self, from: NodeId, path: &str) -> Result<NodeId, TreeError> {
        let (mut current, rest) = match path.strip_prefix('/') {
            Some(rest) => (self.root, rest),
            None => (from, path),
        };
        self.node(current)?;
        for segment in rest.split('.').filter(|s| !s.is_empty()) {
            if segment == "^" {
                let base = self.scope_base(current)?;
                if base == current {
                    return Err(self.not_found(from, path));
                }
                current = base;
                continue;
            }
            let (name, indices) = split_indices(segment).ok_or_else(|| self.not_found(from, path))?;
            if !name.is_empty() {
                current = self
                    .node(current)?
                    .children
                    .iter()
                    .copied()
                    .find(|&c| self.node(c).is_ok_and(|n| n.name == name))
                    .ok_or_else(|| self.not_found(from, path))?;
            }
            for index in indices {
                if self.shape(current)? != Shape::Repeated {
                    return Err(self.not_found(from, path));
                }
                self.ensure_group(current)?;
                current = *self
                    .node(current)?
                    .children
                    .get(index)
                    .ok_or_else(|| self.not_found(from, path))?;
            }
        }
        Ok(current)
    }

    fn not_found(&self, from: NodeId, path: &str) -> TreeError {
        TreeError::FieldNotFound {
            from: self.display_name(from),
            path: path.to_string(),
        }
    }

    fn unresolved(&self, id: NodeId, target: String) -> TreeError {
        TreeError::BindingUnresolved {
            field: self.display_name(id),
            target,
        }
    }

    /// Path lookup from the root.
    pub fn lookup(&mut self, path: &str) -> Result<NodeId, TreeError> {
        let root = self.root;
        self.find(root, path)
    }

    /// Records that `reader` consumed `source` during its resolution.
    pub(crate) fn depend(&mut self, source: NodeId, reader: NodeId) {
        if source == reader {
            return;
        }
        if let Ok(node) = self.node_mut(source) {
            node.dependents.insert(reader);
        }
    }

    fn enter(&mut self, id: NodeId) -> Result<(), TreeError> {
        if self.resolving.contains(&id) {
            return Err(TreeError::CyclicDependency(self.display_name(id)));
        }
        self.resolving.push(id);
        Ok(())
    }

    /// Resolves `id` to its bytes, serving and filling the cache.
    pub fn to_bytes(&mut self, id: NodeId) -> Result<Vec<u8>, TreeError> {
        if let Some(cached) = &self.node(id)?.cache {
            return Ok(cached.clone());
        }
        self.enter(id)?;
        let result = self.build_bytes(id);
        self.resolving.pop();
        let bytes = result?;
        self.node_mut(id)?.cache = Some(bytes.clone());
        Ok(bytes)
    }

    fn build_bytes(&mut self, id: NodeId) -> Result<Vec<u8>, TreeError> {
        let shape = self.shape(id)?;
        let raw = match shape {
            Shape::Leaf => {
                let value = self.leaf_value(id)?;
                self.encode_leaf(id, &value)?
            }
            Shape::Composite | Shape::Repeated => {
                if shape == Shape::Repeated {
                    self.ensure_group(id)?;
                }
                match self.reduce_cell(id)? {
                    Some(value) => value.to_text_bytes(),
                    None => {
                        let mut out = Vec::new();
                        for child in self.visible_children(id)? {
                            out.extend(self.to_bytes(child)?);
                        }
                        out
                    }
                }
            }
        };
        let Some(transform) = self.node(id)?.action.clone() else {
            return Ok(raw);
        };
        let base = self.scope_base(id)?;
        let output = transform.run(&mut Scope::new(self, base, id), &[raw])?;
        match output {
            Value::Bytes(bytes) => Ok(bytes),
            other if shape == Shape::Leaf => self.encode_leaf(id, &other),
            other => Ok(other.to_text_bytes()),
        }
    }

    fn visible_children(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut out = Vec::new();
        for &child in &self.node(id)?.children {
            if !self.node(child)?.hidden {
                out.push(child);
            }
        }
        Ok(out)
    }

    /// The value a node currently resolves to. Leaves reduce their cell (drawing
    /// a random default when unset); composites yield their bytes.
    pub fn value(&mut self, id: NodeId) -> Result<Value, TreeError> {
        if self.shape(id)? != Shape::Leaf {
            return Ok(Value::Bytes(self.to_bytes(id)?));
        }
        self.enter(id)?;
        let result = self.leaf_value(id);
        self.resolving.pop();
        result
    }

    fn leaf_value(&mut self, id: NodeId) -> Result<Value, TreeError> {
        match self.reduce_cell(id)? {
            Some(value) => Ok(value),
            None => self.draw_default(id),
        }
    }

    /// Reduces the node's cell to a literal; `None` for an unset cell.
    fn reduce_cell(&mut self, id: NodeId) -> Result<Option<Value>, TreeError> {
        let cell = self.node(id)?.cell.clone();
        match cell {
            ValueCell::Unset => Ok(None),
            ValueCell::Literal(value) => Ok(Some(value)),
            ValueCell::Deferred(f) => {
                let base = self.scope_base(id)?;
                Ok(Some(f(&mut Scope::new(self, base, id))?))
            }
            ValueCell::Computed { transform, sources } => {
                let base = self.scope_base(id)?;
                let mut scope = Scope::new(self, base, id);
                let mut inputs = Vec::with_capacity(sources.len());
                for source in &sources {
                    inputs.push(scope.bytes(source)?);
                }
                Ok(Some(transform.run(&mut scope, &inputs)?))
            }
            ValueCell::Bound(binding) => {
                let target = self.resolve_binding(id, &binding)?;
                self.depend(target, id);
                Ok(Some(self.value(target)?))
            }
        }
    }

    fn resolve_binding(&mut self, id: NodeId, binding: &Binding) -> Result<NodeId, TreeError> {
        match binding {
            Binding::Path(path) => {
                let base = self.scope_base(id)?;
                self.find(base, path)
                    .map_err(|_| self.unresolved(id, path.clone()))
            }
            Binding::Element {
                group,
                index,
                field,
            } => {
                let target = format!("{}[{}].{}", self.display_name(*group), index, field);
                if !self.is_live(*group) {
                    return Err(self.unresolved(id, target));
                }
                self.count(*group)?;
                self.depend(*group, id);
                let Some(element) = self.node(*group)?.children.get(*index).copied() else {
                    return Err(self.unresolved(id, target));
                };
                if field.is_empty() {
                    return Ok(element);
                }
                self.find(element, field).map_err(|_| self.unresolved(id, target))
            }
        }
    }

    /// Generator for everything random about `id`. Seeded from the tree seed
    /// and the node's full name, so re-resolving an unchanged node after a
    /// reset reproduces the same draws.
    pub(crate) fn node_rng(&self, id: NodeId, salt: u64) -> Result<ChaCha8Rng, TreeError> {
        let digest = md5::compute(self.full_name(id)?.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.0[..8]);
        Ok(ChaCha8Rng::seed_from_u64(
            self.seed ^ u64::from_le_bytes(head) ^ salt,
        ))
    }

    fn leaf_kind(&self, id: NodeId) -> Result<Option<LeafKind>, TreeError> {
        Ok(match &self.node(id)?.kind {
            NodeKind::Leaf(kind) => Some(kind.clone()),
            _ => None,
        })
    }

    fn draw_default(&mut self, id: NodeId) -> Result<Value, TreeError> {
        let Some(kind) = self.leaf_kind(id)? else {
            return Ok(Value::Bytes(self.to_bytes(id)?));
        };
        let mut rng = self.node_rng(id, DEFAULT_SALT)?;
        match kind {
            LeafKind::Int(spec) => {
                let (min, max) = ordered(spec.min, spec.max);
                Ok(Value::Int(rng.random_range(min..=max)))
            }
            LeafKind::Str(spec) => {
                let (min, max) = ordered(spec.min_len, spec.max_len);
                let charset: &[u8] = if spec.charset.is_empty() {
                    DEFAULT_CHARSET
                } else {
                    &spec.charset
                };
                let len = rng.random_range(min..=max);
                Ok(Value::Bytes(
                    (0..len)
                        .map(|_| charset[rng.random_range(0..charset.len())])
                        .collect(),
                ))
            }
            LeafKind::Bool => Ok(Value::Bool(rng.random_bool(0.5))),
            LeafKind::Custom(codec) => codec.default_value(&mut rng),
        }
    }

    fn encode_leaf(&self, id: NodeId, value: &Value) -> Result<Vec<u8>, TreeError> {
        let mismatch = || TreeError::UnknownValueKind {
            field: self.display_name(id),
            found: value.kind_name(),
        };
        match &self.node(id)?.kind {
            NodeKind::Leaf(LeafKind::Int(spec)) => value
                .as_int()
                .map(|v| spec.packing.pack(v))
                .ok_or_else(mismatch),
            NodeKind::Leaf(LeafKind::Str(spec)) => Ok(spec.apply_padding(value.to_text_bytes())),
            NodeKind::Leaf(LeafKind::Bool) => match value {
                Value::Bytes(_) => Err(mismatch()),
                other => Ok(vec![u8::from(other.is_truthy())]),
            },
            NodeKind::Leaf(LeafKind::Custom(codec)) => codec.encode(value),
            _ => Ok(value.to_text_bytes()),
        }
    }

    /// Byte length of the node's resolved output; always `to_bytes(id).len()`.
    ///
    /// Fixed-width leaves answer without resolving, which is what lets offset
    /// fields sit in front of the data they point past. Custom leaves always
    /// answer through their codec, cached or not.
    pub fn result_length(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let node = self.node(id)?;
        let cached = node.cache.as_ref().map(Vec::len);
        let measure = if node.action.is_some() {
            Measure::Encode
        } else {
            match &node.kind {
                NodeKind::Leaf(LeafKind::Int(spec)) => Measure::Fixed(spec.packing.width()),
                NodeKind::Leaf(LeafKind::Bool) => Measure::Fixed(1),
                NodeKind::Leaf(LeafKind::Custom(codec)) => Measure::Codec(Arc::clone(codec)),
                NodeKind::Leaf(LeafKind::Str(_)) => Measure::Encode,
                NodeKind::Composite | NodeKind::Repeated(_) if node.cell.is_unset() => {
                    Measure::Children
                }
                NodeKind::Composite | NodeKind::Repeated(_) => Measure::Encode,
            }
        };
        if let Measure::Codec(codec) = &measure {
            return codec.fixed_len();
        }
        if let Some(len) = cached {
            return Ok(len);
        }
        match measure {
            Measure::Fixed(len) => Ok(len),
            Measure::Codec(codec) => codec.fixed_len(),
            Measure::Encode => Ok(self.to_bytes(id)?.len()),
            Measure::Children => {
                if self.shape(id)? == Shape::Repeated {
                    self.ensure_group(id)?;
                }
                let mut total = 0;
                for child in self.visible_children(id)? {
                    total += self.result_length(child)?;
                }
                Ok(total)
            }
        }
    }

    /// Byte offset of `id` within the root's serialization.
    pub fn offset(&mut self, id: NodeId) -> Result<usize, TreeError> {
        self.node(id)?;
        let root = self.root;
        self.length_up_to(root, id)
    }

    fn length_up_to(&mut self, within: NodeId, target: NodeId) -> Result<usize, TreeError> {
        if within == target {
            return Ok(0);
        }
        if self.shape(within)? == Shape::Repeated {
            self.ensure_group(within)?;
        }
        let mut total = 0;
        for child in self.node(within)?.children.clone() {
            if child == target {
                break;
            }
            if self.contains(child, target) {
                total += self.length_up_to(child, target)?;
                break;
            }
            if !self.node(child)?.hidden {
                total += self.result_length(child)?;
            }
        }
        Ok(total)
    }

    /// Clears the cache of `id`, of every ancestor, and of every node whose
    /// resolution read any of those, transitively.
    pub fn reset(&mut self, id: NodeId) {
        let mut pending = vec![id];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Ok(node) = self.node_mut(current) else {
                continue;
            };
            node.cache = None;
            if let Some(parent) = node.parent {
                pending.push(parent);
            }
            pending.extend(std::mem::take(&mut node.dependents));
        }
    }

    /// Clears every cache in the tree.
    pub fn reset_all(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.cache = None;
        }
    }

    /// Replaces the node's value and invalidates everything that could have seen the old one.
    pub fn set_value(&mut self, id: NodeId, cell: impl Into<ValueCell>) -> Result<(), TreeError> {
        self.node(id)?;
        self.reset(id);
        self.node_mut(id)?.cell = cell.into();
        Ok(())
    }

    pub fn set_literal(&mut self, id: NodeId, value: impl Into<Value>) -> Result<(), TreeError> {
        self.set_value(id, ValueCell::Literal(value.into()))
    }

    /// Swaps the cell without touching any cache; the caller resets afterwards.
    pub(crate) fn restore_cell(&mut self, id: NodeId, cell: ValueCell) -> Result<(), TreeError> {
        self.node_mut(id)?.cell = cell;
        Ok(())
    }

    /// Frees the subtree rooted at `id`. Readers of any freed node are reset first,
    /// since their edges die with the node.
    pub(crate) fn free_subtree(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            self.reset(current);
            if let Some(slot) = self.nodes.get_mut(current.0) {
                if let Some(node) = slot.take() {
                    pending.extend(node.children);
                }
            }
        }
    }
}

/// Splits `name[1][2]` into `("name", [1, 2])`.
fn split_indices(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(open) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };
    let (name, mut rest) = segment.split_at(open);
    let mut indices = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let close = inner.find(']')?;
        indices.push(inner[..close].trim().parse().ok()?);
        rest = &inner[close + 1..];
    }
    Some((name, indices))
}
