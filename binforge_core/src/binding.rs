//! Repeated groups: count resolution, element instantiation, and count
//! bindings between groups.
//!
//! A group bound to another (`CountRule::Bound`) registers itself as a watcher
//! of its source. When the source regenerates with a different count every
//! watcher is marked stale and re-initializes the next time it is touched.
//! Two groups may be bound to each other; while one is initializing, a count
//! query against it answers with its fallback count instead of recursing.

use crate::error::TreeError;
use crate::template::CountRule;
use crate::tree::{GroupState, NodeId, NodeKind, Tree};
use crate::value::{Binding, ValueCell};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

/// Salt for the generator behind random counts.
const COUNT_SALT: u64 = 0xc0_47;

impl Tree {
    fn group_state(&self, id: NodeId) -> Result<GroupState, TreeError> {
        match &self.node(id)?.kind {
            NodeKind::Repeated(group) => Ok(group.state),
            _ => Err(TreeError::NotRepeated(self.full_name(id)?)),
        }
    }

    fn set_group_state(&mut self, id: NodeId, state: GroupState) -> Result<(), TreeError> {
        if let NodeKind::Repeated(group) = &mut self.node_mut(id)?.kind {
            group.state = state;
        }
        Ok(())
    }

    fn count_rule(&self, id: NodeId) -> Result<CountRule, TreeError> {
        match &self.node(id)?.kind {
            NodeKind::Repeated(group) => Ok(group.rule.clone()),
            _ => Err(TreeError::NotRepeated(self.full_name(id)?)),
        }
    }

    /// Current element count of the repeated group `id`.
    pub fn count(&mut self, id: NodeId) -> Result<usize, TreeError> {
        match self.group_state(id)? {
            GroupState::Ready => Ok(self.node(id)?.children.len()),
            GroupState::Initializing => self.fallback_count(id),
            GroupState::Uninit | GroupState::Stale => {
                self.init_group(id)?;
                Ok(self.node(id)?.children.len())
            }
        }
    }

    /// Forces the group to `count` elements, instantiating or discarding as needed.
    /// Groups bound to this one follow on their next access.
    pub fn set_count(&mut self, id: NodeId, count: usize) -> Result<(), TreeError> {
        self.ensure_group(id)?;
        self.regenerate(id, count)?;
        self.bind_elements(id)
    }

    pub(crate) fn ensure_group(&mut self, id: NodeId) -> Result<(), TreeError> {
        match self.group_state(id)? {
            GroupState::Uninit | GroupState::Stale => self.init_group(id),
            GroupState::Initializing | GroupState::Ready => Ok(()),
        }
    }

    fn init_group(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.set_group_state(id, GroupState::Initializing)?;
        let result = self
            .resolve_count(id)
            .and_then(|count| self.regenerate(id, count))
            .and_then(|()| self.bind_elements(id));
        match result {
            Ok(()) => self.set_group_state(id, GroupState::Ready),
            Err(e) => {
                self.set_group_state(id, GroupState::Uninit)?;
                Err(e)
            }
        }
    }

    fn resolve_count(&mut self, id: NodeId) -> Result<usize, TreeError> {
        match self.count_rule(id)? {
            CountRule::Fixed(count) => Ok(count),
            CountRule::Random { min, max } => self.draw_count(id, min, max),
            CountRule::Bound { source, .. } => {
                let source = self.bound_source(id, &source)?;
                if let NodeKind::Repeated(group) = &mut self.node_mut(source)?.kind {
                    group.watchers.insert(id);
                }
                self.count(source)
            }
        }
    }

    fn bound_source(&mut self, id: NodeId, path: &str) -> Result<NodeId, TreeError> {
        let base = self.scope_base(id)?;
        let source = self
            .find(base, path)
            .map_err(|_| TreeError::BindingUnresolved {
                field: self.full_name(id).unwrap_or_default(),
                target: path.to_string(),
            })?;
        if !self.is_group(source)? {
            return Err(TreeError::NotRepeated(self.full_name(source)?));
        }
        Ok(source)
    }

    /// The count a group reports while it is still working out its real one.
    fn fallback_count(&self, id: NodeId) -> Result<usize, TreeError> {
        match self.count_rule(id)? {
            CountRule::Fixed(count) => Ok(count),
            CountRule::Random { min, max } | CountRule::Bound { min, max, .. } => {
                self.draw_count(id, min, max)
            }
        }
    }

    fn draw_count(&self, id: NodeId, min: usize, max: usize) -> Result<usize, TreeError> {
        let (min, max) = crate::packing::ordered(min, max);
        Ok(self.node_rng(id, COUNT_SALT)?.random_range(min..=max))
    }

    /// Rebuilds the group's elements when `count` differs from the current one,
    /// then invalidates everything that depended on the old shape.
    fn regenerate(&mut self, id: NodeId, count: usize) -> Result<(), TreeError> {
        let current = self.node(id)?.children.len();
        if current == count {
            return Ok(());
        }
        let (element, watchers) = match &self.node(id)?.kind {
            NodeKind::Repeated(group) => (Arc::clone(&group.element), group.watchers.clone()),
            _ => return Err(TreeError::NotRepeated(self.full_name(id)?)),
        };
        debug!(group = %self.full_name(id)?, from = current, to = count, "Regenerating group");

        for old in std::mem::take(&mut self.node_mut(id)?.children) {
            self.free_subtree(old);
        }
        let name = self.node(id)?.name.clone();
        let mut elements = Vec::with_capacity(count);
        for index in 0..count {
            elements.push(self.instantiate(&element, Some(format!("{name}[{index}]")), Some(id)));
        }
        self.node_mut(id)?.children = elements.clone();
        for element in elements {
            self.initialize_groups(element)?;
        }
        self.reset(id);

        for watcher in watchers {
            if !self.is_live(watcher) {
                continue;
            }
            if let NodeKind::Repeated(group) = &mut self.node_mut(watcher)?.kind {
                if group.state == GroupState::Ready {
                    group.state = GroupState::Stale;
                }
            }
            self.reset(watcher);
        }
        Ok(())
    }

    /// Points each element's bound fields at the matching element of the source group.
    fn bind_elements(&mut self, id: NodeId) -> Result<(), TreeError> {
        let CountRule::Bound { source, fields, .. } = self.count_rule(id)? else {
            return Ok(());
        };
        if fields.is_empty() {
            return Ok(());
        }
        let source = self.bound_source(id, &source)?;
        let elements = self.node(id)?.children.clone();
        for (index, element) in elements.into_iter().enumerate() {
            for (element_field, source_field) in &fields {
                let target = if element_field.is_empty() {
                    element
                } else {
                    self.find(element, element_field)?
                };
                self.node_mut(target)?.cell = ValueCell::Bound(Binding::Element {
                    group: source,
                    index,
                    field: source_field.clone(),
                });
                self.reset(target);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TreeError;
    use crate::packing::{Endian, Packing};
    use crate::template::{CountRule, FieldTemplate};
    use crate::tree::Tree;
    use crate::value::{Value, ValueCell};

    fn u8_field(name: &str) -> FieldTemplate {
        FieldTemplate::int(name, Packing::unsigned(1, Endian::Big))
    }

    fn palette() -> FieldTemplate {
        let entry = FieldTemplate::composite("entry")
            .with_field(u8_field("red").range(1, 9))
            .with_field(u8_field("green").range(1, 9));
        let alpha = FieldTemplate::composite("alpha").with_field(u8_field("a").value(0xffu8));
        FieldTemplate::composite("image")
            .with_field(u8_field("n").deferred(|scope| Ok(Value::from(scope.count("entries")?))))
            .with_field(FieldTemplate::repeated("entries", entry, CountRule::random(2, 5)))
            .with_field(FieldTemplate::repeated(
                "alphas",
                alpha,
                CountRule::bound("entries").with_field("a", "red"),
            ))
    }

    #[test]
    fn random_count_stays_within_bounds() {
        for seed in 0..20 {
            let mut tree = Tree::new(&palette(), seed).unwrap();
            let entries = tree.lookup("entries").unwrap();
            let count = tree.count(entries).unwrap();
            assert!((2..=5).contains(&count));
            let alphas = tree.lookup("alphas").unwrap();
            assert_eq!(tree.count(alphas).unwrap(), count);
        }
    }

    #[test]
    fn bound_group_follows_source_count_and_values() {
        let mut tree = Tree::new(&palette(), 4).unwrap();
        let entries = tree.lookup("entries").unwrap();
        tree.set_count(entries, 3).unwrap();
        let root = tree.root();
        let bytes = tree.to_bytes(root).unwrap();
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes.len(), 1 + 3 * 2 + 3);

        let alphas = tree.lookup("alphas").unwrap();
        assert_eq!(tree.count(alphas).unwrap(), 3);
        for i in 0..3 {
            let red = tree.lookup(&format!("entries[{i}].red")).unwrap();
            let a = tree.lookup(&format!("alphas[{i}].a")).unwrap();
            assert_eq!(tree.value(a).unwrap(), tree.value(red).unwrap());
        }

        let red = tree.lookup("entries[1].red").unwrap();
        tree.set_literal(red, 0x42u8).unwrap();
        let bytes = tree.to_bytes(root).unwrap();
        assert_eq!(bytes[1 + 3 * 2 + 1], 0x42);
    }

    #[test]
    fn shrinking_the_source_discards_elements() {
        let mut tree = Tree::new(&palette(), 1).unwrap();
        let entries = tree.lookup("entries").unwrap();
        tree.set_count(entries, 4).unwrap();
        let last = tree.lookup("alphas[3].a").unwrap();
        tree.set_count(entries, 1).unwrap();

        let root = tree.root();
        assert_eq!(tree.to_bytes(root).unwrap().len(), 1 + 2 + 1);
        assert!(matches!(
            tree.to_bytes(last),
            Err(TreeError::UnknownNode(_))
        ));
        assert!(matches!(
            tree.lookup("alphas[1]"),
            Err(TreeError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn regeneration_resets_readers_of_discarded_elements() {
        let template = FieldTemplate::composite("r")
            .with_field(FieldTemplate::repeated(
                "entries",
                u8_field("e").value(1u8),
                CountRule::Fixed(2),
            ))
            .with_field(u8_field("first").bound("entries[0]"));
        let mut tree = Tree::new(&template, 0).unwrap();
        let root = tree.root();
        let head = tree.lookup("entries[0]").unwrap();
        tree.set_literal(head, 0x42u8).unwrap();
        assert_eq!(tree.to_bytes(root).unwrap(), vec![0x42, 1, 0x42]);

        let entries = tree.lookup("entries").unwrap();
        tree.set_count(entries, 3).unwrap();
        assert_eq!(tree.to_bytes(root).unwrap(), vec![1, 1, 1, 1]);
        tree.reset_all();
        assert_eq!(tree.to_bytes(root).unwrap(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn set_count_to_same_value_keeps_elements() {
        let mut tree = Tree::new(&palette(), 2).unwrap();
        let entries = tree.lookup("entries").unwrap();
        tree.set_count(entries, 2).unwrap();
        let first = tree.lookup("entries[0]").unwrap();
        tree.set_count(entries, 2).unwrap();
        assert_eq!(tree.lookup("entries[0]").unwrap(), first);
    }

    #[test]
    fn mutually_bound_groups_settle_on_one_count() {
        let template = FieldTemplate::composite("r")
            .with_field(FieldTemplate::repeated(
                "left",
                u8_field("l").value(1u8),
                CountRule::Bound {
                    source: "right".into(),
                    fields: Vec::new(),
                    min: 2,
                    max: 6,
                },
            ))
            .with_field(FieldTemplate::repeated(
                "right",
                u8_field("r").value(2u8),
                CountRule::bound("left"),
            ));
        let mut tree = Tree::new(&template, 11).unwrap();
        let left = tree.lookup("left").unwrap();
        let right = tree.lookup("right").unwrap();
        let n = tree.count(left).unwrap();
        assert!((2..=6).contains(&n));
        assert_eq!(tree.count(right).unwrap(), n);

        tree.set_count(right, 7).unwrap();
        assert_eq!(tree.count(left).unwrap(), 7);
        let root = tree.root();
        assert_eq!(tree.to_bytes(root).unwrap().len(), 14);
    }

    #[test]
    fn counting_a_leaf_is_rejected() {
        let mut tree = Tree::new(&palette(), 0).unwrap();
        let n = tree.lookup("n").unwrap();
        assert!(matches!(tree.count(n), Err(TreeError::NotRepeated(_))));
    }

    #[test]
    fn count_bound_to_missing_group_is_unresolved() {
        let template = FieldTemplate::composite("r").with_field(FieldTemplate::repeated(
            "g",
            u8_field("x"),
            CountRule::bound("nowhere"),
        ));
        assert!(matches!(
            Tree::new(&template, 0),
            Err(TreeError::BindingUnresolved { .. })
        ));
    }

    #[test]
    fn element_binding_to_whole_element() {
        let template = FieldTemplate::composite("r")
            .with_field(FieldTemplate::repeated(
                "src",
                FieldTemplate::string("s").value("ab"),
                CountRule::Fixed(2),
            ))
            .with_field(FieldTemplate::repeated(
                "copy",
                FieldTemplate::string("c"),
                CountRule::bound("src").with_field("", ""),
            ));
        let mut tree = Tree::new(&template, 0).unwrap();
        let root = tree.root();
        assert_eq!(tree.to_bytes(root).unwrap(), b"abababab".to_vec());
        let c = tree.lookup("copy[1]").unwrap();
        assert!(matches!(tree.cell(c).unwrap(), ValueCell::Bound(_)));
    }
}
