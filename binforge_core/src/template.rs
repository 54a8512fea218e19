//! Field descriptors a schema is declared with.
//!
//! A [`FieldTemplate`] is an inert description: name, kind, default value,
//! output transform and fuzzing options. [`Tree::new`](crate::tree::Tree::new)
//! instantiates a template into live nodes; repeated groups keep their element
//! template around to instantiate more elements when their count changes.

use crate::codec::LeafCodec;
use crate::error::TreeError;
use crate::packing::{IntSpec, Packing, StrSpec, ordered};
use crate::scope::Scope;
use crate::transform::Transform;
use crate::value::{Value, ValueCell};
use std::sync::Arc;

/// Default bounds for randomly sized repeated groups.
pub const DEFAULT_GROUP_MIN: usize = 1;
pub const DEFAULT_GROUP_MAX: usize = 10;

/// How a repeated group decides its element count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CountRule {
    Fixed(usize),
    /// Drawn once from the inclusive range.
    Random { min: usize, max: usize },
    /// Follows the count of the repeated group at `source`. Each
    /// `(element_field, source_field)` pair binds `self[i].element_field` to
    /// `source[i].source_field`. `min`/`max` give the fallback count used when
    /// the two groups ask each other for their counts during initialization.
    Bound {
        source: String,
        fields: Vec<(String, String)>,
        min: usize,
        max: usize,
    },
}

impl CountRule {
    pub fn random(min: usize, max: usize) -> Self {
        let (min, max) = ordered(min, max);
        CountRule::Random { min, max }
    }

    pub fn bound(source: impl Into<String>) -> Self {
        CountRule::Bound {
            source: source.into(),
            fields: Vec::new(),
            min: DEFAULT_GROUP_MIN,
            max: DEFAULT_GROUP_MAX,
        }
    }

    /// Adds an element-field binding to a [`CountRule::Bound`]; no-op for other rules.
    pub fn with_field(mut self, element_field: impl Into<String>, source_field: impl Into<String>) -> Self {
        if let CountRule::Bound { fields, .. } = &mut self {
            fields.push((element_field.into(), source_field.into()));
        }
        self
    }
}

impl Default for CountRule {
    fn default() -> Self {
        CountRule::Random {
            min: DEFAULT_GROUP_MIN,
            max: DEFAULT_GROUP_MAX,
        }
    }
}

/// Per-field fuzzing knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuzzOptions {
    /// `false` excludes the field, and everything below it, from selection.
    pub enabled: bool,
    /// Replaces the generated candidate set entirely.
    pub values: Option<Vec<Value>>,
    /// Appended to the generated candidate set.
    pub extra: Vec<Value>,
    /// Upper bound on generated string candidates.
    pub max_length: Option<usize>,
}

impl Default for FuzzOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            values: None,
            extra: Vec::new(),
            max_length: None,
        }
    }
}

/// Overrides layered onto a field's [`FuzzOptions`] at selection time,
/// keyed by full name (typically loaded from a config file).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FuzzPatch {
    pub enabled: Option<bool>,
    pub values: Option<Vec<Value>>,
    pub extra: Vec<Value>,
    pub max_length: Option<usize>,
}

impl FuzzPatch {
    pub fn apply(&self, options: &mut FuzzOptions) {
        if let Some(enabled) = self.enabled {
            options.enabled = enabled;
        }
        if let Some(values) = &self.values {
            options.values = Some(values.clone());
        }
        options.extra.extend(self.extra.iter().cloned());
        if let Some(max_length) = self.max_length {
            options.max_length = Some(max_length);
        }
    }
}

/// A per-tree sequence handing out `start, start + step, ...` to each
/// instantiation of a template that declares it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterSpec {
    pub name: String,
    pub start: i128,
    pub step: i128,
}

#[derive(Clone, Debug)]
pub enum TemplateKind {
    Int(IntSpec),
    Str(StrSpec),
    Bool,
    Custom(Arc<dyn LeafCodec>),
    Composite(Vec<FieldTemplate>),
    Repeated {
        element: Arc<FieldTemplate>,
        count: CountRule,
    },
}

impl TemplateKind {
    pub fn name(&self) -> &'static str {
        match self {
            TemplateKind::Int(_) => "int",
            TemplateKind::Str(_) => "str",
            TemplateKind::Bool => "bool",
            TemplateKind::Custom(codec) => codec.name(),
            TemplateKind::Composite(_) => "composite",
            TemplateKind::Repeated { .. } => "repeated",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldTemplate {
    pub name: String,
    pub kind: TemplateKind,
    pub cell: ValueCell,
    pub action: Option<Transform>,
    pub hidden: bool,
    pub fuzz: FuzzOptions,
    pub counter: Option<CounterSpec>,
}

impl FieldTemplate {
    fn with_kind(name: impl Into<String>, kind: TemplateKind) -> Self {
        Self {
            name: name.into(),
            kind,
            cell: ValueCell::Unset,
            action: None,
            hidden: false,
            fuzz: FuzzOptions::default(),
            counter: None,
        }
    }

    pub fn int(name: impl Into<String>, packing: Packing) -> Self {
        Self::with_kind(name, TemplateKind::Int(IntSpec::new(packing)))
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::with_kind(name, TemplateKind::Str(StrSpec::default()))
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::with_kind(name, TemplateKind::Bool)
    }

    pub fn custom(name: impl Into<String>, codec: impl LeafCodec + 'static) -> Self {
        Self::with_kind(name, TemplateKind::Custom(Arc::new(codec)))
    }

    pub fn composite(name: impl Into<String>) -> Self {
        Self::with_kind(name, TemplateKind::Composite(Vec::new()))
    }

    pub fn repeated(name: impl Into<String>, element: FieldTemplate, count: CountRule) -> Self {
        Self::with_kind(
            name,
            TemplateKind::Repeated {
                element: Arc::new(element),
                count,
            },
        )
    }

    /// Appends `child`, or replaces the existing child of the same name in place.
    ///
    /// Replacing keeps the original position, so a derived layout can override a
    /// base layout's field without disturbing serialization order.
    pub fn with_field(mut self, child: FieldTemplate) -> Self {
        if let TemplateKind::Composite(children) = &mut self.kind {
            match children.iter_mut().find(|c| c.name == child.name) {
                Some(slot) => *slot = child,
                None => children.push(child),
            }
        }
        self
    }

    pub fn child(&self, name: &str) -> Option<&FieldTemplate> {
        match &self.kind {
            TemplateKind::Composite(children) => children.iter().find(|c| c.name == name),
            _ => None,
        }
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.cell = ValueCell::Literal(value.into());
        self
    }

    pub fn cell(mut self, cell: ValueCell) -> Self {
        self.cell = cell;
        self
    }

    pub fn deferred<F>(self, f: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> Result<Value, TreeError> + Send + Sync + 'static,
    {
        self.cell(ValueCell::deferred(f))
    }

    pub fn computed<T, I, S>(self, transform: T, sources: I) -> Self
    where
        T: Into<Transform>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cell(ValueCell::computed(transform, sources))
    }

    pub fn bound(self, path: impl Into<String>) -> Self {
        self.cell(ValueCell::bind(path))
    }

    /// Output transform applied once to the field's assembled bytes.
    pub fn action(mut self, transform: impl Into<Transform>) -> Self {
        self.action = Some(transform.into());
        self
    }

    /// Numeric range for random defaults. Ignored by non-numeric kinds.
    pub fn range(mut self, min: i128, max: i128) -> Self {
        if let TemplateKind::Int(spec) = &mut self.kind {
            *spec = spec.with_range(min, max);
        }
        self
    }

    /// Length bounds for random defaults (and padding). Ignored by non-string kinds.
    pub fn length(mut self, min: usize, max: usize) -> Self {
        if let TemplateKind::Str(spec) = &mut self.kind {
            *spec = std::mem::take(spec).with_length(min, max);
        }
        self
    }

    pub fn charset(mut self, charset: impl Into<Vec<u8>>) -> Self {
        if let TemplateKind::Str(spec) = &mut self.kind {
            let charset = charset.into();
            if !charset.is_empty() {
                spec.charset = charset;
            }
        }
        self
    }

    pub fn pad(mut self, byte: u8) -> Self {
        if let TemplateKind::Str(spec) = &mut self.kind {
            spec.pad = Some(byte);
        }
        self
    }

    /// Reachable by name but contributes no bytes.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn no_fuzz(mut self) -> Self {
        self.fuzz.enabled = false;
        self
    }

    pub fn fuzz_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.fuzz.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn fuzz_extra<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.fuzz.extra.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn fuzz_max_length(mut self, max_length: usize) -> Self {
        self.fuzz.max_length = Some(max_length);
        self
    }

    pub fn counter(mut self, name: impl Into<String>, start: i128, step: i128) -> Self {
        self.counter = Some(CounterSpec {
            name: name.into(),
            start,
            step,
        });
        self
    }
}
