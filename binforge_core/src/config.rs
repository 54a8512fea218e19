use crate::fuzz::candidates::DEFAULT_FILLER;
use crate::fuzz::engine::{FuzzPlan, Fuzzer};
use crate::fuzz::sink::{DedupSink, DirectorySink, Sink};
use crate::template::FuzzPatch;
use crate::tree::{NodeId, Tree};
use crate::value::Value;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TreeSettings {
    /// Seed for every random default and count in the tree.
    #[serde(default)]
    pub seed: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzSettings {
    #[serde(default = "default_min_subset")]
    pub min_subset: usize,
    #[serde(default = "default_max_subset")]
    pub max_subset: usize,
    #[serde(default)]
    pub first_trial: u64,
    #[serde(default)]
    pub max_trials: Option<u64>,
    /// Single-byte filler for string candidates, written as a one-character string.
    #[serde(default = "default_filler", deserialize_with = "filler_byte")]
    pub filler: u8,
}

fn default_min_subset() -> usize {
    1
}

fn default_max_subset() -> usize {
    1
}

fn default_filler() -> u8 {
    DEFAULT_FILLER
}

fn filler_byte<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let filler = char::deserialize(deserializer)?;
    u8::try_from(filler).map_err(|_| {
        serde::de::Error::custom(format!(
            "filler {filler:?} is not a single-byte character (U+0000..=U+00FF)"
        ))
    })
}

impl Default for FuzzSettings {
    fn default() -> Self {
        Self {
            min_subset: default_min_subset(),
            max_subset: default_max_subset(),
            first_trial: 0,
            max_trials: None,
            filler: default_filler(),
        }
    }
}

impl FuzzSettings {
    pub fn plan(&self) -> FuzzPlan {
        let mut plan = FuzzPlan::new(self.min_subset, self.max_subset)
            .starting_at(self.first_trial)
            .with_filler(self.filler);
        plan.max_trials = self.max_trials;
        plan
    }
}

/// A literal as written in TOML.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<ConfigValue> for Value {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Bool(b) => Value::Bool(b),
            ConfigValue::Int(i) => Value::Int(i128::from(i)),
            ConfigValue::Text(s) => Value::Bytes(s.into_bytes()),
        }
    }
}

/// `[fields."full.name"]`: fuzz options layered over the schema's own.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FieldOverride {
    #[serde(default)]
    pub fuzz: Option<bool>,
    #[serde(default)]
    pub values: Option<Vec<ConfigValue>>,
    #[serde(default)]
    pub extra: Vec<ConfigValue>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

impl FieldOverride {
    pub fn to_patch(&self) -> FuzzPatch {
        FuzzPatch {
            enabled: self.fuzz,
            values: self
                .values
                .as_ref()
                .map(|values| values.iter().cloned().map(Value::from).collect()),
            extra: self.extra.iter().cloned().map(Value::from).collect(),
            max_length: self.max_length,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    pub dir: PathBuf,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Skip trials whose bytes were already written.
    #[serde(default)]
    pub dedup: bool,
}

fn default_prefix() -> String {
    "case_".to_string()
}

fn default_extension() -> String {
    "bin".to_string()
}

impl OutputSettings {
    pub fn build_sink(&self) -> Result<Box<dyn Sink>, anyhow::Error> {
        let sink = DirectorySink::new(&self.dir)?
            .with_prefix(self.prefix.clone())
            .with_extension(self.extension.clone());
        if self.dedup {
            Ok(Box::new(DedupSink::new(sink)))
        } else {
            Ok(Box::new(sink))
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ForgeConfig {
    #[serde(default)]
    pub tree: TreeSettings,
    #[serde(default)]
    pub fuzz: FuzzSettings,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldOverride>,
    #[serde(default)]
    pub output: Option<OutputSettings>,
}

impl ForgeConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: ForgeConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    pub fn patches(&self) -> HashMap<String, FuzzPatch> {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.to_patch()))
            .collect()
    }

    /// A fuzzer over `root` with this config's plan and field overrides.
    pub fn fuzzer<'t>(&self, tree: &'t mut Tree, root: NodeId) -> Fuzzer<'t> {
        Fuzzer::new(tree, root, self.fuzz.plan()).with_patches(self.patches())
    }
}
