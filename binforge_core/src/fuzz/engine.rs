//! Systematic subset fuzzing over a tree.
//!
//! The engine collects every fuzzable leaf below a root, then for each subset
//! size `k` in the plan walks every `k`-subset of those leaves and every
//! combination of their candidate values. Each combination is one trial: the
//! values are written into the tree, the sink sees the mutated tree, and the
//! original cells are put back before the next trial.

use crate::error::TreeError;
use crate::fuzz::candidates::{DEFAULT_FILLER, candidates_for};
use crate::fuzz::combinator::{CartesianProduct, Combinations};
use crate::fuzz::sink::Sink;
use crate::packing::ordered;
use crate::template::FuzzPatch;
use crate::tree::{NodeId, Tree};
use crate::value::{Value, ValueCell};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum FuzzError {
    /// Selecting fields or writing a candidate into the tree failed.
    #[error("Tree error during fuzzing: {0}")]
    Tree(#[from] TreeError),

    /// The sink rejected a trial; the tree was restored before returning.
    #[error("Sink rejected trial {trial}: {error}")]
    Sink { trial: u64, error: anyhow::Error },

    /// The sink failed to finish after the last trial.
    #[error("Sink failed to finish: {0}")]
    Finish(anyhow::Error),
}

/// Which subsets to walk and how many trials to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzPlan {
    pub min_subset: usize,
    pub max_subset: usize,
    /// Number given to the first trial.
    pub first_trial: u64,
    /// Stop after this many trials.
    pub max_trials: Option<u64>,
    /// Byte the string ramp is built from.
    pub filler: u8,
}

impl FuzzPlan {
    pub fn new(min_subset: usize, max_subset: usize) -> Self {
        let (min_subset, max_subset) = ordered(min_subset, max_subset);
        Self {
            min_subset,
            max_subset,
            ..Self::default()
        }
    }

    pub fn with_max_trials(mut self, max_trials: u64) -> Self {
        self.max_trials = Some(max_trials);
        self
    }

    pub fn starting_at(mut self, first_trial: u64) -> Self {
        self.first_trial = first_trial;
        self
    }

    pub fn with_filler(mut self, filler: u8) -> Self {
        self.filler = filler;
        self
    }
}

impl Default for FuzzPlan {
    fn default() -> Self {
        Self {
            min_subset: 1,
            max_subset: 1,
            first_trial: 0,
            max_trials: None,
            filler: DEFAULT_FILLER,
        }
    }
}

/// One combination handed to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub number: u64,
    /// The node the run fuzzes below; sinks usually serialize this.
    pub root: NodeId,
    /// Full names of the mutated fields, in selection order.
    pub fields: Vec<String>,
    /// The value written into each field of `fields`.
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzReport {
    /// Unique subsets walked.
    pub subsets: u64,
    pub trials: u64,
    /// `true` if `max_trials` cut the run short.
    pub truncated: bool,
}

#[derive(Debug)]
struct Selected {
    id: NodeId,
    name: String,
    original: ValueCell,
    candidates: Vec<Value>,
}

pub struct Fuzzer<'t> {
    tree: &'t mut Tree,
    root: NodeId,
    plan: FuzzPlan,
    patches: HashMap<String, FuzzPatch>,
}

impl<'t> Fuzzer<'t> {
    pub fn new(tree: &'t mut Tree, root: NodeId, plan: FuzzPlan) -> Self {
        Self {
            tree,
            root,
            plan,
            patches: HashMap::new(),
        }
    }

    /// Layers `patch` over the fuzz options of the field named `full_name`.
    pub fn patch(mut self, full_name: impl Into<String>, patch: FuzzPatch) -> Self {
        self.patches.insert(full_name.into(), patch);
        self
    }

    pub fn with_patches(mut self, patches: HashMap<String, FuzzPatch>) -> Self {
        self.patches.extend(patches);
        self
    }

    /// Full names of the fields a run would mutate, in selection order.
    pub fn fuzzable_fields(&mut self) -> Result<Vec<String>, TreeError> {
        Ok(self.select()?.into_iter().map(|s| s.name).collect())
    }

    fn select(&mut self) -> Result<Vec<Selected>, TreeError> {
        let mut out = Vec::new();
        self.collect(self.root, &mut out)?;
        Ok(out)
    }

    fn collect(&mut self, id: NodeId, out: &mut Vec<Selected>) -> Result<(), TreeError> {
        let name = self.tree.full_name(id)?;
        let mut options = self.tree.fuzz_options(id)?.clone();
        if let Some(patch) = self.patches.get(&name) {
            patch.apply(&mut options);
        }
        // Fuzzing a root asks for it explicitly, so its own marker is ignored.
        if !options.enabled && id != self.root {
            return Ok(());
        }
        if self.tree.is_group(id)? {
            self.tree.ensure_group(id)?;
        }
        if self.tree.is_atomic(id)? {
            let candidates = candidates_for(self.tree, id, &options, self.plan.filler)?;
            out.push(Selected {
                id,
                name,
                original: self.tree.cell(id)?.clone(),
                candidates,
            });
            return Ok(());
        }
        for child in self.tree.children(id)?.to_vec() {
            self.collect(child, out)?;
        }
        Ok(())
    }

    /// Puts every selected field's original cell back and drops all caches.
    fn restore(&mut self, selected: &[Selected]) -> Result<(), TreeError> {
        for field in selected {
            if self.tree.is_live(field.id) {
                self.tree.restore_cell(field.id, field.original.clone())?;
            }
        }
        self.tree.reset_all();
        Ok(())
    }

    fn assign(&mut self, selected: &[Selected], subset: &[usize], picks: &[usize]) -> Result<(), TreeError> {
        for (&field, &pick) in subset.iter().zip(picks) {
            let field = &selected[field];
            self.tree
                .set_value(field.id, ValueCell::Literal(field.candidates[pick].clone()))?;
        }
        Ok(())
    }

    /// Walks the plan, handing each trial to `sink`.
    pub fn run<S: Sink + ?Sized>(&mut self, sink: &mut S) -> Result<FuzzReport, FuzzError> {
        let selected = self.select()?;
        info!(
            root = %self.tree.full_name(self.root)?,
            fields = selected.len(),
            min_subset = self.plan.min_subset,
            max_subset = self.plan.max_subset,
            "Starting fuzz run"
        );

        let mut report = FuzzReport::default();
        let mut seen = HashSet::new();
        let mut number = self.plan.first_trial;

        'plan: for k in self.plan.min_subset..=self.plan.max_subset {
            for subset in Combinations::new(selected.len(), k) {
                let mut names: Vec<&str> = subset.iter().map(|&i| selected[i].name.as_str()).collect();
                names.sort_unstable();
                if !seen.insert(names.join("--")) {
                    continue;
                }
                report.subsets += 1;

                let product = CartesianProduct::new(subset.iter().map(|&i| selected[i].candidates.len()).collect());
                debug!(
                    trial = number,
                    fields = ?names,
                    combinations = product.total(),
                    "Fuzzing subset"
                );

                for picks in product {
                    if self.plan.max_trials.is_some_and(|limit| report.trials >= limit) {
                        report.truncated = true;
                        break 'plan;
                    }
                    if let Err(e) = self.assign(&selected, &subset, &picks) {
                        self.restore(&selected)?;
                        return Err(e.into());
                    }
                    let trial = Trial {
                        number,
                        root: self.root,
                        fields: subset.iter().map(|&i| selected[i].name.clone()).collect(),
                        values: subset
                            .iter()
                            .zip(&picks)
                            .map(|(&i, &pick)| selected[i].candidates[pick].clone())
                            .collect(),
                    };
                    let outcome = sink.accept(&trial, self.tree);
                    self.restore(&selected)?;
                    if let Err(error) = outcome {
                        warn!(trial = number, error = %error, "Sink rejected trial, aborting run");
                        return Err(FuzzError::Sink { trial: number, error });
                    }
                    number += 1;
                    report.trials += 1;
                }
            }
        }

        sink.finish().map_err(FuzzError::Finish)?;
        info!(
            subsets = report.subsets,
            trials = report.trials,
            truncated = report.truncated,
            "Fuzz run finished"
        );
        Ok(report)
    }
}

/// Fuzzes every subset of `min_subset..=max_subset` fields below `root`.
pub fn fuzz<S: Sink + ?Sized>(
    tree: &mut Tree,
    root: NodeId,
    min_subset: usize,
    max_subset: usize,
    sink: &mut S,
) -> Result<FuzzReport, FuzzError> {
    Fuzzer::new(tree, root, FuzzPlan::new(min_subset, max_subset)).run(sink)
}
