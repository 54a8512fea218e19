pub mod action;
mod binding;
pub mod codec;
pub mod config;
pub mod error;
pub mod fuzz;
mod inspect;
pub mod packing;
pub mod scope;
pub mod template;
pub mod transform;
pub mod tree;
pub mod value;

pub use action::{Action, ActionError, Reversible};
pub use codec::LeafCodec;
pub use config::ForgeConfig;
pub use error::TreeError;
pub use fuzz::{DedupSink, DirectorySink, FuzzError, FuzzPlan, FuzzReport, Fuzzer, Sink, Trial, fuzz};
pub use packing::{Endian, Packing};
pub use scope::Scope;
pub use template::{CountRule, FieldTemplate, FuzzOptions, FuzzPatch};
pub use transform::{Conditional, Transform};
pub use tree::{NodeId, Tree};
pub use value::{Binding, Value, ValueCell};
