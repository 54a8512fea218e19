pub mod candidates;
pub mod combinator;
pub mod engine;
pub mod sink;

pub use engine::{FuzzError, FuzzPlan, FuzzReport, Fuzzer, Trial, fuzz};
pub use sink::{DedupSink, DirectorySink, Sink, SinkError, TrialRecord};
