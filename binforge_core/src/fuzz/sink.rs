use crate::fuzz::engine::Trial;
use crate::tree::Tree;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised by the sinks in this module while persisting trials.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Creating the output directory or writing a trial file failed.
    #[error("Sink I/O error: {0}")]
    Io(String),

    /// Writing the JSON index failed.
    #[error("Sink serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Serialization(format!("JSON index error: {}", err))
    }
}

/// Receives every trial the fuzzer produces.
///
/// During [`accept`](Sink::accept) the tree holds the trial's values; the sink
/// typically serializes `trial.root` and ships or stores the bytes. Whatever
/// the sink does, the fuzzer restores the selected fields afterwards.
///
/// Any `FnMut(&Trial, &mut Tree) -> Result<(), anyhow::Error>` is a sink.
pub trait Sink {
    /// Handles one trial.
    ///
    /// # Arguments
    /// * `trial`: Which fields were changed to which values, and the trial number.
    /// * `tree`: The tree in its mutated state.
    ///
    /// # Returns
    /// An error aborts the fuzz run after the tree has been restored.
    fn accept(&mut self, trial: &Trial, tree: &mut Tree) -> Result<(), anyhow::Error>;

    /// Called once after the last trial of a run that was not aborted.
    fn finish(&mut self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

impl<F> Sink for F
where
    F: FnMut(&Trial, &mut Tree) -> Result<(), anyhow::Error>,
{
    fn accept(&mut self, trial: &Trial, tree: &mut Tree) -> Result<(), anyhow::Error> {
        self(trial, tree)
    }
}

/// One line of the index a [`DirectorySink`] writes next to its trial files.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TrialRecord {
    pub file: String,
    pub number: u64,
    pub fields: Vec<String>,
    pub len: usize,
    /// Hex md5 of the serialized bytes.
    pub md5: String,
}

/// Writes each trial's serialization to `<dir>/<prefix><number:08>.<extension>`
/// and, on finish, an `index.json` listing every file with the fields it mutates.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    prefix: String,
    extension: String,
    records: Vec<TrialRecord>,
}

impl DirectorySink {
    /// Filename for the JSON index written on finish.
    pub const INDEX_FILENAME: &'static str = "index.json";
    const DEFAULT_PREFIX: &'static str = "case_";
    const DEFAULT_EXTENSION: &'static str = "bin";

    /// Creates the sink, creating `dir` if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                SinkError::Io(format!("Failed to create output directory at {:?}: {}", dir, e))
            })?;
        } else if !dir.is_dir() {
            return Err(SinkError::Io(format!(
                "Output path {:?} exists but is not a directory",
                dir
            )));
        }
        Ok(Self {
            dir,
            prefix: Self::DEFAULT_PREFIX.to_string(),
            extension: Self::DEFAULT_EXTENSION.to_string(),
            records: Vec::new(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// An empty extension writes files without one.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    fn file_name(&self, number: u64) -> String {
        if self.extension.is_empty() {
            format!("{}{:08}", self.prefix, number)
        } else {
            format!("{}{:08}.{}", self.prefix, number, self.extension)
        }
    }

    fn write_index(&self) -> Result<(), SinkError> {
        let path = self.dir.join(Self::INDEX_FILENAME);
        let file = File::create(&path)
            .map_err(|e| SinkError::Io(format!("Failed to create index {:?}: {}", path, e)))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.records)?;
        Ok(())
    }
}

impl Sink for DirectorySink {
    fn accept(&mut self, trial: &Trial, tree: &mut Tree) -> Result<(), anyhow::Error> {
        let bytes = tree.to_bytes(trial.root)?;
        let file = self.file_name(trial.number);
        let path = self.dir.join(&file);
        fs::write(&path, &bytes)
            .map_err(|e| SinkError::Io(format!("Failed to write trial {:?}: {}", path, e)))?;
        self.records.push(TrialRecord {
            file,
            number: trial.number,
            fields: trial.fields.clone(),
            len: bytes.len(),
            md5: format!("{:x}", md5::compute(&bytes)),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<(), anyhow::Error> {
        self.write_index()?;
        Ok(())
    }
}

/// Forwards only trials whose serialization has not been seen before.
///
/// Different subsets often produce identical bytes (a value equal to the
/// field's original, or a truncated integer); this keeps one of each.
#[derive(Debug)]
pub struct DedupSink<S> {
    inner: S,
    seen: HashSet<[u8; 16]>,
    skipped: u64,
}

impl<S: Sink> DedupSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            seen: HashSet::new(),
            skipped: 0,
        }
    }

    /// Trials dropped as duplicates so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Sink> Sink for DedupSink<S> {
    fn accept(&mut self, trial: &Trial, tree: &mut Tree) -> Result<(), anyhow::Error> {
        let bytes = tree.to_bytes(trial.root)?;
        if !self.seen.insert(md5::compute(&bytes).0) {
            self.skipped += 1;
            debug!(trial = trial.number, "Skipping duplicate serialization");
            return Ok(());
        }
        self.inner.accept(trial, tree)
    }

    fn finish(&mut self) -> Result<(), anyhow::Error> {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::{Endian, Packing};
    use crate::template::FieldTemplate;
    use crate::value::Value;

    fn tree() -> Tree {
        let template = FieldTemplate::composite("r")
            .with_field(FieldTemplate::int("a", Packing::unsigned(1, Endian::Big)).value(1u8));
        Tree::new(&template, 0).unwrap()
    }

    fn trial(tree: &Tree, number: u64) -> Trial {
        Trial {
            number,
            root: tree.root(),
            fields: vec!["a".to_string()],
            values: vec![Value::Int(1)],
        }
    }

    #[test]
    fn directory_sink_writes_files_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = tree();
        let mut sink = DirectorySink::new(dir.path().join("out"))
            .unwrap()
            .with_prefix("png_")
            .with_extension("png");
        let t = trial(&tree, 7);
        sink.accept(&t, &mut tree).unwrap();
        sink.finish().unwrap();

        let written = fs::read(dir.path().join("out").join("png_00000007.png")).unwrap();
        assert_eq!(written, vec![1]);

        let index: serde_json::Value = serde_json::from_reader(
            File::open(dir.path().join("out").join(DirectorySink::INDEX_FILENAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(index[0]["file"], "png_00000007.png");
        assert_eq!(index[0]["fields"][0], "a");
        assert_eq!(index[0]["len"], 1);
    }

    #[test]
    fn directory_sink_rejects_a_file_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            DirectorySink::new(file.path()),
            Err(SinkError::Io(_))
        ));
    }

    #[test]
    fn dedup_sink_drops_repeated_bytes() {
        let mut tree = tree();
        let mut numbers = Vec::new();
        {
            let collect = |trial: &Trial, _tree: &mut Tree| -> Result<(), anyhow::Error> {
                numbers.push(trial.number);
                Ok(())
            };
            let mut sink = DedupSink::new(collect);
            for number in 0..3 {
                sink.accept(&trial(&tree, number), &mut tree).unwrap();
            }
            assert_eq!(sink.skipped(), 2);
        }
        assert_eq!(numbers, vec![0]);
    }
}
