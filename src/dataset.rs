//! The external dataset contract (spec.md §6.1).
//!
//! This crate never walks a filesystem or parses a BIDS dataset layout
//! itself — that is the host application's job. It only defines the shapes
//! a host must hand to [`crate::evaluator::evaluate`]: one [`FileRecord`]
//! per indexed file, demographic rows in [`DatasetIndex::participants`],
//! and the knobs in [`EvalOptions`].

use crate::value::Value;
use indexmap::IndexMap;

/// One file in the dataset, already entity-parsed and metadata-inherited by
/// the host. BIDS inheritance (sidecar JSON merged top-down from the
/// dataset root to the file) is assumed to have already been applied to
/// `metadata` before this record reaches the evaluator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileRecord {
    /// Absolute path to the file.
    pub filepath: String,
    /// Path relative to the dataset root.
    pub relative_path: String,
    /// The bare filename.
    pub filename: String,
    /// BIDS entities extracted from the filename (`sub`, `ses`, `task`,
    /// `run`, `echo`, `acq`, `part`, `datatype`, `suffix`, `extension`,
    /// `atlas`, `roi`, `model`, ...), keyed by entity name. Values are kept
    /// as their original string form (e.g. `"01"`, not `1`) so zero-padding
    /// is preserved for the `=` coercion rule (spec.md §4.3(b)).
    pub entities: IndexMap<String, String>,
    /// Parsed sidecar JSON metadata, already inheritance-resolved.
    pub metadata: IndexMap<String, Value>,
}

impl FileRecord {
    pub fn new(filepath: impl Into<String>, relative_path: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        let filename = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&relative_path)
            .to_string();
        Self {
            filepath: filepath.into(),
            relative_path,
            filename,
            entities: IndexMap::new(),
            metadata: IndexMap::new(),
        }
    }

    pub fn with_entity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The full, queryable dataset: every file, plus `participants.tsv`
/// demographics keyed by subject label (without the `sub-` prefix).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetIndex {
    pub files: Vec<FileRecord>,
    pub participants: IndexMap<String, IndexMap<String, Value>>,
}

impl DatasetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file: FileRecord) -> Self {
        self.files.push(file);
        self
    }

    pub fn participant_row(&self, subject_entity: &str) -> Option<&IndexMap<String, Value>> {
        let label = subject_entity.strip_prefix("sub-").unwrap_or(subject_entity);
        self.participants.get(label)
    }
}

/// Evaluator configuration (SPEC_FULL.md §9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalOptions {
    /// Match `participants.*` column names case-insensitively. Default
    /// `true`, matching the demographic lookup behavior spec.md §9
    /// mandates regardless of how the host's TSV header was cased.
    pub case_insensitive_participants: bool,
    /// Optional cap on the number of rows returned, applied after ORDER BY.
    /// `None` (the default) returns every row; this never changes query
    /// semantics, only how much of the result the host receives.
    pub max_rows: Option<usize>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            case_insensitive_participants: true,
            max_rows: None,
        }
    }
}
