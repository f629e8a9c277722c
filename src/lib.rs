//! # BIQL
//!
//! A declarative query language and evaluator for BIDS (Brain Imaging Data
//! Structure) datasets.
//!
//! This crate owns the lexer, parser, and evaluator for BIQL queries; it
//! does not walk a filesystem or parse a dataset layout itself. A host
//! application indexes a BIDS dataset into a [`dataset::DatasetIndex`] and
//! hands it to [`evaluator::evaluate`] alongside a parsed query.
//!
//! ## Quick start
//!
//! ```rust
//! use biql::dataset::{DatasetIndex, EvalOptions, FileRecord};
//! use biql::parser::parse;
//! use biql::evaluator::evaluate;
//!
//! let mut dataset = DatasetIndex::new();
//! dataset.files.push(
//!     FileRecord::new("/data/sub-01/anat/sub-01_T1w.nii.gz", "sub-01/anat/sub-01_T1w.nii.gz")
//!         .with_entity("sub", "01")
//!         .with_entity("datatype", "anat")
//!         .with_entity("suffix", "T1w"),
//! );
//!
//! let query = parse("sub=1 AND datatype=anat").expect("valid query");
//! let rows = evaluate(&dataset, &query, &EvalOptions::default());
//! assert_eq!(rows.len(), 1);
//! ```
//!
//! ## Pipeline
//!
//! - [`lexer`] turns query text into a token stream.
//! - [`parser`] turns tokens into an [`ast::Query`].
//! - [`evaluator`] runs a query against a [`dataset::DatasetIndex`] and
//!   produces [`value::Row`]s; it never fails (spec.md §4.3, §7).
//!
//! Formatting rows into JSON/CSV/TSV text and discovering files on disk are
//! both left to the host application; this crate only guarantees the shape
//! of the [`value::Row`]s it produces.

pub mod ast;
pub mod dataset;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod value;

pub use dataset::{DatasetIndex, EvalOptions, FileRecord};
pub use error::{Error, Result};
pub use evaluator::evaluate;
pub use parser::parse;
pub use value::{Row, Value};
