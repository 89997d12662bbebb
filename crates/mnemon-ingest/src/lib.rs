//! # mnemon-ingest
//!
//! Normalizes heterogeneous sources into `ParsedDocument`s and slices
//! them into overlapping, provenance-tagged chunks. Parsers are pure;
//! the chunker is deterministic.

pub mod chunker;
pub mod parsers;

pub use chunker::Chunker;
pub use parsers::parser_for;
