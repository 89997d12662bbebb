//! # mnemon-llm
//!
//! Provider transports (local HTTP, subprocess, remote HTTP with session
//! resumption) and the extractor that turns chunk text into typed items
//! and relations through a shared, repair-capable response parser.

pub mod extractor;
pub mod providers;

pub use extractor::{ExtractOutcome, Extractor, ExtractorFlavor};
pub use providers::{provider_from_config, HttpLocalProvider, HttpRemoteProvider, SubprocessProvider};
