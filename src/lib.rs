//! docqa - Document Question Answering
//!
//! Ingests a document, splits it into overlapping word windows, embeds the
//! windows locally and answers questions by exact nearest-neighbor retrieval
//! over the currently loaded corpus.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod retrieval;
pub mod server;
pub mod storage;

pub use error::{DocQaError, Result};
