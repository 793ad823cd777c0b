//! Chunker and Identity Stamper (spec §4.2, §4.3): split Documents into
//! content-addressed Chunks and stamp each with the identity metadata the
//! Reconciliation Engine keys its decisions on.

pub mod chunker;
pub mod stamper;

pub use chunker::{chunk_document, RecursiveCharacterTextSplitter};
pub use stamper::{now_utc_epoch_seconds, stamp_chunk, stamp_item};
