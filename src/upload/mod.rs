//! Still-image upload ingestion
//!
//! Devices push captured stills as JSON envelopes, either whole or chunked:
//!
//! ```text
//!   envelope JSON ──► classify ──┬── whole image ────────────► pipeline
//!                                └── chunk ──► assembler ──┬─► pipeline
//!                                                (slots)   └─► (expiry GC)
//! ```
//!
//! - [`envelope`]: the camelCase wire shape and its classification into
//!   validated messages
//! - [`assembler`]: per-`uploadId` slot buffers, duplicate suppression, and
//!   expiry-based garbage collection

pub mod assembler;
pub mod envelope;

pub use assembler::{CompletedUpload, UploadAssembler};
pub use envelope::{ChunkUpload, UploadEnvelope, UploadMessage, WholeUpload};
