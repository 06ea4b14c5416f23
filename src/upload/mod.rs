//! Chunked Upload Module
//!
//! Turns what clients send into a single file ready to forward:
//! - Chunks stored one file per (upload id, index)
//! - Reassembly in numeric index order
//! - Request-owned artifacts that delete themselves
//! - SHA-256 fingerprints for deduplication
//!
//! Protocol Flow:
//! 1. Client posts chunks, in any order, under one upload id
//! 2. Client posts finish with filename and destination
//! 3. Server reassembles the file and hands it to the pipeline

pub mod artifact;
pub mod assembler;
pub mod chunk_store;
pub mod hasher;
pub mod types;

pub use artifact::Artifact;
pub use assembler::Assembler;
pub use chunk_store::{ChunkEntry, ChunkStore};
pub use hasher::{hash_file, ContentFingerprint};
pub use types::*;
