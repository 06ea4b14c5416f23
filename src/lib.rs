//! Fatbox Library
//!
//! Upload relay for public file hosts. Clients send files whole or in
//! chunks; the server reassembles them, skips uploads whose content was
//! already forwarded, and streams the rest to pomf, catbox or litterbox.
//! The server binary is in main.rs.
//!
//! # Modules
//!
//! - `upload`: chunk storage, reassembly, artifacts and hashing
//! - `dedup`: content hash -> URL cache
//! - `forward`: streaming multipart uploads to the backends
//! - `pipeline`: ties the above together per request
//! - `routes`: HTTP endpoints

pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod forward;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod upload;
