//! Location-specific bird audio collection from the Xeno-canto catalog:
//! paginated metadata retrieval, bounded-parallel downloads with retry, and
//! species-organized copies of every downloaded recording.

pub mod catalog;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod organize;
pub mod output;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod transport;
