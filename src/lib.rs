//! ossync - content-addressed directory sync against a remote object store
//!
//! A local directory and a remote index converge by content hash. The
//! engine computes the minimal set of uploads, downloads and removals, then
//! runs them on a bounded worker pool that stops dispatching on the first
//! failure.

pub mod cli;
pub mod config;
pub mod error;
pub mod etag;
pub mod exclude;
pub mod index;
pub mod progress;
pub mod retry;
pub mod storage;
pub mod sync;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use sync::SyncEngine;
pub use types::*;
