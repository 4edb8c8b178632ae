//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory store backs unit tests, the demo binary and the
//! `STORAGE_PROVIDER=memory` mode of the API server. The SQLite store lives in
//! its own crate.

pub mod memory_repo;
