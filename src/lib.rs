//! Core library for `bd`, a local-first issue tracker that stores a
//! project's issue graph inside the project's own repository.
//!
//! The crate is organized around five subsystems:
//!
//! - [`storage`] - a polymorphic store with an embedded `SQLite` backend
//!   and a branchable Dolt server backend, both satisfying the same
//!   semantic contract
//! - [`sync`] - JSONL export/import with field-level conflict resolution
//! - [`config`] - layered configuration (flag > env > local yaml >
//!   project yaml > user yaml > defaults) with override reporting
//! - [`version`] - binary/database version tracking and self-migration
//! - [`doctor`] - diagnostic checks and recovery prescriptions
//!
//! The CLI in `main.rs` is a thin dispatcher over these modules.

pub mod cli;
pub mod config;
pub mod doctor;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;
pub mod util;
pub mod version;

pub use error::{BeadsError, ErrorKind, Result};
pub use model::{Dependency, DependencyType, Issue, IssueType, Priority, Status};
pub use storage::Store;
pub use util::cancel::CancelToken;
