//! chasm-sync: the tracking, sharing and restore coordinator
//!
//! [`ChasmState`] maps tracked paths to share ids and is itself tracked under
//! the reserved `.chasm` id. [`Coordinator`] drives the add and delete
//! pipelines against an ordered set of stores and rebuilds everything from
//! those stores on restore.

pub mod engine;
pub mod ignore;
pub mod paths;
pub mod report;
pub mod restore;
pub mod state;

pub use engine::Coordinator;
pub use ignore::IgnoreFilter;
pub use report::{
    AddReport, DeleteReport, DeletedFile, PathFailure, RestoreReport, SkippedFile, TrackedFile,
};
pub use restore::UNCOMBINABLE;
pub use state::ChasmState;
