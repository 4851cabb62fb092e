//! chasm-storage: where shares live
//!
//! Every backend implements [`CloudStore`]. The coordinator never looks past
//! that trait; it only relies on the positional order of the set returned by
//! [`build_stores`].

pub mod folder;
pub mod operator;
pub mod remote;
pub mod store;

pub use folder::FolderStore;
pub use operator::{build_remote_operator, S3Credentials};
pub use remote::RemoteStore;
pub use store::{build_stores, CloudStore};
