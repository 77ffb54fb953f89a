//! Personal file-storage server backed by a JSON metadata document.
//!
//! Uploaded bytes live under `<data-dir>/uploads`, mirroring the folder
//! hierarchy kept in the metadata store.

pub mod config;
pub mod drive;
pub mod error;
pub mod maintenance;
pub mod store;
