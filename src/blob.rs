//! Content-addressed blob storage for binary digest artifacts.

pub mod store;

pub use store::{BlobStore, blob_key, digester_prefix, file_prefix, path_hash};
