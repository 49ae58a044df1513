//! confluence-core - Shared functionality for confluence-tool crates

pub mod paths;

pub use paths::Paths;
