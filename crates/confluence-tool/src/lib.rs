//! confluence-tool - Confluence API and CLI
//!
//! Two pieces carry the weight here:
//!
//! - [`config::Config`] merges command line flags, the saved profile document
//!   (`~/.confluence-tool.yaml`) and the secrets vault into one [`Connection`].
//! - [`page::Page`] wraps a fetched content record and deepens it on demand:
//!   asking for page properties pulls in the rendered view once, labels are
//!   listed once, and everything is cached on the instance afterwards.

pub mod api;
pub mod config;
pub mod error;
pub mod expand;
pub mod output;
pub mod page;
pub mod properties;

pub use api::{ApiClient, ContentApi};
pub use config::{Config, ConfigDocument, Connection, ConnectionArgs, Profile};
pub use error::{ApiError, ConfigError, PageError};
pub use expand::Expand;
pub use page::{Field, Page};
pub use properties::ExtractOptions;
