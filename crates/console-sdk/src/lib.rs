//! Public SDK for the admin console request layer.
//!
//! This crate re-exports every layer:
//!
//! ```ignore
//! use console_sdk::prelude::*;
//!
//! let config = ConsoleConfig::load("console.toml")?.apply_env();
//! init_logging(&config.logging)?;
//!
//! let client = ConsoleClient::from_config(&config)?;
//! let roles = client.send_cached(ApiRequest::get("/api/roles")).await?;
//!
//! let tree = LazyTree::new(HttpTreeSource::new(client.clone()));
//! tree.load_root(RootQuery::new(ResourceDescriptor::new("/api/resources"), 50)).await?;
//! tree.expand("policies").await?;
//! ```

pub use console_auth;
pub use console_cache;
pub use console_core;
pub use console_data;
pub use console_executor;
pub use console_observability;
pub use console_tree;

/// Prelude for convenient imports.
pub mod prelude {
    pub use console_auth::*;
    pub use console_cache::*;
    pub use console_core::*;
    pub use console_data::*;
    pub use console_executor::*;
    pub use console_observability::*;
    pub use console_tree::*;
}
