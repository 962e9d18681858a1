//! # medo-sources
//!
//! Provider registry and session-scoped routing for a conversational data agent.
//!
//! A conversation can query several heterogeneous stores (warehouses, document
//! stores, ...) without store-specific logic in the reasoning loop:
//!
//! - **Provider**: the contract every store integration implements
//! - **SourceRegistry**: catalog of providers keyed by unique name
//! - **SessionState**: per-conversation key-value bag owned by the agent runtime
//! - **ActiveSourceManager**: which providers are active for a session
//! - **SourceRouter**: validated dispatch plus result persistence
//! - **InstructionBuilder**: capability and schema text for the reasoning layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use medo_sources::{
//!     InMemorySession, QueryRequest, SourceRegistry, SourceRouter,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(provider: std::sync::Arc<dyn medo_sources::Provider>) -> medo_sources::Result<()> {
//! let registry = SourceRegistry::new();
//! registry.register(provider).await;
//!
//! let router = SourceRouter::new(registry.clone());
//! let session = InMemorySession::new("conversation-1");
//!
//! router.active_sources().set_active_source(&session, "BigQuery").await?;
//! let result = router
//!     .route_active(&session, &QueryRequest::new("SELECT 1"), &CancellationToken::new())
//!     .await?;
//! println!("{} rows", result.stats.row_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Backend Implementation
//!
//! 1. Implement `Provider` for a struct wrapping a `ProviderDescriptor`
//! 2. Implement `ProviderFactory` so configuration files can create it
//! 3. Register the factory with `SourceRegistry`
//!
//! See `medo-sources-postgres` for a complete integration.

pub mod active;
pub mod config;
pub mod error;
pub mod instructions;
pub mod registry;
pub mod router;
pub mod session;
pub mod state;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use active::{merge_settings, ActiveSourceManager, AllSourceSettings, SourceSettings};
pub use config::{SourceConfig, SourcesConfig};
pub use error::{Result, SourceError};
pub use instructions::InstructionBuilder;
pub use registry::SourceRegistry;
pub use router::SourceRouter;
pub use session::{transact_with, InMemorySession, SessionState, SessionStore, StateMap};
pub use state::{
    is_reserved_key, result_key, settings_override_key, ActiveSourceState, ACTIVE_SOURCES_KEY,
    ACTIVE_SOURCE_KEY,
};
pub use traits::{Provider, ProviderFactory};
pub use types::{
    CapabilityRecord, DataRow, DatasetSchema, FieldDef, FieldType, ProviderDescriptor,
    QueryRequest, QueryResult, QueryStats, Settings,
};
