use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;
use downcast_rs::{impl_downcast, Downcast};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Contract every store integration implements to be registrable
///
/// Identity, settings, schema and capabilities come from the provider's
/// [`ProviderDescriptor`]; the two async methods are the only places the core
/// touches the network.
#[async_trait]
pub trait Provider: Send + Sync + Downcast {
    /// Static description of this provider
    fn descriptor(&self) -> &ProviderDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn settings(&self) -> &Settings {
        &self.descriptor().settings
    }

    fn schema(&self) -> &str {
        &self.descriptor().schema
    }

    fn capabilities(&self) -> &[CapabilityRecord] {
        &self.descriptor().capabilities
    }

    /// Best-effort reachability check
    ///
    /// Ordinary connectivity failures return `false`, never an error. A
    /// cancelled check also reports `false`.
    async fn validate_connection(&self, _cancel: &CancellationToken) -> bool {
        true
    }

    /// Execute a request against the backing store
    ///
    /// Implementations should stop work once `cancel` fires; callers also
    /// drop the future on cancellation.
    async fn execute(&self, request: &QueryRequest, cancel: &CancellationToken)
        -> Result<QueryResult>;
}

impl_downcast!(Provider);

/// Builds providers of one backend type from their descriptors
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Backend type this factory handles (e.g. "postgres")
    fn backend_type(&self) -> &'static str;

    async fn create_provider(&self, descriptor: ProviderDescriptor) -> Result<Arc<dyn Provider>>;
}
