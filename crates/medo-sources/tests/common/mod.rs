#![allow(dead_code)]

use async_trait::async_trait;
use medo_sources::{
    CapabilityRecord, DataRow, DatasetSchema, FieldDef, FieldType, Provider, ProviderDescriptor,
    ProviderFactory, QueryRequest, QueryResult, Result, SourceError, SourceRegistry,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a `StaticProvider` answers `execute`
#[derive(Clone)]
pub enum Behavior {
    /// Echo the statement back as a single row
    Echo,
    Fail(String),
    /// Wait until cancelled
    Hang,
    /// Sleep, then echo
    Delay(Duration),
}

pub struct StaticProvider {
    descriptor: ProviderDescriptor,
    behavior: Behavior,
    reachable: bool,
    check_hangs: bool,
    pub calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self {
            descriptor,
            behavior: Behavior::Echo,
            reachable: true,
            check_hangs: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(
            ProviderDescriptor::new(name)
                .with_setting("dataset", format!("{}_dataset", name.to_lowercase()))
                .with_setting("location", "US")
                .with_schema(format!("CREATE TABLE {}_events (id INT64)", name.to_lowercase()))
                .with_capability(CapabilityRecord::new(
                    format!("{} Data", name),
                    "call_db_agent",
                    format!("Query the {} store.", name),
                )),
        )
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Connection check that never finishes and ignores cancellation
    pub fn hanging_check(mut self) -> Self {
        self.check_hangs = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn echo(&self, request: &QueryRequest) -> QueryResult {
        let row = DataRow::from([
            ("source".to_string(), json!(self.descriptor.name)),
            ("statement".to_string(), json!(request.statement)),
        ]);
        let schema = DatasetSchema {
            fields: vec![
                FieldDef::new("source", FieldType::String),
                FieldDef::new("statement", FieldType::String),
            ],
        };
        QueryResult::new(schema, vec![row], 0).truncated(request.limit)
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn validate_connection(&self, _cancel: &CancellationToken) -> bool {
        if self.check_hangs {
            std::future::pending::<()>().await;
        }
        self.reachable
    }

    async fn execute(&self, request: &QueryRequest, cancel: &CancellationToken) -> Result<QueryResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Echo => Ok(self.echo(request)),
            Behavior::Fail(msg) => Err(SourceError::QueryFailed(msg.clone())),
            Behavior::Hang => {
                cancel.cancelled().await;
                Err(SourceError::Cancelled {
                    provider: self.descriptor.name.clone(),
                })
            }
            Behavior::Delay(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(self.echo(request))
            }
        }
    }
}

/// Factory building echo providers for the "static" backend
pub struct StaticProviderFactory;

#[async_trait]
impl ProviderFactory for StaticProviderFactory {
    fn backend_type(&self) -> &'static str {
        "static"
    }

    async fn create_provider(&self, descriptor: ProviderDescriptor) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(StaticProvider::new(descriptor)))
    }
}

/// Registry holding echo providers for each of `names`
pub async fn registry_with(names: &[&str]) -> SourceRegistry {
    let registry = SourceRegistry::new();
    for name in names {
        registry.register(Arc::new(StaticProvider::named(name))).await;
    }
    registry
}
