mod common;

use common::{registry_with, Behavior, StaticProvider};
use medo_sources::{
    result_key, InMemorySession, QueryRequest, SessionState, SourceError, SourceRegistry,
    SourceRouter,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn router_with(provider: StaticProvider) -> (SourceRouter, Arc<StaticProvider>) {
    let registry = SourceRegistry::new();
    let provider = Arc::new(provider);
    registry.register(provider.clone()).await;
    (SourceRouter::new(registry), provider)
}

#[tokio::test]
async fn test_route_persists_result() {
    let router = SourceRouter::new(registry_with(&["BigQuery"]).await);
    let session = InMemorySession::new("s");
    let request = QueryRequest::new("SELECT region, SUM(amount) FROM sales GROUP BY region");

    let result = router
        .route(&session, &request, "BigQuery", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.stats.row_count, 1);
    assert_eq!(result.rows[0].get("source"), Some(&json!("BigQuery")));

    let stored = session.get("BigQuery_result").await.unwrap();
    assert!(stored.is_some());
    assert_eq!(
        router.last_result(&session, "BigQuery").await.unwrap(),
        Some(result)
    );
}

#[tokio::test]
async fn test_route_unknown_provider_writes_nothing() {
    let router = SourceRouter::new(registry_with(&["BigQuery"]).await);
    let session = InMemorySession::new("s");

    let err = router
        .route(
            &session,
            &QueryRequest::new("SELECT 1"),
            "Unregistered",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::UnknownProvider(name) if name == "Unregistered"));
    assert_eq!(session.get(&result_key("Unregistered")).await.unwrap(), None);
}

#[tokio::test]
async fn test_route_failure_carries_provider_name() {
    let (router, _) = router_with(
        StaticProvider::named("CSV").with_behavior(Behavior::Fail("file not found".to_string())),
    )
    .await;
    let session = InMemorySession::new("s");

    let err = router
        .route(&session, &QueryRequest::new("scan"), "CSV", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.provider(), Some("CSV"));
    match err {
        SourceError::ExecutionFailed { provider, source } => {
            assert_eq!(provider, "CSV");
            assert!(matches!(*source, SourceError::QueryFailed(ref msg) if msg == "file not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(session.get("CSV_result").await.unwrap(), None);
}

#[tokio::test]
async fn test_failed_route_keeps_previous_result() {
    let registry = SourceRegistry::new();
    registry.register(Arc::new(StaticProvider::named("CSV"))).await;
    let router = SourceRouter::new(registry.clone());
    let session = InMemorySession::new("s");
    let cancel = CancellationToken::new();

    let first = router
        .route(&session, &QueryRequest::new("first"), "CSV", &cancel)
        .await
        .unwrap();

    registry
        .register(Arc::new(
            StaticProvider::named("CSV").with_behavior(Behavior::Fail("boom".to_string())),
        ))
        .await;
    assert!(router
        .route(&session, &QueryRequest::new("second"), "CSV", &cancel)
        .await
        .is_err());

    assert_eq!(router.last_result(&session, "CSV").await.unwrap(), Some(first));
}

#[tokio::test]
async fn test_route_cancelled_before_completion() {
    let (router, provider) =
        router_with(StaticProvider::named("BigQuery").with_behavior(Behavior::Hang)).await;
    let session = InMemorySession::new("s");
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = router
        .route(&session, &QueryRequest::new("SELECT 1"), "BigQuery", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::Cancelled { provider } if provider == "BigQuery"));
    assert_eq!(provider.call_count(), 1);
    assert_eq!(session.get("BigQuery_result").await.unwrap(), None);
}

#[tokio::test]
async fn test_route_drops_uncooperative_provider_on_cancel() {
    let (router, _) = router_with(
        StaticProvider::named("Slow").with_behavior(Behavior::Delay(Duration::from_secs(30))),
    )
    .await;
    let session = InMemorySession::new("s");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = router
        .route(&session, &QueryRequest::new("SELECT 1"), "Slow", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, SourceError::Cancelled { .. }));
}

#[tokio::test]
async fn test_route_to_stale_active_source_fails() {
    let registry = registry_with(&["BigQuery"]).await;
    let router = SourceRouter::new(registry.clone());
    let session = InMemorySession::new("s");
    router
        .active_sources()
        .set_active_source(&session, "BigQuery")
        .await
        .unwrap();

    registry.unregister("BigQuery").await;

    let err = router
        .route_active(&session, &QueryRequest::new("SELECT 1"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::UnknownProvider(_)));
}

#[tokio::test]
async fn test_route_active() {
    let router = SourceRouter::new(registry_with(&["BigQuery", "CSV"]).await);
    let session = InMemorySession::new("s");
    let cancel = CancellationToken::new();

    assert!(matches!(
        router
            .route_active(&session, &QueryRequest::new("SELECT 1"), &cancel)
            .await,
        Err(SourceError::NoActiveSource)
    ));

    router
        .active_sources()
        .set_active_source(&session, "CSV")
        .await
        .unwrap();
    let result = router
        .route_active(&session, &QueryRequest::new("SELECT 1"), &cancel)
        .await
        .unwrap();

    assert_eq!(result.rows[0].get("source"), Some(&json!("CSV")));
    assert!(session.get("CSV_result").await.unwrap().is_some());
    assert!(session.get("BigQuery_result").await.unwrap().is_none());
}

#[tokio::test]
async fn test_route_respects_caller_keys() {
    let router = SourceRouter::new(registry_with(&["CSV"]).await);
    let session = InMemorySession::new("s");
    session.set("db_agent_output", json!("kept")).await.unwrap();

    router
        .route(&session, &QueryRequest::new("x"), "CSV", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        session.get("db_agent_output").await.unwrap(),
        Some(json!("kept"))
    );
}

#[tokio::test]
async fn test_validate_all_reports_false_without_error() {
    let registry = SourceRegistry::new();
    registry.register(Arc::new(StaticProvider::named("BigQuery"))).await;
    registry
        .register(Arc::new(StaticProvider::named("CSV").unreachable()))
        .await;
    let router = SourceRouter::new(registry);

    let checks = router.validate_all(&CancellationToken::new()).await;

    assert_eq!(
        checks,
        vec![("BigQuery".to_string(), true), ("CSV".to_string(), false)]
    );
}

#[tokio::test]
async fn test_validate_all_cancels_hanging_check() {
    let registry = SourceRegistry::new();
    registry.register(Arc::new(StaticProvider::named("BigQuery"))).await;
    registry
        .register(Arc::new(StaticProvider::named("Blackhole").hanging_check()))
        .await;
    let router = SourceRouter::new(registry);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let checks = tokio::time::timeout(Duration::from_secs(5), router.validate_all(&cancel))
        .await
        .unwrap();

    assert_eq!(
        checks,
        vec![("BigQuery".to_string(), true), ("Blackhole".to_string(), false)]
    );
}
