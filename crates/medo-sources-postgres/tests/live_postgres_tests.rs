//! Runs against a real server when MEDO_TEST_POSTGRES_HOST is set
//!
//! Optional: MEDO_TEST_POSTGRES_PORT, MEDO_TEST_POSTGRES_USER,
//! MEDO_TEST_POSTGRES_PASSWORD, MEDO_TEST_POSTGRES_DATABASE.

use medo_sources::{FieldType, Provider, ProviderDescriptor, QueryRequest, SourceError};
use medo_sources_postgres::PostgresProvider;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn live_provider(test: &str) -> Option<PostgresProvider> {
    let Ok(host) = std::env::var("MEDO_TEST_POSTGRES_HOST") else {
        println!("Skipping {}: MEDO_TEST_POSTGRES_HOST is not set", test);
        return None;
    };

    let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
    let port: u16 = env("MEDO_TEST_POSTGRES_PORT", "5432")
        .parse()
        .expect("MEDO_TEST_POSTGRES_PORT must be a port number");

    let descriptor = ProviderDescriptor::new("Live")
        .with_setting("host", host)
        .with_setting("port", port)
        .with_setting("user", env("MEDO_TEST_POSTGRES_USER", "postgres"))
        .with_setting("password", env("MEDO_TEST_POSTGRES_PASSWORD", "postgres"))
        .with_setting("database", env("MEDO_TEST_POSTGRES_DATABASE", "postgres"))
        .with_setting("connect_timeout", 5);

    Some(PostgresProvider::new(descriptor).expect("valid settings"))
}

#[tokio::test]
async fn test_numeric_aggregates_are_not_null() {
    let Some(provider) = live_provider("test_numeric_aggregates_are_not_null") else {
        return;
    };

    let result = provider
        .execute(
            &QueryRequest::new(
                "SELECT SUM(x::bigint) AS total, AVG(x) AS mean, 12.50::numeric AS price \
                 FROM generate_series(1, 4) x",
            ),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let row = &result.rows[0];
    assert_eq!(row.get("total"), Some(&json!(10)));
    assert_eq!(row.get("mean"), Some(&json!(2.5)));
    assert_eq!(row.get("price"), Some(&json!(12.5)));
}

#[tokio::test]
async fn test_parameters_are_bound() {
    let Some(provider) = live_provider("test_parameters_are_bound") else {
        return;
    };
    let cancel = CancellationToken::new();

    let result = provider
        .execute(
            &QueryRequest::new("SELECT $1::text AS greeting, $2::int AS n")
                .with_parameters(json!(["hello", 7])),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(result.rows[0].get("greeting"), Some(&json!("hello")));
    assert_eq!(result.rows[0].get("n"), Some(&json!(7)));

    let err = provider
        .execute(
            &QueryRequest::new("SELECT 1 AS one").with_parameters(json!(["ignored"])),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let Some(provider) = live_provider("test_empty_result_keeps_columns") else {
        return;
    };

    let result = provider
        .execute(
            &QueryRequest::new("SELECT 1::int AS id, 'a'::text AS label WHERE false"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(result.rows.is_empty());
    let fields: Vec<(&str, FieldType)> = result
        .schema
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.field_type))
        .collect();
    assert_eq!(
        fields,
        vec![("id", FieldType::Int32), ("label", FieldType::String)]
    );
}
