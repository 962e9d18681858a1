//! PostgreSQL provider for medo-sources
//!
//! Connection parameters come from the provider settings:
//!
//! ```yaml
//! settings:
//!   host: localhost
//!   port: 5432
//!   user: analyst
//!   password: secret
//!   database: warehouse
//!   schema: public
//!   connect_timeout: 10   # seconds, 0 disables
//! ```
//!
//! Queries open the connection on first use, so an unreachable server shows up
//! as `validate_connection() == false` instead of a startup failure. Schema
//! introspection at creation time is bounded by `connect_timeout`.
//!
//! `QueryRequest::parameters` is a JSON array bound positionally to `$1..$n`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use medo_sources::{
    DataRow, DatasetSchema, FieldDef, FieldType, Provider, ProviderDescriptor, ProviderFactory,
    QueryRequest, QueryResult, QueryStats, Result, SourceError,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, Column, NoTls, Row};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub const BACKEND_TYPE: &str = "postgres";

/// Statement keywords that may start a read
const READ_KEYWORDS: &[&str] = &["select", "with", "values", "table", "show", "explain"];

/// Keywords that make a statement write or change the database
const WRITE_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "merge", "truncate", "drop", "alter", "create", "grant",
    "revoke", "copy",
];

type SqlParam = Box<dyn ToSql + Sync + Send>;

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

/// Connection settings read from the provider descriptor
#[derive(Clone, Deserialize)]
pub struct PostgresSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    /// Schema described to the reasoning layer
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Connect timeout in seconds; 0 leaves it to the OS
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl PostgresSettings {
    pub fn from_descriptor(descriptor: &ProviderDescriptor) -> Result<Self> {
        serde_json::from_value(Value::Object(descriptor.settings.clone())).map_err(|e| {
            SourceError::invalid_configuration(format!(
                "Invalid PostgreSQL settings for '{}': {}",
                descriptor.name, e
            ))
        })
    }

    /// Connection string for display purposes (without password)
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.database);
        if let Some(password) = &self.password {
            config.password(password);
        }
        if self.connect_timeout > 0 {
            config.connect_timeout(Duration::from_secs(self.connect_timeout));
        }
        config
    }
}

impl std::fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("connection", &self.connection_string())
            .field("schema", &self.schema)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// PostgreSQL provider
pub struct PostgresProvider {
    descriptor: ProviderDescriptor,
    settings: PostgresSettings,
    client: RwLock<Option<Arc<Client>>>,
}

impl PostgresProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Result<Self> {
        let settings = PostgresSettings::from_descriptor(&descriptor)?;

        Ok(Self {
            descriptor,
            settings,
            client: RwLock::new(None),
        })
    }

    pub fn postgres_settings(&self) -> &PostgresSettings {
        &self.settings
    }

    /// Current client, connecting (or reconnecting after a drop) when needed
    async fn client(&self) -> Result<Arc<Client>> {
        if let Some(client) = self.client.read().await.as_ref() {
            if !client.is_closed() {
                return Ok(client.clone());
            }
        }

        let mut slot = self.client.write().await;
        if let Some(client) = slot.as_ref() {
            if !client.is_closed() {
                return Ok(client.clone());
            }
        }

        debug!(
            "Connecting {} to {}",
            self.descriptor.name,
            self.settings.connection_string()
        );

        let (client, connection) = self.settings.pg_config().connect(NoTls).await.map_err(|e| {
            SourceError::ConnectionFailed(format!("PostgreSQL connection failed: {}", e))
        })?;

        let name = self.descriptor.name.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error on {}: {}", name, e);
            }
        });

        let client = Arc::new(client);
        *slot = Some(client.clone());
        Ok(client)
    }

    fn cancelled(&self) -> SourceError {
        SourceError::Cancelled {
            provider: self.descriptor.name.clone(),
        }
    }

    /// Describe tables and columns of the configured schema
    pub async fn introspect_schema(&self) -> Result<String> {
        let client = self.client().await?;

        let query = r#"
            SELECT table_name, column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = $1
            ORDER BY table_name, ordinal_position
        "#;

        let rows = client
            .query(query, &[&self.settings.schema])
            .await
            .map_err(|e| SourceError::QueryFailed(format!("Failed to read columns: {}", e)))?;

        let mut tables: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in &rows {
            let table: String = row.get(0);
            let column: String = row.get(1);
            let data_type: String = row.get(2);
            let nullable: String = row.get(3);

            let mut line = format!("  {} {}", column, data_type);
            if nullable == "NO" {
                line.push_str(" NOT NULL");
            }
            tables.entry(table).or_default().push(line);
        }

        debug!(
            "Introspected {} tables in schema {}",
            tables.len(),
            self.settings.schema
        );

        Ok(tables
            .into_iter()
            .map(|(table, columns)| {
                format!(
                    "CREATE TABLE {}.{} (\n{}\n);",
                    self.settings.schema,
                    table,
                    columns.join(",\n")
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Fill in the descriptor schema from the database when none was configured
    pub async fn with_introspected_schema(mut self) -> Self {
        if !self.descriptor.schema.trim().is_empty() {
            return self;
        }

        match self.introspect_schema().await {
            Ok(schema) => self.descriptor.schema = schema,
            Err(e) => warn!(
                "Could not introspect schema for {}: {}",
                self.descriptor.name, e
            ),
        }
        self
    }

    /// Accept only read statements
    ///
    /// The statement must start with a read keyword and contain no write
    /// keyword outside of quoted literals, quoted identifiers and comments.
    pub fn validate_statement(sql: &str) -> Result<()> {
        let words = statement_words(sql);

        let Some(first) = words.first() else {
            return Err(SourceError::InvalidQuery("Empty statement".to_string()));
        };

        if !READ_KEYWORDS.contains(&first.as_str()) {
            return Err(SourceError::InvalidQuery(format!(
                "Only read statements are allowed, found '{}'",
                first.to_uppercase()
            )));
        }

        if let Some(word) = words.iter().find(|w| WRITE_KEYWORDS.contains(&w.as_str())) {
            return Err(SourceError::InvalidQuery(format!(
                "Write operations are not allowed: '{}'",
                word.to_uppercase()
            )));
        }

        Ok(())
    }

    /// Map PostgreSQL type to FieldType
    fn map_pg_type(pg_type: &str) -> FieldType {
        match pg_type {
            "boolean" | "bool" => FieldType::Boolean,
            "smallint" | "int2" => FieldType::Int32,
            "integer" | "int" | "int4" => FieldType::Int32,
            "bigint" | "int8" | "oid" => FieldType::Int64,
            "real" | "float4" => FieldType::Float32,
            "double precision" | "float8" => FieldType::Float64,
            "numeric" | "decimal" => FieldType::Float64,
            "character varying" | "varchar" | "character" | "char" | "bpchar" | "text" => {
                FieldType::String
            }
            "bytea" => FieldType::Bytes,
            "date" => FieldType::Date,
            "timestamp"
            | "timestamp without time zone"
            | "timestamp with time zone"
            | "timestamptz" => FieldType::Timestamp,
            "json" | "jsonb" => FieldType::Json,
            "uuid" => FieldType::Uuid,
            _ => FieldType::String,
        }
    }

    fn row_to_datarow(row: &Row) -> Result<DataRow> {
        let mut data_row = HashMap::new();

        for (idx, column) in row.columns().iter().enumerate() {
            data_row.insert(column.name().to_string(), Self::extract_value(row, idx)?);
        }

        Ok(data_row)
    }

    /// Decode one column value; a value that cannot be decoded fails the query
    fn extract_value(row: &Row, idx: usize) -> Result<Value> {
        let value = match row.columns()[idx].type_().name() {
            "bool" => decode::<bool>(row, idx)?.map(Value::Bool),
            "int2" => decode::<i16>(row, idx)?.map(|v| Value::Number(v.into())),
            "int4" => decode::<i32>(row, idx)?.map(|v| Value::Number(v.into())),
            "int8" => decode::<i64>(row, idx)?.map(|v| Value::Number(v.into())),
            "oid" => decode::<u32>(row, idx)?.map(|v| Value::Number(v.into())),
            "float4" => decode::<f32>(row, idx)?
                .and_then(|v| serde_json::Number::from_f64(v as f64))
                .map(Value::Number),
            "float8" => decode::<f64>(row, idx)?
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            "numeric" => decode::<Decimal>(row, idx)?.map(numeric_to_value),
            "timestamp" => decode::<NaiveDateTime>(row, idx)?.map(|v| Value::String(v.to_string())),
            "timestamptz" => {
                decode::<DateTime<Utc>>(row, idx)?.map(|v| Value::String(v.to_rfc3339()))
            }
            "date" => decode::<NaiveDate>(row, idx)?.map(|v| Value::String(v.to_string())),
            "json" | "jsonb" => decode::<Value>(row, idx)?,
            "uuid" => decode::<uuid::Uuid>(row, idx)?.map(|v| Value::String(v.to_string())),
            // Text and unknown types
            _ => decode::<String>(row, idx)?.map(Value::String),
        };

        Ok(value.unwrap_or(Value::Null))
    }

    fn describe_error(e: &tokio_postgres::Error) -> String {
        let Some(db_error) = e.as_db_error() else {
            return e.to_string();
        };

        let mut msg = db_error.message().to_string();
        if let Some(detail) = db_error.detail() {
            msg.push_str(&format!("\nDetail: {}", detail));
        }
        if let Some(hint) = db_error.hint() {
            msg.push_str(&format!("\nHint: {}", hint));
        }
        if let Some(position) = db_error.position() {
            msg.push_str(&format!("\nPosition: {:?}", position));
        }
        msg
    }

    fn query_error(&self, e: &tokio_postgres::Error, statement: &str) -> SourceError {
        error!("PostgreSQL execution failed on {}: {}", self.descriptor.name, e);
        SourceError::QueryFailed(format!(
            "{}\n\nQuery: {}",
            Self::describe_error(e),
            statement
        ))
    }

    fn to_result(columns: &[Column], rows: &[Row], execution_ms: u64) -> Result<QueryResult> {
        let fields = columns
            .iter()
            .map(|col| FieldDef::new(col.name(), Self::map_pg_type(col.type_().name())))
            .collect();

        let data_rows = rows
            .iter()
            .map(Self::row_to_datarow)
            .collect::<Result<Vec<DataRow>>>()?;
        let row_count = data_rows.len();

        Ok(QueryResult {
            schema: DatasetSchema { fields },
            rows: data_rows,
            stats: QueryStats {
                row_count,
                total_rows: Some(row_count),
                execution_ms,
                has_more: false,
            },
        })
    }

    async fn run_statement(&self, client: &Client, request: &QueryRequest) -> Result<QueryResult> {
        let start = Instant::now();

        let statement = client
            .prepare(&request.statement)
            .await
            .map_err(|e| self.query_error(&e, &request.statement))?;

        let params = bind_parameters(&request.parameters, statement.params())?;
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| &**p as &(dyn ToSql + Sync))
            .collect();

        let rows = client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| self.query_error(&e, &request.statement))?;

        let execution_ms = start.elapsed().as_millis() as u64;
        Ok(Self::to_result(statement.columns(), &rows, execution_ms)?.truncated(request.limit))
    }
}

fn decode<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        let column = &row.columns()[idx];
        SourceError::QueryFailed(format!(
            "Cannot decode column '{}' of type {}: {} (cast it to text)",
            column.name(),
            column.type_(),
            e
        ))
    })
}

/// Whole numbers stay integers; other values become floats, or strings when
/// out of float range
fn numeric_to_value(decimal: Decimal) -> Value {
    if decimal.fract().is_zero() {
        if let Some(n) = decimal.to_i64() {
            return Value::Number(n.into());
        }
    }

    decimal
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(decimal.to_string()))
}

/// Bind a JSON array of parameters to the statement's parameter types
fn bind_parameters(parameters: &Value, types: &[Type]) -> Result<Vec<SqlParam>> {
    let values: &[Value] = match parameters {
        Value::Null => &[],
        Value::Array(values) => values,
        other => {
            return Err(SourceError::InvalidQuery(format!(
                "Parameters must be a JSON array, found {}",
                other
            )))
        }
    };

    if values.len() != types.len() {
        return Err(SourceError::InvalidQuery(format!(
            "Statement expects {} parameters but {} were supplied",
            types.len(),
            values.len()
        )));
    }

    values
        .iter()
        .zip(types)
        .enumerate()
        .map(|(idx, (value, ty))| bind_parameter(idx + 1, value, ty))
        .collect()
}

fn bind_parameter(position: usize, value: &Value, ty: &Type) -> Result<SqlParam> {
    let bound = match *ty {
        Type::BOOL => bind(value, Value::as_bool),
        Type::INT2 => bind(value, |v| v.as_i64().and_then(|n| i16::try_from(n).ok())),
        Type::INT4 => bind(value, |v| v.as_i64().and_then(|n| i32::try_from(n).ok())),
        Type::INT8 => bind(value, Value::as_i64),
        Type::FLOAT4 => bind(value, |v| v.as_f64().map(|n| n as f32)),
        Type::FLOAT8 => bind(value, Value::as_f64),
        Type::NUMERIC => bind(value, |v| match v {
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            Value::String(s) => Decimal::from_str(s).ok(),
            _ => None,
        }),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            bind(value, |v| v.as_str().map(str::to_string))
        }
        Type::JSON | Type::JSONB => Some(Box::new(value.clone()) as SqlParam),
        Type::UUID => bind(value, |v| v.as_str().and_then(|s| uuid::Uuid::parse_str(s).ok())),
        Type::DATE => bind(value, |v| v.as_str().and_then(|s| s.parse::<NaiveDate>().ok())),
        Type::TIMESTAMP => bind(value, |v| {
            v.as_str().and_then(|s| s.parse::<NaiveDateTime>().ok())
        }),
        Type::TIMESTAMPTZ => bind(value, |v| {
            v.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        }),
        _ => None,
    };

    bound.ok_or_else(|| {
        SourceError::InvalidQuery(format!(
            "Cannot bind parameter ${} ({}) as {}",
            position, value, ty
        ))
    })
}

fn bind<T, F>(value: &Value, convert: F) -> Option<SqlParam>
where
    T: ToSql + Sync + Send + 'static,
    F: FnOnce(&Value) -> Option<T>,
{
    if value.is_null() {
        return Some(Box::new(None::<T>));
    }
    convert(value).map(|v| Box::new(v) as SqlParam)
}

/// Lowercased words of a statement, skipping quoted text and `--` comments
fn statement_words(sql: &str) -> Vec<String> {
    fn flush(words: &mut Vec<String>, current: &mut String) {
        if !current.is_empty() {
            words.push(std::mem::take(current));
        }
    }

    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                flush(&mut words, &mut current);
                for next in chars.by_ref() {
                    if next == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                flush(&mut words, &mut current);
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            c if c.is_alphanumeric() || c == '_' => current.push(c.to_ascii_lowercase()),
            _ => flush(&mut words, &mut current),
        }
    }
    flush(&mut words, &mut current);

    words
}

#[async_trait]
impl Provider for PostgresProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn validate_connection(&self, cancel: &CancellationToken) -> bool {
        let check = async {
            let client = self.client().await?;
            client
                .simple_query("SELECT 1")
                .await
                .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?;
            Ok::<_, SourceError>(())
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Connection check for {} cancelled", self.descriptor.name);
                false
            }
            result = check => match result {
                Ok(()) => true,
                Err(e) => {
                    debug!("Connection check for {} failed: {}", self.descriptor.name, e);
                    false
                }
            },
        }
    }

    async fn execute(&self, request: &QueryRequest, cancel: &CancellationToken) -> Result<QueryResult> {
        Self::validate_statement(&request.statement)?;

        let client = tokio::select! {
            _ = cancel.cancelled() => return Err(self.cancelled()),
            client = self.client() => client?,
        };

        debug!("Executing SQL on {}: {}", self.descriptor.name, request.statement);

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = client.cancel_token().cancel_query(NoTls).await {
                    warn!("Failed to cancel query on {}: {}", self.descriptor.name, e);
                }
                return Err(self.cancelled());
            }
            result = self.run_statement(&client, request) => result?,
        };

        debug!(
            "SQL on {} returned {} rows in {}ms",
            self.descriptor.name, result.stats.row_count, result.stats.execution_ms
        );

        Ok(result)
    }
}

/// Factory for the `postgres` backend
#[derive(Debug)]
pub struct PostgresProviderFactory {
    /// Fill empty schemas from `information_schema` at creation time
    pub introspect: bool,
}

impl PostgresProviderFactory {
    pub fn new() -> Self {
        Self { introspect: true }
    }

    pub fn without_introspection() -> Self {
        Self { introspect: false }
    }
}

impl Default for PostgresProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderFactory for PostgresProviderFactory {
    fn backend_type(&self) -> &'static str {
        BACKEND_TYPE
    }

    async fn create_provider(&self, descriptor: ProviderDescriptor) -> Result<Arc<dyn Provider>> {
        let provider = PostgresProvider::new(descriptor)?;

        let provider = if self.introspect {
            provider.with_introspected_schema().await
        } else {
            provider
        };

        Ok(Arc::new(provider))
    }
}
