use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Provider-specific configuration (connection parameters, dataset ids, etc.)
///
/// Values are plain JSON so the whole map can be persisted into session state.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// One operation a provider exposes to the reasoning layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    /// Human-readable label, e.g. "Retrieve SQL Data"
    pub label: String,
    /// Tool the reasoning layer should call for this capability
    pub tool_name: String,
    /// When the tool applies
    pub description: String,
    /// Short note shown in the tool usage summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_summary: Option<String>,
    /// Extra rule appended to the reminders section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_reminder: Option<String>,
}

impl CapabilityRecord {
    pub fn new(
        label: impl Into<String>,
        tool_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            tool_name: tool_name.into(),
            description: description.into(),
            usage_summary: None,
            key_reminder: None,
        }
    }

    pub fn with_usage_summary(mut self, summary: impl Into<String>) -> Self {
        self.usage_summary = Some(summary.into());
        self
    }

    pub fn with_key_reminder(mut self, reminder: impl Into<String>) -> Self {
        self.key_reminder = Some(reminder.into());
        self
    }
}

/// Static identity and capability description of one store integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Globally unique, case-sensitive name (e.g. "BigQuery")
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    /// Description of tables/collections and their fields
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub capabilities: Vec<CapabilityRecord>,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Settings::new(),
            schema: String::new(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_capability(mut self, capability: CapabilityRecord) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Read a string setting
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

/// Request handed to a provider; the statement is store-specific (SQL, filter JSON, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub statement: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Maximum rows to return
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryRequest {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: serde_json::Value::Null,
            limit: None,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Field data types supported by query results
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Null,
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    Date,
    Timestamp,
    Json,
    Uuid,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Null => "null",
            FieldType::Boolean => "boolean",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Date => "date",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
            FieldType::Uuid => "uuid",
        };
        f.write_str(name)
    }
}

/// Definition of a single result column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub description: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            description: None,
        }
    }
}

/// Columns of a result set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub fields: Vec<FieldDef>,
}

/// A row of data as key-value pairs
pub type DataRow = HashMap<String, serde_json::Value>;

/// Statistics about query execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub row_count: usize,
    /// Total rows available (if known)
    pub total_rows: Option<usize>,
    pub execution_ms: u64,
    /// Whether rows were cut off by the request limit
    pub has_more: bool,
}

/// Result of executing a request against a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub schema: DatasetSchema,
    pub rows: Vec<DataRow>,
    pub stats: QueryStats,
}

impl QueryResult {
    pub fn new(schema: DatasetSchema, rows: Vec<DataRow>, execution_ms: u64) -> Self {
        let row_count = rows.len();

        Self {
            schema,
            rows,
            stats: QueryStats {
                row_count,
                total_rows: Some(row_count),
                execution_ms,
                has_more: false,
            },
        }
    }

    /// Truncate rows to `limit`, recording that more were available
    pub fn truncated(mut self, limit: Option<usize>) -> Self {
        if let Some(limit) = limit {
            if self.rows.len() > limit {
                self.stats.total_rows = Some(self.rows.len());
                self.rows.truncate(limit);
                self.stats.row_count = limit;
                self.stats.has_more = true;
            }
        }
        self
    }
}
