use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Core domain types
// ---------------------------------------------------------------------------

/// Attribute bag of a record. Iteration order is the key order, which is the
/// order attributes are rendered in query results.
pub type Attributes = BTreeMap<String, String>;

/// Two-part identity of a record: partition key (last name) and row key
/// (first name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub partition_key: String,
    pub row_key: String,
}

impl RecordKey {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.row_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub partition_key: String,
    pub row_key: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Record {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.partition_key.clone(), self.row_key.clone())
    }

    /// `"<PartitionKey> <RowKey>[ key=value]*"`
    pub fn display_line(&self) -> String {
        let mut line = format!("{} {}", self.partition_key, self.row_key);
        for (key, value) in &self.attributes {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line
    }
}

// ---------------------------------------------------------------------------
// Query filters
// ---------------------------------------------------------------------------

/// Conjunction of exact-match clauses on the two key columns. At least one
/// clause is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    partition_key: Option<String>,
    row_key: Option<String>,
}

impl RecordFilter {
    /// Builds a filter from optional key fragments. Empty fragments are
    /// treated as absent; returns `None` when both are absent.
    pub fn from_fragments(partition_key: &str, row_key: &str) -> Option<Self> {
        let partition_key = Some(partition_key).filter(|v| !v.is_empty());
        let row_key = Some(row_key).filter(|v| !v.is_empty());
        if partition_key.is_none() && row_key.is_none() {
            return None;
        }
        Some(Self {
            partition_key: partition_key.map(str::to_string),
            row_key: row_key.map(str::to_string),
        })
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    pub fn row_key(&self) -> Option<&str> {
        self.row_key.as_deref()
    }

    pub fn matches_key(&self, key: &RecordKey) -> bool {
        self.partition_key
            .as_deref()
            .is_none_or(|pk| pk == key.partition_key)
            && self.row_key.as_deref().is_none_or(|rk| rk == key.row_key)
    }
}

impl fmt::Display for RecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.partition_key, &self.row_key) {
            (Some(pk), Some(rk)) => write!(
                f,
                "PartitionKey eq '{}' and RowKey eq '{}'",
                quote_filter_value(pk),
                quote_filter_value(rk)
            ),
            (Some(pk), None) => write!(f, "PartitionKey eq '{}'", quote_filter_value(pk)),
            (None, Some(rk)) => write!(f, "RowKey eq '{}'", quote_filter_value(rk)),
            (None, None) => Ok(()),
        }
    }
}

/// Single quotes inside a filter literal are doubled.
pub fn quote_filter_value(value: &str) -> String {
    value.replace('\'', "''")
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField(&'static str),
    InvalidKey(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing field: {field}"),
            Self::InvalidKey(field) => write!(f, "invalid key: {field}"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_record(record: &Record) -> Result<(), ValidationError> {
    if record.partition_key.is_empty() {
        return Err(ValidationError::MissingField("partition_key"));
    }
    if record.row_key.is_empty() {
        return Err(ValidationError::MissingField("row_key"));
    }
    if record.partition_key.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidKey("partition_key"));
    }
    if record.row_key.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidKey("row_key"));
    }
    for key in record.attributes.keys() {
        if key.is_empty() {
            return Err(ValidationError::MissingField("attributes[]"));
        }
    }
    Ok(())
}
