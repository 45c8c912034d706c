use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ExtractionError;

pub const DEFAULT_FILTER: &str = "(objectClass=*)";
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 100;

/// Transport scheme used to reach the directory server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// `ldap://`
    Plain,
    /// `ldaps://`
    Secure,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Plain => "ldap",
            Protocol::Secure => "ldaps",
        }
    }
}

impl FromStr for Protocol {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_end_matches("://").to_ascii_lowercase();
        match normalized.as_str() {
            "ldap" | "plain" => Ok(Protocol::Plain),
            "ldaps" | "secure" => Ok(Protocol::Secure),
            "" => Err(ExtractionError::Configuration(
                "ldap_protocol must not be empty".to_string(),
            )),
            other => Err(ExtractionError::Configuration(format!(
                "Unknown ldap_protocol '{}', expected one of: ldap, ldaps, plain, secure",
                other
            ))),
        }
    }
}

/// Bind password. Never rendered by `Debug` or `Display`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BindPassword(String);

impl BindPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for BindPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***REDACTED***")
    }
}

impl fmt::Display for BindPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***REDACTED***")
    }
}

/// Where and how to connect and bind
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub protocol: Protocol,
    pub server: String,
    pub port: u16,
    /// Empty for an anonymous bind.
    pub bind_dn: String,
    pub bind_password: BindPassword,
    pub timeout: Duration,
    pub tls_verify: bool,
}

impl ConnectionSettings {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.server, self.port)
    }
}

/// The single subtree search a run performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub filter: String,
    /// Empty means every user attribute (`*`).
    pub attributes: Vec<String>,
    /// RFC 2696 page size; 0 turns paging off.
    pub page_size: u32,
}

impl SearchRequest {
    pub fn new(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            filter: DEFAULT_FILTER.to_string(),
            attributes: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Values stamped onto every output record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub source_type: String,
    pub source_value: String,
}

impl Provenance {
    pub const SOURCE: &'static str = "source";
    pub const SOURCE_TYPE: &'static str = "source_type";
    pub const SOURCE_VALUE: &'static str = "source_value";

    pub fn fields(&self) -> [(&'static str, &str); 3] {
        [
            (Self::SOURCE, self.source.as_str()),
            (Self::SOURCE_TYPE, self.source_type.as_str()),
            (Self::SOURCE_VALUE, self.source_value.as_str()),
        ]
    }
}

/// Validated configuration for one run
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub connection: ConnectionSettings,
    pub search: SearchRequest,
    pub provenance: Provenance,
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.connection.server.trim().is_empty() {
            return Err(ExtractionError::Configuration(
                "ldap_server must not be empty".to_string(),
            ));
        }
        if self.connection.port == 0 {
            return Err(ExtractionError::Configuration(
                "ldap_port must be a non-zero port number".to_string(),
            ));
        }
        if self.search.base_dn.trim().is_empty() {
            return Err(ExtractionError::Configuration(
                "ldap_base must not be empty".to_string(),
            ));
        }
        if self.search.filter.trim().is_empty() {
            return Err(ExtractionError::Configuration(
                "search filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One attribute value as the server sent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Binary(Vec<u8>),
}

impl AttributeValue {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeValue::Text(s) => s.as_bytes(),
            AttributeValue::Binary(b) => b,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

/// One object returned by the directory search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_text(mut self, name: &str, values: &[&str]) -> Self {
        self.attributes
            .insert(name.to_string(), values.iter().map(|v| (*v).into()).collect());
        self
    }

    pub fn with_binary(mut self, name: &str, values: Vec<Vec<u8>>) -> Self {
        self.attributes.insert(
            name.to_string(),
            values.into_iter().map(AttributeValue::Binary).collect(),
        );
        self
    }
}

/// A directory entry's attributes plus the provenance fields, keyed in sorted order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputRecord(BTreeMap<String, serde_json::Value>);

impl OutputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous value if the field was already present.
    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.0.insert(field.into(), value)
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// Serialization used for the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// A single pretty-printed JSON array.
    #[default]
    Json,
    /// One compact JSON object per line.
    JsonLines,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::JsonLines => "jsonl",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "ndjson" => Ok(OutputFormat::JsonLines),
            other => Err(format!("unsupported file type '{}', expected json or jsonl", other)),
        }
    }
}
