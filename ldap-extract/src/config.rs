use config::{Config, Environment, File};
use serde::Deserialize;
use shared_types::{
    BindPassword, ConnectionSettings, ExtractionError, ExtractorConfig, Protocol, Provenance,
    SearchRequest, DEFAULT_FILTER, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT_SECS,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment overrides look like `LDAP_EXTRACT__<DOMAIN>__<KEY>`.
pub const ENV_PREFIX: &str = "LDAP_EXTRACT";

/// One domain section of the config file, before validation
#[derive(Deserialize, Clone, Default)]
pub struct RawDomainConfig {
    pub ldap_server: Option<String>,
    pub ldap_port: Option<u16>,
    pub ldap_protocol: Option<String>,
    pub ldap_base: Option<String>,
    pub ldap_dn: Option<String>,
    pub ldap_dn_pass: Option<String>,
    pub source: Option<String>,
    pub source_type: Option<String>,
    pub source_value: Option<String>,
    pub ldap_filter: Option<String>,
    pub ldap_page_size: Option<u32>,
    pub ldap_timeout: Option<u64>,
    pub ldap_tls_verify: Option<bool>,
}

impl std::fmt::Debug for RawDomainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDomainConfig")
            .field("ldap_server", &self.ldap_server)
            .field("ldap_port", &self.ldap_port)
            .field("ldap_protocol", &self.ldap_protocol)
            .field("ldap_base", &self.ldap_base)
            .field("ldap_dn", &self.ldap_dn)
            .field(
                "ldap_dn_pass",
                &self.ldap_dn_pass.as_ref().map(|_| "***REDACTED***"),
            )
            .field("source", &self.source)
            .field("source_type", &self.source_type)
            .field("source_value", &self.source_value)
            .field("ldap_filter", &self.ldap_filter)
            .field("ldap_page_size", &self.ldap_page_size)
            .field("ldap_timeout", &self.ldap_timeout)
            .field("ldap_tls_verify", &self.ldap_tls_verify)
            .finish()
    }
}

/// Search settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct SearchOverrides {
    pub filter: Option<String>,
    pub attributes: Vec<String>,
}

impl RawDomainConfig {
    pub fn into_extractor_config(
        self,
        overrides: &SearchOverrides,
    ) -> Result<ExtractorConfig, ExtractionError> {
        let server = required(self.ldap_server, "ldap_server")?;
        let port = self.ldap_port.ok_or_else(|| missing("ldap_port"))?;
        let protocol: Protocol = required(self.ldap_protocol, "ldap_protocol")?.parse()?;
        let base_dn = required(self.ldap_base, "ldap_base")?;
        let source_type = self.source_type.ok_or_else(|| missing("source_type"))?;
        let source_value = self.source_value.ok_or_else(|| missing("source_value"))?;

        // Records are attributed to the server itself when no source is configured
        let source = self
            .source
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| server.clone());

        let filter = overrides
            .filter
            .clone()
            .or(self.ldap_filter)
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let config = ExtractorConfig {
            connection: ConnectionSettings {
                protocol,
                server,
                port,
                bind_dn: self.ldap_dn.unwrap_or_default(),
                bind_password: BindPassword::new(self.ldap_dn_pass.unwrap_or_default()),
                timeout: Duration::from_secs(self.ldap_timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
                tls_verify: self.ldap_tls_verify.unwrap_or(true),
            },
            search: SearchRequest {
                base_dn,
                filter,
                attributes: overrides.attributes.clone(),
                page_size: self.ldap_page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            },
            provenance: Provenance {
                source,
                source_type,
                source_value,
            },
        };

        config.validate()?;
        Ok(config)
    }
}

fn missing(key: &str) -> ExtractionError {
    ExtractionError::Configuration(format!("Missing required key '{}'", key))
}

fn required(value: Option<String>, key: &str) -> Result<String, ExtractionError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(key))
}

/// Read every domain section from the config file, with environment overrides applied.
pub fn load_domains(path: &Path) -> Result<HashMap<String, RawDomainConfig>, ExtractionError> {
    if !path.exists() {
        return Err(ExtractionError::Configuration(format!(
            "Config file not found at {:?}",
            path
        )));
    }

    let builder = Config::builder()
        .add_source(File::from(path.to_path_buf()))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .map_err(|e| {
            ExtractionError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

    builder.try_deserialize().map_err(|e| {
        ExtractionError::Configuration(format!("Invalid config in {}: {}", path.display(), e))
    })
}

/// Pick the requested domain, or the only one when none is requested.
pub fn select_domain(
    domains: HashMap<String, RawDomainConfig>,
    requested: Option<&str>,
) -> Result<(String, RawDomainConfig), ExtractionError> {
    let mut names: Vec<&str> = domains.keys().map(String::as_str).collect();
    names.sort_unstable();
    let valid = names.join(", ");

    let wanted = match requested {
        Some(name) => name.to_string(),
        None if domains.len() == 1 => names[0].to_string(),
        None if domains.is_empty() => {
            return Err(ExtractionError::Configuration(
                "Config file defines no domains".to_string(),
            ))
        }
        None => {
            return Err(ExtractionError::Configuration(format!(
                "Several domains configured, choose one with --domain: {}",
                valid
            )))
        }
    };

    domains
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&wanted))
        .ok_or_else(|| {
            ExtractionError::Configuration(format!(
                "Needs valid domain as input. Valid domains are: {}",
                valid
            ))
        })
}

pub fn get_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("ldap-extract").join("ldap.toml");
        if path.exists() {
            return path;
        }
    }
    PathBuf::from("ldap.ini")
}
