//! `ldap3` implementation of the directory traits.

use async_trait::async_trait;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Scope, SearchEntry};
use shared_types::{
    AttributeValue, ConnectionSettings, DirectoryEntry, ExtractionError, ExtractionResult,
    SearchRequest,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use super::{Connector, Directory};

// LDAP result codes (RFC 4511, appendix A)
const RC_SUCCESS: u32 = 0;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;

/// Connects to real LDAP / Active Directory servers
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

#[async_trait]
impl Connector for LdapConnector {
    type Session = LdapDirectory;

    async fn connect(&self, settings: &ConnectionSettings) -> ExtractionResult<LdapDirectory> {
        LdapDirectory::connect(settings).await
    }
}

/// A bound `ldap3` session
pub struct LdapDirectory {
    ldap: Ldap,
    url: String,
}

impl LdapDirectory {
    /// Open a connection and simple-bind with the configured identity.
    #[instrument(skip(settings), fields(server = %settings.server, port = settings.port))]
    pub async fn connect(settings: &ConnectionSettings) -> ExtractionResult<Self> {
        let url = settings.url();

        debug!(url = %url, tls_verify = settings.tls_verify, "Connecting to LDAP server");

        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(settings.timeout)
            .set_no_tls_verify(!settings.tls_verify);

        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &url)
            .await
            .map_err(|e| {
                ExtractionError::Connection(format!(
                    "Failed to connect to LDAP server at {}: {}",
                    url, e
                ))
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        if settings.bind_dn.is_empty() {
            debug!("Performing anonymous bind");
        } else {
            if settings.bind_password.is_empty() {
                warn!(bind_dn = %settings.bind_dn, "Bind DN set without a password, the server may treat this as an unauthenticated bind");
            }
            debug!(bind_dn = %settings.bind_dn, "Performing LDAP bind");
        }

        let result = ldap
            .simple_bind(&settings.bind_dn, settings.bind_password.expose())
            .await
            .map_err(|e| {
                ExtractionError::Connection(format!("LDAP bind to {} failed: {}", url, e))
            })?;

        check_bind_result(&result, &settings.bind_dn)?;

        info!(url = %url, "LDAP connection established");

        Ok(Self { ldap, url })
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    #[instrument(skip(self, request), fields(base_dn = %request.base_dn, filter = %request.filter))]
    async fn search(&mut self, request: &SearchRequest) -> ExtractionResult<Vec<DirectoryEntry>> {
        let attrs: Vec<&str> = if request.attributes.is_empty() {
            vec!["*"]
        } else {
            request.attributes.iter().map(String::as_str).collect()
        };

        let mut adapters: Vec<Box<dyn Adapter<_, _>>> = vec![Box::new(EntriesOnly::new())];
        if request.page_size > 0 {
            let page_size = i32::try_from(request.page_size).unwrap_or(i32::MAX);
            adapters.push(Box::new(PagedResults::new(page_size)));
        }

        debug!(page_size = request.page_size, "Starting subtree search");

        let mut stream = self
            .ldap
            .streaming_search_with(
                adapters,
                &request.base_dn,
                Scope::Subtree,
                &request.filter,
                attrs,
            )
            .await
            .map_err(|e| ExtractionError::Search(format!("LDAP search failed: {}", e)))?;

        let mut entries = Vec::new();
        loop {
            match stream.next().await {
                Ok(Some(entry)) => entries.push(entry_from_search(SearchEntry::construct(entry))),
                Ok(None) => break,
                Err(e) => {
                    // Drain the stream so the server side search is abandoned cleanly
                    let _ = stream.finish().await;
                    return Err(ExtractionError::Search(format!(
                        "LDAP search under '{}' failed: {}",
                        request.base_dn, e
                    )));
                }
            }
        }

        let result = stream.finish().await;
        check_search_result(&result, &request.base_dn)?;

        info!(entries = entries.len(), "LDAP search completed");

        Ok(entries)
    }

    async fn unbind(&mut self) -> ExtractionResult<()> {
        self.ldap.unbind().await.map_err(|e| {
            ExtractionError::Connection(format!("Unbind from {} failed: {}", self.url, e))
        })?;
        debug!(url = %self.url, "Unbound from LDAP server");
        Ok(())
    }
}

fn check_bind_result(result: &LdapResult, bind_dn: &str) -> ExtractionResult<()> {
    match result.rc {
        RC_SUCCESS => Ok(()),
        RC_INVALID_CREDENTIALS => Err(ExtractionError::Authentication(format!(
            "Invalid credentials for bind DN '{}': {}",
            bind_dn, result.text
        ))),
        rc => Err(ExtractionError::Connection(format!(
            "LDAP bind failed with code {}: {}",
            rc, result.text
        ))),
    }
}

fn check_search_result(result: &LdapResult, base_dn: &str) -> ExtractionResult<()> {
    match result.rc {
        RC_SUCCESS => Ok(()),
        RC_NO_SUCH_OBJECT => Err(ExtractionError::Search(format!(
            "Base DN '{}' does not exist",
            base_dn
        ))),
        RC_INSUFFICIENT_ACCESS_RIGHTS => Err(ExtractionError::Search(format!(
            "Bound identity may not search under '{}': {}",
            base_dn, result.text
        ))),
        RC_SIZE_LIMIT_EXCEEDED => Err(ExtractionError::Search(format!(
            "Server-side size limit exceeded under '{}', enable paging with ldap_page_size",
            base_dn
        ))),
        rc => Err(ExtractionError::Search(format!(
            "LDAP search failed with code {}: {}",
            rc, result.text
        ))),
    }
}

/// Merge `ldap3`'s text and binary attribute maps into one entry.
fn entry_from_search(entry: SearchEntry) -> DirectoryEntry {
    let mut attributes: BTreeMap<String, Vec<AttributeValue>> = BTreeMap::new();

    for (name, values) in entry.attrs {
        attributes
            .entry(name)
            .or_default()
            .extend(values.into_iter().map(AttributeValue::Text));
    }
    for (name, values) in entry.bin_attrs {
        attributes
            .entry(name)
            .or_default()
            .extend(values.into_iter().map(AttributeValue::Binary));
    }

    DirectoryEntry {
        dn: entry.dn,
        attributes,
    }
}
