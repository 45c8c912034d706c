use chrono::{SecondsFormat, Utc};
use shared_types::{
    ExtractionResult, ExtractorConfig, OutputFormat, OutputRecord, RunSummary,
};
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

use crate::ldap_directory::{Connector, Directory};
use crate::output;
use crate::records::annotate;

/// Where and how a run writes its records
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub stamp_extract_time: bool,
}

/// Runs connect → search → annotate → emit once against one directory.
pub struct DirectoryExtractor<'a, C> {
    config: &'a ExtractorConfig,
    connector: C,
}

impl<'a, C: Connector> DirectoryExtractor<'a, C> {
    pub fn new(config: &'a ExtractorConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// Execute the run. Nothing is written unless the search succeeds.
    #[instrument(skip_all, fields(server = %self.config.connection.server, base_dn = %self.config.search.base_dn))]
    pub async fn run(&self, options: &OutputOptions) -> ExtractionResult<RunSummary> {
        self.config.validate()?;
        output::check_destination(&options.path)?;

        let records = self.collect(options.stamp_extract_time).await?;

        output::write_records(&options.path, &records, options.format)?;

        let summary = RunSummary {
            records: records.len(),
            output: options.path.clone(),
        };
        info!(
            records = summary.records,
            output = %summary.output.display(),
            "Extraction complete"
        );
        Ok(summary)
    }

    /// Connect, search and annotate without writing anything.
    pub async fn collect(&self, stamp_extract_time: bool) -> ExtractionResult<Vec<OutputRecord>> {
        let mut directory = self.connector.connect(&self.config.connection).await?;

        let searched = directory.search(&self.config.search).await;

        // The session is released on both paths; an unbind failure only matters for logging.
        if let Err(e) = directory.unbind().await {
            match &searched {
                Ok(_) => warn!(error = %e, "Failed to unbind after search"),
                Err(_) => debug!(error = %e, "Failed to unbind after failed search"),
            }
        }

        let entries = searched?;
        debug!(entries = entries.len(), "Annotating entries");

        let extract_time =
            stamp_extract_time.then(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

        Ok(entries
            .iter()
            .map(|entry| annotate(entry, &self.config.provenance, extract_time.as_deref()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use shared_types::{
        AttributeValue, BindPassword, ConnectionSettings, DirectoryEntry, ExtractionError,
        Protocol, Provenance, SearchRequest,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone)]
    enum Behaviour {
        Entries(Vec<DirectoryEntry>),
        RejectBind,
        Unreachable,
        MissingBase,
    }

    struct FakeConnector {
        behaviour: Behaviour,
        unbound: Arc<AtomicBool>,
    }

    impl FakeConnector {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                unbound: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    struct FakeDirectory {
        behaviour: Behaviour,
        unbound: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Session = FakeDirectory;

        async fn connect(&self, settings: &ConnectionSettings) -> ExtractionResult<FakeDirectory> {
            match self.behaviour {
                Behaviour::RejectBind => Err(ExtractionError::Authentication(format!(
                    "Invalid credentials for bind DN '{}'",
                    settings.bind_dn
                ))),
                Behaviour::Unreachable => Err(ExtractionError::Connection(format!(
                    "Failed to connect to LDAP server at {}",
                    settings.url()
                ))),
                _ => Ok(FakeDirectory {
                    behaviour: self.behaviour.clone(),
                    unbound: self.unbound.clone(),
                }),
            }
        }
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn search(
            &mut self,
            request: &SearchRequest,
        ) -> ExtractionResult<Vec<DirectoryEntry>> {
            match &self.behaviour {
                Behaviour::Entries(entries) => Ok(entries.clone()),
                _ => Err(ExtractionError::Search(format!(
                    "Base DN '{}' does not exist",
                    request.base_dn
                ))),
            }
        }

        async fn unbind(&mut self) -> ExtractionResult<()> {
            self.unbound.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> ExtractorConfig {
        ExtractorConfig {
            connection: ConnectionSettings {
                protocol: Protocol::Secure,
                server: "dc1.example.org".to_string(),
                port: 636,
                bind_dn: "CN=svc,DC=example,DC=org".to_string(),
                bind_password: BindPassword::new("s3cret-pass"),
                timeout: Duration::from_secs(100),
                tls_verify: true,
            },
            search: SearchRequest::new("OU=Users,DC=example,DC=org"),
            provenance: Provenance {
                source: "hr-sync".to_string(),
                source_type: "ActiveDirectory".to_string(),
                source_value: "example-org".to_string(),
            },
        }
    }

    fn two_users() -> Vec<DirectoryEntry> {
        vec![
            DirectoryEntry::new("CN=Jane Doe,OU=Users,DC=example,DC=org")
                .with_text("sAMAccountName", &["jdoe"])
                .with_text("mail", &["jane.doe@example.org"])
                .with_binary("objectGUID", vec![vec![0x01; 16]]),
            DirectoryEntry::new("CN=John Roe,OU=Users,DC=example,DC=org")
                .with_text("sAMAccountName", &["jroe"])
                .with_text("memberOf", &["CN=Staff,DC=example,DC=org"]),
        ]
    }

    fn options(dir: &tempfile::TempDir) -> OutputOptions {
        OutputOptions {
            path: dir.path().join("users.json"),
            format: OutputFormat::Json,
            stamp_extract_time: false,
        }
    }

    fn read_records(path: &std::path::Path) -> Vec<OutputRecord> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_two_users_are_extracted_and_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let connector = FakeConnector::new(Behaviour::Entries(two_users()));
        let unbound = connector.unbound.clone();
        let options = options(&dir);

        let summary = DirectoryExtractor::new(&config, connector)
            .run(&options)
            .await
            .unwrap();

        assert_eq!(summary.records, 2);
        assert!(unbound.load(Ordering::SeqCst));

        let records = read_records(&options.path);
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.get("source"), Some(&json!("hr-sync")));
            assert_eq!(record.get("source_type"), Some(&json!("ActiveDirectory")));
            assert_eq!(record.get("source_value"), Some(&json!("example-org")));
        }
        assert_eq!(records[0].get("sAMAccountName"), Some(&json!(["jdoe"])));
        assert_eq!(
            records[0].get("objectGUID"),
            Some(&json!(["01010101-0101-0101-0101-010101010101"]))
        );
        assert_eq!(
            records[1].get("memberOf"),
            Some(&json!(["CN=Staff,DC=example,DC=org"]))
        );
    }

    #[tokio::test]
    async fn test_written_output_matches_collected_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let options = options(&dir);

        let extractor =
            DirectoryExtractor::new(&config, FakeConnector::new(Behaviour::Entries(two_users())));
        let collected = extractor.collect(false).await.unwrap();
        extractor.run(&options).await.unwrap();

        assert_eq!(read_records(&options.path), collected);
    }

    #[tokio::test]
    async fn test_empty_base_writes_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let options = options(&dir);

        let summary =
            DirectoryExtractor::new(&config, FakeConnector::new(Behaviour::Entries(vec![])))
                .run(&options)
                .await
                .unwrap();

        assert_eq!(summary.records, 0);
        assert!(read_records(&options.path).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_bind_leaves_previous_output_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let options = options(&dir);
        std::fs::write(&options.path, "previous run").unwrap();

        let err = DirectoryExtractor::new(&config, FakeConnector::new(Behaviour::RejectBind))
            .run(&options)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Authentication(_)));
        assert!(!err.to_string().contains("s3cret-pass"));
        assert_eq!(std::fs::read_to_string(&options.path).unwrap(), "previous run");
    }

    #[tokio::test]
    async fn test_unreachable_server_creates_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let options = options(&dir);

        let err = DirectoryExtractor::new(&config, FakeConnector::new(Behaviour::Unreachable))
            .run(&options)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Connection(_)));
        assert!(!options.path.exists());
    }

    #[tokio::test]
    async fn test_missing_base_is_search_error_and_still_unbinds() {
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let connector = FakeConnector::new(Behaviour::MissingBase);
        let unbound = connector.unbound.clone();
        let options = options(&dir);

        let err = DirectoryExtractor::new(&config, connector)
            .run(&options)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Search(_)));
        assert!(unbound.load(Ordering::SeqCst));
        assert!(!options.path.exists());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.search.base_dn = String::new();

        let err = DirectoryExtractor::new(&config, FakeConnector::new(Behaviour::Unreachable))
            .run(&options(&dir))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_extract_time_is_stamped_on_request() {
        let config = config();
        let entries = vec![DirectoryEntry {
            dn: "CN=Jane Doe,OU=Users,DC=example,DC=org".to_string(),
            attributes: [(
                "cn".to_string(),
                vec![AttributeValue::Text("Jane Doe".to_string())],
            )]
            .into_iter()
            .collect(),
        }];

        let records = DirectoryExtractor::new(&config, FakeConnector::new(Behaviour::Entries(entries)))
            .collect(true)
            .await
            .unwrap();

        let stamp = records[0].get("extract_time").and_then(|v| v.as_str()).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }
}
