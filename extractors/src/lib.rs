//! Extractors Crate
//!
//! Pulls every entry under a base DN out of an LDAP / Active Directory server, stamps each one
//! with provenance fields and writes the result as JSON.
//!
//! # Architecture
//!
//! - **Types**: configuration, entries, records and errors live in the `shared-types` crate
//! - **Directory access**: [`ldap_directory`] (the `ldap3` client and AD value decoding)
//! - **Annotation**: [`records`]
//! - **Emit**: [`output`]
//! - **Run**: [`pipeline::DirectoryExtractor`]
//!
//! # Example
//!
//! ```rust,ignore
//! use extractors::{DirectoryExtractor, LdapConnector, OutputOptions};
//!
//! let summary = DirectoryExtractor::new(&config, LdapConnector)
//!     .run(&OutputOptions { path, format, stamp_extract_time: false })
//!     .await?;
//! ```

pub mod ldap_directory;
pub mod output;
pub mod pipeline;
pub mod records;

// Re-export commonly used types
pub use ldap_directory::{Connector, Directory, LdapConnector, LdapDirectory};
pub use pipeline::{DirectoryExtractor, OutputOptions};
pub use records::annotate;
