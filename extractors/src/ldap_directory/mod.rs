//! Directory access.
//!
//! The pipeline only talks to a directory through [`Connector`] and [`Directory`], so the
//! `ldap3` backed implementation in [`client`] can be swapped for an in-memory one in tests.

pub mod ad_values;
pub mod client;

pub use client::{LdapConnector, LdapDirectory};

use async_trait::async_trait;
use shared_types::{ConnectionSettings, DirectoryEntry, ExtractionResult, SearchRequest};

/// An open, bound directory session
#[async_trait]
pub trait Directory: Send {
    /// Run one subtree search and collect every entry, in server order.
    async fn search(&mut self, request: &SearchRequest) -> ExtractionResult<Vec<DirectoryEntry>>;

    /// Release the session.
    async fn unbind(&mut self) -> ExtractionResult<()>;
}

/// Opens and binds directory sessions
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Directory;

    async fn connect(&self, settings: &ConnectionSettings) -> ExtractionResult<Self::Session>;
}
