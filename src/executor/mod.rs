//! External lifecycle executor: the seam in front of the certificate script.
//!
//! The script has no structured exit protocol; success and failure are
//! recognized by marker substrings in its human-readable output. That is an
//! inherently brittle contract, so the matching rules live here behind a
//! trait and are pinned by tests, independent of the workflow logic.

mod script;

pub use script::ScriptExecutor;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("invalid client name: use only alphanumeric characters, underscores, or dashes")]
    InvalidName,
    #[error("client name already exists")]
    DuplicateName,
    #[error("certificate operation failed: {0}")]
    UnexpectedFailure(String),
}

/// A generated client credential, ready to hand to the transport as a file
/// attachment. The on-disk artifact has already been removed.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait LifecycleExecutor: Send + Sync {
    /// Issue a certificate for an already-derived client name.
    async fn create(&self, derived_name: &str) -> Result<CredentialBundle, ExecutorError>;

    /// Revoke the certificate for a client name.
    async fn revoke(&self, client_name: &str) -> Result<(), ExecutorError>;
}

// Marker substrings from the script's human-readable output.
pub(crate) const DUPLICATE_CN_MARKER: &str = "The specified client CN was already found";
pub(crate) const REVOKE_CERT_MARKER: &str = "Certificate for client";
pub(crate) const REVOKE_DONE_MARKER: &str = "revoked";

static BASE_NAME_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"^[\w-]+$").expect("valid base name regex"));

/// Reject a base name before anything is spawned.
pub fn validate_base_name(base: &str) -> Result<(), ExecutorError> {
    if BASE_NAME_RE.is_match(base) {
        Ok(())
    } else {
        Err(ExecutorError::InvalidName)
    }
}

/// Append the day-month suffix that keeps names unique across days.
pub fn derive_client_name(base: &str, date: NaiveDate) -> String {
    format!("{base}_{}", date.format("%d-%m"))
}
