use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Closed taxonomy of operation failure causes.
#[derive(
    Error, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationErrorCode {
    #[error("root access denied")]
    RootDenied,
    #[error("monopoly is not installed")]
    MonopolyNotInstalled,
    #[error("backup artifacts missing")]
    MissingBackupArtifacts,
    #[error("duplicate user id")]
    DuplicateUserId,
    #[error("permission restore failed")]
    PermissionRestoreFailed,
    #[error("copy failed")]
    CopyFailed,
    #[error("zip build failed")]
    ZipFailed,
    #[error("zip archive invalid")]
    ZipInvalid,
    #[error("database write failed")]
    DbWriteFailed,
    #[error("ssh configuration missing")]
    SshConfigMissing,
    #[error("ssh authentication failed")]
    SshAuthFailed,
    #[error("ssh host unreachable")]
    SshHostUnreachable,
    #[error("ssh upload failed")]
    SshUploadFailed,
    #[error("ssh download failed")]
    SshDownloadFailed,
    #[error("operation canceled")]
    Canceled,
    #[error("unknown error")]
    Unknown,
}

/// Advisory remediation hint attached at the point of detection. The engine
/// never acts on these; a presentation layer decides what to offer the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    RenameAccount,
    Abort,
    CheckRoot,
    CheckBackupPath,
    CheckSshConfig,
    Retry,
}

/// Structured failure payload carried by every Failure/Canceled terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationError {
    pub code: OperationErrorCode,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub suggested_actions: BTreeSet<SuggestedAction>,
}

impl OperationError {
    pub fn new(code: OperationErrorCode) -> Self {
        Self {
            code,
            detail: None,
            metadata: BTreeMap::new(),
            suggested_actions: BTreeSet::new(),
        }
    }

    /// Unknown-code error with a machine-readable detail string.
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(OperationErrorCode::Unknown).with_detail(detail)
    }

    pub fn canceled() -> Self {
        Self::new(OperationErrorCode::Canceled)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_action(mut self, action: SuggestedAction) -> Self {
        self.suggested_actions.insert(action);
        self
    }

    /// Step-level reason string: the detail when present, else the code text.
    pub fn reason(&self) -> String {
        self.detail
            .clone()
            .unwrap_or_else(|| self.code.to_string())
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.code, detail),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for OperationError {}
