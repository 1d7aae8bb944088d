use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::OperationError;

/// Prefix under which managed accounts are registered in the device database.
pub const ACCOUNT_NAME_PREFIX: &str = "mgo_";

/// Kind of operation a run performs.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Backup,
    CreateAccount,
    Restore,
    Export,
    Import,
    SshTest,
    SshSync,
}

impl OperationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::CreateAccount => "create_account",
            Self::Restore => "restore",
            Self::Export => "export",
            Self::Import => "import",
            Self::SshTest => "ssh_test",
            Self::SshSync => "ssh_sync",
        }
    }

    /// True if a runner is wired for this type; the remaining types are
    /// reserved extension points that fail before any step starts.
    pub const fn has_runner(self) -> bool {
        matches!(self, Self::Backup | Self::CreateAccount | Self::Restore)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic step kinds. Each operation type tracks an ordered subset of these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationStepId {
    Precheck,
    StartLogSession,
    StopApp,
    PrepareTarget,
    CopyData,
    ReadIds,
    GenerateIds,
    SetPermissions,
    DbUpdate,
    WriteSharedFile,
    ZipBuild,
    ZipValidate,
    ZipExtract,
    SshTest,
    SshListRemote,
    SshUpload,
    SshDownload,
    Finalize,
}

impl OperationStepId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Precheck => "precheck",
            Self::StartLogSession => "start_log_session",
            Self::StopApp => "stop_app",
            Self::PrepareTarget => "prepare_target",
            Self::CopyData => "copy_data",
            Self::ReadIds => "read_ids",
            Self::GenerateIds => "generate_ids",
            Self::SetPermissions => "set_permissions",
            Self::DbUpdate => "db_update",
            Self::WriteSharedFile => "write_shared_file",
            Self::ZipBuild => "zip_build",
            Self::ZipValidate => "zip_validate",
            Self::ZipExtract => "zip_extract",
            Self::SshTest => "ssh_test",
            Self::SshListRemote => "ssh_list_remote",
            Self::SshUpload => "ssh_upload",
            Self::SshDownload => "ssh_download",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for OperationStepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step. Transitions are monotonic:
/// Pending → Running → {Success | Fail | Canceled}, with Canceled also
/// reachable directly from Pending for steps that never ran.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Fail,
    Canceled,
}

impl StepStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Fail | Self::Canceled)
    }
}

/// One named, independently trackable unit of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationStep {
    pub id: OperationStepId,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl OperationStep {
    pub fn pending(id: OperationStepId) -> Self {
        Self {
            id,
            status: StepStatus::Pending,
            detail: None,
            started_at: None,
            ended_at: None,
        }
    }
}

/// Overall status of a run. Idle exists only before the run starts; the four
/// terminal states are absorbing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Idle,
    Running,
    Success,
    Partial,
    Failure,
    Canceled,
}

impl OverallStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Partial | Self::Failure | Self::Canceled
        )
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failure => "failure",
            Self::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Domain result attached to a successful or partially successful run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationResult {
    Backup {
        account_name: String,
        backup_path: PathBuf,
        missing_ids: Vec<String>,
    },
    CreateAccount {
        account_id: String,
        account_name: String,
    },
    Restore {
        account_name: String,
    },
}

/// One immutable snapshot of a run. A fresh state is built per run; every
/// transition produces a new value, and the step list length and order are
/// fixed at construction from the step sequence table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationState {
    pub op: OperationType,
    pub steps: Vec<OperationStep>,
    pub overall: OverallStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<OperationResult>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<OperationError>,
    pub can_cancel: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub log_session_id: Option<String>,
}

impl OperationState {
    /// Fresh Idle state with every step of the type's sequence Pending.
    pub fn new(op: OperationType) -> Self {
        Self {
            op,
            steps: crate::sequence::steps_for(op)
                .iter()
                .copied()
                .map(OperationStep::pending)
                .collect(),
            overall: OverallStatus::Idle,
            result: None,
            error: None,
            can_cancel: false,
            log_session_id: None,
        }
    }

    pub fn step(&self, id: OperationStepId) -> Option<&OperationStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Parameters for a backup run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BackupRequest {
    /// Device-side account id to back up.
    pub account_id: String,
    /// Display name the backup is filed under.
    pub account_name: String,
    /// Destination root directory for the backup.
    pub backup_root: PathBuf,
    /// Proceed even if the user id already exists in another account's backup.
    #[serde(default)]
    pub force_duplicate: bool,
}

/// Parameters for a create-account run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CreateAccountRequest {
    /// Proposed account name, without the registration prefix.
    pub account_name: String,
}

/// Parameters for a restore run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RestoreRequest {
    /// Id of the previously backed-up account to restore.
    pub account_id: String,
}

/// A typed operation request. The variant fixes the operation type, so a
/// request can never carry parameters for the wrong kind of run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationRequest {
    Backup(BackupRequest),
    CreateAccount(CreateAccountRequest),
    Restore(RestoreRequest),
    Export { account_id: String },
    Import { archive_path: PathBuf },
    SshTest,
    SshSync,
}

impl OperationRequest {
    pub const fn operation_type(&self) -> OperationType {
        match self {
            Self::Backup(_) => OperationType::Backup,
            Self::CreateAccount(_) => OperationType::CreateAccount,
            Self::Restore(_) => OperationType::Restore,
            Self::Export { .. } => OperationType::Export,
            Self::Import { .. } => OperationType::Import,
            Self::SshTest => OperationType::SshTest,
            Self::SshSync => OperationType::SshSync,
        }
    }
}
