//! Read-only precondition validation, executed before any step performs real
//! work. All environment access goes through the injected [`PreflightProbes`]
//! so the engine itself never touches the device or the filesystem.

use std::path::{Path, PathBuf};

use crate::error::{OperationError, OperationErrorCode, SuggestedAction};
use crate::model::{
    ACCOUNT_NAME_PREFIX, BackupRequest, CreateAccountRequest, OperationRequest, RestoreRequest,
};

/// Items that must exist under an account's backup directory for a restore
/// to be attempted.
pub const REQUIRED_BACKUP_ITEMS: [&str; 2] = ["data", "account.xml"];

const ACCOUNT_NAME_MIN: usize = 3;
const ACCOUNT_NAME_MAX: usize = 30;

/// Read-only environment probes the preflight checker consults.
pub trait PreflightProbes {
    fn request_root_access(&self) -> bool;
    fn is_target_app_installed(&self) -> bool;
    fn is_backup_path_writable(&self, path: &Path) -> bool;
    fn account_exists_by_name(&self, name: &str) -> bool;
    fn account_exists_by_id(&self, id: &str) -> bool;
    fn backup_path_for_account(&self, id: &str) -> Option<PathBuf>;
    fn path_exists(&self, path: &Path) -> bool;
}

/// Validates the preconditions for one request. Returns the first failed
/// check as an [`OperationError`]; reserved types with no wired runner have
/// no checks and pass vacuously.
pub fn run(
    request: &OperationRequest,
    probes: &dyn PreflightProbes,
) -> Result<(), OperationError> {
    match request {
        OperationRequest::Backup(req) => check_backup(req, probes),
        OperationRequest::CreateAccount(req) => check_create_account(req, probes),
        OperationRequest::Restore(req) => check_restore(req, probes),
        OperationRequest::Export { .. }
        | OperationRequest::Import { .. }
        | OperationRequest::SshTest
        | OperationRequest::SshSync => Ok(()),
    }
}

fn check_backup(req: &BackupRequest, probes: &dyn PreflightProbes) -> Result<(), OperationError> {
    if !probes.request_root_access() {
        return Err(root_denied());
    }
    if !probes.is_target_app_installed() {
        return Err(OperationError::new(OperationErrorCode::MonopolyNotInstalled));
    }
    if !probes.is_backup_path_writable(&req.backup_root) {
        return Err(OperationError::unknown("backup_path_not_writable")
            .with_action(SuggestedAction::CheckBackupPath));
    }
    Ok(())
}

fn check_create_account(
    req: &CreateAccountRequest,
    probes: &dyn PreflightProbes,
) -> Result<(), OperationError> {
    // Name validation comes first: a bad name must be reported without any
    // probe call.
    validate_account_name(&req.account_name)?;
    let full_name = format!("{ACCOUNT_NAME_PREFIX}{}", req.account_name.trim());
    if probes.account_exists_by_name(&full_name) {
        return Err(
            OperationError::unknown("account_exists").with_action(SuggestedAction::RenameAccount)
        );
    }
    if !probes.request_root_access() {
        return Err(root_denied());
    }
    Ok(())
}

fn check_restore(req: &RestoreRequest, probes: &dyn PreflightProbes) -> Result<(), OperationError> {
    if !probes.request_root_access() {
        return Err(root_denied());
    }
    if !probes.account_exists_by_id(&req.account_id) {
        return Err(OperationError::unknown("account_missing"));
    }
    let Some(backup_path) = probes.backup_path_for_account(&req.account_id) else {
        return Err(missing_artifacts().with_detail("backup_path_unknown"));
    };
    if !probes.path_exists(&backup_path) {
        return Err(missing_artifacts().with_metadata("path", backup_path.display().to_string()));
    }
    for item in REQUIRED_BACKUP_ITEMS {
        let item_path = backup_path.join(item);
        if !probes.path_exists(&item_path) {
            return Err(missing_artifacts().with_metadata("path", item_path.display().to_string()));
        }
    }
    Ok(())
}

fn validate_account_name(name: &str) -> Result<(), OperationError> {
    let trimmed = name.trim();
    let reason = if trimmed.is_empty() {
        Some("name_blank")
    } else if trimmed.chars().count() < ACCOUNT_NAME_MIN {
        Some("name_too_short")
    } else if trimmed.chars().count() > ACCOUNT_NAME_MAX {
        Some("name_too_long")
    } else if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
    {
        Some("name_invalid_chars")
    } else {
        None
    };
    match reason {
        Some(reason) => {
            Err(OperationError::unknown(reason).with_action(SuggestedAction::RenameAccount))
        }
        None => Ok(()),
    }
}

fn root_denied() -> OperationError {
    OperationError::new(OperationErrorCode::RootDenied).with_action(SuggestedAction::CheckRoot)
}

fn missing_artifacts() -> OperationError {
    OperationError::new(OperationErrorCode::MissingBackupArtifacts)
        .with_action(SuggestedAction::CheckBackupPath)
}
