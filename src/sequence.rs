use crate::model::{OperationStepId, OperationType};

use OperationStepId::*;

/// Ordered step list for each operation type. Total and pure: every sequence
/// starts with Precheck, StartLogSession and ends with Finalize, with no
/// repeated step ids.
pub fn steps_for(op: OperationType) -> &'static [OperationStepId] {
    match op {
        OperationType::Backup => &[
            Precheck,
            StartLogSession,
            StopApp,
            PrepareTarget,
            CopyData,
            ReadIds,
            DbUpdate,
            Finalize,
        ],
        OperationType::CreateAccount => &[
            Precheck,
            StartLogSession,
            StopApp,
            PrepareTarget,
            GenerateIds,
            DbUpdate,
            WriteSharedFile,
            Finalize,
        ],
        OperationType::Restore => &[
            Precheck,
            StartLogSession,
            StopApp,
            PrepareTarget,
            CopyData,
            SetPermissions,
            WriteSharedFile,
            DbUpdate,
            Finalize,
        ],
        OperationType::Export => &[Precheck, StartLogSession, ZipBuild, ZipValidate, Finalize],
        OperationType::Import => &[
            Precheck,
            StartLogSession,
            ZipValidate,
            ZipExtract,
            SetPermissions,
            DbUpdate,
            Finalize,
        ],
        OperationType::SshTest => &[Precheck, StartLogSession, SshTest, Finalize],
        OperationType::SshSync => &[
            Precheck,
            StartLogSession,
            SshTest,
            SshListRemote,
            SshUpload,
            SshDownload,
            Finalize,
        ],
    }
}

/// Steps the backup runner is considered to have performed when it reports a
/// successful (or partially successful) outcome, in execution order.
pub const BACKUP_WORK_STEPS: [OperationStepId; 5] =
    [StopApp, PrepareTarget, CopyData, ReadIds, DbUpdate];

/// Backup steps that already completed before a duplicate user id conflict is
/// detected during the database update.
pub const BACKUP_STEPS_BEFORE_DB: [OperationStepId; 4] =
    [StopApp, PrepareTarget, CopyData, ReadIds];

/// Steps the restore runner is considered to have performed on success.
pub const RESTORE_WORK_STEPS: [OperationStepId; 6] = [
    StopApp,
    PrepareTarget,
    CopyData,
    SetPermissions,
    WriteSharedFile,
    DbUpdate,
];

/// Number of numbered progress events the create-account runner reports.
pub const CREATE_ACCOUNT_TOTAL_STEPS: u32 = 6;

/// Maps a create-account progress number onto its canonical step id. The
/// domain layer reports only "entered step N"; unknown numbers map to None
/// and are ignored.
pub const fn create_account_step(progress_step: u32) -> Option<OperationStepId> {
    match progress_step {
        1 => Some(StopApp),
        2 => Some(PrepareTarget),
        3 => Some(GenerateIds),
        4 => Some(DbUpdate),
        5 => Some(WriteSharedFile),
        6 => Some(Finalize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [OperationType; 7] = [
        OperationType::Backup,
        OperationType::CreateAccount,
        OperationType::Restore,
        OperationType::Export,
        OperationType::Import,
        OperationType::SshTest,
        OperationType::SshSync,
    ];

    #[test]
    fn test_sequences_start_and_end_uniformly() {
        for op in ALL_TYPES {
            let steps = steps_for(op);
            assert!(steps.len() >= 3, "{op} sequence too short");
            assert_eq!(steps[0], Precheck, "{op} must start with precheck");
            assert_eq!(steps[1], StartLogSession);
            assert_eq!(*steps.last().unwrap(), Finalize, "{op} must end with finalize");
        }
    }

    #[test]
    fn test_sequences_have_no_duplicate_steps() {
        for op in ALL_TYPES {
            let steps = steps_for(op);
            let mut seen = std::collections::HashSet::new();
            for step in steps {
                assert!(seen.insert(step), "{op} repeats step {step}");
            }
        }
    }

    #[test]
    fn test_work_step_tables_are_subsets_of_their_sequences() {
        for id in BACKUP_WORK_STEPS {
            assert!(steps_for(OperationType::Backup).contains(&id));
        }
        for id in RESTORE_WORK_STEPS {
            assert!(steps_for(OperationType::Restore).contains(&id));
        }
        assert_eq!(&BACKUP_WORK_STEPS[..4], &BACKUP_STEPS_BEFORE_DB[..]);
    }

    #[test]
    fn test_create_account_progress_mapping_is_in_sequence() {
        let sequence = steps_for(OperationType::CreateAccount);
        for n in 1..=CREATE_ACCOUNT_TOTAL_STEPS {
            let id = create_account_step(n).unwrap();
            assert!(sequence.contains(&id), "step {n} maps outside the sequence");
        }
        assert_eq!(create_account_step(0), None);
        assert_eq!(create_account_step(7), None);
    }
}
