//! Pure transition functions over [`OperationState`].
//!
//! Every function takes the current snapshot by reference and returns the
//! next one; callers only ever observe point-in-time values. Step updates
//! addressing an id that is not in the state's step list leave the state
//! unchanged.

use chrono::Utc;

use crate::error::OperationError;
use crate::model::{
    OperationResult, OperationState, OperationStepId, OverallStatus, StepStatus,
};

/// Marks the run as started. Requires an Idle state.
pub fn start_operation(state: &OperationState, session_id: &str) -> OperationState {
    debug_assert_eq!(state.overall, OverallStatus::Idle);
    let mut next = state.clone();
    next.overall = OverallStatus::Running;
    next.can_cancel = true;
    next.log_session_id = Some(session_id.to_string());
    next
}

/// Sets the named step Running. `started_at` is written only on the first
/// call for a step, so re-entering a step preserves its original start time.
/// A step already in a terminal status keeps that status.
pub fn start_step(
    state: &OperationState,
    id: OperationStepId,
    detail: Option<&str>,
) -> OperationState {
    let mut next = state.clone();
    if let Some(step) = next.steps.iter_mut().find(|s| s.id == id) {
        if !step.status.is_terminal() {
            step.status = StepStatus::Running;
        }
        if step.started_at.is_none() {
            step.started_at = Some(Utc::now());
        }
        if let Some(detail) = detail {
            step.detail = Some(detail.to_string());
        }
    }
    next
}

/// Sets the named step Success. Repeated completion with the same status is
/// idempotent apart from an optionally updated detail.
pub fn complete_step(
    state: &OperationState,
    id: OperationStepId,
    detail: Option<&str>,
) -> OperationState {
    end_step(state, id, StepStatus::Success, detail)
}

/// Sets the named step Fail.
pub fn fail_step(
    state: &OperationState,
    id: OperationStepId,
    detail: Option<&str>,
) -> OperationState {
    end_step(state, id, StepStatus::Fail, detail)
}

fn end_step(
    state: &OperationState,
    id: OperationStepId,
    status: StepStatus,
    detail: Option<&str>,
) -> OperationState {
    let mut next = state.clone();
    if let Some(step) = next.steps.iter_mut().find(|s| s.id == id) {
        if step.status != status {
            step.status = status;
            step.ended_at = Some(Utc::now());
        }
        if let Some(detail) = detail {
            step.detail = Some(detail.to_string());
        }
    }
    next
}

/// Every Running step becomes Canceled with an end timestamp.
pub fn cancel_running_steps(state: &OperationState) -> OperationState {
    let mut next = state.clone();
    let now = Utc::now();
    for step in next.steps.iter_mut() {
        if step.status == StepStatus::Running {
            step.status = StepStatus::Canceled;
            step.ended_at = Some(now);
        }
    }
    next
}

/// Every Pending step becomes Canceled. No timestamps are written: the step
/// never ran.
pub fn cancel_pending_steps(state: &OperationState) -> OperationState {
    let mut next = state.clone();
    for step in next.steps.iter_mut() {
        if step.status == StepStatus::Pending {
            step.status = StepStatus::Canceled;
        }
    }
    next
}

/// Terminal transition: fixes the overall status, result and error, and
/// revokes cancellation. No transition function may be applied to the
/// returned value.
pub fn finalize(
    state: &OperationState,
    overall: OverallStatus,
    result: Option<OperationResult>,
    error: Option<OperationError>,
) -> OperationState {
    debug_assert!(overall.is_terminal());
    debug_assert!(result.is_none() || error.is_none());
    let mut next = state.clone();
    next.overall = overall;
    next.result = result;
    next.error = error;
    next.can_cancel = false;
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OperationType;
    use pretty_assertions::assert_eq;

    use OperationStepId::*;

    fn running_state(op: OperationType) -> OperationState {
        start_operation(&OperationState::new(op), "session-1")
    }

    #[test]
    fn test_start_operation_sets_running_and_session() {
        let state = running_state(OperationType::Backup);
        assert_eq!(state.overall, OverallStatus::Running);
        assert!(state.can_cancel);
        assert_eq!(state.log_session_id.as_deref(), Some("session-1"));
    }

    #[test]
    fn test_start_step_sets_running_with_start_time() {
        let state = running_state(OperationType::Backup);
        let state = start_step(&state, Precheck, Some("checking root"));
        let step = state.step(Precheck).unwrap();
        assert_eq!(step.status, StepStatus::Running);
        assert!(step.started_at.is_some());
        assert_eq!(step.detail.as_deref(), Some("checking root"));
        assert!(step.ended_at.is_none());
    }

    #[test]
    fn test_start_step_first_write_wins_on_started_at() {
        let state = running_state(OperationType::Backup);
        let state = start_step(&state, StopApp, None);
        let first = state.step(StopApp).unwrap().started_at;
        let state = start_step(&state, StopApp, Some("again"));
        let step = state.step(StopApp).unwrap();
        assert_eq!(step.started_at, first);
        assert_eq!(step.detail.as_deref(), Some("again"));
    }

    #[test]
    fn test_complete_step_is_idempotent_except_detail() {
        let state = running_state(OperationType::Backup);
        let state = start_step(&state, CopyData, None);
        let state = complete_step(&state, CopyData, None);
        let first_end = state.step(CopyData).unwrap().ended_at;
        let state = complete_step(&state, CopyData, Some("42 files"));
        let step = state.step(CopyData).unwrap();
        assert_eq!(step.status, StepStatus::Success);
        assert_eq!(step.ended_at, first_end);
        assert_eq!(step.detail.as_deref(), Some("42 files"));
    }

    #[test]
    fn test_unknown_step_id_is_a_no_op() {
        let state = running_state(OperationType::SshTest);
        let next = complete_step(&state, CopyData, Some("ignored"));
        assert_eq!(next, state);
        let next = fail_step(&state, ZipBuild, None);
        assert_eq!(next, state);
        let next = start_step(&state, DbUpdate, None);
        assert_eq!(next, state);
    }

    #[test]
    fn test_terminal_step_never_regresses_to_running() {
        let state = running_state(OperationType::Backup);
        let state = start_step(&state, Precheck, None);
        let state = fail_step(&state, Precheck, Some("root_denied"));
        let state = start_step(&state, Precheck, None);
        assert_eq!(state.step(Precheck).unwrap().status, StepStatus::Fail);
    }

    #[test]
    fn test_detail_preserved_when_not_given() {
        let state = running_state(OperationType::Backup);
        let state = start_step(&state, ReadIds, Some("reading ids"));
        let state = complete_step(&state, ReadIds, None);
        assert_eq!(
            state.step(ReadIds).unwrap().detail.as_deref(),
            Some("reading ids")
        );
    }

    #[test]
    fn test_cancel_running_steps_stamps_end_time() {
        let state = running_state(OperationType::Backup);
        let state = start_step(&state, StopApp, None);
        let state = cancel_running_steps(&state);
        let step = state.step(StopApp).unwrap();
        assert_eq!(step.status, StepStatus::Canceled);
        assert!(step.ended_at.is_some());
        assert!(step.ended_at.unwrap() >= step.started_at.unwrap());
    }

    #[test]
    fn test_cancel_pending_steps_leaves_no_timestamps() {
        let state = running_state(OperationType::Backup);
        let state = cancel_pending_steps(&state);
        for step in &state.steps {
            assert_eq!(step.status, StepStatus::Canceled);
            assert!(step.started_at.is_none());
            assert!(step.ended_at.is_none());
        }
    }

    #[test]
    fn test_cancel_does_not_touch_finished_steps() {
        let state = running_state(OperationType::Backup);
        let state = start_step(&state, Precheck, None);
        let state = complete_step(&state, Precheck, None);
        let state = cancel_pending_steps(&state);
        assert_eq!(state.step(Precheck).unwrap().status, StepStatus::Success);
    }

    #[test]
    fn test_finalize_revokes_cancellation() {
        let state = running_state(OperationType::Restore);
        let state = finalize(
            &state,
            OverallStatus::Success,
            Some(OperationResult::Restore {
                account_name: "Main".into(),
            }),
            None,
        );
        assert!(!state.can_cancel);
        assert_eq!(state.overall, OverallStatus::Success);
        assert!(state.result.is_some());
        assert!(state.error.is_none());
    }
}
