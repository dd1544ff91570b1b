use thiserror::Error;

use crate::shared::enums::TaskStatus;

/// Why a requested status change was refused.
#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Cannot move a task from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("Manager role required for this transition")]
    RoleTooLow,
    #[error("{count} subtasks are still open")]
    IncompleteSubtasks { count: i64 },
    #[error("Blocked by incomplete dependency: {title}")]
    BlockedByDependency { title: String },
}

pub fn allowed_transitions(from: TaskStatus) -> &'static [TaskStatus] {
    match from {
        TaskStatus::Todo => &[TaskStatus::InProgress],
        TaskStatus::InProgress => &[TaskStatus::InReview, TaskStatus::Todo],
        TaskStatus::InReview => &[TaskStatus::Completed, TaskStatus::InProgress],
        TaskStatus::Completed => &[TaskStatus::InProgress],
    }
}

/// Validates the edge of the status machine and the role gate. Completion
/// prerequisites (open subtasks, blocking dependencies) are checked by the
/// caller, which has the rows at hand.
pub fn check_transition(
    from: TaskStatus,
    to: TaskStatus,
    can_manage: bool,
) -> Result<(), WorkflowError> {
    if from == to {
        return Ok(());
    }
    if !allowed_transitions(from).contains(&to) {
        return Err(WorkflowError::InvalidTransition { from, to });
    }
    // Signing a task off, and pulling a signed-off task back, are review
    // decisions reserved to managers.
    let needs_manager = to == TaskStatus::Completed || from == TaskStatus::Completed;
    if needs_manager && !can_manage {
        return Err(WorkflowError::RoleTooLow);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_open() {
        assert_eq!(
            check_transition(TaskStatus::Todo, TaskStatus::InProgress, false),
            Ok(())
        );
        assert_eq!(
            check_transition(TaskStatus::InProgress, TaskStatus::InReview, false),
            Ok(())
        );
        assert_eq!(
            check_transition(TaskStatus::InReview, TaskStatus::Completed, true),
            Ok(())
        );
    }

    #[test]
    fn completion_needs_manager() {
        assert_eq!(
            check_transition(TaskStatus::InReview, TaskStatus::Completed, false),
            Err(WorkflowError::RoleTooLow)
        );
    }

    #[test]
    fn reopen_needs_manager() {
        assert_eq!(
            check_transition(TaskStatus::Completed, TaskStatus::InProgress, false),
            Err(WorkflowError::RoleTooLow)
        );
        assert_eq!(
            check_transition(TaskStatus::Completed, TaskStatus::InProgress, true),
            Ok(())
        );
    }

    #[test]
    fn skipping_review_is_rejected() {
        assert_eq!(
            check_transition(TaskStatus::Todo, TaskStatus::Completed, true),
            Err(WorkflowError::InvalidTransition {
                from: TaskStatus::Todo,
                to: TaskStatus::Completed,
            })
        );
        assert_eq!(
            check_transition(TaskStatus::InProgress, TaskStatus::Completed, true),
            Err(WorkflowError::InvalidTransition {
                from: TaskStatus::InProgress,
                to: TaskStatus::Completed,
            })
        );
    }

    #[test]
    fn same_status_is_a_no_op() {
        assert_eq!(
            check_transition(TaskStatus::InReview, TaskStatus::InReview, false),
            Ok(())
        );
    }

    #[test]
    fn rework_from_review_is_open() {
        assert_eq!(
            check_transition(TaskStatus::InReview, TaskStatus::InProgress, false),
            Ok(())
        );
        assert_eq!(
            check_transition(TaskStatus::InProgress, TaskStatus::Todo, false),
            Ok(())
        );
    }
}
