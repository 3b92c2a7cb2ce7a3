//! # Task Status (Kanban)
//!
//! Tasks move freely between board columns; the board is the workflow.
//! The only rejected move is a move onto the current column.

use serde::{Deserialize, Serialize};

use crate::impl_lifecycle_display;
use crate::lifecycle::Lifecycle;

/// Kanban column of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Backlog,
    Todo,
    InProgress,
    InReview,
    Blocked,
    Done,
}

impl TaskStatus {
    /// Board columns, left to right.
    pub fn board_order() -> [TaskStatus; 6] {
        [
            Self::Backlog,
            Self::Todo,
            Self::InProgress,
            Self::InReview,
            Self::Blocked,
            Self::Done,
        ]
    }

    /// Whether the task counts toward completed sprint points.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl Lifecycle for TaskStatus {
    fn name(&self) -> &'static str {
        match self {
            Self::Backlog => "BACKLOG",
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::InReview => "IN_REVIEW",
            Self::Blocked => "BLOCKED",
            Self::Done => "DONE",
        }
    }

    fn is_terminal(&self) -> bool {
        false
    }

    fn can_transition_to(&self, to: Self) -> bool {
        *self != to
    }
}

impl_lifecycle_display!(TaskStatus);

/// Task category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Story,
    #[default]
    Task,
    Bug,
    Epic,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::check;

    #[test]
    fn done_can_be_reopened() {
        assert!(!TaskStatus::Done.is_terminal());
        assert!(check(TaskStatus::Done, TaskStatus::Todo).is_ok());
    }

    #[test]
    fn every_distinct_move_is_allowed() {
        for from in TaskStatus::board_order() {
            for to in TaskStatus::board_order() {
                assert_eq!(check(from, to).is_ok(), from != to);
            }
        }
    }

    #[test]
    fn board_order_starts_with_backlog_and_ends_with_done() {
        let order = TaskStatus::board_order();
        assert_eq!(order[0], TaskStatus::Backlog);
        assert_eq!(order[5], TaskStatus::Done);
    }

    #[test]
    fn deserializes_screaming_case() {
        let s: TaskStatus = serde_yaml::from_str("IN_REVIEW").unwrap();
        assert_eq!(s, TaskStatus::InReview);
    }
}
