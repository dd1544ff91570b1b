//! Domain enums stored as text columns.
//!
//! The database keeps these as VARCHAR so the rows stay readable in psql;
//! handlers validate incoming strings through `FromStr` before writing.

use serde::{Deserialize, Serialize};

// ============================================================================
// USER ROLE
// ============================================================================

/// Role of a user account. The administrator flag on the account is
/// independent of the role and overrides role checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Analyst,
    Manager,
    Director,
}

impl UserRole {
    /// Ordering used by permission checks: analyst < manager < director.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Analyst => 0,
            Self::Manager => 1,
            Self::Director => 2,
        }
    }

    pub fn at_least(&self, other: UserRole) -> bool {
        self.rank() >= other.rank()
    }
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Analyst
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analyst => write!(f, "analyst"),
            Self::Manager => write!(f, "manager"),
            Self::Director => write!(f, "director"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analyst" => Ok(Self::Analyst),
            "manager" => Ok(Self::Manager),
            "director" => Ok(Self::Director),
            _ => Err(format!("Unknown user role: {}", s)),
        }
    }
}

// ============================================================================
// TASK STATUS
// ============================================================================

/// Workflow status of a task, one kanban column each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    InReview,
    Completed,
}

impl TaskStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// All statuses in board-column order.
    pub fn all() -> [TaskStatus; 4] {
        [
            Self::Todo,
            Self::InProgress,
            Self::InReview,
            Self::Completed,
        ]
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::InProgress => write!(f, "in_progress"),
            Self::InReview => write!(f, "in_review"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "todo" | "to_do" => Ok(Self::Todo),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "in_review" | "inreview" | "review" => Ok(Self::InReview),
            "completed" | "done" => Ok(Self::Completed),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

// ============================================================================
// TASK PRIORITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" | "critical" => Ok(Self::Urgent),
            _ => Err(format!("Unknown task priority: {}", s)),
        }
    }
}

// ============================================================================
// TASK COMPLEXITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    VerySimple,
    Simple,
    Medium,
    Complex,
    VeryComplex,
}

impl Default for TaskComplexity {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for TaskComplexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VerySimple => write!(f, "very_simple"),
            Self::Simple => write!(f, "simple"),
            Self::Medium => write!(f, "medium"),
            Self::Complex => write!(f, "complex"),
            Self::VeryComplex => write!(f, "very_complex"),
        }
    }
}

impl std::str::FromStr for TaskComplexity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "very_simple" | "verysimple" => Ok(Self::VerySimple),
            "simple" => Ok(Self::Simple),
            "medium" => Ok(Self::Medium),
            "complex" => Ok(Self::Complex),
            "very_complex" | "verycomplex" => Ok(Self::VeryComplex),
            _ => Err(format!("Unknown task complexity: {}", s)),
        }
    }
}

// ============================================================================
// PROJECT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    OnHold,
    Completed,
    Archived,
}

impl Default for ProjectStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::OnHold => write!(f, "on_hold"),
            Self::Completed => write!(f, "completed"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "on_hold" | "onhold" | "paused" => Ok(Self::OnHold),
            "completed" | "done" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Unknown project status: {}", s)),
        }
    }
}

// ============================================================================
// DEPENDENCY TYPE
// ============================================================================

/// Kind of predecessor/successor link between two tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    FinishToStart,
    StartToStart,
    FinishToFinish,
}

impl DependencyType {
    /// Only finish_to_start links hold the successor back from completing.
    pub fn blocks_completion(&self) -> bool {
        matches!(self, Self::FinishToStart)
    }
}

impl Default for DependencyType {
    fn default() -> Self {
        Self::FinishToStart
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FinishToStart => write!(f, "finish_to_start"),
            Self::StartToStart => write!(f, "start_to_start"),
            Self::FinishToFinish => write!(f, "finish_to_finish"),
        }
    }
}

impl std::str::FromStr for DependencyType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "finish_to_start" | "fs" => Ok(Self::FinishToStart),
            "start_to_start" | "ss" => Ok(Self::StartToStart),
            "finish_to_finish" | "ff" => Ok(Self::FinishToFinish),
            _ => Err(format!("Unknown dependency type: {}", s)),
        }
    }
}

// ============================================================================
// HISTORY ACTION
// ============================================================================

/// What a task history row records. Written server-side only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    StatusChanged,
    Assigned,
    Commented,
    AttachmentAdded,
    DependencyAdded,
    TimeLogged,
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::StatusChanged => write!(f, "status_changed"),
            Self::Assigned => write!(f, "assigned"),
            Self::Commented => write!(f, "commented"),
            Self::AttachmentAdded => write!(f, "attachment_added"),
            Self::DependencyAdded => write!(f, "dependency_added"),
            Self::TimeLogged => write!(f, "time_logged"),
        }
    }
}

impl std::str::FromStr for HistoryAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "status_changed" => Ok(Self::StatusChanged),
            "assigned" => Ok(Self::Assigned),
            "commented" => Ok(Self::Commented),
            "attachment_added" => Ok(Self::AttachmentAdded),
            "dependency_added" => Ok(Self::DependencyAdded),
            "time_logged" => Ok(Self::TimeLogged),
            _ => Err(format!("Unknown history action: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_rank_orders_analyst_below_director() {
        assert!(UserRole::Director.at_least(UserRole::Manager));
        assert!(UserRole::Manager.at_least(UserRole::Manager));
        assert!(!UserRole::Analyst.at_least(UserRole::Manager));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in TaskStatus::all() {
            let parsed = TaskStatus::from_str(&status.to_string());
            assert_eq!(parsed, Ok(status));
        }
    }

    #[test]
    fn status_accepts_common_aliases() {
        assert_eq!(TaskStatus::from_str("done"), Ok(TaskStatus::Completed));
        assert_eq!(TaskStatus::from_str("REVIEW"), Ok(TaskStatus::InReview));
    }

    #[test]
    fn unknown_strings_are_rejected() {
        assert!(TaskStatus::from_str("archived").is_err());
        assert!(UserRole::from_str("admin").is_err());
        assert!(DependencyType::from_str("blocks").is_err());
    }

    #[test]
    fn only_finish_to_start_blocks_completion() {
        assert!(DependencyType::FinishToStart.blocks_completion());
        assert!(!DependencyType::StartToStart.blocks_completion());
        assert!(!DependencyType::FinishToFinish.blocks_completion());
    }
}
