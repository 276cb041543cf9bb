//! Task data model and the per-run fixture

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::SmokeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    /// `<option>` value in the status select
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = SmokeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in-progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(SmokeError::Assertion(format!("unknown task status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task as entered through the UI form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub tags: BTreeSet<String>,
}

/// The uniquely titled task each run creates, updates, and deletes
#[derive(Debug, Clone)]
pub struct TaskFixture {
    pub task: Task,
    pub tag: String,
}

impl TaskFixture {
    pub const DESCRIPTION: &'static str = "Created via smoke test to verify save/load.";

    /// Fixture keyed by a millisecond timestamp
    pub fn mint(millis: i64) -> Self {
        let tag = format!("smoke-tag-{}", millis);
        let task = Task {
            title: format!("Smoke task {}", millis),
            description: Self::DESCRIPTION.to_string(),
            status: TaskStatus::Todo,
            priority: TaskPriority::High,
            tags: BTreeSet::from([tag.clone()]),
        };
        Self { task, tag }
    }

    pub fn now() -> Self {
        Self::mint(chrono::Utc::now().timestamp_millis())
    }

    pub fn title(&self) -> &str {
        &self.task.title
    }
}
