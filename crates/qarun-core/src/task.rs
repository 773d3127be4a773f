//! Task list entries as returned by the collaborator's `/tasks` endpoint.

use serde::{Deserialize, Serialize};

use crate::{TaskId, TaskStatus};

/// One entry of the task list snapshot.
///
/// Snapshots are replaced wholesale on each poll; there is no merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Task identifier.
    pub id: TaskId,

    /// Current task status.
    #[serde(default)]
    pub status: TaskStatus,

    /// Natural-language description the task was created from.
    #[serde(default)]
    pub description: Option<String>,

    /// Last-updated timestamp, as the collaborator formats it.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl TaskSummary {
    /// Description for display, `-` when absent or empty.
    pub fn description_or_dash(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => "-",
        }
    }
}

/// Newest-first view of a snapshot; the collaborator lists oldest first.
pub fn newest_first(tasks: &[TaskSummary]) -> impl Iterator<Item = &TaskSummary> {
    tasks.iter().rev()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_task_list() {
        let json = r#"[
            {"id":"0f1e2d3c-aaaa","status":"completed","description":"login flow","updated_at":"2024-05-01T10:00:00","created_at":"x"},
            {"id":"b","status":"pending"}
        ]"#;
        let tasks: Vec<TaskSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[0].id.short(), "0f1e2d3c");
        assert_eq!(tasks[1].description_or_dash(), "-");
        assert_eq!(tasks[1].updated_at, None);

        let order: Vec<&str> = newest_first(&tasks).map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["b", "0f1e2d3c-aaaa"]);
    }
}
