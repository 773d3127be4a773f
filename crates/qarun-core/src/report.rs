//! Aggregate report returned by the collaborator's `/report` endpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{summary, metrics}` as served by `GET /report`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Free-text summary written by the collaborator.
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub metrics: Metrics,
}

/// Aggregate counts over all tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub total_tasks: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub avg_duration_seconds: Option<f64>,
    /// Failure kind → count.
    #[serde(default)]
    pub failure_distribution: BTreeMap<String, u64>,
    /// Opaque recent-task records, display only.
    #[serde(default)]
    pub recent_tasks: Vec<Value>,
}

impl Metrics {
    /// `completed / max(1, total) * 100`, or `None` when there are no tasks.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_tasks == 0 {
            return None;
        }
        Some(self.completed as f64 / self.total_tasks.max(1) as f64 * 100.0)
    }

    /// Success rate with one decimal, or `N/A`.
    pub fn success_rate_display(&self) -> String {
        match self.success_rate() {
            Some(rate) => format!("{:.1}", rate),
            None => "N/A".to_string(),
        }
    }

    /// Average duration like `12.3s`, or `N/A` when absent or zero.
    pub fn avg_duration_display(&self) -> String {
        match self.avg_duration_seconds {
            Some(secs) if secs > 0.0 => format!("{:.1}s", secs),
            _ => "N/A".to_string(),
        }
    }

    /// Failure kinds ordered by count, highest first.
    pub fn top_failures(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self
            .failure_distribution
            .iter()
            .map(|(kind, count)| (kind.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let metrics = Metrics {
            total_tasks: 3,
            completed: 2,
            ..Default::default()
        };
        assert_eq!(metrics.success_rate_display(), "66.7");
    }

    #[test]
    fn test_success_rate_with_no_tasks() {
        let metrics: Metrics = serde_json::from_str(r#"{"total_tasks":0}"#).unwrap();
        assert_eq!(metrics.success_rate(), None);
        assert_eq!(metrics.success_rate_display(), "N/A");
    }

    #[test]
    fn test_avg_duration_display() {
        let mut metrics = Metrics::default();
        assert_eq!(metrics.avg_duration_display(), "N/A");
        metrics.avg_duration_seconds = Some(12.34);
        assert_eq!(metrics.avg_duration_display(), "12.3s");
    }

    #[test]
    fn test_deserialize_report() {
        let json = r#"{
            "summary": "3 tasks, 2 completed.",
            "metrics": {
                "total_tasks": 3, "completed": 2, "failed": 1, "pending": 0,
                "avg_duration_seconds": null,
                "failure_distribution": {"timeout": 1, "selector": 4},
                "recent_tasks": [{"id": "a"}],
                "failure_count": 5
            }
        }"#;
        let report: Report = serde_json::from_str(json).unwrap();
        assert_eq!(report.metrics.failed, 1);
        assert_eq!(report.metrics.recent_tasks.len(), 1);
        assert_eq!(
            report.metrics.top_failures(),
            vec![("selector", 4), ("timeout", 1)]
        );
    }
}
