//! Wire data model for tasks, scenarios, and their results.
//!
//! These types mirror the JSON schema carried on the task queue and the
//! results queue (see the messaging contracts in `probe-queue`). Bodies and
//! expected/observed responses are untyped JSON (`serde_json::Value`) —
//! comparisons happen on the canonical serialized form, not on typed fields.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Outcome of a single dispatched (or skipped) scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Ok,
    Invalid,
    Timeout,
    Skipped,
    Error,
}

fn default_method() -> String {
    "GET".to_string()
}

/// One HTTP request/response assertion within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: Uuid,
    /// Relative URL path, appended to the sandbox endpoint.
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    pub status_code: u16,
    /// Expected response body. No property filtering is applied to this side.
    #[serde(default)]
    pub response: serde_json::Value,
    #[serde(default)]
    pub ignored_properties: HashSet<String>,
    /// Prerequisite scenario ids. Treated as a set: any non-`ok` prerequisite
    /// causes this scenario to be skipped.
    #[serde(default)]
    pub depends_on: HashSet<Uuid>,
    #[serde(default)]
    pub additional_data: HashMap<String, serde_json::Value>,
}

/// One controller-authored unit containing an image and an ordered scenario set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub docker_image: String,
    pub db_name: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub scenarios: Vec<Scenario>,
}

/// Result of executing (or skipping) one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub id: Uuid,
    pub url: String,
    pub status: ScenarioStatus,
    pub status_code: u16,
    pub ignored_properties: HashSet<String>,
    pub messages: Vec<String>,
    /// Presentation-ready diff table; empty when the response matched.
    pub diff: String,
    pub additional_data: HashMap<String, serde_json::Value>,
    pub duration: String,
    pub response: String,
}

impl ScenarioResult {
    /// A result record seeded from the scenario, before dispatch or skip-check.
    /// `status_code` holds the *observed* code and stays 0 until a response
    /// actually arrives.
    pub fn pending(scenario: &Scenario) -> Self {
        Self {
            id: scenario.id,
            url: scenario.url.clone(),
            status: ScenarioStatus::Ok,
            status_code: 0,
            ignored_properties: scenario.ignored_properties.clone(),
            messages: Vec::new(),
            diff: String::new(),
            additional_data: HashMap::new(),
            duration: String::new(),
            response: String::new(),
        }
    }

    pub fn skipped(scenario: &Scenario) -> Self {
        let mut result = Self::pending(scenario);
        result.status = ScenarioStatus::Skipped;
        result.messages.push("Scenario skipped".to_string());
        result
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = format!("{duration:?}");
    }
}

/// Final outcome of one task invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: Uuid,
    pub docker_image: String,
    pub db_name: String,
    pub status: TaskStatus,
    pub message: String,
    pub output: String,
    pub scenario_results: Vec<ScenarioResult>,
}

impl TaskResult {
    /// Constructed at pipeline entry; status mirrors the task's initial status
    /// and the record is mutated exclusively by the pipeline before emission.
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            docker_image: task.docker_image.clone(),
            db_name: task.db_name.clone(),
            status: task.status,
            message: String::new(),
            output: String::new(),
            scenario_results: Vec::new(),
        }
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.message = message.into();
    }

    pub fn mark_done(&mut self, output: impl Into<String>) {
        self.status = TaskStatus::Done;
        self.message = "null".to_string();
        self.output = output.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_defaults_to_pending() {
        assert_eq!(TaskStatus::default(), TaskStatus::Pending);
    }

    #[test]
    fn scenario_missing_method_defaults_to_get() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "url": "/ping",
            "status_code": 200,
        });
        let scenario: Scenario = serde_json::from_value(json).unwrap();
        assert_eq!(scenario.method, "GET");
        assert!(scenario.depends_on.is_empty());
    }

    #[test]
    fn task_result_from_task_mirrors_initial_status() {
        let task = Task {
            id: Uuid::nil(),
            docker_image: "img".into(),
            db_name: "db".into(),
            status: TaskStatus::Pending,
            scenarios: vec![],
        };
        let result = TaskResult::from_task(&task);
        assert_eq!(result.status, TaskStatus::Pending);
        assert!(result.scenario_results.is_empty());
    }

    #[test]
    fn scenario_result_skipped_carries_message() {
        let scenario = Scenario {
            id: Uuid::nil(),
            url: "/b".into(),
            method: "GET".into(),
            body: None,
            status_code: 200,
            response: serde_json::Value::Null,
            ignored_properties: HashSet::new(),
            depends_on: HashSet::new(),
            additional_data: HashMap::new(),
        };
        let result = ScenarioResult::skipped(&scenario);
        assert_eq!(result.status, ScenarioStatus::Skipped);
        assert_eq!(result.messages, vec!["Scenario skipped".to_string()]);
    }
}
