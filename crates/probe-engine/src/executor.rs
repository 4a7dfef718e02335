//! Scenario dispatch.
//!
//! One HTTP request per scenario, in the order produced by [`crate::graph`].
//! Outcome precedence: `skipped` (a prerequisite did not resolve `ok`) beats
//! dispatch entirely; otherwise `timeout`, `error`, `invalid` (status code or
//! body mismatch), falling through to `ok` when nothing above fired.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use probe_shared::{Scenario, ScenarioResult, ScenarioStatus};
use reqwest::{Client, Method};
use thiserror::Error;
use uuid::Uuid;

use crate::comparator::compare;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct ScenarioExecutor {
    client: Client,
    timeout: Duration,
}

impl ScenarioExecutor {
    pub fn new(timeout: Duration) -> Result<Self, ExecutorError> {
        let client = Client::builder().build()?;
        Ok(Self { client, timeout })
    }

    /// Dispatches a single scenario against `base_url`, or returns a skipped
    /// result without dispatching if any prerequisite in `results_so_far`
    /// resolved to a non-`ok` status.
    pub async fn execute(
        &self,
        base_url: &str,
        scenario: &Scenario,
        results_so_far: &HashMap<Uuid, ScenarioResult>,
    ) -> ScenarioResult {
        if self.should_skip(scenario, results_so_far) {
            return ScenarioResult::skipped(scenario);
        }

        let mut result = ScenarioResult::pending(scenario);
        let url = format!("{base_url}{}", scenario.url);
        let method = Method::from_bytes(scenario.method.as_bytes()).unwrap_or(Method::GET);

        let mut request = self.client.request(method, &url).timeout(self.timeout);
        if let Some(body) = &scenario.body {
            request = request.json(body);
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                result.status = ScenarioStatus::Timeout;
                result.messages.push(e.to_string());
                return result;
            }
            Err(e) => {
                result.status = ScenarioStatus::Error;
                result.messages.push(e.to_string());
                return result;
            }
        };

        let status_code = response.status().as_u16();
        result.status_code = status_code;

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                result.status = ScenarioStatus::Error;
                result.messages.push(e.to_string());
                return result;
            }
        };
        result.set_duration(start.elapsed());

        if status_code != scenario.status_code {
            result.status = ScenarioStatus::Invalid;
            result.messages.push(format!(
                "Invalid HTTP Status code (received={status_code}, expected={})",
                scenario.status_code
            ));
        }

        if bytes.is_empty() {
            result.response = String::new();
            return result;
        }

        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(observed) => {
                let comparison = compare(&observed, &scenario.response, &scenario.ignored_properties);
                result.response = comparison.canonical_observed;
                if !comparison.matches {
                    result.status = ScenarioStatus::Invalid;
                    result.messages.push("JSON Mismatch".to_string());
                    result.diff = comparison.diff;
                }
            }
            Err(e) => {
                result.status = ScenarioStatus::Invalid;
                result.messages.push("Invalid JSON".to_string());
                result.response = String::from_utf8_lossy(&bytes).to_string();
                result
                    .additional_data
                    .insert("exception".to_string(), serde_json::Value::String(e.to_string()));
            }
        }

        result
    }

    fn should_skip(&self, scenario: &Scenario, results_so_far: &HashMap<Uuid, ScenarioResult>) -> bool {
        scenario.depends_on.iter().any(|dependency| {
            results_so_far
                .get(dependency)
                .is_some_and(|r| r.status != ScenarioStatus::Ok)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn scenario(depends_on: HashSet<Uuid>) -> Scenario {
        Scenario {
            id: Uuid::new_v4(),
            url: "/ping".to_string(),
            method: "GET".to_string(),
            body: None,
            status_code: 200,
            response: serde_json::Value::Null,
            ignored_properties: HashSet::new(),
            depends_on,
            additional_data: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn skips_when_a_prerequisite_is_not_ok() {
        let executor = ScenarioExecutor::new(Duration::from_secs(5)).unwrap();
        let prerequisite_id = Uuid::new_v4();
        let scenario = scenario(HashSet::from([prerequisite_id]));

        let mut prior = scenario.clone();
        prior.id = prerequisite_id;
        let mut results = HashMap::new();
        let mut failed = ScenarioResult::pending(&prior);
        failed.status = ScenarioStatus::Invalid;
        results.insert(prerequisite_id, failed);

        let result = executor.execute("http://127.0.0.1:1", &scenario, &results).await;
        assert_eq!(result.status, ScenarioStatus::Skipped);
    }
}
