use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Resource bounds and input for a single run.
///
/// Field names follow the option object accepted by the web front end, so a
/// JSON file such as `{"maxSteps": 500, "userInput": "abc"}` loads directly.
/// Missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionLimits {
    /// Wall-clock budget in milliseconds.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    /// Maximum number of instructions executed.
    pub max_steps: u64,
    /// Number of addressable cells. The pointer must stay strictly below
    /// this, so the highest reachable pointer is `max_memory - 1`, not
    /// `max_memory` itself. Moving right from `max_memory - 1` fails.
    pub max_memory: usize,
    /// Characters consumed left to right by `,`.
    pub user_input: String,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_steps: 1_000_000,
            max_memory: 30_000,
            user_input: String::new(),
        }
    }
}

impl ExecutionLimits {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_memory(mut self, max_memory: usize) -> Self {
        self.max_memory = max_memory;
        self
    }

    pub fn with_user_input(mut self, user_input: impl Into<String>) -> Self {
        self.user_input = user_input.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load limits from a JSON file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
