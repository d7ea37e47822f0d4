//! Schema definitions for criteria files.
//!
//! A criteria file declares what to execute, what to type into it while it
//! runs, and which substrings its captured output must or must not contain.
//! Criteria are written in YAML and validated against these types.

use serde::{Deserialize, Serialize};

/// Root document for a criteria file.
///
/// Immutable after load; one `Criteria` drives one full test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criteria {
    /// Scripted inputs to send to the running target, each paired with a
    /// substring its response must contain.
    #[serde(default)]
    pub should_echo: Vec<EchoCheck>,

    /// Substrings that must all appear somewhere in the captured output.
    #[serde(default)]
    pub should_have: Vec<String>,

    /// Substrings that must not appear anywhere in the captured output.
    #[serde(default)]
    pub should_lack: Vec<String>,

    /// The target executable and its surrounding setup/cleanup commands.
    pub target: Target,
}

/// A scripted input line and the substring its response must contain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoCheck {
    /// The line written to the target's terminal (newline appended).
    pub command: String,

    /// Substring that must subsequently appear in the captured output.
    pub should_have: String,
}

/// The target executable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Command line for the target, split on whitespace (no quoting support).
    pub execute: String,

    /// Commands run before the target, strictly in order.
    #[serde(default)]
    pub pre_tasks: Vec<String>,

    /// Cleanup commands run after validation, strictly in order.
    #[serde(default)]
    pub post_tasks: Vec<String>,

    /// Seconds to wait after launch before injecting `should_echo` commands.
    #[serde(default)]
    pub should_echo_delay: u64,

    /// Seconds the target may run before it is forcibly killed.
    pub timeout: i64,
}

impl Criteria {
    /// Check invariants that the YAML schema alone cannot express.
    ///
    /// A zero or negative timeout is a configuration error, not "no timeout".
    pub fn validate(&self) -> Result<(), String> {
        if self.target.execute.trim().is_empty() {
            return Err("target.execute cannot be empty".to_string());
        }
        if self.target.timeout <= 0 {
            return Err(format!(
                "target.timeout must be positive, got {}",
                self.target.timeout
            ));
        }
        Ok(())
    }
}
