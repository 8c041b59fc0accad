//! Workflow DAG domain types.
//!
//! `Dag` is the canonical resolved workflow model: every field has been
//! expanded, layered against the base configuration, and validated by the
//! loader in `dagu-core`. The scheduler and executor consume this type and
//! never look at raw YAML.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Dag
// ---------------------------------------------------------------------------

/// A fully resolved, validated workflow definition.
///
/// Owned by the caller after a load returns. `clone()` is a deep copy: the
/// clone shares no mutable backing storage with the original.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    /// Path of the source file this DAG was loaded from.
    pub location: String,
    /// Workflow name. Falls back to the source file stem when the
    /// definition omits `name`.
    pub name: String,
    /// Optional longer description (empty string when absent).
    #[serde(default)]
    pub description: String,
    /// Directory for run logs, resolved through variable expansion.
    #[serde(default)]
    pub log_dir: String,
    /// Resolved environment entries in expansion order.
    ///
    /// Order is semantically significant: later entries were expanded with
    /// earlier ones already in scope, and a key may appear more than once,
    /// in which case the last occurrence is the effective value.
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Expanded parameters, keyed both by 1-based position ("1", "2", ...)
    /// and by name for `key=value` tokens.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Start schedules (validated 5-field cron expressions).
    #[serde(default)]
    pub schedule: Vec<Schedule>,
    /// Stop schedules.
    #[serde(default)]
    pub stop_schedule: Vec<Schedule>,
    /// Restart schedules.
    #[serde(default)]
    pub restart_schedule: Vec<Schedule>,
    /// Lowercased tags in declaration order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Mail notification flags.
    #[serde(default)]
    pub mail_on: MailOn,
    /// How many days of run history to retain.
    #[serde(default)]
    pub hist_retention_days: u32,
    /// Validated steps. Non-empty after a full (non-head-only) load.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Dag {
    /// Effective value of an environment entry, honoring the last-wins rule
    /// for keys assigned more than once.
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Case-insensitive tag membership test.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Deterministic control-socket address for this DAG.
    ///
    /// Derived from `location` only: the file stem plus a truncated SHA-256
    /// of the full path, as `/tmp/@dagu-<stem>-<hex>.sock`. The same
    /// location always yields the same address; no socket is opened here.
    pub fn sock_addr(&self) -> String {
        let stem = Path::new(&self.location)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dag");
        let digest = hex::encode(Sha256::digest(self.location.as_bytes()));
        format!("/tmp/@dagu-{stem}-{}.sock", &digest[..16])
    }
}

impl fmt::Display for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Description: {}", self.description)?;
        writeln!(f, "Tags: {}", self.tags.join(", "))?;
        let env = self
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(f, "Env: {env}")?;
        writeln!(f, "LogDir: {}", self.log_dir)?;
        writeln!(f, "Steps:")?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(
                f,
                "  Step{}: Name: {}, Command: {}, Args: {}",
                i + 1,
                step.name,
                step.command,
                step.args.join(" ")
            )?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A single validated step. Name and command are always non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Step name, unique label within the DAG.
    pub name: String,
    /// Optional description (empty string when absent).
    #[serde(default)]
    pub description: String,
    /// Program to execute (first token of the command string).
    pub command: String,
    /// Arguments: remaining command-string tokens plus any explicit `args`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory, resolved through variable expansion.
    #[serde(default)]
    pub dir: String,
    /// Names of steps this step depends on.
    #[serde(default)]
    pub depends: Vec<String>,
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A validated 5-field cron expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// The cron expression text (minute hour day-of-month month day-of-week).
    pub expression: String,
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

// ---------------------------------------------------------------------------
// MailOn
// ---------------------------------------------------------------------------

/// Which run outcomes trigger notification mail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailOn {
    pub failure: bool,
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
