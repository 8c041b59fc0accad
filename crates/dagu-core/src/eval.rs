//! Call-scoped variable expansion and shell command substitution.
//!
//! `EvalContext` replaces the classic "write everything into the process
//! environment" approach: it snapshots the process environment once per
//! load and layers resolved entries on top, so earlier entries are visible
//! to later expansions without any global mutable state. Concurrent loads
//! in the same process cannot interfere with each other.
//!
//! Backtick segments are executed as shell commands under a bounded
//! timeout; a hung command is killed instead of blocking the load forever.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use wait_timeout::ChildExt;

use crate::error::LoadError;

/// Upper bound for a single substituted command unless the loader
/// configures one explicitly.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Matches `${NAME}` and `$NAME` variable references.
static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]+)\}|\$([A-Za-z0-9_]+)").expect("valid pattern")
});

/// Matches a backtick-delimited command segment.
static COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]+`").expect("valid pattern"));

// ---------------------------------------------------------------------------
// EvalContext
// ---------------------------------------------------------------------------

/// Per-load expansion environment.
///
/// Entries are ordered; a key set more than once resolves to its latest
/// value. Substituted commands run with this environment, not the raw
/// process one.
pub struct EvalContext {
    vars: Vec<(String, String)>,
    command_timeout: Duration,
    no_eval: bool,
}

impl EvalContext {
    /// Context seeded with a snapshot of the current process environment.
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            vars: std::env::vars().collect(),
            command_timeout,
            no_eval: false,
        }
    }

    /// Context whose `expand` returns its input verbatim. Used by the
    /// head-only fast path.
    pub fn new_no_eval() -> Self {
        Self {
            vars: Vec::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            no_eval: true,
        }
    }

    /// Latest value recorded for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Record a resolved entry, making it visible to later expansions.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.push((name.into(), value.into()));
    }

    /// Expand variable references, then evaluate backtick command
    /// substitutions. With expansion disabled the input is returned
    /// unchanged.
    pub fn expand(&self, input: &str) -> Result<String, LoadError> {
        if self.no_eval {
            return Ok(input.to_string());
        }
        let substituted = self.substitute_vars(input);
        self.substitute_commands(&substituted)
    }

    fn substitute_vars(&self, input: &str) -> String {
        VAR_RE
            .replace_all(input, |caps: &regex::Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                // Unknown variables expand to the empty string
                self.get(name).unwrap_or_default().to_string()
            })
            .into_owned()
    }

    fn substitute_commands(&self, input: &str) -> Result<String, LoadError> {
        if !input.contains('`') {
            return Ok(input.to_string());
        }
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for m in COMMAND_RE.find_iter(input) {
            out.push_str(&input[last..m.start()]);
            out.push_str(&self.run_command(m.as_str().trim_matches('`'))?);
            last = m.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }

    /// Run `command` through the shell and return its trimmed stdout.
    fn run_command(&self, command: &str) -> Result<String, LoadError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env_clear()
            .envs(self.effective_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LoadError::Eval(format!("failed to run `{command}`: {e}")))?;

        // Drain both pipes while waiting; a child producing more than the
        // pipe buffer holds would otherwise block on write and never exit.
        let stdout_reader = child.stdout.take().map(drain_pipe);
        let stderr_reader = child.stderr.take().map(drain_pipe);

        let waited = child.wait_timeout(self.command_timeout)?;
        if waited.is_none() {
            let _ = child.kill();
            let _ = child.wait();
        }
        let stdout = stdout_reader.map(join_pipe).unwrap_or_default();
        let stderr = stderr_reader.map(join_pipe).unwrap_or_default();

        let Some(status) = waited else {
            return Err(LoadError::Eval(format!(
                "command `{command}` timed out after {:?}",
                self.command_timeout
            )));
        };
        if !status.success() {
            return Err(LoadError::Eval(format!(
                "command `{command}` failed ({status}): {}",
                stderr.trim()
            )));
        }
        Ok(stdout.trim().to_string())
    }

    /// Latest-wins view of the recorded entries, for spawning commands.
    fn effective_env(&self) -> HashMap<&str, &str> {
        self.vars
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

fn drain_pipe(mut pipe: impl Read + Send + 'static) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

fn join_pipe(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
