//! Conversion of a loosely-typed `Definition` into a validated `Dag`.
//!
//! The build runs in a fixed order, failing fast on the first error:
//! scalar layering against the base configuration, ordered environment
//! expansion, parameter expansion, schedule parsing, tag normalization,
//! and finally step validation. Head-only builds stop after the
//! identifying fields and never touch expansion or steps.

use std::time::Duration;

use dagu_types::dag::{Dag, MailOn, Step};
use serde_yaml_ng::Value;

use crate::definition::{Definition, StepDef};
use crate::error::LoadError;
use crate::eval::{DEFAULT_COMMAND_TIMEOUT, EvalContext};
use crate::schedule::parse_schedule_field;

/// Run-history retention applied when neither the definition nor the base
/// configuration sets `histRetentionDays`.
pub const DEFAULT_HIST_RETENTION_DAYS: u32 = 30;

// ---------------------------------------------------------------------------
// DagBuilder
// ---------------------------------------------------------------------------

/// Builds a `Dag` from a `Definition` plus an optional base layer.
pub struct DagBuilder {
    head_only: bool,
    no_eval: bool,
    params: Option<String>,
    command_timeout: Duration,
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DagBuilder {
    pub fn new() -> Self {
        Self {
            head_only: false,
            no_eval: false,
            params: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Resolve only identifying fields: no expansion, no schedules, no
    /// steps. Never fails on missing steps.
    pub fn head_only(mut self) -> Self {
        self.head_only = true;
        self
    }

    /// Disable variable and command substitution; raw strings are kept
    /// verbatim.
    pub fn no_eval(mut self) -> Self {
        self.no_eval = true;
        self
    }

    /// Replace the definition's `params` string.
    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Bound each substituted command's runtime.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Build and validate a `Dag`. Fields left unset in `def` inherit from
    /// `base` where layering applies, then fall back to hard defaults.
    pub fn build(&self, def: &Definition, base: Option<&Definition>) -> Result<Dag, LoadError> {
        let mut dag = Dag {
            name: def.name.clone().unwrap_or_default(),
            description: def
                .description
                .clone()
                .or_else(|| base.and_then(|b| b.description.clone()))
                .unwrap_or_default(),
            tags: parse_tags(def.tags.as_deref()),
            ..Dag::default()
        };

        if self.head_only {
            return Ok(dag);
        }

        dag.hist_retention_days = def
            .hist_retention_days
            .or_else(|| base.and_then(|b| b.hist_retention_days))
            .unwrap_or(DEFAULT_HIST_RETENTION_DAYS);
        dag.mail_on = def
            .mail_on
            .as_ref()
            .or_else(|| base.and_then(|b| b.mail_on.as_ref()))
            .map(|m| MailOn {
                failure: m.failure.unwrap_or(false),
                success: m.success.unwrap_or(false),
            })
            .unwrap_or_default();

        let mut ctx = if self.no_eval {
            EvalContext::new_no_eval()
        } else {
            EvalContext::new(self.command_timeout)
        };

        // Base entries expand first so local entries can reference them.
        if let Some(env) = base.and_then(|b| b.env.as_ref()) {
            build_env(&mut ctx, &mut dag, env)?;
        }
        if let Some(env) = &def.env {
            build_env(&mut ctx, &mut dag, env)?;
        }

        let log_dir = def
            .log_dir
            .clone()
            .or_else(|| base.and_then(|b| b.log_dir.clone()))
            .unwrap_or_default();
        dag.log_dir = ctx.expand(&log_dir)?;

        let params_text = self
            .params
            .clone()
            .or_else(|| def.params.clone())
            .or_else(|| base.and_then(|b| b.params.clone()));
        if let Some(text) = params_text {
            build_params(&mut ctx, &mut dag, &text)?;
        }

        if let Some(value) = &def.schedule {
            let set = parse_schedule_field(value)?;
            dag.schedule = set.start;
            dag.stop_schedule = set.stop;
            dag.restart_schedule = set.restart;
        }

        build_steps(&ctx, &mut dag, def.steps.as_deref().unwrap_or_default())?;
        Ok(dag)
    }
}

// ---------------------------------------------------------------------------
// Environment expansion
// ---------------------------------------------------------------------------

fn build_env(ctx: &mut EvalContext, dag: &mut Dag, value: &Value) -> Result<(), LoadError> {
    match value {
        Value::Mapping(map) => {
            for (key, raw) in map {
                add_env_entry(ctx, dag, scalar_text(key)?, &scalar_text(raw)?)?;
            }
            Ok(())
        }
        Value::Sequence(items) => {
            for item in items {
                // A dangling `-` parses as null; tolerate it.
                if matches!(item, Value::Null) {
                    continue;
                }
                let Value::Mapping(map) = item else {
                    return Err(LoadError::Validation(
                        "env list entries must be key/value mappings".to_string(),
                    ));
                };
                for (key, raw) in map {
                    add_env_entry(ctx, dag, scalar_text(key)?, &scalar_text(raw)?)?;
                }
            }
            Ok(())
        }
        _ => Err(LoadError::Validation(
            "env must be a mapping or a list of single-key mappings".to_string(),
        )),
    }
}

/// Expand one entry and commit it, making it visible to every later
/// expansion in this load.
fn add_env_entry(
    ctx: &mut EvalContext,
    dag: &mut Dag,
    key: String,
    raw: &str,
) -> Result<(), LoadError> {
    let value = ctx.expand(raw)?;
    ctx.set(key.clone(), value.clone());
    dag.env.push((key, value));
    Ok(())
}

fn scalar_text(value: &Value) -> Result<String, LoadError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(LoadError::Validation(format!(
            "env keys and values must be scalars, got {other:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Parameter expansion
// ---------------------------------------------------------------------------

fn build_params(ctx: &mut EvalContext, dag: &mut Dag, text: &str) -> Result<(), LoadError> {
    for (position, token) in split_tokens(text).into_iter().enumerate() {
        let index = (position + 1).to_string();
        match split_named(&token) {
            Some((name, raw)) => {
                let value = ctx.expand(unquote(raw))?;
                dag.params.insert(name.to_string(), value.clone());
                ctx.set(name, value.clone());
                // The positional record keeps the token shape with its
                // reference portion expanded, e.g. "Y=${P1}" -> "Y=foo".
                let rendered = format!("{name}={value}");
                dag.params.insert(index.clone(), rendered.clone());
                ctx.set(index, rendered);
            }
            None => {
                let value = ctx.expand(unquote(&token))?;
                dag.params.insert(index.clone(), value.clone());
                ctx.set(index, value);
            }
        }
    }
    Ok(())
}

/// Split a params string into whitespace-separated tokens, treating a
/// double-quoted or backtick-delimited run as part of one token.
fn split_tokens(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_backticks = false;
    for c in input.chars() {
        match c {
            '"' if !in_backticks => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '`' if !in_quotes => {
                in_backticks = !in_backticks;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes && !in_backticks => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Split a `name=value` token once on the first `=`. Tokens whose left side
/// is not a plain identifier are treated as positional.
fn split_named(token: &str) -> Option<(&str, &str)> {
    token.split_once('=').filter(|(name, _)| {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

fn parse_tags(text: Option<&str>) -> Vec<String> {
    text.map(|t| {
        t.split(',')
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn build_steps(ctx: &EvalContext, dag: &mut Dag, steps: &[StepDef]) -> Result<(), LoadError> {
    if steps.is_empty() {
        return Err(LoadError::Validation(
            "at least one step must be specified".to_string(),
        ));
    }
    for def in steps {
        dag.steps.push(build_step(ctx, def)?);
    }
    Ok(())
}

fn build_step(ctx: &EvalContext, def: &StepDef) -> Result<Step, LoadError> {
    let name = def.name.clone().unwrap_or_default();
    if name.is_empty() {
        return Err(LoadError::Validation(
            "step name must be specified".to_string(),
        ));
    }
    let command_text = def.command.clone().unwrap_or_default();
    let mut tokens = split_tokens(&command_text).into_iter();
    let Some(command) = tokens.next() else {
        return Err(LoadError::Validation(
            "step command must be specified".to_string(),
        ));
    };
    let mut args: Vec<String> = tokens.map(|t| unquote(&t).to_string()).collect();
    if let Some(extra) = &def.args {
        args.extend(extra.iter().cloned());
    }
    let dir = match &def.dir {
        Some(dir) => ctx.expand(dir)?,
        None => String::new(),
    };
    Ok(Step {
        name,
        description: def.description.clone().unwrap_or_default(),
        command: unquote(&command).to_string(),
        args,
        dir,
        depends: def.depends.clone().unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
