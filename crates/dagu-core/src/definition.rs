//! Loosely-typed intermediate form of a workflow file.
//!
//! `Definition` mirrors the YAML shape of a source file without interpreting
//! it: the polymorphic fields (`env`, `schedule`) stay as generic
//! `serde_yaml_ng::Value`s for the builder to resolve, and nothing is
//! validated here. A `Definition` lives only for the duration of one load.

use serde::Deserialize;
use serde_yaml_ng::Value;

use crate::error::LoadError;

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// Decoded form of a workflow file, pre-validation.
///
/// Every field is optional so the builder can distinguish "explicitly set"
/// from "inherit the base configuration's value". Unknown top-level keys are
/// ignored for forward compatibility.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub name: Option<String>,
    pub description: Option<String>,
    pub log_dir: Option<String>,
    /// Either a mapping or a sequence of single-key mappings. The sequence
    /// form guarantees expansion order; the mapping form should only be
    /// used when entries do not reference each other.
    pub env: Option<Value>,
    /// A cron string, a sequence of cron strings, or a mapping with
    /// `start`/`stop`/`restart` keys.
    pub schedule: Option<Value>,
    /// Single whitespace-separated, quote-aware token string.
    pub params: Option<String>,
    /// Comma-separated tag list.
    pub tags: Option<String>,
    pub hist_retention_days: Option<u32>,
    pub mail_on: Option<MailOnDef>,
    pub steps: Option<Vec<StepDef>>,
}

/// Raw step entry. Name and command are checked by the builder.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDef {
    pub name: Option<String>,
    pub description: Option<String>,
    pub command: Option<String>,
    /// Extra arguments appended after the command string's own tokens.
    pub args: Option<Vec<String>>,
    pub dir: Option<String>,
    pub depends: Option<Vec<String>>,
}

/// Raw mail notification flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailOnDef {
    pub failure: Option<bool>,
    pub success: Option<bool>,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Map a generic YAML value into a `Definition`.
///
/// Fails only on structurally incompatible shapes for fixed-shape fields
/// (e.g. `steps` not being a sequence of mappings); the dynamic fields are
/// carried through untouched.
pub fn decode(value: Value) -> Result<Definition, LoadError> {
    serde_yaml_ng::from_value(value).map_err(|e| LoadError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
