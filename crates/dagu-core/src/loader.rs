//! Orchestration of the read -> unmarshal -> decode -> build pipeline.
//!
//! `Loader` runs the pipeline on a target file and, when a base
//! configuration is set, on the base file too, then layers the two through
//! the builder. `load_head_only` is the cheap variant used to enumerate
//! many definition files without paying full-resolution cost.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dagu_types::dag::Dag;
use serde_yaml_ng::Value;
use tracing::{debug, warn};

use crate::builder::DagBuilder;
use crate::definition::{Definition, decode};
use crate::error::LoadError;

// ---------------------------------------------------------------------------
// Reader and Unmarshaler
// ---------------------------------------------------------------------------

/// Return the file's contents unchanged. No parsing, no validation.
pub fn read_config(path: impl AsRef<Path>) -> Result<String, LoadError> {
    Ok(std::fs::read_to_string(path)?)
}

/// Parse YAML text into a generic value, preserving sequence and mapping
/// order, with no schema knowledge.
pub fn unmarshal(text: &str) -> Result<Value, LoadError> {
    serde_yaml_ng::from_str(text).map_err(|e| LoadError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Loads workflow definition files into validated `Dag` values.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    base_config: Option<PathBuf>,
    command_timeout: Option<Duration>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer every loaded DAG on top of this shared base configuration
    /// file.
    pub fn with_base_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_config = Some(path.into());
        self
    }

    /// Bound each substituted command's runtime during expansion.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Load, resolve, and validate the definition at `path`.
    ///
    /// `params` replaces the file's `params` string when given. The
    /// returned DAG's `location` is `path`.
    pub fn load(&self, path: impl AsRef<Path>, params: Option<&str>) -> Result<Dag, LoadError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading DAG definition");

        let def = load_definition(path)?;
        let base = match &self.base_config {
            // The base file itself loads without another layer beneath it.
            Some(base_path) if base_path.as_path() != path => Some(load_definition(base_path)?),
            _ => None,
        };

        let mut builder = DagBuilder::new();
        if let Some(timeout) = self.command_timeout {
            builder = builder.with_command_timeout(timeout);
        }
        if let Some(params) = params {
            builder = builder.with_params(params);
        }
        let mut dag = builder.build(&def, base.as_ref())?;
        finalize(&mut dag, path);
        Ok(dag)
    }

    /// Resolve only identifying metadata: name, description, tags. Skips
    /// expansion and step validation entirely and always yields zero steps.
    pub fn load_head_only(&self, path: impl AsRef<Path>) -> Result<Dag, LoadError> {
        let path = path.as_ref();
        let def = load_definition(path)?;
        let mut dag = DagBuilder::new().head_only().build(&def, None)?;
        finalize(&mut dag, path);
        Ok(dag)
    }

    /// Head-only load of every `.yaml`/`.yml` file under `dir`,
    /// recursively. Files that fail to load are skipped with a warning;
    /// they may not be workflow definitions at all.
    pub fn discover(&self, dir: impl AsRef<Path>) -> Result<Vec<Dag>, LoadError> {
        let mut found = Vec::new();
        if !dir.as_ref().exists() {
            return Ok(found);
        }
        self.discover_into(dir.as_ref(), &mut found)?;
        Ok(found)
    }

    fn discover_into(&self, dir: &Path, found: &mut Vec<Dag>) -> Result<(), LoadError> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.discover_into(&path, found)?;
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if ext != "yaml" && ext != "yml" {
                continue;
            }
            match self.load_head_only(&path) {
                Ok(dag) => found.push(dag),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unloadable definition file");
                }
            }
        }
        Ok(())
    }
}

fn load_definition(path: &Path) -> Result<Definition, LoadError> {
    let text = read_config(path)?;
    let value = unmarshal(&text)?;
    decode(value)
}

/// Stamp the source location and apply the filename fallback for unnamed
/// definitions.
fn finalize(dag: &mut Dag, path: &Path) {
    dag.location = path.to_string_lossy().into_owned();
    if dag.name.is_empty() {
        dag.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_YAML: &str = r#"name: default
description: the default workflow
tags: Daily, Monthly
steps:
  - name: step 1
    command: echo test
"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    // -----------------------------------------------------------------------
    // read_config / unmarshal
    // -----------------------------------------------------------------------

    #[test]
    fn test_read_config_returns_contents_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let content = "steps:\n  - name: step 1\n    command: echo test\n";
        let path = write(dir.path(), "config.yaml", content);
        assert_eq!(read_config(&path).unwrap(), content);
    }

    #[test]
    fn test_read_config_missing_file_is_io_error() {
        let err = read_config("/nonexistent/definitely/missing.yaml").unwrap_err();
        assert!(matches!(err, LoadError::Io(_)), "got: {err:?}");
    }

    #[test]
    fn test_unmarshal_rejects_malformed_yaml() {
        let err = unmarshal("steps: [unclosed").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)), "got: {err:?}");
    }

    // -----------------------------------------------------------------------
    // load
    // -----------------------------------------------------------------------

    #[test]
    fn test_load_sets_location_and_resolves_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "default.yaml", DEFAULT_YAML);

        let dag = Loader::new().load(&path, None).expect("should load");
        assert_eq!(dag.name, "default");
        assert_eq!(dag.location, path.to_string_lossy());
        assert_eq!(dag.steps.len(), 1);
        assert_eq!(dag.tags, vec!["daily", "monthly"]);
    }

    #[test]
    fn test_load_clone_is_deep_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "default.yaml", DEFAULT_YAML);

        let dag = Loader::new().load(&path, None).expect("should load");
        assert_eq!(dag.clone(), dag);
    }

    #[test]
    fn test_load_display_contains_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "default.yaml", DEFAULT_YAML);

        let dag = Loader::new().load(&path, None).expect("should load");
        assert!(dag.to_string().contains("Name: default"));
    }

    #[test]
    fn test_load_params_override_replaces_file_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "params.yaml",
            "params: a b\nsteps:\n  - name: step 1\n    command: echo test\n",
        );

        let loader = Loader::new();
        let dag = loader.load(&path, None).expect("should load");
        assert_eq!(dag.params.get("1").map(String::as_str), Some("a"));

        let dag = loader.load(&path, Some("x y")).expect("should load");
        assert_eq!(dag.params.get("1").map(String::as_str), Some("x"));
        assert_eq!(dag.params.get("2").map(String::as_str), Some("y"));
    }

    #[test]
    fn test_load_validation_error_is_literal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "err_no_steps.yaml", "name: no steps\n");

        let err = Loader::new().load(&path, None).unwrap_err();
        assert_eq!(err.to_string(), "at least one step must be specified");
    }

    // -----------------------------------------------------------------------
    // Base configuration layering
    // -----------------------------------------------------------------------

    const BASE_YAML: &str = "histRetentionDays: 30\nmailOn:\n  failure: true\n";

    #[test]
    fn test_base_config_overwrite_and_inherit() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(dir.path(), "base.yaml", BASE_YAML);
        let overwrite = write(
            dir.path(),
            "overwrite.yaml",
            "histRetentionDays: 7\nmailOn:\n  failure: false\nsteps:\n  - name: step 1\n    command: echo test\n",
        );
        let no_overwrite = write(
            dir.path(),
            "no_overwrite.yaml",
            "steps:\n  - name: step 1\n    command: echo test\n",
        );

        let loader = Loader::new().with_base_config(&base);

        let dag = loader.load(&overwrite, None).expect("should load");
        assert_eq!(dag.hist_retention_days, 7);
        assert!(!dag.mail_on.failure);
        assert!(!dag.mail_on.success);

        let dag = loader.load(&no_overwrite, None).expect("should load");
        assert_eq!(dag.hist_retention_days, 30);
        assert!(dag.mail_on.failure);
        assert!(!dag.mail_on.success);
    }

    // -----------------------------------------------------------------------
    // load_head_only
    // -----------------------------------------------------------------------

    #[test]
    fn test_head_only_returns_zero_steps() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "default.yaml", DEFAULT_YAML);

        let dag = Loader::new().load_head_only(&path).expect("should load");
        assert_eq!(dag.name, "default");
        assert!(dag.steps.is_empty());
    }

    #[test]
    fn test_head_only_ignores_missing_and_invalid_steps() {
        let dir = tempfile::tempdir().unwrap();
        let no_steps = write(dir.path(), "no_steps.yaml", "name: headless\n");
        let bad_step = write(
            dir.path(),
            "bad_step.yaml",
            "name: broken\nsteps:\n  - command: echo test\n",
        );

        let loader = Loader::new();
        assert_eq!(loader.load_head_only(&no_steps).unwrap().name, "headless");
        assert_eq!(loader.load_head_only(&bad_step).unwrap().name, "broken");
    }

    #[test]
    fn test_head_only_name_falls_back_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "unnamed.yaml", "description: no name key\n");

        let dag = Loader::new().load_head_only(&path).expect("should load");
        assert_eq!(dag.name, "unnamed");
    }

    // -----------------------------------------------------------------------
    // discover
    // -----------------------------------------------------------------------

    #[test]
    fn test_discover_finds_nested_definitions() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one.yaml", "name: one\n");
        write(dir.path(), "sub/two.yml", "name: two\n");
        write(dir.path(), "notes.txt", "not yaml\n");
        write(dir.path(), "broken.yaml", "steps: [unclosed\n");

        let mut names: Vec<String> = Loader::new()
            .discover(dir.path())
            .expect("should discover")
            .into_iter()
            .map(|d| d.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[test]
    fn test_discover_missing_dir_is_empty() {
        let found = Loader::new().discover("/nonexistent/dagu/dir").expect("should succeed");
        assert!(found.is_empty());
    }
}
