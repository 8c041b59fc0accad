//! Definition loader and builder for dagu workflow DAGs.
//!
//! Turns a declarative YAML workflow file into the validated in-memory
//! `Dag` model from `dagu-types`. The pipeline is: raw text (`loader`)
//! -> generic YAML value -> loosely-typed `Definition` (`definition`)
//! -> fully resolved `Dag` (`builder`), with variable and command
//! substitution handled by `eval` and cron parsing by `schedule`.
//!
//! Step execution and dependency-graph traversal live elsewhere; this crate
//! only produces the model they consume.

pub mod builder;
pub mod definition;
pub mod error;
pub mod eval;
pub mod loader;
pub mod schedule;
