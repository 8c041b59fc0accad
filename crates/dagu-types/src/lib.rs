//! Shared domain types for the dagu workflow loader.
//!
//! This crate contains the fully resolved workflow model (`Dag`, `Step`,
//! `Schedule`, `MailOn`) produced by `dagu-core` and consumed by the
//! scheduler/executor. Zero infrastructure dependencies -- only serde plus
//! the hash pair used for control-socket addresses.

pub mod dag;
