//! `drydock-engine` — the idempotent convergence engine.
//!
//! # Overview
//!
//! One convergence pass runs four stages, strictly in order:
//!
//! | Stage    | Module      | Behaviour                                        |
//! |----------|-------------|--------------------------------------------------|
//! | Service  | [`runner`]  | Ensure the Agent service exists and is running    |
//! | Install  | [`install`] | Version-gated install/upgrade of the routines     |
//! | Jobs     | [`job`]     | Reconcile each declared job in declaration order  |
//! | Report   | [`runner`]  | Per-job results; failures never halt the pass     |
//!
//! The engine talks to the outside world exclusively through the capability
//! traits in [`target`], [`service`] and [`source`]; concrete adapters live
//! in `drydock-mssql`.

pub mod error;
pub mod install;
pub mod job;
pub mod runner;
pub mod schedule;
pub mod service;
pub mod source;
pub mod step;
pub mod target;
pub mod version;

pub use error::{EngineError, Result};
pub use runner::{JobEntry, RunReport};
