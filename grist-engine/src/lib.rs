//! Grist Engine
//!
//! The dataset process engine: takes a repository's records plus a declarative
//! pipeline configuration (filter → group → aggregation) and executes it.
//!
//! This crate contains:
//! - Validator: static checks of a configuration against a parameter schema
//! - Stages: pure executors for the three pipeline stages
//! - Pipeline: authoritative stage ordering and execution strategies
//! - Telemetry: CPU/memory sampling attached to running executions
//!
//! Everything here is strategy-agnostic and free of persistence concerns;
//! job lifecycle and storage live in the orchestrator.

pub mod error;
pub mod pipeline;
pub mod stages;
pub mod telemetry;
pub mod validator;
