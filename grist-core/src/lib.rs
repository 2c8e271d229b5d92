//! Grist Core
//!
//! Core types and abstractions for the Grist dataset processing system.
//!
//! This crate contains:
//! - Domain types: Core business entities (Repository, Record, Process, etc.)
//! - DTOs: Data transfer objects for the HTTP API

pub mod domain;
pub mod dto;
