//! Store Module
//!
//! Handles all database operations, one submodule per entity. Named `store`
//! rather than `repository` because a Repository is a domain entity here
//! (a managed dataset), not the persistence layer.

pub mod processes;
pub mod records;
pub mod repositories;
pub mod results;
