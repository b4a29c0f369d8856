//! Domain model for projects, task trees and their activity records.
//!
//! # Responsibility
//! - Define the canonical records returned by repositories and services.
//! - Keep open enumerations (status, priority, action) as validated tags.
//!
//! # Invariants
//! - Identifiers are integer surrogate keys assigned by the store.
//! - Employees are referenced by id only; no employee graph is loaded.

pub mod activity;
pub mod patch;
pub mod project;
pub mod tag;
pub mod task;
