//! Shared domain types for CAM (context-augmented memory).
//!
//! This crate contains the types used across the workspace: memory records
//! and retrieval candidates, pipeline configuration, LLM request shapes,
//! and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
