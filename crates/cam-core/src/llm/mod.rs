//! LLM provider abstractions for CAM.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: object-safe wrapper for dynamic dispatch
//! - `complete`: bounded completion calls that never raise into the pipeline

pub mod box_provider;
pub mod complete;
pub mod provider;
