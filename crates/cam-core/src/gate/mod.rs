//! The gating decisions made around every LLM call.
//!
//! prompt -> [`intent`] -> [`continuity`] -> [`retrieval`] -> (LLM) -> [`usefulness`]
//!
//! Each decision runs deterministic rules first and consults a [`judge::Judge`]
//! only for ambiguous input. None of them ever returns an error.

pub mod continuity;
pub mod intent;
pub mod judge;
pub mod rerank;
pub mod retrieval;
pub mod tagger;
pub mod topic;
pub mod usefulness;
