//! Memory gating and retrieval logic for CAM.
//!
//! This crate defines the "ports" (store, embedder and LLM traits) that the
//! infrastructure layer implements, plus the four decisions made on every
//! prompt: intent, topic continuity, retrieval and the write gate. It
//! depends only on `cam-types` -- never on `cam-infra` or any IO crate.

pub mod config;
pub mod gate;
pub mod llm;
pub mod memory;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;
