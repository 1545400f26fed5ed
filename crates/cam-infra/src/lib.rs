//! Infrastructure layer for CAM.
//!
//! Contains implementations of the ports defined in `cam-core`: the LanceDB
//! memory store, the local fastembed embedder, OpenAI-compatible LLM
//! providers, and the `config.toml` loader and watcher.

pub mod config;
pub mod filesystem;
pub mod llm;
pub mod vector;
