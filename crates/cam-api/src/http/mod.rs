//! HTTP layer for `cam serve`.
//!
//! An OpenAI-compatible chat endpoint that runs every request through the
//! memory pipeline, plus small inspection endpoints using the
//! `{data, meta, errors}` envelope.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
