// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! `diligence-engine`: shared error type and tuning constants for the
//! due-diligence orchestrator.
//!
//! `diligence-core`'s workflow and service-client layers build directly on
//! `tokio`/`dashmap` rather than a generic graph-execution engine; this
//! crate carries only the pieces shared across crate boundaries — the
//! error type surfaced through `diligence_core::error::DiligenceError` and
//! the channel/timeout constants used by the event bus and workflow.

pub mod constants;
pub mod error;

pub use error::{Error, Result};
