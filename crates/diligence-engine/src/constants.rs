// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Centralized constants for timeouts and channel capacities.
//!
//! Keeping these in one module avoids magic numbers scattered through the
//! graph engine and makes the defaults easy to audit against the workflow's
//! documented timeout table.

use std::time::Duration;

/// Default timeout for a single outbound HTTP-shaped request (approval
/// round-trips, service-client calls without an explicit override).
pub const DEFAULT_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bounded capacity for internal mpsc channels (approval requests,
/// node-to-node signaling).
pub const DEFAULT_MPSC_CHANNEL_CAPACITY: usize = 64;

/// Default bounded capacity for a per-subscriber progress event buffer.
pub const DEFAULT_EVENT_BUFFER_CAPACITY: usize = 256;

/// Default per-session outstanding external-call concurrency budget.
pub const DEFAULT_SESSION_FANOUT_LIMIT: usize = 16;

/// Default process-wide concurrent session cap.
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 256;
