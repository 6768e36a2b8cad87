//! Header names attached to every dispatched operation.
//!
//! These are protocol conventions with the remote service. The engine keeps
//! the corresponding state as typed fields on the operation and only turns
//! them into headers when building the outgoing request.

/// Operation id, lets the server deduplicate retried submissions.
pub const OPERATION_ID: &str = "X-Sync-Operation-Id";

/// Operation priority as a lowercase word.
pub const PRIORITY: &str = "X-Sync-Priority";

/// Payload checksum computed at enqueue time.
pub const CHECKSUM: &str = "X-Sync-Checksum";

/// Instructs the server to overwrite its version (client-wins resolution).
pub const FORCE_UPDATE: &str = "X-Force-Update";
