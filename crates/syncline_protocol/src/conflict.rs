//! Conflict strategies and conflict records.

use crate::error::ProtocolError;
use crate::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Policy for reconciling a 409 response with the local operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Drop the local change, accept the server version.
    #[default]
    ServerWins,
    /// Resend the local change with a force-update marker.
    ClientWins,
    /// Shallow field-level union, local fields win.
    Merge,
    /// Park the operation until someone resolves it.
    Manual,
}

impl ConflictStrategy {
    /// Returns the kebab-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::ClientWins => "client-wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::Manual => "manual",
        }
    }

    /// Returns true if this strategy resolves conflicts without a caller.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictStrategy::Manual)
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server-wins" => Ok(ConflictStrategy::ServerWins),
            "client-wins" => Ok(ConflictStrategy::ClientWins),
            "merge" => Ok(ConflictStrategy::Merge),
            "manual" => Ok(ConflictStrategy::Manual),
            other => Err(ProtocolError::Invalid(format!(
                "unknown conflict strategy {other:?}"
            ))),
        }
    }
}

/// Both sides of a detected conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictData {
    /// Payload the client tried to write.
    pub local_version: Payload,
    /// Version the server reported in its 409 response.
    pub server_version: Payload,
    /// Strategy that was applied.
    pub strategy: ConflictStrategy,
}

/// How a caller resolves an operation parked by the manual strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualResolution {
    /// Accept the server version; the operation completes.
    KeepServer,
    /// Resend the local payload with a force-update marker.
    KeepLocal,
    /// Resend with a caller-supplied payload.
    UseData(Payload),
}
