//! Transport seam for reaching a participant across a process boundary

use crate::error::TransportError;
use crate::types::LobbyMessage;
use async_trait::async_trait;

/// Remote-call client bound to one participant
///
/// Every call may fail with a `TransportError`; callers decide what a failure
/// means for the match in progress.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Ask the participant how many marbles to take from `pool`
    async fn request_move(&self, pool: u32) -> Result<u32, TransportError>;

    /// Deliver an informational message
    async fn deliver(&self, message: LobbyMessage) -> Result<(), TransportError>;

    /// Ask whether the participant wants another match
    async fn ask_rematch(&self) -> Result<bool, TransportError>;
}
