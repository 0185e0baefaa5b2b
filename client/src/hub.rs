//! Transport seam to the authoritative server.
//!
//! A hub connection offers request/response calls and, separately, a
//! stream of named pushes. The pushes and connection-state changes are fed
//! into the client's inbound channel by whoever owns the connection; this
//! trait only covers the calls.

use crate::error::ClientError;
use async_trait::async_trait;
use shared::{HubCall, HubResponse};

/// Connection state reported by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[async_trait]
pub trait Hub: Send + Sync {
    /// Issues one call. Transport failures and timeouts are `Err`; a
    /// structured rejection is an `Ok` envelope with `success == false`.
    async fn invoke(&self, call: HubCall) -> Result<HubResponse, ClientError>;
}

/// A hub with no connection behind it, for replaying recorded pushes.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineHub;

#[async_trait]
impl Hub for OfflineHub {
    async fn invoke(&self, call: HubCall) -> Result<HubResponse, ClientError> {
        Err(ClientError::Transport(format!(
            "{} unavailable while offline",
            call.method()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[tokio::test]
    async fn test_offline_hub_fails_every_call() {
        let hub = OfflineHub;
        let error = assert_err!(hub.invoke(HubCall::CreateGame).await);
        assert_eq!(error.kind(), crate::error::ErrorKind::Transport);
    }
}
