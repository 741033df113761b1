//! Outbound channel to the native tracking host

use super::protocol::BridgeRequest;
use crate::error::{Result, XrError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Delivers commands to the host. Replies come back through
/// [`NativeBridge::dispatch`](super::NativeBridge::dispatch).
pub trait BridgeTransport: Send + Sync {
    fn post(&self, request: BridgeRequest) -> Result<()>;
}

/// Transport backed by an in-process channel; the host end reads requests
/// from the returned receiver
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: UnboundedSender<BridgeRequest>,
}

impl ChannelTransport {
    pub fn new() -> (Self, UnboundedReceiver<BridgeRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl BridgeTransport for ChannelTransport {
    fn post(&self, request: BridgeRequest) -> Result<()> {
        let command = request.command_name.as_str();
        self.sender
            .send(request)
            .map_err(|_| XrError::BridgeTransport(format!("host channel closed while sending {command}")))
    }
}
