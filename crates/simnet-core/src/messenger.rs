//! Send/receive codec over an endpoint.

use async_trait::async_trait;
use simnet_proto::{MessageSet, Msg};

use crate::{MessengerError, MsgReadWriter};

/// Encodes typed messages onto an endpoint and reads envelopes back.
#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    /// Send `msg` under `code`.
    async fn send_msg<M: MessageSet>(
        &self,
        w: &dyn MsgReadWriter,
        code: u64,
        msg: &M,
    ) -> Result<(), MessengerError>;

    /// Receive the next envelope.
    async fn read_msg(&self, r: &dyn MsgReadWriter) -> Result<Msg, MessengerError>;
}

/// Messenger that writes CBOR payloads straight onto the endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborMessenger;

#[async_trait]
impl Messenger for CborMessenger {
    async fn send_msg<M: MessageSet>(
        &self,
        w: &dyn MsgReadWriter,
        code: u64,
        msg: &M,
    ) -> Result<(), MessengerError> {
        let payload = msg.encode()?;
        w.write_msg(Msg::new(code, payload)).await?;
        Ok(())
    }

    async fn read_msg(&self, r: &dyn MsgReadWriter) -> Result<Msg, MessengerError> {
        Ok(r.read_msg().await?)
    }
}
