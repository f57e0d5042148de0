//! Test-side messaging: send a trigger, match an expectation.

use async_trait::async_trait;
use simnet_core::{CborMessenger, Messenger, MessengerError, MsgReadWriter};
use simnet_proto::MessageSet;
use thiserror::Error;

/// Why an expectation was not met.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpectError {
    /// Reading the message failed.
    #[error(transparent)]
    Messenger(#[from] MessengerError),

    /// A message arrived but did not match.
    #[error("expected code {expected_code}, got {got_code}: {detail}")]
    Mismatch {
        /// Code the expectation named.
        expected_code: u64,
        /// Code that arrived.
        got_code: u64,
        /// What differed.
        detail: String,
    },
}

/// Sends and matches messages on behalf of a test session.
#[async_trait]
pub trait TestMessenger: Send + Sync + 'static {
    /// Write `msg` under `code`.
    async fn trigger_msg<M: MessageSet>(
        &self,
        w: &dyn MsgReadWriter,
        code: u64,
        msg: &M,
    ) -> Result<(), MessengerError>;

    /// Read one message and check it is `expected` under `code`.
    async fn expect_msg<M: MessageSet>(
        &self,
        r: &dyn MsgReadWriter,
        code: u64,
        expected: &M,
    ) -> Result<(), ExpectError>;
}

/// [`TestMessenger`] backed by a node [`Messenger`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecMessenger<M: Messenger = CborMessenger> {
    inner: M,
}

impl CodecMessenger {
    /// Messenger using the default CBOR codec.
    pub const fn cbor() -> Self {
        Self { inner: CborMessenger }
    }
}

impl<M: Messenger> CodecMessenger<M> {
    /// Wrap a messenger.
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<N: Messenger> TestMessenger for CodecMessenger<N> {
    async fn trigger_msg<M: MessageSet>(
        &self,
        w: &dyn MsgReadWriter,
        code: u64,
        msg: &M,
    ) -> Result<(), MessengerError> {
        self.inner.send_msg(w, code, msg).await
    }

    async fn expect_msg<M: MessageSet>(
        &self,
        r: &dyn MsgReadWriter,
        code: u64,
        expected: &M,
    ) -> Result<(), ExpectError> {
        let msg = self.inner.read_msg(r).await?;
        if msg.code != code {
            return Err(ExpectError::Mismatch {
                expected_code: code,
                got_code: msg.code,
                detail: "wrong message code".to_string(),
            });
        }

        let got = M::from_msg(&msg).map_err(|e| ExpectError::Mismatch {
            expected_code: code,
            got_code: msg.code,
            detail: e.to_string(),
        })?;
        if &got != expected {
            return Err(ExpectError::Mismatch {
                expected_code: code,
                got_code: msg.code,
                detail: format!("got {got:?}, wanted {expected:?}"),
            });
        }
        Ok(())
    }
}
