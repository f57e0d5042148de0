//! Message endpoints.
//!
//! An [`Endpoint`] is one half of a bidirectional message link. The
//! in-memory variant returned by [`msg_pipe`] links two halves directly:
//!
//! ```text
//!   half A                      half B
//!   write_msg ──── a → b ────▶ read_msg
//!   read_msg ◀──── b → a ───── write_msg
//!            shared close flag
//! ```
//!
//! # Invariants
//!
//! - Rendezvous: `write_msg` returns only after the other half has read the
//!   message, so a writer facing a peer that never reads blocks
//! - Closing either half closes both; pending and later operations fail with
//!   [`EndpointError::Closed`]

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use simnet_proto::Msg;
use tokio::sync::{Mutex, mpsc, oneshot, watch};

use crate::EndpointError;

/// Read/write message channel to a remote peer.
#[async_trait]
pub trait MsgReadWriter: Send + Sync + fmt::Debug {
    /// Receive the next message.
    async fn read_msg(&self) -> Result<Msg, EndpointError>;

    /// Send a message.
    async fn write_msg(&self, msg: Msg) -> Result<(), EndpointError>;

    /// Close the link. Idempotent.
    fn close(&self);

    /// Whether the link has been closed.
    fn is_closed(&self) -> bool;

    /// Resolves once the link is closed.
    async fn closed(&self);
}

/// Shared handle to one half of a link.
pub type Endpoint = Arc<dyn MsgReadWriter>;

struct Delivery {
    msg: Msg,
    ack: oneshot::Sender<()>,
}

/// One half of an in-memory link created by [`msg_pipe`].
pub struct MsgPipeRw {
    tx: mpsc::Sender<Delivery>,
    rx: Mutex<mpsc::Receiver<Delivery>>,
    closed: Arc<watch::Sender<bool>>,
}

/// Create a linked pair of in-memory endpoints.
///
/// Writes on one half are reads on the other.
pub fn msg_pipe() -> (Arc<MsgPipeRw>, Arc<MsgPipeRw>) {
    let (a_to_b, b_from_a) = mpsc::channel(1);
    let (b_to_a, a_from_b) = mpsc::channel(1);
    let (closed, _) = watch::channel(false);
    let closed = Arc::new(closed);

    let a = MsgPipeRw { tx: a_to_b, rx: Mutex::new(a_from_b), closed: Arc::clone(&closed) };
    let b = MsgPipeRw { tx: b_to_a, rx: Mutex::new(b_from_a), closed };
    (Arc::new(a), Arc::new(b))
}

impl fmt::Debug for MsgPipeRw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsgPipeRw").field("closed", &self.is_closed()).finish_non_exhaustive()
    }
}

#[async_trait]
impl MsgReadWriter for MsgPipeRw {
    async fn read_msg(&self) -> Result<Msg, EndpointError> {
        let mut closed = self.closed.subscribe();

        let mut rx = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => return Err(EndpointError::Closed),
            rx = self.rx.lock() => rx,
        };

        tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => Err(EndpointError::Closed),
            delivery = rx.recv() => {
                let Delivery { msg, ack } = delivery.ok_or(EndpointError::Closed)?;
                // Writer may have given up; the message is still ours.
                let _ = ack.send(());
                Ok(msg)
            },
        }
    }

    async fn write_msg(&self, msg: Msg) -> Result<(), EndpointError> {
        let mut closed = self.closed.subscribe();
        let (ack, acked) = oneshot::channel();

        tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => return Err(EndpointError::Closed),
            sent = self.tx.send(Delivery { msg, ack }) => {
                sent.map_err(|_| EndpointError::Closed)?;
            },
        }

        tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => Err(EndpointError::Closed),
            res = acked => res.map_err(|_| EndpointError::Closed),
        }
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|c| *c).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn write_is_read_on_other_half() {
        let (a, b) = msg_pipe();
        let writer = tokio::spawn(async move { a.write_msg(Msg::new(3, vec![1, 2])).await });

        let msg = b.read_msg().await.expect("read");
        assert_eq!(msg, Msg::new(3, vec![1, 2]));
        writer.await.expect("join").expect("write");
    }

    #[tokio::test(start_paused = true)]
    async fn write_blocks_until_read() {
        let (a, _b) = msg_pipe();
        let res = tokio::time::timeout(Duration::from_millis(10), a.write_msg(Msg::new(1, vec![])))
            .await;
        assert!(res.is_err(), "write must not complete without a reader");
    }

    #[tokio::test]
    async fn close_fails_both_halves() {
        let (a, b) = msg_pipe();
        b.close();
        assert!(a.is_closed());
        assert_eq!(a.read_msg().await, Err(EndpointError::Closed));
        assert_eq!(a.write_msg(Msg::new(1, vec![])).await, Err(EndpointError::Closed));
        assert_eq!(b.read_msg().await, Err(EndpointError::Closed));
    }

    #[tokio::test]
    async fn close_wakes_pending_reader() {
        let (a, b) = msg_pipe();
        let reader = tokio::spawn(async move { b.read_msg().await });
        tokio::task::yield_now().await;
        a.close();
        assert_eq!(reader.await.expect("join"), Err(EndpointError::Closed));
    }

    #[tokio::test]
    async fn closed_resolves_after_close() {
        let (a, b) = msg_pipe();
        let waiter = tokio::spawn(async move { b.closed().await });
        a.close();
        waiter.await.expect("join");
    }
}
