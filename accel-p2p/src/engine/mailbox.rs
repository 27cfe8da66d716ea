use crate::engine::Envelope;
use crate::error::{AccelError, Result};
use crate::types::{Rank, Tag};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};

/// A delivered message plus the signal that releases its sender.
pub(crate) struct Delivery {
    pub envelope: Envelope,
    pub ack: Option<oneshot::Sender<()>>,
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Delivery>>>;

/// One `(src, tag)` lane. Created lazily by whichever side touches it first,
/// so messages that arrive before a matching `recv` wait in the channel.
#[derive(Clone)]
struct Lane {
    tx: mpsc::Sender<Delivery>,
    rx: SharedReceiver,
    pending: Arc<AtomicUsize>,
}

/// Incoming message store of one rank, demultiplexed by `(src, tag)`.
pub(crate) struct Mailbox {
    lanes: Mutex<HashMap<(Rank, Tag), Lane>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    async fn lane(&self, src: Rank, tag: Tag) -> Result<Lane> {
        if self.is_closed() {
            return Err(AccelError::ClosedClient);
        }
        let mut lanes = self.lanes.lock().await;
        let lane = lanes.entry((src, tag)).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.capacity);
            Lane {
                tx,
                rx: Arc::new(Mutex::new(rx)),
                pending: Arc::new(AtomicUsize::new(0)),
            }
        });
        Ok(lane.clone())
    }

    /// Queue a message. Waits while the lane is at capacity.
    pub async fn deliver(&self, envelope: Envelope, ack: Option<oneshot::Sender<()>>) -> Result<()> {
        let (src, tag) = (envelope.src, envelope.tag);
        let lane = self.lane(src, tag).await?;
        lane.pending.fetch_add(1, Ordering::AcqRel);
        if lane.tx.send(Delivery { envelope, ack }).await.is_err() {
            lane.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(AccelError::ClosedClient);
        }
        tracing::trace!(src, tag, "mailbox: queued");
        Ok(())
    }

    /// Take the next message on `(src, tag)` and release its sender.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// message queued.
    pub async fn take(&self, src: Rank, tag: Tag) -> Result<Envelope> {
        let Lane { tx, rx, pending } = self.lane(src, tag).await?;
        // Only the map may keep the lane open, otherwise close() cannot wake us.
        drop(tx);
        let delivery = rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(AccelError::ClosedClient)?;
        pending.fetch_sub(1, Ordering::AcqRel);
        drop(rx);
        if let Some(ack) = delivery.ack {
            // The sender may have given up already.
            let _ = ack.send(());
        }
        self.prune(src, tag).await;
        Ok(delivery.envelope)
    }

    /// Drop the `(src, tag)` lane if it is empty and nobody else holds it.
    async fn prune(&self, src: Rank, tag: Tag) {
        let mut lanes = self.lanes.lock().await;
        let idle = lanes.get(&(src, tag)).is_some_and(|lane| {
            Arc::strong_count(&lane.rx) == 1 && lane.pending.load(Ordering::Acquire) == 0
        });
        if idle {
            lanes.remove(&(src, tag));
        }
    }

    #[cfg(test)]
    async fn lane_count(&self) -> usize {
        self.lanes.lock().await.len()
    }

    /// Tags with at least one queued message from `src`, ascending.
    pub async fn pending_tags(&self, src: Rank) -> Vec<Tag> {
        let lanes = self.lanes.lock().await;
        let mut tags: Vec<Tag> = lanes
            .iter()
            .filter(|((s, _), lane)| *s == src && lane.pending.load(Ordering::Acquire) > 0)
            .map(|((_, t), _)| *t)
            .collect();
        tags.sort_unstable();
        tags
    }

    /// Refuse new deliveries and wake every blocked `take`.
    ///
    /// Dropping the lane senders closes each channel once in-flight
    /// `deliver` calls finish. Queued messages are discarded along with
    /// their ack signals, which fails the remote senders.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let lanes = std::mem::take(&mut *self.lanes.lock().await);
        for (_, lane) in lanes {
            drop(lane.tx);
            // A locked receiver has a `take` parked on an empty channel.
            if let Ok(mut rx) = lane.rx.try_lock() {
                rx.close();
                while rx.try_recv().is_ok() {}
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
