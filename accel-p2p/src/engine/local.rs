use crate::directory::Endpoint;
use crate::engine::mailbox::Mailbox;
use crate::engine::{Engine, Envelope};
use crate::error::{AccelError, Result};
use crate::types::{Rank, Tag};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, oneshot};

/// In-process fabric connecting `world_size` ranks through channels.
///
/// Stands in for the network in tests and single-host runs: each rank gets
/// a [`LocalEngine`] that delivers straight into the destination's mailbox.
pub struct LocalFabric {
    mailboxes: Vec<Arc<Mailbox>>,
    barrier: LocalBarrier,
}

impl LocalFabric {
    pub fn new(world_size: u32, lane_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            mailboxes: (0..world_size)
                .map(|_| Arc::new(Mailbox::new(lane_capacity)))
                .collect(),
            barrier: LocalBarrier::new(world_size),
        })
    }

    /// Number of ranks attached to the fabric.
    pub fn world_size(&self) -> u32 {
        self.mailboxes.len() as u32
    }

    /// The engine for `rank`.
    pub fn engine(self: &Arc<Self>, rank: Rank) -> Result<LocalEngine> {
        if rank >= self.world_size() {
            return Err(AccelError::InvalidRank {
                rank,
                world_size: self.world_size(),
            });
        }
        Ok(LocalEngine {
            rank,
            fabric: Arc::clone(self),
        })
    }

    fn mailbox(&self, rank: Rank) -> Result<&Arc<Mailbox>> {
        self.mailboxes
            .get(rank as usize)
            .ok_or(AccelError::UnknownRank {
                rank,
                world_size: self.world_size(),
            })
    }
}

/// Epoch-keyed arrival sets shared by all ranks of a fabric.
struct LocalBarrier {
    world_size: usize,
    arrivals: Mutex<HashMap<u64, HashSet<Rank>>>,
    notify: Notify,
}

impl LocalBarrier {
    fn new(world_size: u32) -> Self {
        Self {
            world_size: world_size as usize,
            arrivals: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    fn arrive(&self, rank: Rank, epoch: u64) -> Result<bool> {
        let mut arrivals = self
            .arrivals
            .lock()
            .map_err(|_| AccelError::LockPoisoned("local barrier"))?;
        let set = arrivals.entry(epoch).or_default();
        set.insert(rank);
        let complete = set.len() >= self.world_size;
        if complete {
            // Every rank has entered `epoch`, so none still waits on an earlier one.
            arrivals.retain(|&e, _| e >= epoch);
        }
        Ok(complete)
    }

    #[cfg(test)]
    fn tracked_epochs(&self) -> usize {
        self.arrivals.lock().map(|a| a.len()).unwrap_or(0)
    }

    fn complete(&self, epoch: u64) -> Result<bool> {
        let arrivals = self
            .arrivals
            .lock()
            .map_err(|_| AccelError::LockPoisoned("local barrier"))?;
        Ok(arrivals
            .get(&epoch)
            .is_some_and(|set| set.len() >= self.world_size))
    }

    async fn wait(&self, rank: Rank, epoch: u64) -> Result<()> {
        if self.arrive(rank, epoch)? {
            self.notify.notify_waiters();
            return Ok(());
        }
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a notify between check and await is not lost.
            notified.as_mut().enable();
            if self.complete(epoch)? {
                return Ok(());
            }
            notified.await;
        }
    }
}

/// One rank's handle onto a [`LocalFabric`].
pub struct LocalEngine {
    rank: Rank,
    fabric: Arc<LocalFabric>,
}

impl LocalEngine {
    /// Rank this engine delivers for.
    pub fn rank(&self) -> Rank {
        self.rank
    }
}

impl Engine for LocalEngine {
    fn send<'a>(&'a self, dst: &'a Endpoint, envelope: Envelope) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mailbox = self.fabric.mailbox(dst.rank)?;
            let (ack_tx, ack_rx) = oneshot::channel();
            mailbox
                .deliver(envelope, Some(ack_tx))
                .await
                .map_err(|_| AccelError::PeerDisconnected { rank: dst.rank })?;
            ack_rx
                .await
                .map_err(|_| AccelError::PeerDisconnected { rank: dst.rank })
        })
    }

    fn recv<'a>(&'a self, src: Rank, tag: Tag) -> BoxFuture<'a, Result<Envelope>> {
        Box::pin(async move { self.fabric.mailbox(self.rank)?.take(src, tag).await })
    }

    fn pending_tags<'a>(&'a self, src: Rank) -> BoxFuture<'a, Vec<Tag>> {
        Box::pin(async move {
            match self.fabric.mailbox(self.rank) {
                Ok(mailbox) => mailbox.pending_tags(src).await,
                Err(_) => Vec::new(),
            }
        })
    }

    fn barrier<'a>(&'a self, epoch: u64) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.fabric.barrier.wait(self.rank, epoch))
    }

    fn shutdown<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.fabric.mailbox(self.rank)?.close().await;
            tracing::debug!(rank = self.rank, "local engine shut down");
            Ok(())
        })
    }
}
