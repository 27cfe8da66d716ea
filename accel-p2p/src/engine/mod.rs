//! The offload engine moves payloads between ranks.
//!
//! [`AccelClient`](crate::client::AccelClient) validates requests and owns
//! buffers; an [`Engine`] only sees byte envelopes and endpoints. Two
//! engines are built in:
//!
//! - [`LocalFabric`]: every rank in one process, connected by channels.
//! - [`TcpEngine`]: one rank per engine, connected over TCP.

mod local;
mod mailbox;
mod tcp;

pub use local::{LocalEngine, LocalFabric};
pub use tcp::TcpEngine;

use crate::directory::Endpoint;
use crate::error::Result;
use crate::types::{DataType, Rank, SessionId, Tag};
use futures::future::BoxFuture;

/// One point-to-point message as the engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub src: Rank,
    pub dst: Rank,
    pub tag: Tag,
    /// Session id of the destination endpoint, as the sender resolved it.
    pub session_id: SessionId,
    pub dtype: DataType,
    /// Element count carried in `payload`.
    pub count: usize,
    /// Little-endian element bytes.
    pub payload: Vec<u8>,
}

/// Transport seam between the client and the wire.
///
/// Object-safe so a client can hold `Arc<dyn Engine>` regardless of the
/// transport behind it. Timeouts are applied by the caller; every future
/// returned here must be safe to drop at any await point.
pub trait Engine: Send + Sync {
    /// Deliver `envelope` to `dst`. Resolves once the receiving engine has
    /// handed the message to a matching `recv`.
    fn send<'a>(&'a self, dst: &'a Endpoint, envelope: Envelope) -> BoxFuture<'a, Result<()>>;

    /// Wait for the next message from `src` carrying `tag`.
    ///
    /// Messages with the same `(src, tag)` are returned in the order they
    /// were sent.
    fn recv<'a>(&'a self, src: Rank, tag: Tag) -> BoxFuture<'a, Result<Envelope>>;

    /// Tags with messages queued from `src` and not yet received, ascending.
    fn pending_tags<'a>(&'a self, src: Rank) -> BoxFuture<'a, Vec<Tag>>;

    /// Block until every rank has entered barrier `epoch`.
    fn barrier<'a>(&'a self, epoch: u64) -> BoxFuture<'a, Result<()>>;

    /// Stop background work and fail pending receives.
    fn shutdown<'a>(&'a self) -> BoxFuture<'a, Result<()>>;
}
