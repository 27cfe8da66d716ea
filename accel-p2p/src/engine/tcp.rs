//! Point-to-point engine over plain TCP.
//!
//! Every rank listens on its directory endpoint. Links are directional: the
//! first send to a peer dials that peer, announces itself with `Hello` and
//! keeps the connection for later sends. Payloads travel as segment frames
//! no larger than the destination's `max_segment_size`; the receiver
//! reassembles them, queues the envelope and writes `Ack{seq}` back on the
//! same connection once a local `recv` consumes it.
//!
//! Barriers are two-phase and rooted at rank 0: every other rank sends
//! `Barrier{epoch}` on its link to rank 0, which answers each with
//! `BarrierAck{epoch}` once all have arrived.

use crate::config::ClientConfig;
use crate::directory::{Endpoint, EndpointDirectory};
use crate::engine::mailbox::Mailbox;
use crate::engine::{Engine, Envelope};
use crate::error::{AccelError, Result};
use crate::group::GroupContext;
use crate::protocol::WireMessage;
use crate::protocol::codec::{decode_payload, encode_message};
use crate::protocol::header::{FrameKind, HEADER_SIZE, Header, MAX_MESSAGE_SIZE};
use crate::protocol::segment::{SEGMENT_HEADER_SIZE, SegmentHeader};
use crate::types::{PROTOCOL_VERSION, Rank, Tag};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Write side of one connection.
struct Link {
    peer: Rank,
    writer: Mutex<OwnedWriteHalf>,
}

impl Link {
    fn new(peer: Rank, writer: OwnedWriteHalf) -> Arc<Self> {
        Arc::new(Self {
            peer,
            writer: Mutex::new(writer),
        })
    }

    async fn write_frames(&self, frames: &[Vec<u8>]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        for frame in frames {
            writer.write_all(frame).await.map_err(|e| {
                AccelError::transport_with_source(format!("write frame to rank {}", self.peer), e)
            })?;
        }
        writer.flush().await.map_err(|e| {
            AccelError::transport_with_source(format!("flush link to rank {}", self.peer), e)
        })
    }

    /// Write `frames` from a detached task so a cancelled caller can never
    /// leave half a frame on the wire.
    async fn send_frames(self: &Arc<Self>, frames: Vec<Vec<u8>>) -> Result<()> {
        let link = Arc::clone(self);
        tokio::spawn(async move { link.write_frames(&frames).await })
            .await
            .map_err(|e| AccelError::transport_with_source("link writer task failed", e))?
    }

    async fn send_control(self: &Arc<Self>, msg: &WireMessage) -> Result<()> {
        self.send_frames(vec![encode_message(msg)?]).await
    }
}

enum BarrierSignal {
    Arrive { rank: Rank, epoch: u64 },
    Release { epoch: u64 },
}

/// Barrier messages received so far. Lives behind a lock so progress
/// survives a barrier call that timed out.
struct BarrierInbox {
    rx: mpsc::UnboundedReceiver<BarrierSignal>,
    arrived: HashMap<u64, HashSet<Rank>>,
    released: HashSet<u64>,
}

/// State shared by the engine and its connection tasks.
struct Shared {
    group: GroupContext,
    directory: Arc<EndpointDirectory>,
    config: ClientConfig,
    mailbox: Mailbox,
    links: Mutex<HashMap<Rank, Arc<Link>>>,
    /// seq → (destination rank, sender waiting for the ack).
    ack_waiters: std::sync::Mutex<HashMap<u64, (Rank, oneshot::Sender<()>)>>,
    barrier_tx: mpsc::UnboundedSender<BarrierSignal>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Shared {
    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|h| !h.is_finished());
            tasks.push(handle);
        }
    }

    fn complete_ack(&self, seq: u64) {
        let waiter = self.ack_waiters.lock().ok().and_then(|mut w| w.remove(&seq));
        match waiter {
            Some((_, tx)) => {
                let _ = tx.send(());
            }
            None => tracing::trace!(seq, "ack for abandoned send"),
        }
    }

    /// Fail every send still waiting on an ack from `peer`.
    fn fail_waiters(&self, peer: Rank) {
        if let Ok(mut waiters) = self.ack_waiters.lock() {
            waiters.retain(|_, (rank, _)| *rank != peer);
        }
    }

    async fn forget_link(&self, peer: Rank, link: &Arc<Link>) {
        let mut links = self.links.lock().await;
        if links.get(&peer).is_some_and(|l| Arc::ptr_eq(l, link)) {
            links.remove(&peer);
        }
    }
}

/// Removes the ack waiter if the send future is dropped early.
struct WaiterGuard<'a> {
    shared: &'a Shared,
    seq: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut waiters) = self.shared.ack_waiters.lock() {
            waiters.remove(&self.seq);
        }
    }
}

/// One rank's TCP engine.
pub struct TcpEngine {
    shared: Arc<Shared>,
    barrier: Mutex<BarrierInbox>,
    next_seq: AtomicU64,
    local_addr: SocketAddr,
}

impl TcpEngine {
    /// Listen on the local rank's directory endpoint.
    pub async fn bind(
        group: GroupContext,
        directory: Arc<EndpointDirectory>,
        config: ClientConfig,
    ) -> Result<Self> {
        let me = directory.resolve(group.local_rank())?;
        let listener = TcpListener::bind(me.host_port())
            .await
            .map_err(|e| AccelError::transport_with_source(format!("bind {me}"), e))?;
        Self::from_listener(listener, group, directory, config)
    }

    /// Use an already-bound listener. Must be called inside a tokio runtime.
    pub fn from_listener(
        listener: TcpListener,
        group: GroupContext,
        directory: Arc<EndpointDirectory>,
        config: ClientConfig,
    ) -> Result<Self> {
        if directory.world_size() != group.world_size() {
            return Err(AccelError::config(format!(
                "directory has {} ranks but group world size is {}",
                directory.world_size(),
                group.world_size()
            )));
        }
        let local_addr = listener.local_addr()?;
        let (barrier_tx, barrier_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            group,
            directory,
            mailbox: Mailbox::new(config.lane_capacity),
            config,
            links: Mutex::new(HashMap::new()),
            ack_waiters: std::sync::Mutex::new(HashMap::new()),
            barrier_tx,
            tasks: std::sync::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        let accept = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
        shared.track(accept);
        tracing::info!(rank = group.local_rank(), %local_addr, "tcp engine listening");

        Ok(Self {
            shared,
            barrier: Mutex::new(BarrierInbox {
                rx: barrier_rx,
                arrived: HashMap::new(),
                released: HashSet::new(),
            }),
            next_seq: AtomicU64::new(0),
            local_addr,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn check_open(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(AccelError::ClosedClient);
        }
        Ok(())
    }

    /// Outbound link to `dst`, dialing it on first use.
    async fn link_to(&self, dst: &Endpoint) -> Result<Arc<Link>> {
        let mut links = self.shared.links.lock().await;
        if let Some(link) = links.get(&dst.rank) {
            return Ok(Arc::clone(link));
        }

        let stream = connect_with_retry(dst, &self.shared.config).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let link = Link::new(dst.rank, writer);

        let me = self.shared.directory.resolve(self.shared.group.local_rank())?;
        link.send_control(&WireMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            rank: me.rank,
            session_id: me.session_id,
        })
        .await?;

        let shared = Arc::clone(&self.shared);
        let task_link = Arc::clone(&link);
        let handle = tokio::spawn(async move {
            serve(reader, Arc::clone(&task_link), Arc::clone(&shared)).await;
            shared.forget_link(task_link.peer, &task_link).await;
            shared.fail_waiters(task_link.peer);
        });
        self.shared.track(handle);

        tracing::info!(rank = me.rank, peer = dst.rank, addr = %dst.host_port(), "link established");
        links.insert(dst.rank, Arc::clone(&link));
        Ok(link)
    }

    async fn send_envelope(&self, dst: &Endpoint, envelope: Envelope) -> Result<()> {
        self.check_open()?;
        let link = self.link_to(dst).await?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let frames = segment_frames(seq, &envelope, dst.max_segment_size)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        self.shared
            .ack_waiters
            .lock()
            .map_err(|_| AccelError::LockPoisoned("ack waiters"))?
            .insert(seq, (dst.rank, ack_tx));
        let _guard = WaiterGuard {
            shared: &self.shared,
            seq,
        };

        tracing::debug!(
            src = envelope.src,
            dst = dst.rank,
            tag = envelope.tag,
            seq,
            segments = frames.len(),
            bytes = envelope.payload.len(),
            "tcp send"
        );
        link.send_frames(frames).await?;
        ack_rx
            .await
            .map_err(|_| AccelError::PeerDisconnected { rank: dst.rank })
    }

    async fn root_barrier(&self, epoch: u64) -> Result<()> {
        let needed = self.shared.group.world_size() as usize - 1;
        {
            let mut inbox = self.barrier.lock().await;
            loop {
                if inbox.arrived.get(&epoch).is_some_and(|s| s.len() >= needed) {
                    inbox.arrived.remove(&epoch);
                    break;
                }
                match inbox.rx.recv().await {
                    Some(BarrierSignal::Arrive { rank, epoch: e }) if e >= epoch => {
                        inbox.arrived.entry(e).or_default().insert(rank);
                    }
                    Some(BarrierSignal::Arrive { rank, epoch: e }) => {
                        tracing::debug!(rank, stale = e, epoch, "discarding stale barrier arrival");
                    }
                    Some(BarrierSignal::Release { epoch: e }) => {
                        tracing::warn!(epoch = e, "root received a barrier release");
                    }
                    None => return Err(AccelError::ClosedClient),
                }
            }
        }

        for peer in self.shared.group.peers() {
            let endpoint = self.shared.directory.resolve(peer)?;
            let link = self.link_to(endpoint).await?;
            link.send_control(&WireMessage::BarrierAck { epoch }).await?;
        }
        Ok(())
    }

    async fn member_barrier(&self, epoch: u64) -> Result<()> {
        let root = self.shared.directory.resolve(0)?;
        let link = self.link_to(root).await?;
        link.send_control(&WireMessage::Barrier { epoch }).await?;

        let mut inbox = self.barrier.lock().await;
        loop {
            if inbox.released.remove(&epoch) {
                inbox.released.retain(|&e| e > epoch);
                return Ok(());
            }
            match inbox.rx.recv().await {
                Some(BarrierSignal::Release { epoch: e }) if e >= epoch => {
                    inbox.released.insert(e);
                }
                Some(BarrierSignal::Release { epoch: e }) => {
                    tracing::debug!(stale = e, epoch, "discarding stale barrier release");
                }
                Some(BarrierSignal::Arrive { rank, .. }) => {
                    tracing::warn!(rank, "non-root rank received a barrier arrival");
                }
                None => return Err(AccelError::ClosedClient),
            }
        }
    }
}

impl Engine for TcpEngine {
    fn send<'a>(&'a self, dst: &'a Endpoint, envelope: Envelope) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.send_envelope(dst, envelope))
    }

    fn recv<'a>(&'a self, src: Rank, tag: Tag) -> BoxFuture<'a, Result<Envelope>> {
        Box::pin(async move {
            self.check_open()?;
            self.shared.mailbox.take(src, tag).await
        })
    }

    fn pending_tags<'a>(&'a self, src: Rank) -> BoxFuture<'a, Vec<Tag>> {
        Box::pin(self.shared.mailbox.pending_tags(src))
    }

    fn barrier<'a>(&'a self, epoch: u64) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.check_open()?;
            if self.shared.group.world_size() == 1 {
                return Ok(());
            }
            if self.shared.group.local_rank() == 0 {
                self.root_barrier(epoch).await
            } else {
                self.member_barrier(epoch).await
            }
        })
    }

    fn shutdown<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.shared.closed.store(true, Ordering::Release);
            let tasks = match self.shared.tasks.lock() {
                Ok(mut tasks) => std::mem::take(&mut *tasks),
                Err(_) => Vec::new(),
            };
            for task in tasks {
                task.abort();
            }
            self.shared.links.lock().await.clear();
            self.shared.mailbox.close().await;
            if let Ok(mut waiters) = self.shared.ack_waiters.lock() {
                waiters.clear();
            }
            tracing::info!(rank = self.shared.group.local_rank(), "tcp engine shut down");
            Ok(())
        })
    }
}

impl Drop for TcpEngine {
    fn drop(&mut self) {
        if let Ok(tasks) = self.shared.tasks.lock() {
            for task in tasks.iter() {
                task.abort();
            }
        }
    }
}

async fn connect_with_retry(dst: &Endpoint, config: &ClientConfig) -> Result<TcpStream> {
    let addr = dst.host_port();
    let deadline = tokio::time::Instant::now() + config.connect_timeout;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let err = match tokio::time::timeout_at(deadline, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => e,
            Err(_) => {
                return Err(AccelError::Timeout {
                    operation: "connect",
                    timeout_ms: config.connect_timeout.as_millis() as u64,
                });
            }
        };
        if tokio::time::Instant::now() + config.connect_backoff >= deadline {
            return Err(AccelError::transport_with_source(
                format!("connect to {dst} failed after {attempts} attempts"),
                err,
            ));
        }
        tracing::debug!(peer = dst.rank, %addr, attempts, "connect failed, retrying: {err}");
        tokio::time::sleep(config.connect_backoff).await;
    }
}

/// Split an envelope into segment frames of at most `max_segment_size`
/// payload bytes. An empty payload still produces one frame.
fn segment_frames(seq: u64, envelope: &Envelope, max_segment_size: usize) -> Result<Vec<Vec<u8>>> {
    let total = envelope.payload.len();
    if total as u64 > MAX_MESSAGE_SIZE {
        return Err(AccelError::EncodeFailed(format!(
            "payload of {total} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit"
        )));
    }
    let step = max_segment_size.max(1);
    let mut frames = Vec::with_capacity(total.div_ceil(step).max(1));
    let mut offset = 0;
    loop {
        let end = (offset + step).min(total);
        let chunk = &envelope.payload[offset..end];
        let segment = SegmentHeader {
            seq,
            src: envelope.src,
            tag: envelope.tag,
            session_id: envelope.session_id,
            dtype: envelope.dtype,
            count: envelope.count as u64,
            total_len: total as u64,
            offset: offset as u64,
        };
        let header = Header::new(SEGMENT_HEADER_SIZE + chunk.len(), FrameKind::Segment)?;
        let mut frame = Vec::with_capacity(HEADER_SIZE + SEGMENT_HEADER_SIZE + chunk.len());
        frame.extend_from_slice(&header.encode());
        frame.extend_from_slice(&segment.encode());
        frame.extend_from_slice(chunk);
        frames.push(frame);
        offset = end;
        if offset >= total {
            return Ok(frames);
        }
    }
}

async fn read_frame(reader: &mut OwnedReadHalf) -> std::io::Result<(Header, Vec<u8>)> {
    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf).await?;
    let header = Header::decode(&header_buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;
    Ok((header, payload))
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("accept failed: {e}");
                continue;
            }
        };
        let conn_shared = Arc::clone(&shared);
        let handle = tokio::spawn(async move {
            if let Err(e) = handle_inbound(stream, Arc::clone(&conn_shared)).await {
                tracing::warn!(%remote, "rejecting connection: {e}");
            }
        });
        shared.track(handle);
    }
}

/// Validate the `Hello` that opens an inbound connection, then serve it.
async fn handle_inbound(stream: TcpStream, shared: Arc<Shared>) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, writer) = stream.into_split();

    let (header, payload) = tokio::time::timeout(shared.config.connect_timeout, read_frame(&mut reader))
        .await
        .map_err(|_| AccelError::Timeout {
            operation: "handshake",
            timeout_ms: shared.config.connect_timeout.as_millis() as u64,
        })??;
    if header.kind != FrameKind::Control {
        return Err(AccelError::DecodeFailed(
            "connection did not open with Hello".into(),
        ));
    }
    let (rank, session_id) = match decode_payload(&payload)? {
        WireMessage::Hello {
            protocol_version,
            rank,
            session_id,
        } => {
            if protocol_version != PROTOCOL_VERSION {
                return Err(AccelError::ProtocolMismatch {
                    local: PROTOCOL_VERSION,
                    remote: protocol_version,
                });
            }
            (rank, session_id)
        }
        other => {
            return Err(AccelError::DecodeFailed(format!(
                "expected Hello, got {other:?}"
            )));
        }
    };

    let expected = shared.directory.resolve(rank)?.session_id;
    if expected != session_id {
        return Err(AccelError::SessionMismatch {
            rank,
            expected,
            actual: session_id,
        });
    }

    tracing::debug!(rank = shared.group.local_rank(), peer = rank, "accepted link");
    serve(reader, Link::new(rank, writer), shared).await;
    Ok(())
}

/// A reassembled message waiting to be handed to the mailbox.
struct Inbound {
    seq: u64,
    envelope: Envelope,
}

/// Read frames from one connection until it closes or misbehaves.
///
/// Complete messages are queued per tag, each tag drained by its own
/// forwarder, so a full mailbox lane never stops the reader.
async fn serve(mut reader: OwnedReadHalf, link: Arc<Link>, shared: Arc<Shared>) {
    let peer = link.peer;
    let mut reassembly = Reassembly::default();
    let mut forwarders: HashMap<Tag, mpsc::UnboundedSender<Inbound>> = HashMap::new();
    loop {
        let (header, payload) = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(peer, "connection closed: {e}");
                return;
            }
        };
        let outcome = match header.kind {
            FrameKind::Control => handle_control(peer, &payload, &shared),
            FrameKind::Segment => {
                handle_segment(peer, shared.group.local_rank(), &payload, &mut reassembly).map(|done| {
                    if let Some(inbound) = done {
                        forward(inbound, &mut forwarders, &link, &shared);
                    }
                })
            }
        };
        if let Err(e) = outcome {
            tracing::warn!(peer, "dropping connection: {e}");
            return;
        }
    }
}

fn handle_control(peer: Rank, payload: &[u8], shared: &Shared) -> Result<()> {
    match decode_payload(payload)? {
        WireMessage::Ack { seq } => shared.complete_ack(seq),
        WireMessage::Barrier { epoch } => {
            let _ = shared
                .barrier_tx
                .send(BarrierSignal::Arrive { rank: peer, epoch });
        }
        WireMessage::BarrierAck { epoch } => {
            let _ = shared.barrier_tx.send(BarrierSignal::Release { epoch });
        }
        WireMessage::Hello { .. } => {
            tracing::warn!(peer, "ignoring repeated Hello");
        }
    }
    Ok(())
}

fn handle_segment(
    peer: Rank,
    local: Rank,
    payload: &[u8],
    reassembly: &mut Reassembly,
) -> Result<Option<Inbound>> {
    let segment = SegmentHeader::decode(payload)?;
    if segment.src != peer {
        return Err(AccelError::DecodeFailed(format!(
            "segment claims src {} on a link from rank {peer}",
            segment.src
        )));
    }
    let Some((header, data)) = reassembly.push(segment, &payload[SEGMENT_HEADER_SIZE..])? else {
        return Ok(None);
    };
    tracing::debug!(
        src = header.src,
        tag = header.tag,
        seq = header.seq,
        bytes = header.total_len,
        "tcp message reassembled"
    );
    Ok(Some(Inbound {
        seq: header.seq,
        envelope: Envelope {
            src: header.src,
            dst: local,
            tag: header.tag,
            session_id: header.session_id,
            dtype: header.dtype,
            count: header.count as usize,
            payload: data,
        },
    }))
}

/// Queue `inbound` on its tag's forwarder, starting one if needed.
fn forward(
    inbound: Inbound,
    forwarders: &mut HashMap<Tag, mpsc::UnboundedSender<Inbound>>,
    link: &Arc<Link>,
    shared: &Arc<Shared>,
) {
    let tag = inbound.envelope.tag;
    let tx = forwarders.entry(tag).or_insert_with(|| {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_forwarder(rx, Arc::clone(link), Arc::clone(shared)));
        shared.track(handle);
        tx
    });
    if tx.send(inbound).is_err() {
        tracing::debug!(peer = link.peer, tag, "forwarder gone, message dropped");
    }
}

/// Move one tag's messages into the mailbox in arrival order, acking each
/// once a local `recv` takes it.
async fn run_forwarder(mut rx: mpsc::UnboundedReceiver<Inbound>, link: Arc<Link>, shared: Arc<Shared>) {
    while let Some(Inbound { seq, envelope }) = rx.recv().await {
        let (ack_tx, ack_rx) = oneshot::channel();
        if let Err(e) = shared.mailbox.deliver(envelope, Some(ack_tx)).await {
            tracing::debug!(peer = link.peer, seq, "mailbox refused message: {e}");
            return;
        }
        let ack_link = Arc::clone(&link);
        tokio::spawn(async move {
            if ack_rx.await.is_ok() {
                if let Err(e) = ack_link.send_control(&WireMessage::Ack { seq }).await {
                    tracing::debug!(peer = ack_link.peer, seq, "ack not delivered: {e}");
                }
            }
        });
    }
}

struct Partial {
    header: SegmentHeader,
    data: Vec<u8>,
}

/// In-flight messages from one peer, keyed by sequence number.
///
/// Payload storage grows with the bytes actually received, never with the
/// length a header announces.
#[derive(Default)]
struct Reassembly {
    partial: HashMap<u64, Partial>,
}

impl Reassembly {
    /// Add one segment. Returns the first segment's header and the whole
    /// payload once the last byte is in.
    fn push(&mut self, segment: SegmentHeader, chunk: &[u8]) -> Result<Option<(SegmentHeader, Vec<u8>)>> {
        if segment.total_len > MAX_MESSAGE_SIZE {
            return Err(AccelError::DecodeFailed(format!(
                "message of {} bytes exceeds limit",
                segment.total_len
            )));
        }
        let entry = self.partial.entry(segment.seq).or_insert_with(|| Partial {
            header: segment,
            data: Vec::new(),
        });
        let received = entry.data.len() as u64;
        if entry.header.total_len != segment.total_len
            || segment.offset != received
            || received + chunk.len() as u64 > segment.total_len
        {
            return Err(AccelError::DecodeFailed(format!(
                "segment of seq {} out of order or overlong",
                segment.seq
            )));
        }
        entry.data.extend_from_slice(chunk);
        if (entry.data.len() as u64) < entry.header.total_len {
            return Ok(None);
        }
        Ok(self
            .partial
            .remove(&segment.seq)
            .map(|done| (done.header, done.data)))
    }
}
