use crate::client::Request;
use crate::config::ClientConfig;
use crate::device::DeviceMemory;
use crate::directory::EndpointDirectory;
use crate::engine::{Engine, Envelope};
use crate::error::{AccelError, Result};
use crate::group::GroupContext;
use crate::memory::{Buffer, BufferSlice, SyncState};
use crate::types::{Element, Rank, Tag};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

/// Lifecycle of a client. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    /// Configured, no operation issued yet.
    Ready = 0,
    /// At least one send, recv or barrier has been issued.
    Active = 1,
    /// `deinit` ran; every later operation fails with `ClosedClient`.
    Closed = 2,
}

impl ClientState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Ready,
            1 => Self::Active,
            _ => Self::Closed,
        }
    }
}

/// Point-to-point client bound to one local rank.
///
/// Validates every request against the group and the buffer before the
/// engine sees it, and bounds every blocking operation by one adjustable
/// timeout.
///
/// # Example
///
/// ```no_run
/// use accel_p2p::{AccelClient, Buffer};
///
/// # async fn example() -> accel_p2p::Result<()> {
/// let clients = AccelClient::bootstrap_local(2)?;
/// let (tx, rx) = (&clients[0], &clients[1]);
///
/// let mut src = Buffer::<f32>::allocate(tx.device(), 4)?;
/// src.write(&[1.0, 2.0, 3.0, 4.0])?;
/// src.sync_to_device()?;
/// let mut dst = Buffer::<f32>::allocate(rx.device(), 4)?;
///
/// let (sent, got) = tokio::join!(tx.send(&src, 4, 1, 0), rx.recv(&mut dst, 4, 0, 0));
/// sent?;
/// assert_eq!(got?, 4);
/// dst.sync_to_host()?;
/// # Ok(())
/// # }
/// ```
pub struct AccelClient {
    group: GroupContext,
    directory: Arc<EndpointDirectory>,
    engine: Arc<dyn Engine>,
    device: Arc<dyn DeviceMemory>,
    config: ClientConfig,
    /// Operation bound in nanoseconds.
    timeout_ns: AtomicU64,
    state: AtomicU8,
    barrier_epoch: AtomicU64,
}

impl AccelClient {
    /// Assemble a client from its parts. Construction is configuration:
    /// the client starts `Ready`.
    pub fn new(
        group: GroupContext,
        directory: Arc<EndpointDirectory>,
        engine: Arc<dyn Engine>,
        device: Arc<dyn DeviceMemory>,
        config: ClientConfig,
    ) -> Result<Self> {
        if directory.world_size() != group.world_size() {
            return Err(AccelError::config(format!(
                "directory lists {} ranks but world size is {}",
                directory.world_size(),
                group.world_size()
            )));
        }
        Ok(Self {
            group,
            directory,
            engine,
            device,
            timeout_ns: AtomicU64::new(saturating_nanos(config.timeout)),
            config,
            state: AtomicU8::new(ClientState::Ready as u8),
            barrier_epoch: AtomicU64::new(0),
        })
    }

    /// The local rank.
    pub fn rank(&self) -> Rank {
        self.group.local_rank()
    }

    /// Number of ranks in the group.
    pub fn world_size(&self) -> u32 {
        self.group.world_size()
    }

    /// The local rank's place in the group.
    pub fn group(&self) -> &GroupContext {
        &self.group
    }

    /// Endpoints of every rank, shared with the engine.
    pub fn directory(&self) -> &Arc<EndpointDirectory> {
        &self.directory
    }

    /// The device buffers for this client should be allocated on.
    pub fn device(&self) -> Arc<dyn DeviceMemory> {
        Arc::clone(&self.device)
    }

    /// Configuration the client was built with. The live timeout is
    /// [`timeout`](Self::timeout).
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Bound all later send/recv/barrier calls of this client.
    ///
    /// Fails with `ClosedClient` after [`deinit`](Self::deinit).
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.check_open()?;
        self.timeout_ns
            .store(saturating_nanos(timeout), Ordering::Release);
        Ok(())
    }

    /// Bound applied to each send, recv and barrier.
    pub fn timeout(&self) -> Duration {
        Duration::from_nanos(self.timeout_ns.load(Ordering::Acquire))
    }

    fn check_open(&self) -> Result<()> {
        if self.state() == ClientState::Closed {
            return Err(AccelError::ClosedClient);
        }
        Ok(())
    }

    fn mark_active(&self) {
        let _ = self.state.compare_exchange(
            ClientState::Ready as u8,
            ClientState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    async fn with_timeout<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| AccelError::Timeout {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    /// Send the first `count` elements of `buffer`'s device mirror to `dst`.
    ///
    /// The buffer must have been synchronized to the device at least once.
    /// Completes when `dst` has received the message.
    pub async fn send<T: Element>(
        &self,
        buffer: &Buffer<T>,
        count: usize,
        dst: Rank,
        tag: Tag,
    ) -> Result<()> {
        self.send_window(buffer, 0, buffer.len(), count, dst, tag)
            .await
    }

    /// [`send`](Self::send) from a slice: the first `count` elements of the
    /// slice's window.
    pub async fn send_slice<T: Element>(
        &self,
        slice: &BufferSlice<'_, T>,
        count: usize,
        dst: Rank,
        tag: Tag,
    ) -> Result<()> {
        self.send_window(slice.parent(), slice.start(), slice.len(), count, dst, tag)
            .await
    }

    async fn send_window<T: Element>(
        &self,
        buffer: &Buffer<T>,
        start: usize,
        window: usize,
        count: usize,
        dst: Rank,
        tag: Tag,
    ) -> Result<()> {
        self.check_open()?;
        self.group.check_rank(dst)?;
        if count > window {
            return Err(AccelError::SizeMismatch {
                requested: count,
                capacity: window,
            });
        }
        if buffer.state() == SyncState::HostOnly {
            return Err(AccelError::Unsynchronized {
                state: buffer.state(),
            });
        }

        let endpoint = self.directory.resolve(dst)?;
        let envelope = Envelope {
            src: self.rank(),
            dst,
            tag,
            session_id: endpoint.session_id,
            dtype: T::DTYPE,
            count,
            payload: buffer.device_bytes(start, count)?,
        };
        self.mark_active();
        tracing::debug!(rank = self.rank(), dst, tag, count, dtype = T::DTYPE.name(), "send");
        self.with_timeout("send", self.engine.send(endpoint, envelope))
            .await
    }

    /// Receive at most `count` elements from `src` on `tag` into `buffer`'s
    /// device mirror. Returns the number of elements received.
    ///
    /// The host view is stale until [`Buffer::sync_to_host`]. A message that
    /// fails validation has still been consumed.
    pub async fn recv<T: Element>(
        &self,
        buffer: &mut Buffer<T>,
        count: usize,
        src: Rank,
        tag: Tag,
    ) -> Result<usize> {
        let window = buffer.len();
        self.recv_window(buffer, 0, window, count, src, tag)
            .await
    }

    /// [`recv`](Self::recv) into a slice's window. The parent buffer turns
    /// `DeviceDirty`.
    pub async fn recv_slice<T: Element>(
        &self,
        slice: &mut BufferSlice<'_, T>,
        count: usize,
        src: Rank,
        tag: Tag,
    ) -> Result<usize> {
        let (start, window) = (slice.start(), slice.len());
        self.recv_window(slice.parent_mut(), start, window, count, src, tag)
            .await
    }

    async fn recv_window<T: Element>(
        &self,
        buffer: &mut Buffer<T>,
        start: usize,
        window: usize,
        count: usize,
        src: Rank,
        tag: Tag,
    ) -> Result<usize> {
        self.check_open()?;
        self.group.check_rank(src)?;
        if count > window {
            return Err(AccelError::SizeMismatch {
                requested: count,
                capacity: window,
            });
        }
        self.mark_active();

        let timeout = self.timeout();
        let envelope = match tokio::time::timeout(timeout, self.engine.recv(src, tag)).await {
            Ok(received) => received?,
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                let pending: Vec<Tag> = self
                    .engine
                    .pending_tags(src)
                    .await
                    .into_iter()
                    .filter(|&t| t != tag)
                    .collect();
                if pending.is_empty() {
                    return Err(AccelError::Timeout {
                        operation: "recv",
                        timeout_ms,
                    });
                }
                return Err(AccelError::TagMismatch {
                    src,
                    expected: tag,
                    pending,
                    timeout_ms,
                });
            }
        };

        let local = self.directory.resolve(self.rank())?;
        if envelope.session_id != local.session_id {
            return Err(AccelError::SessionMismatch {
                rank: src,
                expected: local.session_id,
                actual: envelope.session_id,
            });
        }
        if envelope.dtype != T::DTYPE {
            return Err(AccelError::DecodeFailed(format!(
                "rank {src} sent {} elements, buffer holds {}",
                envelope.dtype,
                T::DTYPE
            )));
        }
        if envelope.count > count {
            return Err(AccelError::SizeMismatch {
                requested: envelope.count,
                capacity: count,
            });
        }
        if envelope.payload.len() != envelope.count * T::DTYPE.size_in_bytes() {
            return Err(AccelError::DecodeFailed(format!(
                "payload of {} bytes does not hold {} {} elements",
                envelope.payload.len(),
                envelope.count,
                T::DTYPE
            )));
        }

        buffer.fill_device(start, &envelope.payload)?;
        tracing::debug!(rank = self.rank(), src, tag, count = envelope.count, "recv");
        Ok(envelope.count)
    }

    /// Block until every rank has called `barrier` the same number of times.
    pub async fn barrier(&self) -> Result<()> {
        self.check_open()?;
        self.mark_active();
        let epoch = self.barrier_epoch.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(rank = self.rank(), epoch, "barrier");
        self.with_timeout("barrier", self.engine.barrier(epoch))
            .await
    }

    /// Release the engine. The client is `Closed` afterwards.
    pub async fn deinit(&self) -> Result<()> {
        let previous = self
            .state
            .swap(ClientState::Closed as u8, Ordering::AcqRel);
        if ClientState::from_u8(previous) == ClientState::Closed {
            return Err(AccelError::ClosedClient);
        }
        self.engine.shutdown().await?;
        tracing::info!(rank = self.rank(), "client closed");
        Ok(())
    }

    /// Non-blocking [`send`](Self::send). The buffer is handed back when
    /// the request completes.
    pub fn isend<T: Element>(
        self: &Arc<Self>,
        buffer: Buffer<T>,
        count: usize,
        dst: Rank,
        tag: Tag,
    ) -> Request<Buffer<T>> {
        let client = Arc::clone(self);
        Request::spawn(async move {
            client.send(&buffer, count, dst, tag).await?;
            Ok(buffer)
        })
    }

    /// Non-blocking [`recv`](Self::recv). Completes with the buffer and the
    /// received element count.
    pub fn irecv<T: Element>(
        self: &Arc<Self>,
        mut buffer: Buffer<T>,
        count: usize,
        src: Rank,
        tag: Tag,
    ) -> Request<(Buffer<T>, usize)> {
        let client = Arc::clone(self);
        Request::spawn(async move {
            let received = client.recv(&mut buffer, count, src, tag).await?;
            Ok((buffer, received))
        })
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for AccelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccelClient")
            .field("rank", &self.rank())
            .field("world_size", &self.world_size())
            .field("state", &self.state())
            .field("timeout", &self.timeout())
            .finish()
    }
}
