use crate::client::{AccelClient, ClientState, Request};
use crate::config::ClientConfig;
use crate::device::DeviceMemory;
use crate::directory::EndpointDirectory;
use crate::error::{AccelError, Result};
use crate::group::GroupContext;
use crate::memory::{Buffer, BufferSlice};
use crate::types::{Element, Rank, Tag};
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AccelError::transport_with_source("tokio runtime", e))
}

/// Blocking wrapper around [`AccelClient`].
///
/// Owns a `tokio::runtime::Runtime` and calls `block_on()` for each operation.
pub struct SyncClient {
    inner: Arc<AccelClient>,
    rt: tokio::runtime::Runtime,
}

impl SyncClient {
    /// Build an in-process group and return one blocking client per rank.
    ///
    /// Each client needs its own runtime since `block_on` is exclusive; drive
    /// each from its own thread.
    pub fn bootstrap_local(world_size: u32) -> Result<Vec<Self>> {
        AccelClient::bootstrap_local(world_size)?
            .into_iter()
            .map(Self::from_async)
            .collect()
    }

    /// One rank of a TCP group.
    pub fn connect_tcp(
        group: GroupContext,
        directory: Arc<EndpointDirectory>,
        device: Arc<dyn DeviceMemory>,
        config: ClientConfig,
    ) -> Result<Self> {
        let rt = runtime()?;
        let inner = rt.block_on(AccelClient::connect_tcp(group, directory, device, config))?;
        Ok(Self {
            inner: Arc::new(inner),
            rt,
        })
    }

    /// Wrap an existing async client with a new tokio runtime.
    pub fn from_async(inner: AccelClient) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(inner),
            rt: runtime()?,
        })
    }

    /// The local rank.
    pub fn rank(&self) -> Rank {
        self.inner.rank()
    }

    /// Number of ranks in the group.
    pub fn world_size(&self) -> u32 {
        self.inner.world_size()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.inner.state()
    }

    /// The device buffers for this client should be allocated on.
    pub fn device(&self) -> Arc<dyn DeviceMemory> {
        self.inner.device()
    }

    /// The wrapped async client.
    pub fn as_async(&self) -> &Arc<AccelClient> {
        &self.inner
    }

    /// See [`AccelClient::set_timeout`].
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.inner.set_timeout(timeout)
    }

    /// See [`AccelClient::timeout`].
    pub fn timeout(&self) -> Duration {
        self.inner.timeout()
    }

    /// Blocking [`AccelClient::send`].
    pub fn send<T: Element>(&self, buffer: &Buffer<T>, count: usize, dst: Rank, tag: Tag) -> Result<()> {
        self.rt.block_on(self.inner.send(buffer, count, dst, tag))
    }

    /// Blocking [`AccelClient::recv`].
    pub fn recv<T: Element>(
        &self,
        buffer: &mut Buffer<T>,
        count: usize,
        src: Rank,
        tag: Tag,
    ) -> Result<usize> {
        self.rt.block_on(self.inner.recv(buffer, count, src, tag))
    }

    /// Blocking [`AccelClient::send_slice`].
    pub fn send_slice<T: Element>(
        &self,
        slice: &BufferSlice<'_, T>,
        count: usize,
        dst: Rank,
        tag: Tag,
    ) -> Result<()> {
        self.rt.block_on(self.inner.send_slice(slice, count, dst, tag))
    }

    /// Blocking [`AccelClient::recv_slice`].
    pub fn recv_slice<T: Element>(
        &self,
        slice: &mut BufferSlice<'_, T>,
        count: usize,
        src: Rank,
        tag: Tag,
    ) -> Result<usize> {
        self.rt.block_on(self.inner.recv_slice(slice, count, src, tag))
    }

    /// Blocking [`AccelClient::barrier`].
    pub fn barrier(&self) -> Result<()> {
        self.rt.block_on(self.inner.barrier())
    }

    /// Blocking [`AccelClient::deinit`].
    pub fn deinit(&self) -> Result<()> {
        self.rt.block_on(self.inner.deinit())
    }

    /// Start a send on this client's runtime without blocking.
    pub fn isend<T: Element>(
        &self,
        buffer: Buffer<T>,
        count: usize,
        dst: Rank,
        tag: Tag,
    ) -> Request<Buffer<T>> {
        let _guard = self.rt.enter();
        self.inner.isend(buffer, count, dst, tag)
    }

    /// Start a receive on this client's runtime without blocking.
    pub fn irecv<T: Element>(
        &self,
        buffer: Buffer<T>,
        count: usize,
        src: Rank,
        tag: Tag,
    ) -> Request<(Buffer<T>, usize)> {
        let _guard = self.rt.enter();
        self.inner.irecv(buffer, count, src, tag)
    }

    /// Block until `request` completes.
    pub fn wait<T: Send + 'static>(&self, request: Request<T>) -> Result<T> {
        self.rt.block_on(request.wait())
    }
}
