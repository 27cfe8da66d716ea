//! Host buffers mirrored in device memory.
//!
//! A [`Buffer`] owns a host-side `Vec<T>` and a device region of the same
//! byte size. The two views only agree after an explicit
//! [`sync_to_device`](Buffer::sync_to_device) or
//! [`sync_to_host`](Buffer::sync_to_host); the current relationship is
//! tracked as a [`SyncState`].
//!
//! Host writes never change the state. Reading the host view after a
//! receive but before `sync_to_host` yields stale data; this is a caller
//! contract and is not detected at runtime.

use crate::device::{DeviceMemory, DeviceRegion};
use crate::error::{AccelError, Result};
use crate::types::{DataType, Element, decode_elements, encode_elements};
use std::sync::Arc;

/// Whether the host and device views of a buffer agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Freshly allocated; the device mirror has never been written from the host.
    HostOnly,
    /// The last sync made both views equal.
    Synchronized,
    /// A transfer wrote the device mirror; the host view is stale.
    DeviceDirty,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::HostOnly => f.write_str("host-only"),
            SyncState::Synchronized => f.write_str("synchronized"),
            SyncState::DeviceDirty => f.write_str("device-dirty"),
        }
    }
}

/// A fixed-length host buffer of `T` with a device-side mirror.
///
/// Exclusively owned by the caller that allocated it. The device region is
/// released on drop.
pub struct Buffer<T: Element> {
    host: Vec<T>,
    region: DeviceRegion,
    device: Arc<dyn DeviceMemory>,
    state: SyncState,
    freed: bool,
}

impl<T: Element> Buffer<T> {
    /// Allocate `element_count` zeroed elements on the host and a device
    /// mirror of the same size. State starts as `HostOnly`.
    pub fn allocate(device: Arc<dyn DeviceMemory>, element_count: usize) -> Result<Self> {
        let size_bytes = element_count
            .checked_mul(T::DTYPE.size_in_bytes())
            .ok_or_else(|| AccelError::device("buffer size overflow"))?;
        let region = device.allocate(size_bytes)?;
        Ok(Self {
            host: vec![T::default(); element_count],
            region,
            device,
            state: SyncState::HostOnly,
            freed: false,
        })
    }

    /// Copy the host region into the device mirror. Idempotent.
    pub fn sync_to_device(&mut self) -> Result<()> {
        let bytes = encode_elements(&self.host);
        self.device.write(&self.region, 0, &bytes)?;
        self.state = SyncState::Synchronized;
        Ok(())
    }

    /// Copy the device mirror back into the host region.
    ///
    /// Required after a receive before host code reads the data.
    pub fn sync_to_host(&mut self) -> Result<()> {
        let bytes = self.device.read(&self.region, 0, self.region.len_bytes())?;
        decode_elements(&bytes, &mut self.host);
        self.state = SyncState::Synchronized;
        Ok(())
    }

    /// Overwrite the host region from offset 0 with `pattern`.
    pub fn write(&mut self, pattern: &[T]) -> Result<()> {
        if pattern.len() > self.host.len() {
            return Err(AccelError::SizeMismatch {
                requested: pattern.len(),
                capacity: self.host.len(),
            });
        }
        self.host[..pattern.len()].copy_from_slice(pattern);
        Ok(())
    }

    /// Set one host element.
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        let capacity = self.host.len();
        let slot = self.host.get_mut(index).ok_or(AccelError::SizeMismatch {
            requested: index + 1,
            capacity,
        })?;
        *slot = value;
        Ok(())
    }

    /// The host view.
    pub fn read(&self) -> &[T] {
        &self.host
    }

    /// Mutable host view.
    pub fn host_mut(&mut self) -> &mut [T] {
        &mut self.host
    }

    /// Capacity in elements.
    pub fn len(&self) -> usize {
        self.host.len()
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// Element type of the buffer.
    pub fn dtype(&self) -> DataType {
        T::DTYPE
    }

    /// Size of the device mirror in bytes.
    pub fn size_bytes(&self) -> usize {
        self.region.len_bytes()
    }

    /// Which side holds the current data.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// The device region backing the mirror.
    pub fn region(&self) -> &DeviceRegion {
        &self.region
    }

    /// Device-side address of the mirror.
    pub fn physical_address(&self) -> u64 {
        self.region.addr()
    }

    /// Whether the mirror lives on a simulated device.
    pub fn is_simulated(&self) -> bool {
        self.device.is_simulated()
    }

    /// Release the device region now, reporting failures that `Drop` would
    /// only log.
    pub fn free(mut self) -> Result<()> {
        self.freed = true;
        self.device.free(&self.region)
    }

    /// A window of elements `[start, end)` that transfers can address on
    /// their own. Shares this buffer's device region and sync state.
    pub fn slice(&mut self, start: usize, end: usize) -> Result<BufferSlice<'_, T>> {
        if start > end || end > self.host.len() {
            return Err(AccelError::SizeMismatch {
                requested: end.max(start),
                capacity: self.host.len(),
            });
        }
        Ok(BufferSlice {
            buffer: self,
            start,
            end,
        })
    }

    /// Engine-side read of `count` elements of the device mirror from
    /// element `start`.
    pub(crate) fn device_bytes(&self, start: usize, count: usize) -> Result<Vec<u8>> {
        if start.saturating_add(count) > self.host.len() {
            return Err(AccelError::SizeMismatch {
                requested: start.saturating_add(count),
                capacity: self.host.len(),
            });
        }
        let size = T::DTYPE.size_in_bytes();
        self.device.read(&self.region, start * size, count * size)
    }

    /// Engine-side write of received bytes into the device mirror from
    /// element `start`.
    pub(crate) fn fill_device(&mut self, start: usize, bytes: &[u8]) -> Result<()> {
        let size = T::DTYPE.size_in_bytes();
        let offset = start.saturating_mul(size);
        if offset.saturating_add(bytes.len()) > self.region.len_bytes() {
            return Err(AccelError::SizeMismatch {
                requested: start.saturating_add(bytes.len() / size),
                capacity: self.host.len(),
            });
        }
        self.device.write(&self.region, offset, bytes)?;
        self.state = SyncState::DeviceDirty;
        Ok(())
    }
}

/// Elements `[start, end)` of a [`Buffer`], borrowed for a transfer.
///
/// Send and receive through a slice touch only its window of the device
/// mirror. The host view and sync state stay with the parent buffer: sync
/// the parent once the slice is dropped.
pub struct BufferSlice<'a, T: Element> {
    buffer: &'a mut Buffer<T>,
    start: usize,
    end: usize,
}

impl<T: Element> BufferSlice<'_, T> {
    /// First element of the window within the parent buffer.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Window length in elements.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if the window holds no elements.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Host view of the window.
    pub fn read(&self) -> &[T] {
        &self.buffer.host[self.start..self.end]
    }

    /// Sync state of the parent buffer.
    pub fn state(&self) -> SyncState {
        self.buffer.state
    }

    /// Device-side address of the window's first element.
    pub fn physical_address(&self) -> u64 {
        self.buffer.region.addr() + (self.start * T::DTYPE.size_in_bytes()) as u64
    }

    pub(crate) fn parent(&self) -> &Buffer<T> {
        &*self.buffer
    }

    pub(crate) fn parent_mut(&mut self) -> &mut Buffer<T> {
        &mut *self.buffer
    }
}

impl<T: Element> std::fmt::Debug for BufferSlice<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSlice")
            .field("dtype", &T::DTYPE)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("state", &self.buffer.state)
            .finish()
    }
}

impl<T: Element> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("dtype", &T::DTYPE)
            .field("len", &self.host.len())
            .field("region", &self.region)
            .field("state", &self.state)
            .finish()
    }
}

impl<T: Element> Drop for Buffer<T> {
    fn drop(&mut self) {
        if self.freed {
            return;
        }
        if let Err(e) = self.device.free(&self.region) {
            tracing::warn!(region = %self.region, "failed to free device region: {e}");
        }
    }
}
