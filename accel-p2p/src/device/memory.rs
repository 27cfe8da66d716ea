use crate::error::Result;

/// A contiguous region of device memory.
///
/// `addr` is the physical (device-side) address the offload engine uses;
/// it is never dereferenced on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceRegion {
    addr: u64,
    len_bytes: usize,
}

impl DeviceRegion {
    pub fn new(addr: u64, len_bytes: usize) -> Self {
        Self { addr, len_bytes }
    }

    /// Physical address of the first byte.
    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Size of the region in bytes.
    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Returns true if the region has zero length.
    pub fn is_empty(&self) -> bool {
        self.len_bytes == 0
    }
}

impl std::fmt::Display for DeviceRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceRegion(0x{:x}, {}B)", self.addr, self.len_bytes)
    }
}

/// Device memory primitives consumed by buffer synchronization and transfers.
///
/// The offload engine reads a send payload out of device memory and writes
/// received data into it; host code only sees device contents after an
/// explicit copy back. Implementations:
///
/// - [`SimDevice`](super::SimDevice) (built-in): device memory emulated in
///   host RAM.
/// - Hardware devices: register/DMA access (implemented externally).
pub trait DeviceMemory: Send + Sync {
    /// Reserve `size_bytes` of zeroed device memory.
    fn allocate(&self, size_bytes: usize) -> Result<DeviceRegion>;

    /// Copy `data` into `region` starting at byte `offset`.
    fn write(&self, region: &DeviceRegion, offset: usize, data: &[u8]) -> Result<()>;

    /// Copy `len` bytes out of `region` starting at byte `offset`.
    fn read(&self, region: &DeviceRegion, offset: usize, len: usize) -> Result<Vec<u8>>;

    /// Release `region`. Using the region afterwards is an error.
    fn free(&self, region: &DeviceRegion) -> Result<()>;

    /// Whether this device is emulated rather than real hardware.
    fn is_simulated(&self) -> bool {
        false
    }
}
