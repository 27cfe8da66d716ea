use crate::device::memory::{DeviceMemory, DeviceRegion};
use crate::error::{AccelError, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// First address handed out by the simulator.
const SIM_BASE_ADDR: u64 = 0x1000;

/// Allocation granularity, matching typical DMA alignment.
const SIM_ALIGN: u64 = 64;

/// DeviceMemory emulated in host RAM. Each allocation gets a distinct,
/// aligned physical address; freed addresses are not reused.
#[derive(Debug)]
pub struct SimDevice {
    inner: Mutex<SimState>,
}

#[derive(Debug)]
struct SimState {
    next_addr: u64,
    regions: HashMap<u64, Vec<u8>>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimState {
                next_addr: SIM_BASE_ADDR,
                regions: HashMap::new(),
            }),
        }
    }

    /// Number of live allocations.
    pub fn live_regions(&self) -> usize {
        self.inner.lock().map(|s| s.regions.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SimState>> {
        self.inner
            .lock()
            .map_err(|_| AccelError::LockPoisoned("sim device"))
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn check_bounds(region: &DeviceRegion, mem: &[u8], offset: usize, len: usize) -> Result<()> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| AccelError::device("offset overflow"))?;
    if end > mem.len() {
        return Err(AccelError::device(format!(
            "access [{offset}, {end}) out of bounds for {region}"
        )));
    }
    Ok(())
}

impl DeviceMemory for SimDevice {
    fn allocate(&self, size_bytes: usize) -> Result<DeviceRegion> {
        let mut st = self.lock()?;
        let addr = st.next_addr;
        let span = (size_bytes as u64).max(1).div_ceil(SIM_ALIGN) * SIM_ALIGN;
        st.next_addr = addr
            .checked_add(span)
            .ok_or_else(|| AccelError::device("simulated address space exhausted"))?;
        st.regions.insert(addr, vec![0u8; size_bytes]);
        Ok(DeviceRegion::new(addr, size_bytes))
    }

    fn write(&self, region: &DeviceRegion, offset: usize, data: &[u8]) -> Result<()> {
        let mut st = self.lock()?;
        let mem = st
            .regions
            .get_mut(&region.addr())
            .ok_or_else(|| AccelError::device(format!("write to unknown {region}")))?;
        check_bounds(region, mem, offset, data.len())?;
        mem[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, region: &DeviceRegion, offset: usize, len: usize) -> Result<Vec<u8>> {
        let st = self.lock()?;
        let mem = st
            .regions
            .get(&region.addr())
            .ok_or_else(|| AccelError::device(format!("read from unknown {region}")))?;
        check_bounds(region, mem, offset, len)?;
        Ok(mem[offset..offset + len].to_vec())
    }

    fn free(&self, region: &DeviceRegion) -> Result<()> {
        let mut st = self.lock()?;
        st.regions
            .remove(&region.addr())
            .map(|_| ())
            .ok_or_else(|| AccelError::device(format!("double free of {region}")))
    }

    fn is_simulated(&self) -> bool {
        true
    }
}
