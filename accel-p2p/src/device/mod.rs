mod memory;
mod sim;

pub use memory::{DeviceMemory, DeviceRegion};
pub use sim::SimDevice;
