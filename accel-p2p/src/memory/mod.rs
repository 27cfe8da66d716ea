mod buffer;

pub use buffer::{Buffer, BufferSlice, SyncState};
