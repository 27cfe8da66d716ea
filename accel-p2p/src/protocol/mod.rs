pub mod codec;
pub mod header;
pub mod message;
pub mod segment;

pub use header::{FrameKind, Header};
pub use message::WireMessage;
pub use segment::SegmentHeader;
