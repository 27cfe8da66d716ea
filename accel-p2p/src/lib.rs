pub mod client;
pub mod config;
pub mod device;
pub mod directory;
pub mod engine;
pub mod error;
pub mod group;
pub mod memory;
pub mod protocol;
pub mod types;
pub mod verify;

pub use client::{AccelClient, ClientState, Request, RequestStatus, SyncClient};
pub use config::{ClientConfig, EndpointConfig, load_endpoints, local_endpoints};
pub use device::{DeviceMemory, DeviceRegion, SimDevice};
pub use directory::{Endpoint, EndpointDirectory};
pub use engine::{Engine, Envelope, LocalEngine, LocalFabric, TcpEngine};
pub use error::{AccelError, Result};
pub use group::GroupContext;
pub use memory::{Buffer, BufferSlice, SyncState};
pub use protocol::WireMessage;
pub use types::{DataType, Element, Rank, SessionId, Tag};
