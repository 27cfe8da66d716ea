mod async_client;
mod bootstrap;
mod request;
mod sync_client;

pub use async_client::{AccelClient, ClientState};
pub use request::{Request, RequestStatus};
pub use sync_client::SyncClient;
