use crate::client::AccelClient;
use crate::config::{ClientConfig, local_endpoints};
use crate::device::{DeviceMemory, SimDevice};
use crate::directory::EndpointDirectory;
use crate::engine::{LocalFabric, TcpEngine};
use crate::error::Result;
use crate::group::GroupContext;
use std::sync::Arc;

/// Base port for the placeholder directory of an in-process group.
const LOCAL_BASE_PORT: u16 = 5500;

impl AccelClient {
    /// Build a whole group inside this process, connected by a
    /// [`LocalFabric`]. Each rank gets its own [`SimDevice`].
    ///
    /// Configuration comes from [`ClientConfig::from_env`].
    pub fn bootstrap_local(world_size: u32) -> Result<Vec<AccelClient>> {
        Self::bootstrap_local_with(world_size, ClientConfig::from_env())
    }

    /// [`bootstrap_local`](Self::bootstrap_local) with an explicit config.
    pub fn bootstrap_local_with(world_size: u32, config: ClientConfig) -> Result<Vec<AccelClient>> {
        let directory = Arc::new(EndpointDirectory::new(
            local_endpoints(world_size, LOCAL_BASE_PORT)?,
            world_size,
        )?);
        let fabric = LocalFabric::new(world_size, config.lane_capacity);

        (0..world_size)
            .map(|rank| {
                let engine = Arc::new(fabric.engine(rank)?);
                AccelClient::new(
                    GroupContext::new(rank, world_size)?,
                    Arc::clone(&directory),
                    engine,
                    Arc::new(SimDevice::new()),
                    config.clone(),
                )
            })
            .collect()
    }

    /// One rank of a group whose ranks talk over TCP. Listens on the local
    /// rank's directory endpoint; peers are dialed on first use.
    pub async fn connect_tcp(
        group: GroupContext,
        directory: Arc<EndpointDirectory>,
        device: Arc<dyn DeviceMemory>,
        config: ClientConfig,
    ) -> Result<AccelClient> {
        let engine = TcpEngine::bind(group, Arc::clone(&directory), config.clone()).await?;
        AccelClient::new(group, directory, Arc::new(engine), device, config)
    }
}
