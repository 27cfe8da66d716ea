//! Tagged send/receive between two in-process ranks.
//!
//! Rank 0 fills a buffer with 0..16, syncs it to the device and sends it.
//! Rank 1 receives into device memory and syncs back to read the values.
//!
//! ```bash
//! cargo run --example send_recv
//! ```

use accel_p2p::{AccelClient, Buffer};
use std::sync::Arc;

#[tokio::main]
async fn main() -> accel_p2p::Result<()> {
    let clients: Vec<Arc<AccelClient>> = AccelClient::bootstrap_local(2)?
        .into_iter()
        .map(Arc::new)
        .collect();

    let c0 = Arc::clone(&clients[0]);
    let sender = tokio::spawn(async move {
        let values: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let mut buf = Buffer::<f32>::allocate(c0.device(), 16)?;
        buf.write(&values)?;
        buf.sync_to_device()?;
        c0.send(&buf, 16, 1, 0).await
    });

    let c1 = Arc::clone(&clients[1]);
    let mut buf = Buffer::<f32>::allocate(c1.device(), 16)?;
    let received = c1.recv(&mut buf, 16, 0, 0).await?;
    buf.sync_to_host()?;
    println!("rank 1 received {received} elements: {:?}", buf.read());

    sender
        .await
        .map_err(|e| accel_p2p::AccelError::transport_with_source("sender task", e))??;

    for client in &clients {
        client.deinit().await?;
    }
    Ok(())
}
