use super::helpers::{CountingEngine, client_with_engine, local_clients, synced_buffer, test_config};
use accel_p2p::{
    AccelClient, AccelError, Buffer, ClientState, DataType, EndpointDirectory, Envelope,
    GroupContext, LocalFabric, SimDevice, SyncState, local_endpoints,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_state_transitions() {
    let clients = local_clients(2);
    assert!(clients.iter().all(|c| c.state() == ClientState::Ready));

    let (a, b) = tokio::join!(clients[0].barrier(), clients[1].barrier());
    a.unwrap();
    b.unwrap();
    assert!(clients.iter().all(|c| c.state() == ClientState::Active));

    clients[0].deinit().await.unwrap();
    assert_eq!(clients[0].state(), ClientState::Closed);
    assert_eq!(clients[1].state(), ClientState::Active);
}

#[tokio::test]
async fn test_deinit_from_ready() {
    let clients = local_clients(1);
    clients[0].deinit().await.unwrap();
    assert_eq!(clients[0].state(), ClientState::Closed);
}

#[tokio::test]
async fn test_double_deinit_is_error() {
    let clients = local_clients(2);
    clients[1].deinit().await.unwrap();
    assert!(matches!(
        clients[1].deinit().await,
        Err(AccelError::ClosedClient)
    ));
}

#[tokio::test]
async fn test_operations_after_deinit() {
    let clients = local_clients(2);
    let client = &clients[0];
    let buf = synced_buffer(client, &[1.0f32; 4]);
    let mut out = Buffer::<f32>::allocate(client.device(), 4).unwrap();
    client.deinit().await.unwrap();

    assert!(matches!(client.send(&buf, 4, 1, 0).await, Err(AccelError::ClosedClient)));
    assert!(matches!(client.recv(&mut out, 4, 1, 0).await, Err(AccelError::ClosedClient)));
    assert!(matches!(client.barrier().await, Err(AccelError::ClosedClient)));

    let before = client.timeout();
    assert!(matches!(
        client.set_timeout(Duration::from_millis(5)),
        Err(AccelError::ClosedClient)
    ));
    assert_eq!(client.timeout(), before);
}

/// A peer that shut down fails sends instead of leaving them hanging.
#[tokio::test]
async fn test_send_to_closed_peer() {
    let clients = local_clients(2);
    clients[1].deinit().await.unwrap();
    let buf = synced_buffer(&clients[0], &[5u32; 2]);
    let err = clients[0].send(&buf, 2, 1, 0).await.unwrap_err();
    assert!(matches!(err, AccelError::PeerDisconnected { rank: 1 }));
}

#[tokio::test]
async fn test_invalid_rank_never_reaches_engine() {
    let engine = Arc::new(CountingEngine::default());
    let client = client_with_engine(0, 2, Arc::clone(&engine));
    let buf = synced_buffer(&client, &[0u8; 4]);
    let mut out = Buffer::<u8>::allocate(client.device(), 4).unwrap();

    let err = client.send(&buf, 4, 2, 0).await.unwrap_err();
    assert!(matches!(
        err,
        AccelError::InvalidRank {
            rank: 2,
            world_size: 2
        }
    ));
    assert!(matches!(
        client.recv(&mut out, 4, 7, 0).await,
        Err(AccelError::InvalidRank { rank: 7, .. })
    ));
    assert_eq!(engine.calls(), 0);
    assert_eq!(client.state(), ClientState::Ready);
}

#[tokio::test]
async fn test_count_larger_than_buffer() {
    let engine = Arc::new(CountingEngine::default());
    let client = client_with_engine(0, 2, Arc::clone(&engine));
    let buf = synced_buffer(&client, &[0i32; 4]);
    let mut out = Buffer::<i32>::allocate(client.device(), 4).unwrap();

    assert!(matches!(
        client.send(&buf, 5, 1, 0).await,
        Err(AccelError::SizeMismatch {
            requested: 5,
            capacity: 4
        })
    ));
    assert!(matches!(
        client.recv(&mut out, 9, 1, 0).await,
        Err(AccelError::SizeMismatch { requested: 9, .. })
    ));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_send_requires_device_sync() {
    let engine = Arc::new(CountingEngine::default());
    let client = client_with_engine(0, 2, Arc::clone(&engine));
    let mut buf = Buffer::<f64>::allocate(client.device(), 2).unwrap();
    buf.write(&[1.0, 2.0]).unwrap();

    let err = client.send(&buf, 2, 1, 0).await.unwrap_err();
    assert!(matches!(
        err,
        AccelError::Unsynchronized {
            state: SyncState::HostOnly
        }
    ));
    assert_eq!(engine.calls(), 0);

    buf.sync_to_device().unwrap();
    client.send(&buf, 2, 1, 0).await.unwrap();
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn test_set_timeout() {
    let engine = Arc::new(CountingEngine::default());
    let client = client_with_engine(1, 2, engine);
    assert_eq!(client.timeout(), test_config().timeout);

    client.set_timeout(Duration::from_millis(30)).unwrap();
    assert_eq!(client.timeout(), Duration::from_millis(30));

    // The canned-less engine never answers, so the new bound applies.
    let mut out = Buffer::<u8>::allocate(client.device(), 1).unwrap();
    let err = client.recv(&mut out, 1, 0, 0).await.unwrap_err();
    assert!(matches!(
        err,
        AccelError::Timeout {
            operation: "recv",
            timeout_ms: 30
        }
    ));
}

#[tokio::test]
async fn test_sub_millisecond_timeout_kept() {
    let engine = Arc::new(CountingEngine::default());
    let client = client_with_engine(0, 2, engine);
    client.set_timeout(Duration::from_micros(900)).unwrap();
    assert_eq!(client.timeout(), Duration::from_micros(900));

    client.set_timeout(Duration::from_nanos(1_500_250)).unwrap();
    assert_eq!(client.timeout(), Duration::from_nanos(1_500_250));
}

#[tokio::test]
async fn test_recv_rejects_foreign_session() {
    let envelope = Envelope {
        src: 0,
        dst: 1,
        tag: 0,
        session_id: 99,
        dtype: DataType::U8,
        count: 2,
        payload: vec![1, 2],
    };
    let engine = Arc::new(CountingEngine::with_envelope(envelope));
    let client = client_with_engine(1, 2, engine);
    let mut out = Buffer::<u8>::allocate(client.device(), 2).unwrap();

    let err = client.recv(&mut out, 2, 0, 0).await.unwrap_err();
    assert!(matches!(
        err,
        AccelError::SessionMismatch {
            rank: 0,
            expected: 1,
            actual: 99
        }
    ));
    assert_eq!(out.state(), SyncState::HostOnly);
}

#[tokio::test]
async fn test_recv_rejects_truncated_payload() {
    let envelope = Envelope {
        src: 0,
        dst: 1,
        tag: 0,
        session_id: 1,
        dtype: DataType::U32,
        count: 2,
        payload: vec![0; 5],
    };
    let engine = Arc::new(CountingEngine::with_envelope(envelope));
    let client = client_with_engine(1, 2, engine);
    let mut out = Buffer::<u32>::allocate(client.device(), 2).unwrap();
    assert!(matches!(
        client.recv(&mut out, 2, 0, 0).await,
        Err(AccelError::DecodeFailed(_))
    ));
}

#[test]
fn test_world_mismatch_rejected() {
    let fabric = LocalFabric::new(2, 4);
    let directory = Arc::new(EndpointDirectory::new(local_endpoints(3, 7000).unwrap(), 3).unwrap());
    let err = AccelClient::new(
        GroupContext::new(0, 2).unwrap(),
        directory,
        Arc::new(fabric.engine(0).unwrap()),
        Arc::new(SimDevice::new()),
        test_config(),
    )
    .unwrap_err();
    assert!(matches!(err, AccelError::Configuration(_)));
}

#[tokio::test]
async fn test_buffers_released_on_drop() {
    let device = Arc::new(SimDevice::new());
    {
        let mut a = Buffer::<f32>::allocate(device.clone(), 8).unwrap();
        a.sync_to_device().unwrap();
        let _b = Buffer::<u8>::allocate(device.clone(), 3).unwrap();
        assert_eq!(device.live_regions(), 2);
        a.free().unwrap();
        assert_eq!(device.live_regions(), 1);
    }
    assert_eq!(device.live_regions(), 0);
}
