use super::helpers::{run_on, synced_buffer, tcp_clients, tcp_clients_with, test_config};
use accel_p2p::verify::{arithmetic_progression, run_send_recv};
use accel_p2p::{
    AccelClient, Buffer, EndpointDirectory, GroupContext, Rank, SimDevice, TcpEngine,
    load_endpoints,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::test]
async fn test_harness_over_tcp_3_ranks() {
    // Segments far smaller than a message force reassembly.
    let clients = tcp_clients(3, 16).await;
    run_on(clients, |client| async move {
        let outcome = run_send_recv::<f32>(&client, 64, 0).await.unwrap();
        assert!(outcome.passed(), "rank {} failed", client.rank());
        client.deinit().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_large_message_over_tcp() {
    let clients = tcp_clients(2, 4096).await;
    run_on(clients, |client| async move {
        let count = 100_000;
        let expected = arithmetic_progression::<f64>(count);
        if client.rank() == 0 {
            let buf = synced_buffer(&client, &expected);
            client.send(&buf, count, 1, 11).await.unwrap();
        } else {
            let mut buf = Buffer::<f64>::allocate(client.device(), count).unwrap();
            assert_eq!(client.recv(&mut buf, count, 0, 11).await.unwrap(), count);
            buf.sync_to_host().unwrap();
            assert_eq!(buf.read(), expected.as_slice());
        }
    })
    .await;
}

/// Both directions share one connection per pair.
#[tokio::test]
async fn test_ping_pong_over_tcp() {
    let clients = tcp_clients(2, 1024).await;
    run_on(clients, |client| async move {
        let peer = 1 - client.rank();
        for round in 0..4u32 {
            let mut inc = Buffer::<u32>::allocate(client.device(), 1).unwrap();
            if (round + client.rank()) % 2 == 0 {
                let out = synced_buffer(&client, &[round]);
                client.send(&out, 1, peer, round).await.unwrap();
            } else {
                client.recv(&mut inc, 1, peer, round).await.unwrap();
                inc.sync_to_host().unwrap();
                assert_eq!(inc.read(), &[round]);
            }
        }
    })
    .await;
}

/// Endpoint files may name the host field `ip`.
#[tokio::test]
async fn test_endpoints_from_file() {
    let mut listeners = Vec::new();
    for _ in 0..2 {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }
    let entries: Vec<String> = listeners
        .iter()
        .enumerate()
        .map(|(i, l)| {
            format!(
                r#"{{"ip": "127.0.0.1", "port": {}, "session_id": {}, "max_segment_size": 256}}"#,
                l.local_addr().unwrap().port(),
                40 + i
            )
        })
        .collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[{}]", entries.join(",")).unwrap();

    let loaded = load_endpoints(file.path()).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[1].session_id, 41);
    let directory = Arc::new(EndpointDirectory::new(loaded, 2).unwrap());

    let clients: Vec<Arc<AccelClient>> = listeners
        .into_iter()
        .enumerate()
        .map(|(rank, listener)| {
            let group = GroupContext::new(rank as Rank, 2).unwrap();
            let engine =
                TcpEngine::from_listener(listener, group, Arc::clone(&directory), test_config())
                    .unwrap();
            Arc::new(
                AccelClient::new(
                    group,
                    Arc::clone(&directory),
                    Arc::new(engine),
                    Arc::new(SimDevice::new()),
                    test_config(),
                )
                .unwrap(),
            )
        })
        .collect();

    run_on(clients, |client| async move {
        let outcome = run_send_recv::<i32>(&client, 100, 3).await.unwrap();
        assert!(outcome.passed());
    })
    .await;
}

/// A tag whose lane is full must not hold back other tags on the same
/// connection.
#[tokio::test]
async fn test_full_lane_does_not_block_other_tags() {
    let config = accel_p2p::ClientConfig {
        lane_capacity: 1,
        ..test_config()
    };
    let clients = tcp_clients_with(2, 64, config).await;

    let first = clients[0].isend(synced_buffer(&clients[0], &[1u32]), 1, 1, 1);
    let second = clients[0].isend(synced_buffer(&clients[0], &[2u32]), 1, 1, 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let third = clients[0].isend(synced_buffer(&clients[0], &[3u32]), 1, 1, 2);

    let mut inc = Buffer::<u32>::allocate(clients[1].device(), 1).unwrap();
    tokio::time::timeout(Duration::from_secs(2), clients[1].recv(&mut inc, 1, 0, 2))
        .await
        .expect("tag 2 stuck behind tag 1")
        .unwrap();
    inc.sync_to_host().unwrap();
    assert_eq!(inc.read(), &[3]);
    third.wait().await.unwrap();

    for expected in [1u32, 2] {
        clients[1].recv(&mut inc, 1, 0, 1).await.unwrap();
        inc.sync_to_host().unwrap();
        assert_eq!(inc.read(), &[expected]);
    }
    first.wait().await.unwrap();
    second.wait().await.unwrap();
}
