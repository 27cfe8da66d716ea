use super::helpers::{local_clients, synced_buffer};
use accel_p2p::{AccelError, Buffer, RequestStatus};
use std::time::Duration;

#[tokio::test]
async fn test_isend_irecv_complete() {
    let clients = local_clients(2);
    let out = synced_buffer(&clients[0], &[1i64, 2, 3]);
    let inc = Buffer::<i64>::allocate(clients[1].device(), 3).unwrap();

    let recv = clients[1].irecv(inc, 3, 0, 4);
    let send = clients[0].isend(out, 3, 1, 4);

    let returned = send.wait().await.unwrap();
    assert_eq!(returned.read(), &[1, 2, 3]);

    let (mut inc, n) = recv.wait().await.unwrap();
    assert_eq!(n, 3);
    inc.sync_to_host().unwrap();
    assert_eq!(inc.read(), &[1, 2, 3]);
}

#[tokio::test]
async fn test_status_and_wait_timeout() {
    let clients = local_clients(2);
    let inc = Buffer::<u8>::allocate(clients[1].device(), 2).unwrap();
    let mut recv = clients[1].irecv(inc, 2, 0, 0);

    assert!(recv.wait_timeout(Duration::from_millis(20)).await.is_none());
    assert_eq!(recv.status(), RequestStatus::Executing);
    assert!(!recv.test());

    let out = synced_buffer(&clients[0], &[9u8, 8]);
    clients[0].send(&out, 2, 1, 0).await.unwrap();

    let (_, n) = recv
        .wait_timeout(Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(recv.status(), RequestStatus::Completed);
    assert!(recv.test());
}

#[tokio::test]
async fn test_request_carries_error() {
    let clients = local_clients(2);
    clients[0].set_timeout(Duration::from_millis(20)).unwrap();
    let inc = Buffer::<f32>::allocate(clients[0].device(), 1).unwrap();
    let err = clients[0].irecv(inc, 1, 1, 0).wait().await.unwrap_err();
    assert!(err.is_timeout());
}

/// Dropping a pending receive does not swallow the message it was waiting for.
#[tokio::test]
async fn test_dropped_irecv_leaves_message() {
    let clients = local_clients(2);
    let inc = Buffer::<u32>::allocate(clients[1].device(), 1).unwrap();
    let pending = clients[1].irecv(inc, 1, 0, 0);
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(pending);

    let out = synced_buffer(&clients[0], &[77u32]);
    let mut inc = Buffer::<u32>::allocate(clients[1].device(), 1).unwrap();
    let (sent, got) = tokio::join!(
        clients[0].send(&out, 1, 1, 0),
        clients[1].recv(&mut inc, 1, 0, 0),
    );
    sent.unwrap();
    assert_eq!(got.unwrap(), 1);
    inc.sync_to_host().unwrap();
    assert_eq!(inc.read(), &[77]);
}

#[tokio::test]
async fn test_requests_fail_after_deinit() {
    let clients = local_clients(2);
    clients[0].deinit().await.unwrap();
    let out = synced_buffer(&clients[0], &[1u8]);
    assert!(matches!(
        clients[0].isend(out, 1, 1, 0).wait().await,
        Err(AccelError::ClosedClient)
    ));
}
