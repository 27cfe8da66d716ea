use super::helpers::{local_clients, run_on, run_ranks, tcp_clients};
use accel_p2p::AccelError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[tokio::test]
async fn test_barrier_4_ranks_repeated() {
    run_ranks(4, |client| async move {
        for _ in 0..5 {
            client.barrier().await.unwrap();
        }
    })
    .await;
}

/// No rank leaves a barrier before every rank has entered it.
#[tokio::test]
async fn test_barrier_orders_phases() {
    let arrived = Arc::new(AtomicU32::new(0));
    let clients = local_clients(3);
    run_on(clients, move |client| {
        let arrived = Arc::clone(&arrived);
        async move {
            // Stagger entry so late ranks are really late.
            tokio::time::sleep(Duration::from_millis(20 * client.rank() as u64)).await;
            arrived.fetch_add(1, Ordering::SeqCst);
            client.barrier().await.unwrap();
            assert_eq!(arrived.load(Ordering::SeqCst), 3);
        }
    })
    .await;
}

#[tokio::test]
async fn test_barrier_single_rank() {
    run_ranks(1, |client| async move {
        client.barrier().await.unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_barrier_times_out_with_missing_rank() {
    let clients = local_clients(2);
    clients[0].set_timeout(Duration::from_millis(50)).unwrap();
    let err = clients[0].barrier().await.unwrap_err();
    assert!(matches!(
        err,
        AccelError::Timeout {
            operation: "barrier",
            ..
        }
    ));
}

#[tokio::test]
async fn test_barrier_over_tcp_3_ranks() {
    let clients = tcp_clients(3, 1024).await;
    run_on(clients, |client| async move {
        for _ in 0..3 {
            client.barrier().await.unwrap();
        }
    })
    .await;
}
