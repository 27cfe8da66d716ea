use super::helpers::{run_ranks, synced_buffer};
use accel_p2p::verify::{Role, arithmetic_progression, run_send_recv, run_send_recv_with};
use accel_p2p::{AccelError, Buffer, SyncState};

/// The reference exchange: 16 f32 values 0..15 from rank 0 to rank 1 on tag 0.
#[tokio::test]
async fn test_progression_2_ranks_f32() {
    run_ranks(2, |client| async move {
        let expected = arithmetic_progression::<f32>(16);
        if client.rank() == 0 {
            let buf = synced_buffer(&client, &expected);
            client.send(&buf, 16, 1, 0).await.unwrap();
        } else {
            let mut buf = Buffer::<f32>::allocate(client.device(), 16).unwrap();
            let n = client.recv(&mut buf, 16, 0, 0).await.unwrap();
            assert_eq!(n, 16);
            assert_eq!(buf.state(), SyncState::DeviceDirty);
            // Host view is stale until synced back.
            assert!(buf.read().iter().all(|&v| v == 0.0));

            buf.sync_to_host().unwrap();
            assert_eq!(buf.read(), expected.as_slice());
        }
    })
    .await;
}

#[tokio::test]
async fn test_harness_2_ranks() {
    run_ranks(2, |client| async move {
        let outcome = run_send_recv::<f32>(&client, 16, 0).await.unwrap();
        assert!(outcome.passed());
        if client.rank() == 1 {
            assert_eq!(outcome.report_line().unwrap(), "rank 1: test successful");
        } else {
            assert!(outcome.report_line().is_none());
        }
    })
    .await;
}

#[tokio::test]
async fn test_harness_4_ranks_i64() {
    run_ranks(4, |client| async move {
        let outcome = run_send_recv::<i64>(&client, 33, 9).await.unwrap();
        assert!(outcome.passed(), "rank {} failed", client.rank());
    })
    .await;
}

#[tokio::test]
async fn test_partial_receive_leaves_tail() {
    run_ranks(2, |client| async move {
        if client.rank() == 0 {
            let buf = synced_buffer(&client, &[7u32, 8, 9, 10]);
            client.send(&buf, 2, 1, 0).await.unwrap();
        } else {
            let mut buf = synced_buffer(&client, &[1u32, 1, 1, 1, 1, 1]);
            let n = client.recv(&mut buf, 6, 0, 0).await.unwrap();
            assert_eq!(n, 2);
            buf.sync_to_host().unwrap();
            assert_eq!(buf.read(), &[7, 8, 1, 1, 1, 1]);
        }
    })
    .await;
}

#[tokio::test]
async fn test_oversize_message_rejected() {
    run_ranks(2, |client| async move {
        if client.rank() == 0 {
            let buf = synced_buffer(&client, &[0u8; 8]);
            client.send(&buf, 8, 1, 0).await.unwrap();
        } else {
            let mut buf = Buffer::<u8>::allocate(client.device(), 8).unwrap();
            let err = client.recv(&mut buf, 4, 0, 0).await.unwrap_err();
            assert!(matches!(
                err,
                AccelError::SizeMismatch {
                    requested: 8,
                    capacity: 4
                }
            ));
        }
    })
    .await;
}

#[tokio::test]
async fn test_dtype_mismatch_rejected() {
    run_ranks(2, |client| async move {
        if client.rank() == 0 {
            let buf = synced_buffer(&client, &[1.0f64, 2.0]);
            client.send(&buf, 2, 1, 0).await.unwrap();
        } else {
            let mut buf = Buffer::<i64>::allocate(client.device(), 2).unwrap();
            let err = client.recv(&mut buf, 2, 0, 0).await.unwrap_err();
            assert!(matches!(err, AccelError::DecodeFailed(_)));
            assert_eq!(buf.state(), SyncState::HostOnly);
        }
    })
    .await;
}

#[tokio::test]
async fn test_zero_count_message() {
    run_ranks(2, |client| async move {
        if client.rank() == 0 {
            let buf = synced_buffer::<f32>(&client, &[]);
            client.send(&buf, 0, 1, 3).await.unwrap();
        } else {
            let mut buf = Buffer::<f32>::allocate(client.device(), 0).unwrap();
            assert_eq!(client.recv(&mut buf, 0, 0, 3).await.unwrap(), 0);
        }
    })
    .await;
}

/// A received buffer can be forwarded straight from device memory.
#[tokio::test]
async fn test_forward_without_host_sync() {
    run_ranks(3, |client| async move {
        match client.rank() {
            0 => {
                let buf = synced_buffer(&client, &[3i32, 1, 4, 1, 5]);
                client.send(&buf, 5, 1, 0).await.unwrap();
            }
            1 => {
                let mut buf = Buffer::<i32>::allocate(client.device(), 5).unwrap();
                client.recv(&mut buf, 5, 0, 0).await.unwrap();
                client.send(&buf, 5, 2, 0).await.unwrap();
            }
            _ => {
                let mut buf = Buffer::<i32>::allocate(client.device(), 5).unwrap();
                client.recv(&mut buf, 5, 1, 0).await.unwrap();
                buf.sync_to_host().unwrap();
                assert_eq!(buf.read(), &[3, 1, 4, 1, 5]);
            }
        }
    })
    .await;
}

/// One element altered on the sender before it reaches the device.
#[tokio::test]
async fn test_harness_detects_corrupted_send() {
    run_ranks(2, |client| async move {
        let outcome = run_send_recv_with::<f32, _>(&client, 16, 0, |role, data| {
            if role == Role::Sender {
                data[3] = -1.0;
            }
        })
        .await
        .unwrap();
        if client.rank() == 1 {
            assert!(!outcome.passed());
            assert_eq!(outcome.verdict.as_ref().unwrap().mismatches, vec![3]);
            assert_eq!(outcome.report_line().unwrap(), "rank 1: test failed");
        } else {
            assert!(outcome.passed());
        }
    })
    .await;
}

/// One element altered on the receiver after it syncs back to the host.
#[tokio::test]
async fn test_harness_detects_corrupted_receive() {
    run_ranks(2, |client| async move {
        let outcome = run_send_recv_with::<f32, _>(&client, 16, 0, |role, data| {
            if role != Role::Sender {
                data[15] += 0.5;
            }
        })
        .await
        .unwrap();
        if client.rank() == 1 {
            assert!(!outcome.passed());
            assert_eq!(outcome.verdict.as_ref().unwrap().mismatches, vec![15]);
            assert_eq!(outcome.report_line().unwrap(), "rank 1: test failed");
        }
    })
    .await;
}

/// Slices send from and land in a sub-range; the rest of the parent is
/// left alone.
#[tokio::test]
async fn test_slice_exchange() {
    run_ranks(2, |client| async move {
        if client.rank() == 0 {
            let mut buf = synced_buffer(&client, &[0u32, 1, 2, 3, 4, 5, 6, 7]);
            let slice = buf.slice(2, 6).unwrap();
            client.send_slice(&slice, 3, 1, 5).await.unwrap();

            let err = client.send_slice(&slice, 5, 1, 5).await.unwrap_err();
            assert!(matches!(
                err,
                AccelError::SizeMismatch {
                    requested: 5,
                    capacity: 4
                }
            ));
        } else {
            let mut buf = synced_buffer(&client, &[9u32; 8]);
            {
                let mut slice = buf.slice(4, 8).unwrap();
                assert_eq!(client.recv_slice(&mut slice, 4, 0, 5).await.unwrap(), 3);
                assert_eq!(slice.state(), SyncState::DeviceDirty);
            }
            buf.sync_to_host().unwrap();
            assert_eq!(buf.read(), &[9, 9, 9, 9, 2, 3, 4, 9]);
        }
    })
    .await;
}
