//! Send/receive self-test: rank 0 sends a known progression, every other
//! rank receives it and checks the values.

use crate::client::AccelClient;
use crate::error::Result;
use crate::memory::Buffer;
use crate::types::{Element, Rank, Tag};

/// `[0, 1, ..., n-1]` cast to `T`.
pub fn arithmetic_progression<T: Element>(n: usize) -> Vec<T> {
    (0..n).map(T::from_index).collect()
}

/// What a rank does in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver { from: Rank },
}

impl Role {
    /// Rank 0 sends, everyone else receives from rank 0.
    pub fn for_rank(rank: Rank) -> Self {
        if rank == 0 {
            Role::Sender
        } else {
            Role::Receiver { from: 0 }
        }
    }
}

/// Result of comparing received data against the expected values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Number of positions compared (the longer of the two inputs).
    pub compared: usize,
    /// Indices whose values differ or exist on only one side.
    pub mismatches: Vec<usize>,
}

impl Verdict {
    /// True when no index mismatched.
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.passed() {
            f.write_str("test successful")
        } else {
            f.write_str("test failed")
        }
    }
}

/// Element-wise comparison with float tolerance. Never panics; a length
/// difference counts every unmatched index as a mismatch.
pub fn compare<T: Element>(expected: &[T], actual: &[T]) -> Verdict {
    let compared = expected.len().max(actual.len());
    let mismatches = (0..compared)
        .filter(|&i| match (expected.get(i), actual.get(i)) {
            (Some(&e), Some(&a)) => !a.approx_eq(e),
            _ => true,
        })
        .collect();
    Verdict {
        compared,
        mismatches,
    }
}

/// What one rank did and, for receivers, whether the data checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub rank: Rank,
    pub role: Role,
    pub verdict: Option<Verdict>,
}

impl Outcome {
    /// False only for a receiver whose data did not match.
    pub fn passed(&self) -> bool {
        self.verdict.as_ref().is_none_or(Verdict::passed)
    }

    /// `rank N: test successful|test failed` for receivers.
    pub fn report_line(&self) -> Option<String> {
        self.verdict
            .as_ref()
            .map(|v| format!("rank {}: {v}", self.rank))
    }
}

/// Run the exchange on `client`. Every rank of the group must call this
/// with the same `count` and `tag`.
///
/// Ranks synchronize before the exchange and again after it. The sender
/// serves receivers in ascending rank order.
pub async fn run_send_recv<T: Element>(client: &AccelClient, count: usize, tag: Tag) -> Result<Outcome> {
    run_send_recv_with(client, count, tag, |_: Role, _: &mut [T]| {}).await
}

/// [`run_send_recv`] with `edit` applied to the host data where the
/// exchange touches it: the sender's buffer before `sync_to_device`, and
/// each receiver's buffer after `sync_to_host`, before the comparison.
pub async fn run_send_recv_with<T, F>(client: &AccelClient, count: usize, tag: Tag, edit: F) -> Result<Outcome>
where
    T: Element,
    F: FnOnce(Role, &mut [T]),
{
    let rank = client.rank();
    let role = Role::for_rank(rank);
    let expected = arithmetic_progression::<T>(count);

    client.barrier().await?;

    let verdict = match role {
        Role::Sender => {
            let mut buffer = Buffer::<T>::allocate(client.device(), count)?;
            buffer.write(&expected)?;
            edit(role, buffer.host_mut());
            buffer.sync_to_device()?;
            for dst in client.group().peers() {
                client.send(&buffer, count, dst, tag).await?;
                tracing::debug!(rank, dst, count, "progression sent");
            }
            None
        }
        Role::Receiver { from } => {
            let mut buffer = Buffer::<T>::allocate(client.device(), count)?;
            let received = client.recv(&mut buffer, count, from, tag).await?;
            buffer.sync_to_host()?;
            edit(role, buffer.host_mut());
            let verdict = compare(&expected, &buffer.read()[..received]);
            if !verdict.passed() {
                tracing::warn!(rank, mismatches = ?verdict.mismatches, "received data differs");
            }
            Some(verdict)
        }
    };

    client.barrier().await?;
    Ok(Outcome {
        rank,
        role,
        verdict,
    })
}
