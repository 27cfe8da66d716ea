use crate::error::{AccelError, Result};
use crate::types::Rank;

/// Identity of the local participant within its group.
///
/// Passed explicitly to each client so that several ranks can live in one
/// process (tests, the in-process fabric).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupContext {
    local_rank: Rank,
    world_size: u32,
}

impl GroupContext {
    pub fn new(local_rank: Rank, world_size: u32) -> Result<Self> {
        if local_rank >= world_size {
            return Err(AccelError::config(format!(
                "local rank {local_rank} outside world of size {world_size}"
            )));
        }
        Ok(Self {
            local_rank,
            world_size,
        })
    }

    /// Rank of this process in the group.
    pub fn local_rank(&self) -> Rank {
        self.local_rank
    }

    /// Number of ranks in the group.
    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    /// Fails with `InvalidRank` unless `rank` lies in `[0, world_size)`.
    pub fn check_rank(&self, rank: Rank) -> Result<()> {
        if rank >= self.world_size {
            return Err(AccelError::InvalidRank {
                rank,
                world_size: self.world_size,
            });
        }
        Ok(())
    }

    /// Every rank except the local one, ascending.
    pub fn peers(&self) -> impl Iterator<Item = Rank> + '_ {
        (0..self.world_size).filter(move |&r| r != self.local_rank)
    }
}
