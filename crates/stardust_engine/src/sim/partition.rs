//! Static partitioning of the point set across recording threads.

/// Draw-call range owned by one recording thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    /// Index of the first draw call in the shard.
    pub first_draw: u32,
    /// Number of draw calls the shard records.
    pub draw_count: u32,
}

/// Fixed division of the point set into per-thread shards.
///
/// Points are drawn `batch_size` vertices per draw call; the draws are split
/// evenly across `core_count` shards, truncating, with any remainder draws
/// folded into the last shard so every batch-aligned point is drawn exactly
/// once. Points beyond the last full batch are never drawn.
#[derive(Debug, Clone)]
pub struct PointPartition {
    batch_size: u32,
    core_count: u32,
    draws_per_shard: u32,
    remainder: u32,
}

impl PointPartition {
    pub fn new(point_count: u32, batch_size: u32, core_count: u32) -> Self {
        debug_assert!(batch_size > 0 && core_count > 0);
        let total_draws = point_count / batch_size;
        Self {
            batch_size,
            core_count,
            draws_per_shard: total_draws / core_count,
            remainder: total_draws % core_count,
        }
    }

    pub fn core_count(&self) -> u32 {
        self.core_count
    }

    /// Vertices per draw call.
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Total draw calls issued per frame across all shards.
    pub fn total_draws(&self) -> u32 {
        self.draws_per_shard * self.core_count + self.remainder
    }

    /// Total vertices drawn per frame (batch-aligned point count).
    pub fn total_vertices(&self) -> u64 {
        u64::from(self.total_draws()) * u64::from(self.batch_size)
    }

    /// The draw range recorded by thread `tid`.
    pub fn shard(&self, tid: u32) -> Shard {
        debug_assert!(tid < self.core_count);
        let draw_count = if tid == self.core_count - 1 {
            self.draws_per_shard + self.remainder
        } else {
            self.draws_per_shard
        };
        Shard {
            first_draw: tid * self.draws_per_shard,
            draw_count,
        }
    }

    /// First vertex of draw `i` within a shard.
    pub fn first_vertex(&self, shard: Shard, i: u32) -> u32 {
        (shard.first_draw + i) * self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_scenario() {
        // 2M points, batches of 10, 4 cores.
        let part = PointPartition::new(2_000_000, 10, 4);
        for tid in 0..4 {
            assert_eq!(part.shard(tid).draw_count, 50_000);
        }
        assert_eq!(part.total_draws(), 200_000);
        assert_eq!(part.total_vertices(), 2_000_000);
    }

    #[test]
    fn shards_are_contiguous_and_disjoint() {
        let part = PointPartition::new(999_937, 10, 7);
        let mut next_draw = 0;
        for tid in 0..7 {
            let shard = part.shard(tid);
            assert_eq!(shard.first_draw, next_draw);
            next_draw += shard.draw_count;
        }
        assert_eq!(next_draw, part.total_draws());
    }

    #[test]
    fn remainder_goes_to_last_shard() {
        // 103 draws over 4 cores: 25 each plus 3 extra on the last.
        let part = PointPartition::new(1030, 10, 4);
        assert_eq!(part.shard(0).draw_count, 25);
        assert_eq!(part.shard(1).draw_count, 25);
        assert_eq!(part.shard(2).draw_count, 25);
        assert_eq!(part.shard(3).draw_count, 28);
        assert_eq!(part.total_vertices(), 1030);
    }

    #[test]
    fn partial_batch_is_dropped() {
        let part = PointPartition::new(1007, 10, 2);
        assert_eq!(part.total_vertices(), 1000);
    }

    #[test]
    fn more_cores_than_draws() {
        let part = PointPartition::new(30, 10, 8);
        let mut total = 0;
        for tid in 0..8 {
            total += part.shard(tid).draw_count;
        }
        assert_eq!(total, 3);
        // All three land on the last shard.
        assert_eq!(part.shard(7).draw_count, 3);
        assert_eq!(part.shard(0).draw_count, 0);
    }

    #[test]
    fn first_vertex_enumerates_disjoint_batches() {
        // Walking every shard's draws through first_vertex covers each batch
        // start exactly once, in order.
        let part = PointPartition::new(1030, 10, 4);
        let mut starts = Vec::new();
        for tid in 0..4 {
            let shard = part.shard(tid);
            for i in 0..shard.draw_count {
                starts.push(part.first_vertex(shard, i));
            }
        }
        assert_eq!(starts.len() as u32, part.total_draws());
        for (n, &start) in starts.iter().enumerate() {
            assert_eq!(start, n as u32 * part.batch_size());
        }
    }

    #[test]
    fn first_vertex_is_batch_aligned() {
        let part = PointPartition::new(2_000_000, 10, 4);
        let shard = part.shard(2);
        assert_eq!(part.first_vertex(shard, 0), 100_000 * 10);
        assert_eq!(part.first_vertex(shard, 1), 100_000 * 10 + 10);
        let last = part.shard(3);
        assert_eq!(
            part.first_vertex(last, last.draw_count - 1) + part.batch_size(),
            2_000_000
        );
    }
}
