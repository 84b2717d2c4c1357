/// Default gap between consecutive sibling ranks.
///
/// Leaves room for manual insertions between two siblings without
/// renumbering the whole list.
pub const RANK_STEP: i64 = 100;

/// Calculates integer ranks for appended and renumbered siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankAllocator {
    step: i64,
}

impl Default for RankAllocator {
    fn default() -> Self {
        Self { step: RANK_STEP }
    }
}

impl RankAllocator {
    /// Allocator with a custom step. Non-positive steps fall back to `RANK_STEP`.
    pub fn with_step(step: i64) -> Self {
        if step > 0 {
            Self { step }
        } else {
            Self::default()
        }
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Rank for a node appended after all existing siblings
    ///
    /// # Examples
    /// ```
    /// use planboard_core::ordering::RankAllocator;
    ///
    /// let allocator = RankAllocator::default();
    /// assert_eq!(allocator.allocate_append_rank(&[]), 100);
    /// assert_eq!(allocator.allocate_append_rank(&[300, 100, 200]), 400);
    /// ```
    pub fn allocate_append_rank(&self, existing_ranks: &[i64]) -> i64 {
        match existing_ranks.iter().max() {
            Some(max) => max.saturating_add(self.step),
            None => self.step,
        }
    }

    /// Renumber ids in the given order as `step, 2*step, 3*step, ...`
    ///
    /// # Example
    /// Input:  ["c", "a", "b"]
    /// Output: [("c", 100), ("a", 200), ("b", 300)]
    pub fn normalize_ranks<I, S>(&self, ordered_ids: I) -> Vec<(String, i64)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ordered_ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| {
                let position = (index as i64).saturating_add(1);
                (id.into(), position.saturating_mul(self.step))
            })
            .collect()
    }

    /// Check if ranks are already in normalized form
    pub fn is_normalized(&self, ranks: &[i64]) -> bool {
        ranks
            .iter()
            .enumerate()
            .all(|(index, rank)| {
                *rank == (index as i64).saturating_add(1).saturating_mul(self.step)
            })
    }
}

/// `RankAllocator::default().allocate_append_rank(existing_ranks)`
pub fn allocate_append_rank(existing_ranks: &[i64]) -> i64 {
    RankAllocator::default().allocate_append_rank(existing_ranks)
}

/// `RankAllocator::default().normalize_ranks(ordered_ids)`
pub fn normalize_ranks<I, S>(ordered_ids: I) -> Vec<(String, i64)>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    RankAllocator::default().normalize_ranks(ordered_ids)
}
