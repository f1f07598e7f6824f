//! Dense rank-by-rank matrix used for traffic and message counts.

use serde::{Serialize, Serializer};

use crate::trace::Rank;

/// Square `size x size` matrix stored row-major.
/// Row = sending rank, column = destination rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankMatrix {
    size: usize,
    cells: Vec<u64>,
}

impl RankMatrix {
    /// Zero-filled matrix for `size` ranks.
    ///
    /// Returns `None` when `size * size` cells overflow or cannot be allocated.
    pub fn zeros(size: usize) -> Option<Self> {
        let len = size.checked_mul(size)?;
        let mut cells = Vec::new();
        cells.try_reserve_exact(len).ok()?;
        cells.resize(len, 0);
        Some(Self { size, cells })
    }

    /// Side length (number of ranks)
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn row(&self, sender: Rank) -> &[u64] {
        let start = sender * self.size;
        &self.cells[start..start + self.size]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u64]> {
        // chunks_exact panics on 0
        self.cells.chunks_exact(self.size.max(1))
    }

    /// Overwrite a full row. Callers guarantee `values.len() == size`.
    pub(crate) fn set_row(&mut self, sender: Rank, values: &[u64]) {
        debug_assert_eq!(values.len(), self.size);
        let start = sender * self.size;
        self.cells[start..start + self.size].copy_from_slice(values);
    }

    /// Sum of all cells, saturating at `u64::MAX`
    pub fn total(&self) -> u64 {
        self.cells.iter().fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Largest cell as (sender, destination, value); `None` when all cells are zero
    pub fn max_cell(&self) -> Option<(Rank, Rank, u64)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > 0)
            .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
            .map(|(i, &v)| (i / self.size, i % self.size, v))
    }

    /// Nested `Vec` copy, one inner vector per sending rank
    pub fn to_nested(&self) -> Vec<Vec<u64>> {
        self.rows().map(|r| r.to_vec()).collect()
    }
}

impl Serialize for RankMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows())
    }
}
