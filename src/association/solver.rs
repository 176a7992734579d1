//! Minimum-cost bipartite matching
//!
//! Solves the track-to-detection assignment problem with successive
//! shortest augmenting paths over Jonker-Volgenant row/column potentials,
//! O(n^3) on the padded square matrix. Infeasible pairs carry
//! [`INFEASIBLE`] cost and are stripped from the result, so a gated pair
//! can never be matched no matter how the optimum pans out.

use crate::{Result, TrackError};

/// Cost marking a gated-out pair. Entries at or above this never match.
pub const INFEASIBLE: f64 = 1e19;

/// Cost of the square-padding cells; exceeds every feasible entry so a pad
/// never displaces a real match.
const PAD_COST: f64 = 1e20;

/// Row-major cost matrix: rows are tracks, columns are detections.
#[derive(Debug, Clone)]
pub struct CostMatrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl CostMatrix {
    /// Creates a matrix filled with one value.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    /// Creates a matrix from row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::InvalidConfig`] when the data length does not
    /// match the dimensions.
    pub fn from_rows(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(TrackError::InvalidConfig(format!(
                "cost matrix needs {} entries for {}x{}, got {}",
                rows * cols,
                rows,
                cols,
                data.len()
            )));
        }
        Ok(Self { data, rows, cols })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }
}

/// Result of one matching run.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// `mapping[row]` is the matched column, or `None` for an unmatched row.
    pub mapping: Vec<Option<usize>>,
    /// Total cost over the matched pairs.
    pub cost: f64,
}

impl Assignment {
    /// Number of matched pairs.
    pub fn num_assigned(&self) -> usize {
        self.mapping.iter().filter(|m| m.is_some()).count()
    }

    /// Iterator over matched `(row, col)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.mapping
            .iter()
            .enumerate()
            .filter_map(|(row, col)| col.map(|c| (row, c)))
    }
}

/// Finds the minimum-cost matching of rows to columns.
///
/// Every entry below [`INFEASIBLE`] is a candidate; rows and columns left
/// over after the optimum is found stay unmatched. Ties between equal-cost
/// optima resolve toward lower indices, so equal inputs give equal outputs.
pub fn min_cost_assignment(cost: &CostMatrix) -> Assignment {
    let n_rows = cost.rows();
    let n_cols = cost.cols();
    if n_rows == 0 || n_cols == 0 {
        return Assignment {
            mapping: vec![None; n_rows],
            cost: 0.0,
        };
    }

    let n = n_rows.max(n_cols);
    let mut matrix = vec![PAD_COST; n * n];
    for i in 0..n_rows {
        for j in 0..n_cols {
            matrix[i * n + j] = cost.get(i, j);
        }
    }

    // Row and column potentials (dual variables).
    let mut u = vec![0.0_f64; n];
    let mut v = vec![0.0_f64; n];
    // col_assignment[j] is the row currently matched to column j.
    let mut col_assignment: Vec<Option<usize>> = vec![None; n];

    for start_row in 0..n {
        // Dijkstra-like search for the cheapest augmenting path from
        // start_row to a free column.
        let mut min_to = vec![f64::INFINITY; n];
        let mut previous: Vec<Option<usize>> = vec![None; n];
        let mut used = vec![false; n];

        let mut cur_row = start_row;
        let mut cur_col: Option<usize> = None;

        loop {
            let mut delta = f64::INFINITY;
            let mut next_col = 0;
            for j in 0..n {
                if used[j] {
                    continue;
                }
                let reduced = matrix[cur_row * n + j] - u[cur_row] - v[j];
                if reduced < min_to[j] {
                    min_to[j] = reduced;
                    previous[j] = cur_col;
                }
                if min_to[j] < delta {
                    delta = min_to[j];
                    next_col = j;
                }
            }

            for j in 0..n {
                if used[j] {
                    if let Some(row) = col_assignment[j] {
                        u[row] += delta;
                    }
                    v[j] -= delta;
                } else {
                    min_to[j] -= delta;
                }
            }
            u[start_row] += delta;

            used[next_col] = true;
            cur_col = Some(next_col);
            match col_assignment[next_col] {
                Some(row) => cur_row = row,
                None => break,
            }
        }

        // Flip the matching along the augmenting path.
        let mut col = cur_col;
        while let Some(j) = col {
            let prev = previous[j];
            col_assignment[j] = match prev {
                Some(pj) => col_assignment[pj],
                None => Some(start_row),
            };
            col = prev;
        }
    }

    // Strip padding and gated pairs; sum the real cost.
    let mut mapping = vec![None; n_rows];
    let mut total = 0.0;
    for (j, assigned) in col_assignment.iter().enumerate() {
        if let Some(i) = *assigned {
            if i < n_rows && j < n_cols && cost.get(i, j) < INFEASIBLE {
                mapping[i] = Some(j);
                total += cost.get(i, j);
            }
        }
    }

    Assignment {
        mapping,
        cost: total,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_optimum() {
        let cost = CostMatrix::from_rows(3, 3, vec![4.0, 1.0, 3.0, 2.0, 0.0, 5.0, 3.0, 2.0, 2.0])
            .unwrap();
        let result = min_cost_assignment(&cost);
        // 0->1, 1->0, 2->2 gives 1+2+2 = 5, the unique optimum.
        assert_eq!(result.mapping, vec![Some(1), Some(0), Some(2)]);
        assert!((result.cost - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_off_diagonal_optimum() {
        let cost = CostMatrix::from_rows(
            3,
            3,
            vec![10.0, 5.0, 13.0, 3.0, 15.0, 8.0, 7.0, 4.0, 12.0],
        )
        .unwrap();
        let result = min_cost_assignment(&cost);
        assert_eq!(result.num_assigned(), 3);
        assert!((result.cost - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_rectangular_leaves_surplus_rows_unmatched() {
        let cost = CostMatrix::from_rows(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let result = min_cost_assignment(&cost);
        assert_eq!(result.mapping.len(), 3);
        assert_eq!(result.num_assigned(), 2);
    }

    #[test]
    fn test_infeasible_pairs_never_match() {
        let cost =
            CostMatrix::from_rows(2, 2, vec![1.0, INFEASIBLE, INFEASIBLE, 2.0]).unwrap();
        let result = min_cost_assignment(&cost);
        assert_eq!(result.mapping, vec![Some(0), Some(1)]);

        let all_gated = CostMatrix::filled(2, 2, INFEASIBLE);
        let result = min_cost_assignment(&all_gated);
        assert_eq!(result.num_assigned(), 0);
        assert_eq!(result.cost, 0.0);
    }

    #[test]
    fn test_forced_through_gate_stays_unmatched() {
        // Row 1 can only take the gated column; it must stay unmatched
        // rather than accept the infeasible pair.
        let cost =
            CostMatrix::from_rows(2, 2, vec![1.0, 2.0, INFEASIBLE, INFEASIBLE]).unwrap();
        let result = min_cost_assignment(&cost);
        assert_eq!(result.mapping[1], None);
        assert_eq!(result.num_assigned(), 1);
    }

    #[test]
    fn test_equal_costs_break_ties_by_index() {
        let cost = CostMatrix::filled(2, 2, 1.0);
        let result = min_cost_assignment(&cost);
        assert_eq!(result.mapping, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_empty_inputs() {
        let no_rows = CostMatrix::filled(0, 3, 1.0);
        assert_eq!(min_cost_assignment(&no_rows).num_assigned(), 0);
        let no_cols = CostMatrix::filled(3, 0, 1.0);
        let result = min_cost_assignment(&no_cols);
        assert_eq!(result.mapping, vec![None, None, None]);
    }

    #[test]
    fn test_from_rows_rejects_bad_length() {
        assert!(CostMatrix::from_rows(2, 2, vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_identical_inputs_identical_outputs() {
        let data = vec![2.0, 2.0, 5.0, 2.0, 2.0, 5.0, 5.0, 5.0, 2.0];
        let a = min_cost_assignment(&CostMatrix::from_rows(3, 3, data.clone()).unwrap());
        let b = min_cost_assignment(&CostMatrix::from_rows(3, 3, data).unwrap());
        assert_eq!(a, b);
    }
}
