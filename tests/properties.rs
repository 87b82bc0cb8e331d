//! Property-based tests for table rebuilding and the scoring metrics.

use proptest::prelude::*;

use tabeval::core::model::CellDescriptor;
use tabeval::metrics::assignment::min_cost_assignment;
use tabeval::metrics::detection::{average_precision, IouThresholds};
use tabeval::metrics::teds::Teds;
use tabeval::table::{build_table_html, parse_logical_rows, Grid};

/// Cuts a `rows x cols` grid into rectangles covering every position once.
/// `widths` and `heights` pick each rectangle's size, shrunk to what fits.
fn tiling(rows: usize, cols: usize, widths: &[usize], heights: &[usize]) -> Vec<CellDescriptor> {
    let mut claimed = vec![vec![false; cols]; rows];
    let mut cells = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if claimed[r][c] {
                continue;
            }
            let k = cells.len();
            let free_right = (c..cols).take_while(|&cc| !claimed[r][cc]).count();
            let w = (1 + widths[k % widths.len()]).min(free_right);
            let wanted = (1 + heights[k % heights.len()]).min(rows - r);
            let h = 1 + (r + 1..r + wanted)
                .take_while(|&rr| (c..c + w).all(|cc| !claimed[rr][cc]))
                .count();
            for row in claimed.iter_mut().skip(r).take(h) {
                for slot in row.iter_mut().skip(c).take(w) {
                    *slot = true;
                }
            }
            cells.push(CellDescriptor::new(r, r + h - 1, c, c + w - 1, format!("r{r}c{c}")));
        }
    }
    cells
}

fn tiling_strategy() -> impl Strategy<Value = Vec<CellDescriptor>> {
    (
        1usize..6,
        1usize..6,
        proptest::collection::vec(0usize..3, 1..8),
        proptest::collection::vec(0usize..3, 1..8),
    )
        .prop_map(|(rows, cols, widths, heights)| tiling(rows, cols, &widths, &heights))
}

fn descriptor_strategy() -> impl Strategy<Value = CellDescriptor> {
    (0usize..4, 0usize..3, 0usize..4, 0usize..3, "[a-c]{0,2}").prop_map(|(r, h, c, w, text)| {
        CellDescriptor::new(r, r + h, c, c + w, text)
    })
}

fn brute_force(cost: &[Vec<f64>]) -> f64 {
    fn go(cost: &[Vec<f64>], row: usize, used: &mut Vec<bool>) -> f64 {
        if row == cost.len() {
            return 0.0;
        }
        let mut best = f64::INFINITY;
        for col in 0..used.len() {
            if !used[col] {
                used[col] = true;
                best = best.min(cost[row][col] + go(cost, row + 1, used));
                used[col] = false;
            }
        }
        best
    }
    go(cost, 0, &mut vec![false; cost.len()])
}

#[test]
fn proptest_tiled_grid_reads_back_as_same_cells() {
    proptest!(|(cells in tiling_strategy())| {
        let html = build_table_html(&cells);
        let rows = parse_logical_rows(&html).expect("generated markup parses");

        let mut read_back: Vec<CellDescriptor> = rows
            .iter()
            .flatten()
            .map(|c| CellDescriptor::new(c.row, c.row + c.rowspan - 1, c.col, c.col + c.colspan - 1, c.text.clone()))
            .collect();
        read_back.sort();
        read_back.dedup();

        let mut expected = cells.clone();
        expected.sort();
        prop_assert_eq!(read_back, expected);
        prop_assert!(!html.contains("<td></td>"));
    });
}

#[test]
fn proptest_grid_ignores_descriptor_order() {
    let strategy = proptest::collection::vec(descriptor_strategy(), 0..10)
        .prop_flat_map(|cells| (Just(cells.clone()), Just(cells).prop_shuffle()));
    proptest!(|((cells, shuffled) in strategy)| {
        prop_assert_eq!(Grid::build(&cells), Grid::build(&shuffled));
    });
}

#[test]
fn proptest_teds_is_bounded_and_one_on_identity() {
    proptest!(|(a in tiling_strategy(), b in tiling_strategy())| {
        let (html_a, html_b) = (build_table_html(&a), build_table_html(&b));
        for teds in [Teds::new(false), Teds::structure_only()] {
            prop_assert_eq!(teds.evaluate(&html_a, &html_a), 1.0);
            let score = teds.evaluate(&html_a, &html_b);
            prop_assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
        }
    });
}

#[test]
fn proptest_average_precision_grows_with_overlap() {
    let thresholds = IouThresholds::default();
    proptest!(|(low in 0.0f64..=1.0, high in 0.0f64..=1.0)| {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let (ap_low, ap_high) = (
            average_precision(low, &thresholds),
            average_precision(high, &thresholds),
        );
        prop_assert!(ap_low <= ap_high);
        prop_assert!((0.0..=1.0).contains(&ap_high));
    });
}

#[test]
fn proptest_assignment_matches_brute_force() {
    let strategy = (1usize..6).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(0u32..20, n), n)
    });
    proptest!(|(matrix in strategy)| {
        let cost: Vec<Vec<f64>> = matrix
            .iter()
            .map(|row| row.iter().map(|&v| f64::from(v)).collect())
            .collect();
        let pairs = min_cost_assignment(&cost);
        prop_assert_eq!(pairs.len(), cost.len());

        let mut cols: Vec<usize> = pairs.iter().map(|&(_, c)| c).collect();
        cols.sort_unstable();
        cols.dedup();
        prop_assert_eq!(cols.len(), cost.len());

        let total: f64 = pairs.iter().map(|&(r, c)| cost[r][c]).sum();
        prop_assert_eq!(total, brute_force(&cost));
    });
}
