//! Minimum-cost bipartite assignment (Hungarian method with potentials).

/// Pairs `(row, col)` minimising the total cost of `cost`. Rectangular
/// matrices are padded internally; exactly `min(rows, cols)` pairs come back,
/// sorted by row.
pub fn min_cost_assignment(cost: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let rows = cost.len();
    let cols = cost.iter().map(Vec::len).max().unwrap_or(0);
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    let n = rows.max(cols);
    let at = |i: usize, j: usize| -> f64 {
        cost.get(i)
            .and_then(|row| row.get(j))
            .copied()
            .filter(|c| c.is_finite())
            .unwrap_or(0.0)
    };

    // 1-based arrays; index 0 is the virtual source column.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut matched_row = vec![0_usize; n + 1];
    let mut way = vec![0_usize; n + 1];

    for i in 1..=n {
        matched_row[0] = i;
        let mut j0 = 0;
        let mut min_v = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = at(i0 - 1, j - 1) - u[i0] - v[j];
                if reduced < min_v[j] {
                    min_v[j] = reduced;
                    way[j] = j0;
                }
                if min_v[j] < delta {
                    delta = min_v[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_v[j] -= delta;
                }
            }
            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = (1..=n)
        .filter(|&j| matched_row[j] != 0)
        .map(|j| (matched_row[j] - 1, j - 1))
        .filter(|&(i, j)| i < rows && j < cols)
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Assignment maximising total similarity.
pub fn max_similarity_assignment(similarity: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let cost: Vec<Vec<f64>> = similarity
        .iter()
        .map(|row| row.iter().map(|s| -s).collect())
        .collect();
    min_cost_assignment(&cost)
}
