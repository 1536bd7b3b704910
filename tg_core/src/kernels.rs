//! Dense row-major kernels on `f64` slices.
//!
//! Callers validate shapes; these functions only index.

/// `[m, k] @ [k, n] -> [m, n]`
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);

    let mut out = vec![0.0; m * n];
    for i in 0..m {
        let row = &a[i * k..(i + 1) * k];
        let out_row = &mut out[i * n..(i + 1) * n];
        for (l, &a_il) in row.iter().enumerate() {
            if a_il == 0.0 {
                continue;
            }
            let b_row = &b[l * n..(l + 1) * n];
            for (o, &b_lj) in out_row.iter_mut().zip(b_row) {
                *o += a_il * b_lj;
            }
        }
    }
    out
}

/// `[rows, cols] -> [cols, rows]`
pub fn transpose(x: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    debug_assert_eq!(x.len(), rows * cols);

    let mut out = vec![0.0; rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            out[j * rows + i] = x[i * cols + j];
        }
    }
    out
}

/// Column sums of a `[rows, cols]` matrix.
pub fn sum_rows(x: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    debug_assert_eq!(x.len(), rows * cols);

    let mut out = vec![0.0; cols];
    for row in x.chunks_exact(cols).take(rows) {
        for (o, v) in out.iter_mut().zip(row) {
            *o += v;
        }
    }
    out
}

/// Row-wise softmax of a `[rows, cols]` matrix.
///
/// Each row is shifted by its maximum before exponentiating.
pub fn softmax_rows(x: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    debug_assert_eq!(x.len(), rows * cols);

    let mut out = Vec::with_capacity(rows * cols);
    for row in x.chunks_exact(cols).take(rows) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let start = out.len();
        let mut total = 0.0;
        for &v in row {
            let e = (v - max).exp();
            total += e;
            out.push(e);
        }
        for p in &mut out[start..] {
            *p /= total;
        }
    }
    out
}

/// `log(sum(exp(row)))` for a single row, without overflow.
pub fn log_sum_exp(row: &[f64]) -> f64 {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let total: f64 = row.iter().map(|&v| (v - max).exp()).sum();
    max + total.ln()
}

/// Index of the largest entry of each row; ties resolve to the lowest index.
pub fn argmax_rows(x: &[f64], rows: usize, cols: usize) -> Vec<usize> {
    x.chunks_exact(cols)
        .take(rows)
        .map(|row| {
            let mut best = 0;
            for (j, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = j;
                }
            }
            best
        })
        .collect()
}
