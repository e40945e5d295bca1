//! Small dense linear algebra used by GLM fitting and rank checks.
//!
//! Matrices here are at most samples x samples, so plain loops over
//! `ndarray` storage are sufficient.

use ndarray::Array2;

/// Solve `A x = b` for symmetric positive (semi-)definite `A` by Cholesky.
///
/// Non-positive pivots are replaced by a tiny epsilon so nearly singular
/// systems still return a finite answer.
pub fn solve_spd(a: &Array2<f64>, b: &[f64]) -> Vec<f64> {
    let n = a.nrows();
    let l = cholesky(a);

    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[[i, j]] * y[j];
        }
        y[i] = sum / l[[i, i]];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[[j, i]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

fn cholesky(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    sum = 1e-12;
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    l
}

/// Inverse of a symmetric positive definite matrix, column by column.
pub fn invert_spd(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let mut inv = Array2::<f64>::zeros((n, n));
    let mut e = vec![0.0; n];
    for i in 0..n {
        e.iter_mut().for_each(|v| *v = 0.0);
        e[i] = 1.0;
        let col = solve_spd(a, &e);
        for (j, v) in col.into_iter().enumerate() {
            inv[[j, i]] = v;
        }
    }
    inv
}

/// `X' diag(w) X` for a design `X` (samples x coefficients).
pub fn weighted_gram(x: &Array2<f64>, weights: &[f64]) -> Array2<f64> {
    let p = x.ncols();
    let mut g = Array2::<f64>::zeros((p, p));
    for (i, row) in x.rows().into_iter().enumerate() {
        let w = weights[i];
        for j in 0..p {
            for k in 0..=j {
                g[[j, k]] += w * row[j] * row[k];
            }
        }
    }
    for j in 0..p {
        for k in 0..j {
            g[[k, j]] = g[[j, k]];
        }
    }
    g
}

/// `X' diag(w) z`.
pub fn weighted_cross(x: &Array2<f64>, weights: &[f64], z: &[f64]) -> Vec<f64> {
    let p = x.ncols();
    let mut out = vec![0.0; p];
    for (i, row) in x.rows().into_iter().enumerate() {
        let wz = weights[i] * z[i];
        for j in 0..p {
            out[j] += row[j] * wz;
        }
    }
    out
}

/// Ordinary least squares coefficients of `y` on `x`.
pub fn least_squares(x: &Array2<f64>, y: &[f64]) -> Vec<f64> {
    let ones = vec![1.0; x.nrows()];
    solve_spd(&weighted_gram(x, &ones), &weighted_cross(x, &ones, y))
}

/// `X beta` as a plain vector.
pub fn linear_predictor(x: &Array2<f64>, beta: &[f64]) -> Vec<f64> {
    x.rows()
        .into_iter()
        .map(|row| row.iter().zip(beta.iter()).map(|(a, b)| a * b).sum())
        .collect()
}

/// Numerical rank by Householder QR with column pivoting.
///
/// Counts diagonal entries of R above `max(nrow, ncol) * eps * max|diag(R)|`.
pub fn qr_rank(matrix: &Array2<f64>) -> usize {
    let nrow = matrix.nrows();
    let ncol = matrix.ncols();
    let k = nrow.min(ncol);
    let mut r = matrix.to_owned();

    let mut col_norms_sq: Vec<f64> = (0..ncol)
        .map(|j| r.column(j).iter().map(|&v| v * v).sum())
        .collect();

    for step in 0..k {
        let best_col = (step..ncol)
            .max_by(|&a, &b| {
                col_norms_sq[a]
                    .partial_cmp(&col_norms_sq[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(step);

        if best_col != step {
            for i in 0..nrow {
                r.swap([i, step], [i, best_col]);
            }
            col_norms_sq.swap(step, best_col);
        }

        let mut alpha = (step..nrow).map(|i| r[[i, step]] * r[[i, step]]).sum::<f64>().sqrt();
        if alpha < f64::EPSILON * 1e3 {
            break;
        }
        if r[[step, step]] > 0.0 {
            alpha = -alpha;
        }

        let v0 = r[[step, step]] - alpha;
        r[[step, step]] = alpha;

        let v_norm_sq = v0 * v0 + ((step + 1)..nrow).map(|i| r[[i, step]] * r[[i, step]]).sum::<f64>();
        if v_norm_sq < f64::MIN_POSITIVE {
            continue;
        }
        let tau = 2.0 / v_norm_sq;

        for j in (step + 1)..ncol {
            let mut dot = v0 * r[[step, j]];
            for i in (step + 1)..nrow {
                dot += r[[i, step]] * r[[i, j]];
            }
            let scale = tau * dot;
            r[[step, j]] -= scale * v0;
            for i in (step + 1)..nrow {
                r[[i, j]] -= scale * r[[i, step]];
            }
        }

        for j in (step + 1)..ncol {
            col_norms_sq[j] = (col_norms_sq[j] - r[[step, j]] * r[[step, j]]).max(0.0);
        }
    }

    let max_abs_diag = (0..k).map(|i| r[[i, i]].abs()).fold(0.0f64, f64::max);
    let tol = nrow.max(ncol) as f64 * f64::EPSILON * max_abs_diag;
    (0..k).filter(|&i| r[[i, i]].abs() > tol).count()
}
