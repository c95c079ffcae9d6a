use serde::{Deserialize, Serialize};

use crate::train::TrainError;
use crate::vectorizer::SparseVector;

/// Linear model with L2 penalty, fitted with an intercept.
///
/// Fitting solves the centered normal equations
/// `(Xcᵀ Xc + αI) w = Xcᵀ yc` by conjugate gradients, centering implicitly
/// so the sparse rows are never densified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegressor {
    weights: Vec<f64>,
    intercept: f64,
    alpha: f64,
}

impl RidgeRegressor {
    pub fn fit(
        rows: &[SparseVector],
        targets: &[f64],
        dim: usize,
        alpha: f64,
    ) -> Result<Self, TrainError> {
        if rows.len() != targets.len() {
            return Err(TrainError::ShapeMismatch {
                rows: rows.len(),
                targets: targets.len(),
            });
        }
        let n = rows.len();
        if n == 0 {
            return Err(TrainError::InsufficientData {
                found: 0,
                required: 1,
            });
        }

        let inv_n = 1.0 / n as f64;
        let mut mean_x = vec![0.0; dim];
        for row in rows {
            for (idx, value) in row.iter() {
                if idx < dim {
                    mean_x[idx] += value * inv_n;
                }
            }
        }
        let mean_y = targets.iter().sum::<f64>() * inv_n;
        let centered_y: Vec<f64> = targets.iter().map(|y| y - mean_y).collect();

        let design = Centered {
            rows,
            mean: &mean_x,
        };
        let b = design.transpose_mul(&centered_y);
        let weights = conjugate_gradient(&design, &b, alpha, (n.min(dim) + 1) * 4);

        if weights.iter().any(|w| !w.is_finite()) {
            return Err(TrainError::NonFinite);
        }
        let intercept = mean_y - dot(&mean_x, &weights);
        if !intercept.is_finite() {
            return Err(TrainError::NonFinite);
        }

        Ok(Self {
            weights,
            intercept,
            alpha,
        })
    }

    pub fn predict(&self, features: &SparseVector) -> f64 {
        features.dot_dense(&self.weights) + self.intercept
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[cfg(test)]
    pub(crate) fn from_parts(weights: Vec<f64>, intercept: f64) -> Self {
        Self {
            weights,
            intercept,
            alpha: 1.0,
        }
    }
}

/// Sparse design matrix with its column means subtracted on the fly.
struct Centered<'a> {
    rows: &'a [SparseVector],
    mean: &'a [f64],
}

impl Centered<'_> {
    fn mul(&self, v: &[f64]) -> Vec<f64> {
        let shift = dot(self.mean, v);
        self.rows.iter().map(|row| row.dot_dense(v) - shift).collect()
    }

    fn transpose_mul(&self, u: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.mean.len()];
        for (row, weight) in self.rows.iter().zip(u) {
            for (idx, value) in row.iter() {
                if let Some(slot) = out.get_mut(idx) {
                    *slot += value * weight;
                }
            }
        }
        let total: f64 = u.iter().sum();
        for (slot, mean) in out.iter_mut().zip(self.mean) {
            *slot -= mean * total;
        }
        out
    }
}

fn conjugate_gradient(design: &Centered<'_>, b: &[f64], alpha: f64, max_iter: usize) -> Vec<f64> {
    let dim = b.len();
    let mut w = vec![0.0; dim];
    let mut r = b.to_vec();
    let mut p = r.clone();
    let mut rs_old = dot(&r, &r);
    let tol = 1e-10 * dot(b, b).sqrt().max(1.0);

    for _ in 0..max_iter.max(1) {
        if rs_old.sqrt() <= tol {
            break;
        }
        let mut ap = design.transpose_mul(&design.mul(&p));
        for (slot, pi) in ap.iter_mut().zip(&p) {
            *slot += alpha * pi;
        }
        let denom = dot(&p, &ap);
        if denom <= 0.0 {
            break;
        }
        let step = rs_old / denom;
        for i in 0..dim {
            w[i] += step * p[i];
            r[i] -= step * ap[i];
        }
        let rs_new = dot(&r, &r);
        let beta = rs_new / rs_old;
        for i in 0..dim {
            p[i] = r[i] + beta * p[i];
        }
        rs_old = rs_new;
    }
    w
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
