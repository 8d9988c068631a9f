//! Multinomial logistic regression
//!
//! Class 0 is the reference category with its linear predictor fixed at 0;
//! every other class has an intercept plus one coefficient per feature. The
//! fit maximizes the ridge-penalized log-likelihood by Newton-Raphson with
//! step halving, solving each Newton system by Gaussian elimination.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::utils::error::{Result, StyleSyncError};

/// Newton-Raphson settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogitConfig {
    pub max_iterations: usize,
    /// Stop once the largest parameter update falls below this
    pub tolerance: f64,
    /// L2 penalty on every parameter
    pub ridge: f64,
}

impl Default for LogitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
            ridge: 1e-6,
        }
    }
}

/// Summary of a fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub iterations: usize,
    pub converged: bool,
    /// Penalized log-likelihood at the solution
    pub log_likelihood: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultinomialLogit {
    pub num_classes: usize,
    pub num_features: usize,
    /// One row per non-reference class: `[intercept, w_1 .. w_p]`
    pub coefficients: Vec<Vec<f64>>,
}

impl MultinomialLogit {
    /// Fit on a dense design matrix (without intercept column)
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        num_classes: usize,
        config: &LogitConfig,
    ) -> Result<(Self, FitReport)> {
        if x.is_empty() || x.len() != y.len() {
            return Err(StyleSyncError::Training(format!(
                "design matrix has {} rows for {} targets",
                x.len(),
                y.len()
            )));
        }
        if num_classes < 2 {
            return Err(StyleSyncError::Training(
                "multinomial logit needs at least two classes".to_string(),
            ));
        }
        let num_features = x[0].len();
        if x.iter().any(|row| row.len() != num_features) {
            return Err(StyleSyncError::Training("ragged design matrix".to_string()));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= num_classes) {
            return Err(StyleSyncError::Training(format!(
                "target {bad} outside 0..{num_classes}"
            )));
        }

        let d = num_features + 1;
        let free = num_classes - 1;
        let mut model = Self {
            num_classes,
            num_features,
            coefficients: vec![vec![0.0; d]; free],
        };
        let mut objective = model.penalized_log_likelihood(x, y, config.ridge);
        let mut report = FitReport {
            iterations: 0,
            converged: false,
            log_likelihood: objective,
        };

        for iteration in 1..=config.max_iterations {
            report.iterations = iteration;
            let (gradient, neg_hessian) = model.newton_system(x, y, config.ridge);
            let step = solve(neg_hessian, gradient)?;

            let mut scale = 1.0;
            let mut accepted = false;
            for _ in 0..30 {
                let candidate = model.stepped(&step, scale);
                let candidate_objective = candidate.penalized_log_likelihood(x, y, config.ridge);
                if candidate_objective >= objective - 1e-12 * objective.abs().max(1.0) {
                    model = candidate;
                    objective = candidate_objective;
                    accepted = true;
                    break;
                }
                scale *= 0.5;
            }

            if !accepted {
                break;
            }

            let max_update = step.iter().fold(0.0f64, |m, v| m.max(v.abs())) * scale;
            debug!(
                "logit iteration {}: log-likelihood {:.6}, max update {:.3e}",
                iteration, objective, max_update
            );
            if max_update < config.tolerance {
                report.converged = true;
                break;
            }
        }

        report.log_likelihood = objective;
        if !report.converged {
            warn!(
                "Size model did not converge in {} iterations (log-likelihood {:.4})",
                report.iterations, objective
            );
        }
        Ok((model, report))
    }

    /// Class probabilities for one feature vector
    pub fn probabilities(&self, features: &[f64]) -> Vec<f64> {
        let mut eta = Vec::with_capacity(self.num_classes);
        eta.push(0.0);
        for row in &self.coefficients {
            let linear: f64 = row[0]
                + row[1..]
                    .iter()
                    .zip(features)
                    .map(|(w, v)| w * v)
                    .sum::<f64>();
            eta.push(linear);
        }
        softmax(&eta)
    }

    fn penalized_log_likelihood(&self, x: &[Vec<f64>], y: &[usize], ridge: f64) -> f64 {
        let ll: f64 = x
            .iter()
            .zip(y)
            .map(|(row, &class)| self.probabilities(row)[class].max(f64::MIN_POSITIVE).ln())
            .sum();
        let penalty: f64 = self.coefficients.iter().flatten().map(|b| b * b).sum();
        ll - 0.5 * ridge * penalty
    }

    /// Gradient and negated Hessian of the penalized log-likelihood
    fn newton_system(&self, x: &[Vec<f64>], y: &[usize], ridge: f64) -> (Vec<f64>, Vec<Vec<f64>>) {
        let d = self.num_features + 1;
        let free = self.num_classes - 1;
        let n_params = free * d;
        let mut gradient = vec![0.0; n_params];
        let mut neg_hessian = vec![vec![0.0; n_params]; n_params];
        let mut xi = vec![0.0; d];

        for (row, &class) in x.iter().zip(y) {
            xi[0] = 1.0;
            xi[1..].copy_from_slice(row);
            let p = self.probabilities(row);

            for k in 0..free {
                let observed = if class == k + 1 { 1.0 } else { 0.0 };
                let residual = observed - p[k + 1];
                for a in 0..d {
                    gradient[k * d + a] += residual * xi[a];
                }
                for l in 0..free {
                    let delta = if k == l { 1.0 } else { 0.0 };
                    let w = p[k + 1] * (delta - p[l + 1]);
                    if w == 0.0 {
                        continue;
                    }
                    for a in 0..d {
                        let wa = w * xi[a];
                        let target = &mut neg_hessian[k * d + a];
                        for b in 0..d {
                            target[l * d + b] += wa * xi[b];
                        }
                    }
                }
            }
        }

        for (i, beta) in self.coefficients.iter().flatten().enumerate() {
            gradient[i] -= ridge * beta;
            neg_hessian[i][i] += ridge;
        }
        (gradient, neg_hessian)
    }

    fn stepped(&self, step: &[f64], scale: f64) -> Self {
        let d = self.num_features + 1;
        let coefficients = self
            .coefficients
            .iter()
            .enumerate()
            .map(|(k, row)| {
                row.iter()
                    .enumerate()
                    .map(|(a, beta)| beta + scale * step[k * d + a])
                    .collect()
            })
            .collect();
        Self {
            coefficients,
            ..self.clone()
        }
    }
}

fn softmax(eta: &[f64]) -> Vec<f64> {
    let max = eta.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = eta.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|v| v / total).collect()
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(StyleSyncError::Training("linear system is not square".to_string()));
    }

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(StyleSyncError::Training(format!(
                "singular Newton system at column {col}"
            )));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
