use ndarray::{Array1, Array2};

use crate::error::{CoxError, Result};
use crate::likelihood::PartialLikelihood;

/// maximum number of step halvings in the backtracking line search
const MAX_HALVINGS: usize = 30;

/// fractional step accepted when no halving improves the likelihood, so the
/// iteration cannot stall on a flat or awkward surface
const FALLBACK_STEP: f64 = 1e-4;

/// largest relative diagonal jitter tried before giving up on a solve
const MAX_JITTER: f64 = 1e6;

/// Newton iteration controls
#[derive(Debug, Clone)]
pub struct NewtonConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self { max_iterations: 50, tolerance: 1e-7 }
    }
}

/// result of a Newton maximization
#[derive(Debug, Clone)]
pub struct NewtonOutcome {
    pub beta: Array1<f64>,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// per-iteration progress callback: (iteration, accepted log-likelihood)
pub type Progress<'a> = &'a mut dyn FnMut(usize, f64);

/// maximize the penalized log partial likelihood with Newton steps and a
/// backtracking line search. always terminates within `max_iterations`;
/// singular information matrices fall back to a jittered solve rather than
/// aborting the fit.
pub fn maximize(
    likelihood: &PartialLikelihood,
    initial: Option<Array1<f64>>,
    config: &NewtonConfig,
    mut progress: Option<Progress>,
) -> Result<NewtonOutcome> {
    let p = likelihood.n_features();

    let mut beta = match initial {
        Some(start) => {
            if start.len() != p {
                return Err(CoxError::configuration(format!(
                    "initial point has {} coefficients but data has {} covariates",
                    start.len(),
                    p
                )));
            }
            start
        }
        None => Array1::zeros(p),
    };

    let mut current = likelihood.log_likelihood(&beta);
    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let eval = likelihood.evaluate(&beta);
        let delta = solve_with_jitter(&eval.information, &eval.gradient);

        // backtracking: halve alpha until the likelihood improves
        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_HALVINGS {
            let candidate = &beta + &(alpha * &delta);
            let candidate_ll = likelihood.log_likelihood(&candidate);
            if candidate_ll > current {
                accepted = Some((candidate, candidate_ll, alpha));
                break;
            }
            alpha *= 0.5;
        }

        let (new_beta, new_ll, step_scale) = match accepted {
            Some(found) => found,
            None => {
                // no halving improved: take a small fixed fraction of the step
                let candidate = &beta + &(FALLBACK_STEP * &delta);
                let candidate_ll = likelihood.log_likelihood(&candidate);
                (candidate, candidate_ll, FALLBACK_STEP)
            }
        };

        let step_max = delta.iter().fold(0.0_f64, |acc, d| acc.max((step_scale * d).abs()));

        beta = new_beta;
        current = new_ll;

        log::debug!(
            "newton iteration {}: log-likelihood {:.6}, step scale {:.2e}, max step {:.2e}",
            iterations,
            current,
            step_scale,
            step_max
        );
        if let Some(callback) = progress.as_mut() {
            callback(iterations, current);
        }

        if step_max < config.tolerance {
            converged = true;
            break;
        }
    }

    if converged {
        log::info!(
            "newton converged after {} iteration(s), log-likelihood {:.6}",
            iterations,
            current
        );
    } else {
        log::info!(
            "newton stopped at max_iterations ({}), log-likelihood {:.6}",
            iterations,
            current
        );
    }

    Ok(NewtonOutcome { beta, log_likelihood: current, iterations, converged })
}

/// solve `a x = b`, adding escalating ridge jitter to the diagonal when the
/// system is singular. the information matrix is symmetric PSD, so some
/// jitter level always yields a solvable system; if every level fails the
/// step degenerates to zero and the caller converges in place.
pub(crate) fn solve_with_jitter(a: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let scale = diagonal_scale(a);

    let mut jitter = 0.0;
    loop {
        let attempt = jittered(a, jitter * scale);
        if let Some(solution) = solve_linear_system(&attempt, b) {
            if jitter > 0.0 {
                log::debug!("singular information matrix, solved with jitter {:.1e}", jitter);
            }
            return solution;
        }
        jitter = if jitter == 0.0 { 1e-9 } else { jitter * 10.0 };
        if jitter > MAX_JITTER {
            log::debug!("linear solve failed at every jitter level, taking zero step");
            return Array1::zeros(b.len());
        }
    }
}

/// invert a symmetric matrix with the same jitter fallback; used for the
/// covariance of the coefficient estimates
pub(crate) fn invert_with_jitter(a: &Array2<f64>) -> Array2<f64> {
    let scale = diagonal_scale(a);

    let mut jitter = 0.0;
    loop {
        let attempt = jittered(a, jitter * scale);
        if let Some(inverse) = invert_matrix(&attempt) {
            if jitter > 0.0 {
                log::debug!("singular information matrix, inverted with jitter {:.1e}", jitter);
            }
            return inverse;
        }
        jitter = if jitter == 0.0 { 1e-9 } else { jitter * 10.0 };
        if jitter > MAX_JITTER {
            log::debug!("inversion failed at every jitter level, returning zero covariance");
            return Array2::zeros(a.raw_dim());
        }
    }
}

fn diagonal_scale(a: &Array2<f64>) -> f64 {
    let max_diag = a.diag().iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
    if max_diag > 0.0 { max_diag } else { 1.0 }
}

fn jittered(a: &Array2<f64>, amount: f64) -> Array2<f64> {
    let mut out = a.clone();
    if amount > 0.0 {
        for i in 0..out.nrows() {
            out[[i, i]] += amount;
        }
    }
    out
}

/// Gaussian elimination with partial pivoting; `None` when a pivot collapses
fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    if n == 0 {
        return Some(Array1::zeros(0));
    }

    let mut a = a.clone();
    let mut b = b.clone();

    // forward elimination
    for i in 0..n {
        let mut max_row = i;
        for k in i + 1..n {
            if a[[k, i]].abs() > a[[max_row, i]].abs() {
                max_row = k;
            }
        }

        if a[[max_row, i]].abs() < 1e-12 {
            return None;
        }

        if max_row != i {
            for j in 0..n {
                a.swap([i, j], [max_row, j]);
            }
            b.swap(i, max_row);
        }

        for k in i + 1..n {
            let factor = a[[k, i]] / a[[i, i]];
            for j in i..n {
                a[[k, j]] -= factor * a[[i, j]];
            }
            b[k] -= factor * b[i];
        }
    }

    // back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = b[i];
        for j in i + 1..n {
            x[i] -= a[[i, j]] * x[j];
        }
        x[i] /= a[[i, i]];
    }

    Some(x)
}

/// Gauss-Jordan inversion with partial pivoting; `None` when singular
fn invert_matrix(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return None;
    }

    let mut a = a.clone();
    let mut inv = Array2::eye(n);

    for i in 0..n {
        let mut max_row = i;
        for k in i + 1..n {
            if a[[k, i]].abs() > a[[max_row, i]].abs() {
                max_row = k;
            }
        }

        if a[[max_row, i]].abs() < 1e-12 {
            return None;
        }

        if max_row != i {
            for j in 0..n {
                a.swap([i, j], [max_row, j]);
                inv.swap([i, j], [max_row, j]);
            }
        }

        let pivot = a[[i, i]];
        for j in 0..n {
            a[[i, j]] /= pivot;
            inv[[i, j]] /= pivot;
        }

        for k in 0..n {
            if k == i {
                continue;
            }
            let factor = a[[k, i]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[[k, j]] -= factor * a[[i, j]];
                inv[[k, j]] -= factor * inv[[i, j]];
            }
        }
    }

    Some(inv)
}
