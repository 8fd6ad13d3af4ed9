use ndarray::ArrayView1;

use crate::data::SurvivalData;
use crate::error::{CoxError, Result};

/// Harrell's concordance index: among comparable pairs, how often does the
/// higher risk score go with the shorter survival? ties at the risk score
/// count one half.
pub fn concordance_index(
    risk_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: &[bool],
) -> Result<f64> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(CoxError::invalid_survival_data(
            "risk scores, times, and events must have same length",
        ));
    }

    let mut concordant = 0.0;
    let mut discordant = 0.0;
    let mut tied_risk = 0.0;

    for i in 0..n {
        if !events[i] {
            continue; // censored rows cannot anchor a comparison
        }

        for j in 0..n {
            if i == j {
                continue;
            }

            // j is comparable if it outlived i (event later, or censored no earlier)
            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                if risk_scores[i] > risk_scores[j] {
                    concordant += 1.0;
                } else if risk_scores[i] < risk_scores[j] {
                    discordant += 1.0;
                } else {
                    tied_risk += 1.0;
                }
            }
        }
    }

    let total = concordant + discordant + tied_risk;
    if total == 0.0 {
        return Err(CoxError::invalid_survival_data(
            "no comparable pairs for concordance calc",
        ));
    }

    Ok((concordant + 0.5 * tied_risk) / total)
}

/// unpenalized Breslow log partial likelihood of precomputed risk scores,
/// via log-sum-exp over each risk set
pub fn log_partial_likelihood(data: &SurvivalData, risk_scores: ArrayView1<f64>) -> Result<f64> {
    if risk_scores.len() != data.n_samples() {
        return Err(CoxError::invalid_survival_data(
            "risk scores length must match number of samples",
        ));
    }

    let events = data.events();
    let mut loglik = 0.0;

    for block in data.blocks() {
        if block.n_events == 0 {
            continue;
        }

        let risk_set = block.start..data.n_samples();
        let max_score = risk_set
            .clone()
            .map(|i| risk_scores[i])
            .fold(f64::NEG_INFINITY, f64::max);
        let log_sum_exp = max_score
            + risk_set
                .map(|i| (risk_scores[i] - max_score).exp())
                .sum::<f64>()
                .ln();

        for i in block.start..block.end {
            if events[i] {
                loglik += risk_scores[i] - log_sum_exp;
            }
        }
    }

    Ok(loglik)
}

/// Akaike information criterion
pub fn aic(log_likelihood: f64, n_parameters: usize) -> f64 {
    2.0 * n_parameters as f64 - 2.0 * log_likelihood
}
