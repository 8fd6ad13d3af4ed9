use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::{
    baseline::{BaselineHazard, SurvivalFunction},
    data::SurvivalData,
    error::{CoxError, Result},
    likelihood::{InformationStrategy, PartialLikelihood, LINEAR_PREDICTOR_CLIP},
    metrics,
    optimization::{self, NewtonConfig, Progress},
    table::TabularSource,
};

/// cox proportional hazards fitter w/ an optional ridge penalty
#[derive(Debug, Clone, Default)]
pub struct CoxFitter {
    penalizer: f64,                       // L2 strength, 0 = plain cox
    max_iterations: Option<usize>,        // newton iteration cap
    tolerance: Option<f64>,               // accepted-step convergence threshold
    initial_point: Option<Array1<f64>>,   // warm start
    covariate_cols: Option<Vec<String>>,  // explicit covariate set
    fitted: Option<FittedModel>,
}

impl CoxFitter {
    /// new fitter w/ defaults (no penalty, max_iter 50, tolerance 1e-7)
    pub fn new() -> Self {
        Self::default()
    }

    /// ridge penalty strength; negative values are clamped to zero
    pub fn with_penalizer(mut self, penalizer: f64) -> Self {
        self.penalizer = penalizer.max(0.0);
        self
    }

    /// max newton iterations before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = Some(max_iter);
        self
    }

    /// how small the accepted step must get for convergence
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = Some(tol);
        self
    }

    /// warm-start coefficients instead of beta = 0
    pub fn with_initial_point(mut self, beta: Array1<f64>) -> Self {
        self.initial_point = Some(beta);
        self
    }

    /// restrict the fit to these covariate columns; the default is every
    /// column other than the duration and event columns
    pub fn with_covariate_columns(mut self, columns: Vec<String>) -> Self {
        self.covariate_cols = Some(columns);
        self
    }

    /// fit the model to labeled tabular data - this does the actual work
    pub fn fit<S: TabularSource>(
        &mut self,
        table: &S,
        duration_col: &str,
        event_col: &str,
    ) -> Result<&FittedModel> {
        self.fit_with_progress(table, duration_col, event_col, None)
    }

    /// fit with an optional per-iteration callback receiving
    /// (iteration, accepted log-likelihood)
    pub fn fit_with_progress<S: TabularSource>(
        &mut self,
        table: &S,
        duration_col: &str,
        event_col: &str,
        progress: Option<Progress<'_>>,
    ) -> Result<&FittedModel> {
        // a failed refit must not leave a stale model behind
        self.fitted = None;

        let data = SurvivalData::from_source(
            table,
            duration_col,
            event_col,
            self.covariate_cols.as_deref(),
        )?;

        let likelihood = PartialLikelihood::new(&data, self.penalizer);
        let config = NewtonConfig {
            max_iterations: self.max_iterations.unwrap_or(NewtonConfig::default().max_iterations),
            tolerance: self.tolerance.unwrap_or(NewtonConfig::default().tolerance),
        };
        let outcome =
            optimization::maximize(&likelihood, self.initial_point.clone(), &config, progress)?;

        // covariance from the observed information at the optimum
        let information = likelihood.information(&outcome.beta, InformationStrategy::Analytic);
        let covariance = optimization::invert_with_jitter(&information);
        let standard_errors = covariance.diag().mapv(|v| v.max(0.0).sqrt());

        let baseline = BaselineHazard::breslow(&data, &outcome.beta);

        let risk_scores = data.covariates().dot(&outcome.beta);
        let log_likelihood = metrics::log_partial_likelihood(&data, risk_scores.view())?;
        // undefined when no pairs are comparable (e.g. everything censored)
        let concordance =
            metrics::concordance_index(risk_scores.view(), data.durations(), data.events())
                .unwrap_or(f64::NAN);

        self.fitted = Some(FittedModel {
            coefficients: outcome.beta,
            standard_errors,
            covariance,
            baseline,
            covariate_names: data.covariate_names().to_vec(),
            penalizer: self.penalizer,
            log_likelihood,
            concordance,
            iterations: outcome.iterations,
            converged: outcome.converged,
        });

        self.fitted()
    }

    /// the fitted model, or ModelNotFitted before the first successful fit
    pub fn fitted(&self) -> Result<&FittedModel> {
        self.fitted.as_ref().ok_or(CoxError::ModelNotFitted)
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// convenience passthrough to the fitted model's survival prediction
    pub fn predict_survival_function<S: TabularSource>(
        &self,
        row: &S,
        times: Option<&[f64]>,
    ) -> Result<SurvivalFunction> {
        self.fitted()?.predict_survival_function(row, times)
    }
}

/// everything fit() learned: coefficients, their uncertainty, and the
/// breslow baseline. immutable once constructed, safe to share for
/// concurrent read-only prediction.
#[derive(Debug, Clone)]
pub struct FittedModel {
    coefficients: Array1<f64>,
    standard_errors: Array1<f64>,
    covariance: Array2<f64>,
    baseline: BaselineHazard,
    covariate_names: Vec<String>,
    penalizer: f64,
    log_likelihood: f64,
    concordance: f64,
    iterations: usize,
    converged: bool,
}

impl FittedModel {
    /// fitted coefficients (betas), in covariate order
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    pub fn standard_errors(&self) -> ArrayView1<'_, f64> {
        self.standard_errors.view()
    }

    pub fn covariance(&self) -> ArrayView2<'_, f64> {
        self.covariance.view()
    }

    /// covariate labels, the ordering contract for prediction rows
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    pub fn baseline(&self) -> &BaselineHazard {
        &self.baseline
    }

    /// ridge strength used at fit time
    pub fn penalizer(&self) -> f64 {
        self.penalizer
    }

    /// unpenalized log partial likelihood at the optimum
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// training-data concordance index (NaN when no pairs are comparable)
    pub fn concordance_index(&self) -> f64 {
        self.concordance
    }

    pub fn aic(&self) -> f64 {
        metrics::aic(self.log_likelihood, self.coefficients.len())
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// pull the fit's covariates out of a one-row table, in fit order
    fn covariate_row<S: TabularSource>(&self, row: &S) -> Result<Array1<f64>> {
        let mut values = Vec::with_capacity(self.covariate_names.len());
        for name in &self.covariate_names {
            let column = row.column(name).ok_or_else(|| {
                CoxError::configuration(format!("prediction row is missing covariate '{}'", name))
            })?;
            let value = column.first().copied().ok_or_else(|| {
                CoxError::configuration(format!("prediction row has no value for '{}'", name))
            })?;
            if value.is_nan() {
                return Err(CoxError::configuration(format!(
                    "prediction row has a missing value for '{}'",
                    name
                )));
            }
            values.push(value);
        }
        Ok(Array1::from(values))
    }

    /// partial hazard exp(x . beta) for one covariate row
    pub fn predict_partial_hazard<S: TabularSource>(&self, row: &S) -> Result<f64> {
        let x = self.covariate_row(row)?;
        let eta = x.dot(&self.coefficients);
        Ok(eta.clamp(-LINEAR_PREDICTOR_CLIP, LINEAR_PREDICTOR_CLIP).exp())
    }

    /// individualized survival curve S(t) = S0(t)^exp(x . beta), over the
    /// baseline event times or over explicit query times (sorted ascending,
    /// step-forward-filled against the baseline)
    pub fn predict_survival_function<S: TabularSource>(
        &self,
        row: &S,
        times: Option<&[f64]>,
    ) -> Result<SurvivalFunction> {
        let risk_score = self.predict_partial_hazard(row)?;

        let (times, survival) = match times {
            None => {
                let times = self.baseline.times().to_vec();
                let survival = self
                    .baseline
                    .survival()
                    .iter()
                    .map(|s| s.powf(risk_score).clamp(0.0, 1.0))
                    .collect();
                (times, survival)
            }
            Some(query) => {
                if query.iter().any(|t| !t.is_finite()) {
                    return Err(CoxError::configuration("query times must be finite"));
                }
                let mut times = query.to_vec();
                times.sort_by(f64::total_cmp);
                let survival = times
                    .iter()
                    .map(|&t| self.baseline.survival_at(t).powf(risk_score).clamp(0.0, 1.0))
                    .collect();
                (times, survival)
            }
        };

        Ok(SurvivalFunction::new(times, survival))
    }

    /// wald summary of the fitted coefficients
    pub fn summary(&self) -> CoxSummary {
        let z_scores = self
            .coefficients
            .iter()
            .zip(self.standard_errors.iter())
            .map(|(&c, &se)| if se > 0.0 { c / se } else { f64::NAN })
            .collect::<Array1<f64>>();
        let p_values = z_scores
            .mapv(|z| if z.is_nan() { f64::NAN } else { 2.0 * (1.0 - normal_cdf(z.abs())) });

        CoxSummary {
            covariates: self.covariate_names.clone(),
            coefficients: self.coefficients.clone(),
            standard_errors: self.standard_errors.clone(),
            hazard_ratios: self.coefficients.mapv(f64::exp),
            z_scores,
            p_values,
            penalizer: self.penalizer,
            log_likelihood: self.log_likelihood,
            concordance: self.concordance,
        }
    }
}

/// per-covariate wald table for a fitted model
#[derive(Debug, Clone)]
pub struct CoxSummary {
    pub covariates: Vec<String>,
    pub coefficients: Array1<f64>,
    pub standard_errors: Array1<f64>,
    pub hazard_ratios: Array1<f64>,
    pub z_scores: Array1<f64>,
    pub p_values: Array1<f64>,
    pub penalizer: f64,
    pub log_likelihood: f64,
    pub concordance: f64,
}

impl CoxSummary {
    /// print out what we learned
    pub fn print(&self) {
        println!("cox proportional hazards model summary");
        println!("======================================");
        println!("penalizer (ridge):  {:.6}", self.penalizer);
        println!("log-likelihood:     {:.6}", self.log_likelihood);
        println!("concordance index:  {:.6}", self.concordance);
        println!();

        println!(
            "{:<16} {:>10} {:>10} {:>12} {:>8} {:>8}",
            "covariate", "coef", "se(coef)", "hazard ratio", "z", "p"
        );
        println!("{:-<68}", "");

        for i in 0..self.coefficients.len() {
            println!(
                "{:<16} {:>10.4} {:>10.4} {:>12.4} {:>8.3} {:>8.4}",
                self.covariates[i],
                self.coefficients[i],
                self.standard_errors[i],
                self.hazard_ratios[i],
                self.z_scores[i],
                self.p_values[i]
            );
        }
    }
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26 polynomial approximation, |error| < 1.5e-7
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    sign * y
}
