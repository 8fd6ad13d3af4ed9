use ndarray::Array1;

use crate::data::SurvivalData;
use crate::likelihood::LINEAR_PREDICTOR_CLIP;

/// Breslow baseline cumulative hazard and survival step functions, defined
/// over the unique event times. lookups are forward-filled: the value at the
/// largest event time <= t, with H0 = 0 / S0 = 1 before the first event.
#[derive(Debug, Clone)]
pub struct BaselineHazard {
    times: Vec<f64>,
    cumulative_hazard: Vec<f64>,
    survival: Vec<f64>,
}

impl BaselineHazard {
    /// Breslow estimator at the fitted coefficients: at each unique event
    /// time the cumulative hazard grows by d(t) / S0(t), with S0 the
    /// risk-score sum over the full risk set. with no events at all the
    /// baseline degenerates to the single point (t=0, H0=0, S0=1).
    pub fn breslow(data: &SurvivalData, beta: &Array1<f64>) -> Self {
        let x = data.covariates();

        // descending sweep: risk-score sum grows as blocks join the risk set
        let mut s0 = 0.0;
        let mut increments = Vec::new();
        for block in data.blocks().iter().rev() {
            for i in block.start..block.end {
                let eta = x
                    .row(i)
                    .dot(beta)
                    .clamp(-LINEAR_PREDICTOR_CLIP, LINEAR_PREDICTOR_CLIP);
                s0 += eta.exp();
            }
            if block.n_events == 0 || s0 <= 0.0 {
                continue;
            }
            increments.push((block.time, block.n_events as f64 / s0));
        }

        if increments.is_empty() {
            return Self { times: vec![0.0], cumulative_hazard: vec![0.0], survival: vec![1.0] };
        }

        increments.reverse();
        let mut times = Vec::with_capacity(increments.len());
        let mut cumulative_hazard = Vec::with_capacity(increments.len());
        let mut survival = Vec::with_capacity(increments.len());
        let mut h0 = 0.0;
        for (time, increment) in increments {
            h0 += increment;
            times.push(time);
            cumulative_hazard.push(h0);
            survival.push((-h0).exp().clamp(0.0, 1.0));
        }

        Self { times, cumulative_hazard, survival }
    }

    /// event times the step functions are defined on
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn cumulative_hazard(&self) -> &[f64] {
        &self.cumulative_hazard
    }

    pub fn survival(&self) -> &[f64] {
        &self.survival
    }

    /// index of the step in effect at time t, or `None` before the first step
    fn step_index(&self, t: f64) -> Option<usize> {
        let after = self.times.partition_point(|&time| time <= t);
        after.checked_sub(1)
    }

    /// H0(t), forward-filled
    pub fn cumulative_hazard_at(&self, t: f64) -> f64 {
        self.step_index(t).map_or(0.0, |i| self.cumulative_hazard[i])
    }

    /// S0(t), forward-filled; 1 before the first event time
    pub fn survival_at(&self, t: f64) -> f64 {
        self.step_index(t).map_or(1.0, |i| self.survival[i])
    }
}

/// one subject's predicted survival curve: ordered times paired with
/// survival probabilities in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalFunction {
    times: Vec<f64>,
    survival: Vec<f64>,
}

impl SurvivalFunction {
    pub(crate) fn new(times: Vec<f64>, survival: Vec<f64>) -> Self {
        Self { times, survival }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn survival(&self) -> &[f64] {
        &self.survival
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// (time, survival) pairs in time order
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.survival.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_breslow_increments() {
        // three subjects, events at 1 and 3, censored at 2
        let durations = vec![1.0, 2.0, 3.0];
        let events = vec![true, false, true];
        let covariates = Array2::from_shape_vec((3, 1), vec![0.0, 0.0, 0.0]).unwrap();
        let data =
            SurvivalData::new(durations, events, covariates, vec!["x".to_string()]).unwrap();

        let baseline = BaselineHazard::breslow(&data, &array![0.0]);
        assert_eq!(baseline.times(), &[1.0, 3.0]);
        // beta = 0 so every risk score is 1: increments 1/3 then 1/1
        assert_relative_eq!(baseline.cumulative_hazard()[0], 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(baseline.cumulative_hazard()[1], 1.0 / 3.0 + 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_monotone_and_bounded() {
        let durations = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let events = vec![true, true, false, true, true];
        let covariates =
            Array2::from_shape_vec((5, 1), vec![0.5, -0.5, 1.0, 0.0, -1.0]).unwrap();
        let data =
            SurvivalData::new(durations, events, covariates, vec!["x".to_string()]).unwrap();

        let baseline = BaselineHazard::breslow(&data, &array![0.3]);
        let hazard = baseline.cumulative_hazard();
        let survival = baseline.survival();
        assert!(hazard.windows(2).all(|w| w[1] >= w[0]));
        assert!(survival.windows(2).all(|w| w[1] <= w[0]));
        assert!(survival.iter().all(|&s| (0.0..=1.0).contains(&s)));
    }

    #[test]
    fn test_forward_filled_lookup() {
        let durations = vec![2.0, 4.0];
        let events = vec![true, true];
        let covariates = Array2::zeros((2, 1));
        let data =
            SurvivalData::new(durations, events, covariates, vec!["x".to_string()]).unwrap();
        let baseline = BaselineHazard::breslow(&data, &array![0.0]);

        // before the first event time
        assert_eq!(baseline.survival_at(1.0), 1.0);
        assert_eq!(baseline.cumulative_hazard_at(1.0), 0.0);
        // between steps: value of the earlier step
        assert_relative_eq!(
            baseline.cumulative_hazard_at(3.0),
            baseline.cumulative_hazard()[0],
            epsilon = 1e-12
        );
        // past the last step: last value
        assert_relative_eq!(
            baseline.survival_at(100.0),
            baseline.survival()[1],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_all_censored_degenerates() {
        let durations = vec![1.0, 2.0];
        let events = vec![false, false];
        let covariates = Array2::zeros((2, 1));
        let data =
            SurvivalData::new(durations, events, covariates, vec!["x".to_string()]).unwrap();

        let baseline = BaselineHazard::breslow(&data, &array![0.0]);
        assert_eq!(baseline.times(), &[0.0]);
        assert_eq!(baseline.cumulative_hazard(), &[0.0]);
        assert_eq!(baseline.survival(), &[1.0]);
        assert_eq!(baseline.survival_at(10.0), 1.0);
    }
}
