use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{CoxError, Result};
use crate::table::TabularSource;

/// contiguous run of equal durations after the ascending sort. the risk set
/// for this time is the index suffix `start..n`, events are the flagged rows
/// inside `start..end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBlock {
    pub time: f64,
    pub start: usize,
    pub end: usize,
    pub n_events: usize,
}

/// survival data sorted ascending by duration - durations, event flags, and
/// the covariate matrix, plus the tie blocks every later stage iterates over
#[derive(Debug, Clone)]
pub struct SurvivalData {
    durations: Array1<f64>,
    events: Vec<bool>,
    covariates: Array2<f64>,
    covariate_names: Vec<String>,
    blocks: Vec<TimeBlock>,
}

impl SurvivalData {
    /// build from raw arrays; rows are re-ordered by duration (stable sort)
    pub fn new(
        durations: Vec<f64>,
        events: Vec<bool>,
        covariates: Array2<f64>,
        covariate_names: Vec<String>,
    ) -> Result<Self> {
        let n_samples = durations.len();

        if n_samples == 0 {
            return Err(CoxError::invalid_survival_data("need at least one observation"));
        }
        if events.len() != n_samples {
            return Err(CoxError::invalid_survival_data(format!(
                "durations len ({}) != events len ({})",
                n_samples,
                events.len()
            )));
        }
        if covariates.nrows() != n_samples {
            return Err(CoxError::invalid_survival_data(format!(
                "covariates rows ({}) != n_samples ({})",
                covariates.nrows(),
                n_samples
            )));
        }
        if covariate_names.len() != covariates.ncols() {
            return Err(CoxError::invalid_survival_data(format!(
                "covariate names ({}) != covariate columns ({})",
                covariate_names.len(),
                covariates.ncols()
            )));
        }
        if durations.iter().any(|&t| !t.is_finite() || t < 0.0) {
            return Err(CoxError::invalid_survival_data(
                "durations must be finite and non-negative",
            ));
        }

        let mut order: Vec<usize> = (0..n_samples).collect();
        order.sort_by(|&i, &j| durations[i].total_cmp(&durations[j]));

        let sorted_durations: Vec<f64> = order.iter().map(|&i| durations[i]).collect();
        let sorted_events: Vec<bool> = order.iter().map(|&i| events[i]).collect();
        let sorted_covariates = covariates.select(ndarray::Axis(0), &order);

        let blocks = build_blocks(&sorted_durations, &sorted_events);

        Ok(Self {
            durations: Array1::from(sorted_durations),
            events: sorted_events,
            covariates: sorted_covariates,
            covariate_names,
            blocks,
        })
    }

    /// extract sorted (T, E, X) from a labeled table. `covariate_cols = None`
    /// takes every column other than the duration and event columns. rows
    /// with a NaN in any required column are dropped before sorting.
    pub fn from_source<S: TabularSource>(
        source: &S,
        duration_col: &str,
        event_col: &str,
        covariate_cols: Option<&[String]>,
    ) -> Result<Self> {
        let names = source.column_names();

        let durations_raw = source.column(duration_col).ok_or_else(|| {
            CoxError::configuration(format!("duration column '{}' not found", duration_col))
        })?;
        let events_raw = source.column(event_col).ok_or_else(|| {
            CoxError::configuration(format!("event column '{}' not found", event_col))
        })?;

        let covariate_names: Vec<String> = match covariate_cols {
            Some(cols) => {
                for col in cols {
                    if col == duration_col || col == event_col {
                        return Err(CoxError::configuration(format!(
                            "'{}' cannot be both a covariate and the duration/event column",
                            col
                        )));
                    }
                    if !names.contains(col) {
                        return Err(CoxError::configuration(format!(
                            "covariate column '{}' not found",
                            col
                        )));
                    }
                }
                cols.to_vec()
            }
            None => names
                .iter()
                .filter(|n| n.as_str() != duration_col && n.as_str() != event_col)
                .cloned()
                .collect(),
        };

        if covariate_names.is_empty() {
            return Err(CoxError::configuration("no covariate columns remain"));
        }

        let covariate_columns: Vec<Vec<f64>> = covariate_names
            .iter()
            .map(|name| {
                source.column(name).ok_or_else(|| {
                    CoxError::configuration(format!("covariate column '{}' not found", name))
                })
            })
            .collect::<Result<_>>()?;

        // drop rows with a missing duration, event, or covariate value
        let n_rows = source.n_rows();
        let mut durations = Vec::with_capacity(n_rows);
        let mut events = Vec::with_capacity(n_rows);
        let mut rows = Vec::with_capacity(n_rows * covariate_names.len());

        for i in 0..n_rows {
            let t = durations_raw[i];
            let e = events_raw[i];
            if t.is_nan() || e.is_nan() || covariate_columns.iter().any(|c| c[i].is_nan()) {
                continue;
            }
            durations.push(t);
            events.push(e != 0.0);
            rows.extend(covariate_columns.iter().map(|c| c[i]));
        }

        if durations.is_empty() {
            return Err(CoxError::configuration(
                "no usable rows remain after dropping missing values",
            ));
        }

        let n_kept = durations.len();
        let covariates = Array2::from_shape_vec((n_kept, covariate_names.len()), rows)
            .map_err(|e| CoxError::invalid_survival_data(e.to_string()))?;

        Self::new(durations, events, covariates, covariate_names)
    }

    pub fn n_samples(&self) -> usize {
        self.durations.len()
    }

    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    /// total number of observed events
    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    /// sorted durations
    pub fn durations(&self) -> ArrayView1<'_, f64> {
        self.durations.view()
    }

    /// event indicators (true = event, false = censored), in sorted order
    pub fn events(&self) -> &[bool] {
        &self.events
    }

    /// covariate matrix, rows in sorted order
    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    /// covariate labels; the ordering contract between fit and predict
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    /// tie blocks over unique durations, ascending
    pub fn blocks(&self) -> &[TimeBlock] {
        &self.blocks
    }

    /// indices still at risk at time t: everyone with duration >= t.
    /// equality is exact, matching the Breslow tie policy.
    pub fn at_risk(&self, t: f64) -> std::ops::Range<usize> {
        let slice = self.durations.as_slice().unwrap_or(&[]);
        let start = slice.partition_point(|&d| d < t);
        start..self.n_samples()
    }

    /// indices with an event exactly at time t
    pub fn events_at(&self, t: f64) -> Vec<usize> {
        self.at_risk(t)
            .filter(|&i| self.durations[i] == t && self.events[i])
            .collect()
    }

    /// sorted unique durations with at least one event
    pub fn event_times(&self) -> Vec<f64> {
        self.blocks
            .iter()
            .filter(|b| b.n_events > 0)
            .map(|b| b.time)
            .collect()
    }
}

fn build_blocks(durations: &[f64], events: &[bool]) -> Vec<TimeBlock> {
    let mut blocks = Vec::new();
    let n = durations.len();
    let mut start = 0;
    while start < n {
        let time = durations[start];
        let mut end = start + 1;
        while end < n && durations[end] == time {
            end += 1;
        }
        let n_events = events[start..end].iter().filter(|&&e| e).count();
        blocks.push(TimeBlock { time, start, end, n_events });
        start = end;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MemTable;

    fn create_test_data() -> SurvivalData {
        let durations = vec![3.0, 1.0, 4.0, 2.0, 5.0];
        let events = vec![true, true, true, false, false];
        let covariates = Array2::from_shape_vec(
            (5, 2),
            vec![
                5.0, 6.0, //
                1.0, 2.0, //
                7.0, 8.0, //
                3.0, 4.0, //
                9.0, 10.0,
            ],
        )
        .unwrap();
        let names = vec!["a".to_string(), "b".to_string()];

        SurvivalData::new(durations, events, covariates, names).unwrap()
    }

    #[test]
    fn test_sorted_on_construction() {
        let data = create_test_data();
        assert_eq!(data.n_samples(), 5);
        assert_eq!(data.n_features(), 2);
        assert_eq!(data.durations().to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(data.events(), &[true, false, true, true, false]);
        // covariates re-ordered with their rows
        assert_eq!(data.covariates()[[0, 0]], 1.0);
        assert_eq!(data.covariates()[[2, 0]], 5.0);
        assert_eq!(data.event_times(), vec![1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_risk_and_event_sets() {
        let data = create_test_data();
        assert_eq!(data.at_risk(3.0), 2..5);
        assert_eq!(data.at_risk(0.5), 0..5);
        assert_eq!(data.at_risk(6.0), 5..5);
        assert_eq!(data.events_at(3.0), vec![2]);
        // censored at t=2, so no event indices there
        assert_eq!(data.events_at(2.0), Vec::<usize>::new());
    }

    #[test]
    fn test_tied_durations_share_a_block() {
        let durations = vec![5.0, 5.0, 5.0, 7.0];
        let events = vec![true, true, false, true];
        let covariates = Array2::zeros((4, 1));
        let data =
            SurvivalData::new(durations, events, covariates, vec!["x".to_string()]).unwrap();

        assert_eq!(data.blocks().len(), 2);
        let first = data.blocks()[0];
        assert_eq!(first.time, 5.0);
        assert_eq!((first.start, first.end), (0, 3));
        assert_eq!(first.n_events, 2);
        assert_eq!(data.events_at(5.0), vec![0, 1]);
    }

    #[test]
    fn test_invalid_durations() {
        let covariates = Array2::zeros((2, 1));
        let names = vec!["x".to_string()];
        let negative = SurvivalData::new(
            vec![-1.0, 2.0],
            vec![true, false],
            covariates.clone(),
            names.clone(),
        );
        assert!(negative.is_err());

        // t = 0 is allowed
        let zero = SurvivalData::new(vec![0.0, 2.0], vec![true, false], covariates, names);
        assert!(zero.is_ok());
    }

    #[test]
    fn test_from_source_drops_missing_rows() {
        let table = MemTable::new()
            .with_column("t", vec![2.0, 1.0, f64::NAN, 4.0])
            .unwrap()
            .with_column("e", vec![1.0, 0.0, 1.0, 1.0])
            .unwrap()
            .with_column("x", vec![0.5, f64::NAN, 1.0, -0.5])
            .unwrap();

        let data = SurvivalData::from_source(&table, "t", "e", None).unwrap();
        assert_eq!(data.n_samples(), 2);
        assert_eq!(data.durations().to_vec(), vec![2.0, 4.0]);
        assert_eq!(data.covariate_names(), &["x".to_string()]);
    }

    #[test]
    fn test_from_source_missing_column() {
        let table = MemTable::new()
            .with_column("t", vec![1.0])
            .unwrap()
            .with_column("x", vec![0.5])
            .unwrap();

        let err = SurvivalData::from_source(&table, "t", "event", None).unwrap_err();
        assert!(matches!(err, CoxError::Configuration { .. }));
    }

    #[test]
    fn test_from_source_no_covariates() {
        let table = MemTable::new()
            .with_column("t", vec![1.0])
            .unwrap()
            .with_column("e", vec![1.0])
            .unwrap();

        let err = SurvivalData::from_source(&table, "t", "e", None).unwrap_err();
        assert!(matches!(err, CoxError::Configuration { .. }));
    }
}
