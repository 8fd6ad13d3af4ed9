//! narrow seam between the regression core and whatever tabular library
//! holds the caller's data - the core only ever asks for a column by name.

use crate::error::{CoxError, Result};

/// column-by-name access to labeled float data. `NaN` marks a missing value;
/// rows with missing required values are dropped during data preparation.
pub trait TabularSource {
    /// number of rows in the table
    fn n_rows(&self) -> usize;

    /// column labels in table order
    fn column_names(&self) -> Vec<String>;

    /// extract one column as floats, or `None` if the name is unknown
    fn column(&self, name: &str) -> Option<Vec<f64>>;
}

/// simple in-memory column table - enough for tests, demos, and callers
/// without a data-frame library
#[derive(Debug, Clone, Default)]
pub struct MemTable {
    columns: Vec<(String, Vec<f64>)>,
}

impl MemTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// append a named column; every column must have the same length
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if let Some((first_name, first)) = self.columns.first() {
            if first.len() != values.len() {
                return Err(CoxError::invalid_survival_data(format!(
                    "column '{}' has {} rows but '{}' has {}",
                    name,
                    values.len(),
                    first_name,
                    first.len()
                )));
            }
        }
        if self.columns.iter().any(|(n, _)| n == &name) {
            return Err(CoxError::configuration(format!("duplicate column '{}'", name)));
        }
        self.columns.push((name, values));
        Ok(self)
    }

    /// one-row table, handy for prediction queries
    pub fn row(names: &[&str], values: &[f64]) -> Result<Self> {
        if names.len() != values.len() {
            return Err(CoxError::configuration(format!(
                "row has {} names but {} values",
                names.len(),
                values.len()
            )));
        }
        let mut table = Self::new();
        for (name, &value) in names.iter().zip(values.iter()) {
            table = table.with_column(*name, vec![value])?;
        }
        Ok(table)
    }
}

impl TabularSource for MemTable {
    fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, v)| v.len())
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    fn column(&self, name: &str) -> Option<Vec<f64>> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lookup() {
        let table = MemTable::new()
            .with_column("t", vec![1.0, 2.0])
            .unwrap()
            .with_column("e", vec![1.0, 0.0])
            .unwrap();

        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column_names(), vec!["t".to_string(), "e".to_string()]);
        assert_eq!(table.column("e"), Some(vec![1.0, 0.0]));
        assert_eq!(table.column("missing"), None);
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let result = MemTable::new()
            .with_column("t", vec![1.0, 2.0])
            .unwrap()
            .with_column("e", vec![1.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = MemTable::new()
            .with_column("t", vec![1.0])
            .unwrap()
            .with_column("t", vec![2.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_single_row() {
        let row = MemTable::row(&["age", "treatment"], &[60.0, 1.0]).unwrap();
        assert_eq!(row.n_rows(), 1);
        assert_eq!(row.column("age"), Some(vec![60.0]));
    }
}
