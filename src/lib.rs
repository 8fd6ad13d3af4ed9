//! # coxph
//!
//! cox proportional hazards regression w/ breslow ties - survival analysis made easy
//!
//! ## what you get
//!
//! - cox regression fit by damped newton-raphson
//! - optional ridge penalty for wobbly problems
//! - breslow baseline hazard + per-subject survival curves
//! - wald summary table (coef, se, hazard ratio, z, p)
//! - concordance index and log-likelihood diagnostics
//!
//! ## quick start
//!
//! ```rust
//! use coxph::{CoxFitter, MemTable};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // setup some survival data
//! let table = MemTable::new()
//!     .with_column("time", vec![1.0, 2.5, 3.2, 4.1])?
//!     .with_column("event", vec![1.0, 0.0, 1.0, 1.0])? // 1 = died, 0 = censored
//!     .with_column("age", vec![1.0, 2.0, 1.5, 3.0])?
//!     .with_column("dose", vec![0.5, 1.0, 0.0, 1.5])?;
//!
//! // fit w/ a little ridge to keep things tame
//! let mut fitter = CoxFitter::new().with_penalizer(0.1);
//! let model = fitter.fit(&table, "time", "event")?;
//!
//! // predicted survival curve for a new subject
//! let subject = MemTable::row(&["age", "dose"], &[2.0, 0.5])?;
//! let curve = model.predict_survival_function(&subject, None)?;
//! for (t, s) in curve.iter() {
//!     println!("S({t}) = {s:.3}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod baseline;
pub mod data;
pub mod error;
pub mod likelihood;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod table;

pub use baseline::{BaselineHazard, SurvivalFunction};
pub use data::SurvivalData;
pub use error::{CoxError, Result};
pub use likelihood::{InformationStrategy, PartialLikelihood, LINEAR_PREDICTOR_CLIP};
pub use model::{CoxFitter, CoxSummary, FittedModel};
pub use optimization::{NewtonConfig, NewtonOutcome};
pub use table::{MemTable, TabularSource};
