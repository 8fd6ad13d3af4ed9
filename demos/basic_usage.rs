//! walk-through of the whole pipeline: build a table, fit, inspect the
//! summary, and predict survival curves for a couple of subjects.
//!
//! run with `RUST_LOG=debug` to watch the newton iterations.

use coxph::{CoxFitter, MemTable};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("=== cox proportional hazards demo ===\n");

    // a small synthetic study: age and treatment arm against survival time
    let table = MemTable::new()
        .with_column(
            "weeks",
            vec![5.0, 8.0, 12.0, 16.0, 23.0, 27.0, 30.0, 33.0, 43.0, 45.0, 48.0, 51.0],
        )?
        .with_column(
            "died",
            vec![1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0],
        )?
        .with_column(
            "age",
            vec![67.0, 72.0, 58.0, 49.0, 63.0, 70.0, 52.0, 61.0, 44.0, 66.0, 50.0, 47.0],
        )?
        .with_column(
            "treatment",
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0],
        )?;

    // fit with a touch of ridge, printing the likelihood as it climbs
    let mut fitter = CoxFitter::new().with_penalizer(0.01);
    let mut report = |iter: usize, ll: f64| {
        println!("  iteration {:>2}: log-likelihood {:.6}", iter, ll);
    };
    let model = fitter.fit_with_progress(&table, "weeks", "died", Some(&mut report))?;

    println!(
        "\nconverged: {} ({} iterations)\n",
        model.converged(),
        model.iterations()
    );

    model.summary().print();

    println!("\nconcordance index: {:.4}", model.concordance_index());
    println!("aic:               {:.4}", model.aic());

    // predicted survival for an older untreated subject vs a younger treated one
    let high_risk = MemTable::row(&["age", "treatment"], &[70.0, 0.0])?;
    let low_risk = MemTable::row(&["age", "treatment"], &[48.0, 1.0])?;

    let query_times = [10.0, 20.0, 30.0, 40.0, 50.0];
    let high_curve = model.predict_survival_function(&high_risk, Some(&query_times))?;
    let low_curve = model.predict_survival_function(&low_risk, Some(&query_times))?;

    println!("\n{:<10} {:>18} {:>18}", "weeks", "S(t) age 70, ctrl", "S(t) age 48, trt");
    for ((t, s_high), (_, s_low)) in high_curve.iter().zip(low_curve.iter()) {
        println!("{:<10} {:>18.4} {:>18.4}", t, s_high, s_low);
    }

    println!("\npartial hazard ratio between the two subjects: {:.4}",
        model.predict_partial_hazard(&high_risk)? / model.predict_partial_hazard(&low_risk)?);

    Ok(())
}
