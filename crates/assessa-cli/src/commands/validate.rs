//! The `assessa validate` command.

use anyhow::Result;

use assessa_core::AssessmentEngine;

pub async fn execute(engine: &AssessmentEngine, survey_id: String, format: String) -> Result<()> {
    let report = engine.validate(&survey_id).await?;
    tracing::info!(
        survey_id = %report.survey_id,
        pools = report.pools.len(),
        problems = report.problems.len(),
        "survey validated"
    );

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Survey: {} ({})", report.survey_id, report.source_type);
        for pool in &report.pools {
            let requested = pool
                .requested
                .filter(|&n| n > 0)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string());
            println!(
                "  {}: {} available, {} required, drawing {}",
                pool.origin, pool.available, pool.required, requested
            );
        }
        for problem in &report.problems {
            println!("  ERROR: {problem}");
        }
        if let Some(n) = report.resolved_questions {
            println!("Sessions will have {n} questions.");
        }
    }

    if !report.is_valid() {
        anyhow::bail!("{} problem(s) found", report.problems.len());
    }
    if format != "json" {
        println!("Survey is valid.");
    }

    Ok(())
}
