//! The `assessa stats` command.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use assessa_core::statistics::{StatisticsFilter, SurveyStatistics};
use assessa_core::AssessmentEngine;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    engine: &AssessmentEngine,
    survey_id: String,
    attempt: Option<u32>,
    submitted_only: bool,
    email: Option<String>,
    from: Option<String>,
    to: Option<String>,
    format: String,
) -> Result<()> {
    let filter = StatisticsFilter {
        attempt,
        submitted_only,
        candidate_email: email,
        from: from.as_deref().map(parse_time).transpose()?,
        to: to.as_deref().map(parse_time).transpose()?,
    };

    let stats = engine.statistics(&survey_id, &filter).await?;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
        "markdown" | "md" => println!("{}", stats.to_markdown()),
        _ => print_text(&stats),
    }

    Ok(())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp (expected RFC 3339): {raw}"))?
        .with_timezone(&Utc))
}

fn print_text(stats: &SurveyStatistics) {
    use comfy_table::{Cell, Table};

    let s = &stats.summary;
    println!("Survey: {} ({})", stats.title, stats.survey_id);
    println!(
        "Responses: {} total, {} completed ({:.1}%), {} submitted",
        s.total_responses, s.completed_responses, s.completion_rate, s.submitted_responses
    );
    if let (Some(avg), Some(pass)) = (s.average_score, s.pass_rate) {
        println!("Average score: {avg:.1}%, pass rate: {pass:.1}%");
    }
    if let Some(secs) = s.average_time_spent {
        println!("Average time: {secs:.0}s");
    }

    if stats.aggregated_stats.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Question",
        "Type",
        "Answered",
        "Unanswered",
        "Correct",
        "Breakdown",
    ]);
    for q in &stats.aggregated_stats {
        table.add_row(vec![
            Cell::new(&q.text),
            Cell::new(q.question_type),
            Cell::new(q.answered),
            Cell::new(q.unanswered),
            Cell::new(q.correct),
            Cell::new(q.breakdown()),
        ]);
    }
    println!("\n{table}");
}
