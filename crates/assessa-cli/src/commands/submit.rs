//! The `assessa submit` command.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde_json::Value;
use uuid::Uuid;

use assessa_core::engine::{SubmitOutcome, SubmitRequest};
use assessa_core::AssessmentEngine;

pub async fn execute(
    engine: &AssessmentEngine,
    response: String,
    answers: String,
    time_spent: Option<u64>,
    durations: Option<String>,
    auto_submit: bool,
    format: String,
) -> Result<()> {
    let response_id = Uuid::parse_str(response.trim())
        .with_context(|| format!("invalid response id: {response}"))?;
    let answers = read_json_arg(&answers).context("invalid --answers")?;
    let answer_durations: HashMap<String, u64> = match durations {
        Some(raw) => serde_json::from_value(read_json_arg(&raw)?)
            .context("--durations must map question keys to seconds")?,
        None => HashMap::new(),
    };

    let outcome = engine
        .submit(SubmitRequest {
            response_id,
            answers,
            time_spent,
            answer_durations,
            is_auto_submit: auto_submit,
        })
        .await?;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&outcome)?),
        _ => print_result(&outcome),
    }

    Ok(())
}

/// Inline JSON, or `@path` to read it from a file.
fn read_json_arg(raw: &str) -> Result<Value> {
    match raw.strip_prefix('@') {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {path}"))?;
            serde_json::from_str(&content).with_context(|| format!("failed to parse {path}"))
        }
        None => Ok(serde_json::from_str(raw)?),
    }
}

fn print_result(outcome: &SubmitOutcome) {
    use comfy_table::{Cell, Table};

    let score = &outcome.score;
    println!(
        "Score: {}/{} points ({}%), {} correct, {} wrong",
        score.total_points,
        score.max_possible_points,
        score.percentage,
        score.correct_answers,
        score.wrong_answers
    );
    println!("Result: {}", if score.passed { "PASSED" } else { "FAILED" });

    if outcome.question_results.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Answer", "Correct", "Points", "Expected"]);
    for r in &outcome.question_results {
        table.add_row(vec![
            Cell::new(r.index + 1),
            Cell::new(&r.text),
            Cell::new(r.user_answer.as_deref().unwrap_or("-")),
            Cell::new(if r.is_correct { "yes" } else { "no" }),
            Cell::new(format!("{}/{}", r.points_awarded, r.max_points)),
            Cell::new(r.correct_answer.as_deref().unwrap_or("")),
        ]);
    }
    println!("\n{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_and_file_answers_parse() {
        assert_eq!(read_json_arg("[0, [1, 2], \"Paris\"]").unwrap()[2], "Paris");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.json");
        std::fs::write(&path, "{\"0\": 1}").unwrap();
        let value = read_json_arg(&format!("@{}", path.display())).unwrap();
        assert_eq!(value["0"], 1);

        assert!(read_json_arg("not json").is_err());
    }
}
