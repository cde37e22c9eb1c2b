//! The `assessa start` command.

use anyhow::Result;

use assessa_core::engine::StartRequest;
use assessa_core::response::ResponseMetadata;
use assessa_core::AssessmentEngine;

pub async fn execute(
    engine: &AssessmentEngine,
    survey_id: String,
    name: String,
    email: String,
    attempt: Option<u32>,
    resume: bool,
    user_agent: Option<String>,
) -> Result<()> {
    let outcome = engine
        .start(StartRequest {
            survey_id,
            candidate_name: name,
            candidate_email: email,
            attempt,
            resume,
            metadata: ResponseMetadata {
                user_agent,
                ip_address: None,
                device_type: Some("cli".into()),
            },
        })
        .await?;

    if outcome.resumed {
        eprintln!("Resumed attempt {}", outcome.attempt);
    } else {
        eprintln!(
            "Started attempt {} with {} questions",
            outcome.attempt, outcome.total_questions
        );
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
