//! The `assessa init` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use assessa_core::model::{QuestionBank, Survey};
use assessa_core::traits::{BankLookup, SurveyLookup};
use assessa_store::JsonDirStore;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(|| PathBuf::from("assessa.toml"));
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(&path, SAMPLE_CONFIG)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }

    let config = assessa_store::load_config_from(Some(&path))?;
    let store = JsonDirStore::open(&config.data_dir).await?;

    let bank: QuestionBank = serde_json::from_str(DEMO_BANK).context("demo bank is invalid")?;
    if store.bank(&bank.id).await?.is_some() {
        println!("Bank {} already exists, skipping.", bank.id);
    } else {
        store.save_bank(&bank).await?;
        println!("Created bank {}", bank.id);
    }

    let survey: Survey = serde_json::from_str(DEMO_SURVEY).context("demo survey is invalid")?;
    if store.survey(&survey.id).await?.is_some() {
        println!("Survey {} already exists, skipping.", survey.id);
    } else {
        store.save_survey(&survey).await?;
        println!("Created survey {}", survey.id);
    }

    println!("\nNext steps:");
    println!("  1. Run: assessa validate --survey {}", survey.id);
    println!(
        "  2. Run: assessa start --survey {} --name \"Ada\" --email ada@example.com",
        survey.id
    );
    println!("  3. Run: assessa submit --response <id> --answers '[1, [0, 2], \"Paris\"]'");
    println!("  4. Run: assessa stats --survey {}", survey.id);

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# assessa configuration

# Where surveys, banks, entitlements and responses are stored.
data_dir = "./assessa-data"

# What to do when a submitted response is submitted again: "reject" or "overwrite".
resubmission = "reject"

# Tracing filter used when RUST_LOG is unset.
log_filter = "assessa=info"
"#;

const DEMO_BANK: &str = r#"{
  "id": "general-knowledge",
  "name": "General knowledge",
  "companyId": "demo",
  "questions": [
    {
      "id": "gk-add",
      "text": "What is 2 + 2?",
      "type": "single_choice",
      "options": ["3", "4", "5"],
      "correctAnswer": 1,
      "isRequired": true,
      "tags": ["math"],
      "difficulty": "easy"
    },
    {
      "id": "gk-primes",
      "text": "Which of these are prime numbers?",
      "type": "multiple_choice",
      "options": ["2", "4", "5", "9"],
      "correctAnswer": [0, 2],
      "points": 2,
      "tags": ["math"]
    },
    {
      "id": "gk-capital",
      "text": "What is the capital of France?",
      "type": "short_text",
      "correctAnswer": "Paris",
      "tags": ["geography"],
      "difficulty": "easy"
    },
    {
      "id": "gk-planet",
      "text": "Which is the largest planet in the solar system?",
      "type": "single_choice",
      "options": ["Mars", "Jupiter", "Venus"],
      "correctAnswer": 1,
      "explanation": "Jupiter is more than twice as massive as all other planets combined.",
      "tags": ["science"]
    },
    {
      "id": "gk-boil",
      "text": "At sea level, water boils at how many degrees Celsius?",
      "type": "single_choice",
      "options": ["90", "100", "120"],
      "correctAnswer": 1,
      "tags": ["science"]
    },
    {
      "id": "gk-langs",
      "text": "Which of these are general-purpose programming languages?",
      "type": "multiple_choice",
      "options": ["Rust", "HTML", "Python"],
      "correctAnswer": [0, 2],
      "tags": ["computing"],
      "difficulty": "hard"
    }
  ]
}"#;

const DEMO_SURVEY: &str = r#"{
  "id": "demo-quiz",
  "title": "Demo quiz",
  "companyId": "demo",
  "type": "quiz",
  "sourceType": "question_bank",
  "questionBankId": "general-knowledge",
  "questionCount": 4,
  "maxAttempts": 3,
  "timeLimitMinutes": 15,
  "scoringSettings": {
    "passingThreshold": 70,
    "enablePartialScoring": true,
    "includeShortTextInScore": true,
    "showCorrectAnswers": true
  }
}"#;
