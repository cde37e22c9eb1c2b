//! Question source resolution.
//!
//! Turns a survey's source configuration (embedded list, single bank,
//! several filtered banks, or pinned selections) into one flat ordered list
//! of questions. Bank reads go through [`BankLookup`] and paid marketplace
//! banks through [`EntitlementCheck`].

use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{
    BankAccess, BankDraw, PinnedQuestion, Question, QuestionBank, QuestionSource, Survey,
};
use crate::quota;
use crate::response::SelectedQuestion;
use crate::traits::{BankLookup, EntitlementCheck};

/// A resolved question and the bank it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuestion {
    pub question: Question,
    pub bank_id: Option<String>,
}

impl ResolvedQuestion {
    pub fn into_selected(self, index: usize) -> SelectedQuestion {
        SelectedQuestion {
            original_question_id: self.question.id.clone(),
            index,
            bank_id: self.bank_id,
            question_data: self.question,
        }
    }
}

/// Pool sizes behind one part of a survey's source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolReport {
    pub origin: String,
    /// Questions matching the filters.
    pub available: usize,
    pub required: usize,
    /// Configured quota; `None` draws everything.
    pub requested: Option<usize>,
}

impl PoolReport {
    pub fn is_satisfiable(&self) -> bool {
        let target = self.requested.filter(|&q| q > 0).unwrap_or(self.available);
        target <= self.available && self.required <= target
    }
}

/// Resolves survey sources against the bank and entitlement ports.
pub struct QuestionResolver<'a> {
    banks: &'a dyn BankLookup,
    entitlements: &'a dyn EntitlementCheck,
}

impl<'a> QuestionResolver<'a> {
    pub fn new(banks: &'a dyn BankLookup, entitlements: &'a dyn EntitlementCheck) -> Self {
        Self {
            banks,
            entitlements,
        }
    }

    /// Resolve the survey's question list.
    ///
    /// Never returns a shortened list: an unresolvable configuration is an
    /// error.
    pub async fn resolve<R>(
        &self,
        survey: &Survey,
        rng: &mut R,
    ) -> Result<Vec<ResolvedQuestion>, EngineError>
    where
        R: Rng + Send,
    {
        let company = survey.company_id.as_str();

        let resolved = match &survey.source {
            QuestionSource::Manual { questions } => {
                for q in questions {
                    q.validate()?;
                }
                let mut list: Vec<ResolvedQuestion> = questions
                    .iter()
                    .map(|q| ResolvedQuestion {
                        question: q.clone(),
                        bank_id: None,
                    })
                    .collect();
                if survey.shuffle_questions {
                    list.shuffle(rng);
                }
                list
            }
            QuestionSource::QuestionBank {
                question_bank_id,
                question_count,
            } => {
                let bank = self.load_bank(question_bank_id, company).await?;
                let pool = bank_pool(&bank, |_| true)?;
                quota::draw(
                    pool,
                    *question_count,
                    |r: &ResolvedQuestion| r.question.is_required,
                    &format!("bank {}", bank.id),
                    rng,
                )?
            }
            QuestionSource::MultiQuestionBank {
                multi_question_bank_config,
            } => {
                self.resolve_multi(multi_question_bank_config, company, rng)
                    .await?
            }
            QuestionSource::ManualSelection { selected_questions } => {
                let mut list = self.resolve_pins(selected_questions, company).await?;
                if survey.shuffle_questions {
                    list.shuffle(rng);
                }
                list
            }
        };

        if resolved.is_empty() {
            return Err(EngineError::InvalidConfiguration(format!(
                "survey {} resolves to no questions",
                survey.id
            )));
        }

        Ok(resolved)
    }

    async fn resolve_multi<R>(
        &self,
        draws: &[BankDraw],
        company: &str,
        rng: &mut R,
    ) -> Result<Vec<ResolvedQuestion>, EngineError>
    where
        R: Rng + Send,
    {
        if draws.is_empty() {
            return Err(EngineError::InvalidConfiguration(
                "multi-bank survey has no bank entries".into(),
            ));
        }

        let banks = try_join_all(
            draws
                .iter()
                .map(|d| self.load_bank(&d.question_bank_id, company)),
        )
        .await?;

        let mut combined: Vec<ResolvedQuestion> = Vec::new();
        // A question taken by an earlier entry is not offered again.
        let mut taken: HashSet<(String, String)> = HashSet::new();

        for (entry, bank) in draws.iter().zip(&banks) {
            let pool = bank_pool(bank, |q| {
                entry.filters.matches(q) && !taken.contains(&(bank.id.clone(), q.id.clone()))
            })?;
            let drawn = quota::draw(
                pool,
                entry.question_count,
                |r: &ResolvedQuestion| r.question.is_required,
                &format!("bank {}", bank.id),
                rng,
            )?;
            taken.extend(drawn.iter().map(|r| (bank.id.clone(), r.question.id.clone())));
            combined.extend(drawn);
        }

        // Interleave banks instead of grouping by source.
        combined.shuffle(rng);
        Ok(combined)
    }

    async fn resolve_pins(
        &self,
        pins: &[PinnedQuestion],
        company: &str,
    ) -> Result<Vec<ResolvedQuestion>, EngineError> {
        let mut banks: HashMap<String, QuestionBank> = HashMap::new();
        let mut resolved = Vec::with_capacity(pins.len());

        for pin in pins {
            let question = match &pin.question_snapshot {
                Some(snapshot) => snapshot.clone(),
                None => {
                    if !banks.contains_key(&pin.question_bank_id) {
                        let bank = self.load_bank(&pin.question_bank_id, company).await?;
                        banks.insert(pin.question_bank_id.clone(), bank);
                    }
                    banks[&pin.question_bank_id]
                        .question(&pin.question_id)
                        .cloned()
                        .ok_or_else(|| EngineError::QuestionNotFound {
                            bank_id: pin.question_bank_id.clone(),
                            question_id: pin.question_id.clone(),
                        })?
                }
            };
            question.validate()?;
            resolved.push(ResolvedQuestion {
                question,
                bank_id: Some(pin.question_bank_id.clone()),
            });
        }

        Ok(resolved)
    }

    /// Report pool sizes for each part of the survey's source without
    /// drawing.
    pub async fn inspect(&self, survey: &Survey) -> Result<Vec<PoolReport>, EngineError> {
        let company = survey.company_id.as_str();

        let reports = match &survey.source {
            QuestionSource::Manual { questions } => vec![PoolReport {
                origin: "embedded questions".into(),
                available: questions.len(),
                required: questions.len(),
                requested: None,
            }],
            QuestionSource::QuestionBank {
                question_bank_id,
                question_count,
            } => {
                let bank = self.load_bank(question_bank_id, company).await?;
                vec![pool_report(&bank, &Default::default(), *question_count)]
            }
            QuestionSource::MultiQuestionBank {
                multi_question_bank_config,
            } => {
                let mut reports = Vec::new();
                for entry in multi_question_bank_config {
                    let bank = self.load_bank(&entry.question_bank_id, company).await?;
                    reports.push(pool_report(&bank, &entry.filters, entry.question_count));
                }
                reports
            }
            QuestionSource::ManualSelection { selected_questions } => vec![PoolReport {
                origin: "pinned questions".into(),
                available: selected_questions.len(),
                required: selected_questions.len(),
                requested: None,
            }],
        };

        Ok(reports)
    }

    async fn load_bank(&self, bank_id: &str, company_id: &str) -> Result<QuestionBank, EngineError> {
        let bank = self
            .banks
            .bank(bank_id)
            .await?
            .ok_or_else(|| EngineError::BankNotFound(bank_id.to_string()))?;

        let denied = || EngineError::AccessDenied {
            company_id: company_id.to_string(),
            bank_id: bank_id.to_string(),
        };

        match bank.access_for(company_id) {
            BankAccess::Granted => Ok(bank),
            BankAccess::RequiresEntitlement => {
                if self.entitlements.has_access(company_id, bank_id).await? {
                    Ok(bank)
                } else {
                    tracing::warn!(company_id, bank_id, "marketplace bank not licensed");
                    Err(denied())
                }
            }
            BankAccess::Denied => Err(denied()),
        }
    }
}

/// The questions of `bank` passing `keep`. Every one of them is validated,
/// drawn or not, so a malformed question fails every session alike.
fn bank_pool(
    bank: &QuestionBank,
    keep: impl Fn(&Question) -> bool,
) -> Result<Vec<ResolvedQuestion>, EngineError> {
    bank.questions
        .iter()
        .filter(|q| keep(q))
        .map(|q| -> Result<ResolvedQuestion, EngineError> {
            q.validate()?;
            Ok(ResolvedQuestion {
                question: q.clone(),
                bank_id: Some(bank.id.clone()),
            })
        })
        .collect()
}

fn pool_report(
    bank: &QuestionBank,
    filters: &crate::model::QuestionFilter,
    requested: Option<usize>,
) -> PoolReport {
    let matching: Vec<&Question> = bank.questions.iter().filter(|q| filters.matches(q)).collect();
    PoolReport {
        origin: format!("bank {}", bank.id),
        available: matching.len(),
        required: matching.iter().filter(|q| q.is_required).count(),
        requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BankPricing, BankVisibility, CorrectAnswer, Difficulty, QuestionFilter, QuestionOption,
        QuestionType, ScoringSettings, SurveyKind,
    };
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Banks(HashMap<String, QuestionBank>);

    #[async_trait]
    impl BankLookup for Banks {
        async fn bank(&self, bank_id: &str) -> anyhow::Result<Option<QuestionBank>> {
            Ok(self.0.get(bank_id).cloned())
        }
    }

    struct Licenses(Vec<(&'static str, &'static str)>);

    #[async_trait]
    impl EntitlementCheck for Licenses {
        async fn has_access(&self, company_id: &str, bank_id: &str) -> anyhow::Result<bool> {
            Ok(self.0.iter().any(|(c, b)| *c == company_id && *b == bank_id))
        }
    }

    fn question(id: &str, tags: &[&str]) -> Question {
        Question {
            id: id.into(),
            text: format!("Question {id}"),
            description: String::new(),
            question_type: QuestionType::SingleChoice,
            options: vec![QuestionOption::new("A"), QuestionOption::new("B")],
            correct_answer: Some(CorrectAnswer::Index(0)),
            explanation: None,
            points: 1,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            difficulty: Difficulty::Medium,
            is_required: false,
        }
    }

    fn bank(id: &str, company: &str, questions: Vec<Question>) -> QuestionBank {
        QuestionBank {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            company_id: company.into(),
            visibility: BankVisibility::Private,
            pricing: BankPricing::Free,
            questions,
        }
    }

    fn numbered(prefix: &str, n: usize, tags: &[&str]) -> Vec<Question> {
        (0..n).map(|i| question(&format!("{prefix}{i}"), tags)).collect()
    }

    fn survey(source: QuestionSource) -> Survey {
        Survey {
            id: "s1".into(),
            title: "Quiz".into(),
            description: String::new(),
            company_id: "acme".into(),
            kind: SurveyKind::Assessment,
            source,
            scoring_settings: ScoringSettings::default(),
            max_attempts: 1,
            shuffle_questions: false,
            time_limit_minutes: None,
        }
    }

    fn ports(banks: Vec<QuestionBank>) -> (Banks, Licenses) {
        (
            Banks(banks.into_iter().map(|b| (b.id.clone(), b)).collect()),
            Licenses(vec![]),
        )
    }

    fn ids(resolved: &[ResolvedQuestion]) -> Vec<String> {
        resolved.iter().map(|r| r.question.id.clone()).collect()
    }

    #[tokio::test]
    async fn manual_questions_keep_authored_order() {
        let (banks, licenses) = ports(vec![]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let survey = survey(QuestionSource::Manual {
            questions: vec![question("q1", &[]), question("q2", &[]), question("q3", &[])],
        });

        let resolved = resolver
            .resolve(&survey, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();
        assert_eq!(ids(&resolved), vec!["q1", "q2", "q3"]);
        assert!(resolved.iter().all(|r| r.bank_id.is_none()));
    }

    #[tokio::test]
    async fn single_bank_draws_exactly_the_quota() {
        let (banks, licenses) = ports(vec![bank("b1", "acme", numbered("q", 10, &[]))]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let survey = survey(QuestionSource::QuestionBank {
            question_bank_id: "b1".into(),
            question_count: Some(4),
        });

        let resolved = resolver
            .resolve(&survey, &mut StdRng::seed_from_u64(9))
            .await
            .unwrap();
        assert_eq!(resolved.len(), 4);
        let unique: HashSet<String> = ids(&resolved).into_iter().collect();
        assert_eq!(unique.len(), 4);
        assert!(resolved.iter().all(|r| r.bank_id.as_deref() == Some("b1")));
    }

    #[tokio::test]
    async fn multi_bank_respects_origin_and_filters() {
        let mut logic = numbered("l", 6, &["logic"]);
        logic.extend(numbered("m", 4, &["math"]));
        let (banks, licenses) = ports(vec![
            bank("b1", "acme", logic),
            bank("b2", "acme", numbered("v", 5, &["verbal"])),
        ]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let survey = survey(QuestionSource::MultiQuestionBank {
            multi_question_bank_config: vec![
                BankDraw {
                    question_bank_id: "b1".into(),
                    question_count: Some(3),
                    filters: QuestionFilter {
                        tags: vec!["logic".into()],
                        ..Default::default()
                    },
                },
                BankDraw {
                    question_bank_id: "b2".into(),
                    question_count: Some(2),
                    filters: QuestionFilter::default(),
                },
            ],
        });

        for seed in 0..20 {
            let resolved = resolver
                .resolve(&survey, &mut StdRng::seed_from_u64(seed))
                .await
                .unwrap();
            assert_eq!(resolved.len(), 5);
            let from_b1: Vec<_> = resolved
                .iter()
                .filter(|r| r.bank_id.as_deref() == Some("b1"))
                .collect();
            assert_eq!(from_b1.len(), 3);
            assert!(from_b1
                .iter()
                .all(|r| r.question.tags.contains(&"logic".to_string())));
        }
    }

    #[tokio::test]
    async fn repeated_bank_entries_never_duplicate_questions() {
        let (banks, licenses) = ports(vec![bank("b1", "acme", numbered("q", 4, &[]))]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let entry = BankDraw {
            question_bank_id: "b1".into(),
            question_count: Some(2),
            filters: QuestionFilter::default(),
        };
        let survey = survey(QuestionSource::MultiQuestionBank {
            multi_question_bank_config: vec![entry.clone(), entry],
        });

        let resolved = resolver
            .resolve(&survey, &mut StdRng::seed_from_u64(5))
            .await
            .unwrap();
        let unique: HashSet<String> = ids(&resolved).into_iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[tokio::test]
    async fn insufficient_filtered_pool_is_an_error() {
        let (banks, licenses) = ports(vec![bank("b1", "acme", numbered("q", 3, &["a"]))]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let survey = survey(QuestionSource::MultiQuestionBank {
            multi_question_bank_config: vec![BankDraw {
                question_bank_id: "b1".into(),
                question_count: Some(2),
                filters: QuestionFilter {
                    tags: vec!["missing".into()],
                    ..Default::default()
                },
            }],
        });

        let err = resolver
            .resolve(&survey, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientQuestions {
                requested: 2,
                available: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn pinned_snapshot_wins_over_live_bank() {
        let mut live = question("q1", &[]);
        live.text = "Edited after publishing".into();
        let (banks, licenses) = ports(vec![bank("b1", "acme", vec![live, question("q2", &[])])]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let survey = survey(QuestionSource::ManualSelection {
            selected_questions: vec![
                PinnedQuestion {
                    question_bank_id: "b1".into(),
                    question_id: "q1".into(),
                    question_snapshot: Some(question("q1", &[])),
                },
                PinnedQuestion {
                    question_bank_id: "b1".into(),
                    question_id: "q2".into(),
                    question_snapshot: None,
                },
            ],
        });

        let resolved = resolver
            .resolve(&survey, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();
        assert_eq!(resolved[0].question.text, "Question q1");
        assert_eq!(resolved[1].question.id, "q2");
    }

    #[tokio::test]
    async fn missing_pinned_question_or_bank_fails() {
        let (banks, licenses) = ports(vec![bank("b1", "acme", numbered("q", 2, &[]))]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let pin = |bank: &str, id: &str| PinnedQuestion {
            question_bank_id: bank.into(),
            question_id: id.into(),
            question_snapshot: None,
        };

        let missing_question = survey(QuestionSource::ManualSelection {
            selected_questions: vec![pin("b1", "gone")],
        });
        let err = resolver
            .resolve(&missing_question, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::QuestionNotFound { .. }));

        let missing_bank = survey(QuestionSource::ManualSelection {
            selected_questions: vec![pin("nope", "q0")],
        });
        let err = resolver
            .resolve(&missing_bank, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BankNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn foreign_banks_need_visibility_and_license() {
        let mut private = bank("private", "rival", numbered("p", 3, &[]));
        private.visibility = BankVisibility::Private;
        let mut paid = bank("paid", "vendor", numbered("x", 3, &[]));
        paid.visibility = BankVisibility::Marketplace;
        paid.pricing = BankPricing::Subscription;

        let banks = Banks(
            [private, paid]
                .into_iter()
                .map(|b| (b.id.clone(), b))
                .collect(),
        );
        let unlicensed = Licenses(vec![]);
        let licensed = Licenses(vec![("acme", "paid")]);
        let from = |id: &str| {
            survey(QuestionSource::QuestionBank {
                question_bank_id: id.into(),
                question_count: None,
            })
        };

        let resolver = QuestionResolver::new(&banks, &unlicensed);
        let err = resolver
            .resolve(&from("private"), &mut StdRng::seed_from_u64(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AccessDenied { .. }));
        let err = resolver
            .resolve(&from("paid"), &mut StdRng::seed_from_u64(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AccessDenied { .. }));

        let resolver = QuestionResolver::new(&banks, &licensed);
        let resolved = resolver
            .resolve(&from("paid"), &mut StdRng::seed_from_u64(1))
            .await
            .unwrap();
        assert_eq!(resolved.len(), 3);
    }

    #[tokio::test]
    async fn empty_source_is_a_configuration_error() {
        let (banks, licenses) = ports(vec![]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let survey = survey(QuestionSource::Manual { questions: vec![] });
        let err = resolver
            .resolve(&survey, &mut StdRng::seed_from_u64(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn inspect_reports_filtered_pool_sizes() {
        let mut questions = numbered("a", 3, &["x"]);
        questions[0].is_required = true;
        questions.extend(numbered("b", 2, &["y"]));
        let (banks, licenses) = ports(vec![bank("b1", "acme", questions)]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let survey = survey(QuestionSource::MultiQuestionBank {
            multi_question_bank_config: vec![BankDraw {
                question_bank_id: "b1".into(),
                question_count: Some(4),
                filters: QuestionFilter {
                    tags: vec!["x".into()],
                    ..Default::default()
                },
            }],
        });

        let reports = resolver.inspect(&survey).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].available, 3);
        assert_eq!(reports[0].required, 1);
        assert!(!reports[0].is_satisfiable());
    }

    #[tokio::test]
    async fn malformed_bank_question_fails_every_draw() {
        let mut questions = numbered("q", 10, &["x"]);
        questions[7].correct_answer = Some(CorrectAnswer::Index(5));
        let (banks, licenses) = ports(vec![bank("b1", "acme", questions)]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let single = survey(QuestionSource::QuestionBank {
            question_bank_id: "b1".into(),
            question_count: Some(2),
        });
        let multi = survey(QuestionSource::MultiQuestionBank {
            multi_question_bank_config: vec![BankDraw {
                question_bank_id: "b1".into(),
                question_count: Some(2),
                filters: QuestionFilter {
                    tags: vec!["x".into()],
                    ..Default::default()
                },
            }],
        });

        for seed in 0..200 {
            for target in [&single, &multi] {
                let err = resolver
                    .resolve(target, &mut StdRng::seed_from_u64(seed))
                    .await
                    .unwrap_err();
                assert!(
                    matches!(err, EngineError::InvalidQuestion { ref question_id, .. } if question_id == "q7"),
                    "seed {seed}: {err}"
                );
            }
        }
    }

    #[tokio::test]
    async fn filtered_out_malformed_question_is_ignored() {
        let mut questions = numbered("q", 4, &["x"]);
        let mut broken = question("bad", &["y"]);
        broken.correct_answer = Some(CorrectAnswer::Index(5));
        questions.push(broken);
        let (banks, licenses) = ports(vec![bank("b1", "acme", questions)]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let survey = survey(QuestionSource::MultiQuestionBank {
            multi_question_bank_config: vec![BankDraw {
                question_bank_id: "b1".into(),
                question_count: Some(2),
                filters: QuestionFilter {
                    tags: vec!["x".into()],
                    ..Default::default()
                },
            }],
        });

        let resolved = resolver
            .resolve(&survey, &mut StdRng::seed_from_u64(3))
            .await
            .unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[tokio::test]
    async fn malformed_pin_is_rejected() {
        let (banks, licenses) = ports(vec![bank("b1", "acme", numbered("q", 2, &[]))]);
        let resolver = QuestionResolver::new(&banks, &licenses);
        let mut snapshot = question("q0", &[]);
        snapshot.options.truncate(1);
        let survey = survey(QuestionSource::ManualSelection {
            selected_questions: vec![
                PinnedQuestion {
                    question_bank_id: "b1".into(),
                    question_id: "q1".into(),
                    question_snapshot: None,
                },
                PinnedQuestion {
                    question_bank_id: "b1".into(),
                    question_id: "q0".into(),
                    question_snapshot: Some(snapshot),
                },
            ],
        });

        let err = resolver
            .resolve(&survey, &mut StdRng::seed_from_u64(0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuestion { .. }));
    }
}
