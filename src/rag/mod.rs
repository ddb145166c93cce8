pub mod delegate;

pub use delegate::{AnswerDelegate, AnswerService, HttpAnswerService};

use crate::config::Settings;
use crate::db::{models::MealHit, DbPool};
use crate::error::Result;
use crate::indexer::SearchIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const NO_RESULTS_MESSAGE: &str = "No relevant meals found. Try different keywords.";

/// One retrieved meal, as handed to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub area: Option<String>,
    pub tags: Option<String>,
    pub instructions: Option<String>,
    pub thumbnail: Option<String>,
    pub score: f64,
}

impl From<MealHit> for ContextRecord {
    fn from(hit: MealHit) -> Self {
        let meal = hit.meal;
        Self {
            id: meal.id,
            name: meal.name,
            category: meal.category,
            area: meal.area,
            tags: meal.tags,
            instructions: meal.instructions,
            thumbnail: meal.thumbnail,
            score: hit.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    NoResults,
    /// Best match first, never empty
    Found(Vec<ContextRecord>),
}

impl Retrieval {
    pub fn contexts(&self) -> &[ContextRecord] {
        match self {
            Retrieval::NoResults => &[],
            Retrieval::Found(contexts) => contexts,
        }
    }
}

/// Render retrieved meals as a plain-text context block
pub fn make_context_block(contexts: &[ContextRecord]) -> String {
    contexts
        .iter()
        .map(|c| {
            format!(
                "Meal: {} (#{})\nCategory: {}, Area: {}, Tags: {}\nInstructions:\n{}\n",
                c.name,
                c.id,
                c.category.as_deref().unwrap_or_default(),
                c.area.as_deref().unwrap_or_default(),
                c.tags.as_deref().unwrap_or_default(),
                c.instructions.as_deref().unwrap_or_default(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Query side of the index: ranked retrieval plus answer assembly
#[derive(Clone)]
pub struct RetrievalEngine {
    index: SearchIndex,
    delegate: AnswerDelegate,
    max_k: usize,
}

impl RetrievalEngine {
    pub fn new(index: SearchIndex, delegate: AnswerDelegate, max_k: usize) -> Self {
        Self {
            index,
            delegate,
            max_k,
        }
    }

    /// Engine over `pool` with the delegate and limits from `settings`
    pub fn from_settings(pool: DbPool, settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            SearchIndex::new(pool),
            AnswerDelegate::from_config(&settings.delegate)?,
            settings.retrieval.max_k,
        ))
    }

    pub fn delegate(&self) -> &AnswerDelegate {
        &self.delegate
    }

    /// Top `k` meals for `question`; `k` is capped at the configured maximum
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Retrieval> {
        let hits = self.index.search(question, k.min(self.max_k)).await?;
        debug!("Retrieved {} contexts for question", hits.len());

        if hits.is_empty() {
            Ok(Retrieval::NoResults)
        } else {
            Ok(Retrieval::Found(hits.into_iter().map(ContextRecord::from).collect()))
        }
    }

    /// Answer `question` from the index.
    ///
    /// With `use_delegate` set and an answering service available, its answer
    /// is returned together with the supporting context. A failing service
    /// falls back to the context-only response.
    pub async fn answer(&self, question: &str, k: usize, use_delegate: bool) -> Result<String> {
        let contexts = match self.retrieve(question, k).await? {
            Retrieval::NoResults => return Ok(NO_RESULTS_MESSAGE.to_string()),
            Retrieval::Found(contexts) => contexts,
        };

        let block = make_context_block(&contexts);

        if use_delegate {
            match &self.delegate {
                AnswerDelegate::Available(service) => match service.ask(question, &block).await {
                    Ok(answer) => {
                        return Ok(format!(
                            "Answer (Text2SQL):\n{answer}\n\nTop supporting context:\n{block}"
                        ));
                    }
                    Err(e) => warn!(
                        "Answer service failed, falling back to context-only response: {}",
                        e.log_safe()
                    ),
                },
                AnswerDelegate::Unavailable => {
                    debug!("Delegation requested but no answer service is configured")
                }
            }
        }

        Ok(format!(
            "Question: {question}\n\nTop retrieved meal context (use to answer):\n{block}\n\n\
             Provide a concise answer using the context above."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::models::RawMeal;
    use crate::db::{meals::upsert_meals, test_pool};
    use crate::error::Error;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl AnswerService for Fixed {
        async fn ask(&self, _question: &str, _context: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing(AtomicUsize);

    #[async_trait::async_trait]
    impl AnswerService for Failing {
        async fn ask(&self, _question: &str, _context: &str) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Error::Delegate("offline".to_string()))
        }
    }

    fn context(id: i64, name: &str) -> ContextRecord {
        ContextRecord {
            id,
            name: name.to_string(),
            category: Some("Pasta".to_string()),
            area: Some("Italian".to_string()),
            tags: None,
            instructions: Some("Boil.".to_string()),
            thumbnail: None,
            score: -1.0,
        }
    }

    async fn engine(dir: &std::path::Path, delegate: AnswerDelegate) -> RetrievalEngine {
        let pool = test_pool(dir).await;
        let meals = vec![
            RawMeal {
                id_meal: Some(json!("52771")),
                name: Some("Spicy Arrabiata Penne".to_string()),
                category: Some("Vegetarian".to_string()),
                area: Some("Italian".to_string()),
                instructions: Some("Bring a large pot of water to a boil.".to_string()),
                tags: Some("Pasta,Curry".to_string()),
                ..Default::default()
            },
            RawMeal {
                id_meal: Some(json!("52772")),
                name: Some("Teriyaki Chicken Casserole".to_string()),
                instructions: Some("Preheat oven to 350.".to_string()),
                ..Default::default()
            },
        ];
        upsert_meals(&pool, &meals, 100).await.unwrap();
        RetrievalEngine::new(SearchIndex::new(pool), delegate, 50)
    }

    #[test]
    fn test_context_block_format() {
        let block = make_context_block(&[context(1, "Penne"), context(2, "Lasagne")]);
        assert_eq!(
            block,
            "Meal: Penne (#1)\nCategory: Pasta, Area: Italian, Tags: \nInstructions:\nBoil.\n\
             \n---\n\
             Meal: Lasagne (#2)\nCategory: Pasta, Area: Italian, Tags: \nInstructions:\nBoil.\n"
        );
        assert_eq!(make_context_block(&[]), "");
    }

    #[tokio::test]
    async fn test_retrieve() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), AnswerDelegate::Unavailable).await;

        let Retrieval::Found(contexts) = engine.retrieve("pasta", 5).await.unwrap() else {
            panic!("expected results");
        };
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].id, 52771);

        assert_eq!(engine.retrieve("", 5).await.unwrap(), Retrieval::NoResults);
        assert_eq!(engine.retrieve("pasta", 0).await.unwrap(), Retrieval::NoResults);
    }

    #[tokio::test]
    async fn test_answer_without_results() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), AnswerDelegate::Unavailable).await;

        let answer = engine.answer("sushi", 5, false).await.unwrap();
        assert_eq!(answer, NO_RESULTS_MESSAGE);
    }

    #[tokio::test]
    async fn test_answer_context_only() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), AnswerDelegate::Unavailable).await;

        let answer = engine.answer("teriyaki", 5, true).await.unwrap();
        assert!(answer.starts_with("Question: teriyaki\n\nTop retrieved meal context (use to answer):\n"));
        assert!(answer.contains("Meal: Teriyaki Chicken Casserole (#52772)"));
        assert!(answer.ends_with("\n\nProvide a concise answer using the context above."));
    }

    #[tokio::test]
    async fn test_answer_with_delegate() {
        let dir = tempdir().unwrap();
        let delegate = AnswerDelegate::Available(Arc::new(Fixed("One pasta dish.")));
        let engine = engine(dir.path(), delegate).await;

        let answer = engine.answer("pasta", 5, true).await.unwrap();
        assert!(answer.starts_with("Answer (Text2SQL):\nOne pasta dish.\n\nTop supporting context:\n"));
        assert!(answer.contains("(#52771)"));

        // Not requested: the service is left alone
        let answer = engine.answer("pasta", 5, false).await.unwrap();
        assert!(answer.starts_with("Question: pasta"));
    }

    #[tokio::test]
    async fn test_failing_delegate_falls_back() {
        let dir = tempdir().unwrap();
        let failing = Arc::new(Failing(AtomicUsize::new(0)));
        let engine = engine(dir.path(), AnswerDelegate::Available(failing.clone())).await;

        let answer = engine.answer("pasta", 5, true).await.unwrap();
        assert!(answer.starts_with("Question: pasta"));
        assert_eq!(failing.0.load(Ordering::SeqCst), 1);
    }
}
