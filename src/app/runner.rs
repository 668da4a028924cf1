use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::Semaphore;

use crate::app::model::{Session, ViewState};
use crate::app::session_store::SessionStore;
use crate::concepts;
use crate::formats::ResearchData;
use crate::gemini::{self, GeminiConfig};
use crate::research;

/// Runs the two remote operations on behalf of sessions: lesson generation
/// in the background (bounded by a semaphore) and research lookups inline.
#[derive(Clone)]
pub struct LessonRunner {
    store: Arc<dyn SessionStore>,
    client: reqwest::Client,
    gemini: GeminiConfig,
    generation_slots: Arc<Semaphore>,
}

impl LessonRunner {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gemini: GeminiConfig,
        max_concurrency: usize,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            client: gemini::http_client()?,
            gemini,
            generation_slots: Arc::new(Semaphore::new(max_concurrency.max(1))),
        })
    }

    /// Kick off generation for `(session, day)` without blocking the caller.
    /// The completion is applied to the session only if it is still on that
    /// day; a superseded result is dropped.
    pub fn spawn_generation(&self, session_id: &str, day: u32) {
        let runner = self.clone();
        let session_id = session_id.to_owned();
        tokio::spawn(async move {
            runner.run_generation(&session_id, day).await;
        });
    }

    async fn run_generation(&self, session_id: &str, day: u32) {
        let Ok(permit) = Arc::clone(&self.generation_slots).acquire_owned().await else {
            tracing::error!(session_id, "generation semaphore is closed");
            return;
        };
        let _permit = permit;

        let session = match self.store.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!(session_id, "session gone before generation started");
                return;
            }
            Err(err) => {
                tracing::error!(session_id, error = %format!("{err:#}"), "load session");
                return;
            }
        };
        if session.day != day || !session.loading {
            tracing::debug!(session_id, day, "generation superseded before start");
            return;
        }
        let Some(book) = session.book else {
            tracing::error!(session_id, "dashboard session has no book");
            return;
        };

        match concepts::generate_daily_concepts(&self.client, &self.gemini, &book, day).await {
            Ok(generated) => {
                tracing::info!(session_id, day, "lesson generated");
                self.finish(session_id, day, |session| {
                    session.apply_concepts(day, generated)
                })
                .await;
            }
            Err(err) => {
                tracing::error!(
                    session_id,
                    day,
                    error = %format!("{err:#}"),
                    "concept generation failed"
                );
                self.finish(session_id, day, |session| {
                    session.apply_generation_failure(day)
                })
                .await;
            }
        }
    }

    async fn finish(&self, session_id: &str, day: u32, apply: impl FnOnce(&mut Session) -> bool) {
        let mut session = match self.store.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(session_id, error = %format!("{err:#}"), "load session");
                return;
            }
        };

        if !apply(&mut session) {
            tracing::debug!(session_id, day, "dropping stale generation result");
            return;
        }
        if let Err(err) = self.store.put(&session).await {
            tracing::error!(session_id, error = %format!("{err:#}"), "save session");
        }
    }

    /// Research for one concept card: cached after the first expansion,
    /// degraded to the fallback summary on failure, never an error to the
    /// card. `None` means the session or concept is unknown.
    pub async fn concept_research(
        &self,
        session_id: &str,
        concept_id: &str,
    ) -> anyhow::Result<Option<ResearchData>> {
        let Some(session) = self.store.get(session_id).await.context("load session")? else {
            return Ok(None);
        };
        if session.view != ViewState::Dashboard {
            return Ok(None);
        }
        let Some(concept) = session.concepts.iter().find(|c| c.id == concept_id) else {
            return Ok(None);
        };
        if let Some(cached) = session.research.get(concept_id) {
            return Ok(Some(cached.clone()));
        }

        let book = session
            .book
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("dashboard session has no book"))?;
        let research =
            research::fetch_research(&self.client, &self.gemini, &concept.title, &book.title)
                .await;

        // Cache it unless the day moved on while the lookup ran.
        if let Some(mut current) = self.store.get(session_id).await.context("load session")? {
            if current.cache_research(concept_id, research.clone()) {
                self.store.put(&current).await.context("save session")?;
            } else {
                tracing::debug!(session_id, concept_id, "research result no longer on screen");
            }
        }

        Ok(Some(research))
    }
}
