use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::formats::{BookContext, Concept, ResearchData};

/// The uniform user-facing message for a failed lesson generation. Transport
/// and parse failures collapse into this one string; logs keep the detail.
pub const GENERATION_FAILED_MESSAGE: &str =
    "We couldn't generate your lesson for today. Please check your connection and try again.";

/// The three screens of the app. Transitions are user-triggered only;
/// loading and error are flags on the session, not states of this machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewState {
    Hero,
    Setup,
    Dashboard,
}

/// One browser session's entire state. Held in memory only; everything here
/// vanishes when the server restarts, matching the page-reload semantics of
/// the interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub view: ViewState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<BookContext>,
    /// Session-local lesson counter, not tied to calendar time. 0 outside
    /// the dashboard, 1.. once a book is chosen.
    pub day: u32,
    pub concepts: Vec<Concept>,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Research results cached per concept id for the session lifetime.
    pub research: HashMap<String, ResearchData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            view: ViewState::Hero,
            book: None,
            day: 0,
            concepts: Vec::new(),
            loading: false,
            error: None,
            research: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn start_setup(&mut self) -> anyhow::Result<()> {
        if self.view != ViewState::Hero {
            anyhow::bail!("not on the hero screen");
        }
        self.view = ViewState::Setup;
        self.touch();
        Ok(())
    }

    pub fn back_to_hero(&mut self) -> anyhow::Result<()> {
        if self.view != ViewState::Setup {
            anyhow::bail!("not on the setup screen");
        }
        self.view = ViewState::Hero;
        self.touch();
        Ok(())
    }

    /// Complete setup: pin the book, enter the dashboard at day 1 and mark
    /// the first lesson as loading. The caller spawns the generation.
    pub fn begin_dashboard(&mut self, book: BookContext) -> anyhow::Result<()> {
        if self.view != ViewState::Setup {
            anyhow::bail!("not on the setup screen");
        }
        self.view = ViewState::Dashboard;
        self.book = Some(book);
        self.day = 1;
        self.concepts.clear();
        self.research.clear();
        self.loading = true;
        self.error = None;
        self.touch();
        Ok(())
    }

    /// Advance to the next day, discarding the current batch. The caller
    /// spawns exactly one generation for the new day.
    pub fn advance_day(&mut self) -> anyhow::Result<()> {
        if self.view != ViewState::Dashboard {
            anyhow::bail!("not on the dashboard");
        }
        if self.loading {
            anyhow::bail!("a lesson is still loading");
        }
        if self.error.is_some() {
            anyhow::bail!("the current lesson failed; retry it first");
        }
        self.day += 1;
        self.concepts.clear();
        self.research.clear();
        self.loading = true;
        self.touch();
        Ok(())
    }

    /// Re-issue generation for the same day after a failure.
    pub fn begin_retry(&mut self) -> anyhow::Result<()> {
        if self.view != ViewState::Dashboard {
            anyhow::bail!("not on the dashboard");
        }
        if self.error.is_none() {
            anyhow::bail!("there is no failed lesson to retry");
        }
        self.loading = true;
        self.error = None;
        self.touch();
        Ok(())
    }

    pub fn reset_to_setup(&mut self) -> anyhow::Result<()> {
        if self.view != ViewState::Dashboard {
            anyhow::bail!("not on the dashboard");
        }
        self.view = ViewState::Setup;
        self.book = None;
        self.day = 0;
        self.concepts.clear();
        self.research.clear();
        self.loading = false;
        self.error = None;
        self.touch();
        Ok(())
    }

    /// Record a finished generation. Returns false (and changes nothing)
    /// when the session has moved on and the result is stale.
    pub fn apply_concepts(&mut self, day: u32, concepts: Vec<Concept>) -> bool {
        if self.view != ViewState::Dashboard || self.day != day || !self.loading {
            return false;
        }
        self.concepts = concepts;
        self.loading = false;
        self.error = None;
        self.touch();
        true
    }

    /// Record a failed generation for `day`. Stale failures are dropped.
    pub fn apply_generation_failure(&mut self, day: u32) -> bool {
        if self.view != ViewState::Dashboard || self.day != day || !self.loading {
            return false;
        }
        self.concepts.clear();
        self.loading = false;
        self.error = Some(GENERATION_FAILED_MESSAGE.to_owned());
        self.touch();
        true
    }

    /// Cache a research result for a concept still on screen. Results for
    /// concepts of an abandoned day are dropped.
    pub fn cache_research(&mut self, concept_id: &str, research: ResearchData) -> bool {
        if !self.concepts.iter().any(|c| c.id == concept_id) {
            return false;
        }
        self.research.insert(concept_id.to_owned(), research);
        self.touch();
        true
    }
}

/// Body of the setup-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSetupRequest {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub content_snippet: Option<String>,
}

impl BookSetupRequest {
    pub fn into_book(self) -> anyhow::Result<BookContext> {
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            anyhow::bail!("title is required");
        }
        Ok(BookContext {
            title,
            author: self
                .author
                .map(|a| a.trim().to_owned())
                .filter(|a| !a.is_empty()),
            content_snippet: self.content_snippet.filter(|s| !s.trim().is_empty()),
        })
    }
}
