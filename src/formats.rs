use serde::{Deserialize, Serialize};

/// The book a learning session is anchored to. Created once at setup
/// completion and immutable for the rest of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookContext {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Full text of an uploaded excerpt, when the user provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_snippet: Option<String>,
}

/// One extracted idea from the book, with a short description and a longer
/// explanation. Identity is `day-{day}-concept-{index}`, unique only within
/// one day's batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub title: String,
    pub description: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchData {
    pub summary: String,
    pub sources: Vec<Source>,
}
