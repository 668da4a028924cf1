use clap::{Args, Parser, Subcommand};

use crate::gemini;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate one day's five-concept lesson for a book.
    Concepts(ConceptsArgs),
    /// Look up latest research and news for a single concept.
    Research(ResearchArgs),
}

#[derive(Debug, Args)]
pub struct ConceptsArgs {
    /// Book title (defaults to the excerpt filename when --file is given).
    #[arg(long)]
    pub title: Option<String>,

    /// Book author.
    #[arg(long)]
    pub author: Option<String>,

    /// Path to a text/markdown/JSON excerpt of the book.
    #[arg(long)]
    pub file: Option<String>,

    /// Day number to generate the lesson for.
    #[arg(long, default_value_t = 1)]
    pub day: u32,

    /// Print the lesson as JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub gemini: GeminiArgs,
}

#[derive(Debug, Args)]
pub struct ResearchArgs {
    /// Concept title to research.
    #[arg(long)]
    pub concept: String,

    /// Book title giving the concept its context.
    #[arg(long)]
    pub book: String,

    /// Print the result as JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub gemini: GeminiArgs,
}

#[derive(Debug, Args)]
pub struct GeminiArgs {
    /// Gemini model id.
    #[arg(long = "gemini-model", default_value = gemini::DEFAULT_MODEL)]
    pub model: String,

    /// Gemini API base URL (the API key always comes from GEMINI_API_KEY).
    #[arg(long = "gemini-base-url", default_value = gemini::DEFAULT_BASE_URL)]
    pub base_url: String,
}
