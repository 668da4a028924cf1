use anyhow::Context as _;
use serde::Deserialize;

use crate::cli::ConceptsArgs;
use crate::formats::{BookContext, Concept};
use crate::gemini::{self, GeminiConfig, GenerateContentRequest};
use crate::import;

/// Every daily lesson is exactly this many concepts; fewer or more from the
/// model is a generation failure.
pub const CONCEPTS_PER_DAY: usize = 5;

/// Uploaded excerpts are clipped to this many characters inside the prompt.
pub const SNIPPET_PROMPT_CHARS: usize = 2000;

pub async fn run(args: ConceptsArgs) -> anyhow::Result<()> {
    let book = book_from_args(&args)?;
    let config = GeminiConfig::from_env(&args.gemini.model, &args.gemini.base_url)
        .context("load gemini config")?;
    let client = gemini::http_client()?;

    tracing::info!(
        book = %book.title,
        day = args.day,
        model = %config.model,
        "generate daily concepts"
    );

    let concepts = generate_daily_concepts(&client, &config, &book, args.day).await?;

    if args.json {
        let lesson = serde_json::json!({
            "book": book,
            "day": args.day,
            "concepts": concepts,
        });
        println!("{}", serde_json::to_string_pretty(&lesson)?);
        return Ok(());
    }

    println!("Day {} — {}", args.day, book.title);
    for (index, concept) in concepts.iter().enumerate() {
        println!();
        println!("{}. {}", index + 1, concept.title);
        println!("   {}", concept.description);
        println!("   {}", concept.explanation);
    }
    Ok(())
}

fn book_from_args(args: &ConceptsArgs) -> anyhow::Result<BookContext> {
    let Some(path) = args.file.as_deref() else {
        let Some(title) = args.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            anyhow::bail!("missing --title (required unless --file is given)");
        };
        return Ok(BookContext {
            title: title.to_owned(),
            author: args.author.clone(),
            content_snippet: None,
        });
    };

    let excerpt = import::read_excerpt(std::path::Path::new(path))
        .with_context(|| format!("read excerpt: {path}"))?;
    let title = match args.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_owned(),
        None => excerpt.default_title.clone().ok_or_else(|| {
            anyhow::anyhow!("could not derive a title from {path}; pass --title")
        })?,
    };

    Ok(BookContext {
        title,
        author: args.author.clone(),
        content_snippet: Some(excerpt.text),
    })
}

/// Ask the model for one day's curriculum and validate the reply fail-closed.
/// Any transport, parse, or shape problem is an error; there are no partial
/// batches.
pub async fn generate_daily_concepts(
    client: &reqwest::Client,
    config: &GeminiConfig,
    book: &BookContext,
    day: u32,
) -> anyhow::Result<Vec<Concept>> {
    let prompt = daily_concepts_prompt(book, day);
    let request = GenerateContentRequest::from_prompt(&prompt).with_json_schema(response_schema());

    let response = gemini::generate_content(client, config, &request)
        .await
        .context("request daily concepts")?;

    let raw = gemini::response_text(&response);
    if raw.trim().is_empty() {
        anyhow::bail!("concepts response contains no text");
    }

    parse_concepts(&raw, day).context("parse daily concepts")
}

pub fn concept_id(day: u32, index: usize) -> String {
    format!("day-{day}-concept-{index}")
}

fn daily_concepts_prompt(book: &BookContext, day: u32) -> String {
    let mut prompt = format!(
        "Act as an expert educational tutor. The user is reading the book \"{}\"",
        book.title
    );
    if let Some(author) = book.author.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        prompt.push_str(&format!(" by {author}"));
    }
    prompt.push_str(".\n");

    if let Some(snippet) = book.content_snippet.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!(
            "Here is a snippet of the content: \"{}...\"\n",
            clip_chars(snippet, SNIPPET_PROMPT_CHARS)
        ));
    }

    prompt.push_str(&format!(
        "\n\
Generate a curriculum for Day {day}.\n\
Extract exactly {CONCEPTS_PER_DAY} distinct, high-impact concepts from this book that are suitable for learning on this day.\n\
For each concept, provide a clear title, a brief description (1-2 sentences), and a detailed explanation (3-4 sentences) helping the user 'rewire' their understanding.\n\
\n\
Return the response in JSON format.\n"
    ));

    prompt
}

/// The structured-output constraint sent with the concepts request: a JSON
/// array of objects with required string fields.
fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING" },
                "description": { "type": "STRING" },
                "explanation": { "type": "STRING" },
            },
            "required": ["title", "description", "explanation"],
        },
    })
}

#[derive(Debug, Deserialize)]
struct ConceptSeed {
    title: String,
    description: String,
    explanation: String,
}

fn parse_concepts(raw: &str, day: u32) -> anyhow::Result<Vec<Concept>> {
    let seeds: Vec<ConceptSeed> =
        serde_json::from_str(raw).context("concepts reply is not a JSON array")?;

    if seeds.len() != CONCEPTS_PER_DAY {
        anyhow::bail!(
            "expected {CONCEPTS_PER_DAY} concepts, got {}",
            seeds.len()
        );
    }

    let mut concepts = Vec::with_capacity(seeds.len());
    for (index, seed) in seeds.into_iter().enumerate() {
        if seed.title.trim().is_empty() {
            anyhow::bail!("concept {index} has an empty title");
        }
        if seed.description.trim().is_empty() {
            anyhow::bail!("concept {index} has an empty description");
        }
        if seed.explanation.trim().is_empty() {
            anyhow::bail!("concept {index} has an empty explanation");
        }
        concepts.push(Concept {
            id: concept_id(day, index),
            title: seed.title,
            description: seed.description,
            explanation: seed.explanation,
        });
    }

    Ok(concepts)
}

fn clip_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
