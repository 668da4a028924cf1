use std::collections::HashSet;

use anyhow::Context as _;

use crate::cli::ResearchArgs;
use crate::formats::{ResearchData, Source};
use crate::gemini::{self, GeminiConfig, GenerateContentRequest, WebSource};

/// Shown when the research call fails outright. Research is supplementary
/// content, so the failure is degraded rather than surfaced.
pub const FALLBACK_SUMMARY: &str = "Unable to fetch latest research at this time.";

/// Shown when the call succeeds but the model returns no text.
pub const EMPTY_SUMMARY: &str = "No recent research found.";

pub async fn run(args: ResearchArgs) -> anyhow::Result<()> {
    let config = GeminiConfig::from_env(&args.gemini.model, &args.gemini.base_url)
        .context("load gemini config")?;
    let client = gemini::http_client()?;

    tracing::info!(
        concept = %args.concept,
        book = %args.book,
        model = %config.model,
        "fetch concept research"
    );

    let research = fetch_research(&client, &config, &args.concept, &args.book).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&research)?);
        return Ok(());
    }

    println!("{}", research.summary);
    if !research.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &research.sources {
            println!("- {} <{}>", source.title, source.uri);
        }
    }
    Ok(())
}

/// Search-grounded research lookup for one concept. Never fails: transport
/// and parse errors degrade to [`FALLBACK_SUMMARY`] with no sources.
pub async fn fetch_research(
    client: &reqwest::Client,
    config: &GeminiConfig,
    concept_title: &str,
    book_title: &str,
) -> ResearchData {
    match try_fetch_research(client, config, concept_title, book_title).await {
        Ok(research) => research,
        Err(err) => {
            tracing::warn!(
                concept = concept_title,
                error = %format!("{err:#}"),
                "research fetch failed; returning fallback"
            );
            ResearchData {
                summary: FALLBACK_SUMMARY.to_owned(),
                sources: Vec::new(),
            }
        }
    }
}

async fn try_fetch_research(
    client: &reqwest::Client,
    config: &GeminiConfig,
    concept_title: &str,
    book_title: &str,
) -> anyhow::Result<ResearchData> {
    let prompt = research_prompt(concept_title, book_title);
    let request = GenerateContentRequest::from_prompt(&prompt).with_google_search();

    let response = gemini::generate_content(client, config, &request)
        .await
        .context("request concept research")?;

    let text = gemini::response_text(&response);
    let summary = if text.trim().is_empty() {
        EMPTY_SUMMARY.to_owned()
    } else {
        text
    };

    Ok(ResearchData {
        summary,
        sources: collect_sources(gemini::grounding_sources(&response)),
    })
}

fn research_prompt(concept_title: &str, book_title: &str) -> String {
    format!(
        "Find the latest research, scientific studies, news, or real-world applications related to the concept \"{concept_title}\"\n\
specifically in the context of the topics discussed in the book \"{book_title}\".\n\
\n\
Summarize the findings in 2 paragraphs. Focus on new discoveries or modern validations of this concept.\n"
    )
}

/// Drop cited entries missing a uri or title, then deduplicate by uri
/// keeping the first occurrence.
pub fn collect_sources(cited: Vec<WebSource>) -> Vec<Source> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for entry in cited {
        let Some(uri) = entry.uri.filter(|u| !u.trim().is_empty()) else {
            continue;
        };
        let Some(title) = entry.title.filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        if seen.insert(uri.clone()) {
            sources.push(Source { title, uri });
        }
    }

    sources
}
