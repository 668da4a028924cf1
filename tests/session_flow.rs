use std::sync::Arc;
use std::time::Duration;

use rewire::app::model::{BookSetupRequest, GENERATION_FAILED_MESSAGE, Session, ViewState};
use rewire::app::runner::LessonRunner;
use rewire::app::session_store::{InMemorySessionStore, SessionStore};
use rewire::gemini::GeminiConfig;
use rewire::research::FALLBACK_SUMMARY;

mod gemini_stub;

use gemini_stub::{GeminiStub, StubBehavior};

fn test_config(stub: &GeminiStub) -> GeminiConfig {
    GeminiConfig {
        api_key: "test-key".to_owned(),
        base_url: stub.base_url.clone(),
        model: "gemini-2.5-flash".to_owned(),
    }
}

fn setup_request(title: &str) -> BookSetupRequest {
    BookSetupRequest {
        title: title.to_owned(),
        author: None,
        content_snippet: None,
    }
}

/// Drive a session from hero to a loading dashboard, the way the app
/// handlers do: transition, save, spawn.
async fn start_learning(
    store: &Arc<dyn SessionStore>,
    runner: &LessonRunner,
    title: &str,
) -> anyhow::Result<Session> {
    let mut session = Session::new();
    store.create(&session).await?;

    session.start_setup()?;
    session.begin_dashboard(setup_request(title).into_book()?)?;
    store.put(&session).await?;
    runner.spawn_generation(&session.session_id, session.day);
    Ok(session)
}

async fn wait_until_loaded(
    store: &Arc<dyn SessionStore>,
    session_id: &str,
) -> anyhow::Result<Session> {
    for _ in 0..200 {
        let session = store
            .get(session_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("session disappeared"))?;
        if !session.loading {
            return Ok(session);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("lesson never finished loading")
}

#[tokio::test(flavor = "multi_thread")]
async fn dashboard_loads_five_concepts_per_day() -> anyhow::Result<()> {
    let stub = GeminiStub::spawn(StubBehavior::Normal);
    let store = InMemorySessionStore::shared();
    let runner = LessonRunner::new(Arc::clone(&store), test_config(&stub), 2)?;

    let session = start_learning(&store, &runner, "Atomic Habits").await?;
    assert_eq!(session.view, ViewState::Dashboard);
    assert_eq!(session.day, 1);

    let session = wait_until_loaded(&store, &session.session_id).await?;
    assert!(session.error.is_none());
    assert_eq!(session.concepts.len(), 5);
    for (index, concept) in session.concepts.iter().enumerate() {
        assert_eq!(concept.id, format!("day-1-concept-{index}"));
    }
    assert_eq!(stub.request_count(), 1);

    // Next day discards the old batch and issues exactly one new request.
    let mut session = session;
    session.advance_day()?;
    assert!(session.concepts.is_empty());
    store.put(&session).await?;
    runner.spawn_generation(&session.session_id, session.day);

    let session = wait_until_loaded(&store, &session.session_id).await?;
    assert_eq!(session.day, 2);
    assert_eq!(session.concepts[0].id, "day-2-concept-0");
    assert_eq!(stub.request_count(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_generation_is_retryable() -> anyhow::Result<()> {
    let stub = GeminiStub::spawn(StubBehavior::FailFirstConcepts);
    let store = InMemorySessionStore::shared();
    let runner = LessonRunner::new(Arc::clone(&store), test_config(&stub), 2)?;

    let session = start_learning(&store, &runner, "Atomic Habits").await?;
    let session = wait_until_loaded(&store, &session.session_id).await?;

    assert_eq!(session.error.as_deref(), Some(GENERATION_FAILED_MESSAGE));
    assert!(session.concepts.is_empty());

    let mut session = session;
    session.begin_retry()?;
    assert_eq!(session.day, 1);
    store.put(&session).await?;
    runner.spawn_generation(&session.session_id, session.day);

    let session = wait_until_loaded(&store, &session.session_id).await?;
    assert!(session.error.is_none());
    assert_eq!(session.concepts.len(), 5);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn research_is_fetched_once_and_cached() -> anyhow::Result<()> {
    let stub = GeminiStub::spawn(StubBehavior::Normal);
    let store = InMemorySessionStore::shared();
    let runner = LessonRunner::new(Arc::clone(&store), test_config(&stub), 2)?;

    let session = start_learning(&store, &runner, "Atomic Habits").await?;
    let session = wait_until_loaded(&store, &session.session_id).await?;
    assert_eq!(stub.request_count(), 1);

    let concept_id = session.concepts[0].id.clone();
    let research = runner
        .concept_research(&session.session_id, &concept_id)
        .await?
        .expect("research for known concept");
    assert!(research.summary.contains("Recent studies"));
    assert_eq!(research.sources.len(), 2);
    assert_eq!(research.sources[0].uri, "https://journal.example/a");
    assert_eq!(research.sources[1].uri, "https://news.example/b");
    assert_eq!(stub.request_count(), 2);

    // Second expansion of the same card hits the session cache.
    let cached = runner
        .concept_research(&session.session_id, &concept_id)
        .await?
        .expect("cached research");
    assert_eq!(cached.summary, research.summary);
    assert_eq!(stub.request_count(), 2);

    // A different card triggers its own fetch.
    let other_id = session.concepts[1].id.clone();
    runner
        .concept_research(&session.session_id, &other_id)
        .await?
        .expect("research for second concept");
    assert_eq!(stub.request_count(), 3);

    let unknown = runner
        .concept_research(&session.session_id, "day-9-concept-0")
        .await?;
    assert!(unknown.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn research_failure_degrades_without_blocking_other_cards() -> anyhow::Result<()> {
    let stub = GeminiStub::spawn(StubBehavior::ResearchError);
    let store = InMemorySessionStore::shared();
    let runner = LessonRunner::new(Arc::clone(&store), test_config(&stub), 2)?;

    let session = start_learning(&store, &runner, "Atomic Habits").await?;
    let session = wait_until_loaded(&store, &session.session_id).await?;
    assert_eq!(session.concepts.len(), 5);

    let first = runner
        .concept_research(&session.session_id, &session.concepts[0].id)
        .await?
        .expect("degraded research");
    assert_eq!(first.summary, FALLBACK_SUMMARY);
    assert!(first.sources.is_empty());

    // Other cards stay expandable after a failure.
    let second = runner
        .concept_research(&session.session_id, &session.concepts[1].id)
        .await?
        .expect("degraded research for second card");
    assert_eq!(second.summary, FALLBACK_SUMMARY);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_returns_to_setup_and_drops_session_content() -> anyhow::Result<()> {
    let stub = GeminiStub::spawn(StubBehavior::Normal);
    let store = InMemorySessionStore::shared();
    let runner = LessonRunner::new(Arc::clone(&store), test_config(&stub), 2)?;

    let session = start_learning(&store, &runner, "Atomic Habits").await?;
    let mut session = wait_until_loaded(&store, &session.session_id).await?;

    session.reset_to_setup()?;
    store.put(&session).await?;

    let session = store
        .get(&session.session_id)
        .await?
        .expect("session exists");
    assert_eq!(session.view, ViewState::Setup);
    assert!(session.book.is_none());
    assert!(session.concepts.is_empty());
    assert!(session.research.is_empty());
    Ok(())
}
