use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, Json};
use axum::routing::{get, post};
use clap::Parser;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use rewire::app::model::{BookSetupRequest, Session};
use rewire::app::runner::LessonRunner;
use rewire::app::session_store::{InMemorySessionStore, SessionStore};
use rewire::cli::GeminiArgs;
use rewire::formats::ResearchData;
use rewire::gemini::GeminiConfig;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Maximum concurrent lesson generations.
    #[arg(long, default_value_t = 4)]
    max_concurrency: usize,

    /// Static web assets directory (served if it exists; otherwise the
    /// embedded page is used).
    #[arg(long, default_value = "web/dist")]
    web_dir: PathBuf,

    #[command(flatten)]
    gemini: GeminiArgs,
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn SessionStore>,
    runner: LessonRunner,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    rewire::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(addr = %args.addr, "starting rewire-app");

    let gemini = GeminiConfig::from_env(&args.gemini.model, &args.gemini.base_url)?;
    let store = InMemorySessionStore::shared();
    let runner = LessonRunner::new(Arc::clone(&store), gemini, args.max_concurrency)?;
    let state = AppState { store, runner };

    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:session_id", get(get_session))
        .route("/api/sessions/:session_id/start", post(start_setup))
        .route("/api/sessions/:session_id/back", post(back_to_hero))
        .route("/api/sessions/:session_id/book", post(complete_setup))
        .route("/api/sessions/:session_id/next-day", post(next_day))
        .route("/api/sessions/:session_id/retry", post(retry_lesson))
        .route("/api/sessions/:session_id/reset", post(reset_session))
        .route(
            "/api/sessions/:session_id/concepts/:concept_id/research",
            post(concept_research),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let web_index = args.web_dir.join("index.html");
    if web_index.exists() {
        let static_files = ServeDir::new(args.web_dir).not_found_service(ServeFile::new(web_index));
        app = app.fallback_service(static_files);
    } else {
        app = app.fallback(|| async { Html(include_str!("../../web/app.html")) });
    }

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "install ctrl-c handler");
    }
}

type ApiError = (StatusCode, String);

fn internal(err: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

fn conflict(err: anyhow::Error) -> ApiError {
    (StatusCode::CONFLICT, format!("{err:#}"))
}

async fn load_session(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
    match state.store.get(session_id).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err((StatusCode::NOT_FOUND, "session not found".to_owned())),
        Err(err) => Err(internal(err)),
    }
}

async fn save_session(state: &AppState, session: &Session) -> Result<(), ApiError> {
    state.store.put(session).await.map_err(internal)
}

async fn create_session(State(state): State<AppState>) -> Result<Json<Session>, ApiError> {
    let session = Session::new();
    state.store.create(&session).await.map_err(internal)?;
    tracing::info!(session_id = %session.session_id, "session created");
    Ok(Json(session))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let session = load_session(&state, &session_id).await?;
    Ok(Json(session))
}

async fn start_setup(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let mut session = load_session(&state, &session_id).await?;
    session.start_setup().map_err(conflict)?;
    save_session(&state, &session).await?;
    Ok(Json(session))
}

async fn back_to_hero(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let mut session = load_session(&state, &session_id).await?;
    session.back_to_hero().map_err(conflict)?;
    save_session(&state, &session).await?;
    Ok(Json(session))
}

async fn complete_setup(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<BookSetupRequest>,
) -> Result<Json<Session>, ApiError> {
    let book = request
        .into_book()
        .map_err(|err| (StatusCode::BAD_REQUEST, format!("{err:#}")))?;

    let mut session = load_session(&state, &session_id).await?;
    session.begin_dashboard(book).map_err(conflict)?;
    save_session(&state, &session).await?;

    state.runner.spawn_generation(&session.session_id, session.day);
    Ok(Json(session))
}

async fn next_day(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let mut session = load_session(&state, &session_id).await?;
    session.advance_day().map_err(conflict)?;
    save_session(&state, &session).await?;

    state.runner.spawn_generation(&session.session_id, session.day);
    Ok(Json(session))
}

async fn retry_lesson(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let mut session = load_session(&state, &session_id).await?;
    session.begin_retry().map_err(conflict)?;
    save_session(&state, &session).await?;

    state.runner.spawn_generation(&session.session_id, session.day);
    Ok(Json(session))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let mut session = load_session(&state, &session_id).await?;
    session.reset_to_setup().map_err(conflict)?;
    save_session(&state, &session).await?;
    Ok(Json(session))
}

async fn concept_research(
    State(state): State<AppState>,
    Path((session_id, concept_id)): Path<(String, String)>,
) -> Result<Json<ResearchData>, ApiError> {
    match state
        .runner
        .concept_research(&session_id, &concept_id)
        .await
    {
        Ok(Some(research)) => Ok(Json(research)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            "unknown session or concept".to_owned(),
        )),
        Err(err) => Err(internal(err)),
    }
}
