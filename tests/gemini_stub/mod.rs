use std::io::Read as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

/// How the stub answers `generateContent` calls. Requests carrying a
/// `tools` array are research lookups; everything else is a concepts
/// request.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum StubBehavior {
    /// Concepts and research both succeed.
    Normal,
    /// Concepts replies carry three items instead of five.
    ShortBatch,
    /// Concepts replies are not JSON.
    MalformedConcepts,
    /// Every call fails with an API error body.
    ApiError,
    /// The first concepts call fails, later ones succeed.
    FailFirstConcepts,
    /// Concepts succeed, research calls fail.
    ResearchError,
}

pub struct GeminiStub {
    pub base_url: String,
    requests: Arc<AtomicUsize>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl GeminiStub {
    pub fn spawn(behavior: StubBehavior) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start gemini stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1beta");

        let requests = Arc::new(AtomicUsize::new(0));
        let requests_for_server = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let concepts_calls = AtomicUsize::new(0);
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post
                    || !path.starts_with("/v1beta/models/")
                    || !path.contains(":generateContent")
                {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                if !request
                    .headers()
                    .iter()
                    .any(|header| header.field.equiv("x-goog-api-key"))
                {
                    let _ = respond_json(
                        request,
                        401,
                        error_body(401, "API key not valid. Please pass a valid API key."),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let Ok(parsed) = serde_json::from_str::<Value>(&body) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid json").with_status_code(400),
                    );
                    continue;
                };

                requests_for_server.fetch_add(1, Ordering::SeqCst);
                let is_research = parsed.get("tools").is_some();
                if !is_research {
                    concepts_calls.fetch_add(1, Ordering::SeqCst);
                }

                let (status, response_body) = match behavior {
                    StubBehavior::ApiError => (500, error_body(500, "internal error")),
                    StubBehavior::ResearchError if is_research => {
                        (500, error_body(500, "search tool unavailable"))
                    }
                    StubBehavior::FailFirstConcepts
                        if !is_research && concepts_calls.load(Ordering::SeqCst) == 1 =>
                    {
                        (503, error_body(503, "model overloaded"))
                    }
                    StubBehavior::MalformedConcepts if !is_research => {
                        (200, text_response("here are five great concepts"))
                    }
                    StubBehavior::ShortBatch if !is_research => {
                        (200, text_response(&concepts_json(3)))
                    }
                    _ if is_research => (200, research_response()),
                    _ => (200, text_response(&concepts_json(5))),
                };

                let _ = respond_json(request, status, response_body);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Total `generateContent` calls served so far.
    #[allow(dead_code)]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for GeminiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn respond_json(
    request: tiny_http::Request,
    status: u16,
    body: Value,
) -> Result<(), std::io::Error> {
    let mut response =
        tiny_http::Response::from_string(body.to_string()).with_status_code(status);
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build content-type header");
    response = response.with_header(header);
    request.respond(response)
}

fn error_body(code: u16, message: &str) -> Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "status": "INTERNAL",
        }
    })
}

fn text_response(text: &str) -> Value {
    serde_json::json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "text": text }]
            },
            "finishReason": "STOP"
        }]
    })
}

fn concepts_json(count: usize) -> String {
    let items = (0..count)
        .map(|index| {
            serde_json::json!({
                "title": format!("Keystone Idea {}", index + 1),
                "description": "A short framing of the idea in one or two sentences.",
                "explanation": "A longer walkthrough of the idea. It connects the chapter's argument to daily practice. It closes with a concrete example.",
            })
        })
        .collect::<Vec<_>>();
    serde_json::to_string(&items).expect("serialize stub concepts")
}

fn research_response() -> Value {
    serde_json::json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    { "text": "Recent studies continue to validate this concept.\n\n" },
                    { "text": "Field experiments report durable effects at scale." }
                ]
            },
            "finishReason": "STOP",
            "groundingMetadata": {
                "groundingChunks": [
                    { "web": { "uri": "https://journal.example/a", "title": "Journal A" } },
                    { "web": { "uri": "https://journal.example/untitled" } },
                    { "web": { "uri": "https://journal.example/a", "title": "Journal A (repost)" } },
                    { "retrievedContext": { "uri": "ctx://ignored" } },
                    { "web": { "uri": "https://news.example/b", "title": "News B" } }
                ],
                "webSearchQueries": ["latest research"]
            }
        }]
    })
}
