//! In-crate test doubles for agents and the language model

use super::Agent;
use crate::error::RouterError;
use crate::llm::LanguageModel;
use crate::models::{AgentKind, AgentOutput, ResponseEnvelope, RouteRequest};
use crate::Result;
use async_trait::async_trait;
use axum::http::{StatusCode, Uri};
use axum::Json;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum Behaviour {
    Value(Value),
    Envelope(ResponseEnvelope),
    Fail(String),
    Panic,
    Sleep(Duration),
}

pub struct StubAgent {
    kind: AgentKind,
    behaviour: Behaviour,
    seen: Mutex<Vec<RouteRequest>>,
}

impl StubAgent {
    fn with(kind: AgentKind, behaviour: Behaviour) -> Self {
        Self {
            kind,
            behaviour,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn value(kind: AgentKind, value: Value) -> Self {
        Self::with(kind, Behaviour::Value(value))
    }

    pub fn envelope(kind: AgentKind, envelope: ResponseEnvelope) -> Self {
        Self::with(kind, Behaviour::Envelope(envelope))
    }

    pub fn failing(kind: AgentKind, message: &str) -> Self {
        Self::with(kind, Behaviour::Fail(message.to_string()))
    }

    pub fn panicking(kind: AgentKind) -> Self {
        Self::with(kind, Behaviour::Panic)
    }

    pub fn slow(kind: AgentKind, delay: Duration) -> Self {
        Self::with(kind, Behaviour::Sleep(delay))
    }

    /// Requests this agent was called with
    pub fn seen(&self) -> Vec<RouteRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn run(&self, request: RouteRequest) -> Result<AgentOutput> {
        self.seen.lock().unwrap().push(request.clone());

        match &self.behaviour {
            Behaviour::Value(value) => Ok(AgentOutput::Value(value.clone())),
            Behaviour::Envelope(envelope) => Ok(AgentOutput::Envelope(envelope.clone())),
            Behaviour::Fail(message) => Err(RouterError::Agent(message.clone())),
            Behaviour::Panic => panic!("{} blew up", self.kind),
            Behaviour::Sleep(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(AgentOutput::Value(json!({"late": true})))
            }
        }
    }
}

/// Language model returning a canned answer, or failing
pub struct StubLlm {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl StubLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for StubLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| RouterError::Llm("stub model unavailable".to_string()))
    }
}

/// Serves canned JSON bodies by exact path (any method) on an ephemeral
/// local port; unknown paths get 404. Returns the `http://host:port` base.
pub async fn serve_json(routes: Vec<(&'static str, Value)>) -> String {
    let routes = Arc::new(routes);
    let app = axum::Router::new().fallback(move |uri: Uri| {
        let routes = routes.clone();
        async move {
            match routes.iter().find(|(path, _)| *path == uri.path()) {
                Some((_, body)) => (StatusCode::OK, Json(body.clone())),
                None => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))),
            }
        }
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}
