//! Deterministic stand-in for the generation API.
//!
//! Replays a queue of canned replies and records every request it saw, so
//! retry counts and prompt contents can be asserted without a network.

use super::client::{ClientError, GenerationClient, GenerationRequest, GenerationResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One canned reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Empty,
    Error(String),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }
}

/// Chooses a reply by looking at the request. Used when several defects share
/// one client and the order of calls is not fixed.
pub type Responder = dyn Fn(&GenerationRequest) -> ScriptedReply + Send + Sync;

pub struct ScriptedClient {
    queue: Mutex<VecDeque<ScriptedReply>>,
    fallback: ScriptedReply,
    responder: Option<Box<Responder>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedClient {
    /// Replies in order, then `Empty` forever.
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            queue: Mutex::new(replies.into_iter().collect()),
            fallback: ScriptedReply::Empty,
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The same reply for every call.
    pub fn always(reply: ScriptedReply) -> Self {
        Self {
            fallback: reply,
            ..Self::new(Vec::new())
        }
    }

    /// Reply computed from each request.
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&GenerationRequest) -> ScriptedReply + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self, request: &GenerationRequest) -> ScriptedReply {
        if let Some(responder) = &self.responder {
            return responder(request);
        }
        self.queue
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ClientError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match self.next_reply(request) {
            ScriptedReply::Text(text) => Ok(GenerationResponse::text(text)),
            ScriptedReply::Empty => Ok(GenerationResponse::empty()),
            ScriptedReply::Error(message) => Err(ClientError::Status(message)),
        }
    }
}
