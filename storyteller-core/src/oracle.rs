//! The text-completion capability every stage calls.

use async_trait::async_trait;
use claude::{Claude, Request, Response};

/// A hosted language model that answers completion requests.
///
/// The storyteller never talks to HTTP directly; routing, writing and
/// scoring all go through this trait so tests can script the model.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send one request and wait for the full response.
    async fn complete(&self, request: Request) -> Result<Response, claude::Error>;
}

#[async_trait]
impl Oracle for Claude {
    async fn complete(&self, request: Request) -> Result<Response, claude::Error> {
        Claude::complete(self, request).await
    }
}

#[async_trait]
impl<O: Oracle + ?Sized> Oracle for std::sync::Arc<O> {
    async fn complete(&self, request: Request) -> Result<Response, claude::Error> {
        (**self).complete(request).await
    }
}

/// Model, token and temperature settings for one stage's oracle calls.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSettings {
    /// Model override; the client default is used when `None`.
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl CallSettings {
    pub fn new(max_tokens: usize, temperature: f32) -> Self {
        Self {
            model: None,
            max_tokens,
            temperature,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Apply these settings to a request.
    pub fn apply(&self, request: Request) -> Request {
        let request = request
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        match &self.model {
            Some(model) => request.with_model(model),
            None => request,
        }
    }
}
