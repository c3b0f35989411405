use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::RenderedTemplate;

// --- Template names ---

pub const INDEX_TEMPLATE: &str = "blog/index.html";
pub const CATEGORY_TEMPLATE: &str = "blog/category.html";
pub const PROFILE_TEMPLATE: &str = "blog/profile.html";
pub const EDIT_PROFILE_TEMPLATE: &str = "blog/user.html";
pub const DETAIL_TEMPLATE: &str = "blog/detail.html";
pub const POST_FORM_TEMPLATE: &str = "blog/create.html";
pub const COMMENT_FORM_TEMPLATE: &str = "blog/comment.html";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to serialize context value `{key}`: {source}")]
    Context {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Context
///
/// The named values a template is rendered with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Result<Self, RenderError> {
        let value = serde_json::to_value(value).map_err(|source| RenderError::Context {
            key: key.to_string(),
            source,
        })?;
        self.0.insert(key.to_string(), value);
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Renderer
///
/// Turns a template name and its context into a response. The HTML templating engine
/// lives outside this service; implementations decide how the pair reaches the client.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, context: Context) -> Result<Response, RenderError>;
}

/// RendererState
///
/// The shared handle to the renderer held in `AppState`.
pub type RendererState = Arc<dyn Renderer>;

/// JsonRenderer
///
/// Responds with `{"template": ..., "context": ...}` so that a front-end (or a test)
/// can render or inspect the page.
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, template: &str, context: Context) -> Result<Response, RenderError> {
        tracing::debug!(template, "rendering template");

        let body = RenderedTemplate {
            template: template.to_string(),
            context: context.into_value(),
        };
        Ok((StatusCode::OK, Json(body)).into_response())
    }
}
