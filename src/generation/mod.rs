//! Answer generation: prompt assembly, streaming, citation resolution

mod citation;
mod prompt;
mod stream;

pub use citation::resolve_citations;
pub use prompt::{AssembledContext, ContextAssembler};
pub use stream::GroqClient;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::Result;

/// Incremental answer fragments; concatenating all yielded fragments
/// reproduces the full model output exactly
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// User-visible text substituted when generation fails mid-stream
///
/// This exact text is what gets persisted as the assistant message, so stored
/// history matches what the user saw.
pub const GENERATION_FAILURE_TEXT: &str =
    "Sorry, something went wrong while generating the answer.";

/// Trait for streaming answer generation
///
/// Implementations never yield empty-string fragments, and a failure before
/// the first fragment surfaces as an `Err` from `stream_answer` rather than
/// an empty stream.
#[async_trait]
pub trait AnswerStreamer: Send + Sync {
    /// Start a model call for the given prompt and stream its output
    async fn stream_answer(&self, prompt: &str) -> Result<FragmentStream>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
