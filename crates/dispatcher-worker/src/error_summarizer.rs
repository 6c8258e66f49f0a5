//! `ErrorSummarizer` — an injected dependency that turns an exception plus
//! task metadata into a short human-readable string. Its failure must
//! never mask the underlying task failure, so the boundary handler in
//! `server.rs` always has a fixed fallback ready.

use async_trait::async_trait;
use uuid::Uuid;

/// Metadata the summarizer is handed alongside the raw error.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub task_id: Uuid,
    pub proc_inst_id: String,
    pub agent_orch: String,
    pub tool: Option<String>,
}

/// Fixed fallback used whenever summarization is unavailable or itself
/// fails, carried over verbatim from the original source.
pub const FALLBACK_FRIENDLY_TEXT: &str = "처리 중 오류가 발생했습니다. 로그를 확인해 주세요.";

/// Maps an exception class name plus message to a short human-readable
/// summary. `None` tells the caller to fall back to
/// `FALLBACK_FRIENDLY_TEXT`.
#[async_trait]
pub trait ErrorSummarizer: Send + Sync {
    async fn summarize(&self, class_name: &str, message: &str, context: &ErrorContext) -> Option<String>;
}

/// Default summarizer used until a real one (LLM-backed) is wired in:
/// always defers to the fixed fallback.
#[derive(Debug, Default)]
pub struct NoopErrorSummarizer;

#[async_trait]
impl ErrorSummarizer for NoopErrorSummarizer {
    async fn summarize(&self, _class_name: &str, _message: &str, _context: &ErrorContext) -> Option<String> {
        None
    }
}
