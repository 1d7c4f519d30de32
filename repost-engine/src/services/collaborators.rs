//! Collaborator capabilities
//!
//! The engine talks to caption generation, posting-time advice and platform
//! publication through these traits. Fallback implementations are injected
//! when no real collaborator is configured, and every call made during a
//! cycle goes through a timeout that degrades to the fallback.

use crate::config::SlotConfig;
use crate::error::{Error, Result};
use crate::services::slot_allocator::fallback_grid;
use crate::types::PreferredSlot;
use async_trait::async_trait;
use repost_common::{ContentItem, Platform, RepostQueueEntry};
use std::time::Duration;

/// Caption used when nothing printable survives cleanup
pub const FALLBACK_CAPTION: &str = "From the archive";

/// Maximum caption length per platform, in characters
pub fn caption_limit(platform: Platform) -> usize {
    match platform {
        Platform::YouTube => 100,
        Platform::Instagram => 2200,
    }
}

/// Deterministic caption cleanup
///
/// Control characters become spaces, `<>{}` are dropped, whitespace runs
/// collapse, and the result is cut to the platform limit on a char boundary.
pub fn clean_caption(source: Option<&str>, platform: Platform) -> String {
    let filtered: String = source
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '{' | '}'))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(caption_limit(platform)).collect();
    let truncated = truncated.trim_end();

    if truncated.is_empty() {
        FALLBACK_CAPTION.to_string()
    } else {
        truncated.to_string()
    }
}

/// Produces a fresh caption for a repost
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn generate(&self, source_caption: Option<&str>, platform: Platform) -> Result<String>;
}

/// Caption generator that only applies the deterministic cleanup
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackCaptionGenerator;

#[async_trait]
impl CaptionGenerator for FallbackCaptionGenerator {
    async fn generate(&self, source_caption: Option<&str>, platform: Platform) -> Result<String> {
        Ok(clean_caption(source_caption, platform))
    }
}

/// Supplies ranked preferred posting slots
#[async_trait]
pub trait PostingTimeAdvisor: Send + Sync {
    async fn preferred_slots(&self, platform: Platform, count: usize) -> Result<Vec<PreferredSlot>>;
}

/// Advisor returning the fixed evenly spaced grid
#[derive(Debug, Clone)]
pub struct FixedGridAdvisor {
    config: SlotConfig,
}

impl FixedGridAdvisor {
    pub fn new(config: SlotConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PostingTimeAdvisor for FixedGridAdvisor {
    async fn preferred_slots(&self, _platform: Platform, _count: usize) -> Result<Vec<PreferredSlot>> {
        Ok(fallback_grid(&self.config))
    }
}

/// Performs the actual platform upload of a claimed entry
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, entry: &RepostQueueEntry, item: &ContentItem) -> Result<()>;
}

/// Run a collaborator call under a deadline
pub async fn with_timeout<T, F>(what: &str, limit: Duration, call: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "{} did not answer within {} ms",
            what,
            limit.as_millis()
        ))),
    }
}

/// Generate a caption, degrading to the cleanup on error, timeout or an
/// empty answer
pub async fn caption_with_fallback(
    generator: &dyn CaptionGenerator,
    source_caption: Option<&str>,
    platform: Platform,
    limit: Duration,
) -> String {
    match with_timeout("caption generator", limit, generator.generate(source_caption, platform)).await
    {
        Ok(text) if !text.trim().is_empty() => {
            let cut: String = text.trim().chars().take(caption_limit(platform)).collect();
            cut.trim_end().to_string()
        }
        Ok(_) => {
            tracing::warn!(platform = %platform, "Caption generator returned empty text, using cleanup");
            clean_caption(source_caption, platform)
        }
        Err(e) => {
            tracing::warn!(platform = %platform, error = %e, "Caption generation failed, using cleanup");
            clean_caption(source_caption, platform)
        }
    }
}

/// Fetch preferred slots, degrading to the fixed grid on error or timeout
///
/// An empty answer is passed through; the allocator substitutes the grid.
pub async fn slots_with_fallback(
    advisor: &dyn PostingTimeAdvisor,
    platform: Platform,
    count: usize,
    limit: Duration,
    config: &SlotConfig,
) -> Vec<PreferredSlot> {
    match with_timeout("posting time advisor", limit, advisor.preferred_slots(platform, count)).await
    {
        Ok(slots) => slots,
        Err(e) => {
            tracing::warn!(platform = %platform, error = %e, "Preferred slot lookup failed, using fixed grid");
            fallback_grid(config)
        }
    }
}
