//! Token budgeting - character-based estimation against per-model context
//! windows.
//!
//! Estimates are deliberately rough (roughly four characters per token) and
//! consistent everywhere, so budget reports and message accounting agree.

use parley_core::Message;
use serde::Serialize;

/// Per-message framing overhead in the chat wire format.
const MESSAGE_OVERHEAD: u32 = 4;
/// Priming tokens for the assistant reply.
const REPLY_PRIMING: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    /// Roughly four characters per token.
    pub fn estimate_text(text: &str) -> u32 {
        (text.chars().count() / 4) as u32
    }

    /// Estimate the prompt size of a full history plus optional system
    /// prompt, including framing overhead.
    pub fn estimate_request(messages: &[Message], system_prompt: &str) -> u32 {
        let mut total = REPLY_PRIMING;
        if !system_prompt.is_empty() {
            total += MESSAGE_OVERHEAD + Self::estimate_text(system_prompt);
        }
        for message in messages {
            total += MESSAGE_OVERHEAD + Self::estimate_text(&message.content);
        }
        total
    }
}

/// Snapshot of budget occupancy for one upcoming call.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetReport {
    pub used: u32,
    pub max_tokens: u32,
    /// Tokens still usable after reserving the reply buffer.
    pub available: u32,
    /// Utilization as a percentage, rounded to two decimals.
    pub percentage: f64,
    pub warning: bool,
    pub exceeded: bool,
}

impl BudgetReport {
    /// Build a report from an estimated request size.
    ///
    /// `buffer` reserves room for the upcoming reply; `threshold` is the
    /// warning fraction of the window.
    pub fn new(used: u32, max_tokens: u32, threshold: f64, buffer: u32) -> Self {
        let max = max_tokens.max(1);
        let percentage = (f64::from(used) / f64::from(max) * 10_000.0).round() / 100.0;
        Self {
            used,
            max_tokens: max,
            available: max.saturating_sub(used).saturating_sub(buffer),
            percentage,
            warning: f64::from(used) >= f64::from(max) * threshold,
            exceeded: used >= max,
        }
    }
}
