//! Cost accounting helpers.

use crate::config::OrchestratorConfig;

/// Cost in USD for one call, from per-1k-token pricing, rounded to six
/// decimals. Unknown models price at zero.
pub fn cost_of(config: &OrchestratorConfig, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let pricing = config.pricing_for(model);
    let input_cost = f64::from(input_tokens) / 1000.0 * pricing.input;
    let output_cost = f64::from(output_tokens) / 1000.0 * pricing.output;
    round6(input_cost + output_cost)
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
