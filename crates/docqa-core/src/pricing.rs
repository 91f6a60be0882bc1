//! Token usage and cost estimates for answer generation.
//!
//! Costs are linear in token counts: `tokens × price_per_million / 1e6`
//! per direction. Estimates are reported, never acted upon.

use serde::{Deserialize, Serialize};

/// Price per million tokens, in USD, for one pricing scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    pub name: String,
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl PricingTier {
    pub fn new(name: &str, input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            name: name.to_string(),
            input_per_mtok,
            output_per_mtok,
        }
    }
}

/// Conservative, moderate and premium scenarios.
pub fn default_tiers() -> Vec<PricingTier> {
    vec![
        PricingTier::new("conservative", 3.0, 15.0),
        PricingTier::new("moderate", 4.0, 20.0),
        PricingTier::new("premium", 5.0, 25.0),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub tier: String,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

pub fn estimate(usage: &TokenUsage, tier: &PricingTier) -> CostEstimate {
    let input_cost = usage.input_tokens as f64 * tier.input_per_mtok / 1_000_000.0;
    let output_cost = usage.output_tokens as f64 * tier.output_per_mtok / 1_000_000.0;
    CostEstimate {
        tier: tier.name.clone(),
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

pub fn estimate_all(usage: &TokenUsage, tiers: &[PricingTier]) -> Vec<CostEstimate> {
    tiers.iter().map(|t| estimate(usage, t)).collect()
}

/// Human-readable usage block printed after an answer.
pub fn format_usage_report(usage: &TokenUsage, estimates: &[CostEstimate]) -> String {
    let mut out = String::from("TOKEN USAGE & COST ESTIMATES:\n");
    out.push_str(&format!("Input tokens:  {}\n", group_thousands(usage.input_tokens)));
    out.push_str(&format!("Output tokens: {}\n", group_thousands(usage.output_tokens)));
    out.push_str(&format!("Total tokens:  {}\n", group_thousands(usage.total())));

    if !estimates.is_empty() {
        out.push_str("\nCost estimates:\n");
        let width = estimates.iter().map(|e| e.tier.len()).max().unwrap_or(0) + 1;
        for e in estimates {
            out.push_str(&format!(
                "{:<width$} ${:.6} (${:.6} + ${:.6})\n",
                format!("{}:", capitalize(&e.tier)),
                e.total_cost,
                e.input_cost,
                e.output_cost,
                width = width
            ));
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_costs_are_linear_in_tokens() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 2_000_000,
        };
        let est = estimate(&usage, &PricingTier::new("conservative", 3.0, 15.0));
        assert!((est.input_cost - 3.0).abs() < 1e-9);
        assert!((est.output_cost - 30.0).abs() < 1e-9);
        assert!((est.total_cost - 33.0).abs() < 1e-9);

        let zero = estimate(&TokenUsage::default(), &PricingTier::new("x", 3.0, 15.0));
        assert_eq!(zero.total_cost, 0.0);
    }

    #[test]
    fn test_default_tiers_are_ordered_by_price() {
        let usage = TokenUsage {
            input_tokens: 1200,
            output_tokens: 300,
        };
        let all = estimate_all(&usage, &default_tiers());
        assert_eq!(all.len(), 3);
        assert!(all[0].total_cost < all[1].total_cost);
        assert!(all[1].total_cost < all[2].total_cost);
    }

    #[test]
    fn test_usage_report_formatting() {
        let usage = TokenUsage {
            input_tokens: 12_345,
            output_tokens: 678,
        };
        let report = format_usage_report(&usage, &estimate_all(&usage, &default_tiers()));
        assert!(report.contains("Input tokens:  12,345"));
        assert!(report.contains("Output tokens: 678"));
        assert!(report.contains("Total tokens:  13,023"));
        assert!(report.contains("Conservative:"));
        assert!(report.contains("Premium:"));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }
}
