// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Per-model cost accounting, price per 1K tokens.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CostTable {
    price_per_1k_tokens: HashMap<String, f64>,
}

impl Default for CostTable {
    fn default() -> Self {
        let mut price_per_1k_tokens = HashMap::new();
        price_per_1k_tokens.insert("text-embedding-3-small".to_string(), 0.00002);
        price_per_1k_tokens.insert("text-embedding-3-large".to_string(), 0.00013);
        price_per_1k_tokens.insert("null-pseudo-embedding".to_string(), 0.0);
        Self { price_per_1k_tokens }
    }
}

impl CostTable {
    pub fn new(price_per_1k_tokens: HashMap<String, f64>) -> Self {
        Self { price_per_1k_tokens }
    }

    /// Cost of `total_tokens` on `model`. Unlisted models fall back to the
    /// cheapest listed price rather than erroring, matching upstream
    /// behavior for unknown/new model identifiers.
    pub fn cost(&self, model: &str, total_tokens: u64) -> f64 {
        let price = self.price_per_1k_tokens.get(model).copied().unwrap_or_else(|| {
            self.price_per_1k_tokens
                .values()
                .cloned()
                .fold(f64::INFINITY, f64::min)
                .max(0.0)
        });
        price * (total_tokens as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_listed_price() {
        let table = CostTable::default();
        let cost = table.cost("text-embedding-3-small", 1000);
        assert!((cost - 0.00002).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_minimum_price() {
        let table = CostTable::default();
        let cost = table.cost("some-future-model", 1000);
        assert_eq!(cost, 0.0);
    }
}
