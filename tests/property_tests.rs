//! Property tests for the data-model invariants.

use engram::config::HybridWeights;
use engram::models::{
    KnowledgeItem, KnowledgeType, SearchFilter, default_consistency_table, estimate_tokens,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig { max_global_rejects: 8192, ..ProptestConfig::default() })]
    /// Any weight vector summing to 1.0 validates; scaled away from 1.0
    /// it does not.
    #[test]
    fn weights_sum_invariant(a in 0.0f64..1.0, b in 0.0f64..1.0, c in 0.0f64..1.0) {
        let sum = a + b + c;
        prop_assume!(sum > 0.1 && sum < 1.0);
        let weights = HybridWeights {
            alpha: a * (1.0 - 0.1) / sum,
            beta: b * (1.0 - 0.1) / sum,
            gamma: c * (1.0 - 0.1) / sum,
            delta: 0.1,
        };
        prop_assert!(weights.validate().is_ok());

        let skewed = HybridWeights { delta: 0.3, ..weights };
        prop_assert!(skewed.validate().is_err());
    }
}

proptest! {
    /// Token estimation is monotone in length and never undercounts by
    /// more than the rounding step.
    #[test]
    fn token_estimate_bounds(len in 0usize..4_000) {
        let text: String = "a".repeat(len);
        let tokens = estimate_tokens(&text);
        prop_assert_eq!(tokens, len.div_ceil(4));
        prop_assert!(tokens * 4 >= len);
    }

    /// Importance outside [0, 100] always fails validation; inside it
    /// always passes for an otherwise-valid item.
    #[test]
    fn importance_range_enforced(importance in -50.0f64..150.0) {
        let table = default_consistency_table();
        let mut item = KnowledgeItem::new(
            KnowledgeType::Factual,
            "prop",
            "some title",
            "some content",
        );
        item.importance = importance;
        let valid = item.validate(768, &table).is_ok();
        prop_assert_eq!(valid, (0.0..=100.0).contains(&importance));
    }

    /// Embeddings only validate at exactly the configured dimension.
    #[test]
    fn embedding_dimension_enforced(dim in 1usize..128, actual in 1usize..128) {
        let table = default_consistency_table();
        let mut item = KnowledgeItem::new(
            KnowledgeType::Factual,
            "prop",
            "some title",
            "some content",
        );
        item.embedding = Some(vec![0.5; actual]);
        let valid = item.validate(dim, &table).is_ok();
        prop_assert_eq!(valid, dim == actual);
    }

    /// An inactive item never matches a default filter but always
    /// matches once inactive items are included.
    #[test]
    fn filter_active_flag(active in any::<bool>()) {
        let mut item = KnowledgeItem::new(
            KnowledgeType::Factual,
            "prop",
            "some title",
            "some content",
        );
        item.is_active = active;
        prop_assert_eq!(SearchFilter::new().matches(&item), active);
        prop_assert!(SearchFilter::new().include_inactive().matches(&item));
    }
}
