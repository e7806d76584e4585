//! Property tests for the metrics registry and prompt assembly.

use proptest::prelude::*;
use ragline::metrics::MetricsRegistry;
use ragline::prompt::{PromptAssembler, NO_CONTEXT_FALLBACK};
use ragline::retrieval::ContextChunk;

proptest! {
    /// The latency window never grows past its configured capacity,
    /// no matter how many samples are recorded.
    #[test]
    fn latency_window_is_bounded(
        capacity in 1usize..64,
        samples in prop::collection::vec(0.0f64..10_000.0, 0..256),
    ) {
        let registry = MetricsRegistry::with_counters_and_window(&["ops"], capacity);
        for sample in &samples {
            registry.record_latency(*sample);
        }
        let snapshot = registry.snapshot();
        prop_assert!(snapshot.latency_sample_count <= capacity);
        prop_assert_eq!(snapshot.latency_sample_count, samples.len().min(capacity));
    }

    /// Average and p95 are both within the observed range of the window.
    #[test]
    fn latency_stats_stay_within_window_range(
        samples in prop::collection::vec(0.0f64..10_000.0, 1..128),
    ) {
        let registry = MetricsRegistry::with_counters_and_window(&["ops"], 128);
        for sample in &samples {
            registry.record_latency(*sample);
        }
        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let snapshot = registry.snapshot();
        prop_assert!(snapshot.avg_latency_ms >= min && snapshot.avg_latency_ms <= max);
        prop_assert!(snapshot.p95_latency_ms >= min && snapshot.p95_latency_ms <= max);
    }

    /// A counter's value is exactly the number of successful increments.
    #[test]
    fn counter_equals_increment_count(increments in 0u32..512) {
        let registry = MetricsRegistry::with_counters(&["ops"]);
        for _ in 0..increments {
            registry.increment_counter("ops").unwrap();
        }
        prop_assert_eq!(registry.counter_value("ops").unwrap(), u64::from(increments));
    }

    /// Formatted context contains every chunk's source and text, and falls
    /// back to the fixed marker only when there are no chunks.
    #[test]
    fn formatted_context_covers_all_chunks(
        chunks in prop::collection::vec(
            ("[a-z]{1,8}", "[a-z ]{1,32}", 0.0f32..=1.0),
            0..8,
        ),
    ) {
        let chunks: Vec<ContextChunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, (source, text, score))| ContextChunk {
                id: i.to_string(),
                source,
                text,
                score,
            })
            .collect();

        let formatted = PromptAssembler::format_context(&chunks);
        if chunks.is_empty() {
            prop_assert_eq!(formatted, NO_CONTEXT_FALLBACK);
        } else {
            for chunk in &chunks {
                prop_assert!(formatted.contains(&chunk.source));
                prop_assert!(formatted.contains(&chunk.text));
            }
        }
    }
}
