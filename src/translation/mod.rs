//! Dedup -> chunk -> bounded concurrent capability calls -> keyed alignment.
use std::num::NonZeroUsize;

use tracing::{info, warn};

pub mod align;
pub mod capability;
pub mod chunk;
pub mod dedup;
pub mod limiter;
pub mod openai;
pub mod prompts;
pub mod retry;

use align::{AlignStats, ResultAligner, TermMap};
use capability::TranslationCapability;
use chunk::chunk_terms;
use limiter::ConcurrencyLimiter;
use retry::RetryPolicy;

/// Batch mode: one call per chunk, at most `limiter.limit()` in flight.
/// A chunk whose call fails after retries degrades on its own.
pub async fn translate_chunks(
    capability: &dyn TranslationCapability,
    limiter: &ConcurrencyLimiter,
    retry: &RetryPolicy,
    column: &str,
    terms: &[String],
    chunk_size: NonZeroUsize,
) -> (TermMap, AlignStats, usize) {
    let chunks: Vec<_> = chunk_terms(terms, chunk_size).collect();
    let total = chunks.len();
    info!(
        column,
        terms = terms.len(),
        chunks = total,
        concurrency = limiter.limit(),
        "translating in batch mode"
    );

    let results = limiter
        .run_ordered(column, chunks.clone(), |chunk| async move {
            let keyed = chunk.keyed();
            let label = format!("{column}#{}", chunk.index);
            let res = retry
                .run(&label, || capability.translate_batch(&keyed))
                .await;
            if let Err(err) = &res {
                warn!(
                    column,
                    chunk = chunk.index,
                    terms = chunk.len(),
                    error = %err,
                    "chunk degraded"
                );
            }
            res
        })
        .await;

    let mut aligner = ResultAligner::new();
    for (chunk, res) in chunks.iter().zip(results) {
        aligner.push_chunk(chunk, res);
    }
    let (map, stats) = aligner.finish();
    (map, stats, total)
}

/// Single-record mode: one call per unique term; failures echo the input.
pub async fn translate_single_terms(
    capability: &dyn TranslationCapability,
    limiter: &ConcurrencyLimiter,
    retry: &RetryPolicy,
    column: &str,
    terms: &[String],
) -> (TermMap, AlignStats, usize) {
    info!(
        column,
        terms = terms.len(),
        concurrency = limiter.limit(),
        "translating in single-record mode"
    );
    let jobs: Vec<&str> = terms.iter().map(String::as_str).collect();
    let results = limiter
        .run_ordered(column, jobs, |term| async move {
            let label = format!("{column}:single");
            let res = retry.run(&label, || capability.translate_one(term)).await;
            if let Err(err) = &res {
                warn!(column, error = %err, "single-record call failed; keeping original text");
            }
            res
        })
        .await;

    let mut aligner = ResultAligner::new();
    for (term, res) in terms.iter().zip(results) {
        aligner.push_single(term, res);
    }
    let (map, stats) = aligner.finish();
    (map, stats, terms.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::align::TermOutcome;
    use crate::translation::capability::{CapabilityError, KeyedTerm, KeyedTranslation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Appends `_EN`; fails any chunk containing `poison`.
    struct Suffixer {
        poison: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TranslationCapability for Suffixer {
        async fn translate_one(&self, text: &str) -> Result<String, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(text) == self.poison {
                return Err(CapabilityError::Status { status: 400, body: "bad".into() });
            }
            Ok(format!("{text}_EN"))
        }

        async fn translate_batch(
            &self,
            terms: &[KeyedTerm],
        ) -> Result<Vec<KeyedTranslation>, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if terms.iter().any(|t| Some(t.text.as_str()) == self.poison) {
                return Err(CapabilityError::Malformed("prose".into()));
            }
            // answer out of order; keys carry the correlation
            Ok(terms
                .iter()
                .rev()
                .map(|t| KeyedTranslation { key: t.key.clone(), text: format!("{}_EN", t.text) })
                .collect())
        }
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(5),
        }
    }

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn batch_mode_happy_path() {
        let cap = Suffixer { poison: None, calls: AtomicUsize::new(0) };
        let raw = [Some("A"), Some("B"), Some("A"), Some(""), Some("C")];
        let terms = dedup::unique_terms(raw);
        assert_eq!(terms, vec!["A", "B", "C"]);

        let limiter = ConcurrencyLimiter::new(nz(3));
        let (map, stats, chunks) =
            translate_chunks(&cap, &limiter, &quick_retry(), "v", &terms, nz(2)).await;
        assert_eq!(chunks, 2);
        assert_eq!(cap.calls.load(Ordering::SeqCst), 2);
        assert_eq!(map.value("A"), Some("A_EN"));
        assert_eq!(map.value("B"), Some("B_EN"));
        assert_eq!(map.value("C"), Some("C_EN"));
        assert_eq!(stats.translated, 3);
    }

    #[tokio::test]
    async fn batch_mode_isolates_failed_chunk() {
        let cap = Suffixer { poison: Some("C"), calls: AtomicUsize::new(0) };
        let terms: Vec<String> = ["A", "B", "C", "D", "E"].iter().map(|s| s.to_string()).collect();
        let limiter = ConcurrencyLimiter::new(nz(2));
        let (map, stats, _) =
            translate_chunks(&cap, &limiter, &quick_retry(), "v", &terms, nz(2)).await;
        assert_eq!(map.value("A"), Some("A_EN"));
        assert_eq!(map.value("B"), Some("B_EN"));
        assert!(matches!(map.get("C"), Some(TermOutcome::Failed { .. })));
        assert!(matches!(map.get("D"), Some(TermOutcome::Failed { .. })));
        assert_eq!(map.value("E"), Some("E_EN"));
        assert_eq!(stats.failed, 2);
        // malformed answers are not retried
        assert_eq!(cap.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_mode_echoes_on_failure() {
        let cap = Suffixer { poison: Some("B"), calls: AtomicUsize::new(0) };
        let terms: Vec<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        let limiter = ConcurrencyLimiter::new(nz(1));
        let (map, stats, calls) =
            translate_single_terms(&cap, &limiter, &quick_retry(), "m", &terms).await;
        assert_eq!(calls, 2);
        assert_eq!(map.value("A"), Some("A_EN"));
        assert_eq!(map.value("B"), Some("B"));
        assert_eq!(stats.echoed, 1);
    }

    #[tokio::test]
    async fn no_terms_no_calls() {
        let cap = Suffixer { poison: None, calls: AtomicUsize::new(0) };
        let limiter = ConcurrencyLimiter::new(nz(2));
        let (map, _, chunks) =
            translate_chunks(&cap, &limiter, &quick_retry(), "v", &[], nz(2)).await;
        assert!(map.is_empty());
        assert_eq!(chunks, 0);
        assert_eq!(cap.calls.load(Ordering::SeqCst), 0);
    }
}
