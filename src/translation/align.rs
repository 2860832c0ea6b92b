use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;

use super::capability::{CapabilityError, KeyedTranslation};
use super::chunk::TranslationChunk;

/// What happened to one unique term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TermOutcome {
    Translated(String),
    /// Single-record fallback: the original text stands in for the translation.
    Echoed { original: String, reason: String },
    /// No usable translation; nothing gets written for this term.
    Failed { reason: String },
}

impl TermOutcome {
    /// The value the reconciler writes, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Translated(v) => Some(v.as_str()),
            Self::Echoed { original, .. } => Some(original.as_str()),
            Self::Failed { .. } => None,
        }
    }
}

/// Unique term -> outcome for one column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermMap {
    entries: IndexMap<String, TermOutcome>,
}

impl TermMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, term: impl Into<String>, outcome: TermOutcome) {
        self.entries.insert(term.into(), outcome);
    }

    pub fn get(&self, term: &str) -> Option<&TermOutcome> {
        self.entries.get(term)
    }

    /// Writable value for a raw cell; the lookup trims like the deduplicator.
    pub fn value(&self, raw: &str) -> Option<&str> {
        self.entries
            .get(raw.trim())
            .and_then(TermOutcome::value)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Terms without a usable value, with the reason, for re-runs.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(k, v)| match v {
            TermOutcome::Failed { reason } => Some((k.as_str(), reason.as_str())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlignStats {
    pub translated: usize,
    pub echoed: usize,
    pub failed: usize,
    pub unknown_keys: usize,
    pub duplicate_keys: usize,
}

impl AlignStats {
    fn count(&mut self, outcome: &TermOutcome) {
        match outcome {
            TermOutcome::Translated(_) => self.translated += 1,
            TermOutcome::Echoed { .. } => self.echoed += 1,
            TermOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Builds a [`TermMap`] from per-chunk capability results.
#[derive(Debug, Default)]
pub struct ResultAligner {
    map: TermMap,
    stats: AlignStats,
}

impl ResultAligner {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, term: &str, outcome: TermOutcome) {
        self.stats.count(&outcome);
        self.map.insert(term, outcome);
    }

    /// Fold one batch-mode chunk into the map. Terms are matched to response
    /// items by key; any term left without a non-blank item is marked failed.
    pub fn push_chunk(
        &mut self,
        chunk: &TranslationChunk<'_>,
        result: Result<Vec<KeyedTranslation>, CapabilityError>,
    ) {
        let items = match result {
            Ok(items) => items,
            Err(err) => {
                let reason = err.to_string();
                for term in chunk.terms {
                    self.record(term, TermOutcome::Failed { reason: reason.clone() });
                }
                return;
            }
        };

        let mut by_key: HashMap<String, String> = HashMap::with_capacity(items.len());
        for item in items {
            let known = item
                .key
                .parse::<usize>()
                .is_ok_and(|pos| pos < chunk.len() && TranslationChunk::key_for(pos) == item.key);
            if !known {
                self.stats.unknown_keys += 1;
                continue;
            }
            if by_key.contains_key(&item.key) {
                self.stats.duplicate_keys += 1;
                continue;
            }
            by_key.insert(item.key, item.text);
        }

        for (pos, term) in chunk.terms.iter().enumerate() {
            let outcome = match by_key.remove(&TranslationChunk::key_for(pos)) {
                Some(text) if !text.trim().is_empty() => {
                    TermOutcome::Translated(text.trim().to_string())
                }
                Some(_) => TermOutcome::Failed { reason: "blank translation".into() },
                None => TermOutcome::Failed { reason: "missing from response".into() },
            };
            self.record(term, outcome);
        }
    }

    /// Fold one single-record call into the map; failures echo the input.
    pub fn push_single(&mut self, term: &str, result: Result<String, CapabilityError>) {
        let outcome = match result {
            Ok(text) if !text.trim().is_empty() => TermOutcome::Translated(text.trim().to_string()),
            Ok(_) => TermOutcome::Echoed {
                original: term.to_string(),
                reason: CapabilityError::Empty.to_string(),
            },
            Err(err) => TermOutcome::Echoed {
                original: term.to_string(),
                reason: err.to_string(),
            },
        };
        self.record(term, outcome);
    }

    pub fn finish(self) -> (TermMap, AlignStats) {
        (self.map, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::chunk::chunk_terms;
    use std::num::NonZeroUsize;

    fn suffixed(chunk: &TranslationChunk<'_>) -> Vec<KeyedTranslation> {
        chunk
            .keyed()
            .into_iter()
            .map(|t| KeyedTranslation { key: t.key, text: format!("{}_EN", t.text) })
            .collect()
    }

    fn terms(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn happy_path_maps_every_term() {
        let terms = terms(&["A", "B", "C"]);
        let mut aligner = ResultAligner::new();
        for chunk in chunk_terms(&terms, NonZeroUsize::new(2).unwrap()) {
            let out = suffixed(&chunk);
            aligner.push_chunk(&chunk, Ok(out));
        }
        let (map, stats) = aligner.finish();
        assert_eq!(map.value("A"), Some("A_EN"));
        assert_eq!(map.value("B"), Some("B_EN"));
        assert_eq!(map.value("C"), Some("C_EN"));
        assert_eq!(map.len(), 3);
        assert_eq!(stats.translated, 3);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn failed_chunk_only_taints_its_own_terms() {
        let terms = terms(&["A", "B", "C", "D"]);
        let mut aligner = ResultAligner::new();
        for chunk in chunk_terms(&terms, NonZeroUsize::new(2).unwrap()) {
            let res = if chunk.index == 0 {
                Err(CapabilityError::Timeout(std::time::Duration::from_secs(60)))
            } else {
                Ok(suffixed(&chunk))
            };
            aligner.push_chunk(&chunk, res);
        }
        let (map, stats) = aligner.finish();
        assert!(matches!(map.get("A"), Some(TermOutcome::Failed { .. })));
        assert!(matches!(map.get("B"), Some(TermOutcome::Failed { .. })));
        assert_eq!(map.value("A"), None);
        assert_eq!(map.value("C"), Some("C_EN"));
        assert_eq!(map.value("D"), Some("D_EN"));
        assert_eq!(stats.failed, 2);
        assert_eq!(map.failures().count(), 2);
    }

    #[test]
    fn short_response_fails_only_missing_keys() {
        let terms = terms(&["A", "B", "C"]);
        let chunk = chunk_terms(&terms, NonZeroUsize::new(3).unwrap()).next().unwrap();
        let out = vec![
            KeyedTranslation { key: "2".into(), text: "C_EN".into() },
            KeyedTranslation { key: "0".into(), text: "A_EN".into() },
        ];
        let mut aligner = ResultAligner::new();
        aligner.push_chunk(&chunk, Ok(out));
        let (map, stats) = aligner.finish();
        assert_eq!(map.value("A"), Some("A_EN"));
        assert_eq!(map.value("C"), Some("C_EN"));
        assert_eq!(
            map.get("B"),
            Some(&TermOutcome::Failed { reason: "missing from response".into() })
        );
        assert_eq!(stats.translated, 2);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn unknown_and_duplicate_keys_are_counted_and_ignored() {
        let terms = terms(&["A", "B"]);
        let chunk = chunk_terms(&terms, NonZeroUsize::new(2).unwrap()).next().unwrap();
        let out = vec![
            KeyedTranslation { key: "0".into(), text: "A_EN".into() },
            KeyedTranslation { key: "0".into(), text: "A_again".into() },
            KeyedTranslation { key: "1".into(), text: "B_EN".into() },
            KeyedTranslation { key: "7".into(), text: "ghost".into() },
            KeyedTranslation { key: "01".into(), text: "ghost".into() },
        ];
        let mut aligner = ResultAligner::new();
        aligner.push_chunk(&chunk, Ok(out));
        let (map, stats) = aligner.finish();
        assert_eq!(map.value("A"), Some("A_EN"));
        assert_eq!(map.value("B"), Some("B_EN"));
        assert_eq!(stats.unknown_keys, 2);
        assert_eq!(stats.duplicate_keys, 1);
    }

    #[test]
    fn single_mode_failure_echoes_original() {
        let mut aligner = ResultAligner::new();
        aligner.push_single(
            "YSZ，商品化材料(Toyo Soda)，>99%",
            Err(CapabilityError::Transport("dns".into())),
        );
        aligner.push_single("Sc2O3", Ok("Commercial Sc2O3 powder.".into()));
        let (map, stats) = aligner.finish();
        assert_eq!(
            map.value("YSZ，商品化材料(Toyo Soda)，>99%"),
            Some("YSZ，商品化材料(Toyo Soda)，>99%")
        );
        assert_eq!(map.value("Sc2O3"), Some("Commercial Sc2O3 powder."));
        assert_eq!(stats.echoed, 1);
        assert_eq!(stats.translated, 1);
    }

    #[test]
    fn lookup_trims_raw_value() {
        let mut map = TermMap::new();
        map.insert("A", TermOutcome::Translated("A_EN".into()));
        assert_eq!(map.value("  A "), Some("A_EN"));
        assert_eq!(map.value(""), None);
    }
}
