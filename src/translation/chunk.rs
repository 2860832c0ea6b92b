use std::num::NonZeroUsize;

use super::capability::KeyedTerm;

/// One capability request worth of terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationChunk<'a> {
    pub index: usize,
    pub terms: &'a [String],
}

impl<'a> TranslationChunk<'a> {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Correlation key of the term at `position`; unique within the chunk.
    pub fn key_for(position: usize) -> String {
        position.to_string()
    }

    /// Terms tagged with their correlation keys, in chunk order.
    pub fn keyed(&self) -> Vec<KeyedTerm> {
        self.terms
            .iter()
            .enumerate()
            .map(|(pos, text)| KeyedTerm {
                key: Self::key_for(pos),
                text: text.clone(),
            })
            .collect()
    }
}

/// Lazy window iterator over a term list. Cloning restarts it.
#[derive(Debug, Clone)]
pub struct Chunker<'a> {
    terms: &'a [String],
    size: NonZeroUsize,
    next_index: usize,
}

impl<'a> Iterator for Chunker<'a> {
    type Item = TranslationChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.terms.is_empty() {
            return None;
        }
        let take = self.size.get().min(self.terms.len());
        let (head, rest) = self.terms.split_at(take);
        self.terms = rest;
        let index = self.next_index;
        self.next_index += 1;
        Some(TranslationChunk { index, terms: head })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.terms.len().div_ceil(self.size.get());
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunker<'_> {}

/// Split `terms` into windows of `size`; only the last may be shorter.
pub fn chunk_terms(terms: &[String], size: NonZeroUsize) -> Chunker<'_> {
    Chunker {
        terms,
        size,
        next_index: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{i}")).collect()
    }

    fn k(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn concatenation_reproduces_input() {
        for n in [0usize, 1, 2, 49, 50, 51, 137] {
            let input = terms(n);
            for size in [1usize, 2, 7, 50] {
                let chunks: Vec<_> = chunk_terms(&input, k(size)).collect();
                let flat: Vec<String> =
                    chunks.iter().flat_map(|c| c.terms.iter().cloned()).collect();
                assert_eq!(flat, input, "n={n} size={size}");
                if let Some((last, full)) = chunks.split_last() {
                    assert!(full.iter().all(|c| c.len() == size));
                    assert!((1..=size).contains(&last.len()));
                }
            }
        }
    }

    #[test]
    fn indices_are_sequential_and_restartable() {
        let input = terms(5);
        let chunker = chunk_terms(&input, k(2));
        assert_eq!(chunker.len(), 3);
        let first: Vec<usize> = chunker.clone().map(|c| c.index).collect();
        let second: Vec<usize> = chunker.map(|c| c.index).collect();
        assert_eq!(first, vec![0, 1, 2]);
        assert_eq!(first, second);
    }

    #[test]
    fn keys_are_positions_within_chunk() {
        let input = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let chunks: Vec<_> = chunk_terms(&input, k(2)).collect();
        let keyed = chunks[1].keyed();
        assert_eq!(keyed.len(), 1);
        assert_eq!(keyed[0].key, "0");
        assert_eq!(keyed[0].text, "C");
    }
}
