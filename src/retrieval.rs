//! Lexical ranking of cached chunks against a chat message.
//!
//! Every chunk is scored with a blend of word-set overlap and a
//! longest-matching-blocks character ratio; there is no index, so cost grows
//! with chunk count times text length. That is fine for one document per user.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_TOP_K: usize = 3;

const WORD_WEIGHT: f32 = 0.7;
const SEQUENCE_WEIGHT: f32 = 0.3;

/// Score breakdown for one chunk, keyed by its position in the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkScore {
    pub index: usize,
    pub word_ratio: f32,
    pub sequence_similarity: f32,
    pub combined: f32,
}

fn word_set(text: &str) -> HashSet<&str> {
    text.split_whitespace().collect()
}

/// Fraction of the query's distinct words that also appear in the chunk.
pub fn word_ratio(query: &str, chunk: &str) -> f32 {
    let query_words = word_set(query);
    if query_words.is_empty() {
        return 0.0;
    }
    overlap_ratio(&query_words, &word_set(chunk))
}

fn overlap_ratio(query_words: &HashSet<&str>, chunk_words: &HashSet<&str>) -> f32 {
    if query_words.is_empty() {
        return 0.0;
    }
    let shared = query_words.intersection(chunk_words).count();
    shared as f32 / query_words.len() as f32
}

/// Sequences at least this long have their over-common characters ignored
/// when anchoring matches.
const AUTOJUNK_MIN_LEN: usize = 200;

/// Matching-blocks ratio `2 * M / (len(a) + len(b))`, in `[0, 1]`.
///
/// M is the total size of the blocks found by repeatedly taking the longest
/// common run and recursing on the pieces to its left and right. When `b`
/// has 200 or more characters, any character occurring in more than 1% of
/// `b` (plus one) cannot start a match. Two empty strings score 1.
pub fn sequence_similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = BlockMatcher::new(&a, &b).matched_len();
    (2.0 * matched as f64 / total as f64) as f32
}

struct BlockMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of every non-popular character of `b`, ascending.
    b2j: HashMap<char, Vec<usize>>,
}

impl<'a> BlockMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(j);
        }
        if b.len() >= AUTOJUNK_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= limit);
        }
        Self { a, b, b2j }
    }

    /// Longest common run inside `a[alo..ahi]` x `b[blo..bhi]`, earliest in
    /// `a` (then `b`) on ties. Returns `(i, j, size)`.
    fn longest_match(
        &self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
        // run length of the match ending at b[j], for the previous row of a
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = next;
        }

        // popular characters never anchor a match but may still extend one
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }
        (best_i, best_j, best_size)
    }

    fn matched_len(&self) -> usize {
        let mut matched = 0;
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, size) = self.longest_match(alo, ahi, blo, bhi);
            if size == 0 {
                continue;
            }
            matched += size;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + size < ahi && j + size < bhi {
                queue.push((i + size, ahi, j + size, bhi));
            }
        }
        matched
    }
}

/// Score every chunk against the query, in input order.
pub fn score_chunks(query: &str, chunks: &[String]) -> Vec<ChunkScore> {
    let query = query.to_lowercase();
    let query_words = word_set(&query);

    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            let chunk = chunk.to_lowercase();
            let word_ratio = overlap_ratio(&query_words, &word_set(&chunk));
            let sequence_similarity = sequence_similarity(&query, &chunk);
            ChunkScore {
                index,
                word_ratio,
                sequence_similarity,
                combined: WORD_WEIGHT * word_ratio + SEQUENCE_WEIGHT * sequence_similarity,
            }
        })
        .collect()
}

/// Scores sorted best-first, ties kept in input order, cut to `top_k`.
pub fn rank_scored(query: &str, chunks: &[String], top_k: usize) -> Vec<ChunkScore> {
    if top_k == 0 || chunks.is_empty() {
        return Vec::new();
    }
    let mut scored = score_chunks(query, chunks);
    scored.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    scored.truncate(top_k);
    scored
}

/// The `top_k` most relevant chunks for `query`, best first.
pub fn rank(query: &str, chunks: &[String], top_k: usize) -> Vec<String> {
    rank_scored(query, chunks, top_k)
        .into_iter()
        .map(|score| chunks[score.index].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cat_mat_example() {
        let chunks = strings(&[
            "The cat sat on the mat",
            "Dogs are loyal companions",
            "Mat repair and cat care tips",
        ]);
        let ranked = rank("cat mat", &chunks, 2);
        assert_eq!(ranked.len(), 2);
        assert!(!ranked.contains(&chunks[1]));
        assert!(ranked.contains(&chunks[0]));
        assert!(ranked.contains(&chunks[2]));
    }

    #[test]
    fn test_returns_exactly_top_k_distinct_inputs() {
        let chunks = strings(&[
            "alpha beta gamma",
            "beta delta",
            "epsilon",
            "gamma gamma alpha",
            "zeta eta theta",
        ]);
        for top_k in 1..=chunks.len() {
            let scored = rank_scored("alpha gamma", &chunks, top_k);
            assert_eq!(scored.len(), top_k);
            let indexes: HashSet<usize> = scored.iter().map(|s| s.index).collect();
            assert_eq!(indexes.len(), top_k);
            assert!(indexes.iter().all(|i| *i < chunks.len()));
        }
    }

    #[test]
    fn test_top_k_larger_than_input_returns_all() {
        let chunks = strings(&["one", "two"]);
        assert_eq!(rank("one", &chunks, 10).len(), 2);
    }

    #[test]
    fn test_zero_top_k_and_empty_chunks() {
        let chunks = strings(&["something"]);
        assert!(rank("something", &chunks, 0).is_empty());
        assert!(rank("anything", &[], 3).is_empty());
    }

    #[test]
    fn test_rank_is_deterministic() {
        let chunks = strings(&[
            "rust ownership and borrowing",
            "borrow checker rules",
            "lifetimes in rust",
            "garbage collection",
        ]);
        let first = rank("rust borrow", &chunks, 3);
        for _ in 0..5 {
            assert_eq!(rank("rust borrow", &chunks, 3), first);
        }
    }

    #[test]
    fn test_ties_keep_original_order() {
        let chunks = strings(&["aaaa", "bbbb", "cccc", "dddd"]);
        let scored = rank_scored("zzzz", &chunks, 4);
        assert!(scored.iter().all(|s| s.combined == 0.0));
        let order: Vec<usize> = scored.iter().map(|s| s.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_scoring_is_case_insensitive() {
        let chunks = strings(&["PDF Upload Guide", "unrelated"]);
        let scored = score_chunks("pdf upload guide", &chunks);
        assert_eq!(scored[0].word_ratio, 1.0);
        assert!((scored[0].sequence_similarity - 1.0).abs() < 1e-6);
        assert!((scored[0].combined - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_word_ratio_bounds() {
        assert_eq!(word_ratio("", "anything at all"), 0.0);
        assert_eq!(word_ratio("   ", "anything"), 0.0);
        assert_eq!(word_ratio("a b", "b c"), 0.5);
        assert_eq!(word_ratio("a a b", "a b"), 1.0);
    }

    #[test]
    fn test_sequence_similarity_uses_longest_blocks() {
        // " " + "at" = 3 matched of 18 chars
        assert!((sequence_similarity("sun mat", "tea cat dog") - 1.0 / 3.0).abs() < 1e-6);
        assert!((sequence_similarity("sun mat", "cat ant cat") - 2.0 / 9.0).abs() < 1e-6);
        assert!((sequence_similarity("abxcd", "abcd") - 8.0 / 9.0).abs() < 1e-6);
        assert_eq!(sequence_similarity("", ""), 1.0);
    }

    #[test]
    fn test_sequence_similarity_ignores_popular_chars_in_long_text() {
        let query = format!("b{}", "a".repeat(10));
        // below the threshold the run of a's matches normally
        let short = "a".repeat(150);
        assert!((sequence_similarity(&query, &short) - 20.0 / 161.0).abs() < 1e-6);
        // at 300 chars 'a' is too common to anchor and 'b' matches nothing
        let long = "a".repeat(300);
        assert_eq!(sequence_similarity(&query, &long), 0.0);
        // a popular char can still extend a run from a boundary
        assert!((sequence_similarity("a", &"a".repeat(200)) - 2.0 / 201.0).abs() < 1e-6);
    }

    #[test]
    fn test_rank_follows_block_ratio_order() {
        let chunks = strings(&["tea cat dog", "cat ant cat"]);
        assert_eq!(rank("sun mat", &chunks, 1), vec!["tea cat dog".to_string()]);
    }

    #[test]
    fn test_sequence_similarity_bounds() {
        assert!((sequence_similarity("abcd", "abcd") - 1.0).abs() < 1e-6);
        assert_eq!(sequence_similarity("abcd", "wxyz"), 0.0);
        let partial = sequence_similarity("abcd", "abxy");
        assert!(partial > 0.0 && partial < 1.0);
    }
}
