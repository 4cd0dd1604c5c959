use docsift_chunk::{Chunk, Chunker, ChunkerConfig};
use docsift_retriever::retrieval::context::context;
use docsift_retriever::retrieval::multi_query::{ScoredResult, merge_ranked};
use docsift_retriever::retrieval::scoring::{RelevanceScorer, ScoringConfig};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

fn sentence() -> impl Strategy<Value = String> {
    (prop::collection::vec("[a-z]{1,8}", 1..12), prop::sample::select(vec![".", "!", "?"]))
        .prop_map(|(words, end)| format!("{}{end}", words.join(" ")))
}

fn paragraph() -> impl Strategy<Value = String> {
    prop::collection::vec(sentence(), 1..15).prop_map(|s| s.join(" "))
}

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(paragraph(), 0..6).prop_map(|p| p.join("\n\n"))
}

fn candidates() -> impl Strategy<Value = Vec<ScoredResult>> {
    prop::collection::vec((0usize..20, 0.0f32..=1.0), 0..60).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(position, relevance_score)| ScoredResult {
                position,
                relevance_score,
                raw_distance: 0.0,
                context: String::new(),
            })
            .collect()
    })
}

fn chunks_of(n: usize) -> Vec<Chunk> {
    (0..n)
        .map(|i| Chunk {
            text: format!("c{i}"),
            document_id: "doc".to_string(),
            page: 1,
            paragraph: 1,
            sentence: 1,
            position: i,
        })
        .collect()
}

proptest! {
    #[test]
    fn chunking_is_deterministic(text in document(), short in 1usize..60, target in 1usize..120) {
        let chunker = Chunker::new(ChunkerConfig { short_paragraph_words: short, target_words: target });
        prop_assert_eq!(chunker.chunk(&text, "doc"), chunker.chunk(&text, "doc"));
    }

    #[test]
    fn chunking_keeps_every_word_in_order(text in document(), short in 1usize..60, target in 1usize..120) {
        let chunker = Chunker::new(ChunkerConfig { short_paragraph_words: short, target_words: target });
        let chunks = chunker.chunk(&text, "doc");

        let original: Vec<&str> = text.split_whitespace().collect();
        let rebuilt: Vec<&str> = chunks.iter().flat_map(|c| c.text.split_whitespace()).collect();
        prop_assert_eq!(original, rebuilt);

        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.position, i);
            prop_assert!(chunk.paragraph >= 1);
            prop_assert!(chunk.sentence >= 1);
            prop_assert!(!chunk.text.trim().is_empty());
        }
    }

    #[test]
    fn merge_keeps_each_position_once_at_its_best(
        pool in candidates(),
        top_k in 0usize..10,
        min_score in 0.0f32..=1.0,
    ) {
        let merged = merge_ranked(pool.clone(), top_k, min_score);
        prop_assert!(merged.len() <= top_k);

        let mut best: HashMap<usize, f32> = HashMap::new();
        for c in &pool {
            let entry = best.entry(c.position).or_insert(c.relevance_score);
            *entry = entry.max(c.relevance_score);
        }

        let mut seen = HashSet::new();
        for result in &merged {
            prop_assert!(seen.insert(result.position));
            prop_assert!(result.relevance_score >= min_score);
            prop_assert_eq!(result.relevance_score, best[&result.position]);
        }
        for pair in merged.windows(2) {
            prop_assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[test]
    fn score_stays_in_unit_interval(
        query in prop::collection::vec(-10.0f32..10.0, 4),
        chunk in prop::collection::vec(-10.0f32..10.0, 4),
        distance in prop::num::f32::ANY,
    ) {
        let scorer = RelevanceScorer::new(ScoringConfig::default());
        let score = scorer.score(&query, &chunk, distance);
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn context_is_a_clipped_window(n in 0usize..30, position in 0usize..40, window in 0usize..6) {
        let chunks = chunks_of(n);
        let joined = context(&chunks, position, window);

        if position >= n {
            prop_assert!(joined.is_empty());
        } else {
            let start = position.saturating_sub(window);
            let end = (position + window).min(n - 1);
            let parts: Vec<&str> = joined.split(' ').collect();
            prop_assert_eq!(parts.len(), end - start + 1);
            let first = format!("c{start}");
            prop_assert_eq!(parts.first().copied(), Some(first.as_str()));
            let expected = format!("c{position}");
            prop_assert!(parts.contains(&expected.as_str()));
        }
    }
}
