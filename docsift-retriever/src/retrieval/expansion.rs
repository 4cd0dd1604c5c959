//! Query variants.
//!
//! A query is searched as several variants: the query itself, its normalized
//! form, and whatever an expansion service adds. Expansion services are
//! untrusted and may fail; [`expand_or_fallback`] always produces a usable list.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("non-word pattern is valid"));

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "were", "will", "with", "this", "but", "they",
    "have", "had", "what", "when", "where", "who", "which", "why", "how", "all", "any", "both",
    "each", "few", "more", "most", "other", "some", "such", "than", "too", "very", "can", "just",
    "should", "now",
];

const MEDICAL_SYNONYMS: &[(&str, &[&str])] = &[
    ("pee", &["urine", "urination", "urinary"]),
    ("pink", &["reddish", "blood-tinged", "hematuria"]),
    ("blood", &["hematuria", "blood-tinged"]),
    ("urine", &["pee", "micturition"]),
    ("pain", &["discomfort", "ache", "soreness"]),
    ("hurt", &["pain", "discomfort", "ache"]),
    ("sick", &["ill", "unwell", "diseased"]),
    ("throw up", &["vomit", "nausea", "emesis"]),
    ("fever", &["pyrexia", "temperature"]),
    ("rash", &["eruption", "dermatitis", "skin condition"]),
];

#[derive(Debug, thiserror::Error)]
pub enum ExpansionError {
    #[error("Expansion service unavailable: {message}")]
    Unavailable { message: String },

    #[error("Expansion service returned no variants")]
    Empty,

    #[error("Expansion failed: {source}")]
    Other {
        #[from]
        source: anyhow::Error,
    },
}

/// Produces alternative phrasings of a query, e.g. through a language model.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> Result<Vec<String>, ExpansionError>;
}

/// Lowercases, replaces punctuation with spaces, and drops stopwords.
///
/// ```
/// use docsift_retriever::retrieval::expansion::normalize_query;
///
/// assert_eq!(normalize_query("Why is my pee PINK?"), "my pee pink");
/// ```
pub fn normalize_query(query: &str) -> String {
    let lowered = query.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, " ");
    cleaned
        .split_whitespace()
        .filter(|token| !STOPWORDS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trims variants, drops empty ones and keeps the first occurrence of each.
pub fn dedup_variants<I, S>(variants: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for variant in variants {
        let variant = variant.as_ref().trim();
        if variant.is_empty() || !seen.insert(variant.to_string()) {
            continue;
        }
        out.push(variant.to_string());
    }
    out
}

/// The variants used when no expansion is available: the query and its normalized form.
pub fn fallback_variants(query: &str) -> Vec<String> {
    dedup_variants([query.to_string(), normalize_query(query)])
}

/// Splits a comma-separated completion into variants.
pub fn parse_variations(completion: &str) -> Vec<String> {
    dedup_variants(completion.trim().split(','))
}

/// Expands `query` with `expander` when one is configured.
///
/// The query and its normalized form always lead the list. If the expander fails
/// or returns nothing, those two are all that is searched.
pub async fn expand_or_fallback(expander: Option<&dyn QueryExpander>, query: &str) -> Vec<String> {
    let Some(expander) = expander else {
        return fallback_variants(query);
    };

    let expanded = expander.expand(query).await.and_then(|extra| {
        let extra = dedup_variants(extra);
        if extra.is_empty() {
            Err(ExpansionError::Empty)
        } else {
            Ok(extra)
        }
    });

    match expanded {
        Ok(extra) => {
            let mut variants = fallback_variants(query);
            variants.extend(extra);
            let variants = dedup_variants(variants);
            tracing::debug!("Expanded query into {} variants", variants.len());
            variants
        }
        Err(e) => {
            tracing::warn!("Query expansion failed, using fallback variants: {}", e);
            fallback_variants(query)
        }
    }
}

/// Deterministic expansion from a fixed synonym table.
///
/// A table term matches when it appears as a whole word (or word sequence) in the
/// lowercased query.
#[derive(Debug, Clone)]
pub struct SynonymExpander {
    table: Vec<(String, Vec<String>)>,
}

impl Default for SynonymExpander {
    fn default() -> Self {
        let table = MEDICAL_SYNONYMS
            .iter()
            .map(|(term, synonyms)| {
                (
                    term.to_string(),
                    synonyms.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect();
        Self { table }
    }
}

impl SynonymExpander {
    pub fn empty() -> Self {
        Self { table: Vec::new() }
    }

    pub fn with_synonyms<I, S>(mut self, term: &str, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table.push((
            term.to_lowercase(),
            synonyms.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn variants(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        let words = NON_WORD.replace_all(&lowered, " ");
        let padded = format!(" {} ", words.split_whitespace().collect::<Vec<_>>().join(" "));

        let mut variants = fallback_variants(query);
        for (term, synonyms) in &self.table {
            if padded.contains(&format!(" {term} ")) {
                variants.extend(synonyms.iter().cloned());
            }
        }
        dedup_variants(variants)
    }
}

#[async_trait]
impl QueryExpander for SynonymExpander {
    async fn expand(&self, query: &str) -> Result<Vec<String>, ExpansionError> {
        Ok(self.variants(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    struct FailingExpander;

    #[async_trait]
    impl QueryExpander for FailingExpander {
        async fn expand(&self, _query: &str) -> Result<Vec<String>, ExpansionError> {
            Err(ExpansionError::Unavailable {
                message: "rate limited".to_string(),
            })
        }
    }

    struct FixedExpander(&'static str);

    #[async_trait]
    impl QueryExpander for FixedExpander {
        async fn expand(&self, _query: &str) -> Result<Vec<String>, ExpansionError> {
            Ok(parse_variations(self.0))
        }
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("What is the cause of FEVER?"), "cause fever");
        assert_eq!(normalize_query("blood-tinged urine"), "blood tinged urine");
        assert_eq!(normalize_query("  the  and  "), "");
    }

    #[test]
    fn test_fallback_variants() {
        assert_eq!(
            fallback_variants("Why is my pee pink?"),
            vec!["Why is my pee pink?", "my pee pink"]
        );
        // identical normalized form collapses
        assert_eq!(fallback_variants("fever"), vec!["fever"]);
        assert!(fallback_variants("   ").is_empty());
    }

    #[test]
    fn test_parse_variations() {
        assert_eq!(
            parse_variations(" hematuria, blood in urine ,, Hematuria,hematuria "),
            vec!["hematuria", "blood in urine", "Hematuria"]
        );
        assert!(parse_variations("").is_empty());
    }

    #[test]
    fn test_synonym_expander() {
        let variants = SynonymExpander::default().variants("Pink pee");
        assert_eq!(
            variants,
            vec![
                "Pink pee",
                "pink pee",
                "urine",
                "urination",
                "urinary",
                "reddish",
                "blood-tinged",
                "hematuria",
            ]
        );
    }

    #[test]
    fn test_synonym_expander_matches_phrases_and_whole_words() {
        let expander = SynonymExpander::default();
        let variants = expander.variants("I want to throw up");
        assert!(variants.contains(&"emesis".to_string()));

        // "speed" contains "pee" but is not the word
        let variants = expander.variants("speed");
        assert_eq!(variants, vec!["speed"]);
    }

    #[test]
    fn test_custom_synonyms() {
        let expander = SynonymExpander::empty().with_synonyms("MI", ["myocardial infarction"]);
        assert_eq!(
            expander.variants("mi symptoms"),
            vec!["mi symptoms", "myocardial infarction"]
        );
    }

    #[tokio::test]
    async fn test_expander_output_follows_query() {
        let expander = FixedExpander("hematuria, blood in urine");
        let variants = expand_or_fallback(Some(&expander), "Is my pee pink?").await;
        assert_eq!(
            variants,
            vec!["Is my pee pink?", "my pee pink", "hematuria", "blood in urine"]
        );
    }

    #[tokio::test]
    async fn test_no_expander_uses_fallback() {
        let variants = expand_or_fallback(None, "The fever").await;
        assert_eq!(variants, vec!["The fever", "fever"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_expansion_falls_back_with_warning() {
        let variants = expand_or_fallback(Some(&FailingExpander), "The fever").await;
        assert_eq!(variants, vec!["The fever", "fever"]);
        assert!(logs_contain("Query expansion failed"));
        assert!(logs_contain("rate limited"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_blank_expansion_counts_as_empty() {
        let expander = FixedExpander(" , ,");
        let variants = expand_or_fallback(Some(&expander), "The fever").await;
        assert_eq!(variants, vec!["The fever", "fever"]);
        assert!(logs_contain("Expansion service returned no variants"));
    }
}
