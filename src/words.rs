//! Word catalog contract and the in-memory implementation.
//!
//! The translation catalog proper is an external collaborator; this
//! module specifies its query contract and carries the selection logic
//! the phase engine uses: script mapping, the fallback chain, the
//! used-word filter with recycling, and the fixed last-resort pool.

use anyhow::Result;
use async_trait::async_trait;
use rand::RngExt;
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};

use crate::protocol::Script;

/// How a word is rendered for the room's audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordRendering {
    EnglishRoman,
    RomanTransliteration,
    NativeScript,
}

/// Query contract against the translation catalog.
#[async_trait]
pub trait WordCatalog: Send + Sync {
    /// All candidate words for a (language, rendering) pair, restricted
    /// to the given category titles when the set is non-empty.
    async fn words_for(
        &self,
        language: &str,
        rendering: WordRendering,
        categories: &BTreeSet<String>,
    ) -> Result<Vec<String>>;
}

/// When every catalog lookup comes back empty, rounds still need words.
pub const FALLBACK_POOL: [&str; 10] = [
    "cat", "house", "tree", "car", "sun", "fish", "book", "chair", "phone", "ball",
];

/// Number of options offered to the drawer each turn.
pub const WORD_OPTION_COUNT: usize = 3;

/// Resolve the room's (language, script) pair into the catalog queries
/// to attempt, most specific first:
/// English rooms always draw roman English words; non-English rooms
/// honor the script setting and then fall back roman → native → English.
pub fn rendering_chain(language: &str, script: Script) -> Vec<(String, WordRendering)> {
    let language = language.to_ascii_lowercase();
    if language == "english" {
        return vec![("english".to_string(), WordRendering::EnglishRoman)];
    }
    let mut chain = match script {
        Script::English => vec![("english".to_string(), WordRendering::EnglishRoman)],
        Script::Default => vec![
            (language.clone(), WordRendering::RomanTransliteration),
            (language.clone(), WordRendering::NativeScript),
        ],
        Script::Native => vec![
            (language.clone(), WordRendering::NativeScript),
            (language.clone(), WordRendering::RomanTransliteration),
        ],
    };
    if !chain
        .iter()
        .any(|(lang, rendering)| lang == "english" && *rendering == WordRendering::EnglishRoman)
    {
        chain.push(("english".to_string(), WordRendering::EnglishRoman));
    }
    chain
}

/// Draw up to three distinct options for the drawer.
///
/// Words already played this game are filtered out; if that leaves fewer
/// than three, the filter is dropped for this turn (recycling). The
/// fixed pool is the last resort when the catalog has nothing at all.
pub async fn pick_word_options(
    catalog: &dyn WordCatalog,
    language: &str,
    script: Script,
    categories: &BTreeSet<String>,
    used_words: &BTreeSet<String>,
) -> SmallVec<[String; 3]> {
    for (lang, rendering) in rendering_chain(language, script) {
        let candidates = match catalog.words_for(&lang, rendering, categories).await {
            Ok(words) => words,
            Err(err) => {
                tracing::warn!(language = %lang, error = %err, "Word catalog query failed");
                continue;
            }
        };
        if candidates.is_empty() {
            continue;
        }

        let fresh: Vec<&String> = candidates
            .iter()
            .filter(|word| !used_words.contains(word.as_str()))
            .collect();
        let pool: Vec<&String> = if fresh.len() >= WORD_OPTION_COUNT {
            fresh
        } else {
            candidates.iter().collect()
        };

        let mut picked: Vec<&String> = pool;
        picked.sort();
        picked.dedup();

        let options = sample_distinct(&picked, WORD_OPTION_COUNT);
        if !options.is_empty() {
            return options;
        }
    }

    // Last resort: the fixed pool, still honoring the used-word filter
    // when possible.
    let fresh: Vec<String> = FALLBACK_POOL
        .iter()
        .filter(|word| !used_words.contains(**word))
        .map(|word| word.to_string())
        .collect();
    let pool: Vec<String> = if fresh.len() >= WORD_OPTION_COUNT {
        fresh
    } else {
        FALLBACK_POOL.iter().map(|word| word.to_string()).collect()
    };
    let refs: Vec<&String> = pool.iter().collect();
    sample_distinct(&refs, WORD_OPTION_COUNT)
}

/// Uniform sample of up to `count` elements via a partial Fisher-Yates.
fn sample_distinct(pool: &[&String], count: usize) -> SmallVec<[String; 3]> {
    let take = count.min(pool.len());
    let mut indices: Vec<usize> = (0..pool.len()).collect();
    let mut rng = rand::rng();
    for i in 0..take {
        let j = rng.random_range(i..indices.len());
        indices.swap(i, j);
    }
    indices
        .iter()
        .take(take)
        .map(|&i| {
            // SAFETY: indices are drawn from 0..pool.len().
            #[allow(clippy::indexing_slicing)]
            let word = pool[i].clone();
            word
        })
        .collect()
}

/// In-memory catalog seeded from configuration; doubles as the test
/// double for the external translation service.
#[derive(Default)]
pub struct InMemoryWordCatalog {
    entries: HashMap<(String, WordRendering), Vec<CatalogEntry>>,
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    text: String,
    category: Option<String>,
}

impl InMemoryWordCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with a small English starter set so a fresh deployment
    /// can run games before any catalog import.
    pub fn with_builtin_words() -> Self {
        let mut catalog = Self::new();
        for word in [
            "apple", "bridge", "castle", "dragon", "elephant", "forest", "guitar", "island",
            "jacket", "kitchen", "ladder", "mountain", "notebook", "ocean", "pencil", "rainbow",
            "sandwich", "tiger", "umbrella", "volcano",
        ] {
            catalog.insert("english", WordRendering::EnglishRoman, word, None);
        }
        catalog
    }

    pub fn insert(
        &mut self,
        language: &str,
        rendering: WordRendering,
        text: &str,
        category: Option<&str>,
    ) {
        self.entries
            .entry((language.to_ascii_lowercase(), rendering))
            .or_default()
            .push(CatalogEntry {
                text: text.to_string(),
                category: category.map(str::to_string),
            });
    }
}

#[async_trait]
impl WordCatalog for InMemoryWordCatalog {
    async fn words_for(
        &self,
        language: &str,
        rendering: WordRendering,
        categories: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        let Some(entries) = self
            .entries
            .get(&(language.to_ascii_lowercase(), rendering))
        else {
            return Ok(Vec::new());
        };
        Ok(entries
            .iter()
            .filter(|entry| {
                categories.is_empty()
                    || entry
                        .category
                        .as_ref()
                        .is_some_and(|c| categories.contains(c))
            })
            .map(|entry| entry.text.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_categories() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[test]
    fn test_rendering_chain_english_room() {
        let chain = rendering_chain("English", Script::Native);
        assert_eq!(
            chain,
            vec![("english".to_string(), WordRendering::EnglishRoman)]
        );
    }

    #[test]
    fn test_rendering_chain_default_script_prefers_roman() {
        let chain = rendering_chain("hindi", Script::Default);
        assert_eq!(
            chain,
            vec![
                ("hindi".to_string(), WordRendering::RomanTransliteration),
                ("hindi".to_string(), WordRendering::NativeScript),
                ("english".to_string(), WordRendering::EnglishRoman),
            ]
        );
    }

    #[test]
    fn test_rendering_chain_native_script_prefers_native() {
        let chain = rendering_chain("hindi", Script::Native);
        assert_eq!(chain[0], ("hindi".to_string(), WordRendering::NativeScript));
        assert_eq!(
            chain.last().unwrap(),
            &("english".to_string(), WordRendering::EnglishRoman)
        );
    }

    #[tokio::test]
    async fn test_pick_options_filters_used_words() {
        let mut catalog = InMemoryWordCatalog::new();
        for word in ["alpha", "beta", "gamma", "delta"] {
            catalog.insert("english", WordRendering::EnglishRoman, word, None);
        }
        let used: BTreeSet<String> = ["alpha".to_string()].into_iter().collect();

        let options = pick_word_options(
            &catalog,
            "english",
            Script::Default,
            &no_categories(),
            &used,
        )
        .await;
        assert_eq!(options.len(), 3);
        assert!(!options.contains(&"alpha".to_string()));
    }

    #[tokio::test]
    async fn test_pick_options_recycles_when_exhausted() {
        let mut catalog = InMemoryWordCatalog::new();
        for word in ["alpha", "beta", "gamma"] {
            catalog.insert("english", WordRendering::EnglishRoman, word, None);
        }
        let used: BTreeSet<String> = ["alpha", "beta", "gamma"]
            .into_iter()
            .map(str::to_string)
            .collect();

        let options = pick_word_options(
            &catalog,
            "english",
            Script::Default,
            &no_categories(),
            &used,
        )
        .await;
        assert_eq!(options.len(), 3, "recycling drops the used-word filter");
    }

    #[tokio::test]
    async fn test_pick_options_falls_back_to_fixed_pool() {
        let catalog = InMemoryWordCatalog::new();
        let options = pick_word_options(
            &catalog,
            "klingon",
            Script::Native,
            &no_categories(),
            &BTreeSet::new(),
        )
        .await;
        assert_eq!(options.len(), 3);
        for word in &options {
            assert!(FALLBACK_POOL.contains(&word.as_str()));
        }
    }

    #[tokio::test]
    async fn test_category_filter_applies() {
        let mut catalog = InMemoryWordCatalog::new();
        catalog.insert("english", WordRendering::EnglishRoman, "tiger", Some("animals"));
        catalog.insert("english", WordRendering::EnglishRoman, "guitar", Some("music"));
        let categories: BTreeSet<String> = ["animals".to_string()].into_iter().collect();

        let words = catalog
            .words_for("english", WordRendering::EnglishRoman, &categories)
            .await
            .unwrap();
        assert_eq!(words, vec!["tiger".to_string()]);
    }

    #[tokio::test]
    async fn test_options_are_distinct() {
        let mut catalog = InMemoryWordCatalog::new();
        for word in ["alpha", "beta", "gamma", "delta", "epsilon"] {
            catalog.insert("english", WordRendering::EnglishRoman, word, None);
        }
        for _ in 0..20 {
            let options = pick_word_options(
                &catalog,
                "english",
                Script::Default,
                &no_categories(),
                &BTreeSet::new(),
            )
            .await;
            let unique: BTreeSet<&String> = options.iter().collect();
            assert_eq!(unique.len(), options.len());
        }
    }
}
