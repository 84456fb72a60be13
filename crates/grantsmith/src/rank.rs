//! Relevance ranking of candidates against a free-text context.
//!
//! One scoring algorithm, two call sites: ranking partner organizations
//! against a proposal narrative before consortium selection, and ranking
//! indexed knowledge fragments against the current generation context to
//! pick grounding material for the next prompt. Pure computation over
//! in-memory values — no locking, no side effects.

use serde::Serialize;
use std::collections::HashSet;

use crate::model::{KnowledgeChunk, Partner};

/// Weight of a keyword hit. Keyword matches dominate prose-token overlap
/// by design — curated keywords are a much stronger signal.
pub const KEYWORD_WEIGHT: u32 = 10;

/// Maximum recorded match reasons per candidate.
pub const MAX_REASONS: usize = 3;

/// Context tokens shorter than this are noise ("the", "for", "and").
const MIN_TOKEN_LEN: usize = 4;

/// A candidate that can be scored against a context string.
pub trait Rankable {
    /// Curated keyword set.
    fn keywords(&self) -> &[String];
    /// Free-text corpus (description, experience, content) searched for
    /// context-token overlap.
    fn corpus(&self) -> String;
}

impl Rankable for Partner {
    fn keywords(&self) -> &[String] {
        &self.keywords
    }
    fn corpus(&self) -> String {
        format!("{} {}", self.description, self.experience)
    }
}

impl Rankable for KnowledgeChunk {
    fn keywords(&self) -> &[String] {
        &self.keywords
    }
    fn corpus(&self) -> String {
        format!("{} {}", self.title, self.content)
    }
}

// Ranking borrowed candidates avoids cloning a registry per request.
impl<T: Rankable> Rankable for &T {
    fn keywords(&self) -> &[String] {
        (**self).keywords()
    }
    fn corpus(&self) -> String {
        (**self).corpus()
    }
}

/// A scored candidate. The score and reasons are ephemeral annotations —
/// computed per request, never persisted.
#[derive(Serialize, Debug, Clone)]
pub struct Ranked<T> {
    #[serde(flatten)]
    pub item: T,
    #[serde(rename = "relevanceScore")]
    pub score: u32,
    #[serde(rename = "matchReasons")]
    pub reasons: Vec<String>,
}

/// Score and sort candidates against the context, best first.
///
/// Keyword hits (case-insensitive substring of the context) add
/// [`KEYWORD_WEIGHT`] each and record a reason, capped at [`MAX_REASONS`].
/// Context tokens found in the candidate's corpus add 1 each — too noisy to
/// enumerate as reasons. The sort is stable: equal scores keep their input
/// order.
pub fn rank<T: Rankable>(context: &str, items: Vec<T>) -> Vec<Ranked<T>> {
    let context_lower = context.to_lowercase();
    let tokens = context_tokens(&context_lower);

    let mut ranked: Vec<Ranked<T>> = items
        .into_iter()
        .map(|item| {
            let mut score = 0u32;
            let mut reasons = Vec::new();

            for keyword in item.keywords() {
                let keyword_lower = keyword.to_lowercase();
                if !keyword_lower.is_empty() && context_lower.contains(&keyword_lower) {
                    score += KEYWORD_WEIGHT;
                    if reasons.len() < MAX_REASONS {
                        reasons.push(format!("keyword \"{keyword}\" matches the context"));
                    }
                }
            }

            let corpus = item.corpus().to_lowercase();
            for token in &tokens {
                if corpus.contains(token.as_str()) {
                    score += 1;
                }
            }

            Ranked {
                item,
                score,
                reasons,
            }
        })
        .collect();

    // Vec::sort_by is stable — ties keep input order.
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Select the best `limit` items, discarding zero-score candidates. Used
/// for retrieval grounding, where an irrelevant fragment is worse than
/// none.
pub fn top_matches<T: Rankable>(context: &str, items: Vec<T>, limit: usize) -> Vec<Ranked<T>> {
    rank(context, items)
        .into_iter()
        .filter(|r| r.score > 0)
        .take(limit)
        .collect()
}

/// Unique lowercase words longer than 3 characters.
fn context_tokens(context_lower: &str) -> HashSet<String> {
    context_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner(name: &str, keywords: &[&str], description: &str) -> Partner {
        Partner {
            id: name.to_lowercase(),
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            description: description.into(),
            experience: String::new(),
        }
    }

    #[test]
    fn keyword_match_dominates_token_overlap() {
        let context = "We are deploying AI for precision agriculture in semi-arid regions.";
        let a = partner("Alpha", &["AI"], "machine learning for farms");
        let b = partner("Beta", &[], "unrelated maritime logistics");

        let ranked = rank(context, vec![a, b]);
        assert_eq!(ranked[0].item.name, "Alpha");
        assert!(ranked[0].score >= KEYWORD_WEIGHT);
        assert_eq!(ranked[1].score, 0);
    }

    #[test]
    fn token_overlap_scores_one_point_each() {
        let context = "precision irrigation scheduling";
        let candidate = partner("Gamma", &[], "We build irrigation and scheduling tools");
        let ranked = rank(context, vec![candidate]);
        // "precision" misses, "irrigation" and "scheduling" hit.
        assert_eq!(ranked[0].score, 2);
        // Token hits record no reasons.
        assert!(ranked[0].reasons.is_empty());
    }

    #[test]
    fn short_context_words_ignored() {
        // "ai" and "for" are under the token length floor; only keyword
        // matching can see them.
        let context = "ai for crop yield";
        let candidate = partner("Epsilon", &[], "ai for everything");
        let ranked = rank(context, vec![candidate]);
        assert_eq!(ranked[0].score, 0);
    }

    #[test]
    fn reasons_capped_at_three() {
        let context = "agriculture soil water climate sensors";
        let candidate = partner(
            "Delta",
            &["agriculture", "soil", "water", "climate", "sensors"],
            "",
        );
        let ranked = rank(context, vec![candidate]);
        assert_eq!(ranked[0].score, 5 * KEYWORD_WEIGHT);
        assert_eq!(ranked[0].reasons.len(), MAX_REASONS);
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let context = "robotics";
        let a = partner("First", &["robotics"], "");
        let b = partner("Second", &["robotics"], "");
        let ranked = rank(context, vec![a, b]);
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ranked[0].item.name, "First");
        assert_eq!(ranked[1].item.name, "Second");
    }

    #[test]
    fn first_element_has_max_score() {
        let context = "marine biology sensors for coastal monitoring";
        let candidates = vec![
            partner("A", &[], "nothing related"),
            partner("B", &["sensors"], "coastal monitoring platforms"),
            partner("C", &["marine biology"], "marine work"),
        ];
        let ranked = rank(context, candidates);
        assert!(ranked.iter().all(|r| r.score <= ranked[0].score));
    }

    #[test]
    fn knowledge_chunks_rank_for_grounding() {
        let context = "hydrogen electrolyzer efficiency improvements";
        let chunks = vec![
            KnowledgeChunk {
                id: "k1".into(),
                title: "Electrolyzer stack design".into(),
                keywords: vec!["hydrogen".into(), "electrolyzer".into()],
                content: "Notes on efficiency of PEM stacks.".into(),
            },
            KnowledgeChunk {
                id: "k2".into(),
                title: "Wind turbine blades".into(),
                keywords: vec!["wind".into()],
                content: "Blade fatigue data.".into(),
            },
        ];
        let top = top_matches(context, chunks, 3);
        assert_eq!(top.len(), 1, "zero-score chunk must be dropped");
        assert_eq!(top[0].item.id, "k1");
    }

    #[test]
    fn ranked_serializes_with_flattened_item() {
        let ranked = rank("robotics", vec![partner("Solo", &["robotics"], "")]);
        let json = serde_json::to_value(&ranked[0]).unwrap();
        assert_eq!(json["name"], "Solo");
        assert_eq!(json["relevanceScore"], 10);
        assert!(json["matchReasons"].as_array().unwrap().len() <= MAX_REASONS);
    }
}
