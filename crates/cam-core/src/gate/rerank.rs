//! Re-ranking of candidates that survived the distance threshold.

use cam_types::memory::RetrievalCandidate;

/// Reorders retrieval candidates for a query.
///
/// Kept separate from the retrieval control flow so a learned ranker can
/// replace the lexical one.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate>;
}

/// Leaves the store's nearest-first order untouched.
pub struct DistanceOrder;

impl Reranker for DistanceOrder {
    fn rerank(&self, _query: &str, candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
        candidates
    }
}

const THIRD_PERSON_PRONOUNS: &[&str] = &["he", "she", "it", "they", "him", "her", "them"];
const IDENTITY_VERBS: &[&str] = &["called", "named", "is", "has"];

const IDENTITY_BOOST: f32 = 1.25;
const PROPER_NOUN_BOOST: f32 = 1.10;

/// Promotes short identity statements for anaphoric queries.
///
/// A query like "how old is she?" is lexically far from "My sister is called
/// Mia", so when the query has a third-person pronoun and names nobody,
/// candidates are rescored by `1/(1+distance)` with boosts for identity
/// verbs and proper nouns.
pub struct PronounReranker;

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .filter(|w| !w.is_empty())
}

/// Words capitalised only because they open a sentence.
const SENTENCE_OPENERS: &[&str] = &[
    "what", "who", "whom", "whose", "which", "when", "where", "why", "how",
    "is", "are", "was", "were", "am", "be", "do", "does", "did", "can", "could", "will",
    "would", "shall", "should", "may", "might", "must", "have", "has", "had",
    "i", "me", "my", "we", "us", "our", "you", "your", "he", "him", "his", "she", "her",
    "it", "its", "they", "them", "their", "this", "that", "these", "those", "there", "here",
    "a", "an", "the", "and", "but", "or", "so", "then", "if", "because", "since", "while",
    "after", "before", "also", "just", "well", "oh", "hey", "hi", "hello", "please", "yes",
    "no", "not", "ok", "okay", "yesterday", "today", "tomorrow", "tonight", "now",
];

fn is_capitalised(word: &str) -> bool {
    word != "I" && !word.starts_with("I'") && word.chars().next().is_some_and(char::is_uppercase)
}

/// Whether the text contains a capitalised token that looks like a name.
///
/// A lone "I" never counts. The first word counts unless it is a common
/// sentence opener, so "Luna is my cat" names someone and "Yesterday it
/// rained" does not.
pub fn has_proper_noun(text: &str) -> bool {
    let mut tokens = words(text);
    let first = tokens.next().is_some_and(|w| {
        let lowered = w.to_lowercase();
        let stem = lowered.split('\'').next().unwrap_or_default();
        is_capitalised(w) && !SENTENCE_OPENERS.contains(&stem)
    });
    first || tokens.any(is_capitalised)
}

fn has_pronoun(text: &str) -> bool {
    words(text).any(|w| THIRD_PERSON_PRONOUNS.contains(&w.to_lowercase().as_str()))
}

fn has_identity_verb(text: &str) -> bool {
    words(text).any(|w| IDENTITY_VERBS.contains(&w.to_lowercase().as_str()))
}

impl PronounReranker {
    /// Whether the query triggers re-ranking.
    pub fn applies_to(query: &str) -> bool {
        has_pronoun(query) && !has_proper_noun(query)
    }

    pub fn score(candidate: &RetrievalCandidate) -> f32 {
        let mut score = 1.0 / (1.0 + candidate.distance.max(0.0));
        let prompt = &candidate.metadata.user_prompt;
        if has_identity_verb(&candidate.text) || has_identity_verb(prompt) {
            score *= IDENTITY_BOOST;
        }
        if has_proper_noun(&candidate.text) || has_proper_noun(prompt) {
            score *= PROPER_NOUN_BOOST;
        }
        score
    }
}

impl Reranker for PronounReranker {
    fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<RetrievalCandidate>,
    ) -> Vec<RetrievalCandidate> {
        if !Self::applies_to(query) {
            return candidates;
        }
        // Stable sort: equal scores keep distance order.
        candidates.sort_by(|a, b| Self::score(b).total_cmp(&Self::score(a)));
        tracing::debug!(count = candidates.len(), "Re-ranked candidates for pronoun query");
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::candidate;

    #[test]
    fn test_applies_only_to_unnamed_pronoun_queries() {
        assert!(PronounReranker::applies_to("How old is she?"));
        assert!(PronounReranker::applies_to("where do they live"));
        assert!(!PronounReranker::applies_to("How old is Mia?"));
        assert!(!PronounReranker::applies_to("What is my cat's name?"));
        // "I" is not a named entity.
        assert!(PronounReranker::applies_to("Did I tell you where he works?"));
    }

    #[test]
    fn test_proper_noun_detector() {
        assert!(has_proper_noun("My sister is called Mia."));
        assert!(!has_proper_noun("Yesterday it rained."));
        assert!(!has_proper_noun("Then I left."));
        assert!(!has_proper_noun("I'm tired"));
        assert!(!has_proper_noun("What's up"));
        assert!(!has_proper_noun(""));
    }

    #[test]
    fn test_leading_name_counts() {
        assert!(has_proper_noun("Luna is my cat"));
        assert!(has_proper_noun("Tom's car broke down"));
        let named = candidate("Luna is my cat", 0.0);
        assert!((PronounReranker::score(&named) - 1.375).abs() < 1e-6);
    }

    #[test]
    fn test_query_opening_with_a_name_is_not_reranked() {
        assert!(!PronounReranker::applies_to("Tom said he would call"));
        assert!(PronounReranker::applies_to("He said he would call"));
    }

    #[test]
    fn test_boosts() {
        let plain = candidate("it rained all day", 0.0);
        let verb = candidate("the weather is grim", 0.0);
        let both = candidate("my sister is called Mia", 0.0);
        assert!((PronounReranker::score(&plain) - 1.0).abs() < 1e-6);
        assert!((PronounReranker::score(&verb) - 1.25).abs() < 1e-6);
        assert!((PronounReranker::score(&both) - 1.375).abs() < 1e-6);
    }

    #[test]
    fn test_identity_statement_overtakes_nearer_chatter() {
        let chatter = candidate("we talked about the weather", 0.30);
        let identity = candidate("my neighbour is called Tom", 0.40);
        let ranked = PronounReranker.rerank("what does he do?", vec![chatter, identity]);
        assert_eq!(ranked[0].text, "my neighbour is called Tom");
    }

    #[test]
    fn test_named_query_keeps_distance_order() {
        let chatter = candidate("we talked about the weather", 0.30);
        let identity = candidate("my neighbour is called Tom", 0.40);
        let ranked = PronounReranker.rerank("what does Tom do?", vec![chatter, identity]);
        assert_eq!(ranked[0].text, "we talked about the weather");
    }
}
