//! Full-text analysis for the in-memory store.
//!
//! Mirrors the shape of Postgres text search: documents are reduced to a
//! [`LexemeVector`] (normalized lexemes with positions) and queries are parsed
//! with web-search syntax into a [`TextQuery`] that either matches a vector or
//! not. Matching is a predicate; [`TextQuery::rank`] scores only matches.

use std::collections::{BTreeMap, BTreeSet};

use unicode_segmentation::UnicodeSegmentation;

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

// Longest first.
const SUFFIXES: &[&str] = &[
    "ational", "ization", "fulness", "ousness", "iveness", "ement", "ments", "ment", "ness",
    "ings", "ing", "ies", "ied", "edly", "ed", "es", "ly", "s",
];

fn is_stop_word(word: &str) -> bool {
    ENGLISH_STOP_WORDS.binary_search(&word).is_ok()
}

fn stem(word: &str) -> String {
    for suffix in SUFFIXES {
        if *suffix == "s" && (word.ends_with("ss") || word.ends_with("us") || word.ends_with("is"))
        {
            continue;
        }
        if let Some(stripped) = word.strip_suffix(suffix) {
            if stripped.chars().count() >= 3 {
                return stripped.to_string();
            }
        }
    }
    word.to_string()
}

/// Lowercase, drop stop words and strip common English suffixes.
///
/// Returns `None` for stop words.
pub fn normalize(word: &str) -> Option<String> {
    let lower = word.to_lowercase();
    if lower.is_empty() || is_stop_word(&lower) {
        return None;
    }
    Some(stem(&lower))
}

/// Split `text` into words, keeping each word's position. Stop words
/// consume a position but are not returned.
fn positioned_lexemes(text: &str) -> Vec<(usize, String)> {
    text.unicode_words()
        .enumerate()
        .filter_map(|(pos, word)| normalize(word).map(|lexeme| (pos, lexeme)))
        .collect()
}

/// Normalized lexemes of a text with their word positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LexemeVector {
    positions: BTreeMap<String, Vec<usize>>,
}

impl LexemeVector {
    /// Analyze a single text.
    pub fn from_text(text: &str) -> Self {
        let mut positions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (pos, lexeme) in positioned_lexemes(text) {
            positions.entry(lexeme).or_default().push(pos);
        }
        Self { positions }
    }

    /// Searchable representation of a document: title followed by content.
    pub fn for_document(title: &str, content: &str) -> Self {
        Self::from_text(&format!("{title} {content}"))
    }

    /// Number of occurrences of `lexeme`.
    pub fn frequency(&self, lexeme: &str) -> usize {
        self.positions.get(lexeme).map_or(0, Vec::len)
    }

    pub fn contains(&self, lexeme: &str) -> bool {
        self.positions.contains_key(lexeme)
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn contains_phrase(&self, phrase: &[(usize, String)]) -> bool {
        let Some((first_offset, first)) = phrase.first() else {
            return false;
        };
        let Some(starts) = self.positions.get(first) else {
            return false;
        };
        starts.iter().any(|&start| {
            phrase.iter().all(|(offset, lexeme)| {
                let Some(pos) = (start + offset).checked_sub(*first_offset) else {
                    return false;
                };
                self.positions.get(lexeme).is_some_and(|p| p.contains(&pos))
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Word(String),
    /// Lexemes with their offsets inside the phrase.
    Phrase(Vec<(usize, String)>),
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    term: Term,
    negated: bool,
}

impl Clause {
    fn matches(&self, vector: &LexemeVector) -> bool {
        let present = match &self.term {
            Term::Word(lexeme) => vector.contains(lexeme),
            Term::Phrase(lexemes) => vector.contains_phrase(lexemes),
        };
        present != self.negated
    }
}

enum Token {
    Or,
    Item { text: String, quoted: bool, negated: bool },
}

fn lex_query(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let negated = c == '-';
        if negated {
            chars.next();
        }
        if chars.peek() == Some(&'"') {
            chars.next();
            let text: String = chars.by_ref().take_while(|&c| c != '"').collect();
            tokens.push(Token::Item { text, quoted: true, negated });
            continue;
        }
        let mut text = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '"' {
                break;
            }
            text.push(c);
            chars.next();
        }
        if !negated && text.eq_ignore_ascii_case("or") {
            tokens.push(Token::Or);
        } else {
            tokens.push(Token::Item { text, quoted: false, negated });
        }
    }
    tokens
}

fn to_term(text: &str) -> Option<Term> {
    let lexemes = positioned_lexemes(text);
    match lexemes.len() {
        0 => None,
        1 => lexemes.into_iter().next().map(|(_, lexeme)| Term::Word(lexeme)),
        _ => Some(Term::Phrase(lexemes)),
    }
}

/// A parsed web-search style query.
///
/// Unquoted words are ANDed, `"quoted text"` must appear as a phrase, `or`
/// between two items makes them alternatives and a leading `-` excludes a
/// word or phrase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextQuery {
    /// Every conjunct must hold; a conjunct holds if any alternative does.
    conjuncts: Vec<Vec<Clause>>,
}

impl TextQuery {
    pub fn parse(input: &str) -> Self {
        let mut conjuncts: Vec<Vec<Clause>> = Vec::new();
        let mut pending_or = false;
        for token in lex_query(input) {
            match token {
                Token::Or => pending_or = !conjuncts.is_empty(),
                Token::Item { text, quoted, negated } => {
                    // Unquoted hyphenated or dotted tokens split into a phrase,
                    // quoted text is always a phrase.
                    let Some(term) = to_term(&text) else {
                        continue;
                    };
                    let term = match term {
                        Term::Word(w) if quoted => Term::Phrase(vec![(0, w)]),
                        other => other,
                    };
                    let clause = Clause { term, negated };
                    match conjuncts.last_mut() {
                        Some(last) if pending_or => last.push(clause),
                        _ => conjuncts.push(vec![clause]),
                    }
                    pending_or = false;
                }
            }
        }
        Self { conjuncts }
    }

    /// A query whose every word was a stop word matches nothing.
    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    pub fn matches(&self, vector: &LexemeVector) -> bool {
        !self.is_empty()
            && self.conjuncts.iter().all(|alternatives| alternatives.iter().any(|c| c.matches(vector)))
    }

    fn positive_lexemes(&self) -> BTreeSet<&str> {
        let mut lexemes = BTreeSet::new();
        for clause in self.conjuncts.iter().flatten().filter(|c| !c.negated) {
            match &clause.term {
                Term::Word(w) => {
                    lexemes.insert(w.as_str());
                }
                Term::Phrase(p) => lexemes.extend(p.iter().map(|(_, w)| w.as_str())),
            }
        }
        lexemes
    }

    /// Relevance of a vector for this query: the mean over positive lexemes
    /// of `1 - 0.9^tf`. Returns 0 for vectors the query does not match.
    pub fn rank(&self, vector: &LexemeVector) -> f64 {
        if !self.matches(vector) {
            return 0.0;
        }
        let lexemes = self.positive_lexemes();
        if lexemes.is_empty() {
            return 0.0;
        }
        let total: f64 = lexemes
            .iter()
            .map(|lexeme| {
                let tf = i32::try_from(vector.frequency(lexeme)).unwrap_or(i32::MAX);
                1.0 - 0.9f64.powi(tf)
            })
            .sum();
        total / lexemes.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_words_are_sorted_for_binary_search() {
        let mut sorted = ENGLISH_STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, ENGLISH_STOP_WORDS);
    }

    #[test]
    fn normalize_lowercases_stems_and_drops_stop_words() {
        assert_eq!(normalize("The"), None);
        assert_eq!(normalize("Branches").as_deref(), Some("branch"));
        assert_eq!(normalize("branch").as_deref(), Some("branch"));
        assert_eq!(normalize("indexing").as_deref(), Some("index"));
        assert_eq!(normalize("class").as_deref(), Some("class"));
    }

    #[test]
    fn all_words_must_match() {
        let doc = LexemeVector::for_document("Serverless Postgres", "Branching for databases");
        assert!(TextQuery::parse("postgres branches").matches(&doc));
        assert!(!TextQuery::parse("postgres mysql").matches(&doc));
    }

    #[test]
    fn or_makes_alternatives() {
        let doc = LexemeVector::from_text("vector search with pgvector");
        assert!(TextQuery::parse("mysql or pgvector").matches(&doc));
        assert!(TextQuery::parse("search mysql OR vector").matches(&doc));
        assert!(!TextQuery::parse("mysql or sqlite").matches(&doc));
    }

    #[test]
    fn negation_excludes() {
        let doc = LexemeVector::from_text("vector search with pgvector");
        assert!(!TextQuery::parse("vector -pgvector").matches(&doc));
        assert!(TextQuery::parse("vector -mysql").matches(&doc));
    }

    #[test]
    fn phrases_require_adjacency() {
        let doc = LexemeVector::from_text("hybrid search combines vector search and keyword search");
        assert!(TextQuery::parse("\"vector search\"").matches(&doc));
        assert!(!TextQuery::parse("\"search vector\"").matches(&doc));
        assert!(TextQuery::parse("\"combines vector\" keyword").matches(&doc));
    }

    #[test]
    fn phrases_keep_stop_word_gaps() {
        let doc = LexemeVector::from_text("state of the art");
        assert!(TextQuery::parse("\"state of the art\"").matches(&doc));
        assert!(!TextQuery::parse("\"state art\"").matches(&doc));
    }

    #[test]
    fn stop_word_only_query_matches_nothing() {
        let doc = LexemeVector::from_text("the and of");
        let query = TextQuery::parse("the and");
        assert!(query.is_empty());
        assert!(!query.matches(&doc));
        assert_eq!(query.rank(&doc), 0.0);
    }

    #[test]
    fn rank_grows_with_term_frequency() {
        let once = LexemeVector::from_text("postgres");
        let thrice = LexemeVector::from_text("postgres postgres postgres");
        let query = TextQuery::parse("postgres");
        assert!((query.rank(&once) - 0.1).abs() < 1e-12);
        assert!(query.rank(&thrice) > query.rank(&once));
        assert_eq!(query.rank(&LexemeVector::from_text("mysql")), 0.0);
    }
}
