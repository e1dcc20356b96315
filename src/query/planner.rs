//! Trigram query planning.
//!
//! A [`TrigramQuery`] describes which trigrams every match of a pattern must
//! contain. Evaluating it against the posting lists yields a candidate set
//! that is a superset of the files that can match; verification narrows it
//! down afterwards. Planning is allowed to give up at any point by returning
//! [`TrigramQuery::All`], which only costs speed.

use crate::index::postings::TrigramPostings;
use crate::index::types::Trigram;
use crate::query::pattern::Pattern;
use crate::utils::query_trigrams;
use regex_syntax::hir::{Hir, HirKind};
use roaring::RoaringBitmap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrigramQuery {
    /// Every trigram must be present
    And(Vec<Trigram>),
    /// At least one branch must hold
    Or(Vec<TrigramQuery>),
    /// No usable constraint; every file is a candidate
    All,
}

impl TrigramQuery {
    /// Plan the trigram query for a classified pattern
    pub fn for_pattern(pattern: &Pattern) -> Self {
        match pattern {
            Pattern::Literal(text) => Self::from_literal(text.as_bytes()),
            Pattern::Raw(regex) => match regex_syntax::parse(regex) {
                Ok(hir) => Self::from_hir(&hir),
                // Compilation reports the error; planning just stays permissive
                Err(_) => TrigramQuery::All,
            },
        }
    }

    fn from_literal(bytes: &[u8]) -> Self {
        let trigrams = query_trigrams(bytes);
        if trigrams.is_empty() {
            TrigramQuery::All
        } else {
            TrigramQuery::And(trigrams)
        }
    }

    fn from_hir(hir: &Hir) -> Self {
        match hir.kind() {
            HirKind::Literal(lit) => Self::from_literal(&lit.0),
            HirKind::Capture(cap) => Self::from_hir(&cap.sub),
            HirKind::Repetition(rep) if rep.min >= 1 => Self::from_hir(&rep.sub),
            HirKind::Concat(subs) => Self::from_concat(subs),
            HirKind::Alternation(alts) => {
                let branches: Vec<TrigramQuery> = alts.iter().map(Self::from_hir).collect();
                if branches.iter().any(TrigramQuery::is_all) {
                    TrigramQuery::All
                } else {
                    TrigramQuery::Or(branches)
                }
            }
            // Optional repetitions, classes, look-arounds and the empty regex
            _ => TrigramQuery::All,
        }
    }

    /// Contiguous literal runs contribute their trigrams; other parts
    /// contribute whatever they require on their own.
    fn from_concat(subs: &[Hir]) -> Self {
        let mut required: Vec<Trigram> = Vec::new();
        let mut alternatives: Option<TrigramQuery> = None;
        let mut run: Vec<u8> = Vec::new();

        for sub in subs {
            if let Some(bytes) = literal_bytes(sub) {
                run.extend_from_slice(bytes);
                continue;
            }
            // Zero-width items keep the neighbouring literals adjacent
            if matches!(sub.kind(), HirKind::Look(_) | HirKind::Empty) {
                continue;
            }

            required.extend(query_trigrams(&run));
            run.clear();

            match Self::from_hir(sub) {
                TrigramQuery::And(trigrams) => required.extend(trigrams),
                or @ TrigramQuery::Or(_) => {
                    if alternatives.is_none() {
                        alternatives = Some(or);
                    }
                }
                TrigramQuery::All => {}
            }
        }
        required.extend(query_trigrams(&run));

        required.sort_unstable();
        required.dedup();

        match (required.is_empty(), alternatives) {
            (false, _) => TrigramQuery::And(required),
            (true, Some(or)) => or,
            (true, None) => TrigramQuery::All,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, TrigramQuery::All)
    }

    /// Trigrams present in every match regardless of branch
    pub fn required(&self) -> Vec<Trigram> {
        match self {
            TrigramQuery::All => Vec::new(),
            TrigramQuery::And(trigrams) => trigrams.clone(),
            TrigramQuery::Or(branches) => {
                let mut iter = branches.iter().map(TrigramQuery::required);
                let Some(mut common) = iter.next() else {
                    return Vec::new();
                };
                for other in iter {
                    common.retain(|t| other.binary_search(t).is_ok());
                }
                common
            }
        }
    }

    /// Candidate file ids, or None when every file is a candidate
    pub fn candidates(&self, postings: &TrigramPostings) -> Option<RoaringBitmap> {
        match self {
            TrigramQuery::All => None,
            TrigramQuery::And(trigrams) if trigrams.is_empty() => None,
            TrigramQuery::And(trigrams) => Some(postings.intersect(trigrams)),
            TrigramQuery::Or(branches) => {
                let mut union = RoaringBitmap::new();
                for branch in branches {
                    union |= branch.candidates(postings)?;
                }
                Some(union)
            }
        }
    }
}

/// Bytes of a plain literal, looking through capture groups
fn literal_bytes(hir: &Hir) -> Option<&[u8]> {
    match hir.kind() {
        HirKind::Literal(lit) => Some(&*lit.0),
        HirKind::Capture(cap) => literal_bytes(&cap.sub),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::trigram_to_bytes;
    use crate::utils::extract_trigrams;

    fn raw(regex: &str) -> TrigramQuery {
        TrigramQuery::for_pattern(&Pattern::Raw(regex.to_string()))
    }

    fn required_strings(query: &TrigramQuery) -> Vec<String> {
        let mut out: Vec<String> = query
            .required()
            .iter()
            .map(|&t| String::from_utf8_lossy(&trigram_to_bytes(t)).into_owned())
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_literal_plan() {
        let query = TrigramQuery::for_pattern(&Pattern::Literal("hello".to_string()));
        assert_eq!(required_strings(&query), vec!["ell", "hel", "llo"]);
    }

    #[test]
    fn test_literal_metacharacters_are_plain_bytes() {
        let query = TrigramQuery::for_pattern(&Pattern::Literal("a.*b".to_string()));
        assert_eq!(required_strings(&query), vec![".*b", "a.*"]);
    }

    #[test]
    fn test_short_patterns_scan_everything() {
        assert!(TrigramQuery::for_pattern(&Pattern::Literal("ab".to_string())).is_all());
        assert!(raw("ab").is_all());
    }

    #[test]
    fn test_required_trigrams() {
        assert_eq!(required_strings(&raw("hello")), vec!["ell", "hel", "llo"]);
        assert_eq!(required_strings(&raw("(hello|yellow)")), vec!["ell", "llo"]);
        assert!(raw("h.*o").is_all());
        assert_eq!(required_strings(&raw("(abc){1,3}")), vec!["abc"]);
        assert!(raw("(abc){0,3}").is_all());
        assert_eq!(required_strings(&raw("(foo|bar)baz")), vec!["baz"]);
        assert_eq!(
            required_strings(&raw("abcdefg")),
            vec!["abc", "bcd", "cde", "def", "efg"]
        );
        assert!(raw(r"\d{3}-\d{3}-\d{4}").is_all());
    }

    #[test]
    fn test_regex_gap_splits_runs() {
        assert_eq!(required_strings(&raw("my.*tion")), vec!["ion", "tio"]);
    }

    #[test]
    fn test_alternation_keeps_branches() {
        match raw("foo|bar") {
            TrigramQuery::Or(branches) => assert_eq!(branches.len(), 2),
            other => panic!("expected Or, got {other:?}"),
        }
        assert!(raw("foo|.").is_all());
    }

    #[test]
    fn test_word_boundaries_are_transparent() {
        assert_eq!(required_strings(&raw(r"\bfoo\b")), vec!["foo"]);
    }

    #[test]
    fn test_case_insensitive_falls_back() {
        assert!(raw("(?i)hello").is_all());
    }

    #[test]
    fn test_invalid_regex_plans_all() {
        assert!(raw("(unclosed").is_all());
    }

    #[test]
    fn test_candidates() {
        let mut postings = TrigramPostings::new();
        postings.add_file(1, &extract_trigrams(b"foo baz bar baz"));
        postings.add_file(2, &extract_trigrams(b"hellohello world!"));
        postings.add_file(3, &extract_trigrams(b"nothing relevant here."));

        let ids = |q: TrigramQuery| {
            q.candidates(&postings)
                .map(|set| set.iter().collect::<Vec<_>>())
        };

        assert_eq!(ids(raw("(foo|bar)")), Some(vec![1]));
        assert_eq!(ids(raw("(?:hello){2,} world")), Some(vec![2]));
        assert_eq!(ids(raw("missing")), Some(vec![]));
        assert_eq!(ids(raw("a.c")), None);
    }
}
