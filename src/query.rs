use std::collections::BTreeSet;

use crate::backend::ValueSlot;
use crate::postlist::{DocCount, TermCount, TermPos};

/// A parsed query tree, as handed over by the (external) query parser.
///
/// Positional operators apply to plain terms; the other operators compose
/// arbitrary subqueries.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term {
        term: String,
        wqf: TermCount,
    },
    And(Vec<Query>),
    Or(Vec<Query>),
    /// Disjoint union: matches documents matched by an odd number of
    /// subqueries.
    Xor(Vec<Query>),
    /// Union scored by the best matching subquery instead of the sum.
    Max(Vec<Query>),
    AndNot(Box<Query>, Box<Query>),
    AndMaybe(Box<Query>, Box<Query>),
    /// Subqueries scored as if they were occurrences of a single term.
    /// `wdf_disjoint` asserts that no document matches more than one of
    /// them.
    Synonym {
        subqueries: Vec<Query>,
        wdf_disjoint: bool,
    },
    /// Terms at consecutive positions, in order.
    ExactPhrase {
        terms: Vec<String>,
    },
    /// Terms in order within a window of `window` positions.
    Phrase {
        terms: Vec<String>,
        window: TermPos,
    },
    /// Terms in any order within a window of `window` positions.
    Near {
        terms: Vec<String>,
        window: TermPos,
    },
    /// Documents whose stored value in `slot` lies in `[begin, end]`.
    /// `est` is the caller's pre-computed matching-document estimate.
    ValueRange {
        slot: ValueSlot,
        begin: Vec<u8>,
        end: Vec<u8>,
        est: DocCount,
    },
}

impl Query {
    /// Convenience constructor for a term with query frequency 1.
    pub fn term<T: Into<String>>(term: T) -> Query {
        Query::Term {
            term: term.into(),
            wqf: 1,
        }
    }

    /// All terms mentioned anywhere in the tree, deduplicated.
    pub fn terms(&self) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        self.collect_terms(&mut set);
        set
    }

    fn collect_terms(&self, set: &mut BTreeSet<String>) {
        match self {
            Query::Term { term, .. } => {
                set.insert(term.clone());
            }
            Query::And(subs) | Query::Or(subs) | Query::Xor(subs) | Query::Max(subs) => {
                for sub in subs {
                    sub.collect_terms(set);
                }
            }
            Query::AndNot(l, r) | Query::AndMaybe(l, r) => {
                l.collect_terms(set);
                r.collect_terms(set);
            }
            Query::Synonym { subqueries, .. } => {
                for sub in subqueries {
                    sub.collect_terms(set);
                }
            }
            Query::ExactPhrase { terms }
            | Query::Phrase { terms, .. }
            | Query::Near { terms, .. } => {
                for term in terms {
                    set.insert(term.clone());
                }
            }
            Query::ValueRange { .. } => {}
        }
    }

    /// Number of leaf subqueries, counting a synonym group as one.
    pub fn subquery_count(&self) -> TermCount {
        match self {
            Query::Term { .. } | Query::ValueRange { .. } | Query::Synonym { .. } => 1,
            Query::And(subs) | Query::Or(subs) | Query::Xor(subs) | Query::Max(subs) => {
                subs.iter().map(|sub| sub.subquery_count()).sum()
            }
            Query::AndNot(l, r) | Query::AndMaybe(l, r) => {
                l.subquery_count() + r.subquery_count()
            }
            Query::ExactPhrase { terms }
            | Query::Phrase { terms, .. }
            | Query::Near { terms, .. } => terms.len() as TermCount,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::Query;

    #[test]
    fn terms_are_collected_and_deduplicated() {
        let query = Query::And(vec![
            Query::term("tea"),
            Query::Or(vec![Query::term("milk"), Query::term("tea")]),
            Query::Phrase {
                terms: vec!["green".to_string(), "tea".to_string()],
                window: 2,
            },
        ]);
        let terms: Vec<String> = query.terms().into_iter().collect();
        assert_eq!(terms, vec!["green", "milk", "tea"]);
        assert_eq!(query.subquery_count(), 5);
    }
}
