use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use unicode_segmentation::UnicodeSegmentation;

use quern::estimate::Estimates;
use quern::mem::{MemDatabase, MemDatabaseBuilder};
use quern::stats::{RSet, Stats};
use quern::weight::{BoolWeight, CoordWeight, WeightFactory};
use quern::{DocId, Query, SubMatch, TermPos, TreeHandle};

fn index(corpus: &[Vec<String>]) -> MemDatabase {
    let mut builder = MemDatabaseBuilder::new();
    for (i, tokens) in corpus.iter().enumerate() {
        let mut positions: BTreeMap<&str, Vec<TermPos>> = BTreeMap::new();
        for (pos, token) in tokens.iter().enumerate() {
            positions
                .entry(token.as_str())
                .or_insert_with(Vec::new)
                .push(pos as TermPos);
        }
        let terms = positions.into_iter().collect();
        let values = match tokens.first() {
            Some(first) => vec![(0, first.as_bytes().to_vec())],
            None => vec![],
        };
        builder.add_doc(i as DocId + 1, terms, values);
    }
    builder.build().expect("failed to build in-memory shard")
}

fn positions_of(tokens: &[String], term: &str) -> Vec<TermPos> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.as_str() == term)
        .map(|(i, _)| i as TermPos)
        .collect()
}

/// Do any `chosen` positions, one per term, in order with span < window?
fn ordered_window_match(lists: &[Vec<TermPos>], window: TermPos) -> bool {
    fn rec(lists: &[Vec<TermPos>], chosen: &mut Vec<TermPos>, window: TermPos) -> bool {
        if chosen.len() == lists.len() {
            let first = chosen[0];
            let last = chosen[chosen.len() - 1];
            return last - first < window;
        }
        let i = chosen.len();
        for &p in &lists[i] {
            if i > 0 && p <= chosen[i - 1] {
                continue;
            }
            if i > 0 && p - chosen[0] >= window {
                continue;
            }
            chosen.push(p);
            if rec(lists, chosen, window) {
                return true;
            }
            chosen.pop();
        }
        false
    }
    if lists.iter().any(|l| l.is_empty()) {
        return false;
    }
    rec(lists, &mut Vec::new(), window)
}

/// Is there one position per term with max - min < window, any order?
fn near_window_match(lists: &[Vec<TermPos>], window: TermPos) -> bool {
    fn rec(lists: &[Vec<TermPos>], chosen: &mut Vec<TermPos>, window: TermPos) -> bool {
        if chosen.len() == lists.len() {
            let min = chosen.iter().min().cloned().unwrap_or(0);
            let max = chosen.iter().max().cloned().unwrap_or(0);
            return max - min < window;
        }
        let i = chosen.len();
        for &p in &lists[i] {
            chosen.push(p);
            if rec(lists, chosen, window) {
                return true;
            }
            chosen.pop();
        }
        false
    }
    if lists.iter().any(|l| l.is_empty()) {
        return false;
    }
    rec(lists, &mut Vec::new(), window)
}

fn doc_matches(query: &Query, tokens: &[String]) -> bool {
    match query {
        Query::Term { term, .. } => tokens.iter().any(|t| t == term),
        Query::And(subs) => subs.iter().all(|sub| doc_matches(sub, tokens)),
        Query::Or(subs) | Query::Max(subs) => subs.iter().any(|sub| doc_matches(sub, tokens)),
        Query::Xor(subs) => {
            subs.iter().filter(|sub| doc_matches(sub, tokens)).count() % 2 == 1
        }
        Query::AndNot(l, r) => doc_matches(l, tokens) && !doc_matches(r, tokens),
        Query::AndMaybe(l, _) => doc_matches(l, tokens),
        Query::Synonym { subqueries, .. } => {
            subqueries.iter().any(|sub| doc_matches(sub, tokens))
        }
        Query::ExactPhrase { terms } => {
            let lists: Vec<Vec<TermPos>> =
                terms.iter().map(|t| positions_of(tokens, t)).collect();
            if lists.iter().any(|l| l.is_empty()) {
                return false;
            }
            lists[0].iter().any(|&start| {
                lists
                    .iter()
                    .enumerate()
                    .all(|(i, list)| list.contains(&(start + i as TermPos)))
            })
        }
        Query::Phrase { terms, window } => {
            let lists: Vec<Vec<TermPos>> =
                terms.iter().map(|t| positions_of(tokens, t)).collect();
            ordered_window_match(&lists, *window)
        }
        Query::Near { terms, window } => {
            let lists: Vec<Vec<TermPos>> =
                terms.iter().map(|t| positions_of(tokens, t)).collect();
            near_window_match(&lists, *window)
        }
        Query::ValueRange { begin, end, .. } => match tokens.first() {
            Some(first) => {
                first.as_bytes() >= begin.as_slice() && first.as_bytes() <= end.as_slice()
            }
            None => false,
        },
    }
}

fn naive_matches(query: &Query, corpus: &[Vec<String>]) -> Vec<DocId> {
    corpus
        .iter()
        .enumerate()
        .filter(|(_, tokens)| doc_matches(query, tokens))
        .map(|(i, _)| i as DocId + 1)
        .collect()
}

/// Drive a tree to exhaustion, checking the max-weight bound on the way.
fn drive(
    db: &Arc<MemDatabase>,
    query: &Query,
    w_min: f64,
    factory: Arc<dyn WeightFactory>,
) -> (Vec<(DocId, f64)>, Estimates) {
    let mut submatch = SubMatch::new(
        db.clone(),
        query.clone(),
        query.subquery_count(),
        factory,
        0,
    );
    let mut stats = Stats::default();
    submatch
        .prepare_match(&RSet::new(), &mut stats)
        .expect("stats accumulation failed");
    submatch.start_match(Arc::new(stats));
    let tree = TreeHandle::new();
    let mut total_subqs = 0;
    let mut root = submatch
        .get_postlist(&tree, &mut total_subqs)
        .expect("failed to build postlist tree");
    let mut max_weight = root.recalc_max_weight();
    let mut out = Vec::new();
    let mut last_did = 0;
    loop {
        if let Some(replacement) = root.next(w_min).expect("next failed") {
            root = replacement;
        }
        if tree.take_recalc() {
            max_weight = root.recalc_max_weight();
        }
        if root.at_end() {
            break;
        }
        let did = root.doc_id();
        assert!(
            did > last_did,
            "docids must be strictly ascending: {} after {}",
            did,
            last_did
        );
        last_did = did;
        let weight = root.weight(db.doc_length(did), db.doc_unique_terms(did), 0);
        assert!(
            weight <= max_weight + 1e-9,
            "weight {} exceeds bound {} for {}",
            weight,
            max_weight,
            root.get_description()
        );
        out.push((did, weight));
    }
    (out, submatch.resolve())
}

fn arb_token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_string()),
        Just("b".to_string()),
        Just("c".to_string()),
        Just("d".to_string()),
        Just("e".to_string()),
    ]
}

fn arb_corpus() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec(arb_token(), 0..12), 1..16)
}

fn arb_phrase_terms() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_token(), 2..4)
}

fn arb_query() -> impl Strategy<Value = Query> {
    let leaf = prop_oneof![
        (arb_token(), 1..4u64).prop_map(|(term, wqf)| Query::Term { term, wqf }),
        arb_phrase_terms().prop_map(|terms| Query::ExactPhrase { terms }),
        (arb_phrase_terms(), 0..3u64).prop_map(|(terms, extra)| {
            let window = terms.len() as u64 + extra;
            Query::Phrase { terms, window }
        }),
        (arb_phrase_terms(), 0..3u64).prop_map(|(terms, extra)| {
            let window = terms.len() as u64 + extra;
            Query::Near { terms, window }
        }),
        (arb_token(), arb_token()).prop_map(|(x, y)| {
            let (begin, end) = if x <= y { (x, y) } else { (y, x) };
            Query::ValueRange {
                slot: 0,
                begin: begin.into_bytes(),
                end: end.into_bytes(),
                est: 1,
            }
        }),
    ];
    leaf.prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(Query::And),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Query::Or),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Query::Xor),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Query::Max),
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| Query::AndNot(Box::new(l), Box::new(r))),
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| Query::AndMaybe(Box::new(l), Box::new(r))),
            prop::collection::vec(inner, 2..4).prop_map(|subqueries| Query::Synonym {
                subqueries,
                wdf_disjoint: false,
            }),
        ]
    })
}

proptest! {

    #[test]
    fn matches_agree_with_naive_evaluation(
        corpus in arb_corpus(),
        query in arb_query(),
    ) {
        let db = Arc::new(index(&corpus));
        let (matched, estimates) = drive(&db, &query, 0.0, Arc::new(BoolWeight));
        let docids: Vec<DocId> = matched.iter().map(|(did, _)| *did).collect();
        prop_assert_eq!(&docids, &naive_matches(&query, &corpus));

        prop_assert!(estimates.lower <= estimates.est);
        prop_assert!(estimates.est <= estimates.upper);
        prop_assert!(estimates.lower <= docids.len() as u64);
        prop_assert!(docids.len() as u64 <= estimates.upper);
    }

    #[test]
    fn pruned_run_keeps_every_doc_clearing_the_threshold(
        corpus in arb_corpus(),
        query in arb_query(),
    ) {
        let db = Arc::new(index(&corpus));
        let factory: Arc<dyn WeightFactory> = Arc::new(CoordWeight::default());
        let (full, _) = drive(&db, &query, 0.0, factory.clone());
        prop_assume!(!full.is_empty());

        let top = full.iter().map(|(_, w)| *w).fold(0.0, f64::max);
        let threshold = top / 2.0;
        let (pruned, _) = drive(&db, &query, threshold, factory);

        let full_ids: Vec<DocId> = full.iter().map(|(did, _)| *did).collect();
        for (did, _) in &pruned {
            prop_assert!(full_ids.contains(did), "doc {} not matched at w_min 0", did);
        }
        for (did, weight) in &full {
            if *weight >= threshold {
                prop_assert!(
                    pruned.iter().any(|(d, _)| d == did),
                    "doc {} with weight {} missing above threshold {}",
                    did, weight, threshold
                );
            }
        }
    }
}

#[test]
fn shards_match_independently_in_parallel() {
    let corpus_a: Vec<Vec<String>> = vec![
        vec!["a".into(), "b".into(), "c".into()],
        vec!["a".into(), "c".into()],
    ];
    let corpus_b: Vec<Vec<String>> = vec![
        vec!["b".into(), "a".into(), "b".into()],
        vec!["c".into()],
        vec!["a".into(), "b".into()],
    ];
    let query = Query::And(vec![Query::term("a"), Query::term("b")]);

    let db_a = Arc::new(index(&corpus_a));
    let db_b = Arc::new(index(&corpus_b));
    let factory: Arc<dyn WeightFactory> = Arc::new(BoolWeight);
    let (seq_a, _) = drive(&db_a, &query, 0.0, factory.clone());
    let (seq_b, _) = drive(&db_b, &query, 0.0, factory.clone());

    let factory_a = factory.clone();
    let factory_b = factory;
    let (par_a, par_b) = rayon::join(
        || drive(&db_a, &query, 0.0, factory_a).0,
        || drive(&db_b, &query, 0.0, factory_b).0,
    );
    assert_eq!(par_a, seq_a);
    assert_eq!(par_b, seq_b);
}

#[test]
fn phrase_search_over_tokenized_sentences() {
    let sentences = [
        "The quick brown fox jumps over the lazy dog",
        "A lazy brown dog sleeps",
        "The fox is quick and brown",
        "Quick the brown fox",
    ];
    let corpus: Vec<Vec<String>> = sentences
        .iter()
        .map(|s| {
            s.split_word_bounds()
                .filter(|token| !token.trim().is_empty())
                .map(|token| token.to_lowercase())
                .collect()
        })
        .collect();
    let db = Arc::new(index(&corpus));

    let query = Query::ExactPhrase {
        terms: vec!["quick".into(), "brown".into(), "fox".into()],
    };
    let (matched, _) = drive(&db, &query, 0.0, Arc::new(BoolWeight));
    let docids: Vec<DocId> = matched.iter().map(|(did, _)| *did).collect();
    assert_eq!(docids, vec![1]);

    let query = Query::Near {
        terms: vec!["fox".into(), "quick".into()],
        window: 3,
    };
    let (matched, _) = drive(&db, &query, 0.0, Arc::new(BoolWeight));
    let docids: Vec<DocId> = matched.iter().map(|(did, _)| *did).collect();
    // Doc 4 has "quick" and "fox" exactly three positions apart, which a
    // window of three does not cover.
    assert_eq!(docids, vec![1, 3]);
}

#[test]
fn decider_counts_feed_the_estimates() {
    let corpus: Vec<Vec<String>> = (0..8).map(|_| vec!["a".to_string()]).collect();
    let db = Arc::new(index(&corpus));
    let query = Query::term("a");
    let mut submatch = SubMatch::new(db, query, 1, Arc::new(BoolWeight), 0);
    submatch.set_decider(Arc::new(|did: DocId| did % 2 == 0));
    let mut stats = Stats::default();
    submatch.prepare_match(&RSet::new(), &mut stats).unwrap();
    submatch.start_match(Arc::new(stats));
    let tree = TreeHandle::new();
    let mut subqs = 0;
    let mut root = submatch.get_postlist(&tree, &mut subqs).unwrap();
    let mut count = 0;
    loop {
        if let Some(replacement) = root.next(0.0).unwrap() {
            root = replacement;
        }
        if root.at_end() {
            break;
        }
        count += 1;
    }
    assert_eq!(count, 4);
    drop(root);
    let estimates = submatch.resolve();
    assert_eq!(estimates.lower, 4);
    assert_eq!(estimates.upper, 4);
    assert_eq!(estimates.est, 4);
}
