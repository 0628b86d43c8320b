use std::sync::Arc;

use log::debug;

use crate::backend::Database;
use crate::error::Error;
use crate::estimate::{resolve, EstimateOp, EstimateType, Estimates};
use crate::intersect::{AndMaybePostList, AndNotPostList, AndPostList};
use crate::leaf::{LazyWeightPostList, WeightedPostList};
use crate::phrase::{ExactPhrasePostList, NearPostList, PhrasePostList};
use crate::postlist::{DocCount, ExhaustedPostList, PostList, TermCount, TermPos, TreeHandle};
use crate::query::Query;
use crate::select::{DeciderPostList, DocDecider, SelectCounters};
use crate::stats::{RSet, Stats};
use crate::union::{MaxPostList, OrPostList, SynonymPostList, XorPostList};
use crate::value_range::ValueRangePostList;
use crate::weight::WeightFactory;

/// Per-shard match coordinator.
///
/// Builds the posting list tree for its shard, collates weighting
/// statistics, and keeps the deferred estimate stack that `resolve` turns
/// into matching-document estimates once the match has run.
pub struct SubMatch {
    db: Arc<dyn Database>,
    query: Query,
    query_length: TermCount,
    wt_factory: Arc<dyn WeightFactory>,
    shard_index: usize,
    total_stats: Option<Arc<Stats>>,
    decider: Option<Arc<dyn DocDecider>>,
    estimate_stack: Vec<EstimateOp>,
}

impl SubMatch {
    pub fn new(
        db: Arc<dyn Database>,
        query: Query,
        query_length: TermCount,
        wt_factory: Arc<dyn WeightFactory>,
        shard_index: usize,
    ) -> SubMatch {
        SubMatch {
            db,
            query,
            query_length,
            wt_factory,
            shard_index,
            total_stats: None,
            decider: None,
            estimate_stack: Vec::new(),
        }
    }

    /// Apply an external document filter around the whole tree.
    pub fn set_decider(&mut self, decider: Arc<dyn DocDecider>) {
        self.decider = Some(decider);
    }

    /// Accumulate this shard's contribution into the shared statistics.
    /// Must complete on every shard before any `start_match`.
    pub fn prepare_match(&self, rset: &RSet, stats: &mut Stats) -> Result<(), Error> {
        for term in self.query.terms() {
            stats.termfreqs.entry(term).or_default();
        }
        stats.accumulate_stats(self.db.as_ref(), rset)
    }

    /// Install the finalised cross-shard statistics.
    pub fn start_match(&mut self, total_stats: Arc<Stats>) {
        self.total_stats = Some(total_stats);
    }

    /// Build the posting list tree for this shard. Pushes one estimate op
    /// per node in post-order, so the stack is a postfix rendering of the
    /// tree; `total_subqs` receives the number of leaf subqueries.
    pub fn get_postlist(
        &mut self,
        tree: &TreeHandle,
        total_subqs: &mut TermCount,
    ) -> Result<Box<dyn PostList>, Error> {
        let query = self.query.clone();
        let mut root = self.build(&query, tree, 1.0, false, total_subqs)?;
        if let Some(decider) = self.decider.clone() {
            let counters = Arc::new(SelectCounters::default());
            self.add_op(EstimateOp::select(EstimateType::Decider, counters.clone()));
            root = Box::new(DeciderPostList::new(root, decider, counters));
        }
        debug!(
            "shard {}: built postlist tree {}",
            self.shard_index,
            root.get_description()
        );
        Ok(root)
    }

    /// Resolve the deferred estimate stack. Only meaningful after the last
    /// `next`/`skip_to` on the tree this coordinator built.
    pub fn resolve(&self) -> Estimates {
        resolve(&self.estimate_stack, self.db.doc_count())
    }

    pub fn add_op(&mut self, op: EstimateOp) {
        self.estimate_stack.push(op);
    }

    /// Pop one op plus, recursively, the arity it consumed, rolling an
    /// entire subtree off the stack.
    pub fn pop_op(&mut self) {
        let mut elements_to_pop = 1;
        while elements_to_pop > 0 {
            elements_to_pop -= 1;
            if let Some(op) = self.estimate_stack.pop() {
                elements_to_pop += op.subquery_count();
            } else {
                break;
            }
        }
    }

    pub fn weight_needs_wdf(&self) -> bool {
        self.wt_factory.sum_part_needs_wdf()
    }

    fn stats(&self) -> Result<Arc<Stats>, Error> {
        self.total_stats.clone().ok_or_else(|| {
            Error::InvalidArgument("start_match must run before get_postlist".to_string())
        })
    }

    /// Open a term posting list and decorate it with its weighting scheme.
    /// Leaves under a compound wrapper (synonym) or with a zero factor get
    /// no weight of their own.
    pub fn open_post_list(
        &mut self,
        term: &str,
        wqf: TermCount,
        factor: f64,
        compound_weight: bool,
        lazy_weight: bool,
    ) -> Result<Box<dyn PostList>, Error> {
        let raw = match self.db.open_term_postlist(term)? {
            Some(raw) => raw,
            None => {
                self.add_op(EstimateOp::leaf(0));
                return Ok(Box::new(ExhaustedPostList));
            }
        };
        self.add_op(EstimateOp::leaf(raw.term_freq()));
        if compound_weight || factor == 0.0 {
            return Ok(raw);
        }
        let stats = self.stats()?;
        if lazy_weight {
            Ok(Box::new(LazyWeightPostList::new(
                raw,
                term.to_string(),
                wqf,
                factor,
                self.query_length,
                self.wt_factory.clone(),
                stats,
            )))
        } else {
            let wt = self
                .wt_factory
                .create(&stats, self.query_length, term, wqf, factor);
            Ok(Box::new(WeightedPostList::new(raw, term.to_string(), wt)))
        }
    }

    /// Wrap a union subtree as a single synthetic term.
    pub fn make_synonym_postlist(
        &mut self,
        or_pl: Box<dyn PostList>,
        factor: f64,
        wdf_disjoint: bool,
    ) -> Result<Box<dyn PostList>, Error> {
        let stats = self.stats()?;
        let wt = self
            .wt_factory
            .create(&stats, self.query_length, "", 1, factor);
        self.add_op(EstimateOp::compose(EstimateType::Synonym, 1));
        Ok(Box::new(SynonymPostList::new(or_pl, wt, wdf_disjoint)))
    }

    fn lazy_weight(&self) -> bool {
        // The first shard materialises weights eagerly so schemes fail
        // fast; later shards defer creation until their trees prove they
        // need the bounds.
        self.shard_index > 0
    }

    fn db_size(&self) -> DocCount {
        self.db.doc_count()
    }

    fn build(
        &mut self,
        query: &Query,
        tree: &TreeHandle,
        factor: f64,
        compound: bool,
        total_subqs: &mut TermCount,
    ) -> Result<Box<dyn PostList>, Error> {
        match query {
            Query::Term { term, wqf } => {
                *total_subqs += 1;
                let lazy = self.lazy_weight();
                self.open_post_list(term, *wqf, factor, compound, lazy)
            }
            Query::And(subs) => match subs.len() {
                0 => Err(Error::InvalidArgument("empty AND query".to_string())),
                1 => self.build(&subs[0], tree, factor, compound, total_subqs),
                n => {
                    let mut children = Vec::with_capacity(n);
                    for sub in subs {
                        children.push(self.build(sub, tree, factor, compound, total_subqs)?);
                    }
                    self.add_op(EstimateOp::compose(EstimateType::And, n as u32));
                    Ok(Box::new(AndPostList::new(
                        children,
                        tree.clone(),
                        self.db_size(),
                    )))
                }
            },
            Query::Or(subs) => {
                if subs.is_empty() {
                    return Err(Error::InvalidArgument("empty OR query".to_string()));
                }
                self.build_or(subs, tree, factor, compound, total_subqs)
            }
            Query::Xor(subs) => match subs.len() {
                0 => Err(Error::InvalidArgument("empty XOR query".to_string())),
                1 => self.build(&subs[0], tree, factor, compound, total_subqs),
                n => {
                    let mut children = Vec::with_capacity(n);
                    for sub in subs {
                        children.push(self.build(sub, tree, factor, compound, total_subqs)?);
                    }
                    self.add_op(EstimateOp::compose(EstimateType::Xor, n as u32));
                    Ok(Box::new(XorPostList::new(
                        children,
                        tree.clone(),
                        self.db_size(),
                    )))
                }
            },
            Query::Max(subs) => match subs.len() {
                0 => Err(Error::InvalidArgument("empty MAX query".to_string())),
                1 => self.build(&subs[0], tree, factor, compound, total_subqs),
                n => {
                    let mut children = Vec::with_capacity(n);
                    for sub in subs {
                        children.push(self.build(sub, tree, factor, compound, total_subqs)?);
                    }
                    // The doc stream is the union's; estimate it as one.
                    self.add_op(EstimateOp::compose(EstimateType::Or, n as u32));
                    Ok(Box::new(MaxPostList::new(
                        children,
                        tree.clone(),
                        self.db_size(),
                    )))
                }
            },
            Query::AndNot(l, r) => {
                let left = self.build(l, tree, factor, compound, total_subqs)?;
                // The right side only excludes; it never contributes weight.
                let right = self.build(r, tree, 0.0, compound, total_subqs)?;
                self.add_op(EstimateOp::compose(EstimateType::AndNot, 2));
                Ok(Box::new(AndNotPostList::new(left, right, self.db_size())))
            }
            Query::AndMaybe(l, r) => {
                let left = self.build(l, tree, factor, compound, total_subqs)?;
                let right = self.build(r, tree, factor, compound, total_subqs)?;
                self.add_op(EstimateOp::compose(EstimateType::AndMaybe, 2));
                Ok(Box::new(AndMaybePostList::new(left, right, tree.clone())))
            }
            Query::Synonym {
                subqueries,
                wdf_disjoint,
            } => {
                if subqueries.is_empty() {
                    return Err(Error::InvalidArgument("empty SYNONYM query".to_string()));
                }
                let before = *total_subqs;
                let or_pl = self.build_or(subqueries, tree, 0.0, true, total_subqs)?;
                *total_subqs = before + 1;
                self.make_synonym_postlist(or_pl, factor, *wdf_disjoint)
            }
            Query::ExactPhrase { terms } => {
                let src = self.build_phrase_source(terms, factor, compound, total_subqs, tree)?;
                let counters = Arc::new(SelectCounters::default());
                self.add_op(EstimateOp::select(
                    EstimateType::ExactPhrase,
                    counters.clone(),
                ));
                Ok(Box::new(ExactPhrasePostList::new(
                    src,
                    terms.len(),
                    counters,
                )))
            }
            Query::Phrase { terms, window } => {
                self.check_window(terms, *window)?;
                let src = self.build_phrase_source(terms, factor, compound, total_subqs, tree)?;
                let counters = Arc::new(SelectCounters::default());
                self.add_op(EstimateOp::select(EstimateType::Phrase, counters.clone()));
                Ok(Box::new(PhrasePostList::new(
                    src,
                    terms.len(),
                    *window,
                    counters,
                )))
            }
            Query::Near { terms, window } => {
                self.check_window(terms, *window)?;
                let src = self.build_phrase_source(terms, factor, compound, total_subqs, tree)?;
                let counters = Arc::new(SelectCounters::default());
                self.add_op(EstimateOp::select(EstimateType::Near, counters.clone()));
                Ok(Box::new(NearPostList::new(
                    src,
                    terms.len(),
                    *window,
                    counters,
                )))
            }
            Query::ValueRange {
                slot,
                begin,
                end,
                est,
            } => {
                if begin > end {
                    return Err(Error::Range(format!(
                        "value range bounds out of order for slot {}",
                        slot
                    )));
                }
                *total_subqs += 1;
                let valuelist = self.db.open_value_list(*slot)?;
                self.add_op(EstimateOp::value_range(*est));
                Ok(Box::new(ValueRangePostList::new(
                    valuelist,
                    *slot,
                    begin.clone(),
                    end.clone(),
                    *est,
                    self.db_size(),
                )))
            }
        }
    }

    /// Build a balanced binary OR tree over the subqueries.
    fn build_or(
        &mut self,
        subs: &[Query],
        tree: &TreeHandle,
        factor: f64,
        compound: bool,
        total_subqs: &mut TermCount,
    ) -> Result<Box<dyn PostList>, Error> {
        if subs.len() == 1 {
            return self.build(&subs[0], tree, factor, compound, total_subqs);
        }
        let mid = subs.len() / 2;
        let l = self.build_or(&subs[..mid], tree, factor, compound, total_subqs)?;
        let r = self.build_or(&subs[mid..], tree, factor, compound, total_subqs)?;
        self.add_op(EstimateOp::compose(EstimateType::Or, 2));
        Ok(Box::new(OrPostList::new(l, r, tree.clone(), self.db_size())))
    }

    fn check_window(&self, terms: &[String], window: TermPos) -> Result<(), Error> {
        if window < terms.len() as TermPos {
            return Err(Error::InvalidArgument(format!(
                "window {} smaller than the {} phrase terms",
                window,
                terms.len()
            )));
        }
        Ok(())
    }

    /// The intersection the positional predicates draw candidate documents
    /// and position lists from.
    fn build_phrase_source(
        &mut self,
        terms: &[String],
        factor: f64,
        compound: bool,
        total_subqs: &mut TermCount,
        tree: &TreeHandle,
    ) -> Result<AndPostList, Error> {
        if terms.len() < 2 {
            return Err(Error::InvalidArgument(
                "phrases need at least two terms".to_string(),
            ));
        }
        let mut children = Vec::with_capacity(terms.len());
        for term in terms {
            *total_subqs += 1;
            let lazy = self.lazy_weight();
            children.push(self.open_post_list(term, 1, factor, compound, lazy)?);
        }
        self.add_op(EstimateOp::compose(EstimateType::And, terms.len() as u32));
        Ok(AndPostList::new(children, tree.clone(), self.db_size()))
    }
}

#[cfg(test)]
mod tests {

    use super::SubMatch;
    use crate::estimate::{EstimateOp, EstimateType};
    use crate::mem::MemDatabaseBuilder;
    use crate::query::Query;
    use crate::weight::BoolWeight;
    use std::sync::Arc;

    #[test]
    fn pop_op_rolls_back_whole_subtrees() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![0])], vec![]);
        let db = Arc::new(builder.build().unwrap());
        let mut submatch = SubMatch::new(db, Query::term("a"), 1, Arc::new(BoolWeight), 0);
        submatch.add_op(EstimateOp::leaf(3));
        submatch.add_op(EstimateOp::leaf(5));
        submatch.add_op(EstimateOp::compose(EstimateType::Or, 2));
        submatch.add_op(EstimateOp::leaf(2));
        submatch.add_op(EstimateOp::compose(EstimateType::And, 2));
        // Popping the AND must also pop its two operands, one of which is
        // itself a two-operand OR.
        submatch.pop_op();
        assert_eq!(submatch.resolve(), crate::estimate::Estimates::default());
    }

    #[test]
    fn phrase_of_one_term_is_rejected() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![0])], vec![]);
        let db = Arc::new(builder.build().unwrap());
        let query = Query::ExactPhrase {
            terms: vec!["a".to_string()],
        };
        let mut submatch = SubMatch::new(db, query, 1, Arc::new(BoolWeight), 0);
        submatch.start_match(Arc::new(crate::stats::Stats::default()));
        let tree = crate::postlist::TreeHandle::new();
        let mut subqs = 0;
        assert!(submatch.get_postlist(&tree, &mut subqs).is_err());
    }
}
