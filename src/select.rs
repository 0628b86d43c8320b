use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::Error;
use crate::position::PositionList;
use crate::postlist::{next_child, skip_child, DocCount, DocId, PostList, TermCount, TermFreqs, Wdf};
use crate::stats::Stats;

/// Accept/reject counters filled in by a selecting node during the match
/// and read by the estimate resolver afterwards.
#[derive(Debug, Default)]
pub struct SelectCounters {
    accepted: AtomicU32,
    rejected: AtomicU32,
}

impl SelectCounters {
    pub fn accept(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> (u32, u32) {
        (
            self.accepted.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }
}

/// External per-document predicate applied as a match filter.
pub trait DocDecider: Send + Sync {
    fn test(&self, did: DocId) -> bool;
}

impl<F> DocDecider for F
where
    F: Fn(DocId) -> bool + Send + Sync,
{
    fn test(&self, did: DocId) -> bool {
        self(did)
    }
}

/// Pass-through node that drops documents its decider rejects, keeping
/// accept/reject counts for the estimate resolver.
pub struct DeciderPostList {
    src: Box<dyn PostList>,
    decider: Arc<dyn DocDecider>,
    counters: Arc<SelectCounters>,
    tested: (DocId, bool),
}

impl DeciderPostList {
    pub fn new(
        src: Box<dyn PostList>,
        decider: Arc<dyn DocDecider>,
        counters: Arc<SelectCounters>,
    ) -> DeciderPostList {
        DeciderPostList {
            src,
            decider,
            counters,
            tested: (0, false),
        }
    }

    /// Each document is only tested (and counted) once, however often the
    /// driver asks about it.
    fn test_doc(&mut self) -> bool {
        let did = self.src.doc_id();
        if did == self.tested.0 {
            return self.tested.1;
        }
        let ok = self.decider.test(did);
        if ok {
            self.counters.accept();
        } else {
            self.counters.reject();
        }
        self.tested = (did, ok);
        ok
    }
}

impl PostList for DeciderPostList {
    fn term_freq(&self) -> DocCount {
        // The filter passes some unknown fraction; assume half.
        (self.src.term_freq() / 2).max(1)
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        let mut freqs = self.src.term_freq_est_using_stats(stats);
        freqs.termfreq /= 2;
        freqs.reltermfreq /= 2;
        freqs
    }

    fn doc_id(&self) -> DocId {
        self.src.doc_id()
    }

    fn at_end(&self) -> bool {
        self.src.at_end()
    }

    fn wdf(&self) -> Wdf {
        self.src.wdf()
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.src.weight(doc_len, unique_terms, wdf_doc_max)
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.src.recalc_max_weight()
    }

    fn read_position_list(&mut self) -> Result<Option<Box<dyn PositionList>>, Error> {
        self.src.read_position_list()
    }

    fn count_matching_subqs(&self) -> TermCount {
        self.src.count_matching_subqs()
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        loop {
            next_child(&mut self.src, w_min)?;
            if self.src.at_end() || self.test_doc() {
                return Ok(None);
            }
        }
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if did <= self.src.doc_id() {
            return Ok(None);
        }
        skip_child(&mut self.src, did, w_min)?;
        if self.src.at_end() || self.test_doc() {
            return Ok(None);
        }
        self.next(w_min)
    }

    fn check(
        &mut self,
        did: DocId,
        w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        let valid = crate::postlist::check_child(&mut self.src, did, w_min)?;
        if !valid {
            return Ok((None, false));
        }
        if !self.src.at_end() && self.src.doc_id() == did && !self.test_doc() {
            return Ok((None, false));
        }
        Ok((None, true))
    }

    fn get_description(&self) -> String {
        format!("(Decider {})", self.src.get_description())
    }
}

#[cfg(test)]
mod tests {

    use super::{DeciderPostList, SelectCounters};
    use crate::backend::Database;
    use crate::mem::MemDatabaseBuilder;
    use crate::postlist::next_child;
    use std::sync::Arc;

    #[test]
    fn decider_filters_and_counts() {
        let mut builder = MemDatabaseBuilder::new();
        for did in 1..=6 {
            builder.add_doc(did, vec![("tea", vec![0])], vec![]);
        }
        let db = builder.build().unwrap();
        let src = db.open_term_postlist("tea").unwrap().unwrap();
        let counters = Arc::new(SelectCounters::default());
        let even = Arc::new(|did: u64| did % 2 == 0);
        let mut pl: Box<dyn crate::postlist::PostList> =
            Box::new(DeciderPostList::new(src, even, counters.clone()));

        let mut seen = Vec::new();
        loop {
            next_child(&mut pl, 0.0).unwrap();
            if pl.at_end() {
                break;
            }
            seen.push(pl.doc_id());
        }
        assert_eq!(seen, vec![2, 4, 6]);
        assert_eq!(counters.counts(), (3, 3));
    }
}
