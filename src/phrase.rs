use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::error::Error;
use crate::intersect::AndPostList;
use crate::position::PositionList;
use crate::postlist::{DocCount, DocId, PostList, TermCount, TermFreqs, TermPos, Wdf};
use crate::select::SelectCounters;
use crate::stats::Stats;

/// Accepts a document iff the N terms occur at consecutive positions in
/// phrase order. Documents are supplied by the underlying intersection;
/// `test_doc` verifies the positional constraint, opening position lists
/// lazily so terms whose positions are never consulted are never paid for.
pub struct ExactPhrasePostList {
    src: AndPostList,
    n: usize,
    /// Term indices, re-sorted by wdf for every candidate document.
    order: Vec<usize>,
    /// Open position lists; slot `i` belongs to term `order[i]`.
    poslists: Vec<Box<dyn PositionList>>,
    counters: Arc<SelectCounters>,
    tested: (DocId, bool),
}

impl ExactPhrasePostList {
    pub fn new(src: AndPostList, n: usize, counters: Arc<SelectCounters>) -> ExactPhrasePostList {
        debug_assert!(n > 1);
        ExactPhrasePostList {
            src,
            n,
            order: (0..n).collect(),
            poslists: Vec::with_capacity(n),
            counters,
            tested: (0, false),
        }
    }

    fn open_position_list(&mut self, slot: usize) -> Result<(), Error> {
        debug_assert!(slot == self.poslists.len());
        let poslist = self.src.term_position_list(self.order[slot])?;
        self.poslists.push(poslist);
        Ok(())
    }

    /// `test_doc` with a one-entry memo, so a document the intersection
    /// hands us more than once is only verified (and counted) once.
    fn test_doc(&mut self) -> Result<bool, Error> {
        let did = self.src.doc_id();
        if did == self.tested.0 {
            return Ok(self.tested.1);
        }
        let ok = self.test_doc_uncached()?;
        self.tested = (did, ok);
        Ok(ok)
    }

    fn test_doc_uncached(&mut self) -> Result<bool, Error> {
        // We often don't need to read every position list, so approximate
        // shortest-list-first ordering by using the terms with the lowest
        // wdf first.
        let src = &self.src;
        self.order.sort_by_key(|&j| src.term_wdf(j));
        self.poslists.clear();

        // If the first term only occurs too close to the start of the
        // document, one position list is all we ever read.
        self.open_position_list(0)?;
        if self.poslists[0].skip_to(self.order[0] as TermPos)?.is_none() {
            self.counters.reject();
            return Ok(false);
        }

        // We'll need at least two lists now; the true lengths are known, so
        // put the genuinely shorter one first.
        self.open_position_list(1)?;
        if self.poslists[0].approx_size() > self.poslists[1].approx_size() {
            if self.poslists[1].skip_to(self.order[1] as TermPos)?.is_none() {
                self.counters.reject();
                return Ok(false);
            }
            self.poslists.swap(0, 1);
            self.order.swap(0, 1);
        }

        let mut read_hwm = 1;
        let idx0 = self.order[0] as TermPos;
        let mut base = self.poslists[0].position() - idx0;
        let mut i = 1;
        loop {
            if i > read_hwm {
                read_hwm = i;
                self.open_position_list(i)?;
            }
            let idx = self.order[i] as TermPos;
            let required = base + idx;
            if self.poslists[i].skip_to(required)?.is_none() {
                break;
            }
            let got = self.poslists[i].position();
            if got == required {
                i += 1;
                if i == self.n {
                    self.counters.accept();
                    return Ok(true);
                }
                continue;
            }
            // The phrase can't start before got - idx; move the anchor
            // there and re-run the later terms.
            if self.poslists[0].skip_to(got - idx + idx0)?.is_none() {
                break;
            }
            base = self.poslists[0].position() - idx0;
            i = 1;
        }
        self.counters.reject();
        Ok(false)
    }
}

impl PostList for ExactPhrasePostList {
    fn term_freq(&self) -> DocCount {
        // The words must occur exactly in order, so exact phrases are rarer
        // than near matches and loose phrase matches.
        (self.src.term_freq() / 4).max(1)
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        let mut freqs = self.src.term_freq_est_using_stats(stats);
        freqs.termfreq /= 4;
        freqs.reltermfreq /= 4;
        freqs
    }

    fn doc_id(&self) -> DocId {
        self.src.doc_id()
    }

    fn at_end(&self) -> bool {
        self.src.at_end()
    }

    fn wdf(&self) -> Wdf {
        // The minimum wdf of a term bounds how often the phrase can occur.
        (0..self.n).map(|j| self.src.term_wdf(j)).min().unwrap_or(0)
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.src.weight(doc_len, unique_terms, wdf_doc_max)
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.src.recalc_max_weight()
    }

    fn count_matching_subqs(&self) -> TermCount {
        self.src.count_matching_subqs()
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        loop {
            self.src.next(w_min)?;
            if self.src.at_end() || self.test_doc()? {
                return Ok(None);
            }
        }
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if did <= self.src.doc_id() {
            return Ok(None);
        }
        self.src.skip_to(did, w_min)?;
        if self.src.at_end() || self.test_doc()? {
            return Ok(None);
        }
        self.next(w_min)
    }

    fn check(
        &mut self,
        did: DocId,
        w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        let (_, valid) = self.src.check(did, w_min)?;
        if !valid {
            return Ok((None, false));
        }
        if !self.src.at_end() && self.src.doc_id() == did && !self.test_doc()? {
            return Ok((None, false));
        }
        Ok((None, true))
    }

    fn get_description(&self) -> String {
        format!("(ExactPhrase {})", self.src.get_description())
    }
}

/// Accepts a document iff the N terms occur in phrase order within a
/// window of `window` positions (`window >= N`).
pub struct PhrasePostList {
    src: AndPostList,
    n: usize,
    window: TermPos,
    poslists: Vec<Box<dyn PositionList>>,
    counters: Arc<SelectCounters>,
    tested: (DocId, bool),
}

impl PhrasePostList {
    pub fn new(
        src: AndPostList,
        n: usize,
        window: TermPos,
        counters: Arc<SelectCounters>,
    ) -> PhrasePostList {
        debug_assert!(n > 1);
        debug_assert!(window >= n as TermPos);
        PhrasePostList {
            src,
            n,
            window,
            poslists: Vec::with_capacity(n),
            counters,
            tested: (0, false),
        }
    }

    fn open_position_list(&mut self, i: usize) -> Result<(), Error> {
        debug_assert!(i == self.poslists.len());
        let poslist = self.src.term_position_list(i)?;
        self.poslists.push(poslist);
        Ok(())
    }

    fn test_doc(&mut self) -> Result<bool, Error> {
        let did = self.src.doc_id();
        if did == self.tested.0 {
            return Ok(self.tested.1);
        }
        let ok = self.test_doc_uncached()?;
        self.tested = (did, ok);
        Ok(ok)
    }

    fn test_doc_uncached(&mut self) -> Result<bool, Error> {
        self.poslists.clear();
        self.open_position_list(0)?;
        if self.poslists[0].next_pos()?.is_none() {
            self.counters.reject();
            return Ok(false);
        }

        let mut read_hwm = 0;
        loop {
            let base = self.poslists[0].position();
            let mut pos = base;
            let mut i = 0;
            let b = loop {
                i += 1;
                if i == self.n {
                    self.counters.accept();
                    return Ok(true);
                }
                if i > read_hwm {
                    read_hwm = i;
                    self.open_position_list(i)?;
                }
                if self.poslists[i].skip_to(pos + 1)?.is_none() {
                    self.counters.reject();
                    return Ok(false);
                }
                pos = self.poslists[i].position();
                let b = pos + (self.n - i) as TermPos;
                if b - base > self.window {
                    break b;
                }
            };
            // Advance the window start to the first position it could
            // match in, given where term i landed.
            if self.poslists[0].skip_to(b - self.window)?.is_none() {
                self.counters.reject();
                return Ok(false);
            }
        }
    }
}

impl PostList for PhrasePostList {
    fn term_freq(&self) -> DocCount {
        // Usually the phrase occurs significantly less often than the
        // individual terms.
        (self.src.term_freq() / 3).max(1)
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        let mut freqs = self.src.term_freq_est_using_stats(stats);
        freqs.termfreq /= 3;
        freqs.reltermfreq /= 3;
        freqs
    }

    fn doc_id(&self) -> DocId {
        self.src.doc_id()
    }

    fn at_end(&self) -> bool {
        self.src.at_end()
    }

    fn wdf(&self) -> Wdf {
        (0..self.n).map(|j| self.src.term_wdf(j)).min().unwrap_or(0)
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.src.weight(doc_len, unique_terms, wdf_doc_max)
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.src.recalc_max_weight()
    }

    fn count_matching_subqs(&self) -> TermCount {
        self.src.count_matching_subqs()
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        loop {
            self.src.next(w_min)?;
            if self.src.at_end() || self.test_doc()? {
                return Ok(None);
            }
        }
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if did <= self.src.doc_id() {
            return Ok(None);
        }
        self.src.skip_to(did, w_min)?;
        if self.src.at_end() || self.test_doc()? {
            return Ok(None);
        }
        self.next(w_min)
    }

    fn check(
        &mut self,
        did: DocId,
        w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        let (_, valid) = self.src.check(did, w_min)?;
        if !valid {
            return Ok((None, false));
        }
        if !self.src.at_end() && self.src.doc_id() == did && !self.test_doc()? {
            return Ok((None, false));
        }
        Ok((None, true))
    }

    fn get_description(&self) -> String {
        format!("(Phrase {} {})", self.window, self.src.get_description())
    }
}

/// Accepts a document iff all N terms occur within a window of `window`
/// positions, in any order. A min-heap tracks the current position of each
/// term's stream; the minimum is advanced until the spread fits.
pub struct NearPostList {
    src: AndPostList,
    n: usize,
    window: TermPos,
    poslists: Vec<Box<dyn PositionList>>,
    counters: Arc<SelectCounters>,
    tested: (DocId, bool),
}

impl NearPostList {
    pub fn new(
        src: AndPostList,
        n: usize,
        window: TermPos,
        counters: Arc<SelectCounters>,
    ) -> NearPostList {
        debug_assert!(n > 1);
        debug_assert!(window >= n as TermPos);
        NearPostList {
            src,
            n,
            window,
            poslists: Vec::with_capacity(n),
            counters,
            tested: (0, false),
        }
    }

    fn test_doc(&mut self) -> Result<bool, Error> {
        let did = self.src.doc_id();
        if did == self.tested.0 {
            return Ok(self.tested.1);
        }
        let ok = self.test_doc_uncached()?;
        self.tested = (did, ok);
        Ok(ok)
    }

    fn test_doc_uncached(&mut self) -> Result<bool, Error> {
        self.poslists.clear();
        let mut heap = BinaryHeap::with_capacity(self.n);
        let mut max = 0;
        for i in 0..self.n {
            let mut poslist = self.src.term_position_list(i)?;
            match poslist.next_pos()? {
                Some(p) => {
                    heap.push(Reverse((p, i)));
                    max = max.max(p);
                }
                None => {
                    self.counters.reject();
                    return Ok(false);
                }
            }
            self.poslists.push(poslist);
        }
        while let Some(Reverse((min, i))) = heap.pop() {
            if max - min < self.window {
                self.counters.accept();
                return Ok(true);
            }
            // The spread is too wide; this stream can only take part in a
            // window ending at or after max.
            let target = max + 1 - self.window;
            match self.poslists[i].skip_to(target)? {
                Some(p) => {
                    heap.push(Reverse((p, i)));
                    max = max.max(p);
                }
                None => break,
            }
        }
        self.counters.reject();
        Ok(false)
    }
}

impl PostList for NearPostList {
    fn term_freq(&self) -> DocCount {
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
        // A group of terms can only occur together as often as the least
        // frequent of them occurs.
        (0..self.n).map(|j| self.src.term_wdf(j)).min().unwrap_or(0)
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.src.weight(doc_len, unique_terms, wdf_doc_max)
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.src.recalc_max_weight()
    }

    fn count_matching_subqs(&self) -> TermCount {
        self.src.count_matching_subqs()
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        loop {
            self.src.next(w_min)?;
            if self.src.at_end() || self.test_doc()? {
                return Ok(None);
            }
        }
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if did <= self.src.doc_id() {
            return Ok(None);
        }
        self.src.skip_to(did, w_min)?;
        if self.src.at_end() || self.test_doc()? {
            return Ok(None);
        }
        self.next(w_min)
    }

    fn check(
        &mut self,
        did: DocId,
        w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        let (_, valid) = self.src.check(did, w_min)?;
        if !valid {
            return Ok((None, false));
        }
        if !self.src.at_end() && self.src.doc_id() == did && !self.test_doc()? {
            return Ok((None, false));
        }
        Ok((None, true))
    }

    fn get_description(&self) -> String {
        format!("(Near {} {})", self.window, self.src.get_description())
    }
}

#[cfg(test)]
mod tests {

    use crate::mem::MemDatabaseBuilder;
    use crate::postlist::{PostList, TreeHandle};
    use crate::query::Query;
    use crate::stats::{RSet, Stats};
    use crate::submatch::SubMatch;
    use crate::weight::BoolWeight;
    use std::sync::Arc;

    fn matches(db: crate::mem::MemDatabase, query: Query) -> Vec<u64> {
        let mut submatch = SubMatch::new(Arc::new(db), query, 1, Arc::new(BoolWeight), 0);
        let mut stats = Stats::default();
        submatch.prepare_match(&RSet::new(), &mut stats).unwrap();
        submatch.start_match(Arc::new(stats));
        let tree = TreeHandle::new();
        let mut subqs = 0;
        let mut root = submatch.get_postlist(&tree, &mut subqs).unwrap();
        let mut seen = Vec::new();
        loop {
            if let Some(repl) = root.next(0.0).unwrap() {
                root = repl;
            }
            if root.at_end() {
                break;
            }
            seen.push(root.doc_id());
        }
        seen
    }

    fn exact(terms: &[&str]) -> Query {
        Query::ExactPhrase {
            terms: terms.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn phrase(terms: &[&str], window: u64) -> Query {
        Query::Phrase {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            window,
        }
    }

    fn near(terms: &[&str], window: u64) -> Query {
        Query::Near {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            window,
        }
    }

    #[test]
    fn exact_phrase_accepts_consecutive_positions() {
        // Two phrase occurrences exist: 0-1 and 5-6.
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![0, 5]), ("b", vec![1, 6])], vec![]);
        assert_eq!(matches(builder.build().unwrap(), exact(&["a", "b"])), vec![1]);
    }

    #[test]
    fn exact_phrase_rejects_gapped_positions() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![0]), ("b", vec![2])], vec![]);
        assert!(matches(builder.build().unwrap(), exact(&["a", "b"])).is_empty());
    }

    #[test]
    fn exact_phrase_requires_order() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![4]), ("b", vec![3])], vec![]);
        assert!(matches(builder.build().unwrap(), exact(&["a", "b"])).is_empty());
    }

    #[test]
    fn exact_phrase_restart_recovers_later_occurrence() {
        // The first anchor fails; the matcher must restart from b's
        // position and still find 9-10.
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![0, 9]), ("b", vec![4, 10])], vec![]);
        assert_eq!(matches(builder.build().unwrap(), exact(&["a", "b"])), vec![1]);
    }

    #[test]
    fn window_three_accepts_gap_of_two() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![0]), ("b", vec![2])], vec![]);
        assert_eq!(
            matches(builder.build().unwrap(), phrase(&["a", "b"], 3)),
            vec![1]
        );
    }

    #[test]
    fn window_two_rejects_gap_of_two() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![0]), ("b", vec![2])], vec![]);
        assert!(matches(builder.build().unwrap(), phrase(&["a", "b"], 2)).is_empty());
    }

    #[test]
    fn windowed_phrase_still_requires_order() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![5]), ("b", vec![3])], vec![]);
        assert!(matches(builder.build().unwrap(), phrase(&["a", "b"], 5)).is_empty());
    }

    #[test]
    fn near_matches_any_order() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![5]), ("b", vec![3])], vec![]);
        builder.add_doc(2, vec![("a", vec![9]), ("b", vec![3])], vec![]);
        assert_eq!(
            matches(builder.build().unwrap(), near(&["a", "b"], 3)),
            vec![1]
        );
    }

    #[test]
    fn near_three_terms_within_window() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(
            1,
            vec![("a", vec![10]), ("b", vec![12]), ("c", vec![11])],
            vec![],
        );
        builder.add_doc(
            2,
            vec![("a", vec![10]), ("b", vec![20]), ("c", vec![11])],
            vec![],
        );
        assert_eq!(
            matches(builder.build().unwrap(), near(&["a", "b", "c"], 3)),
            vec![1]
        );
    }

    #[test]
    fn phrase_skips_docs_missing_a_term() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("a", vec![0])], vec![]);
        builder.add_doc(2, vec![("a", vec![0]), ("b", vec![1])], vec![]);
        builder.add_doc(3, vec![("b", vec![0])], vec![]);
        assert_eq!(matches(builder.build().unwrap(), exact(&["a", "b"])), vec![2]);
    }

    #[test]
    fn termfreq_ratios_follow_the_contract() {
        let mut builder = MemDatabaseBuilder::new();
        for did in 1..=12 {
            builder.add_doc(did, vec![("a", vec![0]), ("b", vec![1])], vec![]);
        }
        let db = Arc::new(builder.build().unwrap());
        for (query, divisor) in vec![
            (exact(&["a", "b"]), 4),
            (phrase(&["a", "b"], 4), 3),
            (near(&["a", "b"], 4), 2),
        ] {
            let mut submatch =
                SubMatch::new(db.clone(), query, 1, Arc::new(BoolWeight), 0);
            submatch.start_match(Arc::new(Stats::default()));
            let tree = TreeHandle::new();
            let mut subqs = 0;
            let root = submatch.get_postlist(&tree, &mut subqs).unwrap();
            // The underlying AND estimates 12 matching docs.
            assert_eq!(root.term_freq(), 12 / divisor);
            assert_eq!(subqs, 2);
        }
    }
}
