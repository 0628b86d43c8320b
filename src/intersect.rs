use crate::error::Error;
use crate::position::PositionList;
use crate::postlist::{
    check_child, next_child, skip_child, take_child, DocCount, DocId, PostList, TermCount,
    TermFreqs, TreeHandle, Wdf,
};
use crate::stats::Stats;

/// N-way intersection. The rarest child leads; the others are advanced with
/// `check`, preferring cheap membership tests over full seeks.
pub struct AndPostList {
    did: DocId,
    finished: bool,
    plists: Vec<Box<dyn PostList>>,
    /// For each entry of `plists`, the index the child had before the
    /// frequency sort. Phrase nodes address term children by that index.
    origin: Vec<usize>,
    max_wts: Vec<f64>,
    max_total: f64,
    db_size: DocCount,
    tree: TreeHandle,
}

impl AndPostList {
    pub fn new(
        plists: Vec<Box<dyn PostList>>,
        tree: TreeHandle,
        db_size: DocCount,
    ) -> AndPostList {
        debug_assert!(plists.len() >= 2);
        debug_assert!(db_size > 0);
        let mut indexed: Vec<(usize, Box<dyn PostList>)> = plists.into_iter().enumerate().collect();
        indexed.sort_by_key(|(_, pl)| pl.term_freq());
        let mut origin = Vec::with_capacity(indexed.len());
        let mut plists = Vec::with_capacity(indexed.len());
        for (i, pl) in indexed {
            origin.push(i);
            plists.push(pl);
        }
        let mut and = AndPostList {
            did: 0,
            finished: false,
            plists,
            origin,
            max_wts: Vec::new(),
            max_total: 0.0,
            db_size,
            tree,
        };
        and.refresh_max_weights();
        and
    }

    /// Wdf of the child that was at `orig` before the frequency sort.
    pub(crate) fn term_wdf(&self, orig: usize) -> Wdf {
        for (i, &o) in self.origin.iter().enumerate() {
            if o == orig {
                return self.plists[i].wdf();
            }
        }
        0
    }

    /// Position list of the child that was at `orig` before the frequency
    /// sort. Children without positional data yield an empty list.
    pub(crate) fn term_position_list(
        &mut self,
        orig: usize,
    ) -> Result<Box<dyn PositionList>, Error> {
        for (i, &o) in self.origin.iter().enumerate() {
            if o == orig {
                return match self.plists[i].read_position_list()? {
                    Some(poslist) => Ok(poslist),
                    None => Ok(Box::new(crate::position::VecPositionList::new(Vec::new()))),
                };
            }
        }
        Ok(Box::new(crate::position::VecPositionList::new(Vec::new())))
    }

    fn refresh_max_weights(&mut self) {
        self.max_wts.clear();
        let mut total = 0.0;
        for pl in self.plists.iter_mut() {
            let w = pl.recalc_max_weight();
            self.max_wts.push(w);
            total += w;
        }
        self.max_total = total;
    }

    /// The threshold child `i` alone has to beat: the rest of the
    /// intersection can contribute at most the sum of the other bounds.
    fn child_w_min(&self, i: usize, w_min: f64) -> f64 {
        w_min - (self.max_total - self.max_wts[i])
    }

    fn find_next_match(&mut self, w_min: f64) -> Result<(), Error> {
        'restart: loop {
            if self.plists[0].at_end() {
                self.did = 0;
                self.finished = true;
                return Ok(());
            }
            let candidate = self.plists[0].doc_id();
            for i in 1..self.plists.len() {
                let child_w_min = self.child_w_min(i, w_min);
                let valid = check_child(&mut self.plists[i], candidate, child_w_min)?;
                if !valid {
                    let leader_w_min = self.child_w_min(0, w_min);
                    skip_child(&mut self.plists[0], candidate + 1, leader_w_min)?;
                    continue 'restart;
                }
                if self.plists[i].at_end() {
                    self.did = 0;
                    self.finished = true;
                    return Ok(());
                }
                let got = self.plists[i].doc_id();
                if got > candidate {
                    let leader_w_min = self.child_w_min(0, w_min);
                    skip_child(&mut self.plists[0], got, leader_w_min)?;
                    continue 'restart;
                }
            }
            self.did = candidate;
            return Ok(());
        }
    }
}

impl PostList for AndPostList {
    fn term_freq(&self) -> DocCount {
        // Assume independence: scale the collection size by each child's
        // selectivity.
        let mut est = self.db_size as f64;
        for pl in &self.plists {
            est = est * pl.term_freq() as f64 / self.db_size as f64;
        }
        (est as DocCount).max(1)
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        let mut freqs = TermFreqs::new(self.db_size, stats.rset_size, TermCount::max_value());
        for pl in &self.plists {
            let child = pl.term_freq_est_using_stats(stats);
            freqs.termfreq =
                (freqs.termfreq as f64 * child.termfreq as f64 / self.db_size as f64) as DocCount;
            if stats.rset_size > 0 {
                freqs.reltermfreq = (freqs.reltermfreq as f64 * child.reltermfreq as f64
                    / stats.rset_size as f64) as DocCount;
            }
            freqs.collfreq = freqs.collfreq.min(child.collfreq);
        }
        freqs
    }

    fn doc_id(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.finished
    }

    fn wdf(&self) -> Wdf {
        self.plists.iter().map(|pl| pl.wdf()).sum()
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.plists
            .iter()
            .map(|pl| pl.weight(doc_len, unique_terms, wdf_doc_max))
            .sum()
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.refresh_max_weights();
        self.max_total
    }

    fn read_position_list(&mut self) -> Result<Option<Box<dyn PositionList>>, Error> {
        Ok(None)
    }

    fn count_matching_subqs(&self) -> TermCount {
        self.plists.iter().map(|pl| pl.count_matching_subqs()).sum()
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished {
            return Ok(None);
        }
        if w_min > self.max_total {
            // Even a full intersection cannot reach the threshold.
            log::trace!("and: pruned by w_min {} > {}", w_min, self.max_total);
            self.did = 0;
            self.finished = true;
            return Ok(None);
        }
        let leader_w_min = self.child_w_min(0, w_min);
        next_child(&mut self.plists[0], leader_w_min)?;
        self.find_next_match(w_min)?;
        Ok(None)
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished || did <= self.did {
            return Ok(None);
        }
        if w_min > self.max_total {
            self.did = 0;
            self.finished = true;
            return Ok(None);
        }
        let leader_w_min = self.child_w_min(0, w_min);
        skip_child(&mut self.plists[0], did, leader_w_min)?;
        self.find_next_match(w_min)?;
        Ok(None)
    }

    fn check(
        &mut self,
        did: DocId,
        w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        if self.finished {
            return Ok((None, true));
        }
        if did <= self.did {
            return Ok((None, true));
        }
        for i in 0..self.plists.len() {
            let child_w_min = self.child_w_min(i, w_min);
            let valid = check_child(&mut self.plists[i], did, child_w_min)?;
            if !valid {
                return Ok((None, false));
            }
            if self.plists[i].at_end() {
                self.did = 0;
                self.finished = true;
                return Ok((None, true));
            }
            if self.plists[i].doc_id() != did {
                return Ok((None, false));
            }
        }
        self.did = did;
        Ok((None, true))
    }

    fn get_description(&self) -> String {
        let kids: Vec<String> = self.plists.iter().map(|pl| pl.get_description()).collect();
        format!("(And {})", kids.join(" "))
    }
}

/// Docids from the left stream minus docids from the right stream. Only the
/// left side contributes weight.
pub struct AndNotPostList {
    did: DocId,
    finished: bool,
    l: Box<dyn PostList>,
    r: Box<dyn PostList>,
    db_size: DocCount,
}

impl AndNotPostList {
    pub fn new(l: Box<dyn PostList>, r: Box<dyn PostList>, db_size: DocCount) -> AndNotPostList {
        AndNotPostList {
            did: 0,
            finished: false,
            l,
            r,
            db_size,
        }
    }

    fn find_next_match(&mut self, w_min: f64) -> Result<(), Error> {
        loop {
            if self.l.at_end() {
                self.did = 0;
                self.finished = true;
                return Ok(());
            }
            let candidate = self.l.doc_id();
            if !self.r.at_end() {
                skip_child(&mut self.r, candidate, 0.0)?;
            }
            if !self.r.at_end() && self.r.doc_id() == candidate {
                next_child(&mut self.l, w_min)?;
                continue;
            }
            self.did = candidate;
            return Ok(());
        }
    }
}

impl PostList for AndNotPostList {
    fn term_freq(&self) -> DocCount {
        let keep = 1.0 - self.r.term_freq() as f64 / self.db_size as f64;
        ((self.l.term_freq() as f64 * keep) as DocCount).max(1)
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        let mut freqs = self.l.term_freq_est_using_stats(stats);
        let rfreqs = self.r.term_freq_est_using_stats(stats);
        let keep = 1.0 - rfreqs.termfreq as f64 / self.db_size as f64;
        freqs.termfreq = (freqs.termfreq as f64 * keep) as DocCount;
        freqs.reltermfreq = freqs.reltermfreq.saturating_sub(rfreqs.reltermfreq);
        freqs
    }

    fn doc_id(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.finished
    }

    fn wdf(&self) -> Wdf {
        self.l.wdf()
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.l.weight(doc_len, unique_terms, wdf_doc_max)
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.l.recalc_max_weight()
    }

    fn count_matching_subqs(&self) -> TermCount {
        self.l.count_matching_subqs()
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished {
            return Ok(None);
        }
        next_child(&mut self.l, w_min)?;
        self.find_next_match(w_min)?;
        Ok(None)
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished || did <= self.did {
            return Ok(None);
        }
        skip_child(&mut self.l, did, w_min)?;
        self.find_next_match(w_min)?;
        Ok(None)
    }

    fn get_description(&self) -> String {
        format!(
            "(AndNot {} {})",
            self.l.get_description(),
            self.r.get_description()
        )
    }
}

/// The left stream drives docids and always contributes weight; the right
/// stream adds weight when it matches too, but never excludes a document.
pub struct AndMaybePostList {
    did: DocId,
    finished: bool,
    l: Box<dyn PostList>,
    r: Box<dyn PostList>,
    /// Cached bound on the right side's contribution. The left side only
    /// has to clear `w_min` minus this on its own.
    rmax: f64,
    tree: TreeHandle,
}

impl AndMaybePostList {
    pub fn new(
        l: Box<dyn PostList>,
        mut r: Box<dyn PostList>,
        tree: TreeHandle,
    ) -> AndMaybePostList {
        let rmax = r.recalc_max_weight();
        AndMaybePostList {
            did: 0,
            finished: false,
            l,
            r,
            rmax,
            tree,
        }
    }

    /// Build an already-positioned node from the children of a decayed OR.
    pub(crate) fn from_parts(
        l: Box<dyn PostList>,
        mut r: Box<dyn PostList>,
        did: DocId,
        tree: TreeHandle,
    ) -> AndMaybePostList {
        let rmax = r.recalc_max_weight();
        AndMaybePostList {
            did,
            finished: false,
            l,
            r,
            rmax,
            tree,
        }
    }

    fn r_matches(&self) -> bool {
        !self.r.at_end() && self.r.doc_id() == self.did
    }

    fn sync_rhs(&mut self) -> Result<(), Error> {
        if self.l.at_end() {
            self.did = 0;
            self.finished = true;
            return Ok(());
        }
        self.did = self.l.doc_id();
        if !self.r.at_end() && self.r.doc_id() < self.did {
            skip_child(&mut self.r, self.did, 0.0)?;
        }
        Ok(())
    }
}

impl PostList for AndMaybePostList {
    fn term_freq(&self) -> DocCount {
        self.l.term_freq()
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        self.l.term_freq_est_using_stats(stats)
    }

    fn doc_id(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.finished
    }

    fn wdf(&self) -> Wdf {
        let mut wdf = self.l.wdf();
        if self.r_matches() {
            wdf += self.r.wdf();
        }
        wdf
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        let mut wt = self.l.weight(doc_len, unique_terms, wdf_doc_max);
        if self.r_matches() {
            wt += self.r.weight(doc_len, unique_terms, wdf_doc_max);
        }
        wt
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.rmax = self.r.recalc_max_weight();
        self.l.recalc_max_weight() + self.rmax
    }

    fn count_matching_subqs(&self) -> TermCount {
        let mut n = self.l.count_matching_subqs();
        if self.r_matches() {
            n += self.r.count_matching_subqs();
        }
        n
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished {
            return Ok(None);
        }
        next_child(&mut self.l, w_min - self.rmax)?;
        if self.r.at_end() {
            // The right side can never contribute again; shed it.
            self.tree.force_recalc();
            let l = take_child(&mut self.l);
            return Ok(Some(l));
        }
        self.sync_rhs()?;
        Ok(None)
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished || did <= self.did {
            return Ok(None);
        }
        skip_child(&mut self.l, did, w_min - self.rmax)?;
        if self.r.at_end() {
            self.tree.force_recalc();
            let l = take_child(&mut self.l);
            return Ok(Some(l));
        }
        self.sync_rhs()?;
        Ok(None)
    }

    fn get_description(&self) -> String {
        format!(
            "(AndMaybe {} {})",
            self.l.get_description(),
            self.r.get_description()
        )
    }
}
