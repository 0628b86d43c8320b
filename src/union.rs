use crate::error::Error;
use crate::intersect::{AndMaybePostList, AndPostList};
use crate::postlist::{
    next_child, skip_child, take_child, DocCount, DocId, PostList, TermCount, TermFreqs,
    TreeHandle, Wdf,
};
use crate::stats::Stats;
use crate::weight::Weight;

/// Binary union with weight = sum of the matching sides.
///
/// Once the minimum-weight threshold rises past what one side can provide
/// alone, the node rewrites itself: documents matching only the weak side
/// can no longer qualify, so the union decays to AND-MAYBE (or to a full
/// intersection when neither side can reach the threshold alone). When a
/// side is exhausted the node replaces itself with the other side.
pub struct OrPostList {
    did: DocId,
    finished: bool,
    l: Box<dyn PostList>,
    r: Box<dyn PostList>,
    lmax: f64,
    rmax: f64,
    db_size: DocCount,
    tree: TreeHandle,
}

impl OrPostList {
    pub fn new(
        mut l: Box<dyn PostList>,
        mut r: Box<dyn PostList>,
        tree: TreeHandle,
        db_size: DocCount,
    ) -> OrPostList {
        debug_assert!(db_size > 0);
        let lmax = l.recalc_max_weight();
        let rmax = r.recalc_max_weight();
        OrPostList {
            did: 0,
            finished: false,
            l,
            r,
            lmax,
            rmax,
            db_size,
            tree,
        }
    }

    fn l_matches(&self) -> bool {
        !self.l.at_end() && self.l.doc_id() == self.did
    }

    fn r_matches(&self) -> bool {
        !self.r.at_end() && self.r.doc_id() == self.did
    }

    /// Rewrite this union now that `w_min` exceeds what at least one side
    /// can provide alone. Returns the replacement, positioned at the next
    /// match after the current docid; `None` means the stream is done.
    fn decay(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        self.tree.force_recalc();
        if w_min > self.lmax && w_min > self.rmax {
            if w_min > self.lmax + self.rmax {
                log::trace!("or: nothing can reach w_min {}", w_min);
                self.finished = true;
                self.did = 0;
                return Ok(None);
            }
            // Only documents matching both sides can qualify.
            log::trace!("or: decaying to and");
            let old_did = self.did;
            let l = take_child(&mut self.l);
            let r = take_child(&mut self.r);
            self.finished = true;
            self.did = 0;
            let mut repl: Box<dyn PostList> =
                Box::new(AndPostList::new(vec![l, r], self.tree.clone(), self.db_size));
            skip_child(&mut repl, old_did + 1, w_min)?;
            return Ok(Some(repl));
        }

        // One side still clears the bar; it drives, the other only adds
        // weight.
        let drive_l = w_min <= self.lmax;
        log::trace!(
            "or: decaying to andmaybe driven by {}",
            if drive_l { "left" } else { "right" }
        );
        {
            let (drv, aux, aux_max) = if drive_l {
                (&mut self.l, &mut self.r, self.rmax)
            } else {
                (&mut self.r, &mut self.l, self.lmax)
            };
            if self.did == 0 || (!drv.at_end() && drv.doc_id() == self.did) {
                next_child(drv, w_min - aux_max)?;
            }
            if drv.at_end() {
                self.finished = true;
                self.did = 0;
                return Ok(None);
            }
            let new_did = drv.doc_id();
            if !aux.at_end() && aux.doc_id() < new_did {
                skip_child(aux, new_did, 0.0)?;
            }
            self.did = new_did;
        }
        let l = take_child(&mut self.l);
        let r = take_child(&mut self.r);
        let did = self.did;
        self.finished = true;
        self.did = 0;
        let am = if drive_l {
            AndMaybePostList::from_parts(l, r, did, self.tree.clone())
        } else {
            AndMaybePostList::from_parts(r, l, did, self.tree.clone())
        };
        Ok(Some(Box::new(am)))
    }

    /// Merge the two heads after an advance, handing a side up when the
    /// other is exhausted.
    fn merge_heads(&mut self) -> Result<Option<Box<dyn PostList>>, Error> {
        match (self.l.at_end(), self.r.at_end()) {
            (true, true) => {
                self.finished = true;
                self.did = 0;
                Ok(None)
            }
            (true, false) => {
                self.tree.force_recalc();
                self.finished = true;
                Ok(Some(take_child(&mut self.r)))
            }
            (false, true) => {
                self.tree.force_recalc();
                self.finished = true;
                Ok(Some(take_child(&mut self.l)))
            }
            (false, false) => {
                self.did = self.l.doc_id().min(self.r.doc_id());
                Ok(None)
            }
        }
    }
}

impl PostList for OrPostList {
    fn term_freq(&self) -> DocCount {
        let lf = self.l.term_freq() as f64;
        let rf = self.r.term_freq() as f64;
        let est = lf + rf - lf * rf / self.db_size as f64;
        (est as DocCount).min(self.db_size).max(1)
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        let lfreqs = self.l.term_freq_est_using_stats(stats);
        let rfreqs = self.r.term_freq_est_using_stats(stats);
        let union = |a: u64, b: u64, total: u64| -> u64 {
            if total == 0 {
                return 0;
            }
            let est = a as f64 + b as f64 - a as f64 * b as f64 / total as f64;
            (est as u64).min(total)
        };
        TermFreqs::new(
            union(lfreqs.termfreq, rfreqs.termfreq, self.db_size),
            union(lfreqs.reltermfreq, rfreqs.reltermfreq, stats.rset_size),
            lfreqs.collfreq + rfreqs.collfreq,
        )
    }

    fn doc_id(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.finished
    }

    fn wdf(&self) -> Wdf {
        let mut wdf = 0;
        if self.l_matches() {
            wdf += self.l.wdf();
        }
        if self.r_matches() {
            wdf += self.r.wdf();
        }
        wdf
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        let mut wt = 0.0;
        if self.l_matches() {
            wt += self.l.weight(doc_len, unique_terms, wdf_doc_max);
        }
        if self.r_matches() {
            wt += self.r.weight(doc_len, unique_terms, wdf_doc_max);
        }
        wt
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.lmax = self.l.recalc_max_weight();
        self.rmax = self.r.recalc_max_weight();
        self.lmax + self.rmax
    }

    fn count_matching_subqs(&self) -> TermCount {
        let mut n = 0;
        if self.l_matches() {
            n += self.l.count_matching_subqs();
        }
        if self.r_matches() {
            n += self.r.count_matching_subqs();
        }
        n
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished {
            return Ok(None);
        }
        if w_min > self.lmax.min(self.rmax) {
            return self.decay(w_min);
        }
        if self.did == 0 {
            next_child(&mut self.l, w_min - self.rmax)?;
            next_child(&mut self.r, w_min - self.lmax)?;
        } else {
            if self.l_matches() {
                next_child(&mut self.l, w_min - self.rmax)?;
            }
            if self.r_matches() {
                next_child(&mut self.r, w_min - self.lmax)?;
            }
        }
        self.merge_heads()
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished || did <= self.did {
            return Ok(None);
        }
        if w_min > self.lmax.min(self.rmax) {
            return match self.decay(w_min)? {
                Some(mut repl) => {
                    skip_child(&mut repl, did, w_min)?;
                    Ok(Some(repl))
                }
                None => Ok(None),
            };
        }
        if !self.l.at_end() && self.l.doc_id() < did {
            skip_child(&mut self.l, did, w_min - self.rmax)?;
        }
        if !self.r.at_end() && self.r.doc_id() < did {
            skip_child(&mut self.r, did, w_min - self.lmax)?;
        }
        self.merge_heads()
    }

    fn get_description(&self) -> String {
        format!(
            "(Or {} {})",
            self.l.get_description(),
            self.r.get_description()
        )
    }
}

/// N-way union with weight = max of the matching children.
///
/// Unlike the summing union, every child alone must clear the threshold,
/// so a child whose bound falls below `w_min` is simply erased.
pub struct MaxPostList {
    did: DocId,
    finished: bool,
    plists: Vec<Box<dyn PostList>>,
    max_wts: Vec<f64>,
    db_size: DocCount,
    tree: TreeHandle,
}

impl MaxPostList {
    pub fn new(
        mut plists: Vec<Box<dyn PostList>>,
        tree: TreeHandle,
        db_size: DocCount,
    ) -> MaxPostList {
        debug_assert!(plists.len() >= 2);
        debug_assert!(db_size > 0);
        let max_wts = plists
            .iter_mut()
            .map(|pl| pl.recalc_max_weight())
            .collect();
        MaxPostList {
            did: 0,
            finished: false,
            plists,
            max_wts,
            db_size,
            tree,
        }
    }

    fn erase_sublist(&mut self, i: usize) {
        self.plists.remove(i);
        self.max_wts.remove(i);
        self.tree.force_recalc();
    }

    /// Erase children that can no longer clear the bar on their own.
    fn prune(&mut self, w_min: f64) {
        let mut i = 0;
        while i < self.plists.len() {
            if self.max_wts[i] < w_min {
                log::trace!(
                    "max: erasing sublist with bound {} < w_min {}",
                    self.max_wts[i],
                    w_min
                );
                self.erase_sublist(i);
            } else {
                i += 1;
            }
        }
    }

    /// Drop exhausted children; if a single child is left, hand it up.
    fn settle(&mut self) -> Result<Option<Box<dyn PostList>>, Error> {
        let mut i = 0;
        while i < self.plists.len() {
            if self.plists[i].at_end() {
                self.erase_sublist(i);
            } else {
                i += 1;
            }
        }
        match self.plists.len() {
            0 => {
                self.finished = true;
                self.did = 0;
                Ok(None)
            }
            1 => {
                self.finished = true;
                self.did = 0;
                Ok(Some(take_child(&mut self.plists[0])))
            }
            _ => {
                self.did = self
                    .plists
                    .iter()
                    .map(|pl| pl.doc_id())
                    .min()
                    .unwrap_or(0);
                Ok(None)
            }
        }
    }
}

impl PostList for MaxPostList {
    fn term_freq(&self) -> DocCount {
        let mut miss = 1.0;
        for pl in &self.plists {
            miss *= 1.0 - pl.term_freq() as f64 / self.db_size as f64;
        }
        ((self.db_size as f64 * (1.0 - miss)) as DocCount)
            .min(self.db_size)
            .max(1)
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        let mut freqs = TermFreqs::default();
        let mut miss = 1.0;
        let mut rel_miss = 1.0;
        for pl in &self.plists {
            let child = pl.term_freq_est_using_stats(stats);
            miss *= 1.0 - child.termfreq as f64 / self.db_size as f64;
            if stats.rset_size > 0 {
                rel_miss *= 1.0 - child.reltermfreq as f64 / stats.rset_size as f64;
            }
            freqs.collfreq += child.collfreq;
        }
        freqs.termfreq = (self.db_size as f64 * (1.0 - miss)) as DocCount;
        freqs.reltermfreq = (stats.rset_size as f64 * (1.0 - rel_miss)) as DocCount;
        freqs
    }

    fn doc_id(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.finished
    }

    fn wdf(&self) -> Wdf {
        // The wdf is only really meaningful when the children are being
        // combined as synonyms, where the sum is what's wanted.
        self.plists
            .iter()
            .filter(|pl| !pl.at_end() && pl.doc_id() == self.did)
            .map(|pl| pl.wdf())
            .sum()
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.plists
            .iter()
            .filter(|pl| !pl.at_end() && pl.doc_id() == self.did)
            .map(|pl| pl.weight(doc_len, unique_terms, wdf_doc_max))
            .fold(0.0, f64::max)
    }

    fn recalc_max_weight(&mut self) -> f64 {
        let mut max = 0.0;
        self.max_wts.clear();
        for pl in self.plists.iter_mut() {
            let w = pl.recalc_max_weight();
            self.max_wts.push(w);
            if w > max {
                max = w;
            }
        }
        max
    }

    fn count_matching_subqs(&self) -> TermCount {
        self.plists
            .iter()
            .filter(|pl| !pl.at_end() && pl.doc_id() == self.did)
            .map(|pl| pl.count_matching_subqs())
            .sum()
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished {
            return Ok(None);
        }
        self.prune(w_min);
        if self.plists.is_empty() {
            self.finished = true;
            self.did = 0;
            return Ok(None);
        }
        let did = self.did;
        for pl in self.plists.iter_mut() {
            if did == 0 || (!pl.at_end() && pl.doc_id() == did) {
                next_child(pl, w_min)?;
            }
        }
        self.settle()
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished || did <= self.did {
            return Ok(None);
        }
        self.prune(w_min);
        if self.plists.is_empty() {
            self.finished = true;
            self.did = 0;
            return Ok(None);
        }
        for pl in self.plists.iter_mut() {
            if !pl.at_end() && pl.doc_id() < did {
                skip_child(pl, did, w_min)?;
            }
        }
        self.settle()
    }

    fn get_description(&self) -> String {
        let kids: Vec<String> = self.plists.iter().map(|pl| pl.get_description()).collect();
        format!("(Max {})", kids.join(" "))
    }
}

/// N-way disjoint union: a document matches when an odd number of children
/// match it. Weight and wdf sum over the matching children.
pub struct XorPostList {
    did: DocId,
    finished: bool,
    plists: Vec<Box<dyn PostList>>,
    db_size: DocCount,
    tree: TreeHandle,
}

impl XorPostList {
    pub fn new(
        plists: Vec<Box<dyn PostList>>,
        tree: TreeHandle,
        db_size: DocCount,
    ) -> XorPostList {
        debug_assert!(plists.len() >= 2);
        debug_assert!(db_size > 0);
        XorPostList {
            did: 0,
            finished: false,
            plists,
            db_size,
            tree,
        }
    }

    fn find_next_match(&mut self) -> Result<Option<Box<dyn PostList>>, Error> {
        loop {
            let mut i = 0;
            while i < self.plists.len() {
                if self.plists[i].at_end() {
                    self.plists.remove(i);
                    self.tree.force_recalc();
                } else {
                    i += 1;
                }
            }
            match self.plists.len() {
                0 => {
                    self.finished = true;
                    self.did = 0;
                    return Ok(None);
                }
                1 => {
                    self.finished = true;
                    self.did = 0;
                    return Ok(Some(take_child(&mut self.plists[0])));
                }
                _ => {}
            }
            let candidate = match self.plists.iter().map(|pl| pl.doc_id()).min() {
                Some(c) => c,
                None => {
                    self.finished = true;
                    self.did = 0;
                    return Ok(None);
                }
            };
            let matching = self
                .plists
                .iter()
                .filter(|pl| pl.doc_id() == candidate)
                .count();
            if matching % 2 == 1 {
                self.did = candidate;
                return Ok(None);
            }
            for pl in self.plists.iter_mut() {
                if !pl.at_end() && pl.doc_id() == candidate {
                    next_child(pl, 0.0)?;
                }
            }
        }
    }
}

impl PostList for XorPostList {
    fn term_freq(&self) -> DocCount {
        let sum: DocCount = self.plists.iter().map(|pl| pl.term_freq()).sum();
        sum.min(self.db_size).max(1)
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        let mut freqs = TermFreqs::default();
        for pl in &self.plists {
            let child = pl.term_freq_est_using_stats(stats);
            freqs.termfreq += child.termfreq;
            freqs.reltermfreq += child.reltermfreq;
            freqs.collfreq += child.collfreq;
        }
        freqs.termfreq = freqs.termfreq.min(self.db_size);
        freqs.reltermfreq = freqs.reltermfreq.min(stats.rset_size);
        freqs
    }

    fn doc_id(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.finished
    }

    fn wdf(&self) -> Wdf {
        self.plists
            .iter()
            .filter(|pl| !pl.at_end() && pl.doc_id() == self.did)
            .map(|pl| pl.wdf())
            .sum()
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.plists
            .iter()
            .filter(|pl| !pl.at_end() && pl.doc_id() == self.did)
            .map(|pl| pl.weight(doc_len, unique_terms, wdf_doc_max))
            .sum()
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.plists
            .iter_mut()
            .map(|pl| pl.recalc_max_weight())
            .sum()
    }

    fn count_matching_subqs(&self) -> TermCount {
        self.plists
            .iter()
            .filter(|pl| !pl.at_end() && pl.doc_id() == self.did)
            .map(|pl| pl.count_matching_subqs())
            .sum()
    }

    fn next(&mut self, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished {
            return Ok(None);
        }
        let did = self.did;
        for pl in self.plists.iter_mut() {
            if did == 0 || (!pl.at_end() && pl.doc_id() == did) {
                next_child(pl, 0.0)?;
            }
        }
        self.find_next_match()
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished || did <= self.did {
            return Ok(None);
        }
        for pl in self.plists.iter_mut() {
            if !pl.at_end() && pl.doc_id() < did {
                skip_child(pl, did, 0.0)?;
            }
        }
        self.find_next_match()
    }

    fn get_description(&self) -> String {
        let kids: Vec<String> = self.plists.iter().map(|pl| pl.get_description()).collect();
        format!("(Xor {})", kids.join(" "))
    }
}

/// Wrapper turning a union subtree into a single synthetic term: the
/// wrapped stream supplies docids and a wdf aggregated across the matching
/// children, and this node attaches the one weight object for the group.
pub struct SynonymPostList {
    pl: Box<dyn PostList>,
    wt: Box<dyn Weight>,
    max_wt: f64,
    /// Asserts that no document holds more than one of the synonym's
    /// terms, so the aggregated wdf is just the matching child's wdf.
    wdf_disjoint: bool,
}

impl SynonymPostList {
    pub fn new(pl: Box<dyn PostList>, wt: Box<dyn Weight>, wdf_disjoint: bool) -> SynonymPostList {
        let max_wt = wt.max_part();
        SynonymPostList {
            pl,
            wt,
            max_wt,
            wdf_disjoint,
        }
    }
}

impl PostList for SynonymPostList {
    fn term_freq(&self) -> DocCount {
        self.pl.term_freq()
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        self.pl.term_freq_est_using_stats(stats)
    }

    fn doc_id(&self) -> DocId {
        self.pl.doc_id()
    }

    fn at_end(&self) -> bool {
        self.pl.at_end()
    }

    fn wdf(&self) -> Wdf {
        // The subtree sums the matching children's wdfs. With disjoint
        // terms at most one child can match, so the sum is exactly that
        // child's wdf.
        debug_assert!(!self.wdf_disjoint || self.pl.count_matching_subqs() <= 1);
        self.pl.wdf()
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.wt
            .sum_part(self.wdf(), doc_len, unique_terms, wdf_doc_max)
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.max_wt
    }

    fn count_matching_subqs(&self) -> TermCount {
        1
    }

    fn next(&mut self, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        // The wrapped subtree carries no weights of its own, so the
        // threshold must not reach it.
        next_child(&mut self.pl, 0.0)?;
        Ok(None)
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        skip_child(&mut self.pl, did, 0.0)?;
        Ok(None)
    }

    fn check(
        &mut self,
        did: DocId,
        _w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        let valid = crate::postlist::check_child(&mut self.pl, did, 0.0)?;
        Ok((None, valid))
    }

    fn get_description(&self) -> String {
        format!("(Synonym {})", self.pl.get_description())
    }
}
