use std::sync::Arc;

use crate::error::Error;
use crate::position::PositionList;
use crate::postlist::{DocCount, DocId, PostList, TermCount, TermFreqs, Wdf};
use crate::stats::Stats;
use crate::weight::{Weight, WeightFactory};

/// A backend term posting list with a weighting scheme attached.
pub struct WeightedPostList {
    pl: Box<dyn PostList>,
    term: String,
    wt: Box<dyn Weight>,
    max_wt: f64,
}

impl WeightedPostList {
    pub fn new(pl: Box<dyn PostList>, term: String, wt: Box<dyn Weight>) -> WeightedPostList {
        let max_wt = wt.max_part();
        WeightedPostList {
            pl,
            term,
            wt,
            max_wt,
        }
    }
}

impl PostList for WeightedPostList {
    fn term_freq(&self) -> DocCount {
        self.pl.term_freq()
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        stats.get_termfreqs(&self.term)
    }

    fn doc_id(&self) -> DocId {
        self.pl.doc_id()
    }

    fn at_end(&self) -> bool {
        self.pl.at_end()
    }

    fn wdf(&self) -> Wdf {
        self.pl.wdf()
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        self.wt
            .sum_part(self.pl.wdf(), doc_len, unique_terms, wdf_doc_max)
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.max_wt
    }

    fn read_position_list(&mut self) -> Result<Option<Box<dyn PositionList>>, Error> {
        self.pl.read_position_list()
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        crate::postlist::next_child(&mut self.pl, w_min)?;
        Ok(None)
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        crate::postlist::skip_child(&mut self.pl, did, w_min)?;
        Ok(None)
    }

    fn check(
        &mut self,
        did: DocId,
        w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        let valid = crate::postlist::check_child(&mut self.pl, did, w_min)?;
        Ok((None, valid))
    }

    fn get_description(&self) -> String {
        format!("(Weighted {})", self.pl.get_description())
    }
}

/// A backend term posting list whose weighting scheme is only created when
/// the tree first asks for an upper bound. Terms pruned before then never
/// pay for weight initialisation.
pub struct LazyWeightPostList {
    pl: Box<dyn PostList>,
    term: String,
    wqf: TermCount,
    factor: f64,
    query_length: TermCount,
    factory: Arc<dyn WeightFactory>,
    stats: Arc<Stats>,
    wt: Option<Box<dyn Weight>>,
}

impl LazyWeightPostList {
    pub fn new(
        pl: Box<dyn PostList>,
        term: String,
        wqf: TermCount,
        factor: f64,
        query_length: TermCount,
        factory: Arc<dyn WeightFactory>,
        stats: Arc<Stats>,
    ) -> LazyWeightPostList {
        LazyWeightPostList {
            pl,
            term,
            wqf,
            factor,
            query_length,
            factory,
            stats,
            wt: None,
        }
    }

    fn materialise(&mut self) {
        if self.wt.is_none() {
            self.wt = Some(self.factory.create(
                &self.stats,
                self.query_length,
                &self.term,
                self.wqf,
                self.factor,
            ));
        }
    }
}

impl PostList for LazyWeightPostList {
    fn term_freq(&self) -> DocCount {
        self.pl.term_freq()
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        stats.get_termfreqs(&self.term)
    }

    fn doc_id(&self) -> DocId {
        self.pl.doc_id()
    }

    fn at_end(&self) -> bool {
        self.pl.at_end()
    }

    fn wdf(&self) -> Wdf {
        self.pl.wdf()
    }

    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        // The driver recalculates max weights before reading any weight,
        // so the scheme exists by the time we get here.
        debug_assert!(self.wt.is_some());
        match &self.wt {
            Some(wt) => wt.sum_part(self.pl.wdf(), doc_len, unique_terms, wdf_doc_max),
            None => 0.0,
        }
    }

    fn recalc_max_weight(&mut self) -> f64 {
        self.materialise();
        self.wt.as_ref().map(|wt| wt.max_part()).unwrap_or(0.0)
    }

    fn read_position_list(&mut self) -> Result<Option<Box<dyn PositionList>>, Error> {
        self.pl.read_position_list()
    }

    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        crate::postlist::next_child(&mut self.pl, w_min)?;
        Ok(None)
    }

    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        crate::postlist::skip_child(&mut self.pl, did, w_min)?;
        Ok(None)
    }

    fn check(
        &mut self,
        did: DocId,
        w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        let valid = crate::postlist::check_child(&mut self.pl, did, w_min)?;
        Ok((None, valid))
    }

    fn get_description(&self) -> String {
        format!("(LazyWeight {})", self.pl.get_description())
    }
}
