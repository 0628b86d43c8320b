use crate::backend::{ValueList, ValueSlot};
use crate::error::Error;
use crate::postlist::{DocCount, DocId, PostList, TermFreqs};
use crate::stats::Stats;

/// Docids of documents whose stored value in a slot lies lexicographically
/// within `[begin, end]`. A pure filter: its weight contribution is zero,
/// and its termfreq is the externally pre-computed estimate.
pub struct ValueRangePostList {
    slot: ValueSlot,
    begin: Vec<u8>,
    end: Vec<u8>,
    est: DocCount,
    db_size: DocCount,
    valuelist: Box<dyn ValueList>,
    /// Whether the value cursor has been moved at all; a declined `check`
    /// may leave it ahead of `did`, and `next` must not advance past the
    /// entry it stopped on.
    vl_started: bool,
    did: DocId,
    finished: bool,
}

impl ValueRangePostList {
    pub fn new(
        valuelist: Box<dyn ValueList>,
        slot: ValueSlot,
        begin: Vec<u8>,
        end: Vec<u8>,
        est: DocCount,
        db_size: DocCount,
    ) -> ValueRangePostList {
        ValueRangePostList {
            slot,
            begin,
            end,
            est,
            db_size,
            valuelist,
            vl_started: false,
            did: 0,
            finished: false,
        }
    }

    fn in_range(&self) -> bool {
        let value = self.valuelist.value();
        value >= self.begin.as_slice() && value <= self.end.as_slice()
    }

    /// Walk the value list forward until an in-range entry or the end.
    fn find_next_match(&mut self) -> Result<(), Error> {
        loop {
            if self.valuelist.at_end() {
                self.did = 0;
                self.finished = true;
                return Ok(());
            }
            if self.in_range() {
                self.did = self.valuelist.doc_id();
                return Ok(());
            }
            self.valuelist.next()?;
        }
    }
}

impl PostList for ValueRangePostList {
    fn term_freq(&self) -> DocCount {
        self.est
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        let rel = if self.db_size > 0 {
            (self.est as f64 * stats.rset_size as f64 / self.db_size as f64) as DocCount
        } else {
            0
        };
        TermFreqs::new(self.est, rel, 0)
    }

    fn doc_id(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.finished
    }

    fn next(&mut self, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished {
            return Ok(None);
        }
        if !self.vl_started {
            self.vl_started = true;
            self.valuelist.skip_to(1)?;
        } else if !self.valuelist.at_end() && self.valuelist.doc_id() <= self.did {
            self.valuelist.next()?;
        }
        self.find_next_match()?;
        Ok(None)
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if self.finished || did <= self.did {
            return Ok(None);
        }
        self.vl_started = true;
        self.valuelist.skip_to(did)?;
        self.find_next_match()?;
        Ok(None)
    }

    fn check(
        &mut self,
        did: DocId,
        _w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        if self.finished {
            return Ok((None, true));
        }
        if did <= self.did {
            return Ok((None, true));
        }
        self.vl_started = true;
        if !self.valuelist.check(did)? {
            // No value stored for this document; it can't match, and the
            // cursor hasn't committed to a position.
            return Ok((None, false));
        }
        if self.valuelist.at_end() {
            self.did = 0;
            self.finished = true;
            return Ok((None, true));
        }
        if self.valuelist.doc_id() == did && self.in_range() {
            self.did = did;
            return Ok((None, true));
        }
        Ok((None, false))
    }

    fn get_description(&self) -> String {
        format!("(ValueRange {})", self.slot)
    }
}
