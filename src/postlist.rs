use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::position::PositionList;
use crate::stats::Stats;

/// 1-based document identifier within a shard. Zero is reserved for
/// "unstarted or exhausted".
pub type DocId = u64;
/// Term position within a document.
pub type TermPos = u64;
/// Within-document frequency of a term.
pub type Wdf = u64;
pub type DocCount = u64;
pub type TermCount = u64;

/// Termfreq estimates derived from collection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TermFreqs {
    pub termfreq: DocCount,
    pub reltermfreq: DocCount,
    pub collfreq: TermCount,
}

impl TermFreqs {
    pub fn new(termfreq: DocCount, reltermfreq: DocCount, collfreq: TermCount) -> TermFreqs {
        TermFreqs {
            termfreq,
            reltermfreq,
            collfreq,
        }
    }
}

/// Shared handle for a posting list tree.
///
/// Nodes that shrink mid-traversal raise the recalc flag so the driver
/// knows cached max-weights up the spine are stale.
#[derive(Clone, Default)]
pub struct TreeHandle {
    need_recalc: Arc<AtomicBool>,
}

impl TreeHandle {
    pub fn new() -> TreeHandle {
        TreeHandle::default()
    }

    pub fn force_recalc(&self) {
        self.need_recalc.store(true, Ordering::SeqCst);
    }

    /// Read and clear the recalc flag.
    pub fn take_recalc(&self) -> bool {
        self.need_recalc.swap(false, Ordering::SeqCst)
    }
}

/// A posting list: a stateful cursor over a strictly ascending stream of
/// document ids, with the ancillary data needed to rank each document.
///
/// `next` and `skip_to` may return a replacement cursor; the parent must
/// then install the replacement in place of this node and drop it. This is
/// how a node prunes itself from the tree once its upper weight bound can
/// no longer reach the global `w_min` threshold.
pub trait PostList {
    /// Estimated number of documents this stream can yield. May
    /// overestimate, but must never claim zero for a stream that can yield
    /// any document.
    fn term_freq(&self) -> DocCount;

    /// Termfreq estimates derived from collated collection statistics.
    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs;

    /// The current docid, or zero if unstarted or exhausted.
    fn doc_id(&self) -> DocId;

    fn at_end(&self) -> bool;

    /// Within-document frequency contribution at the current docid.
    fn wdf(&self) -> Wdf {
        0
    }

    /// Weight contribution at the current docid.
    fn weight(&self, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf) -> f64 {
        let _ = (doc_len, unique_terms, wdf_doc_max);
        0.0
    }

    /// Current upper bound on `weight` over the remainder of the stream.
    /// Non-increasing over the lifetime of the cursor.
    fn recalc_max_weight(&mut self) -> f64 {
        0.0
    }

    /// A position iterator for the current docid, or `None` when the node
    /// has no meaningful positional data.
    fn read_position_list(&mut self) -> Result<Option<Box<dyn PositionList>>, Error> {
        Ok(None)
    }

    /// Number of leaf subqueries contributing a match at the current docid.
    fn count_matching_subqs(&self) -> TermCount {
        1
    }

    /// Advance to the next matching document with weight potential at least
    /// `w_min`.
    fn next(&mut self, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error>;

    /// Advance to the first matching document with docid at least `did`.
    /// A no-op when already at or past `did`.
    fn skip_to(&mut self, did: DocId, w_min: f64) -> Result<Option<Box<dyn PostList>>, Error>;

    /// Like `skip_to`, but allowed to decline when positioning cannot be
    /// done cheaply. When the returned flag is false the cursor has not
    /// committed to a position; the caller must reposition it with
    /// `next`/`skip_to` before reading it, and may only conclude that no
    /// document before `did` matches.
    fn check(
        &mut self,
        did: DocId,
        w_min: f64,
    ) -> Result<(Option<Box<dyn PostList>>, bool), Error> {
        Ok((self.skip_to(did, w_min)?, true))
    }

    fn get_description(&self) -> String;
}

/// Placeholder left behind when a child is moved out of its slot to be
/// handed up the tree as a replacement.
pub(crate) struct ExhaustedPostList;

impl PostList for ExhaustedPostList {
    fn term_freq(&self) -> DocCount {
        0
    }

    fn term_freq_est_using_stats(&self, _stats: &Stats) -> TermFreqs {
        TermFreqs::default()
    }

    fn doc_id(&self) -> DocId {
        0
    }

    fn at_end(&self) -> bool {
        true
    }

    fn next(&mut self, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        Ok(None)
    }

    fn skip_to(&mut self, _did: DocId, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        Ok(None)
    }

    fn get_description(&self) -> String {
        "(Exhausted)".to_string()
    }
}

/// Move a child out of its slot, leaving an exhausted stub behind.
pub(crate) fn take_child(slot: &mut Box<dyn PostList>) -> Box<dyn PostList> {
    std::mem::replace(slot, Box::new(ExhaustedPostList))
}

/// Advance a child slot, installing any replacement it hands back.
pub(crate) fn next_child(slot: &mut Box<dyn PostList>, w_min: f64) -> Result<(), Error> {
    if let Some(repl) = slot.next(w_min)? {
        *slot = repl;
    }
    Ok(())
}

/// Seek a child slot, installing any replacement it hands back.
pub(crate) fn skip_child(
    slot: &mut Box<dyn PostList>,
    did: DocId,
    w_min: f64,
) -> Result<(), Error> {
    if let Some(repl) = slot.skip_to(did, w_min)? {
        *slot = repl;
    }
    Ok(())
}

/// Check a child slot, installing any replacement it hands back. Returns
/// whether the child committed to a position.
pub(crate) fn check_child(
    slot: &mut Box<dyn PostList>,
    did: DocId,
    w_min: f64,
) -> Result<bool, Error> {
    let (repl, valid) = slot.check(did, w_min)?;
    if let Some(repl) = repl {
        *slot = repl;
    }
    Ok(valid)
}
