use crate::error::Error;
use crate::postlist::{DocCount, DocId, PostList, TermCount};

/// Value slot number. Each document may store one byte string per slot.
pub type ValueSlot = u32;

/// The backend interface the match engine consumes. How postings and
/// values are actually stored is the backend's business; the engine only
/// drives the cursors it hands out.
pub trait Database: Send + Sync {
    fn doc_count(&self) -> DocCount;

    /// A raw posting cursor for `term`, or `None` when the shard has no
    /// postings for it. The returned list carries docids, wdfs and
    /// positions but no weights; the coordinator decorates it.
    fn open_term_postlist(&self, term: &str) -> Result<Option<Box<dyn PostList>>, Error>;

    /// Cursor over the stored values of a slot, ordered by docid.
    fn open_value_list(&self, slot: ValueSlot) -> Result<Box<dyn ValueList>, Error>;

    /// Total number of occurrences of `term` across the shard.
    fn collection_freq(&self, term: &str) -> Result<TermCount, Error>;
}

/// Ordered cursor over the documents holding a value in one slot.
pub trait ValueList {
    /// The current docid; only meaningful once positioned.
    fn doc_id(&self) -> DocId;

    /// The stored value at the current docid.
    fn value(&self) -> &[u8];

    fn at_end(&self) -> bool;

    fn next(&mut self) -> Result<(), Error>;

    /// Advance to the first entry with docid `>= did`.
    fn skip_to(&mut self, did: DocId) -> Result<(), Error>;

    /// Position exactly at `did` if the document stores a value here.
    /// Returns false when it does not; the cursor is then left no further
    /// than the next stored entry.
    fn check(&mut self, did: DocId) -> Result<bool, Error>;
}
