use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::backend::Database;
use crate::error::Error;
use crate::postlist::{skip_child, DocCount, DocId, TermFreqs};

/// A relevance set: docids judged relevant, used as input to statistics
/// collation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RSet {
    docs: BTreeSet<DocId>,
}

impl RSet {
    pub fn new() -> RSet {
        RSet::default()
    }

    pub fn add_document(&mut self, did: DocId) {
        self.docs.insert(did);
    }

    pub fn contains(&self, did: DocId) -> bool {
        self.docs.contains(&did)
    }

    pub fn len(&self) -> DocCount {
        self.docs.len() as DocCount
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.docs.iter().cloned()
    }
}

/// Collated collection statistics for one match.
///
/// Written by each shard's `prepare_match` in turn, then frozen and shared
/// for the read phase. Serialisable so remote shards can ship their
/// contribution over the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Total number of documents across all accumulated shards.
    pub collection_size: DocCount,
    /// Total size of the relevance sets.
    pub rset_size: DocCount,
    /// Per-term collated frequencies, keyed by the query's terms.
    pub termfreqs: HashMap<String, TermFreqs>,
}

impl Stats {
    /// Statistics object primed with the terms of interest, all zeroed.
    pub fn for_terms<'a, I>(terms: I) -> Stats
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut stats = Stats::default();
        for term in terms {
            stats.termfreqs.insert(term.to_string(), TermFreqs::default());
        }
        stats
    }

    /// Accumulate one shard's contribution.
    ///
    /// For every primed term this collates the shard's termfreq and
    /// collection frequency, and counts the relevance-set documents the
    /// term occurs in.
    pub fn accumulate_stats(&mut self, db: &dyn Database, rset: &RSet) -> Result<(), Error> {
        self.collection_size += db.doc_count();
        self.rset_size += rset.len();
        for (term, freqs) in self.termfreqs.iter_mut() {
            let mut pl = match db.open_term_postlist(term)? {
                Some(pl) => pl,
                None => continue,
            };
            freqs.termfreq += pl.term_freq();
            freqs.collfreq += db.collection_freq(term)?;
            for did in rset.iter() {
                skip_child(&mut pl, did, 0.0)?;
                if pl.at_end() {
                    break;
                }
                if pl.doc_id() == did {
                    freqs.reltermfreq += 1;
                }
            }
        }
        Ok(())
    }

    /// Collated frequencies for `term`; zero for terms that were not
    /// primed.
    pub fn get_termfreqs(&self, term: &str) -> TermFreqs {
        self.termfreqs.get(term).cloned().unwrap_or_default()
    }
}
