//! In-memory shard backend.
//!
//! Terms are looked up through an fst map from term to an offset into a
//! vint-encoded postings buffer; positions live in a second buffer that
//! postings entries point into. This is the layout the on-disk backends
//! use, rendered into byte vectors, and it is what the tests run against.
//!
//! Per term the postings buffer holds `[ndocs][did_delta wdf pos_delta]*`;
//! per posting the positions buffer holds `[npos][position_delta]*`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fst::{Map, MapBuilder};

use crate::backend::{Database, ValueList, ValueSlot};
use crate::error::Error;
use crate::position::PositionList;
use crate::postlist::{DocCount, DocId, PostList, TermCount, TermFreqs, TermPos, Wdf};
use crate::stats::Stats;
use crate::util::{read_vint, write_vint};

pub struct MemDatabaseBuilder {
    postings: BTreeMap<String, Vec<(DocId, Vec<TermPos>)>>,
    values: BTreeMap<ValueSlot, BTreeMap<DocId, Vec<u8>>>,
    doc_lens: HashMap<DocId, TermCount>,
    unique_terms: HashMap<DocId, TermCount>,
}

impl MemDatabaseBuilder {
    pub fn new() -> MemDatabaseBuilder {
        MemDatabaseBuilder {
            postings: BTreeMap::new(),
            values: BTreeMap::new(),
            doc_lens: HashMap::new(),
            unique_terms: HashMap::new(),
        }
    }

    /// Add a document: its terms with their in-document positions, and its
    /// slot values. A term without positions still counts one occurrence.
    pub fn add_doc(
        &mut self,
        did: DocId,
        terms: Vec<(&str, Vec<TermPos>)>,
        values: Vec<(ValueSlot, Vec<u8>)>,
    ) {
        debug_assert!(did > 0);
        let mut doc_len = 0;
        let mut unique = 0;
        for (term, mut positions) in terms {
            positions.sort_unstable();
            doc_len += (positions.len() as TermCount).max(1);
            unique += 1;
            self.postings
                .entry(term.to_string())
                .or_insert_with(Vec::new)
                .push((did, positions));
        }
        self.doc_lens.insert(did, doc_len);
        self.unique_terms.insert(did, unique);
        for (slot, value) in values {
            self.values
                .entry(slot)
                .or_insert_with(BTreeMap::new)
                .insert(did, value);
        }
    }

    pub fn build(self) -> Result<MemDatabase, Error> {
        let mut term_map = MapBuilder::memory();
        let mut postings = Vec::new();
        let mut positions = Vec::new();
        let mut collfreqs = HashMap::new();
        for (term, mut docs) in self.postings {
            docs.sort_unstable_by_key(|(did, _)| *did);
            term_map.insert(term.as_bytes(), postings.len() as u64)?;
            write_vint(&mut postings, docs.len() as u64)?;
            let mut prev_did = 0;
            let mut prev_pos_offset = 0u64;
            let mut collfreq: TermCount = 0;
            for (did, doc_positions) in docs.iter() {
                let wdf = (doc_positions.len() as Wdf).max(1);
                collfreq += wdf;
                write_vint(&mut postings, did - prev_did)?;
                write_vint(&mut postings, wdf)?;
                let pos_offset = positions.len() as u64;
                write_vint(&mut postings, pos_offset - prev_pos_offset)?;
                prev_did = *did;
                prev_pos_offset = pos_offset;
                write_vint(&mut positions, doc_positions.len() as u64)?;
                let mut last_pos = 0;
                for pos in doc_positions {
                    write_vint(&mut positions, pos - last_pos)?;
                    last_pos = *pos;
                }
            }
            collfreqs.insert(term, collfreq);
        }
        let term_map = term_map.into_map();
        let values = self
            .values
            .into_iter()
            .map(|(slot, entries)| (slot, Arc::new(entries.into_iter().collect::<Vec<_>>())))
            .collect();
        Ok(MemDatabase {
            term_map,
            postings: Arc::new(postings),
            positions: Arc::new(positions),
            collfreqs,
            values,
            doc_lens: self.doc_lens,
            unique_terms: self.unique_terms,
        })
    }
}

impl Default for MemDatabaseBuilder {
    fn default() -> Self {
        MemDatabaseBuilder::new()
    }
}

pub struct MemDatabase {
    term_map: Map<Vec<u8>>,
    postings: Arc<Vec<u8>>,
    positions: Arc<Vec<u8>>,
    collfreqs: HashMap<String, TermCount>,
    values: HashMap<ValueSlot, Arc<Vec<(DocId, Vec<u8>)>>>,
    doc_lens: HashMap<DocId, TermCount>,
    unique_terms: HashMap<DocId, TermCount>,
}

impl MemDatabase {
    /// Total term occurrences in a document, for the driver's weight calls.
    pub fn doc_length(&self, did: DocId) -> TermCount {
        self.doc_lens.get(&did).cloned().unwrap_or(0)
    }

    /// Distinct terms in a document, for the driver's weight calls.
    pub fn doc_unique_terms(&self, did: DocId) -> TermCount {
        self.unique_terms.get(&did).cloned().unwrap_or(0)
    }
}

impl Database for MemDatabase {
    fn doc_count(&self) -> DocCount {
        self.doc_lens.len() as DocCount
    }

    fn open_term_postlist(&self, term: &str) -> Result<Option<Box<dyn PostList>>, Error> {
        let offset = match self.term_map.get(term.as_bytes()) {
            Some(offset) => offset as usize,
            None => return Ok(None),
        };
        let mut pos = offset;
        let ndocs = read_vint(&self.postings, &mut pos)?;
        Ok(Some(Box::new(MemTermPostList {
            term: term.to_string(),
            postings: self.postings.clone(),
            positions: self.positions.clone(),
            pos,
            left: ndocs,
            termfreq: ndocs,
            did: 0,
            wdf: 0,
            pos_offset: 0,
            finished: false,
        })))
    }

    fn open_value_list(&self, slot: ValueSlot) -> Result<Box<dyn ValueList>, Error> {
        let entries = self
            .values
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| Arc::new(Vec::new()));
        Ok(Box::new(MemValueList {
            entries,
            idx: 0,
            started: false,
        }))
    }

    fn collection_freq(&self, term: &str) -> Result<TermCount, Error> {
        Ok(self.collfreqs.get(term).cloned().unwrap_or(0))
    }
}

/// Lazily-decoding cursor over one term's postings.
struct MemTermPostList {
    term: String,
    postings: Arc<Vec<u8>>,
    positions: Arc<Vec<u8>>,
    pos: usize,
    left: u64,
    termfreq: DocCount,
    did: DocId,
    wdf: Wdf,
    pos_offset: u64,
    finished: bool,
}

impl MemTermPostList {
    fn decode_next(&mut self) -> Result<(), Error> {
        if self.left == 0 {
            self.did = 0;
            self.wdf = 0;
            self.finished = true;
            return Ok(());
        }
        self.left -= 1;
        let did_delta = read_vint(&self.postings, &mut self.pos)?;
        self.did += did_delta;
        self.wdf = read_vint(&self.postings, &mut self.pos)?;
        let pos_delta = read_vint(&self.postings, &mut self.pos)?;
        self.pos_offset += pos_delta;
        Ok(())
    }
}

impl PostList for MemTermPostList {
    fn term_freq(&self) -> DocCount {
        self.termfreq
    }

    fn term_freq_est_using_stats(&self, stats: &Stats) -> TermFreqs {
        stats.get_termfreqs(&self.term)
    }

    fn doc_id(&self) -> DocId {
        self.did
    }

    fn at_end(&self) -> bool {
        self.finished
    }

    fn wdf(&self) -> Wdf {
        self.wdf
    }

    fn read_position_list(&mut self) -> Result<Option<Box<dyn PositionList>>, Error> {
        if self.finished || self.did == 0 {
            return Ok(None);
        }
        let mut pos = self.pos_offset as usize;
        let npos = read_vint(&self.positions, &mut pos)?;
        Ok(Some(Box::new(MemPositionList {
            buf: self.positions.clone(),
            pos,
            left: npos,
            approx: npos,
            current: None,
        })))
    }

    fn next(&mut self, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        if !self.finished {
            self.decode_next()?;
        }
        Ok(None)
    }

    fn skip_to(&mut self, did: DocId, _w_min: f64) -> Result<Option<Box<dyn PostList>>, Error> {
        while !self.finished && self.did < did {
            self.decode_next()?;
        }
        Ok(None)
    }

    fn get_description(&self) -> String {
        format!("{}:{}", self.term, self.termfreq)
    }
}

/// Lazily-decoding cursor over one posting's positions.
struct MemPositionList {
    buf: Arc<Vec<u8>>,
    pos: usize,
    left: u64,
    approx: u64,
    current: Option<TermPos>,
}

impl PositionList for MemPositionList {
    fn approx_size(&self) -> TermCount {
        self.approx
    }

    fn position(&self) -> TermPos {
        self.current.unwrap_or(0)
    }

    fn next_pos(&mut self) -> Result<Option<TermPos>, Error> {
        if self.left == 0 {
            self.current = None;
            return Ok(None);
        }
        self.left -= 1;
        let delta = read_vint(&self.buf, &mut self.pos)?;
        self.current = Some(self.current.unwrap_or(0) + delta);
        Ok(self.current)
    }

    fn skip_to(&mut self, pos: TermPos) -> Result<Option<TermPos>, Error> {
        if let Some(current) = self.current {
            if current >= pos {
                return Ok(self.current);
            }
        }
        loop {
            match self.next_pos()? {
                Some(p) if p >= pos => return Ok(Some(p)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }
}

/// Cursor over a slot's `(docid, value)` entries, sorted by docid.
struct MemValueList {
    entries: Arc<Vec<(DocId, Vec<u8>)>>,
    idx: usize,
    started: bool,
}

impl ValueList for MemValueList {
    fn doc_id(&self) -> DocId {
        self.entries.get(self.idx).map(|(did, _)| *did).unwrap_or(0)
    }

    fn value(&self) -> &[u8] {
        self.entries
            .get(self.idx)
            .map(|(_, value)| value.as_slice())
            .unwrap_or(b"")
    }

    fn at_end(&self) -> bool {
        self.idx >= self.entries.len()
    }

    fn next(&mut self) -> Result<(), Error> {
        if !self.started {
            self.started = true;
        } else if self.idx < self.entries.len() {
            self.idx += 1;
        }
        Ok(())
    }

    fn skip_to(&mut self, did: DocId) -> Result<(), Error> {
        self.started = true;
        while self.idx < self.entries.len() && self.entries[self.idx].0 < did {
            self.idx += 1;
        }
        Ok(())
    }

    fn check(&mut self, did: DocId) -> Result<bool, Error> {
        self.skip_to(did)?;
        Ok(!self.at_end() && self.entries[self.idx].0 == did)
    }
}

#[cfg(test)]
mod tests {

    use super::MemDatabaseBuilder;
    use crate::backend::Database;
    use crate::postlist::next_child;

    #[test]
    fn postlist_walks_docs_in_order() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(2, vec![("tea", vec![0, 4])], vec![]);
        builder.add_doc(5, vec![("tea", vec![1]), ("milk", vec![2])], vec![]);
        builder.add_doc(9, vec![("tea", vec![3])], vec![]);
        let db = builder.build().unwrap();

        let mut pl = db.open_term_postlist("tea").unwrap().unwrap();
        assert_eq!(pl.term_freq(), 3);
        next_child(&mut pl, 0.0).unwrap();
        assert_eq!(pl.doc_id(), 2);
        assert_eq!(pl.wdf(), 2);
        pl.skip_to(6, 0.0).unwrap();
        assert_eq!(pl.doc_id(), 9);
        assert_eq!(pl.wdf(), 1);
        pl.next(0.0).unwrap();
        assert!(pl.at_end());

        assert!(db.open_term_postlist("coffee").unwrap().is_none());
        assert_eq!(db.collection_freq("tea").unwrap(), 4);
    }

    #[test]
    fn positions_decode_lazily_per_doc() {
        let mut builder = MemDatabaseBuilder::new();
        builder.add_doc(1, vec![("tea", vec![3, 7, 20])], vec![]);
        builder.add_doc(2, vec![("tea", vec![5])], vec![]);
        let db = builder.build().unwrap();

        let mut pl = db.open_term_postlist("tea").unwrap().unwrap();
        next_child(&mut pl, 0.0).unwrap();
        let mut positions = pl.read_position_list().unwrap().unwrap();
        assert_eq!(positions.approx_size(), 3);
        assert_eq!(positions.next_pos().unwrap(), Some(3));
        assert_eq!(positions.skip_to(8).unwrap(), Some(20));

        next_child(&mut pl, 0.0).unwrap();
        let mut positions = pl.read_position_list().unwrap().unwrap();
        assert_eq!(positions.next_pos().unwrap(), Some(5));
        assert_eq!(positions.next_pos().unwrap(), None);
    }
}
