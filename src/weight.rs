use crate::postlist::{TermCount, Wdf};
use crate::stats::Stats;

/// Per-term weighting scheme instance, created by a `WeightFactory` once
/// the cross-shard statistics are known.
pub trait Weight: Send + Sync {
    /// Weight contribution of one document.
    fn sum_part(&self, wdf: Wdf, doc_len: TermCount, unique_terms: TermCount, wdf_doc_max: Wdf)
        -> f64;

    /// Upper bound on `sum_part` over any document.
    fn max_part(&self) -> f64;
}

/// Factory for weighting scheme instances. The formulae themselves are an
/// external concern; the match engine only needs the two calls below.
pub trait WeightFactory: Send + Sync {
    fn create(
        &self,
        stats: &Stats,
        query_length: TermCount,
        term: &str,
        wqf: TermCount,
        factor: f64,
    ) -> Box<dyn Weight>;

    /// Whether `sum_part` reads the wdf argument at all. Lets leaves skip
    /// wdf bookkeeping for schemes that ignore it.
    fn sum_part_needs_wdf(&self) -> bool;
}

/// Weighting scheme assigning zero weight to everything, for pure boolean
/// matching.
#[derive(Debug, Clone, Default)]
pub struct BoolWeight;

impl Weight for BoolWeight {
    fn sum_part(&self, _wdf: Wdf, _doc_len: TermCount, _unique: TermCount, _wdf_max: Wdf) -> f64 {
        0.0
    }

    fn max_part(&self) -> f64 {
        0.0
    }
}

impl WeightFactory for BoolWeight {
    fn create(
        &self,
        _stats: &Stats,
        _query_length: TermCount,
        _term: &str,
        _wqf: TermCount,
        _factor: f64,
    ) -> Box<dyn Weight> {
        Box::new(BoolWeight)
    }

    fn sum_part_needs_wdf(&self) -> bool {
        false
    }
}

/// Coordinate-level weighting: each matching term contributes its query
/// frequency scaled by the factor, independent of document statistics.
#[derive(Debug, Clone, Default)]
pub struct CoordWeight {
    part: f64,
}

impl CoordWeight {
    pub fn new(part: f64) -> CoordWeight {
        CoordWeight { part }
    }
}

impl Weight for CoordWeight {
    fn sum_part(&self, _wdf: Wdf, _doc_len: TermCount, _unique: TermCount, _wdf_max: Wdf) -> f64 {
        self.part
    }

    fn max_part(&self) -> f64 {
        self.part
    }
}

impl WeightFactory for CoordWeight {
    fn create(
        &self,
        _stats: &Stats,
        _query_length: TermCount,
        _term: &str,
        wqf: TermCount,
        factor: f64,
    ) -> Box<dyn Weight> {
        Box::new(CoordWeight::new(wqf as f64 * factor))
    }

    fn sum_part_needs_wdf(&self) -> bool {
        false
    }
}
