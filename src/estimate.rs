use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::postlist::DocCount;
use crate::select::SelectCounters;

/// Kinds of deferred estimate operations. Pushed in post-order during tree
/// construction, so the stack is a postfix rendering of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateType {
    Leaf,
    And,
    Or,
    Xor,
    AndNot,
    AndMaybe,
    Synonym,
    Near,
    Phrase,
    ExactPhrase,
    ValueRange,
    Decider,
}

/// One deferred estimate operation.
///
/// Selecting operations carry the accept/reject counters their node fills
/// in during the match; resolution reads them once the tree is gone.
pub struct EstimateOp {
    kind: EstimateType,
    /// Operands consumed from the stack beneath this op.
    subquery_count: u32,
    /// Exact matching-document count for `Leaf`, the caller-supplied
    /// estimate for `ValueRange`.
    termfreq: DocCount,
    counters: Option<Arc<SelectCounters>>,
}

impl EstimateOp {
    pub fn leaf(termfreq: DocCount) -> EstimateOp {
        EstimateOp {
            kind: EstimateType::Leaf,
            subquery_count: 0,
            termfreq,
            counters: None,
        }
    }

    pub fn value_range(est: DocCount) -> EstimateOp {
        EstimateOp {
            kind: EstimateType::ValueRange,
            subquery_count: 0,
            termfreq: est,
            counters: None,
        }
    }

    pub fn compose(kind: EstimateType, subquery_count: u32) -> EstimateOp {
        debug_assert!(subquery_count > 0);
        EstimateOp {
            kind,
            subquery_count,
            termfreq: 0,
            counters: None,
        }
    }

    /// A selecting op (phrase, near, decider): consumes one operand and
    /// scales it by the observed accept ratio.
    pub fn select(kind: EstimateType, counters: Arc<SelectCounters>) -> EstimateOp {
        EstimateOp {
            kind,
            subquery_count: 1,
            termfreq: 0,
            counters: Some(counters),
        }
    }

    pub fn subquery_count(&self) -> u32 {
        self.subquery_count
    }
}

/// Lower bound, estimate and upper bound on the number of matching
/// documents in one shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimates {
    pub lower: DocCount,
    pub est: DocCount,
    pub upper: DocCount,
}

impl Estimates {
    pub fn new(lower: DocCount, est: DocCount, upper: DocCount) -> Estimates {
        Estimates { lower, est, upper }
    }

    fn clamped(mut self, db_size: DocCount) -> Estimates {
        self.upper = self.upper.min(db_size);
        self.est = self.est.min(self.upper);
        self.lower = self.lower.min(self.est);
        self
    }
}

/// The fallback selectivity divisor for a selecting op whose node never
/// tested a document.
fn untested_divisor(kind: EstimateType) -> DocCount {
    match kind {
        EstimateType::ExactPhrase => 4,
        EstimateType::Phrase => 3,
        _ => 2,
    }
}

/// Resolve a postfix stack of estimate ops into shard estimates with a
/// single linear pass over a value stack.
pub fn resolve(stack: &[EstimateOp], db_size: DocCount) -> Estimates {
    if stack.is_empty() || db_size == 0 {
        return Estimates::default();
    }
    let n = db_size as f64;
    let mut values: Vec<Estimates> = Vec::new();
    for op in stack {
        let arity = op.subquery_count as usize;
        debug_assert!(values.len() >= arity);
        if values.len() < arity {
            return Estimates::default();
        }
        let operands = values.split_off(values.len() - arity);
        let result = match op.kind {
            EstimateType::Leaf => {
                let tf = op.termfreq.min(db_size);
                Estimates::new(tf, tf, tf)
            }
            EstimateType::ValueRange => Estimates::new(0, op.termfreq, db_size),
            EstimateType::And => {
                let mut lower_sum: DocCount = 0;
                let mut upper = db_size;
                let mut frac = 1.0;
                for child in &operands {
                    lower_sum += child.lower;
                    upper = upper.min(child.upper);
                    frac *= child.est as f64 / n;
                }
                let spare = (operands.len() as DocCount - 1) * db_size;
                let lower = lower_sum.saturating_sub(spare);
                Estimates::new(lower, (n * frac) as DocCount, upper)
            }
            EstimateType::Or => {
                let mut lower = 0;
                let mut upper_sum: DocCount = 0;
                let mut miss = 1.0;
                for child in &operands {
                    lower = child.lower.max(lower);
                    upper_sum += child.upper;
                    miss *= 1.0 - child.est as f64 / n;
                }
                Estimates::new(lower, (n * (1.0 - miss)) as DocCount, upper_sum)
            }
            EstimateType::Xor => {
                let mut upper_sum: DocCount = 0;
                let mut est_sum: DocCount = 0;
                for child in &operands {
                    upper_sum += child.upper;
                    est_sum += child.est;
                }
                Estimates::new(0, est_sum.min(db_size), upper_sum)
            }
            EstimateType::AndNot => {
                let l = operands[0];
                let r = operands[1];
                let keep = 1.0 - r.est as f64 / n;
                Estimates::new(
                    l.lower.saturating_sub(r.upper),
                    (l.est as f64 * keep) as DocCount,
                    l.upper,
                )
            }
            EstimateType::AndMaybe => operands[0],
            EstimateType::Synonym => operands[0],
            EstimateType::Near
            | EstimateType::Phrase
            | EstimateType::ExactPhrase
            | EstimateType::Decider => {
                let child = operands[0];
                let (accepted, rejected) = op
                    .counters
                    .as_ref()
                    .map(|c| c.counts())
                    .unwrap_or((0, 0));
                let tested = accepted as u64 + rejected as u64;
                let est = if tested > 0 {
                    (child.est as f64 * accepted as f64 / tested as f64) as DocCount
                } else {
                    child.est / untested_divisor(op.kind)
                };
                let lower = accepted as DocCount;
                let upper = child.upper.saturating_sub(rejected as DocCount);
                Estimates::new(lower, est.max(lower).min(upper), upper)
            }
        };
        values.push(result.clamped(db_size));
    }
    debug_assert!(values.len() == 1);
    values.pop().unwrap_or_default()
}

#[cfg(test)]
mod tests {

    use super::{resolve, EstimateOp, EstimateType, Estimates};
    use crate::select::SelectCounters;
    use std::sync::Arc;

    #[test]
    fn leaf_is_exact() {
        let stack = vec![EstimateOp::leaf(7)];
        assert_eq!(resolve(&stack, 100), Estimates::new(7, 7, 7));
    }

    #[test]
    fn and_multiplies_selectivities() {
        let stack = vec![
            EstimateOp::leaf(50),
            EstimateOp::leaf(20),
            EstimateOp::compose(EstimateType::And, 2),
        ];
        let est = resolve(&stack, 100);
        assert_eq!(est.est, 10);
        assert_eq!(est.upper, 20);
        assert_eq!(est.lower, 0);
    }

    #[test]
    fn or_complements_misses() {
        let stack = vec![
            EstimateOp::leaf(50),
            EstimateOp::leaf(20),
            EstimateOp::compose(EstimateType::Or, 2),
        ];
        let est = resolve(&stack, 100);
        assert_eq!(est.lower, 50);
        assert_eq!(est.est, 60);
        assert_eq!(est.upper, 70);
    }

    #[test]
    fn select_scales_by_observed_ratio() {
        let counters = Arc::new(SelectCounters::default());
        for _ in 0..3 {
            counters.accept();
        }
        counters.reject();
        let stack = vec![
            EstimateOp::leaf(40),
            EstimateOp::leaf(40),
            EstimateOp::compose(EstimateType::And, 2),
            EstimateOp::select(EstimateType::ExactPhrase, counters),
        ];
        let est = resolve(&stack, 100);
        // The AND estimates 16; three quarters of the tested docs passed.
        assert_eq!(est.est, 12);
        assert_eq!(est.lower, 3);
    }

    #[test]
    fn untested_select_falls_back_to_ratio() {
        let counters = Arc::new(SelectCounters::default());
        let stack = vec![
            EstimateOp::leaf(40),
            EstimateOp::select(EstimateType::ExactPhrase, counters),
        ];
        assert_eq!(resolve(&stack, 100).est, 10);
    }

    #[test]
    fn bounds_stay_ordered() {
        let stack = vec![
            EstimateOp::leaf(90),
            EstimateOp::leaf(80),
            EstimateOp::compose(EstimateType::And, 2),
        ];
        let est = resolve(&stack, 100);
        assert!(est.lower <= est.est);
        assert!(est.est <= est.upper);
        // 90 + 80 - 100 docs must match both.
        assert_eq!(est.lower, 70);
    }
}
