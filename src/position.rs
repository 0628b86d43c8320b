use crate::error::Error;
use crate::postlist::{TermCount, TermPos};

/// Lazy ordered sequence of in-document term positions.
///
/// `position` is only meaningful after `next` or `skip_to` has returned
/// `Some`. Cursors are handed out owned by the producing leaf and live for
/// the duration of one candidate document.
pub trait PositionList {
    /// Possibly-approximate number of positions, used as a cost hint.
    fn approx_size(&self) -> TermCount;

    /// The position the cursor is on.
    fn position(&self) -> TermPos;

    /// Advance to the next position, returning it, or `None` at the end.
    fn next_pos(&mut self) -> Result<Option<TermPos>, Error>;

    /// Advance to the first position `>= pos`, returning it, or `None` at
    /// the end. Never moves backwards.
    fn skip_to(&mut self, pos: TermPos) -> Result<Option<TermPos>, Error>;
}

/// Position list over an in-memory vector of ascending positions.
pub struct VecPositionList {
    positions: Vec<TermPos>,
    idx: usize,
    current: Option<TermPos>,
}

impl VecPositionList {
    pub fn new(positions: Vec<TermPos>) -> VecPositionList {
        VecPositionList {
            positions,
            idx: 0,
            current: None,
        }
    }
}

impl PositionList for VecPositionList {
    fn approx_size(&self) -> TermCount {
        self.positions.len() as TermCount
    }

    fn position(&self) -> TermPos {
        self.current.unwrap_or(0)
    }

    fn next_pos(&mut self) -> Result<Option<TermPos>, Error> {
        if self.idx >= self.positions.len() {
            self.current = None;
            return Ok(None);
        }
        self.current = Some(self.positions[self.idx]);
        self.idx += 1;
        Ok(self.current)
    }

    fn skip_to(&mut self, pos: TermPos) -> Result<Option<TermPos>, Error> {
        if let Some(current) = self.current {
            if current >= pos {
                return Ok(self.current);
            }
        }
        while self.idx < self.positions.len() && self.positions[self.idx] < pos {
            self.idx += 1;
        }
        self.next_pos()
    }
}

#[cfg(test)]
mod tests {

    use super::{PositionList, VecPositionList};

    #[test]
    fn next_walks_all_positions() {
        let mut pl = VecPositionList::new(vec![1, 4, 9]);
        assert_eq!(pl.next_pos().unwrap(), Some(1));
        assert_eq!(pl.next_pos().unwrap(), Some(4));
        assert_eq!(pl.position(), 4);
        assert_eq!(pl.next_pos().unwrap(), Some(9));
        assert_eq!(pl.next_pos().unwrap(), None);
    }

    #[test]
    fn skip_to_lands_on_first_geq() {
        let mut pl = VecPositionList::new(vec![1, 4, 9]);
        assert_eq!(pl.skip_to(2).unwrap(), Some(4));
        // Never moves backwards.
        assert_eq!(pl.skip_to(0).unwrap(), Some(4));
        assert_eq!(pl.skip_to(9).unwrap(), Some(9));
        assert_eq!(pl.skip_to(10).unwrap(), None);
    }

    #[test]
    fn skip_to_works_before_next() {
        let mut pl = VecPositionList::new(vec![3, 7]);
        assert_eq!(pl.skip_to(4).unwrap(), Some(7));
    }
}
