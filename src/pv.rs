use arrayvec::ArrayVec;

use crate::{chess::chessmove::Move, util::MAX_PLY};

/// A principal variation: the line the search currently believes best,
/// together with its score.
#[derive(Clone, Debug, Default)]
pub struct PVariation {
    pub score: i32,
    moves: ArrayVec<Move, MAX_PLY>,
}

impl PVariation {
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn clear(&mut self) {
        self.score = 0;
        self.moves.clear();
    }

    /// Splices `m` onto the front of the line found below us.
    pub fn load_from(&mut self, m: Move, rest: &Self) {
        self.moves.clear();
        self.moves.push(m);
        let room = self.moves.capacity() - 1;
        let take = rest.moves.len().min(room);
        self.moves
            .try_extend_from_slice(&rest.moves[..take])
            .expect("PV splice cannot overflow after clamping");
    }

    pub fn best_move(&self) -> Option<Move> {
        self.moves.first().copied()
    }

    pub fn ponder_move(&self) -> Option<Move> {
        self.moves.get(1).copied()
    }

    pub fn display(&self, chess960: bool) -> impl std::fmt::Display + '_ {
        PvDisplay {
            pv: self,
            chess960,
        }
    }
}

struct PvDisplay<'a> {
    pv: &'a PVariation,
    chess960: bool,
}

impl std::fmt::Display for PvDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, m) in self.pv.moves().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", m.display(self.chess960))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::types::Square;

    #[test]
    fn splice_prepends() {
        let mut tail = PVariation::default();
        tail.load_from(Move::new(Square::E7, Square::E5), &PVariation::default());
        let mut head = PVariation::default();
        head.load_from(Move::new(Square::E2, Square::E4), &tail);
        assert_eq!(
            head.moves(),
            [
                Move::new(Square::E2, Square::E4),
                Move::new(Square::E7, Square::E5)
            ]
        );
        assert_eq!(head.best_move(), Some(Move::new(Square::E2, Square::E4)));
        assert_eq!(head.ponder_move(), Some(Move::new(Square::E7, Square::E5)));
    }
}
