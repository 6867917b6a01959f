use std::{
    fmt::{Display, Formatter},
    ops::{Deref, DerefMut},
};

use arrayvec::ArrayVec;

use crate::chess::{
    attacks::{
        attacks_by_type, bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks,
        RAY_BETWEEN,
    },
    board::{Board, Undo},
    chessmove::Move,
    piece::{Colour, PieceType},
    squareset::SquareSet,
    types::Square,
};

pub const MAX_POSITION_MOVES: usize = 218;

const PROMOTIONS: [PieceType; 4] = [
    PieceType::Queen,
    PieceType::Knight,
    PieceType::Rook,
    PieceType::Bishop,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveListEntry {
    pub mov: Move,
    pub score: i32,
}

#[derive(Clone)]
pub struct MoveList {
    inner: ArrayVec<MoveListEntry, MAX_POSITION_MOVES>,
}

impl MoveList {
    pub fn new() -> Self {
        Self {
            inner: ArrayVec::new(),
        }
    }

    fn push(&mut self, m: Move) {
        self.inner.push(MoveListEntry { mov: m, score: 0 });
    }

    pub fn iter_moves(&self) -> impl Iterator<Item = &Move> {
        self.inner.iter().map(|e| &e.mov)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl Default for MoveList {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for MoveList {
    type Target = [MoveListEntry];

    fn deref(&self) -> &[MoveListEntry] {
        &self.inner
    }
}

impl DerefMut for MoveList {
    fn deref_mut(&mut self) -> &mut [MoveListEntry] {
        &mut self.inner
    }
}

impl Display for MoveList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MoveList: ({}) [", self.inner.len())?;
        for (i, entry) in self.inner.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", entry.mov.display(true))?;
        }
        write!(f, "]")
    }
}

impl Board {
    fn promo_rank(&self) -> SquareSet {
        match self.turn() {
            Colour::White => SquareSet::RANK_7,
            Colour::Black => SquareSet::RANK_2,
        }
    }

    fn push_offset(&self) -> i8 {
        match self.turn() {
            Colour::White => 8,
            Colour::Black => -8,
        }
    }

    fn shift_forward(&self, set: SquareSet) -> SquareSet {
        match self.turn() {
            Colour::White => set.north_one(),
            Colour::Black => set.south_one(),
        }
    }

    fn shift_backward(&self, set: SquareSet) -> SquareSet {
        match self.turn() {
            Colour::White => set.south_one(),
            Colour::Black => set.north_one(),
        }
    }

    /// Where pieces may land: the single checker (captures) and the
    /// squares that interpose the check line (quiets). With no checker
    /// everything is allowed; in double check only the king may move,
    /// handled by the callers.
    fn evasion_masks(&self) -> (SquareSet, SquareSet) {
        if self.in_check() {
            let checker = self
                .king_attackers()
                .first()
                .expect("in check without a checker");
            let king = self.king_sq(self.turn());
            (
                self.king_attackers(),
                RAY_BETWEEN[king.index()][checker.index()],
            )
        } else {
            (SquareSet::FULL, SquareSet::FULL)
        }
    }

    fn gen_pawn_captures(&self, list: &mut MoveList, capture_mask: SquareSet) {
        let us = self.turn();
        let our_pawns = self.piece_bb(PieceType::Pawn) & self.colour_bb(us);
        let targets = self.colour_bb(!us) & capture_mask;
        let promo_rank = self.promo_rank();

        for from in our_pawns {
            let attacks = pawn_attacks(from.as_set(), us) & targets;
            for to in attacks {
                if promo_rank.contains_square(from) {
                    for promo in PROMOTIONS {
                        list.push(Move::new_promotion(from, to, promo));
                    }
                } else {
                    list.push(Move::new(from, to));
                }
            }
        }
    }

    fn gen_en_passant(&self, list: &mut MoveList) {
        let Some(ep_sq) = self.ep_square() else {
            return;
        };
        let us = self.turn();
        let our_pawns = self.piece_bb(PieceType::Pawn) & self.colour_bb(us);
        // the pawns that could capture are the ones an enemy pawn on the
        // target square would attack.
        let capturers = pawn_attacks(ep_sq.as_set(), !us) & our_pawns;
        for from in capturers {
            list.push(Move::new_en_passant(from, ep_sq));
        }
    }

    fn gen_promotion_pushes(&self, list: &mut MoveList, quiet_mask: SquareSet) {
        let us = self.turn();
        let our_pawns = self.piece_bb(PieceType::Pawn) & self.colour_bb(us) & self.promo_rank();
        let empty = !self.occupied();
        let pushable = our_pawns & self.shift_backward(empty);

        for from in pushable {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
            let to = Square::new((from.signed_inner() + self.push_offset()) as u8)
                .expect("promotion push off the board");
            if quiet_mask.contains_square(to) {
                for promo in PROMOTIONS {
                    list.push(Move::new_promotion(from, to, promo));
                }
            }
        }
    }

    fn gen_pawn_pushes(&self, list: &mut MoveList, quiet_mask: SquareSet) {
        let us = self.turn();
        let start_rank = match us {
            Colour::White => SquareSet::RANK_2,
            Colour::Black => SquareSet::RANK_7,
        };
        let our_pawns = self.piece_bb(PieceType::Pawn) & self.colour_bb(us) & !self.promo_rank();
        let empty = !self.occupied();
        let pushable = our_pawns & self.shift_backward(empty);
        let double_pushable =
            pushable & start_rank & self.shift_backward(self.shift_backward(empty));
        let offset = self.push_offset();

        for from in pushable {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
            let to = Square::new((from.signed_inner() + offset) as u8).expect("push off the board");
            if quiet_mask.contains_square(to) {
                list.push(Move::new(from, to));
            }
        }
        for from in double_pushable {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
            let to =
                Square::new((from.signed_inner() + 2 * offset) as u8).expect("push off the board");
            if quiet_mask.contains_square(to) {
                list.push(Move::new(from, to));
            }
        }
    }

    fn gen_piece_moves(&self, list: &mut MoveList, target_mask: SquareSet) {
        let us = self.turn();
        let occupied = self.occupied();
        for pt in [
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Rook,
            PieceType::Queen,
        ] {
            for from in self.piece_bb(pt) & self.colour_bb(us) {
                let attacks = attacks_by_type(pt, from, occupied) & target_mask;
                for to in attacks {
                    list.push(Move::new(from, to));
                }
            }
        }
    }

    fn gen_king_moves(&self, list: &mut MoveList, target_mask: SquareSet) {
        let king = self.king_sq(self.turn());
        for to in king_attacks(king) & target_mask {
            list.push(Move::new(king, to));
        }
    }

    /// Castling moves, encoded king-takes-own-rook. One code path
    /// serves both standard chess and Fischer-random; legality of the
    /// final position is still settled by trial application.
    pub(crate) fn gen_castle_moves(&self, list: &mut MoveList) {
        if self.in_check() {
            return;
        }
        let us = self.turn();
        let them = !us;
        let king_from = self.king_sq(us);
        let occupied = self.occupied();

        for rook_from in self.castle_rooks() & self.colour_bb(us) {
            let king_to = Self::castle_king_to(king_from, rook_from);
            let rook_to = Self::castle_rook_to(king_from, rook_from);

            // every square either mover passes through or lands on must
            // be empty, apart from the two movers themselves.
            let path = RAY_BETWEEN[king_from.index()][king_to.index()]
                | RAY_BETWEEN[rook_from.index()][rook_to.index()]
                | king_to.as_set()
                | rook_to.as_set();
            let blockers = occupied ^ king_from.as_set() ^ rook_from.as_set();
            if (path & blockers).non_empty() {
                continue;
            }

            // the king may not pass through an attacked square.
            let transit = RAY_BETWEEN[king_from.index()][king_to.index()] | king_to.as_set();
            if transit.into_iter().any(|sq| self.attacked_by(sq, them)) {
                continue;
            }

            list.push(Move::new_castle(king_from, rook_from));
        }
    }

    /// Captures, en passant, and promotions. All promotions count as
    /// noisy, underpromotions included.
    pub fn gen_noisy(&self, list: &mut MoveList) {
        let us = self.turn();

        if self.king_attackers().many() {
            // double check: king captures only.
            self.gen_king_moves(list, self.colour_bb(!us));
            return;
        }

        let (capture_mask, quiet_mask) = self.evasion_masks();

        self.gen_pawn_captures(list, capture_mask);
        self.gen_en_passant(list);
        self.gen_promotion_pushes(list, quiet_mask & !self.occupied());
        self.gen_piece_moves(list, self.colour_bb(!us) & capture_mask);
        self.gen_king_moves(list, self.colour_bb(!us));
    }

    /// Non-capturing, non-promoting moves, castling included.
    pub fn gen_quiet(&self, list: &mut MoveList) {
        if self.king_attackers().many() {
            // double check: king retreats only.
            self.gen_king_moves(list, !self.occupied());
            return;
        }

        let (_, quiet_mask) = self.evasion_masks();
        let empty = !self.occupied();

        self.gen_castle_moves(list);
        self.gen_pawn_pushes(list, quiet_mask & empty);
        self.gen_piece_moves(list, quiet_mask & empty);
        self.gen_king_moves(list, empty);
    }

    /// Quiet moves by minor and major pieces that give direct check.
    /// Used at the frontier of quiescence; discovered checks are not
    /// searched for.
    pub fn gen_quiet_checks(&self, list: &mut MoveList) {
        debug_assert!(!self.in_check());
        let us = self.turn();
        let occupied = self.occupied();
        let empty = !occupied;
        let their_king = self.king_sq(!us);

        for pt in [
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Rook,
            PieceType::Queen,
        ] {
            let check_squares = match pt {
                PieceType::Knight => knight_attacks(their_king),
                PieceType::Bishop => bishop_attacks(their_king, occupied),
                PieceType::Rook => rook_attacks(their_king, occupied),
                _ => bishop_attacks(their_king, occupied) | rook_attacks(their_king, occupied),
            };
            for from in self.piece_bb(pt) & self.colour_bb(us) {
                let targets = attacks_by_type(pt, from, occupied) & empty & check_squares;
                for to in targets {
                    list.push(Move::new(from, to));
                }
            }
        }
    }

    /// The fully legal move list, produced by trial application. Slow;
    /// for protocol plumbing and tests, not the search path.
    pub fn gen_legal(&mut self) -> ArrayVec<Move, MAX_POSITION_MOVES> {
        let mut pseudo = MoveList::new();
        self.gen_noisy(&mut pseudo);
        self.gen_quiet(&mut pseudo);

        let mut legal = ArrayVec::new();
        let mut undo = Undo::default();
        for i in 0..pseudo.len() {
            let m = pseudo[i].mov;
            self.apply_move(m, &mut undo);
            if self.move_was_legal() {
                legal.push(m);
            }
            self.revert_move(m, &undo);
        }
        legal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::types::Square;

    #[test]
    fn twenty_legal_opening_moves() {
        let mut board = Board::startpos();
        let legal = board.gen_legal();
        assert_eq!(legal.len(), 20);
    }

    #[test]
    fn staged_generation_covers_all_moves() {
        let fens = [
            Board::STARTING_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        ];
        for fen in fens {
            let board = Board::from_fen(fen, false).unwrap();
            let mut noisy = MoveList::new();
            let mut quiet = MoveList::new();
            board.gen_noisy(&mut noisy);
            board.gen_quiet(&mut quiet);
            // the two stages are disjoint...
            for m in noisy.iter_moves() {
                assert!(
                    quiet.iter_moves().all(|q| q != m),
                    "{m:?} generated by both stages in {fen}"
                );
            }
            // ...and noisy really is noisy.
            for &m in noisy.iter_moves() {
                assert!(
                    board.piece_at(m.to()).is_some() || m.is_en_passant() || m.is_promotion(),
                    "{m:?} is not noisy in {fen}"
                );
            }
        }
    }

    #[test]
    fn evasions_resolve_check() {
        // black knight on f3 gives check; every generated evasion must
        // be verified legal by trial application.
        let mut board =
            Board::from_fen("rnbqkb1r/pppppppp/8/8/8/5n2/PPPPP1PP/RNBQKBNR w KQkq - 0 1", false)
                .unwrap();
        assert!(board.in_check());
        let legal = board.gen_legal();
        assert!(!legal.is_empty());
        let mut undo = Undo::default();
        for &m in &legal {
            board.apply_move(m, &mut undo);
            assert!(board.move_was_legal());
            board.revert_move(m, &undo);
        }
    }

    #[test]
    fn double_check_forces_the_king() {
        // rook and bishop both attack the black king.
        let mut board =
            Board::from_fen("4k3/8/8/1B6/8/8/8/4R1K1 b - - 0 1", false).unwrap();
        assert!(board.king_attackers().many());
        let legal = board.gen_legal();
        assert!(!legal.is_empty());
        for &m in &legal {
            assert_eq!(m.from(), Square::E8, "{m:?} does not move the king");
        }
    }

    #[test]
    fn castling_through_attack_is_not_generated() {
        // black rook on f8 covers f1: white may not castle kingside,
        // but queenside is fine.
        let board =
            Board::from_fen("1k3r2/8/8/8/8/8/8/R3K2R w KQ - 0 1", false).unwrap();
        let mut list = MoveList::new();
        board.gen_castle_moves(&mut list);
        let castles: Vec<Move> = list.iter_moves().copied().collect();
        assert_eq!(castles, vec![Move::new_castle(Square::E1, Square::A1)]);
    }

    #[test]
    fn blocked_castling_is_not_generated() {
        let board = Board::startpos();
        let mut list = MoveList::new();
        board.gen_castle_moves(&mut list);
        assert!(list.is_empty());
    }

    #[test]
    fn frc_castling_encoding() {
        // rooks on c8 and h8 with the king on e8, Shredder-FEN rights.
        let mut board =
            Board::from_fen("2r1k2r/8/8/8/8/8/8/4K3 b ch - 0 1", false).unwrap();
        assert!(board.chess960());
        let legal = board.gen_legal();
        let castles: Vec<Move> = legal.iter().copied().filter(|m| m.is_castle()).collect();
        assert!(castles.contains(&Move::new_castle(Square::E8, Square::H8)));
        assert!(castles.contains(&Move::new_castle(Square::E8, Square::C8)));
    }

    #[test]
    fn quiet_checks_give_check() {
        let board =
            Board::from_fen("4k3/8/8/8/8/8/3N4/R3K3 w - - 0 1", false).unwrap();
        let mut list = MoveList::new();
        board.gen_quiet_checks(&mut list);
        assert!(!list.is_empty());
        let mut scratch = board.clone();
        let mut undo = Undo::default();
        for i in 0..list.len() {
            let m = list[i].mov;
            scratch.apply_move(m, &mut undo);
            assert!(
                scratch.in_check(),
                "{m:?} was generated as a quiet check but gives none"
            );
            assert!(undo.captured().is_none(), "{m:?} is not quiet");
            scratch.revert_move(m, &undo);
        }
    }

    #[test]
    fn en_passant_is_generated() {
        let board =
            Board::from_fen("rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 3", false)
                .unwrap();
        let mut list = MoveList::new();
        board.gen_noisy(&mut list);
        assert!(list
            .iter_moves()
            .any(|&m| m == Move::new_en_passant(Square::D4, Square::E3)));
    }
}
