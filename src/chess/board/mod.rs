pub mod movegen;

use std::fmt::{self, Debug, Display, Formatter};

use crate::{
    chess::{
        attacks::{
            bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks, RAY_BETWEEN,
        },
        chessmove::{Move, MoveKind},
        piece::{Colour, Piece, PieceType},
        squareset::SquareSet,
        types::{File, Rank, Square},
        zobrist::{CASTLE_KEYS, EP_KEYS, PIECE_KEYS, SIDE_KEY},
    },
    errors::FenParseError,
    piecesquaretable::{psqt_value, S},
};

use self::movegen::MoveList;

/// Positions remembered for repetition detection. The ring is reset
/// whenever the halfmove clock zeroes, which keeps `num_moves` well
/// below this bound for any reachable game.
const HISTORY_SIZE: usize = 512;

/// Everything needed to reverse one move exactly.
#[derive(Clone, Copy, Default)]
pub struct Undo {
    hash: u64,
    pkhash: u64,
    king_attackers: SquareSet,
    castle_rooks: SquareSet,
    ep_square: Option<Square>,
    halfmove_clock: u16,
    psqtmat: S,
    captured: Option<Piece>,
}

impl Undo {
    #[cfg(test)]
    pub const fn captured(&self) -> Option<Piece> {
        self.captured
    }
}

#[derive(Clone)]
pub struct Board {
    /// One squareset per piece type, colour-agnostic.
    pieces: [SquareSet; 6],
    /// Occupancy per side.
    colours: [SquareSet; 2],
    /// Mailbox mirror of the squaresets.
    squares: [Option<Piece>; 64],
    turn: Colour,
    ep_square: Option<Square>,
    halfmove_clock: u16,
    fullmove_number: u16,
    /// The rooks that may still castle, for either side. Works for both
    /// standard and Fischer-random start positions.
    castle_rooks: SquareSet,
    /// Per-square masks ANDed into `castle_rooks` whenever a move
    /// touches the square; they erase rights when a rook or king square
    /// is disturbed.
    castle_masks: [SquareSet; 64],
    hash: u64,
    /// Zobrist over the pawn + king configuration only.
    pkhash: u64,
    /// Running material + piece-square total, both phases.
    psqtmat: S,
    /// Opposing pieces currently attacking the side-to-move's king.
    king_attackers: SquareSet,
    history: [u64; HISTORY_SIZE],
    num_moves: usize,
    chess960: bool,
}

impl Board {
    pub const STARTING_FEN: &'static str =
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn empty() -> Self {
        Self {
            pieces: [SquareSet::EMPTY; 6],
            colours: [SquareSet::EMPTY; 2],
            squares: [None; 64],
            turn: Colour::White,
            ep_square: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            castle_rooks: SquareSet::EMPTY,
            castle_masks: [SquareSet::FULL; 64],
            hash: 0,
            pkhash: 0,
            psqtmat: S::NULL,
            king_attackers: SquareSet::EMPTY,
            history: [0; HISTORY_SIZE],
            num_moves: 0,
            chess960: false,
        }
    }

    pub fn startpos() -> Self {
        Self::from_fen(Self::STARTING_FEN, false).expect("STARTING_FEN is broken")
    }

    pub const fn turn(&self) -> Colour {
        self.turn
    }

    pub const fn ep_square(&self) -> Option<Square> {
        self.ep_square
    }

    pub const fn halfmove_clock(&self) -> u16 {
        self.halfmove_clock
    }

    pub const fn fullmove_number(&self) -> u16 {
        self.fullmove_number
    }

    pub const fn hash(&self) -> u64 {
        self.hash
    }

    pub const fn pkhash(&self) -> u64 {
        self.pkhash
    }

    pub const fn psqtmat(&self) -> S {
        self.psqtmat
    }

    pub const fn king_attackers(&self) -> SquareSet {
        self.king_attackers
    }

    pub const fn in_check(&self) -> bool {
        self.king_attackers.non_empty()
    }

    pub const fn chess960(&self) -> bool {
        self.chess960
    }

    pub const fn castle_rooks(&self) -> SquareSet {
        self.castle_rooks
    }

    pub const fn piece_bb(&self, pt: PieceType) -> SquareSet {
        self.pieces[pt as usize]
    }

    pub const fn colour_bb(&self, colour: Colour) -> SquareSet {
        self.colours[colour as usize]
    }

    pub fn occupied(&self) -> SquareSet {
        self.colours[Colour::White] | self.colours[Colour::Black]
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.squares[sq]
    }

    pub fn king_sq(&self, colour: Colour) -> Square {
        (self.pieces[PieceType::King] & self.colours[colour])
            .first()
            .expect("side has no king")
    }

    /// Any position reached through `position … moves` starts a fresh
    /// repetition window here.
    pub fn reset_hash_history(&mut self) {
        self.num_moves = 0;
    }

    // raw placement, no key bookkeeping; used by revert paths where the
    // keys are restored wholesale from the undo record.
    fn place(&mut self, piece: Piece, sq: Square) {
        self.pieces[piece.piece_type()] = self.pieces[piece.piece_type()].add_square(sq);
        self.colours[piece.colour()] = self.colours[piece.colour()].add_square(sq);
        self.squares[sq] = Some(piece);
    }

    fn remove(&mut self, piece: Piece, sq: Square) {
        self.pieces[piece.piece_type()] = self.pieces[piece.piece_type()].remove_square(sq);
        self.colours[piece.colour()] = self.colours[piece.colour()].remove_square(sq);
        self.squares[sq] = None;
    }

    // incremental placement: keys and the phased score follow along.
    fn set_square(&mut self, piece: Piece, sq: Square) {
        self.place(piece, sq);
        self.psqtmat += psqt_value(piece, sq);
        let key = PIECE_KEYS[piece.index()][sq.index()];
        self.hash ^= key;
        if matches!(piece.piece_type(), PieceType::Pawn | PieceType::King) {
            self.pkhash ^= key;
        }
    }

    fn clear_square(&mut self, piece: Piece, sq: Square) {
        self.remove(piece, sq);
        self.psqtmat -= psqt_value(piece, sq);
        let key = PIECE_KEYS[piece.index()][sq.index()];
        self.hash ^= key;
        if matches!(piece.piece_type(), PieceType::Pawn | PieceType::King) {
            self.pkhash ^= key;
        }
    }

    fn move_piece(&mut self, piece: Piece, from: Square, to: Square) {
        self.clear_square(piece, from);
        self.set_square(piece, to);
    }

    /// All pieces of either colour that attack `sq` under the given
    /// occupancy.
    pub fn attackers_to(&self, sq: Square, occupied: SquareSet) -> SquareSet {
        let sq_set = sq.as_set();
        let pawns = self.pieces[PieceType::Pawn];
        let white_pawn_attackers =
            pawn_attacks(sq_set, Colour::Black) & pawns & self.colours[Colour::White];
        let black_pawn_attackers =
            pawn_attacks(sq_set, Colour::White) & pawns & self.colours[Colour::Black];
        let diag = self.pieces[PieceType::Bishop] | self.pieces[PieceType::Queen];
        let ortho = self.pieces[PieceType::Rook] | self.pieces[PieceType::Queen];
        white_pawn_attackers
            | black_pawn_attackers
            | (knight_attacks(sq) & self.pieces[PieceType::Knight])
            | (king_attacks(sq) & self.pieces[PieceType::King])
            | (bishop_attacks(sq, occupied) & diag)
            | (rook_attacks(sq, occupied) & ortho)
    }

    pub fn attacked_by(&self, sq: Square, by: Colour) -> bool {
        (self.attackers_to(sq, self.occupied()) & self.colours[by]).non_empty()
    }

    fn compute_king_attackers(&self) -> SquareSet {
        self.attackers_to(self.king_sq(self.turn), self.occupied()) & self.colours[!self.turn]
    }

    fn castle_key_delta(diff: SquareSet) -> u64 {
        let mut delta = 0;
        for sq in diff {
            delta ^= CASTLE_KEYS[sq.index()];
        }
        delta
    }

    /// Where the king lands for a castle encoded king-from / rook-from.
    pub fn castle_king_to(king: Square, rook: Square) -> Square {
        let file = if rook > king { File::G } else { File::C };
        Square::from_rank_file(king.rank(), file)
    }

    /// Where the rook lands for a castle encoded king-from / rook-from.
    pub fn castle_rook_to(king: Square, rook: Square) -> Square {
        let file = if rook > king { File::F } else { File::D };
        Square::from_rank_file(king.rank(), file)
    }

    fn update_castle_rights(&mut self, from: Square, to: Square) {
        let new_rooks = self.castle_rooks & self.castle_masks[from] & self.castle_masks[to];
        self.hash ^= Self::castle_key_delta(self.castle_rooks ^ new_rooks);
        self.castle_rooks = new_rooks;
    }

    fn clear_ep_square(&mut self) {
        if let Some(ep) = self.ep_square {
            self.hash ^= EP_KEYS[ep.file() as usize];
            self.ep_square = None;
        }
    }

    /// Double pawn pushes only set the en-passant square when an enemy
    /// pawn stands ready to capture; keys stay comparable across move
    /// orders that way.
    fn set_ep_square(&mut self, behind: Square, to: Square) {
        let mover = !self.turn; // caller flips the side before the ep bookkeeping
        let adjacent = to.as_set().east_one() | to.as_set().west_one();
        if (adjacent & self.pieces[PieceType::Pawn] & self.colours[!mover]).non_empty() {
            self.ep_square = Some(behind);
            self.hash ^= EP_KEYS[behind.file() as usize];
        }
    }

    fn flip_turn(&mut self) {
        self.turn = !self.turn;
        self.hash ^= SIDE_KEY;
        if self.turn == Colour::White {
            self.fullmove_number += 1;
        }
    }

    fn unflip_turn(&mut self) {
        if self.turn == Colour::White {
            self.fullmove_number -= 1;
        }
        self.turn = !self.turn;
    }

    fn push_history(&mut self) {
        debug_assert!(self.num_moves < HISTORY_SIZE);
        self.history[self.num_moves] = self.hash;
        self.num_moves += 1;
    }

    fn save_undo(&self, undo: &mut Undo) {
        undo.hash = self.hash;
        undo.pkhash = self.pkhash;
        undo.king_attackers = self.king_attackers;
        undo.castle_rooks = self.castle_rooks;
        undo.ep_square = self.ep_square;
        undo.halfmove_clock = self.halfmove_clock;
        undo.psqtmat = self.psqtmat;
        undo.captured = None;
    }

    /// Plays a pseudo-legal move. The caller must test `move_was_legal`
    /// afterwards and revert if it fails.
    pub fn apply_move(&mut self, m: Move, undo: &mut Undo) {
        self.save_undo(undo);
        self.push_history();

        match m.kind() {
            MoveKind::Normal => self.apply_normal_move(m, undo),
            MoveKind::Castle => self.apply_castle_move(m),
            MoveKind::EnPassant => self.apply_en_passant_move(m, undo),
            MoveKind::Promotion => self.apply_promotion_move(m, undo),
        }

        self.king_attackers = self.compute_king_attackers();

        #[cfg(debug_assertions)]
        self.check_validity();
    }

    fn apply_normal_move(&mut self, m: Move, undo: &mut Undo) {
        let from = m.from();
        let to = m.to();
        let piece = self.squares[from].expect("no piece on from-square");
        let captured = self.squares[to];

        if piece.piece_type() == PieceType::Pawn || captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }

        if let Some(captured) = captured {
            debug_assert_ne!(captured.colour(), self.turn);
            self.clear_square(captured, to);
            undo.captured = Some(captured);
        }

        self.move_piece(piece, from, to);
        self.update_castle_rights(from, to);
        self.clear_ep_square();
        self.flip_turn();

        if piece.piece_type() == PieceType::Pawn && from.inner().abs_diff(to.inner()) == 16 {
            let behind = Square::new((from.inner() + to.inner()) / 2).expect("midpoint on board");
            self.set_ep_square(behind, to);
        }
    }

    fn apply_castle_move(&mut self, m: Move) {
        let king_from = m.from();
        let rook_from = m.to();
        let king = self.squares[king_from].expect("no king on from-square");
        let rook = self.squares[rook_from].expect("no rook on castle square");
        let king_to = Self::castle_king_to(king_from, rook_from);
        let rook_to = Self::castle_rook_to(king_from, rook_from);

        self.halfmove_clock += 1;

        // clear both before placing either; the destinations may alias
        // the sources in Fischer-random positions.
        self.clear_square(king, king_from);
        self.clear_square(rook, rook_from);
        self.set_square(king, king_to);
        self.set_square(rook, rook_to);

        self.update_castle_rights(king_from, king_from);
        self.clear_ep_square();
        self.flip_turn();
    }

    fn apply_en_passant_move(&mut self, m: Move, undo: &mut Undo) {
        let from = m.from();
        let to = m.to();
        let piece = self.squares[from].expect("no pawn on from-square");
        let cap_sq = match self.turn {
            Colour::White => to.sub(8),
            Colour::Black => to.add(8),
        }
        .expect("en passant capture square off the board");
        let victim = Piece::new(!self.turn, PieceType::Pawn);

        self.halfmove_clock = 0;
        self.clear_square(victim, cap_sq);
        undo.captured = Some(victim);
        self.move_piece(piece, from, to);
        self.clear_ep_square();
        self.flip_turn();
    }

    fn apply_promotion_move(&mut self, m: Move, undo: &mut Undo) {
        let from = m.from();
        let to = m.to();
        let pawn = self.squares[from].expect("no pawn on from-square");
        let captured = self.squares[to];
        let promo = Piece::new(
            self.turn,
            m.promotion_type().expect("promotion move without piece"),
        );

        self.halfmove_clock = 0;

        if let Some(captured) = captured {
            self.clear_square(captured, to);
            undo.captured = Some(captured);
        }

        self.clear_square(pawn, from);
        self.set_square(promo, to);
        self.update_castle_rights(from, to);
        self.clear_ep_square();
        self.flip_turn();
    }

    /// Restores the position exactly as it was before `apply_move`.
    pub fn revert_move(&mut self, m: Move, undo: &Undo) {
        self.num_moves -= 1;
        self.unflip_turn();

        let from = m.from();
        let to = m.to();

        match m.kind() {
            MoveKind::Normal => {
                let piece = self.squares[to].expect("no piece on to-square");
                self.remove(piece, to);
                self.place(piece, from);
                if let Some(captured) = undo.captured {
                    self.place(captured, to);
                }
            }
            MoveKind::Castle => {
                let king_to = Self::castle_king_to(from, to);
                let rook_to = Self::castle_rook_to(from, to);
                let king = self.squares[king_to].expect("no king on castle destination");
                let rook = self.squares[rook_to].expect("no rook on castle destination");
                self.remove(king, king_to);
                self.remove(rook, rook_to);
                self.place(king, from);
                self.place(rook, to);
            }
            MoveKind::EnPassant => {
                let piece = self.squares[to].expect("no pawn on to-square");
                self.remove(piece, to);
                self.place(piece, from);
                let cap_sq = match self.turn {
                    Colour::White => to.sub(8),
                    Colour::Black => to.add(8),
                }
                .expect("en passant capture square off the board");
                self.place(undo.captured.expect("en passant without victim"), cap_sq);
            }
            MoveKind::Promotion => {
                let promo = self.squares[to].expect("no piece on to-square");
                self.remove(promo, to);
                self.place(Piece::new(self.turn, PieceType::Pawn), from);
                if let Some(captured) = undo.captured {
                    self.place(captured, to);
                }
            }
        }

        self.hash = undo.hash;
        self.pkhash = undo.pkhash;
        self.king_attackers = undo.king_attackers;
        self.castle_rooks = undo.castle_rooks;
        self.ep_square = undo.ep_square;
        self.halfmove_clock = undo.halfmove_clock;
        self.psqtmat = undo.psqtmat;

        #[cfg(debug_assertions)]
        self.check_validity();
    }

    /// Passes the turn. Only meaningful when the mover is not in check.
    pub fn apply_null_move(&mut self, undo: &mut Undo) {
        debug_assert!(!self.in_check());
        self.save_undo(undo);
        self.push_history();

        self.halfmove_clock += 1;
        self.clear_ep_square();
        self.flip_turn();
        self.king_attackers = self.compute_king_attackers();
    }

    pub fn revert_null_move(&mut self, undo: &Undo) {
        self.num_moves -= 1;
        self.unflip_turn();
        self.hash = undo.hash;
        self.pkhash = undo.pkhash;
        self.king_attackers = undo.king_attackers;
        self.castle_rooks = undo.castle_rooks;
        self.ep_square = undo.ep_square;
        self.halfmove_clock = undo.halfmove_clock;
        self.psqtmat = undo.psqtmat;
    }

    /// After a pseudo-legal `apply_move`: did the mover leave their own
    /// king en prise?
    pub fn move_was_legal(&self) -> bool {
        let mover = !self.turn;
        !self.attacked_by(self.king_sq(mover), self.turn)
    }

    /// Cheap structural test for moves pulled out of the transposition
    /// table or the heuristic tables, which may be stale or torn. A move
    /// passing this check can be applied safely; full legality is still
    /// settled by `move_was_legal`.
    pub fn is_pseudo_legal(&self, m: Move) -> bool {
        if m == Move::NONE || m == Move::NULL {
            return false;
        }

        let from = m.from();
        let to = m.to();
        let Some(piece) = self.squares[from] else {
            return false;
        };
        if piece.colour() != self.turn {
            return false;
        }

        if m.is_castle() {
            return self.is_pseudo_legal_castle(m);
        }

        // non-king movers under check must capture the checker or block
        // the line; generation obeys the same constraint.
        if self.in_check() && piece.piece_type() != PieceType::King {
            if self.king_attackers.many() {
                return false;
            }
            if !m.is_en_passant() {
                let checker = self.king_attackers.first().expect("in check without checker");
                let king = self.king_sq(self.turn);
                let block_or_capture =
                    RAY_BETWEEN[king.index()][checker.index()] | self.king_attackers;
                if !block_or_capture.contains_square(to) {
                    return false;
                }
            }
        }

        let captured = self.squares[to];
        if captured.is_some_and(|cap| cap.colour() == self.turn) {
            return false;
        }

        if piece.piece_type() == PieceType::Pawn {
            let last_rank = match self.turn {
                Colour::White => Rank::Eight,
                Colour::Black => Rank::One,
            };
            if (to.rank() == last_rank) != m.is_promotion() {
                return false;
            }
            if m.is_en_passant() {
                return Some(to) == self.ep_square
                    && pawn_attacks(from.as_set(), self.turn).contains_square(to);
            }
            if captured.is_some() {
                return pawn_attacks(from.as_set(), self.turn).contains_square(to);
            }
            let Some(one_up) = from.pawn_push(self.turn) else {
                return false;
            };
            if to == one_up {
                return self.squares[one_up].is_none();
            }
            let start_rank = match self.turn {
                Colour::White => Rank::Two,
                Colour::Black => Rank::Seven,
            };
            return from.rank() == start_rank
                && Some(to) == one_up.pawn_push(self.turn)
                && self.squares[one_up].is_none()
                && self.squares[to].is_none();
        }

        if m.is_en_passant() || m.is_promotion() {
            return false;
        }

        crate::chess::attacks::attacks_by_type(piece.piece_type(), from, self.occupied())
            .contains_square(to)
    }

    fn is_pseudo_legal_castle(&self, m: Move) -> bool {
        let mut castles = MoveList::new();
        self.gen_castle_moves(&mut castles);
        let found = castles.iter_moves().any(|&c| c == m);
        found
    }

    /// Does this move capture something in the current position?
    /// Castling is king-takes-own-rook and never a capture.
    pub fn is_capture(&self, m: Move) -> bool {
        !m.is_castle() && self.squares[m.to()].is_some()
    }

    /// Captures, promotions, and en passant all disturb material.
    pub fn is_tactical(&self, m: Move) -> bool {
        m.is_promotion() || m.is_en_passant() || self.is_capture(m)
    }

    /// Drawn by rule at this search height?
    ///
    /// The fifty-move rule does not fire when the halfmove counter runs
    /// out on a checkmate: mate is detected first and wins.
    pub fn is_drawn(&self, height: usize) -> bool {
        self.drawn_by_fifty_move_rule()
            || self.drawn_by_repetition(height)
            || self.drawn_by_insufficient_material()
    }

    fn drawn_by_fifty_move_rule(&self) -> bool {
        if self.halfmove_clock <= 99 {
            return false;
        }
        if self.in_check() {
            // mate before the clock: scan for any legal evasion.
            let mut scratch = self.clone();
            if scratch.gen_legal().is_empty() {
                return false;
            }
        }
        true
    }

    /// Twofold repetition above the search root, or threefold overall.
    /// Scans same-side positions back to the last zeroing move.
    pub fn drawn_by_repetition(&self, height: usize) -> bool {
        #![allow(clippy::cast_possible_wrap)]
        let num_moves = self.num_moves as isize;
        let mut reps = 0;

        let mut i = num_moves - 2;
        while i >= 0 {
            if i < num_moves - self.halfmove_clock as isize {
                break;
            }
            if self.history[i as usize] == self.hash {
                if i > num_moves - height as isize {
                    return true;
                }
                reps += 1;
                if reps == 2 {
                    return true;
                }
            }
            i -= 2;
        }

        false
    }

    /// KvK, KvN, KvB, and KvNN.
    fn drawn_by_insufficient_material(&self) -> bool {
        let heavy = self.pieces[PieceType::Pawn]
            | self.pieces[PieceType::Rook]
            | self.pieces[PieceType::Queen];
        let minors = self.pieces[PieceType::Knight] | self.pieces[PieceType::Bishop];
        heavy.is_empty()
            && (!self.colours[Colour::White].many() || !self.colours[Colour::Black].many())
            && (!minors.many()
                || (self.pieces[PieceType::Bishop].is_empty()
                    && self.pieces[PieceType::Knight].count() <= 2))
    }

    pub fn has_non_pawn_material(&self, colour: Colour) -> bool {
        let friendly = self.colours[colour];
        let pk = self.pieces[PieceType::King] | self.pieces[PieceType::Pawn];
        friendly & pk != friendly
    }

    /// Node count to fixed depth; the move generator's ground truth.
    pub fn perft(&mut self, depth: u32) -> u64 {
        if depth == 0 {
            return 1;
        }

        let mut list = MoveList::new();
        self.gen_noisy(&mut list);
        self.gen_quiet(&mut list);

        let mut nodes = 0;
        let mut undo = Undo::default();
        for i in 0..list.len() {
            let m = list[i].mov;
            self.apply_move(m, &mut undo);
            if self.move_was_legal() {
                nodes += self.perft(depth - 1);
            }
            self.revert_move(m, &undo);
        }

        nodes
    }

    pub fn from_fen(fen: &str, chess960: bool) -> Result<Self, FenParseError> {
        let mut board = Self::empty();
        let mut parts = fen.split_ascii_whitespace();

        // piece placement
        let placement = parts.next().ok_or(FenParseError::MissingBoard)?;
        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(FenParseError::BoardRanks(ranks.len()));
        }
        for (rank_str, rank) in ranks.iter().zip(Rank::all().rev()) {
            let mut file = 0u8;
            for ch in rank_str.chars() {
                if let Some(skip) = ch.to_digit(10) {
                    file += skip as u8;
                } else {
                    let piece =
                        Piece::from_char(ch).ok_or(FenParseError::UnexpectedCharacter(ch))?;
                    let file_enum = File::from_index(file)
                        .ok_or_else(|| FenParseError::BadSquaresInRank((*rank_str).to_string()))?;
                    board.set_square(piece, Square::from_rank_file(rank, file_enum));
                    file += 1;
                }
            }
            if file != 8 {
                return Err(FenParseError::BadSquaresInRank((*rank_str).to_string()));
            }
        }

        for colour in Colour::all() {
            let name = if colour == Colour::White { "white" } else { "black" };
            let kings = board.pieces[PieceType::King] & board.colours[colour];
            if kings.is_empty() {
                return Err(FenParseError::MissingKing(name));
            }
            if kings.many() {
                return Err(FenParseError::TooManyKings(name));
            }
        }

        // side to move
        let side = parts.next().ok_or(FenParseError::MissingSide)?;
        board.turn = match side {
            "w" => Colour::White,
            "b" => Colour::Black,
            other => return Err(FenParseError::InvalidSide(other.to_string())),
        };
        if board.turn == Colour::Black {
            board.hash ^= SIDE_KEY;
        }

        // castling rights: X-FEN/Shredder-FEN letters name rook files
        let castling = parts.next().ok_or(FenParseError::MissingCastling)?;
        let rooks = board.pieces[PieceType::Rook];
        let white_rooks = rooks & board.colours[Colour::White] & SquareSet::RANK_1;
        let black_rooks = rooks & board.colours[Colour::Black] & SquareSet::RANK_8;
        if castling != "-" {
            for ch in castling.chars() {
                let rook_sq = match ch {
                    'K' => white_rooks.last(),
                    'Q' => white_rooks.first(),
                    'k' => black_rooks.last(),
                    'q' => black_rooks.first(),
                    'A'..='H' => {
                        let file = File::from_index(ch as u8 - b'A').unwrap();
                        let sq = Square::from_rank_file(Rank::One, file);
                        white_rooks.contains_square(sq).then_some(sq)
                    }
                    'a'..='h' => {
                        let file = File::from_index(ch as u8 - b'a').unwrap();
                        let sq = Square::from_rank_file(Rank::Eight, file);
                        black_rooks.contains_square(sq).then_some(sq)
                    }
                    other => return Err(FenParseError::InvalidCastling(other)),
                };
                let rook_sq = rook_sq.ok_or(FenParseError::CastlingWithoutRook(ch))?;
                board.castle_rooks = board.castle_rooks.add_square(rook_sq);
            }
        }

        for sq in Square::all() {
            let mut mask = SquareSet::FULL;
            if board.castle_rooks.contains_square(sq) {
                mask = mask.remove_square(sq);
            }
            for colour in Colour::all() {
                if (board.pieces[PieceType::King] & board.colours[colour]).contains_square(sq) {
                    mask = mask & !(board.castle_rooks & board.colours[colour]);
                }
            }
            board.castle_masks[sq] = mask;
        }

        board.hash ^= Self::castle_key_delta(board.castle_rooks);

        // en passant square
        let ep = parts.next().ok_or(FenParseError::MissingEnPassant)?;
        if ep != "-" {
            let sq: Square = ep
                .parse()
                .map_err(|_| FenParseError::InvalidEnPassant(ep.to_string()))?;
            if !matches!(sq.rank(), Rank::Three | Rank::Six) {
                return Err(FenParseError::InvalidEnPassant(ep.to_string()));
            }
            // only record the square when a capture is actually on.
            let capturers =
                pawn_attacks(sq.as_set(), !board.turn) & board.pieces[PieceType::Pawn]
                    & board.colours[board.turn];
            if capturers.non_empty() {
                board.ep_square = Some(sq);
                board.hash ^= EP_KEYS[sq.file() as usize];
            }
        }

        // halfmove clock and fullmove number
        board.halfmove_clock = match parts.next() {
            Some(token) => token
                .parse()
                .map_err(|_| FenParseError::InvalidHalfmoveClock(token.to_string()))?,
            None => 0,
        };
        board.fullmove_number = match parts.next() {
            Some(token) => token
                .parse()
                .map_err(|_| FenParseError::InvalidFullmoveNumber(token.to_string()))?,
            None => 1,
        };

        if board.attacked_by(board.king_sq(!board.turn), board.turn) {
            return Err(FenParseError::WaitingKingCapturable);
        }

        board.king_attackers = board.compute_king_attackers();
        board.num_moves = 0;

        // Fischer-random is auto-detected from unconventional rook
        // squares, so FRC positions can appear in the bench suite
        // without the option being set.
        board.chess960 = chess960 || (board.castle_rooks & !SquareSet::CORNERS).non_empty();

        Ok(board)
    }

    /// Recomputation of every incrementally-maintained field, compared
    /// against the maintained values. Any divergence is a bug.
    #[cfg(debug_assertions)]
    pub fn check_validity(&self) {
        let mut hash = 0u64;
        let mut pkhash = 0u64;
        let mut psqtmat = S::NULL;
        let mut colours = [SquareSet::EMPTY; 2];
        let mut pieces = [SquareSet::EMPTY; 6];
        for sq in Square::all() {
            if let Some(piece) = self.squares[sq] {
                let key = PIECE_KEYS[piece.index()][sq.index()];
                hash ^= key;
                if matches!(piece.piece_type(), PieceType::Pawn | PieceType::King) {
                    pkhash ^= key;
                }
                psqtmat += psqt_value(piece, sq);
                colours[piece.colour()] = colours[piece.colour()].add_square(sq);
                pieces[piece.piece_type()] = pieces[piece.piece_type()].add_square(sq);
            }
        }
        hash ^= Self::castle_key_delta(self.castle_rooks);
        if let Some(ep) = self.ep_square {
            hash ^= EP_KEYS[ep.file() as usize];
        }
        if self.turn == Colour::Black {
            hash ^= SIDE_KEY;
        }
        assert_eq!(colours, self.colours, "colour squaresets diverged");
        assert_eq!(pieces, self.pieces, "piece squaresets diverged");
        assert_eq!(hash, self.hash, "zobrist hash diverged");
        assert_eq!(pkhash, self.pkhash, "pawn-king hash diverged");
        assert_eq!(psqtmat, self.psqtmat, "psqt-material score diverged");
        assert_eq!(
            self.compute_king_attackers(),
            self.king_attackers,
            "king attackers diverged"
        );
    }
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.squares == other.squares
            && self.turn == other.turn
            && self.ep_square == other.ep_square
            && self.halfmove_clock == other.halfmove_clock
            && self.fullmove_number == other.fullmove_number
            && self.castle_rooks == other.castle_rooks
            && self.hash == other.hash
            && self.pkhash == other.pkhash
            && self.psqtmat == other.psqtmat
            && self.king_attackers == other.king_attackers
            && self.num_moves == other.num_moves
            && self.history[..self.num_moves] == other.history[..other.num_moves]
    }
}

impl Eq for Board {}

impl Debug for Board {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("fen", &self.to_string())
            .field("hash", &format_args!("{:016x}", self.hash))
            .field("pkhash", &format_args!("{:016x}", self.pkhash()))
            .field("king_attackers", &self.king_attackers.inner())
            .finish_non_exhaustive()
    }
}

/// Renders the canonical FEN of the position.
impl Display for Board {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for rank in Rank::all().rev() {
            let mut empties = 0;
            for file in File::all() {
                let sq = Square::from_rank_file(rank, file);
                if let Some(piece) = self.squares[sq] {
                    if empties != 0 {
                        write!(f, "{empties}")?;
                    }
                    empties = 0;
                    write!(f, "{piece}")?;
                } else {
                    empties += 1;
                }
            }
            if empties != 0 {
                write!(f, "{empties}")?;
            }
            if rank != Rank::One {
                write!(f, "/")?;
            }
        }

        match self.turn {
            Colour::White => write!(f, " w ")?,
            Colour::Black => write!(f, " b ")?,
        }

        if self.castle_rooks.is_empty() {
            write!(f, "-")?;
        } else {
            for colour in Colour::all() {
                let rooks = self.castle_rooks & self.colours[colour];
                let mut squares: Vec<Square> = rooks.into_iter().collect();
                squares.reverse(); // kingside first
                for sq in squares {
                    let letter = if self.chess960 {
                        (b'a' + sq.file() as u8) as char
                    } else if sq.file() == File::H {
                        'k'
                    } else {
                        'q'
                    };
                    let letter = if colour == Colour::White {
                        letter.to_ascii_uppercase()
                    } else {
                        letter
                    };
                    write!(f, "{letter}")?;
                }
            }
        }

        match self.ep_square {
            Some(sq) => write!(f, " {sq}")?,
            None => write!(f, " -")?,
        }

        write!(f, " {} {}", self.halfmove_clock(), self.fullmove_number())
    }
}

/// Diagram + FEN, for the `print` command.
impl fmt::UpperHex for Board {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for rank in Rank::all().rev() {
            write!(f, "{} ", rank as u8 + 1)?;
            for file in File::all() {
                let sq = Square::from_rank_file(rank, file);
                match self.squares[sq] {
                    Some(piece) => write!(f, "{piece} ")?,
                    None => write!(f, ". ")?,
                }
            }
            writeln!(f)?;
        }
        writeln!(f, "  a b c d e f g h")?;
        write!(f, "FEN: {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIWIPETE: &str =
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

    #[test]
    fn startpos_bookkeeping() {
        let board = Board::startpos();
        assert_eq!(board.turn(), Colour::White);
        assert_eq!(board.halfmove_clock(), 0);
        assert_eq!(board.fullmove_number(), 1);
        assert_eq!(board.castle_rooks(), SquareSet::CORNERS);
        assert!(!board.in_check());
        assert!(!board.chess960());
        assert_eq!(board.to_string(), Board::STARTING_FEN);
    }

    #[test]
    fn fen_round_trips() {
        let fens = [
            Board::STARTING_FEN,
            KIWIPETE,
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "6k1/6pp/8/8/8/8/6PP/R6K w - - 0 1",
            "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1",
        ];
        for fen in fens {
            let board = Board::from_fen(fen, false).expect("FEN failed to parse");
            assert_eq!(board.to_string(), fen);
        }
    }

    #[test]
    fn shredder_fen_castling() {
        let board =
            Board::from_fen("rkr5/pppppppp/8/8/8/8/PPPPPPPP/RKR5 w CAca - 0 1", false).unwrap();
        assert!(board.chess960(), "non-corner rooks should flag chess960");
        assert_eq!(board.castle_rooks().count(), 4);
        assert_eq!(
            board.to_string(),
            "rkr5/pppppppp/8/8/8/8/PPPPPPPP/RKR5 w CAca - 0 1"
        );
    }

    #[test]
    fn malformed_fens_are_rejected() {
        assert!(Board::from_fen("", false).is_err());
        assert!(Board::from_fen("rnbqkbnr/pppppppp/8/8/8 w KQkq - 0 1", false).is_err());
        assert!(Board::from_fen(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1",
            false
        )
        .is_err());
        // no black king:
        assert!(Board::from_fen("8/8/8/8/8/8/8/4K3 w - - 0 1", false).is_err());
        // castling rights without a rook:
        assert!(
            Board::from_fen("rnbqkbn1/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", false)
                .is_err()
        );
    }

    #[test]
    fn apply_revert_is_exact() {
        let mut board = Board::from_fen(KIWIPETE, false).unwrap();
        let reference = board.clone();
        let moves = board.clone().gen_legal();
        assert!(!moves.is_empty());
        let mut undo = Undo::default();
        for &m in &moves {
            board.apply_move(m, &mut undo);
            board.revert_move(m, &undo);
            assert_eq!(board, reference, "divergence after {:?}", m);
        }
    }

    #[test]
    fn null_move_round_trip() {
        let mut board = Board::from_fen(KIWIPETE, false).unwrap();
        let reference = board.clone();
        let mut undo = Undo::default();
        board.apply_null_move(&mut undo);
        assert_ne!(board.hash(), reference.hash());
        assert_eq!(board.turn(), Colour::Black);
        assert_eq!(board.ep_square(), None);
        board.revert_null_move(&undo);
        assert_eq!(board, reference);
    }

    #[test]
    fn repetition_detection() {
        let mut board = Board::startpos();
        let mut undo = Undo::default();
        let shuffle = [
            Move::new(Square::G1, Square::F3),
            Move::new(Square::G8, Square::F6),
            Move::new(Square::F3, Square::G1),
            Move::new(Square::F6, Square::G8),
            Move::new(Square::G1, Square::F3),
            Move::new(Square::G8, Square::F6),
            Move::new(Square::F3, Square::G1),
            Move::new(Square::F6, Square::G8),
        ];
        for m in shuffle {
            assert!(!board.is_drawn(0));
            board.apply_move(m, &mut undo);
        }
        // third occurrence of the start position:
        assert!(board.drawn_by_repetition(0));
        // in-tree twofold triggers at positive heights too:
        assert!(board.drawn_by_repetition(4));
    }

    #[test]
    fn insufficient_material_cases() {
        for fen in [
            "8/4k3/8/8/8/8/2K5/8 w - - 0 1",
            "8/4k3/8/8/5N2/8/2K5/8 w - - 0 1",
            "8/4k3/8/8/5b2/8/2K5/8 w - - 0 1",
            "8/4k3/8/8/3NN3/8/2K5/8 w - - 0 1",
        ] {
            let board = Board::from_fen(fen, false).unwrap();
            assert!(board.is_drawn(0), "{fen} should be drawn");
        }
        for fen in [
            "8/4k3/8/8/3BN3/8/2K5/8 w - - 0 1",
            "8/4k3/8/8/4R3/8/2K5/8 w - - 0 1",
            "8/4k3/4p3/8/8/8/2K5/8 w - - 0 1",
        ] {
            let board = Board::from_fen(fen, false).unwrap();
            assert!(!board.is_drawn(0), "{fen} should not be drawn");
        }
    }

    #[test]
    fn fifty_move_rule_defers_to_mate() {
        // back-rank mate delivered on the hundredth halfmove: not a draw.
        let mated =
            Board::from_fen("R5k1/5ppp/8/8/8/8/8/6K1 b - - 100 80", false).unwrap();
        assert!(mated.in_check());
        assert!(!mated.is_drawn(0));
        // same clock, no mate: drawn.
        let quiet = Board::from_fen("6k1/5ppp/8/8/8/8/8/R5K1 b - - 100 80", false).unwrap();
        assert!(quiet.is_drawn(0));
    }

    #[test]
    fn ep_square_only_when_capturable() {
        let mut board = Board::startpos();
        let mut undo = Undo::default();
        board.apply_move(Move::new(Square::E2, Square::E4), &mut undo);
        // no black pawn can take on e3:
        assert_eq!(board.ep_square(), None);

        let mut board =
            Board::from_fen("rnbqkbnr/ppp1pppp/8/8/3p4/8/PPPPPPPP/RNBQKBNR w KQkq - 0 3", false)
                .unwrap();
        board.apply_move(Move::new(Square::E2, Square::E4), &mut undo);
        assert_eq!(board.ep_square(), Some(Square::E3));
    }

    #[test]
    fn castle_rights_erode_per_square() {
        let mut board = Board::from_fen(KIWIPETE, false).unwrap();
        let mut undo = Undo::default();
        // moving the h1 rook forfeits white kingside only.
        board.apply_move(Move::new(Square::H1, Square::G1), &mut undo);
        assert!(!board.castle_rooks().contains_square(Square::H1));
        assert!(board.castle_rooks().contains_square(Square::A1));
        assert!(board.castle_rooks().contains_square(Square::A8));
        board.revert_move(Move::new(Square::H1, Square::G1), &undo);
        // moving the king forfeits both white rights.
        board.apply_move(Move::new(Square::E1, Square::D1), &mut undo);
        assert!(!board.castle_rooks().contains_square(Square::H1));
        assert!(!board.castle_rooks().contains_square(Square::A1));
        assert!(board.castle_rooks().contains_square(Square::A8));
        assert!(board.castle_rooks().contains_square(Square::H8));
    }

    #[test]
    fn hash_transposes() {
        // reaching the same position by different move orders must
        // produce the same key.
        let mut a = Board::startpos();
        let mut b = Board::startpos();
        let mut undo = Undo::default();
        a.apply_move(Move::new(Square::G1, Square::F3), &mut undo);
        a.apply_move(Move::new(Square::B8, Square::C6), &mut undo);
        a.apply_move(Move::new(Square::B1, Square::C3), &mut undo);
        b.apply_move(Move::new(Square::B1, Square::C3), &mut undo);
        b.apply_move(Move::new(Square::B8, Square::C6), &mut undo);
        b.apply_move(Move::new(Square::G1, Square::F3), &mut undo);
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.pkhash(), b.pkhash());
    }
}
