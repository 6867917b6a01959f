use std::sync::LazyLock;

use crate::{
    chess::{
        board::{Board, Undo},
        chessmove::Move,
        piece::{Piece, PieceType},
        types::Rank,
    },
    evaluation::{
        evaluate, is_mate_score, mated_in, DRAW_SCORE, INFINITY, MATED_IN_MAX, MATE_IN_MAX,
        VALUE_NONE,
    },
    movepicker::MovePicker,
    piecesquaretable::see_value,
    searchinfo::SearchInfo,
    tablebases,
    threadlocal::ThreadData,
    transpositiontable::{Bound, TTView},
    uci,
    util::{MAX_DEPTH, MAX_PLY},
};

const ASPIRATION_WINDOW: i32 = 10;

const RFP_MAX_DEPTH: i32 = 8;
const RFP_MARGIN: i32 = 72;
const RAZOR_MAX_DEPTH: i32 = 2;
const RAZOR_MARGIN: i32 = 400;
const NMP_MIN_DEPTH: i32 = 3;
const NMP_VERIFY_DEPTH: i32 = 12;
const PROBCUT_MIN_DEPTH: i32 = 5;
const PROBCUT_MARGIN: i32 = 100;
const LMP_MAX_DEPTH: i32 = 8;
const FUTILITY_MAX_DEPTH: i32 = 8;
const FUTILITY_MARGIN: i32 = 90;
const FUTILITY_BASE: i32 = 60;
const SEE_PRUNE_MAX_DEPTH: i32 = 10;
const SEE_QUIET_MARGIN: i32 = -60;
const SEE_NOISY_MARGIN: i32 = -25;
const SINGULAR_MIN_DEPTH: i32 = 8;
const SINGULAR_DOUBLE_MARGIN: i32 = 120;
const QS_DELTA_MARGIN: i32 = 200;
const HISTORY_LMR_DIVISOR: i32 = 8000;

/// log-product reduction table, indexed by depth and move count.
#[allow(clippy::cast_possible_truncation)]
static LMR_TABLE: LazyLock<[[i32; 64]; 64]> = LazyLock::new(|| {
    let mut table = [[0; 64]; 64];
    for (depth, row) in table.iter_mut().enumerate().skip(1) {
        for (moves, entry) in row.iter_mut().enumerate().skip(1) {
            *entry = (0.75 + (depth as f64).ln() * (moves as f64).ln() / 2.25) as i32;
        }
    }
    table
});

fn lmr_reduction(depth: i32, moves_tried: usize) -> i32 {
    let depth = (depth.clamp(0, 63)) as usize;
    let moves = moves_tried.min(63);
    LMR_TABLE[depth][moves]
}

/// Moves-tried threshold for late-move pruning.
const fn lmp_threshold(depth: i32, improving: bool) -> usize {
    #![allow(clippy::cast_sign_loss)]
    let base = 3 + depth * depth;
    let limit = if improving { base } else { base / 2 };
    limit as usize
}

/// Static exchange evaluation: does this move win at least `threshold`
/// material once every recapture on the target square is played out?
pub fn static_exchange_eval(pos: &Board, m: Move, threshold: i32) -> bool {
    use PieceType::{Bishop, King, Knight, Pawn, Queen, Rook};

    // castling moves two friendly pieces; nothing can be lost.
    if m.is_castle() {
        return threshold <= 0;
    }

    let from = m.from();
    let to = m.to();

    let moved = pos
        .piece_at(from)
        .map(Piece::piece_type)
        .expect("SEE on a move with no mover");
    let mut next_victim = m.promotion_type().unwrap_or(moved);

    // the material balance if the opponent never recaptures.
    let mut balance = if m.is_en_passant() {
        see_value(Pawn)
    } else {
        pos.piece_at(to).map_or(0, |p| see_value(p.piece_type()))
    };
    if let Some(promo) = m.promotion_type() {
        balance += see_value(promo) - see_value(Pawn);
    }
    balance -= threshold;
    if balance < 0 {
        return false;
    }

    // and if they win our moved piece for free, are we still ahead?
    balance -= see_value(next_victim);
    if balance >= 0 {
        return true;
    }

    let diag = pos.piece_bb(Bishop) | pos.piece_bb(Queen);
    let ortho = pos.piece_bb(Rook) | pos.piece_bb(Queen);

    let mut occupied = (pos.occupied() ^ from.as_set()) | to.as_set();
    if m.is_en_passant() {
        if let Some(ep) = pos.ep_square() {
            let victim_sq = match pos.turn() {
                crate::chess::piece::Colour::White => ep.sub(8),
                crate::chess::piece::Colour::Black => ep.add(8),
            };
            if let Some(victim_sq) = victim_sq {
                occupied = occupied ^ victim_sq.as_set();
            }
        }
    }

    let mut attackers = pos.attackers_to(to, occupied) & occupied;
    let mut colour = !pos.turn();

    loop {
        let my_attackers = attackers & pos.colour_bb(colour);
        if my_attackers.is_empty() {
            break;
        }

        // least valuable attacker strikes next.
        let mut attacker = King;
        for pt in [Pawn, Knight, Bishop, Rook, Queen, King] {
            if (my_attackers & pos.piece_bb(pt)).non_empty() {
                attacker = pt;
                break;
            }
        }

        let attacker_sq = (my_attackers & pos.piece_bb(attacker))
            .first()
            .expect("attacker set was non-empty");
        occupied = occupied.remove_square(attacker_sq);

        // a capture may uncover sliders behind the capturer.
        if matches!(attacker, Pawn | Bishop | Queen) {
            attackers |= crate::chess::attacks::bishop_attacks(to, occupied) & diag;
        }
        if matches!(attacker, Rook | Queen) {
            attackers |= crate::chess::attacks::rook_attacks(to, occupied) & ortho;
        }
        attackers &= occupied;

        colour = !colour;

        // the capturer becomes the hostage on the target square.
        next_victim = attacker;
        balance = -balance - 1 - see_value(next_victim);

        if balance >= 0 {
            // a king "recapture" into remaining defenders is illegal,
            // so the exchange ends a step earlier.
            if attacker == King && (attackers & pos.colour_bb(colour)).non_empty() {
                colour = !colour;
            }
            break;
        }
    }

    // whoever is out of useful captures when the music stops loses.
    pos.turn() != colour
}

fn draw_score() -> i32 {
    DRAW_SCORE
}

/// The counter-move suggested by the previous ply's move, if any.
fn counter_move(td: &ThreadData, height: usize) -> Option<Move> {
    if height == 0 {
        return None;
    }
    match (td.moves[height - 1], td.pieces[height - 1]) {
        (Some(prev), Some(piece)) if prev != Move::NULL => {
            td.counter_moves.get(piece, prev.to())
        }
        _ => None,
    }
}

/// Quiescence: play out captures, promotions, and (at the frontier)
/// direct checks until the position goes quiet.
#[allow(clippy::too_many_lines)]
fn qsearch(
    td: &mut ThreadData,
    info: &SearchInfo,
    tt: TTView,
    mut alpha: i32,
    beta: i32,
    height: usize,
    qs_depth: i32,
) -> i32 {
    td.nodes += 1;
    info.add_node();
    if info.check_up(td.nodes) {
        return 0;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    {
        td.seldepth = td.seldepth.max(height as i32);
    }

    if td.board.is_drawn(height) {
        return draw_score();
    }
    if height >= MAX_PLY - 1 {
        return if td.board.in_check() {
            0
        } else {
            evaluate(&td.board)
        };
    }

    let in_check = td.board.in_check();

    let mut tt_move = None;
    if let Some(hit) = tt.probe(td.board.hash(), height) {
        tt_move = hit.mov;
        let usable = match hit.bound {
            Bound::Exact => true,
            Bound::Lower => hit.score >= beta,
            Bound::Upper => hit.score <= alpha,
            Bound::None => false,
        };
        if usable {
            return hit.score;
        }
    }

    let mut best_score;
    let raw_eval;
    if in_check {
        // no standing pat out of a check.
        best_score = -INFINITY;
        raw_eval = VALUE_NONE;
    } else {
        let stand_pat = evaluate(&td.board);
        raw_eval = stand_pat;
        if stand_pat >= beta {
            return stand_pat;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }
        best_score = stand_pat;
    }

    let mut picker = if in_check {
        // check evasions need the full move set or mates go unseen.
        MovePicker::new(tt_move, td.killers.get(height), counter_move(td, height), 0)
    } else {
        MovePicker::new_noisy(tt_move, qs_depth == 0)
    };

    let mut best_move = None;
    let mut moves_tried = 0;
    let mut undo = Undo::default();

    while let Some(m) = picker.next(&td.board, &td.history) {
        // delta pruning: even the best case cannot lift alpha.
        if !in_check && !m.is_promotion() {
            let gain = if m.is_en_passant() {
                see_value(PieceType::Pawn)
            } else {
                td.board
                    .piece_at(m.to())
                    .map_or(0, |p| see_value(p.piece_type()))
            };
            if best_score + gain + QS_DELTA_MARGIN <= alpha {
                continue;
            }
        }

        td.moves[height] = Some(m);
        td.pieces[height] = td.board.piece_at(m.from());
        td.board.apply_move(m, &mut undo);
        if !td.board.move_was_legal() {
            td.board.revert_move(m, &undo);
            continue;
        }
        moves_tried += 1;

        let score = -qsearch(td, info, tt, -beta, -alpha, height + 1, qs_depth - 1);
        td.board.revert_move(m, &undo);

        if info.is_stopped() {
            return 0;
        }

        if score > best_score {
            best_score = score;
            if score > alpha {
                alpha = score;
                best_move = Some(m);
                if score >= beta {
                    break;
                }
            }
        }
    }

    if in_check && moves_tried == 0 {
        return mated_in(height);
    }

    let bound = if best_score >= beta {
        Bound::Lower
    } else {
        Bound::Upper
    };
    tt.store(
        td.board.hash(),
        height,
        best_move,
        best_score,
        raw_eval,
        bound,
        0,
    );

    best_score
}

/// The negamax workhorse: fail-soft alpha-beta over the full move set,
/// with the pruning and extension schedule applied around it.
#[allow(clippy::too_many_lines, clippy::cognitive_complexity)]
fn search(
    td: &mut ThreadData,
    info: &SearchInfo,
    tt: TTView,
    mut alpha: i32,
    mut beta: i32,
    mut depth: i32,
    height: usize,
    pv_node: bool,
    cut_node: bool,
) -> i32 {
    #![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

    if depth <= 0 {
        return qsearch(td, info, tt, alpha, beta, height, 0);
    }

    td.nodes += 1;
    info.add_node();
    if info.check_up(td.nodes) {
        return 0;
    }

    let root = height == 0;
    let in_check = td.board.in_check();
    td.seldepth = td.seldepth.max(height as i32);

    if !root {
        if td.board.is_drawn(height) {
            return draw_score();
        }
        if height >= MAX_PLY - 1 {
            return if in_check { 0 } else { evaluate(&td.board) };
        }

        // mate-distance pruning: no line from here can beat a mate
        // already found closer to the root.
        alpha = alpha.max(mated_in(height));
        beta = beta.min(crate::evaluation::mate_in(height + 1));
        if alpha >= beta {
            return alpha;
        }
    }

    let excluded = td.ss[height].excluded;

    // transposition probe; skipped inside a singular verification.
    let mut tt_hit = None;
    if excluded.is_none() {
        tt_hit = tt.probe(td.board.hash(), height);
        if let Some(hit) = tt_hit {
            if !pv_node && hit.depth >= depth {
                let cutoff = match hit.bound {
                    Bound::Exact => true,
                    Bound::Lower => hit.score >= beta,
                    Bound::Upper => hit.score <= alpha,
                    Bound::None => false,
                };
                if cutoff {
                    return hit.score;
                }
            }
        }
    }

    // endgame tablebase probe.
    if !root
        && excluded.is_none()
        && info.syzygy.enabled()
        && td.board.occupied().count() <= tablebases::max_cardinality(&info.syzygy)
        && (depth >= info.syzygy.probe_depth || td.board.halfmove_clock() == 0)
    {
        if let Some(wdl) = tablebases::probe_wdl(&info.syzygy, &td.board) {
            info.add_tbhit();
            let score = tablebases::wdl_to_score(wdl, height);
            let bound = match wdl {
                tablebases::Wdl::Win => Bound::Lower,
                tablebases::Wdl::Draw => Bound::Exact,
                tablebases::Wdl::Loss => Bound::Upper,
            };
            let cutoff = match bound {
                Bound::Lower => score >= beta,
                Bound::Upper => score <= alpha,
                _ => true,
            };
            if cutoff {
                tt.store(td.board.hash(), height, None, score, VALUE_NONE, bound, depth);
                return score;
            }
        }
    }

    // static evaluation, cached on the stack for pruning decisions; a
    // singular re-entry reuses the value computed on first visit.
    let static_eval = if in_check {
        VALUE_NONE
    } else if excluded.is_some() {
        td.ss[height].eval
    } else {
        evaluate(&td.board)
    };
    td.ss[height].eval = static_eval;

    let improving = !in_check
        && height >= 2
        && td.ss[height - 2].eval != VALUE_NONE
        && static_eval > td.ss[height - 2].eval;

    // whole-node pruning, for nodes that are neither PV, nor root, nor
    // in check, nor inside a singular verification.
    if !pv_node && !in_check && excluded.is_none() {
        // reverse futility: so far above beta that a quiet reply keeps us there.
        if depth <= RFP_MAX_DEPTH
            && static_eval - RFP_MARGIN * (depth - i32::from(improving)) >= beta
            && !is_mate_score(beta)
        {
            return static_eval;
        }

        // razoring: hopeless nodes drop straight into quiescence.
        if depth <= RAZOR_MAX_DEPTH && static_eval + RAZOR_MARGIN * depth < alpha {
            let score = qsearch(td, info, tt, alpha, beta, height, 0);
            if score < alpha {
                return score;
            }
        }

        // null-move pruning: hand over the move and search reduced. Off
        // for pawn-and-king endings, where zugzwang rules.
        if depth >= NMP_MIN_DEPTH
            && static_eval >= beta
            && !td.nmp_disabled
            && td.board.has_non_pawn_material(td.board.turn())
            && (height == 0 || td.moves[height - 1] != Some(Move::NULL))
        {
            let r = 4 + depth / 6 + ((static_eval - beta) / 200).min(3);
            let reduced = (depth - r).max(0);

            let mut undo = Undo::default();
            td.moves[height] = Some(Move::NULL);
            td.pieces[height] = None;
            td.board.apply_null_move(&mut undo);
            let score = -search(
                td,
                info,
                tt,
                -beta,
                -beta + 1,
                reduced,
                height + 1,
                false,
                !cut_node,
            );
            td.board.revert_null_move(&undo);

            if info.is_stopped() {
                return 0;
            }
            if score >= beta {
                // don't trust a null-score mate.
                let score = if score >= MATE_IN_MAX { beta } else { score };
                if depth < NMP_VERIFY_DEPTH {
                    return score;
                }
                // zugzwang verification at high depth: repeat the
                // search without the null move available.
                td.nmp_disabled = true;
                let verified = search(td, info, tt, beta - 1, beta, reduced, height, false, false);
                td.nmp_disabled = false;
                if verified >= beta {
                    return score;
                }
            }
        }

        // ProbCut: a capture that already beats beta by a margin at low
        // depth will usually hold at full depth.
        if depth >= PROBCUT_MIN_DEPTH && !is_mate_score(beta) {
            let rbeta = (beta + PROBCUT_MARGIN).min(MATE_IN_MAX - 1);
            let mut picker = MovePicker::new_noisy(tt_hit.and_then(|hit| hit.mov), false);
            let mut undo = Undo::default();
            while let Some(m) = picker.next(&td.board, &td.history) {
                if !static_exchange_eval(&td.board, m, rbeta - static_eval) {
                    continue;
                }
                td.moves[height] = Some(m);
                td.pieces[height] = td.board.piece_at(m.from());
                td.board.apply_move(m, &mut undo);
                if !td.board.move_was_legal() {
                    td.board.revert_move(m, &undo);
                    continue;
                }
                let mut score = -qsearch(td, info, tt, -rbeta, -rbeta + 1, height + 1, 0);
                if score >= rbeta {
                    score = -search(
                        td,
                        info,
                        tt,
                        -rbeta,
                        -rbeta + 1,
                        depth - 4,
                        height + 1,
                        false,
                        !cut_node,
                    );
                }
                td.board.revert_move(m, &undo);
                if info.is_stopped() {
                    return 0;
                }
                if score >= rbeta {
                    tt.store(
                        td.board.hash(),
                        height,
                        Some(m),
                        score,
                        static_eval,
                        Bound::Lower,
                        depth - 3,
                    );
                    return score;
                }
            }
        }
    }

    // internal iterative reduction: deep nodes with no table move are
    // cheaper to reconnoitre one ply shallower.
    if depth >= 4 && excluded.is_none() && tt_hit.and_then(|hit| hit.mov).is_none() {
        depth -= 1;
    }

    let tt_move = tt_hit.and_then(|hit| hit.mov);
    let killers = td.killers.get(height);
    let counter = counter_move(td, height);

    let mut picker = MovePicker::new(tt_move, killers, counter, 0);
    let mut quiets_tried: Vec<Move> = Vec::new();
    let mut best_score = -INFINITY;
    let mut best_move = None;
    let mut moves_tried = 0usize;
    let mut undo = Undo::default();
    let old_alpha = alpha;

    td.pvs[height].clear();

    while let Some(m) = picker.next(&td.board, &td.history) {
        if Some(m) == excluded {
            continue;
        }
        if root && td.excluded_root_moves.contains(&m) {
            continue;
        }

        let is_quiet = !td.board.is_tactical(m);

        if root
            && td.is_principal()
            && info.print_to_stdout
            && td.depth >= 24
            && info.time_manager.elapsed_millis() > 2500
        {
            println!(
                "info depth {} currmove {} currmovenumber {}",
                td.depth,
                m.display(info.chess960),
                moves_tried + 1,
            );
        }

        // move-count based pruning of late quiets.
        if !pv_node
            && !in_check
            && best_score > MATED_IN_MAX
            && depth <= LMP_MAX_DEPTH
            && moves_tried >= lmp_threshold(depth, improving)
        {
            picker.skip_quiets = true;
            if is_quiet {
                continue;
            }
        }

        // futility: quiet moves cannot repair a hopeless static eval.
        if is_quiet
            && !pv_node
            && !in_check
            && best_score > MATED_IN_MAX
            && depth <= FUTILITY_MAX_DEPTH
            && static_eval + FUTILITY_BASE + FUTILITY_MARGIN * depth <= alpha
        {
            picker.skip_quiets = true;
            continue;
        }

        // SEE pruning of quiets and losing captures at low depth.
        if best_score > MATED_IN_MAX && depth <= SEE_PRUNE_MAX_DEPTH && moves_tried > 0 {
            let margin = if is_quiet {
                SEE_QUIET_MARGIN * depth
            } else {
                SEE_NOISY_MARGIN * depth * depth
            };
            if !static_exchange_eval(&td.board, m, margin) {
                continue;
            }
        }

        // singular extension: when every other move fails a reduced
        // search against the table score, the table move is the only
        // show in town and deserves deeper scrutiny.
        let mut extension = 0;
        if !root && depth >= SINGULAR_MIN_DEPTH && Some(m) == tt_move && excluded.is_none() {
            if let Some(hit) = tt_hit {
                if hit.depth >= depth - 3
                    && matches!(hit.bound, Bound::Lower | Bound::Exact)
                    && !is_mate_score(hit.score)
                {
                    let target = hit.score - depth;
                    td.ss[height].excluded = Some(m);
                    let value = search(
                        td,
                        info,
                        tt,
                        target - 1,
                        target,
                        (depth - 1) / 2,
                        height,
                        false,
                        cut_node,
                    );
                    td.ss[height].excluded = None;
                    if info.is_stopped() {
                        return 0;
                    }
                    if value < target {
                        extension = if !pv_node && value < target - SINGULAR_DOUBLE_MARGIN {
                            2
                        } else {
                            1
                        };
                    } else if target >= beta {
                        // multicut: two moves beat beta at reduced
                        // depth, so this node almost surely does too.
                        return target;
                    }
                }
            }
        }
        if in_check {
            extension = extension.max(1);
        }
        // pushing a passer to the brink of promotion can upend the
        // evaluation; look one ply further.
        if extension == 0 {
            if let Some(piece) = td.board.piece_at(m.from()) {
                if piece.piece_type() == PieceType::Pawn
                    && m.to().relative_to(td.board.turn()).rank() == Rank::Seven
                {
                    extension = 1;
                }
            }
        }

        td.moves[height] = Some(m);
        td.pieces[height] = td.board.piece_at(m.from());
        td.board.apply_move(m, &mut undo);
        if !td.board.move_was_legal() {
            td.board.revert_move(m, &undo);
            continue;
        }
        moves_tried += 1;
        if is_quiet && quiets_tried.len() < 64 {
            quiets_tried.push(m);
        }

        let gives_check = td.board.in_check();
        let new_depth = depth + extension - 1;

        if pv_node {
            // the child writes its line here; stale content from a
            // sibling must not leak into ours.
            td.pvs[height + 1].clear();
        }

        let score = if moves_tried == 1 {
            -search(td, info, tt, -beta, -alpha, new_depth, height + 1, pv_node, false)
        } else {
            // late-move reductions for quiets after the first few.
            let mut r = 0;
            if is_quiet && depth >= 3 && moves_tried >= 2 + 2 * usize::from(pv_node) {
                r = lmr_reduction(depth, moves_tried);
                r -= i32::from(pv_node);
                r -= i32::from(gives_check);
                r += i32::from(cut_node);
                if let Some(piece) = td.pieces[height] {
                    r -= td.history.get(piece, m.history_to_square()) / HISTORY_LMR_DIVISOR;
                }
                r = r.clamp(0, new_depth - 1);
            }

            // zero-window probe, re-searched on promise.
            let mut score = -search(
                td,
                info,
                tt,
                -alpha - 1,
                -alpha,
                new_depth - r,
                height + 1,
                false,
                true,
            );
            if score > alpha && r > 0 {
                score = -search(
                    td,
                    info,
                    tt,
                    -alpha - 1,
                    -alpha,
                    new_depth,
                    height + 1,
                    false,
                    !cut_node,
                );
            }
            if score > alpha && pv_node {
                score = -search(td, info, tt, -beta, -alpha, new_depth, height + 1, true, false);
            }
            score
        };

        td.board.revert_move(m, &undo);

        if info.is_stopped() {
            return 0;
        }

        if score > best_score {
            best_score = score;
            if score > alpha {
                alpha = score;
                best_move = Some(m);
                if pv_node {
                    let (head, tail) = td.pvs.split_at_mut(height + 1);
                    head[height].load_from(m, &tail[0]);
                }
                if score >= beta {
                    break;
                }
            }
        }
    }

    if moves_tried == 0 {
        // in a singular verification the excluded move may be the only
        // legal one; fail low rather than claim stalemate.
        if excluded.is_some() {
            return alpha;
        }
        return if in_check {
            mated_in(height)
        } else {
            draw_score()
        };
    }

    // a quiet beta cutoff feeds every quiet-ordering heuristic: the
    // cutoff move is rewarded, the quiets tried before it punished.
    if best_score >= beta {
        if let Some(best) = best_move {
            if !td.board.is_tactical(best) {
                td.killers.insert(height, best);
                if height > 0 {
                    if let (Some(prev), Some(prev_piece)) =
                        (td.moves[height - 1], td.pieces[height - 1])
                    {
                        if prev != Move::NULL {
                            td.counter_moves.insert(prev_piece, prev.to(), best);
                        }
                    }
                }
                if let Some(piece) = td.board.piece_at(best.from()) {
                    td.history.reward(piece, best.history_to_square(), depth);
                }
                for &tried in quiets_tried.iter().filter(|&&q| q != best) {
                    if let Some(piece) = td.board.piece_at(tried.from()) {
                        td.history.punish(piece, tried.history_to_square(), depth);
                    }
                }
            }
        }
    }

    if excluded.is_none() {
        let bound = if best_score >= beta {
            Bound::Lower
        } else if pv_node && alpha > old_alpha {
            Bound::Exact
        } else {
            Bound::Upper
        };
        tt.store(
            td.board.hash(),
            height,
            best_move,
            best_score,
            static_eval,
            bound,
            depth,
        );
    }

    best_score
}

/// Aspiration driver for a single (depth, MultiPV-slot) pair. Only the
/// first slot aspirates; the rest get the full window.
fn aspiration(
    td: &mut ThreadData,
    info: &SearchInfo,
    tt: TTView,
    depth: i32,
    prev_score: i32,
) -> i32 {
    let mut delta = ASPIRATION_WINDOW;
    let (mut alpha, mut beta) =
        if depth >= 5 && td.multipv_index == 0 && prev_score.abs() < 1000 {
            (
                (prev_score - delta).max(-INFINITY),
                (prev_score + delta).min(INFINITY),
            )
        } else {
            (-INFINITY, INFINITY)
        };

    loop {
        let score = search(td, info, tt, alpha, beta, depth, 0, true, false);
        if info.is_stopped() {
            return score;
        }

        if score <= alpha {
            // fail low: pull beta in, drop alpha.
            if td.is_principal() && info.print_to_stdout && info.time_manager.elapsed_millis() > 2500
            {
                report_line(td, info, tt, depth, td.multipv_index, score, Some(Bound::Upper));
            }
            beta = (alpha + beta) / 2;
            alpha = (alpha - delta).max(-INFINITY);
        } else if score >= beta {
            if td.is_principal() && info.print_to_stdout && info.time_manager.elapsed_millis() > 2500
            {
                report_line(td, info, tt, depth, td.multipv_index, score, Some(Bound::Lower));
            }
            beta = (beta + delta).min(INFINITY);
        } else {
            return score;
        }

        delta += delta / 2;
        if delta > 1000 {
            // the score is running away; stop chasing it with windows.
            alpha = -INFINITY;
            beta = INFINITY;
        }
    }
}

/// One worker's iterative-deepening loop. Helper threads start one ply
/// staggered to decorrelate their trees.
pub fn iterative_deepening(td: &mut ThreadData, info: &mut SearchInfo, tt: TTView) {
    let legal_count = td.board.clone().gen_legal().len();
    if legal_count == 0 {
        return;
    }
    let multi_pv = info.multi_pv.min(legal_count).max(1);
    td.root_lines
        .resize_with(multi_pv, crate::pv::PVariation::default);

    let start_depth = 1 + (td.thread_id % 2) as i32;

    for depth in start_depth..=info.depth_limit.min(MAX_DEPTH - 1) {
        td.depth = depth;
        td.excluded_root_moves.clear();

        for slot in 0..multi_pv {
            td.multipv_index = slot;
            td.seldepth = 0;
            let prev_score = td.root_lines[slot].score;
            let score = aspiration(td, info, tt, depth, prev_score);
            if info.is_stopped() {
                break;
            }

            let mut line = td.pvs[0].clone();
            line.score = score;
            if line.best_move().is_some() {
                td.root_lines[slot] = line;
            }
            if let Some(m) = td.root_lines[slot].best_move() {
                td.excluded_root_moves.push(m);
            }
            if td.is_principal() && info.print_to_stdout {
                report_line(td, info, tt, depth, slot, td.root_lines[slot].score, None);
            }
        }

        if info.is_stopped() {
            // an aborted iteration is never committed.
            break;
        }
        td.completed_depth = depth;

        if td.is_principal() {
            if let Some(best) = td.root_lines[0].best_move() {
                info.time_manager
                    .update_iteration(best, td.root_lines[0].score);
            }
            // never cut a search off before a few iterations are in the
            // bank; shallow bestmoves are noise.
            if td.completed_depth >= 4 && info.time_manager.past_soft_limit() {
                info.stop();
                break;
            }
        }
    }
}

/// One `info` line: depth through hashfull, plus the PV.
fn report_line(
    td: &ThreadData,
    info: &SearchInfo,
    tt: TTView,
    depth: i32,
    slot: usize,
    score: i32,
    bound: Option<Bound>,
) {
    let elapsed = info.time_manager.elapsed_millis();
    let nodes = info.nodes_searched();
    let nps = nodes * 1000 / (elapsed + 1);
    let bound_str = match bound {
        Some(Bound::Lower) => " lowerbound",
        Some(Bound::Upper) => " upperbound",
        _ => "",
    };
    println!(
        "info depth {} seldepth {} multipv {} score {}{} time {} nodes {} nps {} tbhits {} hashfull {} pv {}",
        depth,
        td.seldepth,
        slot + 1,
        uci::format_score(score),
        bound_str,
        elapsed,
        nodes,
        nps,
        info.tbhits_counted(),
        tt.hashfull(),
        td.pvs[0].display(info.chess960),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::types::Square;

    #[test]
    fn see_simple_exchanges() {
        // pawn takes pawn, undefended: clean win of a pawn.
        let board =
            Board::from_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1", false).unwrap();
        let m = Move::new(Square::E4, Square::D5);
        assert!(static_exchange_eval(&board, m, 0));
        assert!(static_exchange_eval(&board, m, 90));
        assert!(!static_exchange_eval(&board, m, 150));
    }

    #[test]
    fn see_detects_defended_targets() {
        // rook takes a pawn defended by a pawn: loses the exchange.
        let board =
            Board::from_fen("k7/2p5/3p4/8/3R4/8/8/K7 w - - 0 1", false).unwrap();
        assert!(!static_exchange_eval(
            &board,
            Move::new(Square::D4, Square::D6),
            0
        ));
        // but a pawn grabbing the same pawn is fine.
        let board =
            Board::from_fen("k7/2p5/3p4/4P3/8/8/8/K7 w - - 0 1", false).unwrap();
        assert!(static_exchange_eval(
            &board,
            Move::new(Square::E5, Square::D6),
            0
        ));
    }

    #[test]
    fn see_xray_recapture() {
        // queen takes a defended pawn with a rook battery behind the
        // defence: the full playout still loses material.
        let board =
            Board::from_fen("3r3k/3r4/8/3p4/8/8/3Q4/3R3K w - - 0 1", false).unwrap();
        assert!(!static_exchange_eval(
            &board,
            Move::new(Square::D2, Square::D5),
            0
        ));
    }

    #[test]
    fn lmr_table_is_monotone() {
        assert_eq!(lmr_reduction(1, 1), 0);
        assert!(lmr_reduction(20, 20) >= lmr_reduction(4, 4));
        assert!(lmr_reduction(63, 63) >= lmr_reduction(20, 20));
    }

    #[test]
    fn lmp_threshold_scales() {
        assert!(lmp_threshold(4, true) > lmp_threshold(4, false));
        assert!(lmp_threshold(8, false) > lmp_threshold(2, false));
    }
}
