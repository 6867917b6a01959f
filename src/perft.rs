use std::time::Instant;

use anyhow::{ensure, Result};

use crate::chess::{attacks, board::Board};

/// Positions with published node counts, used to pin down every corner
/// of move generation: castling rights erosion, en passant, promotion,
/// checks, and pins.
pub static PERFT_SUITE: &[(&str, &[u64])] = &[
    (
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        &[20, 400, 8_902, 197_281, 4_865_609],
    ),
    (
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        &[48, 2_039, 97_862, 4_085_603],
    ),
    (
        "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        &[14, 191, 2_812, 43_238, 674_624],
    ),
    (
        "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
        &[6, 264, 9_467, 422_333],
    ),
    (
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        &[44, 1_486, 62_379, 2_103_487],
    ),
    (
        "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
        &[46, 2_079, 89_890, 3_894_594],
    ),
];

/// Runs the whole suite, failing loudly on the first divergence.
pub fn gamut() -> Result<()> {
    attacks::initialise();

    for (fen, counts) in PERFT_SUITE {
        let mut board = Board::from_fen(fen, false)?;
        println!("{fen}");
        for (depth, &expected) in counts.iter().enumerate() {
            let depth = depth as u32 + 1;
            let start = Instant::now();
            let nodes = board.perft(depth);
            let elapsed = start.elapsed();
            println!("  perft({depth}) = {nodes:>12}  ({}ms)", elapsed.as_millis());
            ensure!(
                nodes == expected,
                "perft({depth}) of {fen} was {nodes}, expected {expected}"
            );
        }
    }
    println!("perft gamut complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_to_depth(fen: &str, counts: &[u64], max_depth: usize) {
        let mut board = Board::from_fen(fen, false).unwrap();
        for (depth, &expected) in counts.iter().take(max_depth).enumerate() {
            let nodes = board.perft(depth as u32 + 1);
            assert_eq!(
                nodes,
                expected,
                "perft({}) diverged for {fen}",
                depth + 1
            );
        }
    }

    #[test]
    fn startpos_shallow() {
        let (fen, counts) = PERFT_SUITE[0];
        check_to_depth(fen, counts, 4);
    }

    #[test]
    fn kiwipete_shallow() {
        let (fen, counts) = PERFT_SUITE[1];
        check_to_depth(fen, counts, 3);
    }

    #[test]
    fn rook_endgame_shallow() {
        let (fen, counts) = PERFT_SUITE[2];
        check_to_depth(fen, counts, 4);
    }

    #[test]
    fn promotion_position_shallow() {
        let (fen, counts) = PERFT_SUITE[3];
        check_to_depth(fen, counts, 3);
    }

    #[test]
    fn tactical_position_shallow() {
        let (fen, counts) = PERFT_SUITE[4];
        check_to_depth(fen, counts, 3);
    }

    #[test]
    fn symmetric_position_shallow() {
        let (fen, counts) = PERFT_SUITE[5];
        check_to_depth(fen, counts, 3);
    }

    #[test]
    #[ignore = "several minutes without optimisations"]
    fn full_gamut() {
        gamut().unwrap();
    }

    #[test]
    #[ignore = "the classic 119 million node check"]
    fn startpos_depth_six() {
        let mut board = Board::startpos();
        assert_eq!(board.perft(6), 119_060_324);
    }
}
