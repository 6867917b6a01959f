use std::time::Instant;

use anyhow::Context;

use crate::{
    chess::{attacks, board::Board},
    threadpool::Engine,
    timemgmt::SearchLimits,
};

pub const DEFAULT_DEPTH: i32 = 13;

/// The fixed suite searched by `bench`: openings, middlegames, tactical
/// melees, endgames, and one Fischer-random position to exercise the
/// castling encoding.
pub static BENCH_POSITIONS: &[&str] = &[
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
    "4rrk1/pp1n3p/3q2pQ/2p1pb2/2PP4/2P3N1/P2B2PP/4RRK1 b - - 7 19",
    "r4rk1/2pb1ppp/1p1bpn2/p2p4/2PP4/1PN1PN2/PB3PPP/R2Q1RK1 w - - 0 12",
    "2rr3k/pp3pp1/1nnqbN1p/3pN3/2pP4/2P3Q1/PPB4P/R4RK1 w - - 0 1",
    "5k2/8/8/8/8/8/8/4K2R w K - 0 1",
    "3k4/3p4/8/K1P4r/8/8/8/8 b - - 0 1",
    "8/8/4k3/8/2p5/8/B2P2K1/8 w - - 0 1",
    "8/8/1k6/2b5/2pP4/8/5K2/8 b - d3 0 1",
    "r3k2r/1b4bq/8/8/8/8/7B/R3K2R w KQkq - 0 1",
    "8/8/8/8/8/4k3/4p3/4K3 w - - 0 1",
    "nrbbqkrn/pppppppp/8/8/8/8/PPPPPPPP/NRBBQKRN w GBgb - 0 1",
];

/// Searches the whole suite to a fixed depth and prints the aggregate
/// node count and speed. With a single thread the result is exactly
/// reproducible: the Zobrist tables are deterministic and nothing else
/// perturbs the tree.
pub fn run(depth: i32, threads: usize, hash: usize) -> anyhow::Result<()> {
    attacks::initialise();

    let mut engine = Engine::new();
    engine
        .set_hash(hash)
        .with_context(|| format!("failed to allocate a {hash}MB hash table"))?;
    engine.set_threads(threads);

    let limits = SearchLimits {
        depth: Some(depth),
        ..SearchLimits::default()
    };

    let mut total_nodes = 0u64;
    let start = Instant::now();

    for (i, fen) in BENCH_POSITIONS.iter().enumerate() {
        println!("\nPosition #{}: {fen}", i + 1);
        let board = Board::from_fen(fen, false)
            .with_context(|| format!("bench position #{} failed to parse", i + 1))?;
        engine.search_position(&board, &limits, None);
        total_nodes += engine.nodes_searched();
        // each position starts from a cold table, for reproducibility.
        engine.new_game();
    }

    let elapsed = start.elapsed();
    #[allow(clippy::cast_possible_truncation)]
    let millis = elapsed.as_millis() as u64;
    println!();
    println!("Time  : {millis}ms");
    println!("Nodes : {total_nodes}");
    println!("NPS   : {}", total_nodes * 1000 / millis.max(1));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bench_positions_all_parse() {
        for fen in BENCH_POSITIONS {
            let board = Board::from_fen(fen, false).expect("bench FEN failed to parse");
            assert_eq!(&board.to_string(), fen, "bench FEN does not round-trip");
        }
    }

    #[test]
    fn single_thread_bench_is_deterministic() {
        attacks::initialise();
        let run_once = || {
            let mut engine = Engine::new();
            let limits = SearchLimits {
                depth: Some(5),
                ..SearchLimits::default()
            };
            let mut nodes = 0;
            for fen in &BENCH_POSITIONS[..4] {
                let board = Board::from_fen(fen, false).unwrap();
                engine.search_position(&board, &limits, None);
                nodes += engine.nodes_searched();
                engine.new_game();
            }
            nodes
        };
        let first = run_once();
        let second = run_once();
        assert_eq!(first, second, "bench node counts must be reproducible");
    }
}
