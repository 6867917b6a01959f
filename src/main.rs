#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! Pyrite, a UCI chess engine written in Rust.

mod bench;
mod chess;
mod cli;
mod errors;
mod evaluation;
mod historytable;
mod macros;
mod movepicker;
mod perft;
mod piecesquaretable;
mod pv;
mod rng;
mod search;
mod searchinfo;
mod tablebases;
mod threadlocal;
mod threadpool;
mod timemgmt;
mod transpositiontable;
mod uci;
mod util;

use cli::Subcommands::{Bench, Perft};

/// The name of the engine.
pub static NAME: &str = "Pyrite";
/// The version of the engine.
pub static VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    if std::env::args_os().len() == 1 {
        // fast path to UCI:
        return uci::main_loop();
    }

    let cli = <cli::Cli as clap::Parser>::parse();

    match cli.subcommand {
        Some(Bench {
            depth,
            threads,
            hash,
        }) => bench::run(
            depth.unwrap_or(bench::DEFAULT_DEPTH),
            threads.unwrap_or(1),
            hash.unwrap_or(16),
        ),
        Some(Perft) => perft::gamut(),
        None => uci::main_loop(),
    }
}
