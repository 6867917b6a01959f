use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(author, version, about)]
pub struct Cli {
    #[clap(subcommand)]
    pub subcommand: Option<Subcommands>,
}

#[derive(Subcommand)]
pub enum Subcommands {
    /// Search a fixed suite of positions to a fixed depth and report
    /// aggregate nodes and speed.
    Bench {
        /// Search depth per position.
        depth: Option<i32>,
        /// Worker thread count.
        threads: Option<usize>,
        /// Transposition table size in megabytes.
        hash: Option<usize>,
    },
    /// Verify move generation against published perft counts.
    Perft,
}
