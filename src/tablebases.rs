use std::path::PathBuf;

use crate::{
    chess::board::Board,
    evaluation::{DRAW_SCORE, MATE_SCORE},
    util::MAX_DEPTH,
};

/// Win/draw/loss from the probing side's perspective.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wdl {
    Loss,
    Draw,
    Win,
}

/// Syzygy configuration, set through the `SyzygyPath` and
/// `SyzygyProbeDepth` options.
#[derive(Clone, Debug, Default)]
pub struct SyzygyConfig {
    pub path: Option<PathBuf>,
    pub probe_depth: i32,
}

impl SyzygyConfig {
    pub const fn enabled(&self) -> bool {
        self.path.is_some()
    }
}

/// The largest piece count the configured tables can answer for.
///
/// The prober proper is an external collaborator: this crate fixes the
/// interface and the gating, and ships without a backing
/// implementation, so `max_cardinality` is zero until one is linked in
/// and every probe misses.
pub fn max_cardinality(config: &SyzygyConfig) -> u32 {
    let _ = config;
    0
}

/// WDL probe for the side to move. `None` when the position is not
/// covered by the configured tables.
pub fn probe_wdl(config: &SyzygyConfig, board: &Board) -> Option<Wdl> {
    if !config.enabled() {
        return None;
    }
    if board.occupied().count() > max_cardinality(config) {
        return None;
    }
    // a real prober would consult the tables here; without one, every
    // in-cardinality position is a miss as well.
    None
}

/// Maps a WDL result into the score bands the search uses: wins and
/// losses sit just outside the deepest representable mate, pushed
/// toward zero by the distance from root.
pub const fn wdl_to_score(wdl: Wdl, height: usize) -> i32 {
    #![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    match wdl {
        Wdl::Loss => -MATE_SCORE + MAX_DEPTH + height as i32 + 1,
        Wdl::Draw => DRAW_SCORE,
        Wdl::Win => MATE_SCORE - MAX_DEPTH - height as i32 - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{is_mate_score, MATE_IN_MAX};

    #[test]
    fn unconfigured_probes_miss() {
        let config = SyzygyConfig::default();
        let board = Board::from_fen("8/8/4k3/8/8/3QK3/8/8 w - - 0 1", false).unwrap();
        assert_eq!(probe_wdl(&config, &board), None);
    }

    #[test]
    fn tb_scores_sit_outside_the_mate_band() {
        let win = wdl_to_score(Wdl::Win, 4);
        assert!(win > 0 && !is_mate_score(win));
        assert!(win < MATE_IN_MAX);
        let loss = wdl_to_score(Wdl::Loss, 4);
        assert_eq!(loss, -win);
        assert_eq!(wdl_to_score(Wdl::Draw, 9), 0);
    }
}
