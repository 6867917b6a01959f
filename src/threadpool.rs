use std::{
    collections::TryReserveError,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{Receiver, RecvTimeoutError},
        Mutex,
    },
    time::Duration,
};

use crate::{
    chess::{board::Board, chessmove::Move},
    search,
    searchinfo::SearchInfo,
    tablebases::SyzygyConfig,
    threadlocal::ThreadData,
    timemgmt::{SearchLimits, TimeManager},
    transpositiontable::TT,
};

/// Option state mirroring the UCI option list.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub hash_mb: usize,
    pub threads: usize,
    pub multi_pv: usize,
    pub move_overhead: u64,
    pub ponder: bool,
    pub chess960: bool,
    pub syzygy: SyzygyConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            hash_mb: 16,
            threads: 1,
            multi_pv: 1,
            move_overhead: 100,
            ponder: false,
            chess960: false,
            syzygy: SyzygyConfig::default(),
        }
    }
}

/// What a finished search hands back to the protocol layer.
#[derive(Debug, Default)]
pub struct SearchReport {
    pub best: Option<Move>,
    pub ponder: Option<Move>,
    /// `quit` arrived while the search was running.
    pub quit: bool,
    /// Commands received mid-search that were not ours to consume.
    pub pending: Vec<String>,
}

/// The engine handle: owns the transposition table, the worker pool,
/// and every atomic the searches share. There is no other global
/// mutable state.
pub struct Engine {
    tt: TT,
    pub options: EngineOptions,
    workers: Vec<ThreadData>,
    stopped: AtomicBool,
    pondering: AtomicBool,
    nodes: AtomicU64,
    tbhits: AtomicU64,
    /// Serializes search acceptance: `isready` answers only once this
    /// can be taken, and reconfiguration refuses to run without it.
    ready: Mutex<()>,
}

impl Engine {
    pub fn new() -> Self {
        let options = EngineOptions::default();
        let mut tt = TT::new();
        tt.resize(options.hash_mb)
            .expect("default table allocation failed");
        let board = Board::startpos();
        Self {
            tt,
            options,
            workers: vec![ThreadData::new(0, &board)],
            stopped: AtomicBool::new(false),
            pondering: AtomicBool::new(false),
            nodes: AtomicU64::new(0),
            tbhits: AtomicU64::new(0),
            ready: Mutex::new(()),
        }
    }

    /// Blocks until no search is mid-operation.
    pub fn wait_ready(&self) {
        drop(self.ready.lock().unwrap());
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.pondering.store(false, Ordering::SeqCst);
    }

    pub fn ponderhit(&self) {
        self.pondering.store(false, Ordering::SeqCst);
    }

    pub fn nodes_searched(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    /// Reallocate the table. Refused implicitly during search, since
    /// option commands are only processed between searches.
    pub fn set_hash(&mut self, megabytes: usize) -> Result<(), TryReserveError> {
        self.tt.resize(megabytes)?;
        self.options.hash_mb = megabytes;
        Ok(())
    }

    /// Tear down and rebuild the worker pool.
    pub fn set_threads(&mut self, threads: usize) {
        self.options.threads = threads;
        let board = Board::startpos();
        self.workers = (0..threads).map(|id| ThreadData::new(id, &board)).collect();
    }

    /// `ucinewgame`: forget everything learned from the previous game.
    pub fn new_game(&mut self) {
        self.tt.clear(self.options.threads);
        for worker in &mut self.workers {
            worker.clear_for_new_game();
        }
    }

    /// Runs a full search of `board` under `limits` across the worker
    /// pool, blocking until every worker returns. Lazy SMP: each worker
    /// deepens independently on its own clone, cooperating only through
    /// the shared table; the thread that called us watches the clock
    /// and the control stream, and raises the one-shot abort flag.
    pub fn search_position(
        &mut self,
        board: &Board,
        limits: &SearchLimits,
        stdin: Option<&Receiver<String>>,
    ) -> SearchReport {
        let guard = self.ready.lock().unwrap();

        self.stopped.store(false, Ordering::SeqCst);
        self.pondering.store(limits.ponder, Ordering::SeqCst);
        self.nodes.store(0, Ordering::Relaxed);
        self.tbhits.store(0, Ordering::Relaxed);
        self.tt.increase_age();

        let time_manager = TimeManager::new(limits, self.options.move_overhead);
        let mut base_info = SearchInfo::new(
            time_manager,
            &self.stopped,
            &self.nodes,
            &self.tbhits,
        );
        base_info.multi_pv = self.options.multi_pv;
        base_info.chess960 = board.chess960() || self.options.chess960;
        base_info.depth_limit = limits.depth_limit();
        base_info.syzygy = self.options.syzygy.clone();

        for worker in &mut self.workers {
            worker.prepare_for_search(board, base_info.multi_pv);
        }

        let mut report = SearchReport::default();

        std::thread::scope(|s| {
            let tt_view = self.tt.view();
            let handles: Vec<_> = self
                .workers
                .iter_mut()
                .enumerate()
                .map(|(id, worker)| {
                    let mut info = base_info.clone();
                    info.print_to_stdout = id == 0;
                    s.spawn(move || search::iterative_deepening(worker, &mut info, tt_view))
                })
                .collect();

            // deadline and control-stream watch, from the accepting
            // thread: raise the abort flag, never touch worker state.
            while handles.iter().any(|handle| !handle.is_finished()) {
                if base_info.time_manager.hard_expired() {
                    self.stopped.store(true, Ordering::SeqCst);
                    self.pondering.store(false, Ordering::SeqCst);
                }
                if let Some(rx) = stdin {
                    while let Ok(line) = rx.try_recv() {
                        // only field-level access here: the workers are
                        // mutably borrowed for the whole scope.
                        match line.trim() {
                            "stop" => {
                                self.stopped.store(true, Ordering::SeqCst);
                                self.pondering.store(false, Ordering::SeqCst);
                            }
                            "quit" => {
                                self.stopped.store(true, Ordering::SeqCst);
                                self.pondering.store(false, Ordering::SeqCst);
                                report.quit = true;
                            }
                            "ponderhit" => self.pondering.store(false, Ordering::SeqCst),
                            other => report.pending.push(other.to_string()),
                        }
                    }
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        });

        // the UCI contract: no bestmove while the pondering flag holds.
        while self.pondering.load(Ordering::SeqCst) && !report.quit {
            let Some(rx) = stdin else {
                break;
            };
            match rx.recv_timeout(Duration::from_millis(10)) {
                Ok(line) => match line.trim() {
                    "stop" => self.stop(),
                    "quit" => {
                        self.stop();
                        report.quit = true;
                    }
                    "ponderhit" => self.ponderhit(),
                    other => report.pending.push(other.to_string()),
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        drop(guard);

        let principal = &self.workers[0];
        if let Some(line) = principal.best_line() {
            report.best = line.best_move();
            report.ponder = line.ponder_move();
        }
        report
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::types::Square;

    fn depth_limits(depth: i32) -> SearchLimits {
        SearchLimits {
            depth: Some(depth),
            ..SearchLimits::default()
        }
    }

    #[test]
    fn finds_a_legal_opening_move() {
        let mut engine = Engine::new();
        let mut board = Board::startpos();
        let report = engine.search_position(&board, &depth_limits(1), None);
        let best = report.best.expect("no best move from startpos");
        assert!(board.gen_legal().contains(&best));
        assert!(!report.quit);
    }

    #[test]
    fn finds_mate_in_one() {
        let mut engine = Engine::new();
        let board = Board::from_fen("6k1/6pp/8/8/8/8/6PP/R6K w - - 0 1", false).unwrap();
        let report = engine.search_position(&board, &depth_limits(5), None);
        assert_eq!(report.best, Some(Move::new(Square::A1, Square::A8)));
    }

    #[test]
    fn stalemate_yields_no_move() {
        let mut engine = Engine::new();
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", false).unwrap();
        let report = engine.search_position(&board, &depth_limits(5), None);
        assert_eq!(report.best, None);
    }

    #[test]
    fn repetition_shuffle_scores_zero() {
        use crate::chess::board::Undo;
        let mut engine = Engine::new();
        let mut board = Board::startpos();
        let mut undo = Undo::default();
        for m in [
            Move::new(Square::G1, Square::F3),
            Move::new(Square::G8, Square::F6),
            Move::new(Square::F3, Square::G1),
            Move::new(Square::F6, Square::G8),
            Move::new(Square::G1, Square::F3),
            Move::new(Square::G8, Square::F6),
            Move::new(Square::F3, Square::G1),
            Move::new(Square::F6, Square::G8),
        ] {
            board.apply_move(m, &mut undo);
        }
        // the root position is the third occurrence: an immediate draw.
        assert!(board.drawn_by_repetition(0));
    }

    #[test]
    fn multi_pv_reports_distinct_moves() {
        let mut engine = Engine::new();
        engine.options.multi_pv = 3;
        let board = Board::startpos();
        let _ = engine.search_position(&board, &depth_limits(4), None);
        let lines = &engine.workers[0].root_lines;
        assert_eq!(lines.len(), 3);
        let mut firsts: Vec<_> = lines.iter().filter_map(|l| l.best_move()).collect();
        assert_eq!(firsts.len(), 3);
        firsts.sort_unstable();
        firsts.dedup();
        assert_eq!(firsts.len(), 3, "MultiPV slots repeated a root move");
    }

    #[test]
    fn deeper_search_is_at_least_as_strong_on_mates() {
        // queen and rook against a bare king: the score must reflect
        // the overwhelming advantage.
        let mut engine = Engine::new();
        let board =
            Board::from_fen("6k1/5ppp/8/8/8/8/1Q6/4K2R w - - 0 1", false).unwrap();
        let report = engine.search_position(&board, &depth_limits(6), None);
        assert!(report.best.is_some());
        let score = engine.workers[0].root_lines[0].score;
        assert!(score > 0, "winning position scored {score}");
    }

    #[test]
    fn abort_flag_stops_promptly() {
        use std::sync::mpsc;
        let mut engine = Engine::new();
        let board = Board::startpos();
        let (tx, rx) = mpsc::channel();
        tx.send("stop".to_string()).unwrap();
        let start = std::time::Instant::now();
        let limits = SearchLimits {
            infinite: true,
            ..SearchLimits::default()
        };
        let report = engine.search_position(&board, &limits, Some(&rx));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!report.quit);
    }
}
