use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{tablebases::SyzygyConfig, timemgmt::TimeManager};

/// Shared per-search state, borrowed by every worker: the one-shot
/// abort flag, aggregated statistics, and the clock. Each worker gets
/// its own clone; the atomics behind the references are the shared
/// part.
#[derive(Clone)]
pub struct SearchInfo<'a> {
    pub time_manager: TimeManager,
    /// One-shot abort signal for this search.
    pub stopped: &'a AtomicBool,
    /// Nodes searched, summed across the pool.
    pub nodes: &'a AtomicU64,
    /// Tablebase probe hits, summed across the pool.
    pub tbhits: &'a AtomicU64,
    /// Only the principal thread reports.
    pub print_to_stdout: bool,
    pub multi_pv: usize,
    pub chess960: bool,
    pub depth_limit: i32,
    pub syzygy: SyzygyConfig,
}

impl<'a> SearchInfo<'a> {
    pub fn new(
        time_manager: TimeManager,
        stopped: &'a AtomicBool,
        nodes: &'a AtomicU64,
        tbhits: &'a AtomicU64,
    ) -> Self {
        Self {
            time_manager,
            stopped,
            nodes,
            tbhits,
            print_to_stdout: true,
            multi_pv: 1,
            chess960: false,
            depth_limit: crate::util::MAX_DEPTH,
            syzygy: SyzygyConfig::default(),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Node-gated time check. Workers call this at every node; the
    /// clock itself is only consulted every 1024 nodes.
    pub fn check_up(&self, local_nodes: u64) -> bool {
        if local_nodes.trailing_zeros() >= 10 && self.time_manager.hard_expired() {
            self.stop();
            return true;
        }
        self.is_stopped()
    }

    pub fn add_node(&self) {
        self.nodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tbhit(&self) {
        self.tbhits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn nodes_searched(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    pub fn tbhits_counted(&self) -> u64 {
        self.tbhits.load(Ordering::Relaxed)
    }
}
