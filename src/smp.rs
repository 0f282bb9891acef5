//! Multi-threaded search coordination (lazy SMP with root deferral).
//!
//! All threads run independent iterative deepening on the same root
//! position, sharing only the transposition table, the atomic stop/timeout
//! flags and counters, and one root-search slot per thread that peers read
//! to avoid duplicating root work. The main search thread serializes all
//! event delivery.

use crate::eval::Score;
use crate::moves::{Move, MOVE_NONE};
use crate::position::Position;
use crate::search::Searcher;
use crate::tt::{TranspositionTable, TT_INDEX_BITS};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Entries into the search between two consecutive clock samples.
pub const TIME_CHECK_INTERVAL: u64 = 10_000;

pub const TIME_LIMIT_MIN: u64 = 100;
pub const TIME_LIMIT_MAX: u64 = 1_000_000;
pub const TIME_LIMIT_DEFAULT: u64 = 5_000;
pub const SEARCH_DEPTH_MIN: i8 = 1;
pub const SEARCH_DEPTH_MAX: i8 = 60;
pub const SEARCH_DEPTH_DEFAULT: i8 = 10;

/// User-facing search configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub time_limit_ms: u64,
    pub thread_count: usize,
    pub search_depth: i8,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            time_limit_ms: TIME_LIMIT_DEFAULT,
            thread_count: num_cpus::get().max(1),
            search_depth: SEARCH_DEPTH_DEFAULT,
        }
    }
}

/// What a thread is currently searching at the root. Single writer (the
/// owning thread); peers read to decide deferral.
#[derive(Debug, Default)]
pub struct RootSlot {
    pub depth: AtomicI32,
    pub mv: AtomicU32,
}

/// State shared by every searcher of one search run.
pub struct SharedSearch {
    pub time_limit_ms: u64,
    pub start_time: Instant,
    stop: AtomicBool,
    external_stop: AtomicBool,
    timeout: AtomicBool,
    time_check_counter: AtomicU64,
    visited_nodes: AtomicU64,
    tt_hits: AtomicU64,
    pub root_slots: Vec<RootSlot>,
}

impl SharedSearch {
    pub fn new(options: &SearchOptions) -> Arc<Self> {
        Arc::new(SharedSearch {
            time_limit_ms: options.time_limit_ms,
            start_time: Instant::now(),
            stop: AtomicBool::new(false),
            external_stop: AtomicBool::new(false),
            timeout: AtomicBool::new(false),
            time_check_counter: AtomicU64::new(0),
            visited_nodes: AtomicU64::new(0),
            tt_hits: AtomicU64::new(0),
            root_slots: (0..options.thread_count.max(1))
                .map(|_| RootSlot::default())
                .collect(),
        })
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn request_stop(&self, external: bool) {
        if external {
            self.external_stop.store(true, Ordering::Release);
        }
        self.stop.store(true, Ordering::Release);
    }

    #[inline]
    pub fn externally_stopped(&self) -> bool {
        self.external_stop.load(Ordering::Acquire)
    }

    #[inline]
    pub fn timed_out(&self) -> bool {
        self.timeout.load(Ordering::Acquire)
    }

    /// Cooperative time poll: every TIME_CHECK_INTERVAL-th entry samples
    /// the wall clock and flips the stop/timeout flags past the limit.
    #[inline]
    pub fn check_time(&self) {
        if self.time_check_counter.fetch_add(1, Ordering::Relaxed) % TIME_CHECK_INTERVAL != 0 {
            return;
        }
        if self.start_time.elapsed().as_millis() as u64 > self.time_limit_ms {
            self.timeout.store(true, Ordering::Release);
            self.stop.store(true, Ordering::Release);
        }
    }

    #[inline]
    pub fn count_node(&self) {
        self.visited_nodes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn count_tt_hit(&self) {
        self.tt_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SearchStats {
        SearchStats {
            visited_nodes: self.visited_nodes.load(Ordering::Relaxed),
            tt_hits: self.tt_hits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResults {
    pub best_move: Move,
    pub score: Score,
    /// Last fully completed iteration depth.
    pub depth: i8,
}

impl Default for SearchResults {
    fn default() -> Self {
        SearchResults {
            best_move: MOVE_NONE,
            score: 0,
            depth: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub visited_nodes: u64,
    pub tt_hits: u64,
}

/// Events delivered to the caller-supplied processer. INFO arrives after
/// each completed main-thread iteration; FINISHED exactly once when the
/// search ends on its own (timeout or depth), never after an external stop.
#[derive(Debug, Clone, Copy)]
pub enum SearchEvent {
    Info {
        results: SearchResults,
        stats: SearchStats,
    },
    Finished {
        results: SearchResults,
        stats: SearchStats,
    },
}

pub type SearchProcesser = Arc<dyn Fn(&SearchEvent) + Send + Sync>;

/// Coordinator owning the shared table and the search thread lifecycle.
pub struct MultiSearcher {
    tt: Arc<TranspositionTable>,
    shared: Option<Arc<SharedSearch>>,
    handle: Option<JoinHandle<(SearchResults, SearchStats)>>,
    in_search: Arc<AtomicBool>,
    processer: Option<SearchProcesser>,
    last: (SearchResults, SearchStats),
}

impl MultiSearcher {
    pub fn new() -> Self {
        Self::with_table(Arc::new(TranspositionTable::new(TT_INDEX_BITS)))
    }

    /// Construct around an existing table (smaller tables in tests, a
    /// shared one across games otherwise).
    pub fn with_table(tt: Arc<TranspositionTable>) -> Self {
        MultiSearcher {
            tt,
            shared: None,
            handle: None,
            in_search: Arc::new(AtomicBool::new(false)),
            processer: None,
            last: (SearchResults::default(), SearchStats::default()),
        }
    }

    #[inline]
    pub fn is_in_search(&self) -> bool {
        self.in_search.load(Ordering::Acquire)
    }

    pub fn set_processer(&mut self, processer: SearchProcesser) {
        self.processer = Some(processer);
    }

    pub fn max_thread_count(&self) -> usize {
        num_cpus::get().max(1)
    }

    /// Launch the search on a snapshot of `pos`. Fails if one is running.
    pub fn start_search(
        &mut self,
        pos: &Position,
        options: &SearchOptions,
    ) -> Result<(), crate::errors::EngineError> {
        if self.in_search.swap(true, Ordering::AcqRel) {
            return Err(crate::errors::EngineError::Concurrency);
        }
        log::debug!(
            "starting search: depth {} threads {} time {}ms",
            options.search_depth,
            options.thread_count,
            options.time_limit_ms
        );
        let shared = SharedSearch::new(options);
        self.shared = Some(Arc::clone(&shared));
        let tt = Arc::clone(&self.tt);
        let processer = self.processer.clone();
        let root = pos.clone();
        let depth = options.search_depth;
        let threads = options.thread_count.max(1);
        self.handle = Some(
            std::thread::Builder::new()
                .name("search-main".into())
                .spawn(move || run_search(root, depth, threads, shared, tt, processer))
                .expect("unable to create valid main search thread"),
        );
        Ok(())
    }

    /// Stop (marking the stop as external) and collect results: best thread
    /// by depth, ties by score. Idempotent when no search is running.
    pub fn end_search(&mut self) -> (SearchResults, SearchStats) {
        if let Some(handle) = self.handle.take() {
            if let Some(shared) = &self.shared {
                shared.request_stop(true);
            }
            match handle.join() {
                Ok(res) => self.last = res,
                Err(_) => log::error!("search thread panicked; keeping last results"),
            }
            self.tt.bump_age();
            self.shared = None;
            self.in_search.store(false, Ordering::Release);
        }
        self.last
    }

    pub fn table(&self) -> &Arc<TranspositionTable> {
        &self.tt
    }
}

impl Default for MultiSearcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of the main search thread: spin up helpers, run our own iterative
/// deepening, join, select the best thread result and report.
fn run_search(
    root: Position,
    depth: i8,
    threads: usize,
    shared: Arc<SharedSearch>,
    tt: Arc<TranspositionTable>,
    processer: Option<SearchProcesser>,
) -> (SearchResults, SearchStats) {
    let mut helpers = Vec::with_capacity(threads.saturating_sub(1));
    for id in 1..threads {
        let mut searcher = Searcher::new(root.clone(), id, Arc::clone(&shared), Arc::clone(&tt));
        helpers.push(
            std::thread::Builder::new()
                .name(format!("search-{id}"))
                .spawn(move || searcher.id_search(depth, None))
                .expect("unable to create helper search thread"),
        );
    }

    let mut main = Searcher::new(root, 0, Arc::clone(&shared), Arc::clone(&tt));
    let mut results = vec![main.id_search(depth, processer.as_ref())];
    for handle in helpers {
        if let Ok(r) = handle.join() {
            results.push(r);
        }
    }

    let best = results
        .into_iter()
        .max_by(|a, b| (a.depth, a.score).cmp(&(b.depth, b.score)))
        .unwrap_or_default();
    let stats = shared.stats();
    log::debug!(
        "search done: best {} score {} depth {} nodes {} tt hits {}",
        best.best_move,
        best.score,
        best.depth,
        stats.visited_nodes,
        stats.tt_hits
    );
    // Only internal termination reports FINISHED; an external stop means
    // the caller is already collecting results through end_search.
    if !shared.externally_stopped() {
        if let Some(p) = &processer {
            (p.as_ref())(&SearchEvent::Finished {
                results: best,
                stats,
            });
        }
    }
    (best, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitboard::sq;
    use crate::eval::SCORE_WIN_MIN;
    use crate::moves::Move;
    use std::sync::Mutex;

    fn setup() {
        crate::init();
    }

    fn small_searcher() -> MultiSearcher {
        MultiSearcher::with_table(Arc::new(TranspositionTable::new(16)))
    }

    fn options(depth: i8, threads: usize) -> SearchOptions {
        SearchOptions {
            time_limit_ms: 60_000,
            thread_count: threads,
            search_depth: depth,
        }
    }

    #[test]
    fn test_start_end_search_returns_result() {
        setup();
        let pos = Position::start_position();
        let mut ms = small_searcher();
        ms.start_search(&pos, &options(4, 1)).unwrap();
        // Give the depth-limited search time to finish, then collect.
        std::thread::sleep(std::time::Duration::from_millis(200));
        let (results, stats) = ms.end_search();
        assert_ne!(results.best_move, MOVE_NONE);
        assert!(results.depth >= 1);
        assert!(stats.visited_nodes > 0);
        assert!(!ms.is_in_search());
    }

    #[test]
    fn test_second_start_while_searching_is_rejected() {
        setup();
        let pos = Position::start_position();
        let mut ms = small_searcher();
        ms.start_search(&pos, &options(30, 1)).unwrap();
        assert!(ms.is_in_search());
        assert!(matches!(
            ms.start_search(&pos, &options(4, 1)),
            Err(crate::errors::EngineError::Concurrency)
        ));
        ms.end_search();
    }

    #[test]
    fn test_end_search_without_start_returns_last() {
        setup();
        let mut ms = small_searcher();
        let (results, stats) = ms.end_search();
        assert_eq!(results, SearchResults::default());
        assert_eq!(stats, SearchStats::default());
    }

    #[test]
    fn test_events_info_and_finished() {
        setup();
        let pos = Position::start_position();
        let mut ms = small_searcher();
        let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        ms.set_processer(Arc::new(move |e: &SearchEvent| {
            let mut log = sink.lock().unwrap();
            match e {
                SearchEvent::Info { results, .. } => {
                    assert!(results.depth >= 1);
                    log.push("info");
                }
                SearchEvent::Finished { results, .. } => {
                    assert_ne!(results.best_move, MOVE_NONE);
                    log.push("finished");
                }
            }
        }));
        ms.start_search(&pos, &options(4, 1)).unwrap();
        // Let the depth-limited search run to internal completion.
        loop {
            {
                let log = events.lock().unwrap();
                if log.iter().any(|&e| e == "finished") {
                    break;
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        ms.end_search();
        let log = events.lock().unwrap();
        assert_eq!(log.iter().filter(|&&e| e == "finished").count(), 1);
        assert_eq!(log.iter().filter(|&&e| e == "info").count(), 4);
        // Events are ordered: all INFOs precede FINISHED.
        assert_eq!(*log.last().unwrap(), "finished");
    }

    #[test]
    fn test_external_stop_suppresses_finished() {
        setup();
        let pos = Position::start_position();
        let mut ms = small_searcher();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        ms.set_processer(Arc::new(move |e: &SearchEvent| {
            if matches!(e, SearchEvent::Finished { .. }) {
                flag.store(true, Ordering::SeqCst);
            }
        }));
        // Deep search that will not finish on its own quickly.
        ms.start_search(&pos, &options(40, 1)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        let (results, _) = ms.end_search();
        assert!(!finished.load(Ordering::SeqCst), "no FINISHED after external stop");
        // Something was still searched and reported.
        assert!(results.depth >= 0);
    }

    #[test]
    fn test_multithreaded_search_completes() {
        setup();
        let pos = Position::start_position();
        let mut ms = small_searcher();
        ms.start_search(&pos, &options(5, 4)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));
        let (results, stats) = ms.end_search();
        assert_ne!(results.best_move, MOVE_NONE);
        assert!(results.depth >= 1);
        assert!(stats.visited_nodes > 0);
    }

    #[test]
    fn test_multithreaded_mate_found() {
        setup();
        let mut pos = Position::new();
        pos.load_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", false).unwrap();
        let mut ms = small_searcher();
        ms.start_search(&pos, &options(5, 3)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(300));
        let (results, _) = ms.end_search();
        assert_eq!(results.best_move, Move::new(sq::A1, sq::A8));
        assert!(results.score >= SCORE_WIN_MIN);
    }

    #[test]
    fn test_timeout_sets_flags() {
        setup();
        let pos = Position::start_position();
        let mut ms = small_searcher();
        let opts = SearchOptions {
            time_limit_ms: TIME_LIMIT_MIN,
            thread_count: 1,
            search_depth: SEARCH_DEPTH_MAX,
        };
        ms.start_search(&pos, &opts).unwrap();
        let shared = ms.shared.as_ref().map(Arc::clone).unwrap();
        // A depth-60 search cannot finish in 100ms; the cooperative poll
        // must shut it down.
        let deadline = Instant::now() + std::time::Duration::from_secs(30);
        while ms.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            assert!(Instant::now() < deadline, "search ignored its time limit");
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(shared.timed_out());
        ms.end_search();
    }

    #[test]
    fn test_tt_age_bumped_after_search() {
        setup();
        let pos = Position::start_position();
        let mut ms = small_searcher();
        let age_before = ms.table().age();
        ms.start_search(&pos, &options(3, 1)).unwrap();
        ms.end_search();
        assert_eq!(ms.table().age(), age_before + 1);
    }
}
