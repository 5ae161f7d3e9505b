use crate::commit::CommitMessage;
use crate::hashes::longest_match;
use crate::report::WinningState;
use crate::DEFAULT_TERMINATE_AT;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CpuConfig {
    /// Match length (digest bytes) that ends the search.
    pub terminate_at: usize,
    /// Workers report progress and poll the stop flag once per this
    /// many hashes.
    pub count_divisor: u64,
    pub num_workers: usize,
}

impl Default for CpuConfig {
    fn default() -> CpuConfig {
        CpuConfig {
            terminate_at: DEFAULT_TERMINATE_AT,
            count_divisor: 16 * 1024,
            num_workers: num_cpus::get().max(1),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Tick {
    Running,
    Done,
}

// Per-worker snapshot, published under the boss mutex. Workers keep
// their own copies and only write here at count-divisor boundaries, on
// a best-so-far improvement, or on a match.
#[derive(Debug, Default)]
struct WorkerSlot {
    running: bool,
    count: u64,
    best: usize,
    best_atime: i64,
    best_ctime: i64,
    match_found: bool,
}

#[derive(Debug, Default)]
struct MinerState {
    stop_requested: bool,
    search_done: bool,
    workers: Vec<WorkerSlot>,
}

struct SharedMiner {
    lock: Mutex<MinerState>,
    cond: Condvar,
}

/// The CPU search engine: one worker thread per logical CPU, each
/// sweeping a slice of the author-timestamp axis and bumping the
/// committer timestamp when its slice is exhausted. A boss loop polls
/// at 1 Hz for progress and termination.
pub struct CpuMiner {
    orig: CommitMessage,
    config: CpuConfig,
    atime_hint: i64,
    ctime_hint: i64,
    shared: Arc<SharedMiner>,
    handles: Vec<JoinHandle<()>>,
    started_at: Instant,
    last_best: usize,
}

impl CpuMiner {
    pub fn new(orig: CommitMessage, atime_hint: i64, ctime_hint: i64, config: CpuConfig) -> CpuMiner {
        let mut atime_hint = atime_hint;
        let mut ctime_hint = ctime_hint;
        if atime_hint < orig.atime() {
            if atime_hint != 0 {
                eprintln!(
                    "invalid atime_hint {} (must be at least {})",
                    atime_hint,
                    orig.atime()
                );
            }
            atime_hint = orig.atime();
        }
        if ctime_hint < orig.ctime() {
            if ctime_hint != 0 {
                eprintln!(
                    "invalid ctime_hint {} (must be at least {})",
                    ctime_hint,
                    orig.ctime()
                );
            }
            ctime_hint = orig.ctime();
        }
        CpuMiner {
            orig,
            config,
            atime_hint,
            ctime_hint,
            shared: Arc::new(SharedMiner {
                lock: Mutex::new(MinerState::default()),
                cond: Condvar::new(),
            }),
            handles: Vec::new(),
            started_at: Instant::now(),
            last_best: 0,
        }
    }

    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            eprintln!("pool not empty - already started?");
            return;
        }
        let n = self.config.num_workers;
        {
            let mut st = self.shared.lock.lock().unwrap();
            st.workers = (0..n)
                .map(|_| WorkerSlot {
                    running: true,
                    ..WorkerSlot::default()
                })
                .collect();
        }
        for id in 0..n {
            let shared = Arc::clone(&self.shared);
            let noodle = self.orig.clone();
            let atime_hint = self.atime_hint;
            let ctime_hint = self.ctime_hint;
            let terminate_at = self.config.terminate_at;
            let count_divisor = self.config.count_divisor.max(1);
            self.handles.push(thread::spawn(move || {
                worker(
                    shared,
                    id,
                    n,
                    noodle,
                    atime_hint,
                    ctime_hint,
                    terminate_at,
                    count_divisor,
                )
            }));
        }
        self.started_at = Instant::now();
    }

    /// Waits up to one second for news from the workers, then reports
    /// progress. Returns `Done` once a match was found or every worker
    /// has quit.
    pub fn tick_1hz(&mut self) -> Tick {
        let total_work =
            (((self.ctime_hint - self.atime_hint) as u64) / self.config.count_divisor).max(1);
        let deadline = Instant::now() + Duration::from_secs(1);
        let (total, best) = {
            let mut st = self.shared.lock.lock().unwrap();
            loop {
                let timeout = deadline.saturating_duration_since(Instant::now());
                st = self.shared.cond.wait_timeout(st, timeout).unwrap().0;
                if st.search_done {
                    return Tick::Done;
                }
                let mut any_running = false;
                let mut total = 0u64;
                let mut best = 0usize;
                for w in &st.workers {
                    if w.best > best {
                        best = w.best;
                    }
                    if w.running {
                        any_running = true;
                        total += w.count;
                    }
                }
                if !any_running {
                    return Tick::Done;
                }
                if Instant::now() < deadline {
                    continue;
                }
                break (total, best);
            }
        };
        eprintln!(
            "{:4.1}s progress: {:6.2}%   best:{}  100%={:.2} MHash",
            self.started_at.elapsed().as_secs_f32(),
            100.0 * total as f32 / total_work as f32,
            best,
            total_work as f32 * self.config.count_divisor as f32 / 1e6
        );
        if best > self.last_best {
            self.last_best = best;
            self.dump_match_at(best);
        }
        Tick::Running
    }

    /// Asks every worker to quit and joins them, grumbling if they take
    /// more than five seconds.
    pub fn stop(&mut self) {
        {
            let mut st = self.shared.lock.lock().unwrap();
            st.stop_requested = true;
            self.shared.cond.notify_all();
        }
        let mut patience = 5u32;
        loop {
            if patience == 0 {
                eprintln!("Out of patience! Threads seem to be deadlocked.");
                break;
            }
            if patience != 5 {
                eprintln!("stop: wait {}s", patience);
            }
            if self.tick_1hz() == Tick::Done {
                break;
            }
            patience -= 1;
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn search_done(&self) -> bool {
        self.shared.lock.lock().unwrap().search_done
    }

    /// Recomputes the digests at the winning timestamps. `None` until a
    /// worker has found a match of the configured length.
    pub fn winning_state(&self) -> Option<WinningState> {
        let (atime, ctime) = {
            let st = self.shared.lock.lock().unwrap();
            let w = st.workers.iter().find(|w| w.match_found)?;
            (w.best_atime, w.best_ctime)
        };
        let mut noodle = self.orig.clone();
        noodle.set_atime(atime);
        noodle.set_ctime(ctime);
        let (sha, b2) = noodle.hash();
        let m = longest_match(&sha.0, &b2.0);
        Some(WinningState {
            atime,
            ctime,
            sha_hex: sha.to_string(),
            b2_hex: b2.to_string(),
            match_offset: m.offset * 2,
            match_len: m.len,
        })
    }

    // Re-hashes the best candidate a worker has published and dumps
    // both digests, the way a human watching stderr wants to see them.
    fn dump_match_at(&self, wanted: usize) {
        let found = {
            let st = self.shared.lock.lock().unwrap();
            st.workers
                .iter()
                .enumerate()
                .find(|(_, w)| w.best >= wanted)
                .map(|(i, w)| (i, w.best_atime, w.best_ctime))
        };
        let (id, atime, ctime) = match found {
            Some(f) => f,
            None => {
                eprintln!("No best of {} found.", wanted);
                return;
            }
        };
        let mut noodle = self.orig.clone();
        noodle.set_atime(atime);
        noodle.set_ctime(ctime);
        let (sha, b2) = noodle.hash();
        eprintln!("Thread {} says:", id);
        eprintln!("sha1:   {}", sha);
        eprintln!("blake2: {}", b2);
        eprintln!("author time={}", atime);
        eprintln!("committer  ={}", ctime);
    }
}

#[allow(clippy::too_many_arguments)]
fn worker(
    shared: Arc<SharedMiner>,
    id: usize,
    n: usize,
    mut noodle: CommitMessage,
    atime_hint: i64,
    ctime_hint: i64,
    terminate_at: usize,
    count_divisor: u64,
) {
    noodle.set_ctime(ctime_hint);
    let mut local_best = 0usize;
    let mut my_count = 1u64;
    'search: loop {
        // Re-partition every pass: the window grows by one as ctime
        // advances.
        let total = noodle.ctime() - atime_hint;
        let my_work_start = atime_hint + id as i64 * total / n as i64;
        let my_work_end = atime_hint + (id as i64 + 1) * total / n as i64;
        for t in my_work_start..my_work_end {
            if my_count % count_divisor == 0 {
                my_count = 0;
                let mut st = shared.lock.lock().unwrap();
                st.workers[id].count += 1;
                if st.stop_requested || st.search_done {
                    break 'search;
                }
            }
            my_count += 1;
            noodle.set_atime(t);
            let (sha, b2) = noodle.hash();
            let m = longest_match(&sha.0, &b2.0);
            if m.len > local_best {
                local_best = m.len;
                let mut st = shared.lock.lock().unwrap();
                let w = &mut st.workers[id];
                w.best = m.len;
                w.best_atime = t;
                w.best_ctime = noodle.ctime();
            }
            if m.len >= terminate_at {
                let mut st = shared.lock.lock().unwrap();
                st.workers[id].match_found = true;
                st.search_done = true;
                shared.cond.notify_all();
                break 'search;
            }
        }
        noodle.set_ctime(noodle.ctime() + 1);
    }
    let mut st = shared.lock.lock().unwrap();
    st.workers[id].running = false;
    shared.cond.notify_all();
}
