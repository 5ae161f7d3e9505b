use crate::commit::CommitMessage;
use crate::device;
use crate::report::WinningState;
use crate::{Error, Result, MIN_MATCH_LEN};
use ocl::enums::ProfilingInfo;
use ocl::flags::{CommandQueueProperties, MemFlags};
use ocl::{Buffer, Context, Event, Kernel, Program, Queue};
use std::time::{Duration, Instant};

static KERNEL_SRC: &str = include_str!("b2sha_miner.cl");
const KERNEL_NAME: &str = "mine";

const SHA_BLOCK: usize = 64;
// Must match MSG_MAX_BLOCKS in b2sha_miner.cl.
const MAX_MSG_BLOCKS: usize = 16;

// The tuner starts here and doubles until throughput stops improving.
const INITIAL_WORKERS: usize = 512 * 3;
const MAX_WORKERS: usize = 1 << 17;

const SHA1_IV: [u32; 5] = [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476, 0xc3d2e1f0];

const BLAKE2B_IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

/// Per-batch parameters every worker shares. The final-block words for
/// SHA-1 are precomputed on the host: `last_full_padding` is the 0x80
/// terminator positioned within its big-endian word, `last_full_len` is
/// the 64-bit bit count, and `zero_padding_and_len` selects the case
/// where the length no longer fits in the last data block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct B2ShaConst {
    pub b2iv: [u64; 8],
    pub shaiv: [u32; 5],
    pub len: u32,
    pub bytes_remaining: u32,
    pub buffers: u32,
    pub last_full_padding: u32,
    pub last_full_len: [u32; 2],
    pub zero_padding_and_len: u32,
}

unsafe impl ocl::OclPrm for B2ShaConst {}

impl B2ShaConst {
    pub(crate) fn for_message(len: usize) -> B2ShaConst {
        let rem = (len % 64) as u32;
        let bits = (len as u64) * 8;
        B2ShaConst {
            b2iv: BLAKE2B_IV,
            shaiv: SHA1_IV,
            len: len as u32,
            bytes_remaining: len as u32,
            buffers: ((len + SHA_BLOCK - 1) / SHA_BLOCK) as u32,
            last_full_padding: 0x80u32 << (24 - 8 * (rem % 4)),
            last_full_len: [(bits >> 32) as u32, bits as u32],
            zero_padding_and_len: (rem == 0 || rem >= 56) as u32,
        }
    }
}

/// Per-worker state. The host fills in the timestamp digit positions
/// and iteration counts; the kernel writes back its digests and the
/// best match it saw. `match_len` starts at MIN_MATCH_LEN, meaning "no
/// match"; `match_count`/`match_ctime_count` are the steps that
/// *remained* when the best match was recorded, which is what makes the
/// host-side reconstruction `a_end(i) - match_count` exact.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct B2ShaState {
    pub b2hash: [u64; 8],
    pub hash: [u32; 5],
    pub counter_pos: u32,
    pub ctime_pos: u32,
    pub counts: u32,
    pub ctime_count: u32,
    pub match_count: u32,
    pub match_ctime_count: u32,
    pub match_len: u32,
}

unsafe impl ocl::OclPrm for B2ShaState {}

impl Default for B2ShaState {
    fn default() -> B2ShaState {
        B2ShaState {
            b2hash: [0; 8],
            hash: [0; 5],
            counter_pos: 0,
            ctime_pos: 0,
            counts: 1,
            ctime_count: 1,
            match_count: 0,
            match_ctime_count: 0,
            match_len: MIN_MATCH_LEN as u32,
        }
    }
}

/// One 64-byte slice of the serialized commit, packed little-endian
/// word by word.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct B2ShaBuffer {
    pub words: [u32; 16],
}

unsafe impl ocl::OclPrm for B2ShaBuffer {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// All workers share one committer-time window; the author-time
    /// axis is split between them.
    CtimeLockstep,
    /// Committer time has caught up to author time: split the committer
    /// window instead and sweep author times up to each committer time.
    AtimeLockstep,
}

/// Maps `(num_workers, atime_start, ctime_start)` to per-worker
/// `[a_first, a_end) x [c_first, c_end)` intervals. Pure arithmetic;
/// the batch preparer reads it, `mark_all_ctime_done` advances it.
#[derive(Debug, Clone)]
pub struct WorkAllocator {
    num_workers: usize,
    atime_start: i64,
    ctime_start: i64,
    ctime_count: i64,
    max_cu: i64,
    mode: Mode,
}

impl WorkAllocator {
    pub fn new(atime_start: i64, ctime_start: i64, max_cu: u32) -> WorkAllocator {
        let mut alloc = WorkAllocator {
            num_workers: 1,
            atime_start,
            ctime_start,
            ctime_count: 1,
            max_cu: i64::from(max_cu.max(1)),
            mode: Mode::CtimeLockstep,
        };
        alloc.set_num_workers(1);
        alloc
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn ctime_start(&self) -> i64 {
        self.ctime_start
    }

    pub fn ctime_count(&self) -> i64 {
        self.ctime_count
    }

    fn atime_work(&self) -> i64 {
        self.ctime_start - self.atime_start
    }

    /// Picks the mode and sizes the committer window so the estimated
    /// per-worker workload stays bounded.
    pub fn set_num_workers(&mut self, n: usize) {
        self.num_workers = n.max(1);
        let atime_work = self.atime_work();
        if atime_work > 0 {
            self.mode = Mode::CtimeLockstep;
            let each_work = self.num_workers as i64 * self.max_cu * 32 / atime_work;
            self.ctime_count = each_work.max(1);
        } else {
            self.mode = Mode::AtimeLockstep;
            self.ctime_count = 1024;
        }
    }

    pub fn a_first(&self, i: usize) -> i64 {
        match self.mode {
            Mode::CtimeLockstep => {
                self.atime_start + i as i64 * self.atime_work() / self.num_workers as i64
            }
            Mode::AtimeLockstep => self.atime_start,
        }
    }

    pub fn a_end(&self, i: usize) -> i64 {
        match self.mode {
            Mode::CtimeLockstep => {
                self.atime_start + (i as i64 + 1) * self.atime_work() / self.num_workers as i64
            }
            Mode::AtimeLockstep => (self.atime_start + self.atime_work() - 1).max(self.c_first(i)) + 1,
        }
    }

    pub fn c_first(&self, i: usize) -> i64 {
        match self.mode {
            Mode::CtimeLockstep => self.ctime_start,
            Mode::AtimeLockstep => {
                self.ctime_start + i as i64 * self.ctime_count / self.num_workers as i64
            }
        }
    }

    pub fn c_end(&self, i: usize) -> i64 {
        match self.mode {
            Mode::CtimeLockstep => self.ctime_start + self.ctime_count,
            Mode::AtimeLockstep => {
                self.ctime_start + (i as i64 + 1) * self.ctime_count / self.num_workers as i64
            }
        }
    }

    /// Advances the committer window past everything this batch covers.
    pub fn mark_all_ctime_done(&mut self) {
        self.ctime_start += self.ctime_count;
    }

    /// Grid points one batch covers.
    pub fn work_count(&self) -> i64 {
        (self.ctime_start - self.atime_start) * self.ctime_count
    }
}

// One half of the ping-pong pipeline. Owns its device buffers, its own
// kernel handle (setArg on a shared kernel would race the sibling), and
// the events for the batch in flight.
struct Prep {
    queue: Queue,
    kernel: Kernel,
    alloc: WorkAllocator,
    fixed: Buffer<B2ShaConst>,
    state: Buffer<B2ShaState>,
    buf: Buffer<B2ShaBuffer>,
    host_state: Vec<B2ShaState>,
    result: Vec<B2ShaState>,
    kernel_event: Event,
    read_event: Event,
    max_workers: usize,
    blocks_per_worker: usize,
    num_workers: usize,
    // Kernel reports matches strictly longer than this.
    match_floor: u32,
    work_since_prev: i64,
    times_valid: bool,
    last_rate: Option<f64>,
}

impl Prep {
    // Allocations happen once here and are reused for every batch.
    fn new(
        queue: Queue,
        program: &Program,
        alloc: WorkAllocator,
        max_workers: usize,
        blocks_per_worker: usize,
        match_floor: u32,
    ) -> Result<Prep> {
        let fixed = Buffer::<B2ShaConst>::builder()
            .queue(queue.clone())
            .flags(MemFlags::new().read_only())
            .len(1)
            .build()?;
        let state = Buffer::<B2ShaState>::builder()
            .queue(queue.clone())
            .flags(MemFlags::new().read_write())
            .len(max_workers)
            .build()?;
        let buf = Buffer::<B2ShaBuffer>::builder()
            .queue(queue.clone())
            .flags(MemFlags::new().read_only())
            .len(max_workers * blocks_per_worker)
            .build()?;
        let kernel = Kernel::builder()
            .program(program)
            .name(KERNEL_NAME)
            .queue(queue.clone())
            .global_work_size(1)
            .arg(&fixed)
            .arg(&state)
            .arg(&buf)
            .build()?;
        Ok(Prep {
            queue,
            kernel,
            alloc,
            fixed,
            state,
            buf,
            host_state: Vec::new(),
            result: Vec::new(),
            kernel_event: Event::empty(),
            read_event: Event::empty(),
            max_workers,
            blocks_per_worker,
            num_workers: 1,
            match_floor,
            work_since_prev: 0,
            times_valid: false,
            last_rate: None,
        })
    }

    fn set_num_workers(&mut self, n: usize) {
        self.num_workers = n.clamp(1, self.max_workers);
        self.alloc.set_num_workers(self.num_workers);
    }

    /// Serializes one noodle per worker, records the digit positions and
    /// iteration counts, and uploads the batch. Every worker in a batch
    /// must serialize to the same length (the kernel indexes buffers by
    /// a fixed block count, and the digit positions are per-batch).
    fn build(&mut self, commit: &CommitMessage) -> Result<()> {
        let n = self.num_workers;
        self.times_valid = false;
        self.host_state.clear();
        self.host_state.resize(n, B2ShaState::default());
        let mut noodle = commit.clone();
        let mut cpubuf: Vec<B2ShaBuffer> = Vec::with_capacity(n * self.blocks_per_worker);
        let mut fixed: Option<B2ShaConst> = None;
        let mut blocks = 0usize;
        for i in 0..n {
            noodle.set_atime(self.alloc.a_first(i));
            noodle.set_ctime(self.alloc.c_first(i));
            let bytes = noodle.serialize();
            match &fixed {
                None => {
                    blocks = (bytes.len() + SHA_BLOCK - 1) / SHA_BLOCK;
                    if blocks > self.blocks_per_worker {
                        return Err(Error::Bug(format!(
                            "commit grew to {} blocks, buffers hold {}",
                            blocks, self.blocks_per_worker
                        )));
                    }
                    fixed = Some(B2ShaConst::for_message(bytes.len()));
                }
                Some(f) => {
                    if bytes.len() as u32 != f.len {
                        return Err(Error::Bug(format!(
                            "timestamp width changed within a batch ({} vs {} bytes)",
                            bytes.len(),
                            f.len
                        )));
                    }
                }
            }
            let st = &mut self.host_state[i];
            st.counter_pos = noodle.atime_digit_offset() as u32;
            st.ctime_pos = noodle.ctime_digit_offset() as u32;
            st.counts = (self.alloc.a_end(i) - self.alloc.a_first(i)).max(0) as u32;
            st.ctime_count = (self.alloc.c_end(i) - self.alloc.c_first(i)).max(0) as u32;
            st.match_len = self.match_floor;
            append_blocks(&mut cpubuf, &bytes, blocks);
        }
        let fixed = fixed.expect("a batch always has at least one worker");
        self.work_since_prev = self.alloc.work_count();
        self.upload(fixed, &cpubuf)
    }

    /// The self-test batch: one worker, the commit's own timestamps,
    /// a single grid point.
    fn build_identity(&mut self, commit: &CommitMessage) -> Result<()> {
        self.num_workers = 1;
        self.times_valid = false;
        self.host_state.clear();
        let mut st = B2ShaState::default();
        st.counter_pos = commit.atime_digit_offset() as u32;
        st.ctime_pos = commit.ctime_digit_offset() as u32;
        self.host_state.push(st);
        let bytes = commit.serialize();
        let blocks = (bytes.len() + SHA_BLOCK - 1) / SHA_BLOCK;
        if blocks > self.blocks_per_worker {
            return Err(Error::Bug(format!(
                "commit needs {} blocks, buffers hold {}",
                blocks, self.blocks_per_worker
            )));
        }
        let mut cpubuf = Vec::with_capacity(blocks);
        append_blocks(&mut cpubuf, &bytes, blocks);
        self.work_since_prev = 1;
        self.upload(B2ShaConst::for_message(bytes.len()), &cpubuf)
    }

    fn upload(&mut self, fixed: B2ShaConst, cpubuf: &[B2ShaBuffer]) -> Result<()> {
        self.fixed.cmd().write(&[fixed][..]).enq()?;
        self.state.cmd().write(&self.host_state[..]).enq()?;
        self.buf.cmd().write(cpubuf).enq()?;
        Ok(())
    }

    /// Enqueues the kernel and a non-blocking readback of the state,
    /// then flushes so the device can get going. Nothing blocks here;
    /// `wait` blocks on the readback event.
    fn start(&mut self) -> Result<()> {
        self.kernel_event = Event::empty();
        self.read_event = Event::empty();
        unsafe {
            self.kernel
                .cmd()
                .global_work_size(self.num_workers)
                .enew(&mut self.kernel_event)
                .enq()?;
        }
        self.result.clear();
        self.result.resize(self.num_workers, B2ShaState::default());
        unsafe {
            self.state
                .cmd()
                .read(&mut self.result[..])
                .block(false)
                .enew(&mut self.read_event)
                .enq()?;
        }
        self.queue.flush()?;
        Ok(())
    }

    /// Blocks until the readback lands. With `sync_for_profiling`, also
    /// drains the queue so the event profiling counters are populated,
    /// and caches the achieved work rate for the tuner.
    fn wait(&mut self, sync_for_profiling: bool) -> Result<()> {
        self.read_event.wait_for().map_err(ocl::Error::from)?;
        if sync_for_profiling {
            self.queue.finish()?;
            self.times_valid = true;
            self.last_rate = Some(self.work_rate()?);
        }
        Ok(())
    }

    // submit-to-end time of the kernel, nanoseconds.
    fn submit_time(&self) -> Result<u64> {
        let submit = self
            .kernel_event
            .profiling_info(ProfilingInfo::Submit)
            .map_err(ocl::Error::from)?
            .time()
            .map_err(ocl::Error::from)?;
        let end = self
            .kernel_event
            .profiling_info(ProfilingInfo::End)
            .map_err(ocl::Error::from)?
            .time()
            .map_err(ocl::Error::from)?;
        Ok(end.saturating_sub(submit))
    }

    #[allow(dead_code)]
    fn exec_time(&self) -> Result<u64> {
        let start = self
            .kernel_event
            .profiling_info(ProfilingInfo::Start)
            .map_err(ocl::Error::from)?
            .time()
            .map_err(ocl::Error::from)?;
        let end = self
            .kernel_event
            .profiling_info(ProfilingInfo::End)
            .map_err(ocl::Error::from)?
            .time()
            .map_err(ocl::Error::from)?;
        Ok(end.saturating_sub(start))
    }

    // Grid points per nanosecond across the last profiled batch.
    fn work_rate(&self) -> Result<f64> {
        let ns = self.submit_time()?;
        if ns == 0 {
            return Ok(0.0);
        }
        Ok(self.work_since_prev as f64 / ns as f64)
    }
}

/// The OpenCL search engine: two batch preparers ping-pong so the host
/// serializes and uploads batch i+1 while the device crunches batch i.
/// Batch sizing is auto-tuned from event profiling until throughput
/// stops improving.
pub struct GpuMiner {
    commit: CommitMessage,
    terminate_at: usize,
    queue: Queue,
    preps: Vec<Prep>,
    num_workers: usize,
    max_workers: usize,
    started_at: Instant,
}

impl GpuMiner {
    /// Whether any OpenCL device can be found at all.
    pub fn gpus_available() -> bool {
        device::gpus_available()
    }

    pub fn new(
        commit: CommitMessage,
        atime_hint: i64,
        ctime_hint: i64,
        terminate_at: usize,
    ) -> Result<GpuMiner> {
        let mut atime_hint = atime_hint;
        let mut ctime_hint = ctime_hint;
        if atime_hint < commit.atime() {
            if atime_hint != 0 {
                eprintln!(
                    "invalid atime_hint {} (must be at least {})",
                    atime_hint,
                    commit.atime()
                );
            }
            atime_hint = commit.atime();
        }
        if ctime_hint < commit.ctime() {
            if ctime_hint != 0 {
                eprintln!(
                    "invalid ctime_hint {} (must be at least {})",
                    ctime_hint,
                    commit.ctime()
                );
            }
            ctime_hint = commit.ctime();
        }

        let picked = device::best_device()?;
        eprintln!("Selected OpenCL:");
        device::dump_device(&picked)?;

        let context = Context::builder()
            .platform(picked.platform)
            .devices(picked.device)
            .build()?;
        let program = Program::builder()
            .devices(picked.device)
            .src(KERNEL_SRC)
            .cmplr_opt(device::compiler_options(&picked.device)?)
            .build(&context)?;
        let queue = Queue::new(
            &context,
            picked.device,
            Some(CommandQueueProperties::new().profiling()),
        )?;

        let blocks_per_worker = (commit.serialize().len() + SHA_BLOCK - 1) / SHA_BLOCK + 1;
        if blocks_per_worker > MAX_MSG_BLOCKS {
            return Err(Error::Device(format!(
                "commit is {} SHA-1 blocks long, the kernel handles at most {}",
                blocks_per_worker, MAX_MSG_BLOCKS
            )));
        }

        // The kernel only reports matches strictly longer than this, so
        // a lowered terminate length lowers the reporting floor with it.
        let match_floor = MIN_MATCH_LEN.min(terminate_at.saturating_sub(1)) as u32;
        let alloc = WorkAllocator::new(atime_hint, ctime_hint, picked.max_compute_units);
        let preps = vec![
            Prep::new(
                queue.clone(),
                &program,
                alloc.clone(),
                MAX_WORKERS,
                blocks_per_worker,
                match_floor,
            )?,
            Prep::new(
                queue.clone(),
                &program,
                alloc,
                MAX_WORKERS,
                blocks_per_worker,
                match_floor,
            )?,
        ];

        Ok(GpuMiner {
            commit,
            terminate_at,
            queue,
            preps,
            num_workers: INITIAL_WORKERS.min(MAX_WORKERS),
            max_workers: MAX_WORKERS,
            started_at: Instant::now(),
        })
    }

    /// Runs until one candidate reported by the kernel survives CPU
    /// re-verification at the configured match length.
    pub fn search(&mut self) -> Result<WinningState> {
        let outcome = self.run();
        // Drain the queue whatever happened: a sibling batch (and its
        // readback into a host vector) may still be in flight.
        let _ = self.queue.finish();
        outcome
    }

    fn run(&mut self) -> Result<WinningState> {
        self.self_test()?;

        self.started_at = Instant::now();
        let mut num_workers = self.num_workers;
        {
            let prep = &mut self.preps[0];
            prep.set_num_workers(num_workers);
            prep.build(&self.commit)?;
            prep.start()?;
        }

        let mut prep_i = 0usize;
        let mut first_adjust = true;
        let mut want_valid_time = true;
        let mut last_progress = Instant::now();
        loop {
            let sib_i = prep_i ^ 1;

            // Resize against the sibling's last profiled batch: double
            // until the rate stops improving, then step back and freeze.
            if want_valid_time {
                if let (Some(mine), Some(theirs)) =
                    (self.preps[prep_i].last_rate, self.preps[sib_i].last_rate)
                {
                    if first_adjust {
                        first_adjust = false;
                        num_workers = (num_workers * 2).min(self.max_workers);
                    } else if mine > theirs && num_workers < self.max_workers {
                        num_workers = (num_workers * 2).min(self.max_workers);
                    } else {
                        num_workers = (num_workers / 2).max(1);
                        want_valid_time = false;
                    }
                }
            }

            // Prepare and enqueue the next batch while this one runs.
            let mut next_alloc = self.preps[prep_i].alloc.clone();
            next_alloc.mark_all_ctime_done();
            {
                let sib = &mut self.preps[sib_i];
                sib.alloc = next_alloc;
                sib.set_num_workers(num_workers);
                sib.build(&self.commit)?;
                sib.start()?;
            }

            self.preps[prep_i].wait(want_valid_time)?;

            let winning = self.scan_batch(prep_i)?;

            if last_progress.elapsed() >= Duration::from_secs(1) {
                last_progress = Instant::now();
                self.print_progress(prep_i);
            }

            if let Some(ws) = winning {
                self.queue.finish()?;
                return Ok(ws);
            }
            prep_i = sib_i;
        }
    }

    // Re-verifies every candidate the kernel reported. A candidate that
    // does not reproduce on the CPU is a false positive: logged,
    // skipped. Returns the first validated candidate that reaches the
    // terminate length.
    fn scan_batch(&mut self, prep_i: usize) -> Result<Option<WinningState>> {
        let mut winning = None;
        for i in 0..self.preps[prep_i].num_workers {
            let st = self.preps[prep_i].result[i];
            if st.match_len <= self.preps[prep_i].match_floor {
                continue;
            }
            let alloc = &self.preps[prep_i].alloc;
            let atime = alloc.a_end(i) - i64::from(st.match_count);
            let ctime = alloc.c_end(i) - i64::from(st.match_ctime_count);
            let mut noodle = self.commit.clone();
            noodle.set_atime(atime);
            noodle.set_ctime(ctime);
            let (sha, b2) = noodle.hash();
            let sha_hex = sha.to_string();
            let b2_hex = b2.to_string();
            eprintln!(
                "{} match={} bytes  atime={}  ctime={}",
                i, st.match_len, atime, ctime
            );
            let span = (st.match_len as usize * 2).min(sha_hex.len());
            match b2_hex.find(&sha_hex[..span]) {
                Some(offset) => {
                    let ws = WinningState {
                        atime,
                        ctime,
                        sha_hex,
                        b2_hex,
                        match_offset: offset,
                        match_len: st.match_len as usize,
                    };
                    crate::report::print_winning_state(&ws);
                    if ws.match_len >= self.terminate_at && winning.is_none() {
                        winning = Some(ws);
                    }
                }
                None => {
                    eprintln!(
                        "{} match={} bytes did not reproduce on the CPU (false positive)",
                        i, st.match_len
                    );
                }
            }
        }
        Ok(winning)
    }

    fn print_progress(&self, prep_i: usize) {
        let prep = &self.preps[prep_i];
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let rate = match prep.last_rate {
            // points/ns -> millions of points per second
            Some(r) => r * 1e3,
            None => prep.work_since_prev as f64 / elapsed.max(1e-9) / 1e6,
        };
        eprintln!(
            "{:.0}s {:.2}M/s ct={} + {} x{}",
            elapsed,
            rate,
            prep.alloc.ctime_start(),
            prep.alloc.ctime_count(),
            prep.num_workers
        );
    }

    /// Runs the kernel once over the commit's own timestamps and checks
    /// its SHA-1 against the host's. A mismatch aborts the whole run:
    /// nothing the kernel reports could be trusted.
    pub(crate) fn self_test(&mut self) -> Result<()> {
        {
            let prep = &mut self.preps[0];
            prep.build_identity(&self.commit)?;
            prep.start()?;
            prep.wait(true)?;
        }
        let st = self.preps[0].result[0];
        let mut gpu = [0u8; 20];
        for (word, chunk) in st.hash.iter().zip(gpu.chunks_exact_mut(4)) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        let (sha, _b2) = self.commit.hash();
        if gpu != sha.0 {
            let gpu_hex: String = gpu.iter().map(|b| format!("{:02x}", b)).collect();
            eprintln!("CPU sha1: {}", sha);
            eprintln!("GPU sha1: {} - mismatch!", gpu_hex);
            return Err(Error::Device(
                "GPU self-test failed: kernel SHA-1 disagrees with the host".into(),
            ));
        }
        Ok(())
    }
}

fn append_blocks(cpubuf: &mut Vec<B2ShaBuffer>, bytes: &[u8], blocks: usize) {
    for b in 0..blocks {
        let mut tmp = [0u8; SHA_BLOCK];
        let start = b * SHA_BLOCK;
        let end = bytes.len().min(start + SHA_BLOCK);
        if start < end {
            tmp[..end - start].copy_from_slice(&bytes[start..end]);
        }
        let mut block = B2ShaBuffer::default();
        for (word, chunk) in block.words.iter_mut().zip(tmp.chunks_exact(4)) {
            *word = u32::from_le_bytes(chunk.try_into().unwrap());
        }
        cpubuf.push(block);
    }
}
