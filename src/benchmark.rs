use gitmine::{longest_match, CommitMessage};
use std::time::Instant;

const BENCH_COMMIT: &[u8] = b"\
    tree 6f4e79123e206448f80ec73b9a53e07eb0784fef\n\
    parent 7654321076543210765432107654321076543210\n\
    author Foo Bar <foo@example.com> 1611912738 -0500\n\
    committer Foo Bar <foo@example.com> 1611912738 -0500\n\
    \n\
    Test commit for benchmarking performance changes\n";

/// Sweeps a fixed author-time range over a constant commit and reports
/// the single-thread hash rate. The numbers are much more consistent
/// than a real mining run, which stops at an arbitrary point.
///
/// To use: run `time target/release/gitmine --benchmark`.
pub fn run_benchmark() {
    let mut noodle = CommitMessage::parse(BENCH_COMMIT).expect("benchmark fixture parses");
    const SWEEP: i64 = 1 << 18;
    let base = noodle.atime();
    let mut best = 0usize;
    let started = Instant::now();
    for t in base..base + SWEEP {
        noodle.set_atime(t);
        let (sha, b2) = noodle.hash();
        let m = longest_match(&sha.0, &b2.0);
        if m.len > best {
            best = m.len;
        }
    }
    let secs = started.elapsed().as_secs_f64();
    eprintln!(
        "{} hashes in {:.2}s = {:.3} MHash/s (best match: {} bytes)",
        SWEEP,
        secs,
        SWEEP as f64 / secs / 1e6,
        best
    );
}
