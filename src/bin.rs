mod benchmark;

use gitmine::{
    finish_commit, print_winning_state, read_commit, CommitMessage, CpuConfig, CpuMiner, Error,
    Tick, WinningState, DEFAULT_TERMINATE_AT,
};
use std::env;
use std::io;
use std::process::exit;

fn main() {
    let args = env::args().collect::<Vec<String>>();

    if args.len() == 2 && args[1] == "--benchmark" {
        benchmark::run_benchmark();
        return;
    }

    let (atime_hint, ctime_hint) = match args.len() {
        1 => (0, 0),
        3 => (
            parse_hint(&args[1], "atime_hint"),
            parse_hint(&args[2], "ctime_hint"),
        ),
        _ => print_usage_and_exit(),
    };

    if let Err(err) = run(atime_hint, ctime_hint) {
        eprintln!("{}", err);
        exit(1);
    }
}

fn print_usage_and_exit() -> ! {
    eprintln!("Usage: gitmine [ atime_hint ctime_hint ]");
    exit(1)
}

fn parse_hint(arg: &str, what: &str) -> i64 {
    match arg.parse() {
        Ok(value) => value,
        Err(_) => {
            eprintln!("Invalid {}: {:?}", what, arg);
            exit(1)
        }
    }
}

fn run(atime_hint: i64, ctime_hint: i64) -> gitmine::Result<()> {
    let commit = read_commit(&mut io::stdin().lock())?;
    let (sha, b2) = commit.hash();
    let b2_hex = b2.to_string();
    eprintln!("Signing commit: {}", sha);
    eprintln!("blake2: {}...{}", &b2_hex[..20], &b2_hex[108..]);

    let winning = search(commit.clone(), atime_hint, ctime_hint)?;
    print_winning_state(&winning);
    finish_commit(&commit, &winning)?;
    Ok(())
}

#[cfg(feature = "opencl")]
fn search(commit: CommitMessage, atime_hint: i64, ctime_hint: i64) -> gitmine::Result<WinningState> {
    if gitmine::GpuMiner::gpus_available() {
        let mut miner = gitmine::GpuMiner::new(commit, atime_hint, ctime_hint, DEFAULT_TERMINATE_AT)?;
        return miner.search();
    }
    eprintln!("No OpenCL device found; searching on the CPU.");
    cpu_search(commit, atime_hint, ctime_hint)
}

#[cfg(not(feature = "opencl"))]
fn search(commit: CommitMessage, atime_hint: i64, ctime_hint: i64) -> gitmine::Result<WinningState> {
    cpu_search(commit, atime_hint, ctime_hint)
}

fn cpu_search(
    commit: CommitMessage,
    atime_hint: i64,
    ctime_hint: i64,
) -> gitmine::Result<WinningState> {
    let mut miner = CpuMiner::new(
        commit,
        atime_hint,
        ctime_hint,
        CpuConfig {
            terminate_at: DEFAULT_TERMINATE_AT,
            ..CpuConfig::default()
        },
    );
    miner.start();
    while miner.tick_1hz() == Tick::Running {}
    let found = miner.search_done();
    miner.stop();
    if found {
        miner
            .winning_state()
            .ok_or_else(|| Error::Bug("a worker set search_done but not match_found".into()))
    } else {
        Err(Error::Bug("all workers quit without a match".into()))
    }
}
