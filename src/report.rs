use crate::commit::CommitMessage;
use crate::invoker::create_commit;
use crate::{Error, Result};

const HILIGHT: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

/// Everything worth keeping once a search ends: the winning timestamp
/// pair, both digests, and where the SHA-1 prefix sits inside the
/// BLAKE2b hex dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinningState {
    pub atime: i64,
    pub ctime: i64,
    pub sha_hex: String,
    pub b2_hex: String,
    /// Offset of the match within `b2_hex`, in hex characters.
    pub match_offset: usize,
    /// Matched length in digest bytes.
    pub match_len: usize,
}

/// Prints the match summary with the shared hex range highlighted in
/// both digests.
pub fn print_winning_state(ws: &WinningState) {
    eprintln!("author time = {}", ws.atime);
    eprintln!("committer   = {}", ws.ctime);
    let span = (ws.match_len * 2).min(ws.sha_hex.len());
    eprintln!(
        "sha1:   {}{}{}{}",
        HILIGHT,
        &ws.sha_hex[..span],
        RESET,
        &ws.sha_hex[span..]
    );
    let start = ws.match_offset.min(ws.b2_hex.len());
    let end = (start + ws.match_len * 2).min(ws.b2_hex.len());
    eprintln!(
        "blake2: {}{}{}{}{}",
        &ws.b2_hex[..start],
        HILIGHT,
        &ws.b2_hex[start..end],
        RESET,
        &ws.b2_hex[end..]
    );
}

/// Applies the winning timestamps, re-verifies the digest on the CPU,
/// and recreates the commit in the repository via `git commit-tree`.
pub fn finish_commit(orig: &CommitMessage, ws: &WinningState) -> Result<()> {
    let mut noodle = orig.clone();
    noodle.set_atime(ws.atime);
    noodle.set_ctime(ws.ctime);
    let (sha, _b2) = noodle.hash();
    if sha.to_string() != ws.sha_hex {
        return Err(Error::Bug(format!(
            "winning state does not reproduce: hashed {}, want {}",
            sha, ws.sha_hex
        )));
    }
    create_commit(&noodle, &ws.sha_hex)?;
    eprintln!(
        "repo updated.\n# hint: git checkout master; git reset --hard {}",
        ws.sha_hex
    );
    Ok(())
}
