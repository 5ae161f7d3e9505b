use crate::hashes::{Blake2Digest, Sha1Digest};
use crate::{Error, Result};
use blake2::Blake2b512;
use sha1::{Digest, Sha1};
use std::io::Read;

/// A parsed git commit object, split at the two spots the miner needs to
/// rewrite: the author timestamp and the committer timestamp.
///
/// The pieces concatenate back to the exact byte sequence that gets
/// hashed (`commit <len>\0tree ...`). The header's declared length is
/// kept in sync with the body, which matters because the decimal width
/// of a timestamp can change while mining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    // "commit <N>\0tree <hex>\n". The NUL is significant, so this is
    // bytes, not a string.
    header: Vec<u8>,
    // "parent <hex>\n", or empty for a root commit.
    parent: Vec<u8>,
    // "author Name <email> " up to but excluding the timestamp digits.
    author: Vec<u8>,
    author_time: String,
    // " -0500\n" (whatever followed the digits, newline included).
    author_tz: String,
    committer: Vec<u8>,
    committer_time: String,
    committer_tz: String,
    // Blank separator line plus the message body.
    log: Vec<u8>,
    atime: i64,
    ctime: i64,
}

impl CommitMessage {
    /// Parses a raw commit object. Accepts either a bare body (starting
    /// with `tree `) or the object form prefixed with `commit <N>\0`; a
    /// bare body gets the prefix synthesized.
    pub fn parse(input: &[u8]) -> Result<CommitMessage> {
        let prefixed;
        let data: &[u8] = if input.starts_with(b"commit ") {
            input
        } else if input.starts_with(b"tree ") {
            let mut v = format!("commit {}\0", input.len()).into_bytes();
            v.extend_from_slice(input);
            prefixed = v;
            &prefixed
        } else {
            let shown = String::from_utf8_lossy(&input[..input.len().min(8)]).into_owned();
            return Err(Error::Parse(format!("invalid type {:?}", shown)));
        };

        let digits_at = "commit ".len();
        let nul = match data.iter().position(|&b| b == 0) {
            Some(n) => n,
            None => return Err(Error::Parse("missing null byte".into())),
        };
        let declared: usize = std::str::from_utf8(&data[digits_at..nul])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Parse("invalid declared length".into()))?;
        let body = &data[nul + 1..];
        if body.len() != declared {
            return Err(Error::Parse(format!(
                "bad declared length: got {}, want {}",
                declared,
                body.len()
            )));
        }

        if !body.starts_with(b"tree ") {
            return Err(Error::Parse("missing tree".into()));
        }
        let mut pos = line_end(body, 0);
        let header = data[..nul + 1 + pos].to_vec();

        let parent = if body[pos..].starts_with(b"parent ") {
            let start = pos;
            pos = line_end(body, pos);
            body[start..pos].to_vec()
        } else {
            Vec::new()
        };

        if !body[pos..].starts_with(b"author ") {
            return Err(Error::Parse("missing author".into()));
        }
        let author_line = {
            let start = pos;
            pos = line_end(body, pos);
            &body[start..pos]
        };
        let (author, author_time, author_tz, atime) = split_timestamp(author_line, "author")?;

        if !body[pos..].starts_with(b"committer ") {
            return Err(Error::Parse("missing committer".into()));
        }
        let committer_line = {
            let start = pos;
            pos = line_end(body, pos);
            &body[start..pos]
        };
        let (committer, committer_time, committer_tz, ctime) =
            split_timestamp(committer_line, "committer")?;

        let log = body[pos..].to_vec();
        if !log.starts_with(b"\n") || !log.ends_with(b"\n") {
            return Err(Error::Parse("log must be a blank line then a message ending in a newline".into()));
        }

        Ok(CommitMessage {
            header,
            parent,
            author,
            author_time,
            author_tz,
            committer,
            committer_time,
            committer_tz,
            log,
            atime,
            ctime,
        })
    }

    pub fn atime(&self) -> i64 {
        self.atime
    }

    pub fn ctime(&self) -> i64 {
        self.ctime
    }

    /// Replaces the author timestamp. All other fields are untouched;
    /// the header is re-declared only when the decimal width changes.
    pub fn set_atime(&mut self, t: i64) {
        let old_width = self.author_time.len();
        self.atime = t;
        self.author_time = t.to_string();
        if self.author_time.len() != old_width {
            self.rebuild_header();
        }
    }

    pub fn set_ctime(&mut self, t: i64) {
        let old_width = self.committer_time.len();
        self.ctime = t;
        self.committer_time = t.to_string();
        if self.committer_time.len() != old_width {
            self.rebuild_header();
        }
    }

    /// The full byte sequence that gets hashed. Byte-identical to the
    /// parser input while the timestamps are unchanged.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.len() + self.body_len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.parent);
        out.extend_from_slice(&self.author);
        out.extend_from_slice(self.author_time.as_bytes());
        out.extend_from_slice(self.author_tz.as_bytes());
        out.extend_from_slice(&self.committer);
        out.extend_from_slice(self.committer_time.as_bytes());
        out.extend_from_slice(self.committer_tz.as_bytes());
        out.extend_from_slice(&self.log);
        out
    }

    /// Streams the serialized commit into both digests without building
    /// the intermediate buffer. This is the hot path of the CPU miner.
    pub fn hash(&self) -> (Sha1Digest, Blake2Digest) {
        let mut sha = Sha1::new();
        let mut b2 = Blake2b512::new();
        for part in [
            &self.header[..],
            &self.parent,
            &self.author,
            self.author_time.as_bytes(),
            self.author_tz.as_bytes(),
            &self.committer,
            self.committer_time.as_bytes(),
            self.committer_tz.as_bytes(),
            &self.log,
        ] {
            sha.update(part);
            b2.update(part);
        }
        let mut sha_out = [0u8; 20];
        sha_out.copy_from_slice(sha.finalize().as_slice());
        let mut b2_out = [0u8; 64];
        b2_out.copy_from_slice(b2.finalize().as_slice());
        (Sha1Digest(sha_out), Blake2Digest(b2_out))
    }

    /// Byte offset, within `serialize()` output, of the last decimal
    /// digit of the author timestamp. The GPU kernel steps the decimal
    /// in place starting from this position.
    pub fn atime_digit_offset(&self) -> usize {
        self.header.len() + self.parent.len() + self.author.len() + self.author_time.len() - 1
    }

    /// Byte offset of the last decimal digit of the committer timestamp.
    pub fn ctime_digit_offset(&self) -> usize {
        self.atime_digit_offset() + 1
            + self.author_tz.len()
            + self.committer.len()
            + self.committer_time.len()
            - 1
    }

    pub fn tree_hex(&self) -> Result<String> {
        let nul = self
            .header
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Bug("header lost its null byte".into()))?;
        let line = &self.header[nul + 1..];
        match line.strip_prefix(b"tree ") {
            Some(rest) => Ok(trim_line(rest)),
            None => Err(Error::Bug("header lost its tree line".into())),
        }
    }

    /// `None` for a root commit.
    pub fn parent_hex(&self) -> Option<String> {
        self.parent
            .strip_prefix(b"parent ")
            .map(|rest| trim_line(rest))
    }

    pub fn author_name(&self) -> Result<String> {
        ident_name(&self.author, "author ")
    }

    pub fn author_email(&self) -> Result<String> {
        ident_email(&self.author)
    }

    /// `<epoch> <tz>` as git's `GIT_AUTHOR_DATE` wants it.
    pub fn author_date(&self) -> String {
        let mut date = self.author_time.clone();
        date.push_str(self.author_tz.trim_end_matches(&['\r', '\n', ' '][..]));
        date
    }

    pub fn committer_name(&self) -> Result<String> {
        ident_name(&self.committer, "committer ")
    }

    pub fn committer_email(&self) -> Result<String> {
        ident_email(&self.committer)
    }

    pub fn committer_date(&self) -> String {
        let mut date = self.committer_time.clone();
        date.push_str(self.committer_tz.trim_end_matches(&['\r', '\n', ' '][..]));
        date
    }

    /// The commit message alone, without the blank separator line.
    pub fn log_message(&self) -> &[u8] {
        let skip = self.log.iter().take_while(|&&b| b == b'\n').count();
        &self.log[skip..]
    }

    fn body_len(&self) -> usize {
        let nul = self
            .header
            .iter()
            .position(|&b| b == 0)
            .expect("header always contains a null byte");
        (self.header.len() - nul - 1)
            + self.parent.len()
            + self.author.len()
            + self.author_time.len()
            + self.author_tz.len()
            + self.committer.len()
            + self.committer_time.len()
            + self.committer_tz.len()
            + self.log.len()
    }

    fn rebuild_header(&mut self) {
        let nul = self
            .header
            .iter()
            .position(|&b| b == 0)
            .expect("header always contains a null byte");
        let tree_line = self.header.split_off(nul + 1);
        let body = tree_line.len()
            + self.parent.len()
            + self.author.len()
            + self.author_time.len()
            + self.author_tz.len()
            + self.committer.len()
            + self.committer_time.len()
            + self.committer_tz.len()
            + self.log.len();
        self.header = format!("commit {}\0", body).into_bytes();
        self.header.extend_from_slice(&tree_line);
    }
}

/// Reads a commit object from a stream (normally stdin, fed by
/// `git cat-file commit HEAD`) and parses it.
pub fn read_commit(input: &mut dyn Read) -> Result<CommitMessage> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    CommitMessage::parse(&raw)
}

// Index just past the newline that terminates the line starting at
// `from` (or the end of the buffer if the last line is unterminated).
fn line_end(bytes: &[u8], from: usize) -> usize {
    match bytes[from..].iter().position(|&b| b == b'\n') {
        Some(n) => from + n + 1,
        None => bytes.len(),
    }
}

fn trim_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(&['\r', '\n', ' '][..])
        .to_string()
}

/// Splits `author Name <email> 1234567890 -0500\n` into the part before
/// the digits, the digits, the rest of the line, and the parsed epoch.
fn split_timestamp(line: &[u8], what: &str) -> Result<(Vec<u8>, String, String, i64)> {
    // The timestamp sits after the <email> and the whitespace behind it.
    let lt = line
        .iter()
        .position(|&b| b == b'<')
        .ok_or_else(|| Error::Parse(format!("{} has no <email>", what)))?;
    let gt = line[lt..]
        .iter()
        .position(|&b| b == b'>')
        .map(|n| lt + n)
        .ok_or_else(|| Error::Parse(format!("{} has no <email>", what)))?;
    let mut digits_at = gt + 1;
    while digits_at < line.len() && line[digits_at] == b' ' {
        digits_at += 1;
    }
    let mut digits_end = digits_at;
    if digits_end < line.len() && line[digits_end] == b'-' {
        digits_end += 1;
    }
    while digits_end < line.len() && line[digits_end].is_ascii_digit() {
        digits_end += 1;
    }
    if digits_end == digits_at {
        return Err(Error::Parse(format!("{} has no timestamp", what)));
    }
    let time = std::str::from_utf8(&line[digits_at..digits_end])
        .expect("digits are ascii")
        .to_string();
    let epoch: i64 = time
        .parse()
        .map_err(|_| Error::Parse(format!("{} timestamp out of range", what)))?;
    let tz = String::from_utf8_lossy(&line[digits_end..]).into_owned();
    Ok((line[..digits_at].to_vec(), time, tz, epoch))
}

fn ident_name(field: &[u8], prefix: &str) -> Result<String> {
    let rest = field
        .strip_prefix(prefix.as_bytes())
        .ok_or_else(|| Error::Bug(format!("field does not start with {:?}", prefix)))?;
    let lt = rest
        .iter()
        .position(|&b| b == b'<')
        .ok_or_else(|| Error::Parse(format!("failed to parse {} <", prefix.trim_end())))?;
    Ok(String::from_utf8_lossy(&rest[..lt]).trim().to_string())
}

fn ident_email(field: &[u8]) -> Result<String> {
    let lt = field
        .iter()
        .position(|&b| b == b'<')
        .ok_or_else(|| Error::Parse("failed to parse ident <".into()))?;
    let rest = &field[lt + 1..];
    let gt = rest
        .iter()
        .position(|&b| b == b'>')
        .ok_or_else(|| Error::Parse("failed to parse ident >".into()))?;
    Ok(String::from_utf8_lossy(&rest[..gt]).into_owned())
}
