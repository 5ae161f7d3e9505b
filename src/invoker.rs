use crate::commit::CommitMessage;
use crate::{Error, Result};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;

/// Recreates `noodle` in the current repository by spawning
/// `git commit-tree` with the author/committer identities and dates
/// exported through the environment, streaming the commit message on
/// stdin, and checking that the object id git prints back equals the
/// SHA-1 we computed ourselves.
pub fn create_commit(noodle: &CommitMessage, want_sha_hex: &str) -> Result<String> {
    let tree = noodle.tree_hex()?;
    let parent = noodle
        .parent_hex()
        .ok_or_else(|| Error::Git("commit has no parent line".into()))?;

    let mut cmd = Command::new("git");
    cmd.arg("commit-tree").arg(&tree).arg("-p").arg(&parent);
    cmd.env("GIT_AUTHOR_NAME", noodle.author_name()?)
        .env("GIT_AUTHOR_EMAIL", noodle.author_email()?)
        .env("GIT_AUTHOR_DATE", noodle.author_date())
        .env("GIT_COMMITTER_NAME", noodle.committer_name()?)
        .env("GIT_COMMITTER_EMAIL", noodle.committer_email()?)
        .env("GIT_COMMITTER_DATE", noodle.committer_date());
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Git(format!("failed to spawn git commit-tree: {}", e)))?;

    // Feed stdin from a separate thread while draining stdout here, so
    // neither pipe can fill up and wedge the child. A broken pipe shows
    // up as the write error (Rust leaves SIGPIPE ignored).
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Bug("child stdin was not piped".into()))?;
    let log = noodle.log_message().to_vec();
    let writer = thread::spawn(move || -> std::io::Result<()> {
        stdin.write_all(&log)?;
        // Dropping stdin closes the pipe so git knows the message ended.
        Ok(())
    });

    let mut output = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_end(&mut output)?;
    }
    let status = child
        .wait()
        .map_err(|e| Error::Git(format!("waitpid failed: {}", e)))?;
    match writer.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(Error::Git(format!("write to git stdin failed: {}", e))),
        Err(_) => return Err(Error::Bug("stdin writer thread panicked".into())),
    }

    let output = String::from_utf8_lossy(&output).into_owned();
    let want = format!("{}\n", want_sha_hex);
    if !status.success() || output != want {
        return Err(Error::Git(format!(
            "git commit-tree exited with {}:\n{}",
            status, output
        )));
    }
    Ok(want_sha_hex.to_string())
}
