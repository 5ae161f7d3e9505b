use super::*;

macro_rules! test_commit_with_times {
    () => {
        "\
            tree 0123456701234567012345670123456701234567\n\
            parent 7654321076543210765432107654321076543210\n\
            author Foo Bár <foo@example.com> {atime} -0500\n\
            committer Baz Qux <baz@example.com> {ctime} -0500\n\
            \n\
            Do a thing\n\
            \n\
            Makes some changes to the foo feature\n"
    };
}

fn test_commit() -> Vec<u8> {
    format!(
        test_commit_with_times!(),
        atime = 1513980859i64,
        ctime = 1513980898i64
    )
    .into_bytes()
}

fn prefixed(body: &[u8]) -> Vec<u8> {
    let mut out = format!("commit {}\0", body.len()).into_bytes();
    out.extend_from_slice(body);
    out
}

#[test]
fn parse_bare_commit_round_trips() {
    let raw = test_commit();
    let commit = CommitMessage::parse(&raw).unwrap();
    assert_eq!(commit.serialize(), prefixed(&raw));
    assert_eq!(commit.atime(), 1513980859);
    assert_eq!(commit.ctime(), 1513980898);
}

#[test]
fn parse_prefixed_commit_round_trips() {
    let raw = prefixed(&test_commit());
    let commit = CommitMessage::parse(&raw).unwrap();
    assert_eq!(commit.serialize(), raw);
    assert_eq!(CommitMessage::parse(&commit.serialize()).unwrap(), commit);
}

#[test]
fn read_commit_sniffs_both_forms() {
    let bare = test_commit();
    let from_bare = read_commit(&mut &bare[..]).unwrap();
    let wrapped = prefixed(&bare);
    let from_wrapped = read_commit(&mut &wrapped[..]).unwrap();
    assert_eq!(from_bare, from_wrapped);
}

#[test]
fn parse_rejects_unknown_type() {
    assert!(CommitMessage::parse(b"blob 5\0hello").is_err());
}

#[test]
fn parse_rejects_wrong_declared_length() {
    let body = test_commit();
    let mut raw = format!("commit {}\0", body.len() + 7).into_bytes();
    raw.extend_from_slice(&body);
    assert!(CommitMessage::parse(&raw).is_err());
}

#[test]
fn parse_rejects_missing_author() {
    let raw = b"\
        tree 0123456701234567012345670123456701234567\n\
        committer Baz Qux <baz@example.com> 1513980898 -0500\n\
        \n\
        Do a thing\n";
    assert!(CommitMessage::parse(raw).is_err());
}

#[test]
fn parse_rejects_missing_committer() {
    let raw = b"\
        tree 0123456701234567012345670123456701234567\n\
        author Foo Bar <foo@example.com> 1513980859 -0500\n\
        \n\
        Do a thing\n";
    assert!(CommitMessage::parse(raw).is_err());
}

#[test]
fn parse_rejects_non_numeric_timestamp() {
    let raw = b"\
        tree 0123456701234567012345670123456701234567\n\
        author Foo Bar <foo@example.com> soon -0500\n\
        committer Baz Qux <baz@example.com> 1513980898 -0500\n\
        \n\
        Do a thing\n";
    assert!(CommitMessage::parse(raw).is_err());
}

#[test]
fn parse_rejects_missing_log() {
    let raw = b"\
        tree 0123456701234567012345670123456701234567\n\
        author Foo Bar <foo@example.com> 1513980859 -0500\n\
        committer Baz Qux <baz@example.com> 1513980898 -0500\n";
    assert!(CommitMessage::parse(raw).is_err());
}

#[test]
fn set_times_rewrite_only_the_timestamps() {
    let mut commit = CommitMessage::parse(&test_commit()).unwrap();
    commit.set_atime(1600000000);
    commit.set_ctime(1700000001);
    let want = format!(
        test_commit_with_times!(),
        atime = 1600000000i64,
        ctime = 1700000001i64
    )
    .into_bytes();
    assert_eq!(commit.serialize(), prefixed(&want));
}

#[test]
fn header_length_tracks_digit_width() {
    let mut commit = CommitMessage::parse(&test_commit()).unwrap();
    // 10 -> 11 digits on both axes grows the body by two bytes, which
    // the header has to re-declare.
    commit.set_atime(99999999999);
    commit.set_ctime(99999999999);
    let want = format!(
        test_commit_with_times!(),
        atime = 99999999999i64,
        ctime = 99999999999i64
    )
    .into_bytes();
    assert_eq!(commit.serialize(), prefixed(&want));
    // Re-parsing checks the declared length for us.
    let reparsed = CommitMessage::parse(&commit.serialize()).unwrap();
    assert_eq!(reparsed.atime(), 99999999999);
    assert_eq!(reparsed.ctime(), 99999999999);

    // ...and shrinking the width shrinks it back.
    commit.set_atime(1513980859);
    commit.set_ctime(1513980898);
    assert_eq!(commit.serialize(), prefixed(&test_commit()));
}

#[test]
fn digit_offsets_point_at_the_last_digits() {
    let commit = CommitMessage::parse(&test_commit()).unwrap();
    let bytes = commit.serialize();
    let a = commit.atime_digit_offset();
    assert_eq!(&bytes[a - 9..=a], &b"1513980859"[..]);
    let c = commit.ctime_digit_offset();
    assert_eq!(&bytes[c - 9..=c], &b"1513980898"[..]);
}

#[test]
fn accessors_recover_the_identities() {
    let commit = CommitMessage::parse(&test_commit()).unwrap();
    assert_eq!(
        commit.tree_hex().unwrap(),
        "0123456701234567012345670123456701234567"
    );
    assert_eq!(
        commit.parent_hex().unwrap(),
        "7654321076543210765432107654321076543210"
    );
    assert_eq!(commit.author_name().unwrap(), "Foo Bár");
    assert_eq!(commit.author_email().unwrap(), "foo@example.com");
    assert_eq!(commit.author_date(), "1513980859 -0500");
    assert_eq!(commit.committer_name().unwrap(), "Baz Qux");
    assert_eq!(commit.committer_email().unwrap(), "baz@example.com");
    assert_eq!(commit.committer_date(), "1513980898 -0500");
    assert_eq!(
        commit.log_message(),
        &b"Do a thing\n\nMakes some changes to the foo feature\n"[..]
    );
}

#[test]
fn sha1_matches_published_vectors() {
    assert_eq!(
        sha1_digest(b"abc").to_string(),
        "a9993e364706816aba3e25717850c26c9cd0d89d"
    );
    assert_eq!(
        sha1_digest(b"").to_string(),
        "da39a3ee5e6b4b0d3255bfef95601890afd80709"
    );
}

#[test]
fn blake2b_matches_published_vector() {
    // RFC 7693 appendix A.
    assert_eq!(
        blake2_digest(b"abc").to_string(),
        "ba80a53f981c4d0d6a2797b69f12f6e94c212f14685ac4b74b12bb6fdbffa2d1\
         7d87c5392aab792dc252d5de4533cc9518d38aa8dbf1925ab92386edd4009923"
    );
}

#[test]
fn streaming_hash_matches_one_shot() {
    let commit = CommitMessage::parse(&test_commit()).unwrap();
    let bytes = commit.serialize();
    let (sha, b2) = commit.hash();
    assert_eq!(sha, sha1_digest(&bytes));
    assert_eq!(b2, blake2_digest(&bytes));
}

#[test]
fn longest_match_identical_inputs() {
    let needle = [7u8; 20];
    let hay = [7u8; 64];
    assert_eq!(
        longest_match(&needle, &hay),
        MatchResult { offset: 0, len: 20 }
    );
}

#[test]
fn longest_match_disjoint_alphabets() {
    let needle = [1u8; 20];
    let hay = [2u8; 64];
    assert_eq!(longest_match(&needle, &hay), MatchResult { offset: 0, len: 0 });
}

#[test]
fn longest_match_empty_needle() {
    assert_eq!(longest_match(&[], &[1, 2, 3]), MatchResult { offset: 0, len: 0 });
}

#[test]
fn longest_match_finds_the_longest_prefix() {
    let needle = [9u8, 8, 7, 6, 5];
    let mut hay = [0u8; 64];
    // a two-byte hit early, a three-byte hit later
    hay[4] = 9;
    hay[5] = 8;
    hay[30] = 9;
    hay[31] = 8;
    hay[32] = 7;
    assert_eq!(
        longest_match(&needle, &hay),
        MatchResult { offset: 30, len: 3 }
    );
}

#[test]
fn longest_match_prefers_the_first_occurrence() {
    let needle = [5u8, 4];
    let mut hay = [0u8; 64];
    hay[10] = 5;
    hay[11] = 4;
    hay[40] = 5;
    hay[41] = 4;
    assert_eq!(
        longest_match(&needle, &hay),
        MatchResult { offset: 10, len: 2 }
    );
}

#[test]
fn longest_match_only_counts_needle_prefixes() {
    // hay contains needle[2..5] but never needle[0]
    let needle = [1u8, 2, 3, 4, 5];
    let mut hay = [0u8; 64];
    hay[20] = 3;
    hay[21] = 4;
    hay[22] = 5;
    assert_eq!(longest_match(&needle, &hay), MatchResult { offset: 0, len: 0 });
}

#[test]
fn cpu_engine_finds_short_match() {
    let commit = CommitMessage::parse(&test_commit()).unwrap();
    let mut miner = CpuMiner::new(
        commit.clone(),
        0,
        0,
        CpuConfig {
            terminate_at: 3,
            count_divisor: 16 * 1024,
            num_workers: 4,
        },
    );
    miner.start();
    while miner.tick_1hz() == Tick::Running {}
    assert!(miner.search_done());
    let ws = miner.winning_state().expect("search_done implies a match");
    miner.stop();

    assert!(ws.match_len >= 3);
    assert!(ws.atime >= commit.atime());
    assert!(ws.ctime >= commit.ctime());
    assert!(ws.b2_hex.contains(&ws.sha_hex[..ws.match_len * 2]));

    // The reported digests must belong to the reported timestamps.
    let mut noodle = commit;
    noodle.set_atime(ws.atime);
    noodle.set_ctime(ws.ctime);
    let (sha, b2) = noodle.hash();
    assert_eq!(sha.to_string(), ws.sha_hex);
    assert_eq!(b2.to_string(), ws.b2_hex);
}

#[test]
fn cpu_engine_stops_on_request() {
    let commit = CommitMessage::parse(&test_commit()).unwrap();
    let mut miner = CpuMiner::new(
        commit,
        0,
        0,
        CpuConfig {
            // Unreachable: a full 20-byte digest embedded in the other.
            terminate_at: 20,
            count_divisor: 1024,
            num_workers: 2,
        },
    );
    miner.start();
    miner.stop();
    assert!(!miner.search_done());
    assert!(miner.winning_state().is_none());
}

#[cfg(feature = "opencl")]
mod gpu {
    use super::*;
    use crate::gpu::{B2ShaConst, Mode, WorkAllocator};

    #[test]
    fn allocator_partitions_atime_in_ctime_lockstep() {
        for &(work, n) in &[(1i64, 1usize), (5, 3), (3, 8), (1000, 7)] {
            let mut alloc = WorkAllocator::new(1000, 1000 + work, 4);
            alloc.set_num_workers(n);
            assert_eq!(alloc.mode(), Mode::CtimeLockstep);
            assert_eq!(alloc.a_first(0), 1000);
            assert_eq!(alloc.a_end(n - 1), 1000 + work);
            for i in 0..n {
                assert!(alloc.a_first(i) <= alloc.a_end(i));
                if i > 0 {
                    assert_eq!(alloc.a_end(i - 1), alloc.a_first(i));
                }
                assert_eq!(alloc.c_first(i), 1000 + work);
                assert_eq!(alloc.c_end(i), 1000 + work + alloc.ctime_count());
            }
        }
    }

    #[test]
    fn allocator_partitions_ctime_in_atime_lockstep() {
        for n in [1usize, 3, 4, 7] {
            let mut alloc = WorkAllocator::new(5000, 5000, 4);
            alloc.set_num_workers(n);
            assert_eq!(alloc.mode(), Mode::AtimeLockstep);
            assert_eq!(alloc.ctime_count(), 1024);
            assert_eq!(alloc.c_first(0), 5000);
            assert_eq!(alloc.c_end(n - 1), 5000 + 1024);
            for i in 0..n {
                if i > 0 {
                    assert_eq!(alloc.c_end(i - 1), alloc.c_first(i));
                }
                assert_eq!(alloc.a_first(i), 5000);
                // No author-time room: each worker sweeps up to its own
                // committer window.
                assert_eq!(alloc.a_end(i), alloc.c_first(i) + 1);
            }
        }
    }

    #[test]
    fn allocator_sizes_the_ctime_window() {
        let mut alloc = WorkAllocator::new(0, 100, 2);
        alloc.set_num_workers(4);
        // each_work = 4 workers * 2 CU * 32 / 100 of atime span
        assert_eq!(alloc.ctime_count(), 2);
        assert_eq!(alloc.work_count(), 200);
        alloc.mark_all_ctime_done();
        assert_eq!(alloc.ctime_start(), 102);
    }

    #[test]
    fn fixed_params_cover_both_final_block_cases() {
        let f = B2ShaConst::for_message(300);
        assert_eq!(f.len, 300);
        assert_eq!(f.buffers, 5);
        // 300 % 64 = 44: terminator and length fit in the last block
        assert_eq!(f.zero_padding_and_len, 0);
        assert_eq!(f.last_full_padding, 0x80000000);
        assert_eq!(f.last_full_len, [0, 2400]);

        // block-aligned message: padding-only final block
        let f = B2ShaConst::for_message(320);
        assert_eq!(f.zero_padding_and_len, 1);

        // 120 % 64 = 56: the length spills into an extra block
        let f = B2ShaConst::for_message(120);
        assert_eq!(f.zero_padding_and_len, 1);
        assert_eq!(f.buffers, 2);
    }

    #[test]
    fn gpu_kernel_sha1_matches_cpu() {
        if !GpuMiner::gpus_available() {
            return;
        }
        let commit = CommitMessage::parse(&test_commit()).unwrap();
        let mut miner = GpuMiner::new(commit, 0, 0, 3).unwrap();
        miner.self_test().unwrap();
    }

    #[test]
    fn gpu_search_candidates_reverify_on_cpu() {
        if !GpuMiner::gpus_available() {
            return;
        }
        let commit = CommitMessage::parse(&test_commit()).unwrap();
        let mut miner = GpuMiner::new(commit.clone(), 0, 0, 3).unwrap();
        let ws = miner.search().unwrap();
        assert!(ws.match_len >= 3);
        let mut noodle = commit;
        noodle.set_atime(ws.atime);
        noodle.set_ctime(ws.ctime);
        let (sha, b2) = noodle.hash();
        assert_eq!(sha.to_string(), ws.sha_hex);
        assert_eq!(b2.to_string(), ws.b2_hex);
        assert!(ws.b2_hex.contains(&ws.sha_hex[..ws.match_len * 2]));
    }
}
