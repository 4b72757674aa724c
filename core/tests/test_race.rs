#[cfg(test)]
mod race_tests {
    use std::time::Duration;

    use bytes::Bytes;
    use rand::{RngCore, SeedableRng};

    use ultragz_core::arbiter::{Flate2Verifier, LibdeflateVerifier, RaceJob, Verifier};
    use ultragz_core::candidates::{default_runners, ChainPolicy, Tool, ToolSet};
    use ultragz_core::config::RaceConfig;
    use ultragz_core::engine::{ParallelismProfile, TaskEngine};
    use ultragz_core::types::JobError;

    fn engine(workers: usize) -> TaskEngine {
        TaskEngine::new(ParallelismProfile::fixed(workers).with_poll_interval(Duration::from_millis(10))).unwrap()
    }

    fn race(engine: &TaskEngine, input: Vec<u8>, name: &str) -> Bytes {
        let job = RaceJob::builder(engine.handle(), input, name)
            .tools(ToolSet::none())
            .build()
            .unwrap();
        let outcome = job.run().unwrap();
        assert!(outcome.snapshot.sanity_check());
        assert_eq!(outcome.snapshot.counters.tasks_failed, 0);
        outcome.best
    }

    fn assert_round_trips(archive: &[u8], input: &[u8]) {
        assert!(Flate2Verifier.matches(archive, input).unwrap());
        assert!(LibdeflateVerifier.matches(archive, input).unwrap());
    }

    #[test]
    fn all_zero_inputs_round_trip_without_external_tools() {
        let engine = engine(2);
        for size in [1usize, 2, 100, 65_536, 300_000] {
            let input = vec![0u8; size];
            let best = race(&engine, input.clone(), "zeros");
            assert_round_trips(&best, &input);
            if size >= 100 {
                assert!(best.len() < size);
            }
        }
    }

    #[test]
    fn random_input_round_trips() {
        let engine = engine(3);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        for size in [17usize, 4096, 200_000] {
            let mut input = vec![0u8; size];
            rng.fill_bytes(&mut input);
            let best = race(&engine, input.clone(), "random");
            assert_round_trips(&best, &input);
        }
    }

    #[test]
    fn text_input_picks_the_smallest_in_process_result() {
        let engine = engine(2);
        let input = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(400);
        let job = RaceJob::builder(engine.handle(), input.clone(), "lorem")
            .tools(ToolSet::none())
            .build()
            .unwrap();
        let outcome = job.run().unwrap();

        assert_round_trips(&outcome.best, &input);
        assert_eq!(outcome.snapshot.best_bytes, Some(outcome.best.len() as u64));
        assert_eq!(outcome.snapshot.best_source.as_deref(), Some(outcome.source.as_str()));
        assert!(outcome.snapshot.compression_ratio < 0.1);
        assert!(outcome.snapshot.counters.improvements >= 1);
        assert_eq!(outcome.snapshot.counters.tasks_spawned, default_runners(&job).len() as u64);
    }

    #[test]
    fn single_worker_race_completes() {
        let engine = engine(1);
        let input = b"abcdefgh".repeat(1000);
        let best = race(&engine, input.clone(), "one worker");
        assert_round_trips(&best, &input);
    }

    #[test]
    fn empty_input_is_rejected_at_entry() {
        let engine = engine(1);
        assert!(matches!(
            RaceJob::new(engine.handle(), Bytes::new(), "nothing"),
            Err(JobError::EmptyInput)
        ));
    }

    #[test]
    fn runner_plan_follows_intensity_and_tools() {
        let engine = engine(1);
        let input = Bytes::from_static(b"plan");

        let plan = |intensity: u8, tools: ToolSet| {
            let config = RaceConfig {
                intensity,
                ..RaceConfig::default()
            };
            let job = RaceJob::builder(engine.handle(), input.clone(), "plan")
                .config(config)
                .tools(tools)
                .build()
                .unwrap();
            default_runners(&job)
                .iter()
                .map(|r| (r.source(), r.chain_policy()))
                .collect::<Vec<_>>()
        };
        fn policy_of(plan: &[(String, ChainPolicy)], source: &str) -> Option<ChainPolicy> {
            plan.iter().find(|(s, _)| s == source).map(|(_, p)| *p)
        }

        // flate2 9 and 8, libdeflate 12.
        let in_process = plan(5, ToolSet::none());
        assert_eq!(in_process.len(), 3);
        assert!(in_process.iter().all(|(_, p)| *p == ChainPolicy::WhenValid));
        // flate2 9, libdeflate 12.
        assert_eq!(plan(0, ToolSet::none()).len(), 2);

        let with_gzip = plan(5, ToolSet::none().with(Tool::Gzip, "/usr/bin/gzip"));
        assert_eq!(with_gzip.len(), 3 + 4);
        assert_eq!(policy_of(&with_gzip, "gzip -9 -c"), Some(ChainPolicy::WhenValid));
        assert_eq!(policy_of(&with_gzip, "gzip -6 -c"), Some(ChainPolicy::OnImprovement));

        let with_pigz = plan(5, ToolSet::none().with(Tool::Pigz, "/usr/bin/pigz"));
        assert_eq!(policy_of(&with_pigz, "pigz -11 -c"), Some(ChainPolicy::WhenValid));

        let with_7z = plan(5, ToolSet::none().with(Tool::SevenZip, "/usr/bin/7z"));
        assert_eq!(with_7z.len(), 3 + 12);
        let seven: Vec<_> = with_7z.iter().filter(|(s, _)| s.starts_with("7z")).collect();
        assert!(seven
            .iter()
            .all(|(s, p)| (*p == ChainPolicy::WhenValid) == s.contains("-mx=9")));

        let with_zopfli = plan(10, ToolSet::none().with(Tool::Zopfli, "/usr/bin/zopfli"));
        let zopfli = with_zopfli.iter().find(|(s, _)| s.contains("--i2000")).unwrap();
        assert_eq!(zopfli.1, ChainPolicy::WhenValid);

        let with_python = plan(5, ToolSet::none().with(Tool::Python, "/usr/bin/python3"));
        assert_eq!(policy_of(&with_python, "python3 gzip -9"), Some(ChainPolicy::WhenValid));
    }

    #[cfg(unix)]
    mod external {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};

        use super::*;
        use ultragz_core::candidates::{CandidateRunner, ChainPolicy, ExternalCandidate, Feed};
        use ultragz_core::config::locate_executable;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn job_with(engine: &TaskEngine, input: &[u8], tools: ToolSet) -> RaceJob {
            RaceJob::builder(engine.handle(), Bytes::copy_from_slice(input), "external")
                .tools(tools)
                .build()
                .unwrap()
        }

        #[test]
        fn failing_tool_is_discarded_and_race_still_succeeds() {
            let dir = tempfile::tempdir().unwrap();
            let broken = script(dir.path(), "gzip", "echo 'disk on fire' >&2\nexit 2");
            let engine = engine(2);
            let input = b"payload payload payload".repeat(20);
            let job = job_with(&engine, &input, ToolSet::none().with(Tool::Gzip, &broken));

            let outcome = job.run().unwrap();
            assert!(!outcome.source.starts_with("gzip"));
            assert_eq!(outcome.snapshot.counters.tasks_failed, 0);
            assert_round_trips(&outcome.best, &input);
        }

        #[test]
        fn non_gzip_output_is_invalid() {
            let engine = engine(2);
            let input = b"not compressed at all".to_vec();
            let job = job_with(&engine, &input, ToolSet::none());

            let runner = ExternalCandidate::new(Tool::Gzip, "cat", Vec::new()).label("cat passthrough");
            Box::new(runner).run(&job).unwrap();
            assert_eq!(job.counters().values().invalid, 1);
            assert_eq!(job.best_size(), None);
        }

        #[test]
        fn temp_file_feed_passes_a_path() {
            let dir = tempfile::tempdir().unwrap();
            // The fake tool ignores its input file and prints a prepared gzip stream.
            let gz = dir.path().join("fixed.gz");
            let input = b"fixture".repeat(50);
            {
                use std::io::Write;
                let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::best());
                enc.write_all(&input).unwrap();
                fs::write(&gz, enc.finish().unwrap()).unwrap();
            }
            let tool = script(
                dir.path(),
                "zopfli",
                &format!("for last; do :; done\n[ -f \"$last\" ] || exit 9\ncat '{}'", gz.display()),
            );

            let engine = engine(1);
            let job = job_with(&engine, &input, ToolSet::none());
            let runner = ExternalCandidate::new(Tool::Zopfli, &tool, vec!["-c".into()])
                .feed(Feed::TempFile)
                .chain(ChainPolicy::Never);
            Box::new(runner).run(&job).unwrap();
            assert!(job.best().is_some());
        }

        fn gzip_padded(data: &[u8], pad: usize) -> Vec<u8> {
            use std::io::Write;
            let mut enc = flate2::GzBuilder::new()
                .extra(vec![0u8; pad])
                .write(Vec::new(), flate2::Compression::best());
            enc.write_all(data).unwrap();
            enc.finish().unwrap()
        }

        /// A job whose only seed is a fake gzip that prints a padded stream,
        /// chained into whatever `advdef_body` does to the file it is given.
        fn race_through_advdef(dir: &Path, input: &[u8], advdef_body: &str) -> (RaceJob, usize) {
            let seed = dir.join("seed.gz");
            let seed_bytes = gzip_padded(input, 400);
            fs::write(&seed, &seed_bytes).unwrap();
            let gzip = script(dir, "gzip", &format!("cat '{}'", seed.display()));
            let advdef = script(dir, "advdef", &format!("for last; do :; done\n{advdef_body}"));

            let engine = engine(2);
            let tools = ToolSet::none().with(Tool::Gzip, &gzip).with(Tool::Advdef, &advdef);
            let job = job_with(&engine, input, tools);
            let seed_runner = ExternalCandidate::new(Tool::Gzip, &gzip, Vec::new())
                .label("fake gzip")
                .chain(ChainPolicy::WhenValid);
            job.run_with(move |job| job.enqueue(Box::new(seed_runner))).ok();
            engine.shutdown();
            (job, seed_bytes.len())
        }

        #[test]
        fn advdef_pass_replaces_best_and_is_joined() {
            let dir = tempfile::tempdir().unwrap();
            let input = b"recompress me ".repeat(40);
            let small = dir.path().join("small.gz");
            fs::write(&small, gzip_padded(&input, 0)).unwrap();
            let levels = dir.path().join("levels");

            let body = format!(
                "sleep 0.2\ncat '{}' > \"$last\"\necho \"$2\" >> '{}'",
                small.display(),
                levels.display()
            );
            let (job, seed_len) = race_through_advdef(dir.path(), &input, &body);

            // Both chained levels ran to completion before the job returned.
            let ran = fs::read_to_string(&levels).unwrap();
            assert!(ran.lines().any(|l| l == "-3"));
            assert!(ran.lines().any(|l| l == "-4"));

            let best = job.best().unwrap();
            assert!(best.len() < seed_len);
            assert!(best.source.starts_with("advdef -"));
            assert!(best.source.ends_with("recompressing results of fake gzip"));
            assert_round_trips(&best.bytes, &input);

            let values = job.counters().values();
            assert_eq!(values.improvements, 2);
            assert_eq!(values.invalid, 0);
            assert_eq!(values.tasks_spawned, 3);
            assert_eq!(values.tasks_failed, 0);
        }

        #[test]
        fn corrupting_advdef_is_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let input = b"keep the seed ".repeat(40);
            let (job, seed_len) = race_through_advdef(dir.path(), &input, "printf 'not gzip' > \"$last\"");

            let best = job.best().unwrap();
            assert_eq!(best.source, "fake gzip");
            assert_eq!(best.len(), seed_len);
            let values = job.counters().values();
            assert_eq!(values.invalid, 2);
            assert_eq!(values.improvements, 1);
        }

        #[test]
        fn unchanged_advdef_output_is_not_registered() {
            let dir = tempfile::tempdir().unwrap();
            let input = b"nothing to gain ".repeat(40);
            let (job, seed_len) = race_through_advdef(dir.path(), &input, "exit 0");

            assert_eq!(job.best_size(), Some(seed_len));
            let values = job.counters().values();
            assert_eq!(values.registrations(), 1);
            assert_eq!(values.tasks_spawned, 3);
        }

        #[test]
        fn real_gzip_when_installed() {
            let Some(gzip) = locate_executable("gzip", None) else {
                return;
            };
            let engine = engine(2);
            let input = b"system gzip round trip ".repeat(300);
            let job = job_with(&engine, &input, ToolSet::none().with(Tool::Gzip, gzip));
            let outcome = job.run().unwrap();
            assert_round_trips(&outcome.best, &input);
            assert!(outcome.snapshot.counters.registrations() >= 7);
        }
    }
}
