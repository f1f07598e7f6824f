#[cfg(test)]
mod pipeline_tests {
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    use serde_json::{json, Value};
    use tempfile::TempDir;

    use commtrace::aggregate::AggregationError;
    use commtrace::archive::TraceArchive;
    use commtrace::driver::{Driver, DriverError};
    use commtrace::render::{render_run, CsvRenderer, Renderer, ReportRenderer};

    /// Trace document in the format the profiler writes at MPI_Finalize
    fn trace(n_procs: u64, rank: u64, phases: Vec<Value>) -> Value {
        json!({
            "processor_name": format!("node{:02}", rank),
            "rank": rank,
            "n_procs": n_procs,
            "n_phases": phases.len(),
            "description": "Generated by PFProf v0.2.0",
            "n_events": 4,
            "duration": 0.25,
            "phases": phases,
        })
    }

    fn phase(tx_bytes: &[u64], tx_messages: &[u64], sizes: &[(u64, u64)]) -> Value {
        let sizes: Vec<Value> = sizes
            .iter()
            .map(|(s, f)| json!({"message_size": s, "frequency": f}))
            .collect();
        json!({
            "tx_bytes": tx_bytes,
            "tx_messages": tx_messages,
            "rx_bytes": vec![0; tx_bytes.len()],
            "rx_messages": vec![0; tx_bytes.len()],
            "tx_message_sizes": sizes,
            "rx_message_sizes": [],
        })
    }

    fn write_tar_gz(path: &Path, members: &[(String, Value)]) {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, doc) in members {
            let data = serde_json::to_vec_pretty(doc).unwrap();
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, &data[..]).unwrap();
        }
        let tar = builder.into_inner().unwrap();

        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar).unwrap();
        fs::write(path, encoder.finish().unwrap()).unwrap();
    }

    fn two_phase_run() -> Vec<(String, Value)> {
        vec![
            (
                "results/oxton-result0.json".to_string(),
                trace(
                    2,
                    0,
                    vec![
                        phase(&[0, 100], &[0, 4], &[(64, 4)]),
                        phase(&[0, 8], &[0, 1], &[(8, 1)]),
                    ],
                ),
            ),
            (
                "results/oxton-result1.json".to_string(),
                trace(
                    2,
                    1,
                    vec![
                        phase(&[50, 0], &[2, 0], &[(64, 2)]),
                        phase(&[16, 0], &[2, 0], &[(8, 2)]),
                    ],
                ),
            ),
        ]
    }

    fn aggregate(path: &Path, driver: Driver) -> Result<commtrace::aggregate::FinalizedRun, DriverError> {
        let mut archive = TraceArchive::open(path).unwrap();
        driver.run(archive.sources().unwrap())
    }

    #[test]
    fn test_tarball_end_to_end() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("run.tar.gz");
        write_tar_gz(&archive, &two_phase_run());

        let run = aggregate(&archive, Driver::sequential()).unwrap();
        assert_eq!(run.process_count(), 2);
        assert_eq!(run.phase_count(), 2);
        assert!(run.is_complete());

        let p0 = run.phase(0).unwrap();
        assert_eq!(p0.traffic_matrix().to_nested(), vec![vec![0, 100], vec![50, 0]]);
        assert_eq!(p0.message_matrix().to_nested(), vec![vec![0, 4], vec![2, 0]]);
        assert_eq!(p0.size_histogram().iter().collect::<Vec<_>>(), vec![(&64, &6)]);

        let p1 = run.phase(1).unwrap();
        assert_eq!(p1.traffic_matrix().to_nested(), vec![vec![0, 8], vec![16, 0]]);
        assert_eq!(p1.size_histogram().get(&8), Some(&3));

        assert_eq!(
            run.metadata(1).and_then(|m| m.processor_name.as_deref()),
            Some("node01")
        );
    }

    #[test]
    fn test_parallel_driver_on_tarball() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("run.tar.gz");
        write_tar_gz(&archive, &two_phase_run());

        let sequential = aggregate(&archive, Driver::sequential()).unwrap();
        let parallel = aggregate(&archive, Driver::parallel()).unwrap();
        assert_eq!(sequential.phases(), parallel.phases());
    }

    #[test]
    fn test_rendered_outputs() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("run.tar.gz");
        write_tar_gz(&archive, &two_phase_run());
        let out = dir.path().join("out");

        let run = aggregate(&archive, Driver::sequential()).unwrap();
        let mut csv = CsvRenderer::new(&out, 50);
        let mut reports = ReportRenderer::new(&out, &archive).quiet();
        let mut renderers: [&mut dyn Renderer; 2] = [&mut csv, &mut reports];
        render_run(&run, &mut renderers).unwrap();

        for i in 0..2 {
            for stem in ["traffic_matrix", "message_matrix", "message_size_histogram", "message_size_bins"] {
                let path = out.join(format!("{}-{}.csv", stem, i));
                assert!(path.exists(), "missing {}", path.display());
            }
        }
        assert_eq!(
            fs::read_to_string(out.join("traffic_matrix-1.csv")).unwrap(),
            "0,8\n16,0\n"
        );

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["metadata"]["process_count"], 2);
        assert_eq!(summary["metadata"]["phase_count"], 2);
        assert_eq!(summary["phases"][0]["total_bytes"], 150);
        assert_eq!(summary["ranks"][0]["processor_name"], "node00");
    }

    #[test]
    fn test_mixed_run_archive_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("mixed.tar.gz");
        let mut members = two_phase_run();
        members.push((
            "other-run/oxton-result2.json".to_string(),
            trace(4, 2, vec![phase(&[1, 1, 0, 1], &[1, 1, 0, 1], &[]); 2]),
        ));
        write_tar_gz(&archive, &members);

        let err = aggregate(&archive, Driver::sequential()).unwrap_err();
        match err {
            DriverError::Aggregation(AggregationError::ShapeConflict {
                record,
                expected_procs,
                found_procs,
                ..
            }) => {
                assert_eq!(record, "other-run/oxton-result2.json");
                assert_eq!(expected_procs, 2);
                assert_eq!(found_procs, 4);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_directory_with_missing_rank() {
        let dir = TempDir::new().unwrap();
        for rank in 0..2u64 {
            let mut bytes = vec![0u64; 3];
            bytes[((rank + 1) % 3) as usize] = 10 * (rank + 1);
            let doc = trace(3, rank, vec![phase(&bytes, &[1, 1, 1], &[(128, 3)])]);
            fs::write(
                dir.path().join(format!("oxton-result{}.json", rank)),
                serde_json::to_vec(&doc).unwrap(),
            )
            .unwrap();
        }

        let run = aggregate(dir.path(), Driver::sequential()).unwrap();
        let p = run.phase(0).unwrap();
        assert_eq!(p.traffic_matrix().row(2), &[0, 0, 0]);
        assert_eq!(p.message_matrix().row(2), &[0, 0, 0]);
        assert_eq!(p.size_histogram().get(&128), Some(&6));
        assert_eq!(run.missing_ranks(), vec![2]);
        assert!(matches!(
            run.ensure_complete(),
            Err(AggregationError::IncompleteRun { .. })
        ));
    }

    #[test]
    fn test_malformed_member_names_the_file() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        let mut members = two_phase_run();
        members[1].1["phases"][0]["tx_bytes"] = json!([50]);
        write_tar_gz(&archive, &members);

        let err = aggregate(&archive, Driver::sequential()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("results/oxton-result1.json"), "{}", message);
        assert!(message.contains("tx_bytes"), "{}", message);
    }
}
