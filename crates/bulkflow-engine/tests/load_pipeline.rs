//! End-to-end pipeline tests over the delimited-text connector and the
//! in-memory cluster session: accounting invariants, dry-run, both
//! scheduling regimes, and the unload round-trip.

use bulkflow_engine::config::Settings;
use bulkflow_engine::connector::csv::CsvConnector;
use bulkflow_engine::driver::SimulatedCluster;
use bulkflow_engine::orchestrator;
use bulkflow_engine::result::RunStatus;
use std::path::Path;
use std::sync::Arc;

fn settings(root: &Path, execution_id: &str, input: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.engine.execution_id = Some(execution_id.to_string());
    settings.log.directory = root.join("logs");
    settings.schema.keyspace = Some("ks1".into());
    settings.schema.table = Some("table1".into());
    settings.schema.mapping = "id,name".into();
    settings.connector.csv.url = input.display().to_string();
    settings
}

fn connector(settings: &Settings) -> Box<CsvConnector> {
    Box::new(CsvConnector::new(settings.connector.csv.clone()))
}

fn op_file(settings: &Settings, execution_id: &str, name: &str) -> std::path::PathBuf {
    settings.log.directory.join(execution_id).join(name)
}

#[tokio::test(flavor = "multi_thread")]
async fn load_stores_all_records_and_merges_positions() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in.csv");
    std::fs::write(&input, "id,name\n1,alice\n2,bob\n3,carol\n4,dave\n5,erin\n").unwrap();
    let settings = settings(root.path(), "LOAD_ok", &input);
    let cluster = Arc::new(SimulatedCluster::new());

    let summary = orchestrator::run_load(&settings, connector(&settings), cluster.clone())
        .await
        .unwrap();

    assert_eq!(summary.records, 5);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.status(), RunStatus::Success);
    assert_eq!(cluster.stored_rows().len(), 5);

    let positions =
        std::fs::read_to_string(op_file(&settings, "LOAD_ok", "positions.txt")).unwrap();
    assert_eq!(positions.lines().count(), 1);
    assert!(positions.trim_end().ends_with(":1-5"));
    assert!(!op_file(&settings, "LOAD_ok", "load.bad").exists());
    assert!(!op_file(&settings, "LOAD_ok", "connector.bad").exists());
    assert!(op_file(&settings, "LOAD_ok", "effective-settings.log").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_issues_no_executions_but_gates_still_fire() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in.csv");
    std::fs::write(&input, "id,name\n1,alice\nbroken\n3,carol\n").unwrap();
    let mut settings = settings(root.path(), "LOAD_dry", &input);
    settings.engine.dry_run = true;
    let cluster = Arc::new(SimulatedCluster::new());

    let summary = orchestrator::run_load(&settings, connector(&settings), cluster.clone())
        .await
        .unwrap();

    assert_eq!(cluster.execution_count(), 0);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.status(), RunStatus::CompletedWithErrors);

    let bad =
        std::fs::read_to_string(op_file(&settings, "LOAD_dry", "connector.bad")).unwrap();
    assert_eq!(bad, "broken\n");
    let positions =
        std::fs::read_to_string(op_file(&settings, "LOAD_dry", "positions.txt")).unwrap();
    assert!(positions.trim_end().ends_with(":1-3"));
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_threshold_aborts_on_first_unmappable_record() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in.csv");
    std::fs::write(&input, "id,name\n1,alice\n2,bob\n3,carol\n").unwrap();
    let mut settings = settings(root.path(), "LOAD_abort", &input);
    // The mapping references a field the file does not have, so the
    // first record already fails mapping.
    settings.schema.mapping = "id,age".into();
    settings.log.max_errors = "0".into();
    let cluster = Arc::new(SimulatedCluster::new());

    let err = orchestrator::run_load(&settings, connector(&settings), cluster.clone())
        .await
        .unwrap_err();
    assert!(err.is_threshold_abort());
    assert_eq!(err.to_string(), "Too many errors, the maximum allowed is 0.");
    assert_eq!(cluster.execution_count(), 0);

    let bad = std::fs::read_to_string(op_file(&settings, "LOAD_abort", "mapping.bad")).unwrap();
    assert_eq!(bad, "1,alice\n");
    let positions =
        std::fs::read_to_string(op_file(&settings, "LOAD_abort", "positions.txt")).unwrap();
    assert_eq!(positions.lines().count(), 1);
    assert!(positions.trim_end().ends_with(":1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn many_files_use_thread_per_resource_and_account_everything() {
    let root = tempfile::tempdir().unwrap();
    let input_dir = root.path().join("inputs");
    std::fs::create_dir(&input_dir).unwrap();
    for file_number in 1..=5 {
        std::fs::write(
            input_dir.join(format!("part{file_number}.csv")),
            format!("id,name\n{file_number}0,user{file_number}a\n{file_number}1,user{file_number}b\n"),
        )
        .unwrap();
    }
    let settings = settings(root.path(), "LOAD_tpc", &input_dir);
    let cluster = Arc::new(SimulatedCluster::new());

    let summary = orchestrator::run_load(&settings, connector(&settings), cluster.clone())
        .await
        .unwrap();

    assert_eq!(summary.records, 10);
    assert_eq!(summary.errors, 0);
    assert_eq!(cluster.stored_rows().len(), 10);

    let positions =
        std::fs::read_to_string(op_file(&settings, "LOAD_tpc", "positions.txt")).unwrap();
    // One merged 1-2 range per input file, sorted by resource URI.
    assert_eq!(positions.lines().count(), 5);
    for line in positions.lines() {
        assert!(line.ends_with(":1-2"), "unexpected range line: {line}");
    }
    let mut sorted: Vec<&str> = positions.lines().collect();
    sorted.sort_unstable();
    assert_eq!(positions.lines().collect::<Vec<_>>(), sorted);
}

#[tokio::test(flavor = "multi_thread")]
async fn mixed_failures_account_every_position_exactly_once() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in.csv");
    // Position 2 fails at the connector (arity), the rest succeed.
    std::fs::write(&input, "id,name\n1,alice\nbroken\n3,carol\n4,dave\n").unwrap();
    let mut settings = settings(root.path(), "LOAD_mixed", &input);
    settings.log.max_errors = "-1".into();
    let cluster = Arc::new(SimulatedCluster::new());

    let summary = orchestrator::run_load(&settings, connector(&settings), cluster.clone())
        .await
        .unwrap();
    assert_eq!(summary.records, 4);
    assert_eq!(summary.errors, 1);
    assert_eq!(cluster.stored_rows().len(), 3);

    // Terminal outcomes cover 1..=4 with no duplicates: the merged
    // position set is a single contiguous range.
    let positions =
        std::fs::read_to_string(op_file(&settings, "LOAD_mixed", "positions.txt")).unwrap();
    assert_eq!(positions.lines().count(), 1);
    assert!(positions.trim_end().ends_with(":1-4"));
    let bad =
        std::fs::read_to_string(op_file(&settings, "LOAD_mixed", "connector.bad")).unwrap();
    assert_eq!(bad, "broken\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn unload_round_trips_loaded_rows() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in.csv");
    std::fs::write(&input, "id,name\n1,alice\n2,bob\n").unwrap();
    let load_settings = settings(root.path(), "LOAD_rt", &input);
    let cluster = Arc::new(SimulatedCluster::new());
    orchestrator::run_load(&load_settings, connector(&load_settings), cluster.clone())
        .await
        .unwrap();

    let output = root.path().join("out.csv");
    let mut unload_settings = settings(root.path(), "UNLOAD_rt", &output);
    unload_settings.schema.mapping = "id,name".into();
    let summary = orchestrator::run_unload(
        &unload_settings,
        connector(&unload_settings),
        cluster.clone(),
    )
    .await
    .unwrap();

    assert_eq!(summary.records, 2);
    assert_eq!(summary.errors, 0);
    // Concurrent writes may store rows in either order; compare as sets.
    let written = std::fs::read_to_string(&output).unwrap();
    let mut lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.remove(0), "id,name");
    lines.sort_unstable();
    assert_eq!(lines, vec!["1,alice", "2,bob"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn count_tallies_rows_without_a_connector() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in.csv");
    std::fs::write(&input, "id,name\n1,alice\n2,bob\n3,carol\n").unwrap();
    let load_settings = settings(root.path(), "LOAD_cnt", &input);
    let cluster = Arc::new(SimulatedCluster::new());
    orchestrator::run_load(&load_settings, connector(&load_settings), cluster.clone())
        .await
        .unwrap();

    let count_settings = settings(root.path(), "COUNT_cnt", &input);
    let summary = orchestrator::run_count(&count_settings, cluster)
        .await
        .unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.errors, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn batching_disabled_still_delivers_every_row() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("in.csv");
    let mut body = String::from("id,name\n");
    for row in 1..=50 {
        body.push_str(&format!("{row},user{row}\n"));
    }
    std::fs::write(&input, body).unwrap();
    let mut settings = settings(root.path(), "LOAD_nobatch", &input);
    settings.batch.mode = bulkflow_engine::batcher::BatchMode::Disabled;
    let cluster = Arc::new(SimulatedCluster::new());

    let summary = orchestrator::run_load(&settings, connector(&settings), cluster.clone())
        .await
        .unwrap();
    assert_eq!(summary.records, 50);
    assert_eq!(cluster.stored_rows().len(), 50);
    assert_eq!(cluster.execution_count(), 50);
}
