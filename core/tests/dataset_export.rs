//! Dataset assembly and storage sinks.

use campaign_sim_core::{
    config::SimConfig,
    dataset::{assemble, Cell, BASELINE_COLUMNS, TUNED_COLUMNS},
    engine::SimEngine,
    error::SimError,
    sink::{CsvSink, DatasetSink, SqliteSink},
};
use std::path::PathBuf;

fn temp_path(name: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!("campaign-sim-{name}-{}.{ext}", std::process::id()))
}

#[test]
fn dataset_uses_requested_column_order() {
    let engine = SimEngine::build_test("export-columns".into(), 42).unwrap();
    let output = engine.run().unwrap();
    assert_eq!(output.dataset.columns, BASELINE_COLUMNS.map(String::from).to_vec());
    assert!(output.dataset.rows.iter().all(|r| r.len() == BASELINE_COLUMNS.len()));
    assert_eq!(output.summary.total_rows, output.dataset.len());
}

#[test]
fn weeks_are_concatenated_in_order_without_merging() {
    let engine = SimEngine::build_test("export-order".into(), 6).unwrap();
    let population = engine.build_population();
    let batches = engine.simulate_weeks(&population).unwrap();
    let columns = vec!["week".to_string(), "customer_id".to_string()];
    let dataset = assemble(&batches, &columns).unwrap();

    let expected: usize = batches.iter().map(|b| b.records.len()).sum();
    assert_eq!(dataset.len(), expected);

    let weeks: Vec<i64> = dataset
        .column("week")
        .unwrap()
        .into_iter()
        .map(|c| match c {
            Cell::Int(w) => *w,
            other => panic!("week should be an integer, got {other:?}"),
        })
        .collect();
    assert!(weeks.windows(2).all(|w| w[0] <= w[1]), "weeks out of order");
    assert_eq!(weeks.first(), Some(&1));
    assert_eq!(weeks.last(), Some(&4));
}

#[test]
fn unknown_column_aborts_assembly() {
    let engine = SimEngine::build_test("export-missing".into(), 1).unwrap();
    let population = engine.build_population();
    let batches = engine.simulate_weeks(&population).unwrap();
    let columns = vec!["customer_id".to_string(), "basket_id".to_string()];

    match assemble(&batches, &columns) {
        Err(SimError::MissingColumn { column }) => assert_eq!(column, "basket_id"),
        other => panic!("expected MissingColumn, got {:?}", other.map(|d| d.len())),
    }
}

#[test]
fn tuned_columns_include_collection_flag() {
    let mut config = SimConfig::tuned();
    config.population.num_customers = 300;
    config.population.num_stores = 10;
    let output = SimEngine::new("export-tuned".into(), 2, config).unwrap().run().unwrap();
    assert_eq!(output.dataset.columns.len(), TUNED_COLUMNS.len());

    let flags = output.dataset.column("used_new_collection").unwrap();
    let new_items = output.dataset.column("new_collection_items").unwrap();
    for (flag, items) in flags.into_iter().zip(new_items) {
        match (flag, items) {
            (Cell::Bool(f), Cell::Int(n)) => assert_eq!(*f, *n > 0),
            other => panic!("unexpected cell types {other:?}"),
        }
    }
}

#[test]
fn csv_sink_writes_header_and_rows() {
    let path = temp_path("csv-sink", "csv");
    let engine = SimEngine::build_test("export-csv".into(), 42).unwrap();
    let mut sinks: Vec<Box<dyn DatasetSink>> = vec![Box::new(CsvSink::new(&path))];
    let output = engine.run_to_sinks(&mut sinks).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(header, BASELINE_COLUMNS.map(String::from).to_vec());

    let gift_idx = header.iter().position(|h| h == "gift_received").unwrap();
    let promo_idx = header.iter().position(|h| h == "promo_used").unwrap();
    let mut rows = 0;
    for record in reader.records() {
        let record = record.unwrap();
        assert_eq!(record.len(), header.len());
        assert!(["Yes", "No"].contains(&&record[promo_idx]));
        let gift = &record[gift_idx];
        assert!(gift.is_empty() || ["Tote Bag", "Socks", "Keychain", "Stickers"].contains(&gift));
        rows += 1;
    }
    assert_eq!(rows, output.dataset.len());
    assert!(!PathBuf::from(format!("{}.tmp", path.display())).exists());
    std::fs::remove_file(&path).ok();
}

#[test]
fn unwritable_path_surfaces_error_and_leaves_nothing() {
    let dir = temp_path("no-such-dir", "d");
    let path = dir.join("out.csv");
    let engine = SimEngine::build_test("export-unwritable".into(), 42).unwrap();
    let mut sinks: Vec<Box<dyn DatasetSink>> = vec![Box::new(CsvSink::new(&path))];

    let err = engine.run_to_sinks(&mut sinks).err().expect("write should fail");
    assert!(matches!(err, SimError::Csv(_) | SimError::Io(_)), "got {err:?}");
    assert!(!path.exists());
}

#[test]
fn sqlite_sink_records_rows_and_run() {
    let engine = SimEngine::build_test("export-sqlite".into(), 42).unwrap();
    let output = engine.run().unwrap();

    let mut sink = SqliteSink::in_memory("export-sqlite".into(), 42, "0.1.0-test").unwrap();
    sink.write(&output.dataset).unwrap();

    assert_eq!(
        sink.transaction_count("export-sqlite").unwrap(),
        output.dataset.len() as i64
    );
    assert_eq!(
        sink.recorded_row_count("export-sqlite").unwrap(),
        Some(output.dataset.len() as i64)
    );
    assert_eq!(sink.recorded_row_count("other-run").unwrap(), None);
}

fn remove_db(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        std::fs::remove_file(format!("{}{suffix}", path.display())).ok();
    }
}

fn small_tuned() -> SimConfig {
    let mut config = SimConfig::tuned();
    config.population.num_customers = 300;
    config.population.num_stores = 10;
    config
}

#[test]
fn csv_keeps_decimal_point_on_whole_floats() {
    let path = temp_path("csv-floats", "csv");
    let engine = SimEngine::build_test("export-floats".into(), 42).unwrap();
    let mut sinks: Vec<Box<dyn DatasetSink>> = vec![Box::new(CsvSink::new(&path))];
    engine.run_to_sinks(&mut sinks).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    let revenue_idx = header.iter().position(|h| h == "avg_revenue_last_3_months").unwrap();
    let discount_idx = header.iter().position(|h| h == "discount").unwrap();
    let mut saw_zero_discount = false;
    for record in reader.records() {
        let record = record.unwrap();
        assert!(record[revenue_idx].contains('.'), "got {}", &record[revenue_idx]);
        assert!(record[discount_idx].contains('.'), "got {}", &record[discount_idx]);
        saw_zero_discount |= &record[discount_idx] == "0.0";
    }
    assert!(saw_zero_discount, "expected some undiscounted rows");
    std::fs::remove_file(&path).ok();
}

#[test]
fn csv_and_sqlite_both_written_when_every_sink_succeeds() {
    let csv_path = temp_path("both-ok", "csv");
    let db_path = temp_path("both-ok", "db");
    remove_db(&db_path);

    let engine = SimEngine::build_test("export-both".into(), 9).unwrap();
    let mut sinks: Vec<Box<dyn DatasetSink>> = vec![
        Box::new(CsvSink::new(&csv_path)),
        Box::new(SqliteSink::open(&db_path, "export-both".into(), 9, "0.1.0-test")),
    ];
    let output = engine.run_to_sinks(&mut sinks).unwrap();
    drop(sinks);

    assert!(csv_path.exists());
    let mut check = SqliteSink::open(&db_path, "reader".into(), 0, "0.1.0-test");
    assert_eq!(
        check.transaction_count("export-both").unwrap(),
        output.dataset.len() as i64
    );
    std::fs::remove_file(&csv_path).ok();
    remove_db(&db_path);
}

#[test]
fn failing_second_sink_leaves_no_csv() {
    let csv_path = temp_path("second-fails", "csv");
    let db_path = temp_path("second-fails", "db");
    std::fs::remove_file(&csv_path).ok();
    remove_db(&db_path);

    // A baseline run fixes the transactions table to the baseline columns.
    let baseline = SimEngine::build_test("export-base".into(), 3).unwrap().run().unwrap();
    let mut first = SqliteSink::open(&db_path, "export-base".into(), 3, "0.1.0-test");
    first.write(&baseline.dataset).unwrap();
    drop(first);

    let tuned = SimEngine::new("export-tuned-db".into(), 3, small_tuned()).unwrap();
    let mut sinks: Vec<Box<dyn DatasetSink>> = vec![
        Box::new(CsvSink::new(&csv_path)),
        Box::new(SqliteSink::open(&db_path, "export-tuned-db".into(), 3, "0.1.0-test")),
    ];
    let err = tuned.run_to_sinks(&mut sinks).err().expect("schema should not match");
    drop(sinks);

    assert!(matches!(err, SimError::SchemaMismatch { .. }), "got {err:?}");
    assert!(!csv_path.exists(), "failed run must not publish the CSV");
    assert!(!PathBuf::from(format!("{}.tmp", csv_path.display())).exists());

    let mut check = SqliteSink::open(&db_path, "reader".into(), 0, "0.1.0-test");
    assert_eq!(check.recorded_row_count("export-tuned-db").unwrap(), None);
    assert_eq!(
        check.recorded_row_count("export-base").unwrap(),
        Some(baseline.dataset.len() as i64)
    );
    assert_eq!(check.transaction_count("export-tuned-db").unwrap(), 0);
    remove_db(&db_path);
}

#[test]
fn unopenable_database_leaves_no_output() {
    let csv_path = temp_path("db-unopenable", "csv");
    let db_path = temp_path("db-missing-dir", "d").join("run.db");
    std::fs::remove_file(&csv_path).ok();

    let engine = SimEngine::build_test("export-unopenable".into(), 5).unwrap();
    let mut sinks: Vec<Box<dyn DatasetSink>> = vec![
        Box::new(CsvSink::new(&csv_path)),
        Box::new(SqliteSink::open(&db_path, "export-unopenable".into(), 5, "0.1.0-test")),
    ];
    let err = engine.run_to_sinks(&mut sinks).err().expect("open should fail");

    assert!(matches!(err, SimError::Database(_)), "got {err:?}");
    assert!(!csv_path.exists());
    assert!(!db_path.exists());
}
