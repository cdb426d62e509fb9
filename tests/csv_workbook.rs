use std::fs;
use std::time::Duration;

use cartera_tools::commands::consolidate::consolidate;
use cartera_tools::commands::duplicates::AcceptDuplicates;
use cartera_tools::progress::{NullProgress, ProgressReporter};
use cartera_tools::{
    run_import, Cell, CsvWorkbook, DistributionConfig, ImportOptions, ImportSource, TabularStore,
};
use tempfile::tempdir;

fn header(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn partitions_survive_reopen() {
    let dir = tempdir().unwrap();

    {
        let mut book = CsvWorkbook::open(dir.path()).unwrap();
        book.create_partition("Ana_Diaz", &header(&["RUT", "NOMBRE", "EJECUTIVO"])).unwrap();
        book.create_partition("Luis_Soto", &header(&["RUT", "NOMBRE", "EJECUTIVO"])).unwrap();
        book.append_rows(
            "Ana_Diaz",
            &[vec![Cell::from("1-9"), Cell::from("Cliente, A"), Cell::from("ANA DIAZ")]],
        )
        .unwrap();
        book.reorder_partition("Luis_Soto", 0).unwrap();
        book.set_active_partition("Ana_Diaz").unwrap();
    }

    let book = CsvWorkbook::open(dir.path()).unwrap();
    let names: Vec<String> = book.list_partitions().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Luis_Soto", "Ana_Diaz"]);
    assert_eq!(book.active_partition().as_deref(), Some("Ana_Diaz"));

    let rows = book.data_rows("Ana_Diaz").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1].display(), "Cliente, A");
    assert!(book.data_rows("Luis_Soto").unwrap().is_empty());
}

#[test]
fn deleting_a_partition_removes_its_file() {
    let dir = tempdir().unwrap();
    let mut book = CsvWorkbook::open(dir.path()).unwrap();
    book.create_partition("Temporal", &header(&["A"])).unwrap();
    assert!(dir.path().join("Temporal.csv").exists());

    book.delete_partition("Temporal").unwrap();
    assert!(!dir.path().join("Temporal.csv").exists());

    let reopened = CsvWorkbook::open(dir.path()).unwrap();
    assert!(!reopened.has_partition("Temporal").unwrap());
}

#[test]
fn import_from_csv_file_persists_agents_and_views() {
    let dir = tempdir().unwrap();
    let book_dir = dir.path().join("libro");
    let csv_path = dir.path().join("cartera.csv");
    fs::write(
        &csv_path,
        "RUT,NOMBRE,EJECUTIVO\n1-9,Cliente A,Ana Diaz\n2-7,Cliente B,Luis Soto\n,,\n3-5,Cliente C,ana díaz\n",
    )
    .unwrap();

    let config = DistributionConfig::default();
    {
        let mut book = CsvWorkbook::open(&book_dir).unwrap();
        let mut sink = NullProgress;
        let mut reporter = ProgressReporter::new(&mut sink, Duration::from_secs(60));
        let report = run_import(
            &mut book,
            &ImportSource::CsvFile(csv_path.clone()),
            ImportOptions::default(),
            &mut AcceptDuplicates,
            &mut reporter,
            &config,
        )
        .unwrap();
        assert_eq!(report.distribution.created, 2);
        assert_eq!(report.blank_rows, 1);
    }

    let book = CsvWorkbook::open(&book_dir).unwrap();
    assert_eq!(book.data_rows("Ana_Diaz").unwrap().len(), 2);
    assert_eq!(book.data_rows("Luis_Soto").unwrap().len(), 1);
    assert_eq!(book.data_rows(&config.report_partition).unwrap().len(), 3);
    let formula = book.formula_text(&config.report_partition).unwrap();
    assert!(formula.starts_with("=SORT("), "{}", formula);
}

#[test]
fn literal_text_that_looks_like_errors_or_formulas_survives_reopen() {
    let dir = tempdir().unwrap();
    let book_dir = dir.path().join("libro");
    let csv_path = dir.path().join("cartera.csv");
    fs::write(
        &csv_path,
        "RUT,NOMBRE,FECHA,EJECUTIVO\n1-9,#N/A,01/01/2025,Ana Diaz\n2-7,=sin fórmula,02/01/2025,Ana Diaz\n",
    )
    .unwrap();

    let config = DistributionConfig::default();
    {
        let mut book = CsvWorkbook::open(&book_dir).unwrap();
        let mut sink = NullProgress;
        let mut reporter = ProgressReporter::new(&mut sink, Duration::from_secs(60));
        run_import(
            &mut book,
            &ImportSource::CsvFile(csv_path.clone()),
            ImportOptions::default(),
            &mut AcceptDuplicates,
            &mut reporter,
            &config,
        )
        .unwrap();
    }

    let mut book = CsvWorkbook::open(&book_dir).unwrap();
    let rows = book.data_rows("Ana_Diaz").unwrap();
    assert_eq!(rows[0][1], Cell::text("#N/A"));
    assert_eq!(rows[1][1], Cell::text("=sin fórmula"));

    let report = consolidate(&mut book, &config).unwrap();
    assert_eq!(report.rows, 2);
}
