use indexmap::IndexMap;
use tracing::{error, info, warn};

use crate::config::DistributionConfig;
use crate::error::{DistributionError, Result};
use crate::models::{fit_row, AgentKey, Cell, RawRecord, Row};
use crate::normalize::match_existing_partition;
use crate::progress::ProgressReporter;
use crate::store::TabularStore;

/// Totales de una distribución
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributionSummary {
    pub created: usize,
    pub appended: usize,
    pub distributed: usize,
    pub failed: usize,
    /// `"Juan_Perez: <error>"` por cada ejecutivo que no se pudo escribir
    pub failures: Vec<String>,
    /// Hojas escritas, en orden de proceso
    pub partitions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Appended,
}

/// Escribe cada grupo en la hoja de su ejecutivo (crea o agrega).
///
/// Un error de escritura en un ejecutivo se registra y no detiene a los demás.
pub fn distribute<S: TabularStore + ?Sized>(
    store: &mut S,
    import_header: &[String],
    agent_column: usize,
    buckets: &IndexMap<AgentKey, Vec<RawRecord>>,
    config: &DistributionConfig,
    mut progress: Option<&mut ProgressReporter<'_>>,
) -> Result<DistributionSummary> {
    let mut known: Vec<String> = store
        .list_partitions()?
        .into_iter()
        .map(|p| p.name)
        .filter(|name| !config.is_source(name) && !config.is_system_partition(name))
        .collect();
    let template = remote_template(store, config)?;

    let mut summary = DistributionSummary::default();
    let total = buckets.len();

    for (index, (key, records)) in buckets.iter().enumerate() {
        if let Some(reporter) = progress.as_deref_mut() {
            reporter.report_distribution(&format!("Distribuyendo {}", key), index, total);
        }

        let existing = match_existing_partition(key, known.iter().map(String::as_str));
        let target = existing.clone().unwrap_or_else(|| key.as_str().to_string());

        let outcome = match &existing {
            Some(name) => append_to_partition(store, name, key, records, agent_column, config),
            None => create_partition(
                store,
                key,
                records,
                import_header,
                template.as_deref(),
                agent_column,
                config,
            ),
        };

        match outcome {
            Ok(action) => {
                match action {
                    ReconcileAction::Created => {
                        summary.created += 1;
                        known.push(target.clone());
                    }
                    ReconcileAction::Appended => summary.appended += 1,
                }
                summary.distributed += records.len();
                summary.partitions.push(target);
            }
            Err(e) => {
                error!(agent = %key, error = %e, "no se pudo escribir la hoja del ejecutivo");
                summary.failed += 1;
                summary.failures.push(format!("{}: {}", key, e));
            }
        }
    }

    if let Some(reporter) = progress.as_deref_mut() {
        reporter.report_distribution("Distribución completa", total, total);
    }

    info!(
        created = summary.created,
        appended = summary.appended,
        distributed = summary.distributed,
        failed = summary.failed,
        "distribución terminada"
    );
    Ok(summary)
}

/// Encabezado de la hoja remota, si el libro tiene una
fn remote_template<S: TabularStore + ?Sized>(
    store: &S,
    config: &DistributionConfig,
) -> Result<Option<Vec<String>>> {
    for info in store.list_partitions()? {
        if config.is_remote_source(&info.name) {
            let header = store.get_header(&info.name)?;
            if !header.iter().all(|h| h.trim().is_empty()) {
                info!(partition = %info.name, columns = header.len(), "usando encabezado de hoja remota");
                return Ok(Some(header));
            }
        }
    }
    Ok(None)
}

/// Columnas originales de una hoja: hasta la primera columna de gestión
pub fn original_width(header: &[String], config: &DistributionConfig) -> usize {
    header
        .iter()
        .position(|h| config.is_extension_column(h))
        .unwrap_or(header.len())
}

/// Ajusta la fila al ancho original, reescribe el ejecutivo en su forma canónica
/// y completa `trailing` (las columnas después de los datos) con sus valores iniciales.
fn build_row(
    record: &RawRecord,
    width: usize,
    trailing: &[String],
    agent_column: usize,
    display_name: &str,
    config: &DistributionConfig,
) -> Row {
    let mut row = fit_row(record.cells.clone(), width);
    if agent_column < row.len() {
        row[agent_column] = Cell::text(display_name);
    }
    row.extend(trailing.iter().map(|column| config.extension_default(column)));
    row
}

fn append_to_partition<S: TabularStore + ?Sized>(
    store: &mut S,
    name: &str,
    key: &AgentKey,
    records: &[RawRecord],
    agent_column: usize,
    config: &DistributionConfig,
) -> Result<ReconcileAction> {
    let write_error = |source| DistributionError::PartitionWrite {
        partition: name.to_string(),
        source,
    };

    let header = store.get_header(name).map_err(write_error)?;
    let width = original_width(&header, config);
    let display_name = key.display_name();

    let rows: Vec<Row> = records
        .iter()
        .map(|r| build_row(r, width, &header[width..], agent_column, &display_name, config))
        .map(|row| fit_row(row, header.len()))
        .collect();

    store.append_rows(name, &rows).map_err(write_error)?;
    info!(partition = name, rows = rows.len(), "registros agregados a hoja existente");
    Ok(ReconcileAction::Appended)
}

fn create_partition<S: TabularStore + ?Sized>(
    store: &mut S,
    key: &AgentKey,
    records: &[RawRecord],
    import_header: &[String],
    template: Option<&[String]>,
    agent_column: usize,
    config: &DistributionConfig,
) -> Result<ReconcileAction> {
    let name = key.as_str();
    let write_error = |source| DistributionError::PartitionWrite {
        partition: name.to_string(),
        source,
    };

    let target_header: Vec<String> = match template {
        Some(header) => header.to_vec(),
        None => import_header
            .iter()
            .cloned()
            .chain(config.extension_columns.iter().cloned())
            .collect(),
    };

    store
        .create_partition(name, &target_header)
        .map_err(write_error)?;

    // Con plantilla, los datos ocupan sus columnas originales y las de gestión quedan en su lugar
    let width = match template {
        Some(header) => original_width(header, config),
        None => import_header.len(),
    };
    let trailing = &target_header[width.min(target_header.len())..];
    let display_name = key.display_name();
    let mut rows: Vec<Row> = records
        .iter()
        .map(|r| build_row(r, width, trailing, agent_column, &display_name, config))
        .collect();

    // La plantilla remota y la importación pueden diferir en ancho: manda el encabezado
    if rows.first().is_some_and(|r| r.len() != target_header.len()) {
        warn!(
            partition = name,
            expected = target_header.len(),
            found = rows[0].len(),
            "ancho de filas corregido al encabezado"
        );
        rows = rows
            .into_iter()
            .map(|row| fit_row(row, target_header.len()))
            .collect();
    }

    store.append_rows(name, &rows).map_err(write_error)?;
    info!(partition = name, rows = rows.len(), "hoja de ejecutivo creada");
    Ok(ReconcileAction::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::grouping::group_records;
    use crate::models::{find_column, ImportBlock};
    use crate::store::MemoryStore;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn import(header: &[&str], rows: Vec<Vec<&str>>) -> ImportBlock {
        ImportBlock {
            source_name: "test".into(),
            header: strings(header),
            records: rows
                .into_iter()
                .enumerate()
                .map(|(i, r)| RawRecord::new(i + 2, r.into_iter().map(Cell::from).collect()))
                .collect(),
        }
    }

    fn run(store: &mut MemoryStore, block: &ImportBlock) -> DistributionSummary {
        let config = DistributionConfig::default();
        let grouped = group_records(block, &config).unwrap();
        distribute(
            store,
            &block.header,
            grouped.agent_column,
            &grouped.buckets,
            &config,
            None,
        )
        .unwrap()
    }

    #[test]
    fn creates_partition_with_extension_columns() {
        let mut store = MemoryStore::new();
        let block = import(
            &["ID", "NAME", "AGENT"],
            vec![vec!["1", "A", "Juan Perez"], vec!["2", "B", "juan perez"], vec!["", "", ""]],
        );
        let summary = run(&mut store, &block);

        assert_eq!(summary.created, 1);
        assert_eq!(summary.distributed, 2);
        let header = store.get_header("Juan_Perez").unwrap();
        assert_eq!(header.len(), 11);
        assert_eq!(header[3], "Propension");
        assert_eq!(header[10], "ESTADO_COMPROMISO");

        let rows = store.data_rows("Juan_Perez").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == 11));
        assert_eq!(rows[1][2], Cell::text("JUAN PEREZ"));
        assert_eq!(rows[0][6], Cell::text("Sin Gestión"));
        assert_eq!(rows[0][7], Cell::text("Sin Gestión"));
    }

    #[test]
    fn appends_without_touching_existing_rows() {
        let mut store = MemoryStore::new();
        run(&mut store, &import(&["ID", "EJECUTIVO"], vec![vec!["1", "Ana Diaz"]]));
        let before = store.data_rows("Ana_Diaz").unwrap();

        let summary = run(
            &mut store,
            &import(&["ID", "EJECUTIVO"], vec![vec!["2", "ana  diaz"], vec!["3", "ANA DIAZ"]]),
        );
        assert_eq!(summary.appended, 1);
        assert_eq!(summary.created, 0);

        let after = store.data_rows("Ana_Diaz").unwrap();
        assert_eq!(after.len(), 3);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2][1], Cell::text("ANA DIAZ"));
    }

    #[test]
    fn append_uses_existing_original_width() {
        let config = DistributionConfig::default();
        let mut store = MemoryStore::new();
        let mut header = strings(&["ID", "EJECUTIVO"]);
        header.extend(config.extension_columns.iter().cloned());
        store.create_partition("Ana_Diaz", &header).unwrap();

        // importación más ancha que la hoja existente
        let summary = run(
            &mut store,
            &import(&["ID", "EJECUTIVO", "EXTRA"], vec![vec!["9", "Ana Diaz", "sobra"]]),
        );
        assert_eq!(summary.appended, 1);
        let rows = store.data_rows("Ana_Diaz").unwrap();
        assert_eq!(rows[0].len(), header.len());
        assert_eq!(rows[0][1], Cell::text("ANA DIAZ"));
        assert_eq!(rows[0][2], Cell::Empty);
    }

    #[test]
    fn remote_template_drives_layout_and_width_is_corrected() {
        let mut store = MemoryStore::new();
        let remote = strings(&["ID", "EJECUTIVO", "COMUNA", "ESTADO", "SUB_ESTADO"]);
        store.create_partition("BBDD_REMOTA", &remote).unwrap();

        run(&mut store, &import(&["ID", "EJECUTIVO"], vec![vec!["1", "Luis Soto"]]));
        let header = store.get_header("Luis_Soto").unwrap();
        assert_eq!(header, remote);
        let rows = store.data_rows("Luis_Soto").unwrap();
        assert!(rows.iter().all(|r| r.len() == remote.len()));
        assert_eq!(rows[0][2], Cell::Empty);
        assert_eq!(rows[0][3], Cell::text("Sin Gestión"));
        assert_eq!(rows[0][4], Cell::text("Sin Gestión"));
    }

    #[test]
    fn wider_remote_template_keeps_defaults_under_their_columns() {
        let config = DistributionConfig::default();
        let mut store = MemoryStore::new();
        let mut remote = strings(&["RUT", "NOMBRE", "EJECUTIVO", "COMUNA"]);
        remote.extend(config.extension_columns.iter().cloned());
        store.create_partition("BBDD_REMOTA", &remote).unwrap();

        run(
            &mut store,
            &import(&["RUT", "NOMBRE", "EJECUTIVO"], vec![vec!["1-9", "A", "Luis Soto"]]),
        );

        let header = store.get_header("Luis_Soto").unwrap();
        assert_eq!(header, remote);
        let row = &store.data_rows("Luis_Soto").unwrap()[0];
        assert_eq!(row.len(), remote.len());
        assert_eq!(row[2], Cell::text("LUIS SOTO"));
        assert_eq!(row[3], Cell::Empty);
        assert_eq!(&row[4..], config.extension_defaults().as_slice());

        let cell = |name: &str| row[find_column(&header, name).unwrap()].clone();
        assert_eq!(cell("ESTADO"), Cell::text("Sin Gestión"));
        assert_eq!(cell("SUB_ESTADO"), Cell::text("Sin Gestión"));
        assert_eq!(cell("FECHA_COMPROMISO"), Cell::Empty);
    }

    #[test]
    fn one_failing_agent_does_not_block_the_rest() {
        let mut store = MemoryStore::new();
        store.reject_writes_to("Ana_Diaz");
        let summary = run(
            &mut store,
            &import(&["ID", "EJECUTIVO"], vec![vec!["1", "Ana Diaz"], vec!["2", "Luis Soto"]]),
        );
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.distributed, 1);
        assert!(summary.failures[0].starts_with("Ana_Diaz:"));
        assert!(store.has_partition("Luis_Soto").unwrap());
    }

    #[test]
    fn system_partitions_are_never_append_targets() {
        let mut store = MemoryStore::new();
        store.create_partition("RESUMEN", &strings(&["X"])).unwrap();
        let summary = run(&mut store, &import(&["ID", "EJECUTIVO"], vec![vec!["1", "resumen"]]));
        assert_eq!(summary.appended, 0);
        assert_eq!(summary.partitions, vec!["Resumen"]);
        assert_eq!(store.partition_info("RESUMEN").unwrap().row_count, 1);
    }

    #[test]
    fn original_width_stops_at_first_extension_column() {
        let config = DistributionConfig::default();
        assert_eq!(original_width(&strings(&["A", "B", "ESTADO", "C"]), &config), 2);
        assert_eq!(original_width(&strings(&["A", "B"]), &config), 2);
    }
}
