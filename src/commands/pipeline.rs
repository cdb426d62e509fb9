//! Importación completa: lectura, agrupación, depuración, distribución y
//! reconstrucción de las vistas derivadas.

use std::fmt;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::commands::calls::build_call_pivot;
use crate::commands::consolidate::{consolidate, ConsolidationReport};
use crate::commands::duplicates::{resolve_duplicates, DuplicateCheckpoint};
use crate::commands::grouping::group_records;
use crate::commands::productivity::build_productivity;
use crate::commands::reconcile::{distribute, DistributionSummary};
use crate::commands::reset::{reset_partitions, ResetReport};
use crate::commands::summary::build_status_summary;
use crate::commands::taxonomy::reorder_partitions;
use crate::config::DistributionConfig;
use crate::error::{DistributionError, Result};
use crate::file_utils::{import_block_from_rows, read_import_csv};
use crate::models::ImportBlock;
use crate::progress::{ProgressReporter, Stage};
use crate::store::{MemoryStore, TabularStore};

/// Origen de la base a distribuir
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    CsvFile(PathBuf),
    /// Hoja dentro del mismo libro (normalmente BBDD)
    Partition(String),
}

impl fmt::Display for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::CsvFile(path) => write!(f, "{}", path.display()),
            ImportSource::Partition(name) => write!(f, "hoja {}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Borra las hojas no protegidas antes de distribuir
    pub fresh_load: bool,
}

/// Resultado de reconstruir la vista consolidada y sus derivadas
#[derive(Debug, Clone, Default)]
pub struct ViewsReport {
    pub consolidation: Option<ConsolidationReport>,
    /// Vistas reconstruidas sin error
    pub rebuilt: Vec<String>,
    /// `"LLAMADAS: <error>"` por cada vista que falló
    pub errors: Vec<String>,
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub source_name: String,
    /// Filas de datos leídas (sin encabezado)
    pub read_rows: usize,
    pub agents: usize,
    pub assigned: usize,
    pub blank_rows: usize,
    pub unassigned_rows: Vec<usize>,
    pub duplicates_removed: usize,
    pub duplicate_ledger: Vec<String>,
    pub reset: Option<ResetReport>,
    pub distribution: DistributionSummary,
    pub views: ViewsReport,
}

impl PipelineReport {
    pub fn succeeded(&self) -> usize {
        self.distribution.created + self.distribution.appended
    }

    pub fn failed(&self) -> usize {
        self.distribution.failed + self.views.errors.len()
    }

    /// Línea final para el usuario: "N ok, M con error"
    pub fn summary_line(&self) -> String {
        format!(
            "{} ejecutivos ok, {} con error ({} registros distribuidos, {} duplicados descartados)",
            self.succeeded(),
            self.failed(),
            self.distribution.distributed,
            self.duplicates_removed
        )
    }
}

fn read_source<S: TabularStore + ?Sized>(store: &S, source: &ImportSource) -> Result<ImportBlock> {
    match source {
        ImportSource::CsvFile(path) => read_import_csv(path),
        ImportSource::Partition(name) => {
            let info = store
                .partition_info(name)
                .map_err(|e| DistributionError::Access {
                    source_name: name.clone(),
                    reason: e.to_string(),
                })?;
            let rows = store.get_rows(name, 1, info.row_count)?;
            import_block_from_rows(name.clone(), rows)
        }
    }
}

/// Ejecuta la importación completa.
///
/// La confirmación de duplicados es el único punto de cancelación: después de
/// ella las fallas se acumulan en el reporte y no se revierte nada.
pub fn run_import<S: TabularStore + ?Sized>(
    store: &mut S,
    source: &ImportSource,
    options: ImportOptions,
    checkpoint: &mut dyn DuplicateCheckpoint,
    progress: &mut ProgressReporter<'_>,
    config: &DistributionConfig,
) -> Result<PipelineReport> {
    progress.report(Stage::Validate, &format!("Validando {}", source));
    if let ImportSource::CsvFile(path) = source {
        crate::file_utils::validate_file_exists(path)?;
    }

    progress.report(Stage::Read, "Leyendo base");
    let block = read_source(&*store, source)?;
    let mut report = PipelineReport {
        source_name: block.source_name.clone(),
        read_rows: block.records.len(),
        ..PipelineReport::default()
    };

    progress.report(Stage::Group, "Agrupando por ejecutivo");
    let grouped = group_records(&block, config)?;
    let agent_column = grouped.agent_column;
    report.assigned = grouped.total_assigned;
    report.blank_rows = grouped.blank_rows;
    report.unassigned_rows = grouped.unassigned_rows.clone();

    progress.report(Stage::Dedupe, "Buscando duplicados");
    let import_partition = match source {
        ImportSource::Partition(name) => Some(name.as_str()),
        ImportSource::CsvFile(_) => None,
    };
    let duplicates = if options.fresh_load {
        // Las hojas actuales se van a borrar: sólo cuentan los duplicados dentro de la base
        resolve_duplicates(&MemoryStore::new(), None, &block.header, grouped, config)?
    } else {
        resolve_duplicates(&*store, import_partition, &block.header, grouped, config)?
    };
    if duplicates.has_removals() && !checkpoint.confirm(&duplicates) {
        warn!(removed = duplicates.removed, "importación cancelada por el usuario");
        return Err(DistributionError::ImportCancelled {
            removed: duplicates.removed,
        });
    }
    report.duplicates_removed = duplicates.removed;
    report.duplicate_ledger = duplicates.ledger.clone();
    report.agents = duplicates.buckets.len();

    if options.fresh_load {
        report.reset = Some(reset_partitions(store, config)?);
    }

    report.distribution = distribute(
        store,
        &block.header,
        agent_column,
        &duplicates.buckets,
        config,
        Some(&mut *progress),
    )?;

    report.views = rebuild_views(store, Some(&mut *progress), config);

    progress.report(Stage::Done, &report.summary_line());
    info!(
        ok = report.succeeded(),
        failed = report.failed(),
        distributed = report.distribution.distributed,
        "importación terminada"
    );
    Ok(report)
}

/// Reconstruye BBDD_REPORTE, RESUMEN, LLAMADAS y PRODUCTIVIDAD y reordena el libro.
///
/// Cada vista se intenta aunque falle la anterior; los errores quedan en el reporte.
pub fn rebuild_views<S: TabularStore + ?Sized>(
    store: &mut S,
    mut progress: Option<&mut ProgressReporter<'_>>,
    config: &DistributionConfig,
) -> ViewsReport {
    let mut views = ViewsReport::default();
    let mut stage = |stage: Stage, message: &str| {
        if let Some(reporter) = progress.as_deref_mut() {
            reporter.report(stage, message);
        }
    };

    stage(Stage::Consolidate, "Consolidando reporte");
    match consolidate(store, config) {
        Ok(consolidation) => {
            views.rebuilt.push(consolidation.partition.clone());
            views.consolidation = Some(consolidation);
        }
        Err(e) => record(&mut views, &config.report_partition, e),
    }

    stage(Stage::Summary, "Generando resumen");
    match build_status_summary(store, config) {
        Ok(_) => views.rebuilt.push(config.summary_partition.clone()),
        Err(e) => record(&mut views, &config.summary_partition, e),
    }

    stage(Stage::Calls, "Generando llamadas");
    match build_call_pivot(store, config) {
        Ok(_) => views.rebuilt.push(config.calls_partition.clone()),
        Err(e) => record(&mut views, &config.calls_partition, e),
    }

    stage(Stage::Productivity, "Generando productividad");
    match build_productivity(store, config) {
        Ok(_) => views.rebuilt.push(config.productivity_partition.clone()),
        Err(e) => record(&mut views, &config.productivity_partition, e),
    }

    stage(Stage::Reorder, "Ordenando hojas");
    match reorder_partitions(store, config) {
        Ok(order) => views.order = order,
        Err(e) => record(&mut views, "orden de hojas", e),
    }

    views
}

fn record(views: &mut ViewsReport, what: &str, e: DistributionError) {
    error!(view = what, error = %e, "no se pudo reconstruir la vista");
    views.errors.push(format!("{}: {}", what, e));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::commands::duplicates::{AcceptDuplicates, RejectDuplicates};
    use crate::models::{Cell, Row};
    use crate::progress::MemoryProgressCache;

    fn source_store(rows: Vec<Vec<&str>>) -> MemoryStore {
        let mut store = MemoryStore::new();
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|r| r.into_iter().map(Cell::from).collect())
            .collect();
        store.load_partition("BBDD", rows, None);
        store
    }

    fn base() -> MemoryStore {
        source_store(vec![
            vec!["RUT", "NOMBRE", "FECHA", "EJECUTIVO"],
            vec!["1-9", "Cliente A", "01/02/2025", "Ana Diaz"],
            vec!["2-7", "Cliente B", "02/02/2025", "Luis Soto"],
            vec!["", "", "", ""],
        ])
    }

    #[test]
    fn runs_every_stage_and_reports_done() {
        let config = DistributionConfig::default();
        let mut store = base();
        let mut cache = MemoryProgressCache::new();
        let mut reporter = ProgressReporter::new(&mut cache, Duration::from_secs(60));

        let report = run_import(
            &mut store,
            &ImportSource::Partition("BBDD".into()),
            ImportOptions::default(),
            &mut AcceptDuplicates,
            &mut reporter,
            &config,
        )
        .unwrap();

        assert_eq!(reporter.last().unwrap().percent, 100);
        assert_eq!(report.read_rows, 3);
        assert_eq!(report.assigned, 2);
        assert_eq!(report.blank_rows, 1);
        assert_eq!(report.distribution.created, 2);
        assert!(report.views.errors.is_empty(), "{:?}", report.views.errors);
        assert_eq!(
            report.views.order,
            vec!["BBDD", "RESUMEN", "LLAMADAS", "PRODUCTIVIDAD", "BBDD_REPORTE", "Ana_Diaz", "Luis_Soto"]
        );
        assert_eq!(store.data_rows("BBDD_REPORTE").unwrap().len(), 2);
    }

    #[test]
    fn declined_duplicates_abort_before_writing() {
        let config = DistributionConfig::default();
        let mut store = base();
        let mut cache = MemoryProgressCache::new();
        let mut reporter = ProgressReporter::new(&mut cache, Duration::from_secs(60));
        let source = ImportSource::Partition("BBDD".into());

        run_import(&mut store, &source, ImportOptions::default(), &mut AcceptDuplicates, &mut reporter, &config)
            .unwrap();
        let before = store.list_partitions().unwrap();

        let err = run_import(&mut store, &source, ImportOptions::default(), &mut RejectDuplicates, &mut reporter, &config)
            .unwrap_err();
        assert!(matches!(err, DistributionError::ImportCancelled { removed: 2 }));
        assert_eq!(store.list_partitions().unwrap(), before);
    }

    #[test]
    fn fresh_load_replaces_previous_distribution() {
        let config = DistributionConfig::default();
        let mut store = base();
        let mut cache = MemoryProgressCache::new();
        let mut reporter = ProgressReporter::new(&mut cache, Duration::from_secs(60));
        let source = ImportSource::Partition("BBDD".into());

        run_import(&mut store, &source, ImportOptions::default(), &mut AcceptDuplicates, &mut reporter, &config)
            .unwrap();
        let report = run_import(
            &mut store,
            &source,
            ImportOptions { fresh_load: true },
            &mut RejectDuplicates,
            &mut reporter,
            &config,
        )
        .unwrap();

        assert_eq!(report.duplicates_removed, 0);
        assert!(report.reset.unwrap().deleted.contains(&"Ana_Diaz".to_string()));
        assert_eq!(store.data_rows("Ana_Diaz").unwrap().len(), 1);
    }

    #[test]
    fn missing_source_partition_is_an_access_error() {
        let config = DistributionConfig::default();
        let mut store = MemoryStore::new();
        let mut cache = MemoryProgressCache::new();
        let mut reporter = ProgressReporter::new(&mut cache, Duration::from_secs(60));
        let err = run_import(
            &mut store,
            &ImportSource::Partition("BBDD".into()),
            ImportOptions::default(),
            &mut AcceptDuplicates,
            &mut reporter,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, DistributionError::Access { .. }));
    }

    #[test]
    fn import_from_another_partition_is_not_its_own_duplicate() {
        let config = DistributionConfig::default();
        let mut store = MemoryStore::new();
        let rows: Vec<Row> = vec![
            vec!["RUT", "NOMBRE", "EJECUTIVO"],
            vec!["1-9", "Cliente A", "Ana Diaz"],
            vec!["2-7", "Cliente B", "Luis Soto"],
        ]
        .into_iter()
        .map(|r| r.into_iter().map(Cell::from).collect())
        .collect();
        store.load_partition("IMPORTAR", rows, None);
        let mut cache = MemoryProgressCache::new();
        let mut reporter = ProgressReporter::new(&mut cache, Duration::from_secs(60));

        let report = run_import(
            &mut store,
            &ImportSource::Partition("IMPORTAR".into()),
            ImportOptions::default(),
            &mut RejectDuplicates,
            &mut reporter,
            &config,
        )
        .unwrap();

        assert_eq!(report.duplicates_removed, 0);
        assert!(report.duplicate_ledger.is_empty());
        assert_eq!(report.distribution.distributed, 2);
        assert_eq!(store.data_rows("Ana_Diaz").unwrap().len(), 1);
        assert_eq!(store.data_rows("Luis_Soto").unwrap().len(), 1);
    }

    #[test]
    fn view_failures_are_isolated() {
        let config = DistributionConfig::default();
        let mut store = base();
        store.reject_writes_to("LLAMADAS");
        let mut cache = MemoryProgressCache::new();
        let mut reporter = ProgressReporter::new(&mut cache, Duration::from_secs(60));

        let report = run_import(
            &mut store,
            &ImportSource::Partition("BBDD".into()),
            ImportOptions::default(),
            &mut AcceptDuplicates,
            &mut reporter,
            &config,
        )
        .unwrap();

        assert_eq!(report.views.errors.len(), 1);
        assert!(report.views.errors[0].starts_with("LLAMADAS"));
        assert!(store.has_partition("PRODUCTIVIDAD").unwrap());
        assert_eq!(report.failed(), 1);
    }
}
