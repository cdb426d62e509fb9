use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::commands::duplicates::find_identity_column;
use crate::config::DistributionConfig;
use crate::error::{DistributionError, Result};
use crate::formula::{data_column_range, evaluation_error, FormulaDialect, RangeRef, ViewFormula};
use crate::models::{find_column, PartitionInfo, Row};
use crate::store::TabularStore;

/// Resultado de reconstruir la vista consolidada
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationReport {
    pub partition: String,
    /// Hojas de ejecutivos incluidas, en orden del libro
    pub sources: Vec<String>,
    pub rows: usize,
    pub columns: usize,
    pub formula: String,
}

/// ¿Es una hoja con datos de un ejecutivo? Se decide por sus columnas,
/// no por un registro de ejecutivos conocidos.
pub fn is_agent_data_partition(
    info: &PartitionInfo,
    header: &[String],
    config: &DistributionConfig,
) -> bool {
    if config.is_source(&info.name) || config.is_system_partition(&info.name) {
        return false;
    }
    if info.row_count <= 1 {
        return false;
    }
    header.iter().any(|h| {
        config
            .consolidation_signature
            .iter()
            .any(|s| h.trim().eq_ignore_ascii_case(s))
            || config.is_agent_header(h)
    })
}

/// Reconstruye BBDD_REPORTE como unión ordenada de todas las hojas de ejecutivos.
///
/// Si no hay hojas que califiquen no se toca el libro.
pub fn consolidate<S: TabularStore + ?Sized>(
    store: &mut S,
    config: &DistributionConfig,
) -> Result<ConsolidationReport> {
    let mut qualifying: Vec<(PartitionInfo, Vec<String>)> = Vec::new();
    for info in store.list_partitions()? {
        let header = store.get_header(&info.name)?;
        if is_agent_data_partition(&info, &header, config) {
            qualifying.push((info, header));
        }
    }

    if qualifying.is_empty() {
        warn!("no se encontraron hojas de ejecutivos para consolidar");
        return Err(DistributionError::NoAgentPartitions);
    }

    // El encabezado más ancho evita recortar hojas nuevas con más columnas
    let header = qualifying
        .iter()
        .map(|(_, h)| h)
        .fold(None::<&Vec<String>>, |widest, h| match widest {
            Some(w) if w.len() >= h.len() => Some(w),
            _ => Some(h),
        })
        .cloned()
        .unwrap_or_default();

    let formula = ViewFormula {
        sources: qualifying
            .iter()
            .map(|(info, _)| RangeRef {
                partition: info.name.clone(),
                first_row: 2,
                last_row: info.row_count,
            })
            .collect(),
        width: header.len(),
        sort_column: config.sort_column,
        ascending: true,
        dialect: FormulaDialect::resolve(store.locale().as_deref()),
    };

    let report_name = config.report_partition.as_str();
    if store.has_partition(report_name)? {
        store.delete_partition(report_name)?;
    }
    store
        .build_formula_view(report_name, &header, &formula)
        .map_err(|e| DistributionError::ConsolidationFormula {
            partition: report_name.to_string(),
            detail: e.to_string(),
        })?;

    // Sólo la fila de error del evaluador cuenta; un `#N/A` en los datos es del usuario
    let head = store.get_rows(report_name, 2, 2)?;
    if let Some(code) = evaluation_error(&head) {
        return Err(DistributionError::ConsolidationFormula {
            partition: report_name.to_string(),
            detail: code.to_string(),
        });
    }

    let rows = store.partition_info(report_name)?.data_rows();
    let expected = formula.expected_rows();
    if rows != expected {
        warn!(rows, expected, "la vista consolidada no coincide con las hojas fuente");
    }

    let sources: Vec<String> = qualifying.into_iter().map(|(info, _)| info.name).collect();
    info!(
        partition = report_name,
        sources = sources.len(),
        rows,
        "vista consolidada reconstruida"
    );

    Ok(ConsolidationReport {
        partition: report_name.to_string(),
        sources,
        rows,
        columns: header.len(),
        formula: formula.render(),
    })
}

/// Contenido de la vista consolidada con sus columnas clave ubicadas
#[derive(Debug, Clone)]
pub struct ReportSnapshot {
    pub name: String,
    pub header: Vec<String>,
    /// Sólo filas con algún valor
    pub rows: Vec<Row>,
    pub agent_column: Option<usize>,
    pub status_column: Option<usize>,
    pub sub_status_column: Option<usize>,
    pub call_date_column: Option<usize>,
    pub identity_column: Option<usize>,
    pub location_column: Option<usize>,
    pub dialect: FormulaDialect,
}

impl ReportSnapshot {
    pub fn load<S: TabularStore + ?Sized>(store: &S, config: &DistributionConfig) -> Result<Self> {
        let name = config.report_partition.as_str();
        let header = store.get_header(name)?;
        let rows = store.data_rows(name)?;
        let dialect = FormulaDialect::resolve(store.locale().as_deref());
        Ok(Self::from_parts(name, header, rows, dialect, config))
    }

    pub fn from_parts(
        name: &str,
        header: Vec<String>,
        rows: Vec<Row>,
        dialect: FormulaDialect,
        config: &DistributionConfig,
    ) -> Self {
        let rows = rows
            .into_iter()
            .filter(|row| row.iter().any(|c| !c.is_blank()))
            .collect();
        Self {
            name: name.to_string(),
            agent_column: header.iter().position(|h| config.is_agent_header(h)),
            status_column: find_column(&header, &config.columns.status),
            sub_status_column: find_column(&header, &config.columns.sub_status),
            call_date_column: find_column(&header, &config.columns.call_date),
            identity_column: find_identity_column(&header, config),
            location_column: header.iter().position(|h| config.is_location_column(h)),
            header,
            rows,
            dialect,
        }
    }

    /// Texto de la columna en la fila (vacío si la columna no existe)
    pub fn text(&self, row: &Row, column: Option<usize>) -> String {
        column
            .and_then(|c| row.get(c))
            .map(|c| c.display())
            .unwrap_or_default()
    }

    /// Rango absoluto de datos de la columna para fórmulas
    pub fn range(&self, column: usize) -> String {
        data_column_range(&self.name, column)
    }

    /// Valores distintos no vacíos de una columna, ordenados
    pub fn distinct(&self, column: Option<usize>) -> Vec<String> {
        let Some(column) = column else {
            return Vec::new();
        };
        self.rows
            .iter()
            .map(|row| self.text(row, Some(column)))
            .filter(|v| !v.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
