use indexmap::IndexMap;
use tracing::{info, warn};

use crate::config::DistributionConfig;
use crate::error::{DistributionError, Result};
use crate::models::{AgentKey, ImportBlock, RawRecord};
use crate::normalize::normalize;

/// Registros agrupados por ejecutivo, en orden de primera aparición
#[derive(Debug, Clone, Default)]
pub struct GroupedRecords {
    pub buckets: IndexMap<AgentKey, Vec<RawRecord>>,
    /// Columna de ejecutivo en el encabezado importado
    pub agent_column: usize,
    pub total_assigned: usize,
    pub blank_rows: usize,
    /// Filas con datos pero sin un nombre de ejecutivo utilizable
    pub unassigned_rows: Vec<usize>,
}

/// Primera columna (de izquierda a derecha) cuyo nombre contiene un token de ejecutivo
pub fn find_agent_column(header: &[String], config: &DistributionConfig) -> Result<usize> {
    header
        .iter()
        .position(|h| config.is_agent_header(h))
        .ok_or_else(|| DistributionError::ColumnNotFound {
            expected: config.agent_column_tokens.join("/"),
        })
}

/// Reparte las filas importadas por ejecutivo.
///
/// Las filas completamente vacías se descartan y no cuentan como asignadas.
pub fn group_records(block: &ImportBlock, config: &DistributionConfig) -> Result<GroupedRecords> {
    let agent_column = find_agent_column(&block.header, config)?;
    let mut grouped = GroupedRecords {
        agent_column,
        ..GroupedRecords::default()
    };

    for record in &block.records {
        if record.is_blank() {
            grouped.blank_rows += 1;
            continue;
        }

        let raw_name = record
            .get(agent_column)
            .map(|c| c.display())
            .unwrap_or_default();
        let key = normalize(&raw_name);
        if key.is_empty() {
            warn!(row = record.row_number, "fila sin ejecutivo asignado, se omite");
            grouped.unassigned_rows.push(record.row_number);
            continue;
        }

        grouped.buckets.entry(key).or_default().push(record.clone());
        grouped.total_assigned += 1;
    }

    info!(
        agents = grouped.buckets.len(),
        assigned = grouped.total_assigned,
        blank = grouped.blank_rows,
        unassigned = grouped.unassigned_rows.len(),
        "registros agrupados por ejecutivo"
    );
    Ok(grouped)
}
