use chrono::NaiveDate;
use tracing::debug;

use crate::config::DistributionConfig;
use crate::error::Result;
use crate::models::{find_column, Cell, Row};
use crate::store::TabularStore;

pub const COMMITMENT_FULFILLED: &str = "CUMPLIDO";
pub const COMMITMENT_OVERDUE: &str = "VENCIDO";
pub const COMMITMENT_TODAY: &str = "HOY";
pub const COMMITMENT_PENDING: &str = "PENDIENTE";

/// Celda derivada que hay que reescribir tras una edición
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// Columna base 0
    pub column: usize,
    pub value: Cell,
}

/// Estado del compromiso según la fecha comprometida y el estado de la gestión
pub fn commitment_status(commitment: Option<NaiveDate>, status: &str, today: NaiveDate, config: &DistributionConfig) -> &'static str {
    let Some(date) = commitment else {
        return "";
    };
    if status == config.closed_status {
        COMMITMENT_FULFILLED
    } else if date < today {
        COMMITMENT_OVERDUE
    } else if date == today {
        COMMITMENT_TODAY
    } else {
        COMMITMENT_PENDING
    }
}

/// Reacción a la edición de una celda: recalcula ESTADO_COMPROMISO si la
/// columna editada es FECHA_COMPROMISO o ESTADO. `None` si no corresponde.
pub fn on_field_changed(
    header: &[String],
    row: &Row,
    changed_column: usize,
    today: NaiveDate,
    config: &DistributionConfig,
) -> Option<FieldUpdate> {
    let date_col = find_column(header, &config.columns.commitment_date)?;
    let status_col = find_column(header, &config.columns.status);
    let target = find_column(header, &config.columns.commitment_status)?;

    if changed_column != date_col && Some(changed_column) != status_col {
        return None;
    }

    let commitment = row.get(date_col).and_then(Cell::as_date);
    let status = status_col
        .and_then(|c| row.get(c))
        .map(Cell::display)
        .unwrap_or_default();

    let value = match commitment_status(commitment, &status, today, config) {
        "" => Cell::Empty,
        label => Cell::text(label),
    };
    Some(FieldUpdate {
        column: target,
        value,
    })
}

/// Aplica `on_field_changed` sobre una fila de una hoja de ejecutivo (fila base 1)
pub fn apply_field_change<S: TabularStore + ?Sized>(
    store: &mut S,
    partition: &str,
    row_index: usize,
    changed_column: usize,
    today: NaiveDate,
    config: &DistributionConfig,
) -> Result<Option<FieldUpdate>> {
    if row_index < 2 || config.is_source(partition) || config.is_system_partition(partition) {
        return Ok(None);
    }

    let header = store.get_header(partition)?;
    let Some(mut row) = store.get_rows(partition, row_index, 1)?.into_iter().next() else {
        return Ok(None);
    };
    let Some(update) = on_field_changed(&header, &row, changed_column, today, config) else {
        return Ok(None);
    };

    if row.len() <= update.column {
        row.resize(header.len().max(update.column + 1), Cell::Empty);
    }
    row[update.column] = update.value.clone();
    store.write_rows(partition, row_index, &[row])?;

    debug!(partition, row = row_index, value = %update.value.display(), "estado de compromiso actualizado");
    Ok(Some(update))
}
