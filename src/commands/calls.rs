use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::info;

use crate::commands::consolidate::ReportSnapshot;
use crate::commands::replace_view;
use crate::config::DistributionConfig;
use crate::error::Result;
use crate::formula::{cell_ref, column_letter, quote_text, Function};
use crate::models::{Cell, Row};
use crate::store::TabularStore;

/// Llamadas por ejecutivo y fecha
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallPivot {
    pub agents: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// counts[agente][fecha]
    pub counts: Vec<Vec<usize>>,
}

impl CallPivot {
    pub fn agent_total(&self, agent: usize) -> usize {
        self.counts.get(agent).map(|row| row.iter().sum()).unwrap_or(0)
    }

    pub fn date_total(&self, date: usize) -> usize {
        self.counts.iter().filter_map(|row| row.get(date)).sum()
    }

    pub fn grand_total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

/// Cuenta registros con identidad por (ejecutivo, fecha de llamada)
pub fn compute_call_pivot(snapshot: &ReportSnapshot) -> CallPivot {
    let agents = snapshot.distinct(snapshot.agent_column);

    let date_of = |row: &Row| {
        snapshot
            .call_date_column
            .and_then(|c| row.get(c))
            .and_then(Cell::as_date)
    };
    let dates: Vec<NaiveDate> = snapshot
        .rows
        .iter()
        .filter_map(date_of)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut counts = vec![vec![0usize; dates.len()]; agents.len()];
    for row in &snapshot.rows {
        if snapshot.identity_column.is_some() && snapshot.text(row, snapshot.identity_column).is_empty() {
            continue;
        }
        let agent = snapshot.text(row, snapshot.agent_column);
        let (Ok(a), Some(date)) = (agents.binary_search(&agent), date_of(row)) else {
            continue;
        };
        if let Ok(d) = dates.binary_search(&date) {
            counts[a][d] += 1;
        }
    }

    CallPivot {
        agents,
        dates,
        counts,
    }
}

/// Encabezado: EJECUTIVO, TOTAL, fechas y columnas de reserva vacías
pub fn pivot_header(pivot: &CallPivot, config: &DistributionConfig) -> Vec<String> {
    let mut header = vec!["EJECUTIVO".to_string(), "TOTAL".to_string()];
    header.extend(pivot.dates.iter().map(|d| d.format("%d/%m/%Y").to_string()));
    header.extend(vec![String::new(); config.pivot_buffer_columns]);
    header
}

/// Filas del pivote: una por ejecutivo más la fila de totales.
/// Sin ejecutivos sólo queda el encabezado.
pub fn pivot_rows(pivot: &CallPivot, snapshot: &ReportSnapshot, config: &DistributionConfig) -> Vec<Row> {
    if pivot.agents.is_empty() {
        return Vec::new();
    }

    let dialect = snapshot.dialect;
    let width = 2 + pivot.dates.len() + config.pivot_buffer_columns;
    let last_col = column_letter(width - 1);
    let agent_range = snapshot.agent_column.map(|c| snapshot.range(c));
    let date_range = snapshot.call_date_column.map(|c| snapshot.range(c));
    let identity_range = snapshot.identity_column.map(|c| snapshot.range(c));

    let mut rows: Vec<Row> = Vec::with_capacity(pivot.agents.len() + 1);
    for (a, agent) in pivot.agents.iter().enumerate() {
        let sheet_row = a + 2;
        let mut row: Row = vec![
            Cell::text(agent.clone()),
            Cell::formula(
                dialect.call(Function::Sum, &[format!("C{}:{}{}", sheet_row, last_col, sheet_row)]),
                Cell::from(pivot.agent_total(a)),
            ),
        ];

        for column in 2..width {
            let date_header = format!("{}$1", column_letter(column));
            let mut conditions = Vec::new();
            if let Some(range) = &agent_range {
                conditions.push((range.clone(), format!("$A{}", sheet_row)));
            }
            if let Some(range) = &date_range {
                conditions.push((range.clone(), date_header.clone()));
            }
            if let Some(range) = &identity_range {
                conditions.push((range.clone(), quote_text("<>")));
            }
            let expr = dialect.call(
                Function::If,
                &[
                    format!("{}=\"\"", date_header),
                    "\"\"".to_string(),
                    dialect.count_ifs(&conditions),
                ],
            );
            let cached = match pivot.counts[a].get(column - 2) {
                Some(count) => Cell::from(*count),
                None => Cell::Empty,
            };
            row.push(Cell::formula(expr, cached));
        }
        rows.push(row);
    }

    let last_agent_row = pivot.agents.len() + 1;
    let mut totals: Row = vec![Cell::text("TOTAL")];
    for column in 1..width {
        let cached = if column == 1 {
            Cell::from(pivot.grand_total())
        } else if column - 2 < pivot.dates.len() {
            Cell::from(pivot.date_total(column - 2))
        } else {
            Cell::from(0usize)
        };
        totals.push(Cell::formula(
            dialect.call(
                Function::Sum,
                &[format!("{}:{}", cell_ref(column, 2), cell_ref(column, last_agent_row))],
            ),
            cached,
        ));
    }
    rows.push(totals);
    rows
}

/// Reconstruye la hoja LLAMADAS desde BBDD_REPORTE
pub fn build_call_pivot<S: TabularStore + ?Sized>(
    store: &mut S,
    config: &DistributionConfig,
) -> Result<CallPivot> {
    let snapshot = ReportSnapshot::load(&*store, config)?;
    let pivot = compute_call_pivot(&snapshot);
    let header = pivot_header(&pivot, config);
    let rows = pivot_rows(&pivot, &snapshot, config);
    replace_view(store, &config.calls_partition, &header, &rows)?;

    info!(
        agents = pivot.agents.len(),
        dates = pivot.dates.len(),
        calls = pivot.grand_total(),
        "pivote de llamadas reconstruido"
    );
    Ok(pivot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaDialect;

    fn snapshot(rows: Vec<[&str; 3]>) -> ReportSnapshot {
        let header = ["RUT", "EJECUTIVO", "FECHA_LLAMADA"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = rows
            .into_iter()
            .map(|r| r.into_iter().map(Cell::from).collect())
            .collect();
        ReportSnapshot::from_parts(
            "BBDD_REPORTE",
            header,
            rows,
            FormulaDialect::English,
            &DistributionConfig::default(),
        )
    }

    #[test]
    fn counts_calls_per_agent_and_date() {
        let snap = snapshot(vec![
            ["1", "ANA DIAZ", "02/01/2025"],
            ["2", "ANA DIAZ", "01/01/2025"],
            ["3", "LUIS SOTO", "02/01/2025"],
            ["", "LUIS SOTO", "02/01/2025"],
            ["4", "LUIS SOTO", ""],
        ]);
        let pivot = compute_call_pivot(&snap);
        assert_eq!(pivot.agents, vec!["ANA DIAZ", "LUIS SOTO"]);
        assert_eq!(pivot.dates.len(), 2);
        assert_eq!(pivot.counts, vec![vec![1, 1], vec![0, 1]]);
        assert_eq!(pivot.grand_total(), 3);
    }

    #[test]
    fn rows_include_buffer_columns_and_totals() {
        let config = DistributionConfig::default();
        let snap = snapshot(vec![["1", "ANA DIAZ", "02/01/2025"]]);
        let pivot = compute_call_pivot(&snap);
        let header = pivot_header(&pivot, &config);
        assert_eq!(header.len(), 3 + config.pivot_buffer_columns);
        assert_eq!(header[2], "02/01/2025");

        let rows = pivot_rows(&pivot, &snap, &config);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == header.len()));
        assert_eq!(rows[0][2].as_number(), Some(1.0));
        assert!(rows[0][3].is_blank());
        match &rows[0][2] {
            Cell::Formula { expr, .. } => assert_eq!(
                expr,
                "IF(C$1=\"\",\"\",COUNTIFS('BBDD_REPORTE'!$B$2:$B,$A2,'BBDD_REPORTE'!$C$2:$C,C$1,'BBDD_REPORTE'!$A$2:$A,\"<>\"))"
            ),
            other => panic!("se esperaba fórmula, llegó {:?}", other),
        }
        assert_eq!(rows[1][0], Cell::text("TOTAL"));
        assert_eq!(rows[1][1].as_number(), Some(1.0));
    }

    #[test]
    fn no_agents_yields_header_only() {
        let config = DistributionConfig::default();
        let snap = snapshot(vec![]);
        let pivot = compute_call_pivot(&snap);
        assert!(pivot_rows(&pivot, &snap, &config).is_empty());
        assert_eq!(pivot_header(&pivot, &config).len(), 2 + config.pivot_buffer_columns);
    }

    #[test]
    fn agents_without_dates_still_get_rows() {
        let config = DistributionConfig::default();
        let snap = snapshot(vec![["1", "ANA DIAZ", ""]]);
        let pivot = compute_call_pivot(&snap);
        assert!(pivot.dates.is_empty());
        let rows = pivot_rows(&pivot, &snap, &config);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1].as_number(), Some(0.0));
    }
}
