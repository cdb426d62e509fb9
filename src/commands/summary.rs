use std::collections::BTreeMap;

use tracing::info;

use crate::commands::consolidate::ReportSnapshot;
use crate::commands::replace_view;
use crate::config::DistributionConfig;
use crate::error::Result;
use crate::formula::{cell_ref, quote_text, Function};
use crate::models::{Cell, Row};
use crate::store::TabularStore;

/// Combinación estado/sub-estado observada en la vista consolidada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairTally {
    pub status: String,
    pub sub_status: String,
    pub count: usize,
    pub valid: bool,
}

/// Conteos de la hoja RESUMEN
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusSummary {
    pub total: usize,
    /// (etiqueta, cantidad) en el orden configurado
    pub tallies: Vec<(String, usize)>,
    pub pairs: Vec<PairTally>,
    /// Ejecutivos con al menos una combinación inválida
    pub invalid_agents: Vec<String>,
}

impl StatusSummary {
    pub fn count(&self, label: &str) -> Option<usize> {
        self.tallies
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
    }
}

/// Cuenta filas por etiqueta y cruza estado × sub-estado contra las combinaciones válidas
pub fn compute_status_summary(snapshot: &ReportSnapshot, config: &DistributionConfig) -> StatusSummary {
    let status = |row: &Row| snapshot.text(row, snapshot.status_column);
    let sub_status = |row: &Row| snapshot.text(row, snapshot.sub_status_column);

    let tallies = config
        .summary_labels
        .iter()
        .map(|label| {
            let count = snapshot
                .rows
                .iter()
                .filter(|row| {
                    if *label == config.sales_label {
                        status(row) == config.closed_status
                    } else if *label == config.in_progress_label {
                        status(row) == config.in_progress_status
                            && sub_status(row) == config.in_progress_sub_status
                    } else {
                        sub_status(row) == *label
                    }
                })
                .count();
            (label.clone(), count)
        })
        .collect();

    let mut observed: BTreeMap<(String, String), usize> = BTreeMap::new();
    let mut invalid_agents: Vec<String> = Vec::new();
    for row in &snapshot.rows {
        let (st, sub) = (status(row), sub_status(row));
        if st.is_empty() && sub.is_empty() {
            continue;
        }
        if !config.is_valid_combination(&st, &sub) {
            let agent = snapshot.text(row, snapshot.agent_column);
            if !agent.is_empty() && !invalid_agents.contains(&agent) {
                invalid_agents.push(agent);
            }
        }
        *observed.entry((st, sub)).or_default() += 1;
    }
    invalid_agents.sort();

    let pairs = observed
        .into_iter()
        .map(|((status, sub_status), count)| PairTally {
            valid: config.is_valid_combination(&status, &sub_status),
            status,
            sub_status,
            count,
        })
        .collect();

    StatusSummary {
        total: snapshot.rows.len(),
        tallies,
        pairs,
        invalid_agents,
    }
}

/// Fórmula de conteo de una etiqueta; `None` si faltan las columnas necesarias
fn label_formula(label: &str, snapshot: &ReportSnapshot, config: &DistributionConfig) -> Option<String> {
    let dialect = snapshot.dialect;
    let status = snapshot.status_column.map(|c| snapshot.range(c));
    let sub_status = snapshot.sub_status_column.map(|c| snapshot.range(c));

    if label == config.sales_label {
        Some(dialect.count_ifs(&[(status?, quote_text(&config.closed_status))]))
    } else if label == config.in_progress_label {
        Some(dialect.count_ifs(&[
            (status?, quote_text(&config.in_progress_status)),
            (sub_status?, quote_text(&config.in_progress_sub_status)),
        ]))
    } else {
        Some(dialect.count_ifs(&[(sub_status?, quote_text(label))]))
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Filas de la hoja RESUMEN (sin el encabezado)
pub fn summary_rows(summary: &StatusSummary, snapshot: &ReportSnapshot, config: &DistributionConfig) -> Vec<Row> {
    let dialect = snapshot.dialect;
    let mut rows: Vec<Row> = Vec::new();

    let total_cell = match snapshot.agent_column.or(snapshot.identity_column) {
        Some(column) => Cell::formula(
            dialect.call(Function::Counta, &[snapshot.range(column)]),
            Cell::from(summary.total),
        ),
        None => Cell::from(summary.total),
    };
    rows.push(vec![Cell::text("Total"), total_cell, Cell::from(1.0)]);

    let total_ref = "$B$2";
    for (label, count) in &summary.tallies {
        let sheet_row = rows.len() + 2;
        let count_cell = match label_formula(label, snapshot, config) {
            Some(expr) => Cell::formula(expr, Cell::from(*count)),
            None => Cell::from(*count),
        };
        let percent = Cell::formula(
            dialect.safe_ratio(&cell_ref(1, sheet_row), total_ref),
            Cell::from(ratio(*count, summary.total)),
        );
        rows.push(vec![Cell::text(label.clone()), count_cell, percent]);
    }

    rows.push(Vec::new());
    rows.push(
        ["ESTADO", "SUB_ESTADO", "CANTIDAD", "VALIDACIÓN"]
            .into_iter()
            .map(Cell::from)
            .collect(),
    );
    for pair in &summary.pairs {
        rows.push(vec![
            Cell::text(pair.status.clone()),
            Cell::text(pair.sub_status.clone()),
            Cell::from(pair.count),
            Cell::text(if pair.valid { "VÁLIDO" } else { "INVÁLIDO" }),
        ]);
    }

    if !summary.invalid_agents.is_empty() {
        rows.push(Vec::new());
        rows.push(vec![Cell::text("EJECUTIVOS CON COMBINACIONES INVÁLIDAS")]);
        for agent in &summary.invalid_agents {
            rows.push(vec![Cell::text(agent.clone())]);
        }
    }

    rows
}

/// Reconstruye la hoja RESUMEN desde BBDD_REPORTE
pub fn build_status_summary<S: TabularStore + ?Sized>(
    store: &mut S,
    config: &DistributionConfig,
) -> Result<StatusSummary> {
    let snapshot = ReportSnapshot::load(&*store, config)?;
    let summary = compute_status_summary(&snapshot, config);
    let rows = summary_rows(&summary, &snapshot, config);

    let header: Vec<String> = ["CATEGORÍA", "CANTIDAD", "PORCENTAJE"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    replace_view(store, &config.summary_partition, &header, &rows)?;

    info!(
        total = summary.total,
        invalid_pairs = summary.pairs.iter().filter(|p| !p.valid).count(),
        "resumen de estados reconstruido"
    );
    Ok(summary)
}
