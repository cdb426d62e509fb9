//! Hoja PRODUCTIVIDAD: matriz de estados por ejecutivo y sus métricas,
//! repetidas por ubicación cuando la vista consolidada trae esa columna.

use tracing::{debug, info};

use crate::commands::consolidate::ReportSnapshot;
use crate::commands::replace_view;
use crate::config::DistributionConfig;
use crate::error::Result;
use crate::formula::{cell_ref, column_letter, quote_text, FormulaDialect, Function};
use crate::models::{Cell, Row};
use crate::store::TabularStore;

/// Conteos por estado de una fila de la matriz (ejecutivo o ubicación)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusCounts {
    pub key: String,
    /// Un conteo por cada estado configurado, en el mismo orden
    pub by_status: Vec<usize>,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.by_status.iter().sum()
    }
}

/// Métricas derivadas de una fila de la matriz
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub key: String,
    pub managed: usize,
    pub target: u32,
    pub progress: f64,
    pub contacted: usize,
    pub contacted_pct: f64,
    pub interested: usize,
    pub interested_pct: f64,
    pub closed: usize,
    pub performance: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductivityReport {
    pub by_agent: Vec<StatusCounts>,
    pub agent_metrics: Vec<Metrics>,
    /// Vacío si no se detectó columna de ubicación
    pub by_location: Vec<StatusCounts>,
    pub location_metrics: Vec<Metrics>,
    pub location_column: Option<String>,
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Matriz clave × estado a partir de la columna indicada
pub fn status_matrix(snapshot: &ReportSnapshot, key_column: Option<usize>, config: &DistributionConfig) -> Vec<StatusCounts> {
    snapshot
        .distinct(key_column)
        .into_iter()
        .map(|key| {
            let by_status = config
                .statuses
                .iter()
                .map(|status| {
                    snapshot
                        .rows
                        .iter()
                        .filter(|row| snapshot.text(row, key_column) == key)
                        .filter(|row| snapshot.text(row, snapshot.status_column) == *status)
                        .count()
                })
                .collect();
            StatusCounts { key, by_status }
        })
        .collect()
}

fn sum_statuses(counts: &StatusCounts, statuses: &[String], config: &DistributionConfig) -> usize {
    config
        .statuses
        .iter()
        .zip(&counts.by_status)
        .filter(|(status, _)| statuses.contains(status))
        .map(|(_, n)| *n)
        .sum()
}

/// GESTIONADOS = total − Sin Gestión; AVANCE = gestionados / meta;
/// % CONTACTADOS = contactados / total; % INTERESADOS = interesados / contactados;
/// % EFECTIVIDAD = cierres / gestionados
pub fn compute_metrics(counts: &StatusCounts, config: &DistributionConfig) -> Metrics {
    let total = counts.total();
    let unmanaged = sum_statuses(counts, std::slice::from_ref(&config.default_status), config);
    let managed = total - unmanaged;
    let contacted = sum_statuses(counts, &config.contacted_statuses, config);
    let interested = sum_statuses(counts, &config.interested_statuses, config);
    let closed = sum_statuses(counts, std::slice::from_ref(&config.closed_status), config);

    Metrics {
        key: counts.key.clone(),
        managed,
        target: config.productivity_target,
        progress: ratio(managed, config.productivity_target as usize),
        contacted,
        contacted_pct: ratio(contacted, total),
        interested,
        interested_pct: ratio(interested, contacted),
        closed,
        performance: ratio(closed, managed),
    }
}

pub fn compute_productivity(snapshot: &ReportSnapshot, config: &DistributionConfig) -> ProductivityReport {
    let by_agent = status_matrix(snapshot, snapshot.agent_column, config);
    let agent_metrics = by_agent.iter().map(|c| compute_metrics(c, config)).collect();

    let (by_location, location_metrics) = match snapshot.location_column {
        Some(column) => {
            let matrix = status_matrix(snapshot, Some(column), config);
            let metrics = matrix.iter().map(|c| compute_metrics(c, config)).collect();
            (matrix, metrics)
        }
        None => (Vec::new(), Vec::new()),
    };

    ProductivityReport {
        by_agent,
        agent_metrics,
        by_location,
        location_metrics,
        location_column: snapshot
            .location_column
            .and_then(|c| snapshot.header.get(c).cloned()),
    }
}

/// Arma las tablas con fórmulas que apuntan a la vista consolidada
struct TableWriter<'a> {
    snapshot: &'a ReportSnapshot,
    config: &'a DistributionConfig,
    dialect: FormulaDialect,
}

impl TableWriter<'_> {
    /// Columna (letra) de la matriz que corresponde a un estado
    fn status_letter(&self, status: &str) -> Option<String> {
        self.config
            .statuses
            .iter()
            .position(|s| s == status)
            .map(|i| column_letter(i + 1))
    }

    fn status_sum(&self, statuses: &[String], matrix_row: usize) -> String {
        let refs: Vec<String> = statuses
            .iter()
            .filter_map(|s| self.status_letter(s))
            .map(|letter| format!("{}{}", letter, matrix_row))
            .collect();
        if refs.is_empty() {
            "0".to_string()
        } else {
            self.dialect.call(Function::Sum, &refs)
        }
    }

    fn matrix(
        &self,
        title: &str,
        key_label: &str,
        key_column: Option<usize>,
        counts: &[StatusCounts],
        first_row: usize,
    ) -> Vec<Row> {
        let mut rows = vec![vec![Cell::text(title)]];
        let mut header = vec![Cell::text(key_label)];
        header.extend(self.config.statuses.iter().map(|s| Cell::text(s.clone())));
        header.push(Cell::text("TOTAL"));
        rows.push(header);

        let key_range = key_column.map(|c| self.snapshot.range(c));
        let status_range = self.snapshot.status_column.map(|c| self.snapshot.range(c));
        let total_col = self.config.statuses.len() + 1;

        for (i, entry) in counts.iter().enumerate() {
            let sheet_row = first_row + 2 + i;
            let mut row = vec![Cell::text(entry.key.clone())];
            for (s, status) in self.config.statuses.iter().enumerate() {
                let cached = Cell::from(entry.by_status[s]);
                let cell = match (&key_range, &status_range) {
                    (Some(key), Some(st)) => Cell::formula(
                        self.dialect.count_ifs(&[
                            (key.clone(), format!("$A{}", sheet_row)),
                            (st.clone(), quote_text(status)),
                        ]),
                        cached,
                    ),
                    _ => cached,
                };
                row.push(cell);
            }
            row.push(Cell::formula(
                self.dialect.call(
                    Function::Sum,
                    &[format!("{}:{}", cell_ref(1, sheet_row), cell_ref(total_col - 1, sheet_row))],
                ),
                Cell::from(entry.total()),
            ));
            rows.push(row);
        }
        rows
    }

    /// Métricas con referencias a la matriz que empieza en `matrix_first_row`
    fn metrics(
        &self,
        title: &str,
        key_label: &str,
        metrics: &[Metrics],
        matrix_first_row: usize,
    ) -> Vec<Row> {
        let mut rows = vec![vec![Cell::text(title)]];
        rows.push(
            [
                key_label,
                "GESTIONADOS",
                "META",
                "AVANCE",
                "CONTACTADOS",
                "% CONTACTADOS",
                "INTERESADOS",
                "% INTERESADOS",
                "CIERRES",
                "% EFECTIVIDAD",
            ]
            .into_iter()
            .map(Cell::from)
            .collect(),
        );

        let total_letter = column_letter(self.config.statuses.len() + 1);
        let unmanaged = self
            .status_letter(&self.config.default_status)
            .unwrap_or_else(|| total_letter.clone());
        let d = self.dialect;

        for (i, m) in metrics.iter().enumerate() {
            let matrix_row = matrix_first_row + 2 + i;
            let own_row = matrix_first_row + 2 + metrics.len() + 3 + i;
            let own = |col: usize| cell_ref(col, own_row);
            let total = format!("{}{}", total_letter, matrix_row);

            rows.push(vec![
                Cell::text(m.key.clone()),
                Cell::formula(
                    format!("{}-{}{}", total, unmanaged, matrix_row),
                    Cell::from(m.managed),
                ),
                Cell::from(m.target as usize),
                Cell::formula(d.safe_ratio(&own(1), &own(2)), Cell::from(m.progress)),
                Cell::formula(
                    self.status_sum(&self.config.contacted_statuses, matrix_row),
                    Cell::from(m.contacted),
                ),
                Cell::formula(d.safe_ratio(&own(4), &total), Cell::from(m.contacted_pct)),
                Cell::formula(
                    self.status_sum(&self.config.interested_statuses, matrix_row),
                    Cell::from(m.interested),
                ),
                Cell::formula(d.safe_ratio(&own(6), &own(4)), Cell::from(m.interested_pct)),
                Cell::formula(
                    self.status_sum(std::slice::from_ref(&self.config.closed_status), matrix_row),
                    Cell::from(m.closed),
                ),
                Cell::formula(d.safe_ratio(&own(8), &own(1)), Cell::from(m.performance)),
            ]);
        }
        rows
    }

    /// Matriz + línea vacía + métricas, comenzando en `first_row`
    fn pair(
        &self,
        (title, key_label): (&str, &str),
        key_column: Option<usize>,
        counts: &[StatusCounts],
        metrics: &[Metrics],
        first_row: usize,
    ) -> Vec<Row> {
        let mut rows = self.matrix(title, key_label, key_column, counts, first_row);
        rows.push(Vec::new());
        rows.extend(self.metrics(&format!("MÉTRICAS {}", title), key_label, metrics, first_row));
        rows
    }
}

/// Filas de la hoja PRODUCTIVIDAD. La fila 1 de la hoja es un título.
pub fn productivity_rows(report: &ProductivityReport, snapshot: &ReportSnapshot, config: &DistributionConfig) -> Vec<Row> {
    let writer = TableWriter {
        snapshot,
        config,
        dialect: snapshot.dialect,
    };

    // Los datos arrancan en la fila 2 de la hoja
    let mut rows = writer.pair(
        ("POR EJECUTIVO", "EJECUTIVO"),
        snapshot.agent_column,
        &report.by_agent,
        &report.agent_metrics,
        2,
    );

    if let Some(label) = &report.location_column {
        rows.push(Vec::new());
        let first_row = rows.len() + 2;
        rows.extend(writer.pair(
            ("POR UBICACIÓN", &label.to_uppercase()),
            snapshot.location_column,
            &report.by_location,
            &report.location_metrics,
            first_row,
        ));
    } else {
        debug!("sin columna de ubicación; se omiten las tablas por ubicación");
    }
    rows
}

/// Reconstruye la hoja PRODUCTIVIDAD desde BBDD_REPORTE
pub fn build_productivity<S: TabularStore + ?Sized>(
    store: &mut S,
    config: &DistributionConfig,
) -> Result<ProductivityReport> {
    let snapshot = ReportSnapshot::load(&*store, config)?;
    let report = compute_productivity(&snapshot, config);
    let rows = productivity_rows(&report, &snapshot, config);
    replace_view(
        store,
        &config.productivity_partition,
        &["PRODUCTIVIDAD".to_string()],
        &rows,
    )?;

    info!(
        agents = report.by_agent.len(),
        locations = report.by_location.len(),
        "productividad reconstruida"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(header: &[&str], rows: Vec<Vec<&str>>) -> ReportSnapshot {
        ReportSnapshot::from_parts(
            "BBDD_REPORTE",
            header.iter().map(|s| s.to_string()).collect(),
            rows.into_iter()
                .map(|r| r.into_iter().map(Cell::from).collect())
                .collect(),
            FormulaDialect::English,
            &DistributionConfig::default(),
        )
    }

    fn sample() -> ReportSnapshot {
        snapshot(
            &["RUT", "EJECUTIVO", "ESTADO"],
            vec![
                vec!["1", "ANA DIAZ", "Sin Gestión"],
                vec!["2", "ANA DIAZ", "Contactado"],
                vec!["3", "ANA DIAZ", "Interesado"],
                vec!["4", "ANA DIAZ", "Venta Cerrada"],
                vec!["5", "LUIS SOTO", "Sin Gestión"],
            ],
        )
    }

    #[test]
    fn metrics_follow_their_definitions() {
        let config = DistributionConfig::default();
        let report = compute_productivity(&sample(), &config);
        assert_eq!(report.by_agent.len(), 2);

        let ana = &report.agent_metrics[0];
        assert_eq!(ana.key, "ANA DIAZ");
        assert_eq!(ana.managed, 3);
        assert_eq!(ana.contacted, 3);
        assert_eq!(ana.interested, 2);
        assert_eq!(ana.closed, 1);
        assert!((ana.progress - 0.03).abs() < 1e-9);
        assert!((ana.contacted_pct - 0.75).abs() < 1e-9);
        assert!((ana.interested_pct - 2.0 / 3.0).abs() < 1e-9);
        assert!((ana.performance - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn zero_denominators_yield_zero() {
        let config = DistributionConfig::default();
        let report = compute_productivity(&sample(), &config);
        let luis = &report.agent_metrics[1];
        assert_eq!(luis.managed, 0);
        assert_eq!(luis.interested_pct, 0.0);
        assert_eq!(luis.performance, 0.0);
    }

    #[test]
    fn location_tables_only_when_column_detected() {
        let config = DistributionConfig::default();
        let snap = sample();
        let report = compute_productivity(&snap, &config);
        assert!(report.by_location.is_empty());
        let without = productivity_rows(&report, &snap, &config);

        let snap = snapshot(
            &["RUT", "EJECUTIVO", "ESTADO", "Comuna"],
            vec![
                vec!["1", "ANA DIAZ", "Contactado", "Ñuñoa"],
                vec!["2", "LUIS SOTO", "Contactado", "Maipú"],
            ],
        );
        let report = compute_productivity(&snap, &config);
        assert_eq!(report.location_column.as_deref(), Some("Comuna"));
        assert_eq!(report.by_location.len(), 2);
        let with = productivity_rows(&report, &snap, &config);
        assert!(with.iter().any(|r| r.first() == Some(&Cell::text("POR UBICACIÓN"))));
        assert!(!without.iter().any(|r| r.first() == Some(&Cell::text("POR UBICACIÓN"))));
    }

    #[test]
    fn metric_formulas_reference_the_status_matrix() {
        let config = DistributionConfig::default();
        let snap = sample();
        let report = compute_productivity(&snap, &config);
        let rows = productivity_rows(&report, &snap, &config);

        // Fila de hoja 4 = primer ejecutivo de la matriz (título en 2, encabezado en 3)
        assert_eq!(rows[2][0], Cell::text("ANA DIAZ"));
        match &rows[2][1] {
            Cell::Formula { expr, cached } => {
                assert_eq!(
                    expr,
                    "COUNTIFS('BBDD_REPORTE'!$B$2:$B,$A4,'BBDD_REPORTE'!$C$2:$C,\"Sin Gestión\")"
                );
                assert_eq!(**cached, Cell::from(1usize));
            }
            other => panic!("se esperaba fórmula, llegó {:?}", other),
        }

        // Métricas: título, encabezado y luego ANA DIAZ
        let metrics_start = 2 + report.by_agent.len() + 1;
        let ana = &rows[metrics_start + 2];
        assert_eq!(ana[0], Cell::text("ANA DIAZ"));
        match &ana[1] {
            Cell::Formula { expr, .. } => assert_eq!(expr, "H4-B4"),
            other => panic!("se esperaba fórmula, llegó {:?}", other),
        }
        match &ana[3] {
            Cell::Formula { expr, .. } => assert_eq!(expr, "IF(C9=0,0,B9/C9)"),
            other => panic!("se esperaba fórmula, llegó {:?}", other),
        }
    }
}
