use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;

use crate::commands::date_ops::{date_to_serial, parse_flexible_date};

/// Valor de una celda del libro (importación, hojas de ejecutivos o vistas derivadas)
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    /// Fórmula viva con el último valor evaluado
    Formula { expr: String, cached: Box<Cell> },
    /// Señal de error del evaluador (#REF!, #N/A, #VALUE!...)
    Error(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn formula(expr: impl Into<String>, cached: Cell) -> Self {
        Cell::Formula {
            expr: expr.into(),
            cached: Box::new(cached),
        }
    }

    /// Convierte un campo crudo (CSV) en celda. Un `'` inicial marca texto literal.
    pub fn parse_raw(raw: &str) -> Self {
        if raw.is_empty() {
            return Cell::Empty;
        }
        if let Some(text) = raw.strip_prefix(TEXT_ESCAPE) {
            return Cell::from(text);
        }
        if let Some(expr) = raw.strip_prefix('=') {
            if !expr.is_empty() {
                return Cell::formula(expr, Cell::Empty);
            }
        }
        if is_error_code(raw) {
            return Cell::Error(raw.to_string());
        }
        Cell::Text(raw.to_string())
    }

    /// Valor efectivo (resuelve el valor cacheado de una fórmula)
    pub fn value(&self) -> &Cell {
        match self {
            Cell::Formula { cached, .. } => cached.value(),
            other => other,
        }
    }

    /// Vacía o sólo espacios
    pub fn is_blank(&self) -> bool {
        match self.value() {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.value(), Cell::Error(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.value() {
            Cell::Number(n) => Some(*n),
            Cell::Date(d) => Some(date_to_serial(*d) as f64),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self.value() {
            Cell::Date(d) => Some(*d),
            Cell::Number(n) => crate::commands::date_ops::serial_to_date(*n),
            Cell::Text(s) => parse_flexible_date(s),
            _ => None,
        }
    }

    /// Texto mostrado al usuario, sin espacios de borde
    pub fn display(&self) -> String {
        match self.value() {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => format_number(*n),
            Cell::Date(d) => d.format("%d/%m/%Y").to_string(),
            Cell::Error(code) => code.clone(),
            Cell::Formula { .. } => String::new(),
        }
    }

    /// Representación persistida: las fórmulas se guardan como `=expr` y el texto
    /// que `parse_raw` leería como fórmula o error lleva un `'` adelante.
    pub fn to_raw(&self) -> String {
        match self {
            Cell::Formula { expr, .. } => format!("={}", expr),
            Cell::Text(text)
                if text.starts_with('=') || text.starts_with(TEXT_ESCAPE) || is_error_code(text) =>
            {
                format!("{}{}", TEXT_ESCAPE, text)
            }
            other => other.display(),
        }
    }

    /// Orden ascendente del tipo SORT de una planilla:
    /// números y fechas primero, luego texto (sin distinguir mayúsculas), errores y vacíos al final.
    pub fn sort_cmp(&self, other: &Cell) -> Ordering {
        fn rank(cell: &Cell) -> u8 {
            if cell.is_blank() {
                return 3;
            }
            if cell.sort_key().is_some() {
                return 0;
            }
            match cell.value() {
                Cell::Text(_) => 1,
                _ => 2,
            }
        }

        let (ra, rb) = (rank(self), rank(other));
        if ra != rb {
            return ra.cmp(&rb);
        }
        match ra {
            0 => {
                let a = self.sort_key().unwrap_or(0.0);
                let b = other.sort_key().unwrap_or(0.0);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            1 | 2 => self
                .display()
                .to_lowercase()
                .cmp(&other.display().to_lowercase()),
            _ => Ordering::Equal,
        }
    }

    /// Clave numérica de orden: números, fechas y texto que se lee como fecha o número
    fn sort_key(&self) -> Option<f64> {
        match self.value() {
            Cell::Number(n) => Some(*n),
            Cell::Date(d) => Some(date_to_serial(*d) as f64),
            Cell::Text(s) => parse_flexible_date(s)
                .map(|d| date_to_serial(d) as f64)
                .or_else(|| s.trim().parse::<f64>().ok()),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<usize> for Cell {
    fn from(value: usize) -> Self {
        Cell::Number(value as f64)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

const TEXT_ESCAPE: char = '\'';

fn is_error_code(raw: &str) -> bool {
    matches!(
        raw,
        "#REF!" | "#N/A" | "#VALUE!" | "#ERROR!" | "#NAME?" | "#DIV/0!" | "#NUM!" | "#NULL!"
    )
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub type Row = Vec<Cell>;

/// Fila importada, inmutable durante una corrida
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Número de fila en la fuente (1 = encabezado)
    pub row_number: usize,
    pub cells: Row,
}

impl RawRecord {
    pub fn new(row_number: usize, cells: Row) -> Self {
        Self { row_number, cells }
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Cell::is_blank)
    }

    pub fn get(&self, column: usize) -> Option<&Cell> {
        self.cells.get(column)
    }
}

/// Bloque rectangular leído de la fuente de importación
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBlock {
    pub source_name: String,
    pub header: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl ImportBlock {
    /// Construye el bloque a partir de filas crudas (fila 0 = encabezado)
    pub fn from_rows(source_name: impl Into<String>, rows: Vec<Row>) -> Option<Self> {
        let mut iter = rows.into_iter();
        let header: Vec<String> = iter.next()?.iter().map(Cell::display).collect();
        let records = iter
            .enumerate()
            .map(|(i, cells)| RawRecord::new(i + 2, cells))
            .collect();
        Some(Self {
            source_name: source_name.into(),
            header,
            records,
        })
    }

    pub fn row_count(&self) -> usize {
        self.records.len() + 1
    }
}

/// Clave normalizada de un ejecutivo; también es el nombre de su hoja
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentKey(pub(crate) String);

impl AgentKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Forma visible en la columna de ejecutivo: `Juan_Perez` → `JUAN PEREZ`
    pub fn display_name(&self) -> String {
        self.0.replace('_', " ").to_uppercase()
    }
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadatos de una hoja del libro
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub name: String,
    /// Filas incluyendo el encabezado
    pub row_count: usize,
    pub col_count: usize,
}

impl PartitionInfo {
    pub fn data_rows(&self) -> usize {
        self.row_count.saturating_sub(1)
    }
}

/// Ubica una columna por nombre exacto (sin espacios de borde, sin distinguir mayúsculas)
pub fn find_column(header: &[String], name: &str) -> Option<usize> {
    header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
}

/// Ajusta una fila al ancho indicado: rellena con vacíos o trunca
pub fn fit_row(mut cells: Row, width: usize) -> Row {
    cells.resize(width, Cell::Empty);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection_covers_whitespace_and_formulas() {
        assert!(Cell::Empty.is_blank());
        assert!(Cell::text("   ").is_blank());
        assert!(Cell::formula("A1", Cell::Empty).is_blank());
        assert!(!Cell::Number(0.0).is_blank());
        assert!(!Cell::text("x").is_blank());
    }

    #[test]
    fn sort_puts_numbers_before_text_and_blanks_last() {
        let mut cells = vec![
            Cell::Empty,
            Cell::text("beta"),
            Cell::Number(3.0),
            Cell::text("Alfa"),
            Cell::Number(1.0),
        ];
        cells.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            cells,
            vec![
                Cell::Number(1.0),
                Cell::Number(3.0),
                Cell::text("Alfa"),
                Cell::text("beta"),
                Cell::Empty,
            ]
        );
    }

    #[test]
    fn dates_sort_chronologically_even_as_text() {
        let january = Cell::text("15/01/2025");
        let march = Cell::text("02/03/2025");
        let native = Cell::Date(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());
        assert_eq!(january.sort_cmp(&march), Ordering::Less);
        assert_eq!(native.sort_cmp(&march), Ordering::Less);
        assert_eq!(january.sort_cmp(&native), Ordering::Less);
        assert_eq!(march.as_date(), NaiveDate::from_ymd_opt(2025, 3, 2));
    }

    #[test]
    fn raw_fields_round_trip_formulas_and_errors() {
        assert_eq!(Cell::parse_raw(""), Cell::Empty);
        assert_eq!(Cell::parse_raw("#REF!"), Cell::Error("#REF!".into()));
        assert_eq!(Cell::parse_raw("=SUM(A1:A3)").to_raw(), "=SUM(A1:A3)");
        assert_eq!(Cell::Number(12.0).display(), "12");
    }

    #[test]
    fn text_that_looks_like_a_formula_or_error_stays_text() {
        for text in ["#N/A", "=no es fórmula", "'comillas", "#REF!"] {
            let cell = Cell::text(text);
            let raw = cell.to_raw();
            assert!(raw.starts_with('\''), "{}", raw);
            assert_eq!(Cell::parse_raw(&raw), cell);
        }
        assert_eq!(Cell::text("Cliente A").to_raw(), "Cliente A");
        assert_eq!(Cell::Error("#N/A".into()).to_raw(), "#N/A");
    }

    #[test]
    fn fit_row_pads_and_truncates() {
        assert_eq!(fit_row(vec![Cell::text("a")], 3).len(), 3);
        assert_eq!(fit_row(vec![Cell::text("a"); 5], 2).len(), 2);
    }

    #[test]
    fn agent_key_display_name_uses_spaces_and_uppercase() {
        let key = AgentKey("Juan_Perez".into());
        assert_eq!(key.display_name(), "JUAN PEREZ");
    }
}
