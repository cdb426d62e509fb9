//! Construcción de fórmulas en el dialecto del libro y evaluación estructural
//! de la vista consolidada.

use serde::{Deserialize, Serialize};

use crate::models::{fit_row, Cell, Row};

/// Dialecto de fórmulas del evaluador del libro. Se resuelve una vez por conexión.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FormulaDialect {
    /// SORT, COUNTIFS, separador `,`
    #[default]
    English,
    /// ORDENAR, CONTAR.SI.CONJUNTO, separador `;`
    Spanish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sort,
    CountIfs,
    Counta,
    Sum,
    If,
}

impl FormulaDialect {
    /// Elige el dialecto a partir de la configuración regional del libro
    pub fn resolve(locale: Option<&str>) -> Self {
        match locale {
            Some(l) if l.to_ascii_lowercase().starts_with("es") => FormulaDialect::Spanish,
            _ => FormulaDialect::English,
        }
    }

    pub fn arg_separator(self) -> &'static str {
        match self {
            FormulaDialect::English => ",",
            FormulaDialect::Spanish => ";",
        }
    }

    pub fn name(self, function: Function) -> &'static str {
        match (self, function) {
            (FormulaDialect::English, Function::Sort) => "SORT",
            (FormulaDialect::English, Function::CountIfs) => "COUNTIFS",
            (FormulaDialect::English, Function::Counta) => "COUNTA",
            (FormulaDialect::English, Function::Sum) => "SUM",
            (FormulaDialect::English, Function::If) => "IF",
            (FormulaDialect::Spanish, Function::Sort) => "ORDENAR",
            (FormulaDialect::Spanish, Function::CountIfs) => "CONTAR.SI.CONJUNTO",
            (FormulaDialect::Spanish, Function::Counta) => "CONTARA",
            (FormulaDialect::Spanish, Function::Sum) => "SUMA",
            (FormulaDialect::Spanish, Function::If) => "SI",
        }
    }

    pub fn true_literal(self) -> &'static str {
        match self {
            FormulaDialect::English => "TRUE",
            FormulaDialect::Spanish => "VERDADERO",
        }
    }

    /// `NOMBRE(arg1, arg2, ...)` con el separador del dialecto
    pub fn call<S: AsRef<str>>(self, function: Function, args: &[S]) -> String {
        let joined = args
            .iter()
            .map(|a| a.as_ref())
            .collect::<Vec<_>>()
            .join(self.arg_separator());
        format!("{}({})", self.name(function), joined)
    }

    /// `COUNTIFS(rango1, criterio1, rango2, criterio2, ...)`
    pub fn count_ifs(self, conditions: &[(String, String)]) -> String {
        let args: Vec<&str> = conditions
            .iter()
            .flat_map(|(range, criterion)| [range.as_str(), criterion.as_str()])
            .collect();
        self.call(Function::CountIfs, &args)
    }

    /// `IF(divisor=0, 0, dividendo/divisor)`
    pub fn safe_ratio(self, numerator: &str, denominator: &str) -> String {
        self.call(
            Function::If,
            &[
                format!("{}=0", denominator),
                "0".to_string(),
                format!("{}/{}", numerator, denominator),
            ],
        )
    }
}

/// Índice de columna (base 0) → letras: 0 → A, 25 → Z, 26 → AA
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Referencia de celda A1 (columna base 0, fila base 1)
pub fn cell_ref(column: usize, row: usize) -> String {
    format!("{}{}", column_letter(column), row)
}

/// Nombre de hoja entre comillas simples
pub fn quote_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Columna completa de datos (desde la fila 2) con referencia absoluta
pub fn data_column_range(sheet: &str, column: usize) -> String {
    let letter = column_letter(column);
    format!("{}!${}$2:${}", quote_sheet(sheet), letter, letter)
}

/// Texto literal entre comillas dobles
pub fn quote_text(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Rango de filas de una hoja fuente dentro de la unión
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRef {
    pub partition: String,
    pub first_row: usize,
    pub last_row: usize,
}

/// Unión vertical de rangos ordenada por una columna: `SORT({r1;r2;...}, col, TRUE)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewFormula {
    pub sources: Vec<RangeRef>,
    /// Ancho común de todos los rangos
    pub width: usize,
    /// Columna de orden, base 0
    pub sort_column: usize,
    pub ascending: bool,
    pub dialect: FormulaDialect,
}

impl ViewFormula {
    pub fn render(&self) -> String {
        let last_col = column_letter(self.width.saturating_sub(1));
        let ranges: Vec<String> = self
            .sources
            .iter()
            .map(|r| {
                format!(
                    "{}!A{}:{}{}",
                    quote_sheet(&r.partition),
                    r.first_row,
                    last_col,
                    r.last_row
                )
            })
            .collect();

        let order = if self.ascending {
            self.dialect.true_literal().to_string()
        } else {
            match self.dialect {
                FormulaDialect::English => "FALSE".to_string(),
                FormulaDialect::Spanish => "FALSO".to_string(),
            }
        };

        format!(
            "={}",
            self.dialect.call(
                Function::Sort,
                &[
                    format!("{{{}}}", ranges.join(";")),
                    (self.sort_column + 1).to_string(),
                    order,
                ],
            )
        )
    }

    pub fn expected_rows(&self) -> usize {
        self.sources
            .iter()
            .map(|r| (r.last_row + 1).saturating_sub(r.first_row))
            .sum()
    }

    /// Evalúa la unión con las filas que entrega `fetch(hoja, fila_inicial, cantidad)`.
    /// Una hoja inexistente produce una única fila `#REF!`.
    pub fn evaluate<F>(&self, mut fetch: F) -> Vec<Row>
    where
        F: FnMut(&str, usize, usize) -> Option<Vec<Row>>,
    {
        let mut union: Vec<Row> = Vec::with_capacity(self.expected_rows());

        for source in &self.sources {
            let count = (source.last_row + 1).saturating_sub(source.first_row);
            match fetch(&source.partition, source.first_row, count) {
                Some(rows) => {
                    union.extend(rows.into_iter().map(|row| fit_row(row, self.width)));
                }
                None => {
                    let mut error_row = vec![Cell::Error("#REF!".to_string())];
                    error_row.resize(self.width.max(1), Cell::Empty);
                    return vec![error_row];
                }
            }
        }

        let column = self.sort_column;
        let ascending = self.ascending;
        // sort_by es estable: empates conservan el orden de las hojas fuente
        union.sort_by(|a, b| {
            let ord = a
                .get(column)
                .unwrap_or(&Cell::Empty)
                .sort_cmp(b.get(column).unwrap_or(&Cell::Empty));
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        union
    }
}

/// Código de error si `rows` es la fila única con que `evaluate` señala un rango inválido
pub fn evaluation_error(rows: &[Row]) -> Option<&str> {
    let [row] = rows else {
        return None;
    };
    match row.split_first() {
        Some((Cell::Error(code), rest)) if rest.iter().all(Cell::is_blank) => Some(code.as_str()),
        _ => None,
    }
}
