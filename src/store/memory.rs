use std::collections::HashSet;

use tracing::debug;

use super::{header_cells, validate_partition_name, TabularStore};
use crate::error::{StoreError, StoreResult};
use crate::formula::ViewFormula;
use crate::models::{Cell, PartitionInfo, Row};

#[derive(Debug, Clone)]
struct Sheet {
    name: String,
    /// rows[0] es el encabezado
    rows: Vec<Row>,
    formula: Option<String>,
}

impl Sheet {
    fn info(&self) -> PartitionInfo {
        PartitionInfo {
            name: self.name.clone(),
            row_count: self.rows.len(),
            col_count: self.rows.iter().map(Vec::len).max().unwrap_or(0),
        }
    }
}

/// Libro en memoria. Evalúa las vistas de fórmula al construirlas.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sheets: Vec<Sheet>,
    active: Option<String>,
    locale: Option<String>,
    rejected: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(locale: impl Into<String>) -> Self {
        Self {
            locale: Some(locale.into()),
            ..Self::default()
        }
    }

    pub fn set_locale(&mut self, locale: Option<String>) {
        self.locale = locale;
    }

    /// Simula una hoja bloqueada: toda escritura sobre ese nombre falla
    pub fn reject_writes_to(&mut self, name: impl Into<String>) {
        self.rejected.insert(name.into());
    }

    /// Texto de la fórmula que respalda una vista, si la hay
    pub fn formula_text(&self, name: &str) -> Option<&str> {
        self.sheet(name).ok().and_then(|s| s.formula.as_deref())
    }

    /// Carga una hoja completa (encabezado incluido), reemplazando la existente
    pub fn load_partition(&mut self, name: &str, rows: Vec<Row>, formula: Option<String>) {
        let sheet = Sheet {
            name: name.to_string(),
            rows,
            formula,
        };
        match self.sheets.iter_mut().find(|s| s.name == name) {
            Some(existing) => *existing = sheet,
            None => self.sheets.push(sheet),
        }
        if self.active.is_none() {
            self.active = Some(name.to_string());
        }
    }

    /// Todas las filas de una hoja, encabezado incluido
    pub fn all_rows(&self, name: &str) -> StoreResult<&[Row]> {
        Ok(&self.sheet(name)?.rows)
    }

    fn sheet(&self, name: &str) -> StoreResult<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::PartitionNotFound(name.to_string()))
    }

    fn sheet_mut(&mut self, name: &str) -> StoreResult<&mut Sheet> {
        if self.rejected.contains(name) {
            return Err(StoreError::WriteRejected(name.to_string()));
        }
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::PartitionNotFound(name.to_string()))
    }
}

impl TabularStore for MemoryStore {
    fn list_partitions(&self) -> StoreResult<Vec<PartitionInfo>> {
        Ok(self.sheets.iter().map(Sheet::info).collect())
    }

    fn get_header(&self, name: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .sheet(name)?
            .rows
            .first()
            .map(|row| row.iter().map(Cell::display).collect())
            .unwrap_or_default())
    }

    fn get_rows(&self, name: &str, row_start: usize, row_count: usize) -> StoreResult<Vec<Row>> {
        if row_start == 0 {
            return Err(StoreError::InvalidRange {
                partition: name.to_string(),
                reason: "rows start at 1".to_string(),
            });
        }
        let sheet = self.sheet(name)?;
        Ok(sheet
            .rows
            .iter()
            .skip(row_start - 1)
            .take(row_count)
            .cloned()
            .collect())
    }

    fn create_partition(&mut self, name: &str, header: &[String]) -> StoreResult<()> {
        validate_partition_name(name)?;
        if self.rejected.contains(name) {
            return Err(StoreError::WriteRejected(name.to_string()));
        }
        if self.sheets.iter().any(|s| s.name == name) {
            return Err(StoreError::PartitionExists(name.to_string()));
        }
        debug!(partition = name, columns = header.len(), "hoja creada");
        self.load_partition(name, vec![header_cells(header)], None);
        Ok(())
    }

    fn delete_partition(&mut self, name: &str) -> StoreResult<()> {
        let index = self
            .sheets
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| StoreError::PartitionNotFound(name.to_string()))?;
        self.sheets.remove(index);
        if self.active.as_deref() == Some(name) {
            self.active = self.sheets.first().map(|s| s.name.clone());
        }
        Ok(())
    }

    fn append_rows(&mut self, name: &str, rows: &[Row]) -> StoreResult<()> {
        let sheet = self.sheet_mut(name)?;
        sheet.rows.extend(rows.iter().cloned());
        Ok(())
    }

    fn write_rows(&mut self, name: &str, start_row: usize, rows: &[Row]) -> StoreResult<()> {
        if start_row == 0 {
            return Err(StoreError::InvalidRange {
                partition: name.to_string(),
                reason: "rows start at 1".to_string(),
            });
        }
        let sheet = self.sheet_mut(name)?;
        let end = start_row - 1 + rows.len();
        if sheet.rows.len() < end {
            sheet.rows.resize(end, Vec::new());
        }
        for (offset, row) in rows.iter().enumerate() {
            sheet.rows[start_row - 1 + offset] = row.clone();
        }
        Ok(())
    }

    fn build_formula_view(
        &mut self,
        name: &str,
        header: &[String],
        formula: &ViewFormula,
    ) -> StoreResult<()> {
        validate_partition_name(name)?;
        if self.rejected.contains(name) {
            return Err(StoreError::WriteRejected(name.to_string()));
        }

        let evaluated = formula.evaluate(|source, start, count| {
            self.get_rows(source, start, count).ok()
        });

        let mut rows = Vec::with_capacity(evaluated.len() + 1);
        rows.push(header_cells(header));
        rows.extend(evaluated);
        self.load_partition(name, rows, Some(formula.render()));
        Ok(())
    }

    fn reorder_partition(&mut self, name: &str, position: usize) -> StoreResult<()> {
        let index = self
            .sheets
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| StoreError::PartitionNotFound(name.to_string()))?;
        let sheet = self.sheets.remove(index);
        let position = position.min(self.sheets.len());
        self.sheets.insert(position, sheet);
        Ok(())
    }

    fn active_partition(&self) -> Option<String> {
        self.active.clone()
    }

    fn set_active_partition(&mut self, name: &str) -> StoreResult<()> {
        self.sheet(name)?;
        self.active = Some(name.to_string());
        Ok(())
    }

    fn locale(&self) -> Option<String> {
        self.locale.clone()
    }
}
