//! Libro tabular: la fuente de verdad de todas las hojas.
//!
//! Filas en base 1; la fila 1 es el encabezado.

mod csv_workbook;
mod memory;

pub use csv_workbook::CsvWorkbook;
pub use memory::MemoryStore;

use crate::error::{StoreError, StoreResult};
use crate::formula::ViewFormula;
use crate::models::{Cell, PartitionInfo, Row};

pub trait TabularStore {
    /// Hojas en el orden del libro
    fn list_partitions(&self) -> StoreResult<Vec<PartitionInfo>>;

    fn get_header(&self, name: &str) -> StoreResult<Vec<String>>;

    /// Hasta `row_count` filas desde `row_start`; se recorta al final de la hoja
    fn get_rows(&self, name: &str, row_start: usize, row_count: usize) -> StoreResult<Vec<Row>>;

    fn create_partition(&mut self, name: &str, header: &[String]) -> StoreResult<()>;

    fn delete_partition(&mut self, name: &str) -> StoreResult<()>;

    /// Agrega filas inmediatamente después de la última fila de la hoja
    fn append_rows(&mut self, name: &str, rows: &[Row]) -> StoreResult<()>;

    /// Sobrescribe filas desde `start_row`, extendiendo la hoja si hace falta
    fn write_rows(&mut self, name: &str, start_row: usize, rows: &[Row]) -> StoreResult<()>;

    /// Crea (o reemplaza) una hoja cuyo contenido es la fórmula de unión evaluada
    fn build_formula_view(
        &mut self,
        name: &str,
        header: &[String],
        formula: &ViewFormula,
    ) -> StoreResult<()>;

    /// Mueve la hoja a la posición indicada (base 0)
    fn reorder_partition(&mut self, name: &str, position: usize) -> StoreResult<()>;

    fn active_partition(&self) -> Option<String>;

    fn set_active_partition(&mut self, name: &str) -> StoreResult<()>;

    /// Configuración regional del evaluador de fórmulas
    fn locale(&self) -> Option<String> {
        None
    }

    fn partition_info(&self, name: &str) -> StoreResult<PartitionInfo> {
        self.list_partitions()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| StoreError::PartitionNotFound(name.to_string()))
    }

    fn has_partition(&self, name: &str) -> StoreResult<bool> {
        Ok(self.list_partitions()?.iter().any(|p| p.name == name))
    }

    /// Todas las filas de datos (desde la fila 2)
    fn data_rows(&self, name: &str) -> StoreResult<Vec<Row>> {
        let info = self.partition_info(name)?;
        if info.row_count < 2 {
            return Ok(Vec::new());
        }
        self.get_rows(name, 2, info.row_count - 1)
    }
}

pub(crate) fn header_cells(header: &[String]) -> Row {
    header.iter().map(|h| Cell::from(h.as_str())).collect()
}

pub(crate) fn validate_partition_name(name: &str) -> StoreResult<()> {
    if name.trim().is_empty() || name.contains(['/', '\\', '\0']) || name.len() > 100 {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
