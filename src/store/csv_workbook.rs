use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{MemoryStore, TabularStore};
use crate::error::StoreResult;
use crate::file_utils::ensure_directory_exists;
use crate::formula::ViewFormula;
use crate::models::{Cell, PartitionInfo, Row};

const MANIFEST_FILE: &str = "workbook.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    order: Vec<String>,
    active: Option<String>,
    locale: Option<String>,
    /// Texto de fórmula de las vistas (hoja → fórmula)
    #[serde(default)]
    formulas: BTreeMap<String, String>,
}

/// Libro respaldado en un directorio: una hoja = un CSV, más `workbook.json`
/// con el orden de las hojas, la hoja activa y las fórmulas de las vistas.
#[derive(Debug)]
pub struct CsvWorkbook {
    dir: PathBuf,
    inner: MemoryStore,
}

impl CsvWorkbook {
    /// Abre (o inicializa) el libro en `dir`
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_directory_exists(&dir)?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest: Manifest = if manifest_path.exists() {
            serde_json::from_reader(File::open(&manifest_path)?)?
        } else {
            Manifest::default()
        };

        let mut inner = MemoryStore::new();
        inner.set_locale(manifest.locale.clone());
        for name in &manifest.order {
            let rows = read_sheet(&sheet_path(&dir, name))?;
            inner.load_partition(name, rows, manifest.formulas.get(name).cloned());
        }
        if let Some(active) = &manifest.active {
            if inner.set_active_partition(active).is_err() {
                debug!(partition = %active, "hoja activa del manifiesto no existe");
            }
        }

        info!(path = %dir.display(), sheets = manifest.order.len(), "libro abierto");
        Ok(Self { dir, inner })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn set_locale(&mut self, locale: Option<String>) -> StoreResult<()> {
        self.inner.set_locale(locale);
        self.save_manifest()
    }

    pub fn formula_text(&self, name: &str) -> Option<&str> {
        self.inner.formula_text(name)
    }

    fn save_manifest(&self) -> StoreResult<()> {
        let partitions = self.inner.list_partitions()?;
        let formulas = partitions
            .iter()
            .filter_map(|p| {
                self.inner
                    .formula_text(&p.name)
                    .map(|f| (p.name.clone(), f.to_string()))
            })
            .collect();
        let manifest = Manifest {
            order: partitions.into_iter().map(|p| p.name).collect(),
            active: self.inner.active_partition(),
            locale: self.inner.locale(),
            formulas,
        };
        let file = File::create(self.dir.join(MANIFEST_FILE))?;
        serde_json::to_writer_pretty(file, &manifest)?;
        Ok(())
    }

    fn save_sheet(&self, name: &str) -> StoreResult<()> {
        let rows = self.inner.all_rows(name)?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_path(sheet_path(&self.dir, name))?;
        for row in rows {
            // csv no escribe registros vacíos
            if row.is_empty() {
                writer.write_record([""])?;
            } else {
                writer.write_record(row.iter().map(Cell::to_raw))?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    fn persist(&self, name: &str) -> StoreResult<()> {
        self.save_sheet(name)?;
        self.save_manifest()
    }
}

fn sheet_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.csv", name))
}

fn read_sheet(path: &Path) -> StoreResult<Vec<Row>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row: Row = record.iter().map(Cell::parse_raw).collect();
        if row.len() == 1 && row[0] == Cell::Empty {
            row.clear();
        }
        rows.push(row);
    }
    Ok(rows)
}

impl TabularStore for CsvWorkbook {
    fn list_partitions(&self) -> StoreResult<Vec<PartitionInfo>> {
        self.inner.list_partitions()
    }

    fn get_header(&self, name: &str) -> StoreResult<Vec<String>> {
        self.inner.get_header(name)
    }

    fn get_rows(&self, name: &str, row_start: usize, row_count: usize) -> StoreResult<Vec<Row>> {
        self.inner.get_rows(name, row_start, row_count)
    }

    fn create_partition(&mut self, name: &str, header: &[String]) -> StoreResult<()> {
        self.inner.create_partition(name, header)?;
        self.persist(name)
    }

    fn delete_partition(&mut self, name: &str) -> StoreResult<()> {
        self.inner.delete_partition(name)?;
        let path = sheet_path(&self.dir, name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        self.save_manifest()
    }

    fn append_rows(&mut self, name: &str, rows: &[Row]) -> StoreResult<()> {
        self.inner.append_rows(name, rows)?;
        self.persist(name)
    }

    fn write_rows(&mut self, name: &str, start_row: usize, rows: &[Row]) -> StoreResult<()> {
        self.inner.write_rows(name, start_row, rows)?;
        self.persist(name)
    }

    fn build_formula_view(
        &mut self,
        name: &str,
        header: &[String],
        formula: &ViewFormula,
    ) -> StoreResult<()> {
        self.inner.build_formula_view(name, header, formula)?;
        self.persist(name)
    }

    fn reorder_partition(&mut self, name: &str, position: usize) -> StoreResult<()> {
        self.inner.reorder_partition(name, position)?;
        self.save_manifest()
    }

    fn active_partition(&self) -> Option<String> {
        self.inner.active_partition()
    }

    fn set_active_partition(&mut self, name: &str) -> StoreResult<()> {
        self.inner.set_active_partition(name)?;
        self.save_manifest()
    }

    fn locale(&self) -> Option<String> {
        self.inner.locale()
    }
}
