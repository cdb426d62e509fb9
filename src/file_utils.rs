use std::fs::File;
use std::io;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::info;

use crate::error::{DistributionError, Result};
use crate::models::{Cell, ImportBlock, Row};

/// Formatea bytes en formato legible (KB, MB, GB)
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Valida que un archivo exista y sea legible
pub fn validate_file_exists(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path).map_err(|e| DistributionError::Access {
        source_name: path.display().to_string(),
        reason: e.to_string(),
    })?;
    if !metadata.is_file() {
        return Err(DistributionError::Access {
            source_name: path.display().to_string(),
            reason: "no es un archivo".to_string(),
        });
    }
    Ok(metadata.len())
}

/// Crea un directorio si no existe
pub fn ensure_directory_exists(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Lee la base a distribuir desde un CSV: fila 1 = encabezado, al menos una fila de datos.
pub fn read_import_csv(path: &Path) -> Result<ImportBlock> {
    let size = validate_file_exists(path)?;
    let source_name = path.display().to_string();
    info!(file = %source_name, size = %format_bytes(size), "leyendo base de importación");

    let file = File::open(path).map_err(|e| DistributionError::Access {
        source_name: source_name.clone(),
        reason: e.to_string(),
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(file);

    let mut rows: Vec<Row> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| DistributionError::Format {
            source_name: source_name.clone(),
            reason: e.to_string(),
        })?;
        rows.push(record.iter().map(Cell::from).collect());
    }

    import_block_from_rows(source_name, rows)
}

/// Valida la forma mínima de una fuente de importación
pub fn import_block_from_rows(source_name: String, rows: Vec<Row>) -> Result<ImportBlock> {
    if rows.len() < 2 {
        return Err(DistributionError::Format {
            source_name,
            reason: format!(
                "se esperaban encabezado y al menos una fila de datos, se encontraron {} filas",
                rows.len()
            ),
        });
    }

    let block = ImportBlock::from_rows(source_name.clone(), rows).ok_or_else(|| {
        DistributionError::Format {
            source_name: source_name.clone(),
            reason: "fuente vacía".to_string(),
        }
    })?;

    if block.header.iter().all(|h| h.trim().is_empty()) {
        return Err(DistributionError::Format {
            source_name,
            reason: "el encabezado está vacío".to_string(),
        });
    }
    Ok(block)
}
