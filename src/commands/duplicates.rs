use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::commands::grouping::GroupedRecords;
use crate::config::DistributionConfig;
use crate::error::Result;
use crate::models::{AgentKey, RawRecord};
use crate::store::TabularStore;

/// Resultado de la depuración de duplicados
#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    pub buckets: IndexMap<AgentKey, Vec<RawRecord>>,
    pub removed: usize,
    /// `"Luis_Soto: RUT 12345678K"` por cada registro descartado, en orden de fila
    pub ledger: Vec<String>,
    /// Columna de identidad de la importación; `None` = no se pudo depurar
    pub identity_column: Option<usize>,
}

impl DuplicateReport {
    pub fn has_removals(&self) -> bool {
        self.removed > 0
    }

    pub fn total_kept(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// Confirmación humana antes de escribir cuando hubo duplicados
pub trait DuplicateCheckpoint {
    /// `false` aborta la importación
    fn confirm(&mut self, report: &DuplicateReport) -> bool;
}

/// Acepta siempre (modo no interactivo)
pub struct AcceptDuplicates;

impl DuplicateCheckpoint for AcceptDuplicates {
    fn confirm(&mut self, _report: &DuplicateReport) -> bool {
        true
    }
}

/// Rechaza siempre
pub struct RejectDuplicates;

impl DuplicateCheckpoint for RejectDuplicates {
    fn confirm(&mut self, _report: &DuplicateReport) -> bool {
        false
    }
}

/// RUT limpio: mayúsculas, sólo dígitos y K. `"12.345.678-k"` → `"12345678K"`
pub fn clean_identity(value: &str) -> String {
    value
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'K')
        .collect()
}

fn header_key(header: &str) -> String {
    header
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Primera columna cuyo nombre coincide con un candidato de identidad
pub fn find_identity_column(header: &[String], config: &DistributionConfig) -> Option<usize> {
    let candidates: Vec<String> = config
        .identity_column_candidates
        .iter()
        .map(|c| header_key(c))
        .collect();
    header
        .iter()
        .position(|h| candidates.contains(&header_key(h)))
}

/// Identidades presentes en todas las hojas de datos del libro.
///
/// Excluye la fuente reservada, las hojas de sistema y `import_partition`
/// (la hoja desde la que se está importando, si la importación viene del libro).
pub fn build_identity_index<S: TabularStore + ?Sized>(
    store: &S,
    import_partition: Option<&str>,
    config: &DistributionConfig,
) -> Result<HashSet<String>> {
    let mut index = HashSet::new();

    for info in store.list_partitions()? {
        if info.name == config.source_partition
            || Some(info.name.as_str()) == import_partition
            || config.is_system_partition(&info.name)
        {
            continue;
        }
        if info.row_count < 2 {
            continue;
        }

        let header = store.get_header(&info.name)?;
        let Some(column) = find_identity_column(&header, config) else {
            debug!(partition = %info.name, "hoja sin columna de identidad, se omite");
            continue;
        };

        let before = index.len();
        for row in store.data_rows(&info.name)? {
            if let Some(cell) = row.get(column) {
                let cleaned = clean_identity(&cell.display());
                if !cleaned.is_empty() {
                    index.insert(cleaned);
                }
            }
        }
        debug!(partition = %info.name, added = index.len() - before, "identidades indexadas");
    }

    Ok(index)
}

/// Quita los registros cuya identidad ya existe en el libro o apareció antes en
/// la misma importación (gana la primera aparición por número de fila).
pub fn resolve_duplicates<S: TabularStore + ?Sized>(
    store: &S,
    import_partition: Option<&str>,
    header: &[String],
    grouped: GroupedRecords,
    config: &DistributionConfig,
) -> Result<DuplicateReport> {
    let Some(identity_column) = find_identity_column(header, config) else {
        warn!("la importación no tiene columna de identidad; no se depuran duplicados");
        return Ok(DuplicateReport {
            buckets: grouped.buckets,
            ..DuplicateReport::default()
        });
    };

    let mut index = build_identity_index(store, import_partition, config)?;
    info!(identities = index.len(), "índice de identidades construido");

    // Orden original de filas, sin importar el ejecutivo destino
    let mut order: Vec<(usize, usize, usize)> = grouped
        .buckets
        .values()
        .enumerate()
        .flat_map(|(bucket, records)| {
            records
                .iter()
                .enumerate()
                .map(move |(pos, r)| (r.row_number, bucket, pos))
        })
        .collect();
    order.sort_unstable();

    let mut dropped: HashSet<(usize, usize)> = HashSet::new();
    let mut ledger = Vec::new();

    for (_, bucket, pos) in order {
        let Some((key, records)) = grouped.buckets.get_index(bucket) else {
            continue;
        };
        let record = &records[pos];
        let identity = record
            .get(identity_column)
            .map(|c| clean_identity(&c.display()))
            .unwrap_or_default();
        if identity.is_empty() {
            continue;
        }

        if !index.insert(identity.clone()) {
            ledger.push(format!("{}: {} {}", key, config.identity_label, identity));
            dropped.insert((bucket, pos));
        }
    }

    let removed = dropped.len();
    let buckets: IndexMap<AgentKey, Vec<RawRecord>> = grouped
        .buckets
        .into_iter()
        .enumerate()
        .filter_map(|(bucket, (key, records))| {
            let kept: Vec<RawRecord> = records
                .into_iter()
                .enumerate()
                .filter(|(pos, _)| !dropped.contains(&(bucket, *pos)))
                .map(|(_, r)| r)
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some((key, kept))
            }
        })
        .collect();

    if removed > 0 {
        warn!(removed, "registros duplicados descartados");
    }

    Ok(DuplicateReport {
        buckets,
        removed,
        ledger,
        identity_column: Some(identity_column),
    })
}
