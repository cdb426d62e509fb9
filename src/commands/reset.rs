use tracing::{info, warn};

use crate::config::DistributionConfig;
use crate::error::Result;
use crate::store::TabularStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResetReport {
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
}

/// Borra todas las hojas no protegidas antes de una carga inicial desde cero
pub fn reset_partitions<S: TabularStore + ?Sized>(
    store: &mut S,
    config: &DistributionConfig,
) -> Result<ResetReport> {
    let mut report = ResetReport::default();

    for info in store.list_partitions()? {
        if config.is_protected(&info.name) {
            report.kept.push(info.name);
            continue;
        }
        store.delete_partition(&info.name)?;
        report.deleted.push(info.name);
    }

    if report.deleted.is_empty() {
        info!("no había hojas que borrar");
    } else {
        warn!(deleted = report.deleted.len(), kept = report.kept.len(), "libro reiniciado");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn keeps_only_protected_partitions() {
        let config = DistributionConfig::default();
        let mut store = MemoryStore::new();
        for name in ["BBDD", "Ana_Diaz", "BBDD_REMOTA", "RESUMEN", "LISTAS", "BBDD_REPORTE"] {
            store.create_partition(name, &[]).unwrap();
        }

        let report = reset_partitions(&mut store, &config).unwrap();
        assert_eq!(report.deleted, vec!["Ana_Diaz", "RESUMEN", "BBDD_REPORTE"]);
        assert_eq!(report.kept, vec!["BBDD", "BBDD_REMOTA", "LISTAS"]);
        assert_eq!(store.list_partitions().unwrap().len(), 3);
    }
}
