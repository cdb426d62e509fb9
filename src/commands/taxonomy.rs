use tracing::{debug, info};

use crate::config::DistributionConfig;
use crate::error::Result;
use crate::models::PartitionInfo;
use crate::store::TabularStore;

/// Clase de una hoja del libro. Se recalcula en cada corrida.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    /// BBDD o una base remota mantenida a mano
    Source,
    /// Posición en la lista fija de hojas de gestión
    Management(usize),
    Report,
    Agent,
    Other,
}

impl PartitionKind {
    fn rank(self) -> usize {
        match self {
            PartitionKind::Source => 0,
            PartitionKind::Management(_) => 1,
            PartitionKind::Report => 2,
            PartitionKind::Agent => 3,
            PartitionKind::Other => 4,
        }
    }
}

pub fn classify(info: &PartitionInfo, header: &[String], config: &DistributionConfig) -> PartitionKind {
    if config.is_source(&info.name) {
        return PartitionKind::Source;
    }
    if let Some(index) = config
        .management_partitions
        .iter()
        .position(|m| *m == info.name)
    {
        return PartitionKind::Management(index);
    }
    if info.name == config.report_partition {
        return PartitionKind::Report;
    }

    let matches = config
        .taxonomy_signature
        .iter()
        .filter(|sig| header.iter().any(|h| h.trim().eq_ignore_ascii_case(sig)))
        .count();
    if matches >= config.taxonomy_min_matches {
        PartitionKind::Agent
    } else {
        PartitionKind::Other
    }
}

/// Orden canónico: remotas, gestión (orden fijo), reporte, ejecutivos (alfabético), resto (orden actual)
pub fn canonical_order(classified: &[(String, PartitionKind)]) -> Vec<String> {
    let mut indexed: Vec<(usize, &(String, PartitionKind))> = classified.iter().enumerate().collect();
    indexed.sort_by(|(ia, (name_a, kind_a)), (ib, (name_b, kind_b))| {
        kind_a
            .rank()
            .cmp(&kind_b.rank())
            .then_with(|| match (kind_a, kind_b) {
                (PartitionKind::Management(a), PartitionKind::Management(b)) => a.cmp(b),
                (PartitionKind::Agent, PartitionKind::Agent) => {
                    name_a.to_lowercase().cmp(&name_b.to_lowercase())
                }
                _ => ia.cmp(ib),
            })
    });
    indexed.into_iter().map(|(_, (name, _))| name.clone()).collect()
}

/// Reordena el libro y deja activa la hoja que estaba primera
pub fn reorder_partitions<S: TabularStore + ?Sized>(
    store: &mut S,
    config: &DistributionConfig,
) -> Result<Vec<String>> {
    let partitions = store.list_partitions()?;
    let Some(first) = partitions.first().map(|p| p.name.clone()) else {
        return Ok(Vec::new());
    };

    let mut classified = Vec::with_capacity(partitions.len());
    for info in &partitions {
        let header = store.get_header(&info.name)?;
        let kind = classify(info, &header, config);
        debug!(partition = %info.name, ?kind, "hoja clasificada");
        classified.push((info.name.clone(), kind));
    }

    let order = canonical_order(&classified);
    for (position, name) in order.iter().enumerate() {
        store.reorder_partition(name, position)?;
    }
    store.set_active_partition(&first)?;

    info!(partitions = order.len(), "hojas reordenadas");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn info(name: &str) -> PartitionInfo {
        PartitionInfo {
            name: name.to_string(),
            row_count: 2,
            col_count: 4,
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classifies_by_name_then_signature() {
        let config = DistributionConfig::default();
        let agent_header = strings(&["RUT", "FECHA_LLAMADA", "ESTADO"]);
        assert_eq!(classify(&info("BBDD_REMOTA_2024"), &[], &config), PartitionKind::Source);
        assert_eq!(classify(&info("BBDD"), &agent_header, &config), PartitionKind::Source);
        assert_eq!(classify(&info("LLAMADAS"), &[], &config), PartitionKind::Management(1));
        assert_eq!(classify(&info("BBDD_REPORTE"), &agent_header, &config), PartitionKind::Report);
        assert_eq!(classify(&info("Ana_Diaz"), &agent_header, &config), PartitionKind::Agent);
        // Una sola columna de firma no alcanza
        assert_eq!(
            classify(&info("Notas"), &strings(&["ESTADO"]), &config),
            PartitionKind::Other
        );
    }

    #[test]
    fn canonical_order_groups_and_sorts() {
        let classified = vec![
            ("Zeta".to_string(), PartitionKind::Agent),
            ("Notas".to_string(), PartitionKind::Other),
            ("PRODUCTIVIDAD".to_string(), PartitionKind::Management(2)),
            ("BBDD_REPORTE".to_string(), PartitionKind::Report),
            ("ana_diaz".to_string(), PartitionKind::Agent),
            ("Extra".to_string(), PartitionKind::Other),
            ("RESUMEN".to_string(), PartitionKind::Management(0)),
            ("BBDD_REMOTA".to_string(), PartitionKind::Source),
        ];
        assert_eq!(
            canonical_order(&classified),
            vec![
                "BBDD_REMOTA",
                "RESUMEN",
                "PRODUCTIVIDAD",
                "BBDD_REPORTE",
                "ana_diaz",
                "Zeta",
                "Notas",
                "Extra"
            ]
        );
    }

    #[test]
    fn reorder_keeps_first_partition_active() {
        let config = DistributionConfig::default();
        let mut store = MemoryStore::new();
        let agent = strings(&["RUT", "ESTADO", "SUB_ESTADO"]);
        store.create_partition("Luis_Soto", &agent).unwrap();
        store.create_partition("RESUMEN", &[]).unwrap();
        store.create_partition("Ana_Diaz", &agent).unwrap();
        store.set_active_partition("Ana_Diaz").unwrap();

        let order = reorder_partitions(&mut store, &config).unwrap();
        assert_eq!(order, vec!["RESUMEN", "Ana_Diaz", "Luis_Soto"]);
        assert_eq!(store.active_partition().as_deref(), Some("Luis_Soto"));
    }
}
