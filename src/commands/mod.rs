pub mod calls;
pub mod consolidate;
pub mod date_ops;
pub mod duplicates;
pub mod field_events;
pub mod grouping;
pub mod pipeline;
pub mod productivity;
pub mod reconcile;
pub mod reset;
pub mod summary;
pub mod taxonomy;

use tracing::debug;

use crate::error::{DistributionError, Result};
use crate::models::Row;
use crate::store::TabularStore;

/// Borra y vuelve a crear una vista derivada con el contenido indicado
pub(crate) fn replace_view<S: TabularStore + ?Sized>(
    store: &mut S,
    name: &str,
    header: &[String],
    rows: &[Row],
) -> Result<()> {
    let write = |store: &mut S| -> crate::error::StoreResult<()> {
        if store.has_partition(name)? {
            store.delete_partition(name)?;
        }
        store.create_partition(name, header)?;
        if !rows.is_empty() {
            store.append_rows(name, rows)?;
        }
        Ok(())
    };

    write(store).map_err(|source| DistributionError::PartitionWrite {
        partition: name.to_string(),
        source,
    })?;
    debug!(partition = name, rows = rows.len(), "vista reescrita");
    Ok(())
}
