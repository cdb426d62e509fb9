//! Distribución de carteras de clientes por ejecutivo y consolidación de
//! reportes sobre un libro tabular.

pub mod commands;
pub mod config;
pub mod error;
pub mod file_utils;
pub mod formula;
pub mod identity;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod store;

pub use commands::pipeline::{rebuild_views, run_import, ImportOptions, ImportSource, PipelineReport};
pub use config::DistributionConfig;
pub use error::{DistributionError, Result, StoreError};
pub use models::{AgentKey, Cell, ImportBlock, PartitionInfo, RawRecord, Row};
pub use normalize::{match_existing_partition, normalize};
pub use store::{CsvWorkbook, MemoryStore, TabularStore};
