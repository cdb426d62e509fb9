//! Errores de la distribución y de los adaptadores del libro.

use thiserror::Error;

use crate::config::ConfigError;

/// Fallas del libro (almacenamiento tabular)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("La hoja '{0}' no existe")]
    PartitionNotFound(String),

    #[error("La hoja '{0}' ya existe")]
    PartitionExists(String),

    #[error("Nombre de hoja inválido: '{0}'")]
    InvalidName(String),

    #[error("Rango inválido en '{partition}': {reason}")]
    InvalidRange { partition: String, reason: String },

    #[error("Escritura rechazada en '{0}'")]
    WriteRejected(String),

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Manifiesto del libro inválido: {0}")]
    Manifest(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("No se pudo acceder a la fuente '{source_name}': {reason}")]
    Access { source_name: String, reason: String },

    #[error("Formato inválido en '{source_name}': {reason}")]
    Format { source_name: String, reason: String },

    #[error("No se encontró la columna {expected} en el encabezado")]
    ColumnNotFound { expected: String },

    #[error("Importación cancelada: {removed} registros duplicados no confirmados")]
    ImportCancelled { removed: usize },

    #[error("Error escribiendo la hoja '{partition}': {source}")]
    PartitionWrite {
        partition: String,
        #[source]
        source: StoreError,
    },

    #[error("La fórmula de consolidación en '{partition}' devolvió error: {detail}")]
    ConsolidationFormula { partition: String, detail: String },

    #[error("No hay hojas de ejecutivos para consolidar")]
    NoAgentPartitions,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DistributionError {
    /// Sugerencia para el usuario junto al mensaje de error
    pub fn remedy(&self) -> &'static str {
        match self {
            DistributionError::Access { .. } => {
                "Verifique la ruta del archivo o los permisos de la hoja de origen"
            }
            DistributionError::Format { .. } => {
                "La fuente debe ser una tabla con encabezado en la fila 1 y al menos una fila de datos"
            }
            DistributionError::ColumnNotFound { .. } => {
                "Agregue una columna EJECUTIVO/AGENTE/VENDEDOR con el responsable de cada registro"
            }
            DistributionError::ImportCancelled { .. } => {
                "Revise los duplicados informados y vuelva a ejecutar la importación"
            }
            DistributionError::PartitionWrite { .. } => {
                "Vuelva a ejecutar la distribución; las hojas ya creadas se completarán"
            }
            DistributionError::ConsolidationFormula { .. } => {
                "Ejecute 'consolidar' nuevamente; revise que ninguna hoja de ejecutivo haya sido renombrada"
            }
            DistributionError::NoAgentPartitions => {
                "Distribuya la cartera antes de consolidar"
            }
            DistributionError::Config(_) => "Corrija el archivo de configuración",
            DistributionError::Store(_) => "Verifique que el libro no esté dañado ni abierto en otro proceso",
        }
    }
}

pub type Result<T> = std::result::Result<T, DistributionError>;
