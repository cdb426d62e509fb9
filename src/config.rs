//! Esquema de distribución: listas fijas, columnas de gestión y parámetros de reportes.
//!
//! Se construye una vez (por defecto o desde TOML) y se inyecta en cada componente.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::models::Cell;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No se pudo leer el archivo de configuración: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML de configuración inválido: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Valor inválido para {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Nombres de las columnas de gestión con significado propio
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnNames {
    pub propensity: String,
    pub call_date: String,
    pub commitment_date: String,
    pub status: String,
    pub sub_status: String,
    pub agent_note: String,
    pub sale_origin: String,
    pub commitment_status: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            propensity: "Propension".into(),
            call_date: "FECHA_LLAMADA".into(),
            commitment_date: "FECHA_COMPROMISO".into(),
            status: "ESTADO".into(),
            sub_status: "SUB_ESTADO".into(),
            agent_note: "NOTA_EJECUTIVO".into(),
            sale_origin: "ORIGEN_VENTA".into(),
            commitment_status: "ESTADO_COMPROMISO".into(),
        }
    }
}

/// Sub-estados permitidos para un estado
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StatusRule {
    pub status: String,
    pub sub_statuses: Vec<String>,
}

impl StatusRule {
    fn new(status: &str, subs: &[&str]) -> Self {
        Self {
            status: status.to_string(),
            sub_statuses: subs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistributionConfig {
    /// Hoja reservada con la base cruda a distribuir
    pub source_partition: String,
    pub report_partition: String,
    pub summary_partition: String,
    pub calls_partition: String,
    pub productivity_partition: String,
    /// Hojas "remotas" mantenidas a mano cuyo encabezado se usa como plantilla
    pub remote_source_pattern: String,
    /// Hojas de gestión en su orden canónico
    pub management_partitions: Vec<String>,
    /// Hojas que nunca se eliminan al reiniciar
    pub protected_partitions: Vec<String>,

    pub columns: ColumnNames,
    pub extension_columns: Vec<String>,
    pub agent_column_tokens: Vec<String>,
    pub identity_column_candidates: Vec<String>,
    pub identity_label: String,

    pub statuses: Vec<String>,
    pub sub_statuses: Vec<String>,
    pub default_status: String,
    pub default_sub_status: String,
    pub valid_combinations: Vec<StatusRule>,
    pub closed_status: String,
    pub in_progress_status: String,
    pub in_progress_sub_status: String,
    pub contacted_statuses: Vec<String>,
    pub interested_statuses: Vec<String>,

    /// Etiquetas del RESUMEN en orden
    pub summary_labels: Vec<String>,
    pub sales_label: String,
    pub in_progress_label: String,

    /// Columnas que delatan una hoja de ejecutivo al consolidar (basta una)
    pub consolidation_signature: Vec<String>,
    /// Columnas para clasificar hojas de ejecutivo al ordenar
    pub taxonomy_signature: Vec<String>,
    pub taxonomy_min_matches: usize,

    pub sort_column: usize,
    pub pivot_buffer_columns: usize,
    pub productivity_target: u32,
    pub progress_ttl_secs: u64,
    pub location_pattern: String,

    #[serde(skip)]
    remote_regex: OnceLock<Option<Regex>>,
    #[serde(skip)]
    location_regex: OnceLock<Option<Regex>>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for DistributionConfig {
    fn default() -> Self {
        let columns = ColumnNames::default();
        let extension_columns = vec![
            columns.propensity.clone(),
            columns.call_date.clone(),
            columns.commitment_date.clone(),
            columns.status.clone(),
            columns.sub_status.clone(),
            columns.agent_note.clone(),
            columns.sale_origin.clone(),
            columns.commitment_status.clone(),
        ];
        let consolidation_signature = vec![
            columns.call_date.clone(),
            columns.commitment_status.clone(),
            columns.sub_status.clone(),
            columns.agent_note.clone(),
            columns.status.clone(),
        ];
        let taxonomy_signature = vec![
            columns.call_date.clone(),
            columns.status.clone(),
            columns.sub_status.clone(),
            columns.agent_note.clone(),
        ];

        Self {
            source_partition: "BBDD".into(),
            report_partition: "BBDD_REPORTE".into(),
            summary_partition: "RESUMEN".into(),
            calls_partition: "LLAMADAS".into(),
            productivity_partition: "PRODUCTIVIDAD".into(),
            remote_source_pattern: "(?i)^(BBDD_REMOTA|BASE_REMOTA|REMOTA)".into(),
            management_partitions: strings(&[
                "RESUMEN",
                "LLAMADAS",
                "PRODUCTIVIDAD",
                "DASHBOARD",
                "TOTALES",
                "GRAFICOS",
                "CONFIGURACION",
                "LISTAS",
            ]),
            protected_partitions: strings(&["BBDD", "CONFIGURACION", "LISTAS"]),
            columns,
            extension_columns,
            agent_column_tokens: strings(&[
                "EJECUTIVO",
                "AGENTE",
                "AGENT",
                "VENDEDOR",
                "SELLER",
                "REPRESENTANTE",
            ]),
            identity_column_candidates: strings(&[
                "RUT",
                "RUT_CLIENTE",
                "RUT CLIENTE",
                "RUN",
                "DNI",
                "CEDULA",
                "DOCUMENTO",
            ]),
            identity_label: "RUT".into(),
            statuses: strings(&[
                "Sin Gestión",
                "Contactado",
                "No Contactado",
                "Interesado",
                "No Interesado",
                "Venta Cerrada",
            ]),
            sub_statuses: strings(&[
                "Sin Gestión",
                "En gestión",
                "Volver a llamar",
                "Cotización enviada",
                "Evaluando oferta",
                "No contesta",
                "Buzón de voz",
                "Número equivocado",
                "Sin interés",
                "Ya tiene producto",
                "Precio alto",
                "Venta concretada",
            ]),
            default_status: "Sin Gestión".into(),
            default_sub_status: "Sin Gestión".into(),
            valid_combinations: vec![
                StatusRule::new("Sin Gestión", &["Sin Gestión"]),
                StatusRule::new("Contactado", &["En gestión", "Volver a llamar"]),
                StatusRule::new(
                    "No Contactado",
                    &["No contesta", "Buzón de voz", "Número equivocado"],
                ),
                StatusRule::new(
                    "Interesado",
                    &["Cotización enviada", "Evaluando oferta", "En gestión"],
                ),
                StatusRule::new(
                    "No Interesado",
                    &["Sin interés", "Ya tiene producto", "Precio alto"],
                ),
                StatusRule::new("Venta Cerrada", &["Venta concretada"]),
            ],
            closed_status: "Venta Cerrada".into(),
            in_progress_status: "Contactado".into(),
            in_progress_sub_status: "En gestión".into(),
            contacted_statuses: strings(&[
                "Contactado",
                "Interesado",
                "No Interesado",
                "Venta Cerrada",
            ]),
            interested_statuses: strings(&["Interesado", "Venta Cerrada"]),
            summary_labels: strings(&[
                "Ventas",
                "En gestión",
                "Volver a llamar",
                "Cotización enviada",
                "Evaluando oferta",
                "No contesta",
                "Buzón de voz",
                "Número equivocado",
                "Sin interés",
                "Ya tiene producto",
                "Precio alto",
                "Sin Gestión",
            ]),
            sales_label: "Ventas".into(),
            in_progress_label: "En gestión".into(),
            consolidation_signature,
            taxonomy_signature,
            taxonomy_min_matches: 2,
            sort_column: 2,
            pivot_buffer_columns: 10,
            productivity_target: 100,
            progress_ttl_secs: 600,
            location_pattern:
                "(?i)^(SUCURSAL|CIUDAD|COMUNA|REGI[OÓ]N|ZONA|LOCALIDAD|UBICACI[OÓ]N)$".into(),
            remote_regex: OnceLock::new(),
            location_regex: OnceLock::new(),
        }
    }
}

impl DistributionConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: DistributionConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extension_columns.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "extension_columns",
                reason: "must not be empty".to_string(),
            });
        }
        for (field, name) in [
            ("columns.status", &self.columns.status),
            ("columns.sub_status", &self.columns.sub_status),
            ("columns.call_date", &self.columns.call_date),
            ("columns.commitment_date", &self.columns.commitment_date),
            ("columns.commitment_status", &self.columns.commitment_status),
        ] {
            if !self.extension_columns.iter().any(|c| c == name) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("'{}' must be one of extension_columns", name),
                });
            }
        }
        if !self.statuses.contains(&self.default_status) {
            return Err(ConfigError::InvalidValue {
                field: "default_status",
                reason: format!("'{}' is not in statuses", self.default_status),
            });
        }
        if !self.sub_statuses.contains(&self.default_sub_status) {
            return Err(ConfigError::InvalidValue {
                field: "default_sub_status",
                reason: format!("'{}' is not in sub_statuses", self.default_sub_status),
            });
        }
        if self.agent_column_tokens.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "agent_column_tokens",
                reason: "must not be empty".to_string(),
            });
        }
        if self.pivot_buffer_columns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pivot_buffer_columns",
                reason: "must be > 0".to_string(),
            });
        }
        if let Err(e) = Regex::new(&self.remote_source_pattern) {
            return Err(ConfigError::InvalidValue {
                field: "remote_source_pattern",
                reason: e.to_string(),
            });
        }
        if let Err(e) = Regex::new(&self.location_pattern) {
            return Err(ConfigError::InvalidValue {
                field: "location_pattern",
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Valores iniciales de las columnas de gestión de una fila nueva
    pub fn extension_defaults(&self) -> Vec<Cell> {
        self.extension_columns
            .iter()
            .map(|column| self.extension_default(column))
            .collect()
    }

    /// Valor inicial de una columna por nombre; vacío salvo ESTADO y SUB_ESTADO
    pub fn extension_default(&self, column: &str) -> Cell {
        let column = column.trim();
        if column.eq_ignore_ascii_case(&self.columns.status) {
            Cell::text(self.default_status.clone())
        } else if column.eq_ignore_ascii_case(&self.columns.sub_status) {
            Cell::text(self.default_sub_status.clone())
        } else {
            Cell::Empty
        }
    }

    pub fn is_extension_column(&self, name: &str) -> bool {
        let name = name.trim();
        self.extension_columns.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn is_remote_source(&self, name: &str) -> bool {
        self.remote_regex
            .get_or_init(|| Regex::new(&self.remote_source_pattern).ok())
            .as_ref()
            .is_some_and(|re| re.is_match(name))
    }

    pub fn is_location_column(&self, header: &str) -> bool {
        self.location_regex
            .get_or_init(|| Regex::new(&self.location_pattern).ok())
            .as_ref()
            .is_some_and(|re| re.is_match(header.trim()))
    }

    /// Hoja fuente reservada o remota
    pub fn is_source(&self, name: &str) -> bool {
        name == self.source_partition || self.is_remote_source(name)
    }

    /// Hojas de sistema que nunca contienen datos de un ejecutivo
    pub fn is_system_partition(&self, name: &str) -> bool {
        name == self.report_partition
            || name == self.summary_partition
            || name == self.calls_partition
            || name == self.productivity_partition
            || self.management_partitions.iter().any(|m| m == name)
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.is_source(name) || self.protected_partitions.iter().any(|p| p == name)
    }

    /// ¿El encabezado corresponde a la columna de ejecutivo?
    pub fn is_agent_header(&self, header: &str) -> bool {
        let upper = header.trim().to_uppercase();
        self.agent_column_tokens.iter().any(|t| upper.contains(t.as_str()))
    }

    pub fn is_valid_combination(&self, status: &str, sub_status: &str) -> bool {
        self.valid_combinations
            .iter()
            .find(|rule| rule.status == status)
            .is_some_and(|rule| rule.sub_statuses.iter().any(|s| s == sub_status))
    }
}
