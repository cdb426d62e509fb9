use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Variable de entorno con directivas de filtrado (sintaxis de `EnvFilter`)
pub const LOG_ENV: &str = "CARTERA_LOG";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Nivel mínimo si `CARTERA_LOG` no está definida
    pub level: Level,
    /// Incluye archivo y línea en cada evento
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::WARN,
            file_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            ..Default::default()
        }
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }
}

/// Instala el suscriptor global. Los eventos van a stderr para no mezclarse
/// con la salida de los comandos. Llamarlo dos veces no falla.
pub fn init(config: LoggingConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_ascii_lowercase()));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    if subscriber.try_init().is_err() {
        tracing::debug!("el suscriptor de logs ya estaba instalado");
    }
}

/// `"debug"`, `"INFO"`, ... → nivel
pub fn parse_log_level(level: &str) -> Option<Level> {
    Level::from_str(level.trim()).ok()
}
