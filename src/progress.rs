use std::collections::HashMap;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Clave de caché que consulta la UI de progreso
pub const PROGRESS_KEY: &str = "progreso_importacion";

/// Etapas fijas de la importación
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Validate,
    Read,
    Group,
    Dedupe,
    Distribute,
    Consolidate,
    Summary,
    Calls,
    Productivity,
    Reorder,
    Done,
}

impl Stage {
    pub fn id(self) -> u8 {
        match self {
            Stage::Validate => 0,
            Stage::Read => 1,
            Stage::Group => 2,
            Stage::Dedupe => 3,
            Stage::Distribute => 4,
            Stage::Consolidate => 5,
            Stage::Summary => 6,
            Stage::Calls => 7,
            Stage::Productivity => 8,
            Stage::Reorder => 9,
            Stage::Done => 10,
        }
    }

    /// Porcentaje al iniciar la etapa
    pub fn percent(self) -> u8 {
        match self {
            Stage::Validate => 0,
            Stage::Read => 10,
            Stage::Group => 30,
            Stage::Dedupe => 40,
            Stage::Distribute => 50,
            Stage::Consolidate => 75,
            Stage::Summary => 85,
            Stage::Calls => 89,
            Stage::Productivity => 93,
            Stage::Reorder => 96,
            Stage::Done => 100,
        }
    }
}

/// Entrada que se publica en la caché en cada etapa
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStage {
    pub stage: u8,
    pub message: String,
    pub percent: u8,
    pub current: usize,
    pub total: usize,
}

/// Caché clave-valor con expiración (la UI de progreso la consulta)
pub trait ProgressSink {
    fn put(&mut self, key: &str, value: &str, ttl: Duration);
}

/// Caché en memoria con TTL
#[derive(Debug, Default)]
pub struct MemoryProgressCache {
    entries: HashMap<String, (String, Instant)>,
}

impl MemoryProgressCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valor vigente, `None` si no existe o ya expiró
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .filter(|(_, expires)| Instant::now() < *expires)
            .map(|(value, _)| value.as_str())
    }

    pub fn current_stage(&self) -> Option<ProgressStage> {
        self.get(PROGRESS_KEY)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

impl ProgressSink for MemoryProgressCache {
    fn put(&mut self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }
}

/// Muestra el avance en consola, una línea que se reescribe
pub struct ConsoleProgress {
    start_time: Instant,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn put(&mut self, _key: &str, value: &str, _ttl: Duration) {
        let Ok(stage) = serde_json::from_str::<ProgressStage>(value) else {
            return;
        };
        let elapsed = self.start_time.elapsed().as_secs_f64();

        if stage.total > 0 {
            print!(
                "\r📊 [{:>3}%] {} ({}/{}) | Tiempo: {:.1}s          ",
                stage.percent, stage.message, stage.current, stage.total, elapsed
            );
        } else {
            print!(
                "\r📊 [{:>3}%] {} | Tiempo: {:.1}s          ",
                stage.percent, stage.message, elapsed
            );
        }
        if stage.percent >= 100 {
            println!();
        }
        io::stdout().flush().ok();
    }
}

/// Descarta el progreso
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn put(&mut self, _key: &str, _value: &str, _ttl: Duration) {}
}

/// Publica etapas de avance sobrescribiendo una única entrada de caché
pub struct ProgressReporter<'a> {
    sink: &'a mut dyn ProgressSink,
    ttl: Duration,
    last: Option<ProgressStage>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink, ttl: Duration) -> Self {
        Self {
            sink,
            ttl,
            last: None,
        }
    }

    pub fn report_stage(
        &mut self,
        stage_id: u8,
        message: &str,
        percent: u8,
        current: usize,
        total: usize,
    ) {
        let entry = ProgressStage {
            stage: stage_id,
            message: message.to_string(),
            percent: percent.min(100),
            current,
            total,
        };
        debug!(stage = entry.stage, percent = entry.percent, "{}", entry.message);
        if let Ok(json) = serde_json::to_string(&entry) {
            self.sink.put(PROGRESS_KEY, &json, self.ttl);
        }
        self.last = Some(entry);
    }

    pub fn report(&mut self, stage: Stage, message: &str) {
        self.report_stage(stage.id(), message, stage.percent(), 0, 0);
    }

    /// Avance dentro de la distribución: interpola entre 50% y 75%
    pub fn report_distribution(&mut self, message: &str, current: usize, total: usize) {
        let start = Stage::Distribute.percent() as usize;
        let end = Stage::Consolidate.percent() as usize;
        let percent = if total == 0 {
            start
        } else {
            start + (end - start) * current.min(total) / total
        };
        self.report_stage(Stage::Distribute.id(), message, percent as u8, current, total);
    }

    pub fn last(&self) -> Option<&ProgressStage> {
        self.last.as_ref()
    }
}
