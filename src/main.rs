use std::env;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use tracing::{info, Level};

use cartera_tools::commands::calls::build_call_pivot;
use cartera_tools::commands::consolidate::consolidate;
use cartera_tools::commands::date_ops::parse_flexible_date;
use cartera_tools::commands::duplicates::{AcceptDuplicates, DuplicateCheckpoint, DuplicateReport};
use cartera_tools::commands::field_events::apply_field_change;
use cartera_tools::commands::productivity::build_productivity;
use cartera_tools::commands::reset::reset_partitions;
use cartera_tools::commands::summary::build_status_summary;
use cartera_tools::commands::taxonomy::{classify, reorder_partitions};
use cartera_tools::file_utils::format_bytes;
use cartera_tools::identity::{EnvIdentity, IdentityProvider};
use cartera_tools::logging::{self, LoggingConfig};
use cartera_tools::models::find_column;
use cartera_tools::progress::{ConsoleProgress, ProgressReporter};
use cartera_tools::{
    run_import, CsvWorkbook, DistributionConfig, DistributionError, ImportOptions, ImportSource,
    TabularStore,
};

/// Archivo de configuración que se busca dentro del libro si no se indica `--config`
const DEFAULT_CONFIG_FILE: &str = "cartera.toml";

/// Argumentos posicionales y banderas de la línea de comandos
struct CliArgs {
    positional: Vec<String>,
    yes: bool,
    fresh: bool,
    verbose: bool,
    log_level: Option<Level>,
    config: Option<PathBuf>,
    csv: Option<PathBuf>,
    today: Option<String>,
}

impl CliArgs {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = CliArgs {
            positional: Vec::new(),
            yes: false,
            fresh: false,
            verbose: false,
            log_level: None,
            config: None,
            csv: None,
            today: None,
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--si" | "-y" => parsed.yes = true,
                "--reiniciar" => parsed.fresh = true,
                "--verbose" | "-v" => parsed.verbose = true,
                "--log" => {
                    let value = iter.next().ok_or("--log requiere un nivel")?;
                    let level = logging::parse_log_level(value)
                        .ok_or_else(|| format!("nivel de log inválido: {}", value))?;
                    parsed.log_level = Some(level);
                }
                "--config" => {
                    let value = iter.next().ok_or("--config requiere una ruta")?;
                    parsed.config = Some(PathBuf::from(value));
                }
                "--csv" => {
                    let value = iter.next().ok_or("--csv requiere una ruta")?;
                    parsed.csv = Some(PathBuf::from(value));
                }
                "--hoy" => {
                    let value = iter.next().ok_or("--hoy requiere una fecha")?;
                    parsed.today = Some(value.clone());
                }
                flag if flag.starts_with("--") => {
                    return Err(format!("opción desconocida: {}", flag));
                }
                _ => parsed.positional.push(arg.clone()),
            }
        }
        Ok(parsed)
    }

    fn workbook(&self) -> Result<&Path, String> {
        self.positional
            .get(1)
            .map(Path::new)
            .ok_or_else(|| "falta la ruta del libro".to_string())
    }
}

/// Pide confirmación por consola antes de distribuir con duplicados descartados
struct PromptCheckpoint;

impl DuplicateCheckpoint for PromptCheckpoint {
    fn confirm(&mut self, report: &DuplicateReport) -> bool {
        println!();
        println!("⚠️  Se encontraron {} registros duplicados:", report.removed);
        for line in report.ledger.iter().take(20) {
            println!("   - {}", line);
        }
        if report.ledger.len() > 20 {
            println!("   ... y {} más", report.ledger.len() - 20);
        }
        print!("¿Continuar sin ellos? (s/N): ");
        io::stdout().flush().ok();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "s" | "si" | "sí" | "y" | "yes")
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match CliArgs::parse(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("❌ Error: {}", message);
            help();
            process::exit(2);
        }
    };

    let log_config = match (cli.verbose, cli.log_level) {
        (true, _) => LoggingConfig::new(Level::DEBUG).with_file_info(),
        (false, Some(level)) => LoggingConfig::new(level),
        (false, None) => LoggingConfig::default(),
    };
    logging::init(log_config);

    let Some(command) = cli.positional.first().cloned() else {
        help();
        return;
    };

    let user = EnvIdentity::new().current_user_email();
    info!(command = %command, user = user.as_deref().unwrap_or("desconocido"), "comando iniciado");

    if let Err(e) = run(&command, &cli) {
        match e {
            CliError::Usage(message) => {
                eprintln!("❌ Error: {}", message);
                eprintln!("Usage: cartera_tools help");
                process::exit(2);
            }
            CliError::Distribution(e) => {
                eprintln!("❌ Error: {}", e);
                eprintln!("💡 {}", e.remedy());
                process::exit(1);
            }
        }
    }
}

enum CliError {
    Usage(String),
    Distribution(DistributionError),
}

impl From<DistributionError> for CliError {
    fn from(e: DistributionError) -> Self {
        CliError::Distribution(e)
    }
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        CliError::Usage(message)
    }
}

impl From<cartera_tools::StoreError> for CliError {
    fn from(e: cartera_tools::StoreError) -> Self {
        CliError::Distribution(e.into())
    }
}

fn load_config(cli: &CliArgs, workbook: &Path) -> Result<DistributionConfig, DistributionError> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => {
            let candidate = workbook.join(DEFAULT_CONFIG_FILE);
            if !candidate.exists() {
                return Ok(DistributionConfig::default());
            }
            candidate
        }
    };
    println!("⚙️  Configuración: {}", path.display());
    Ok(DistributionConfig::from_path(&path)?)
}

fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  {:<60}║", title);
    println!("╚══════════════════════════════════════════════════════════════╝");
}

fn run(command: &str, cli: &CliArgs) -> Result<(), CliError> {
    match command {
        "distribuir" => {
            let workbook_path = cli.workbook()?;
            let config = load_config(cli, workbook_path)?;
            let mut workbook = CsvWorkbook::open(workbook_path)?;

            let source = match &cli.csv {
                Some(path) => ImportSource::CsvFile(path.clone()),
                None => ImportSource::Partition(config.source_partition.clone()),
            };

            banner("Distribución de cartera por ejecutivo");
            println!("📄 Fuente: {}", source);
            println!("📁 Libro:  {}", workbook_path.display());
            if cli.fresh {
                println!("🧹 Carga desde cero: se borrarán las hojas no protegidas");
            }
            println!();

            let start = Instant::now();
            let mut console = ConsoleProgress::new();
            let mut reporter =
                ProgressReporter::new(&mut console, Duration::from_secs(config.progress_ttl_secs));
            let mut accept = AcceptDuplicates;
            let mut prompt = PromptCheckpoint;
            let checkpoint: &mut dyn DuplicateCheckpoint = if cli.yes { &mut accept } else { &mut prompt };

            let report = run_import(
                &mut workbook,
                &source,
                ImportOptions { fresh_load: cli.fresh },
                checkpoint,
                &mut reporter,
                &config,
            )?;

            println!();
            println!("✅ Distribución completada en {:.2}s", start.elapsed().as_secs_f64());
            println!("📊 Filas leídas:          {}", report.read_rows);
            println!("👥 Ejecutivos:            {}", report.agents);
            println!("🆕 Hojas creadas:         {}", report.distribution.created);
            println!("➕ Hojas actualizadas:    {}", report.distribution.appended);
            println!("📦 Registros distribuidos: {}", report.distribution.distributed);
            if report.blank_rows > 0 {
                println!("⬜ Filas vacías omitidas: {}", report.blank_rows);
            }
            if !report.unassigned_rows.is_empty() {
                println!("❓ Filas sin ejecutivo:   {:?}", report.unassigned_rows);
            }
            if report.duplicates_removed > 0 {
                println!("🔁 Duplicados descartados: {}", report.duplicates_removed);
            }
            for failure in report.distribution.failures.iter().chain(&report.views.errors) {
                println!("❌ {}", failure);
            }
            println!();
            println!("📋 {}", report.summary_line());
        }
        "consolidar" => {
            let workbook_path = cli.workbook()?;
            let config = load_config(cli, workbook_path)?;
            let mut workbook = CsvWorkbook::open(workbook_path)?;
            banner("Consolidación de BBDD_REPORTE");
            let report = consolidate(&mut workbook, &config)?;
            println!("✅ {} filas de {} hojas", report.rows, report.sources.len());
            for source in &report.sources {
                println!("   - {}", source);
            }
            println!("🧮 {}", report.formula);
        }
        "resumen" => {
            let workbook_path = cli.workbook()?;
            let config = load_config(cli, workbook_path)?;
            let mut workbook = CsvWorkbook::open(workbook_path)?;
            let summary = build_status_summary(&mut workbook, &config)?;
            println!("✅ RESUMEN: {} registros", summary.total);
            for (label, count) in &summary.tallies {
                println!("   {:<24} {:>6}", label, count);
            }
            if !summary.invalid_agents.is_empty() {
                println!("⚠️  Ejecutivos con combinaciones inválidas: {}", summary.invalid_agents.join(", "));
            }
        }
        "llamadas" => {
            let workbook_path = cli.workbook()?;
            let config = load_config(cli, workbook_path)?;
            let mut workbook = CsvWorkbook::open(workbook_path)?;
            let pivot = build_call_pivot(&mut workbook, &config)?;
            println!(
                "✅ LLAMADAS: {} ejecutivos × {} fechas, {} llamadas",
                pivot.agents.len(),
                pivot.dates.len(),
                pivot.grand_total()
            );
        }
        "productividad" => {
            let workbook_path = cli.workbook()?;
            let config = load_config(cli, workbook_path)?;
            let mut workbook = CsvWorkbook::open(workbook_path)?;
            let report = build_productivity(&mut workbook, &config)?;
            println!("✅ PRODUCTIVIDAD");
            for m in &report.agent_metrics {
                println!(
                    "   {:<24} gestionados {:>5} | avance {:>5.1}% | efectividad {:>5.1}%",
                    m.key,
                    m.managed,
                    m.progress * 100.0,
                    m.performance * 100.0
                );
            }
            if let Some(column) = &report.location_column {
                println!("📍 Tablas por {} incluidas ({} ubicaciones)", column, report.by_location.len());
            }
        }
        "ordenar" => {
            let workbook_path = cli.workbook()?;
            let config = load_config(cli, workbook_path)?;
            let mut workbook = CsvWorkbook::open(workbook_path)?;
            let order = reorder_partitions(&mut workbook, &config)?;
            println!("✅ Hojas ordenadas:");
            for (i, name) in order.iter().enumerate() {
                println!("   {:>3}. {}", i + 1, name);
            }
        }
        "reiniciar" => {
            let workbook_path = cli.workbook()?;
            let config = load_config(cli, workbook_path)?;
            let mut workbook = CsvWorkbook::open(workbook_path)?;
            if !cli.yes {
                print!("⚠️  Se borrarán todas las hojas no protegidas. ¿Continuar? (s/N): ");
                io::stdout().flush().ok();
                let mut answer = String::new();
                io::stdin().lock().read_line(&mut answer).ok();
                if !matches!(answer.trim().to_lowercase().as_str(), "s" | "si" | "sí") {
                    println!("Cancelado.");
                    return Ok(());
                }
            }
            let report = reset_partitions(&mut workbook, &config)?;
            println!("🧹 {} hojas borradas, {} protegidas", report.deleted.len(), report.kept.len());
        }
        "listar" => {
            let workbook_path = cli.workbook()?;
            let config = load_config(cli, workbook_path)?;
            let workbook = CsvWorkbook::open(workbook_path)?;
            let active = workbook.active_partition();
            println!("📁 {}", workbook.path().display());
            for info in workbook.list_partitions()? {
                let header = workbook.get_header(&info.name)?;
                let kind = classify(&info, &header, &config);
                let size = std::fs::metadata(workbook.path().join(format!("{}.csv", info.name)))
                    .map(|m| format_bytes(m.len()))
                    .unwrap_or_default();
                let marker = if active.as_deref() == Some(info.name.as_str()) { "▶" } else { " " };
                println!(
                    " {} {:<28} {:>7} filas {:>4} cols  {:<16} {}",
                    marker,
                    info.name,
                    info.data_rows(),
                    info.col_count,
                    format!("{:?}", kind),
                    size
                );
            }
        }
        "estado_compromiso" => {
            let workbook_path = cli.workbook()?;
            let partition = cli
                .positional
                .get(2)
                .ok_or_else(|| "Usage: cartera_tools estado_compromiso <libro> <hoja> [fila]".to_string())?;
            let config = load_config(cli, workbook_path)?;
            let mut workbook = CsvWorkbook::open(workbook_path)?;

            let today = match &cli.today {
                Some(raw) => parse_flexible_date(raw).ok_or_else(|| format!("fecha inválida: {}", raw))?,
                None => Local::now().date_naive(),
            };
            let header = workbook.get_header(partition)?;
            let column = find_column(&header, &config.columns.commitment_date)
                .ok_or_else(|| format!("la hoja {} no tiene {}", partition, config.columns.commitment_date))?;

            let rows: Vec<usize> = match cli.positional.get(3) {
                Some(raw) => match raw.parse::<usize>() {
                    Ok(n) if n >= 2 => vec![n],
                    _ => return Err(CliError::Usage("la fila debe ser un entero >= 2".to_string())),
                },
                None => (2..=workbook.partition_info(partition)?.row_count).collect(),
            };

            let updated = update_commitments(&mut workbook, partition, &rows, column, today, &config)?;
            println!("✅ {} filas actualizadas en {} (hoy = {})", updated, partition, today.format("%d/%m/%Y"));
        }
        "version" => {
            println!("cartera_tools v{}", env!("CARTERA_TOOLS_VERSION"));
            println!("  Build: {}", env!("BUILD_DATE"));
            println!("  Target: {}", env!("TARGET"));
        }
        "help" => help(),
        _ => {
            eprintln!("Unknown command: {}", command);
            help();
        }
    }
    Ok(())
}

fn update_commitments(
    workbook: &mut CsvWorkbook,
    partition: &str,
    rows: &[usize],
    column: usize,
    today: NaiveDate,
    config: &DistributionConfig,
) -> Result<usize, DistributionError> {
    let mut updated = 0;
    for &row in rows {
        if apply_field_change(workbook, partition, row, column, today, config)?.is_some() {
            updated += 1;
        }
    }
    Ok(updated)
}

fn help() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Cartera Tools - Distribución y reportes de call center      ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("Comandos:");
    println!("  distribuir <libro> [--csv base.csv] [--si] [--reiniciar]");
    println!("    Reparte la base por ejecutivo y reconstruye todas las vistas");
    println!("    - Sin --csv lee la hoja BBDD del libro");
    println!("    - --si acepta los duplicados sin preguntar");
    println!("    - --reiniciar borra las hojas no protegidas antes de cargar");
    println!();
    println!("  consolidar <libro>       Reconstruye BBDD_REPORTE");
    println!("  resumen <libro>          Reconstruye RESUMEN");
    println!("  llamadas <libro>         Reconstruye LLAMADAS");
    println!("  productividad <libro>    Reconstruye PRODUCTIVIDAD");
    println!("  ordenar <libro>          Ordena las hojas del libro");
    println!("  reiniciar <libro> [--si] Borra las hojas no protegidas");
    println!("  listar <libro>           Lista las hojas con su clasificación");
    println!();
    println!("  estado_compromiso <libro> <hoja> [fila] [--hoy dd/mm/aaaa]");
    println!("    Recalcula ESTADO_COMPROMISO (todas las filas si no se indica una)");
    println!();
    println!("  version                  Muestra versión y fecha de compilación");
    println!();
    println!("Opciones generales:");
    println!("  --config <archivo.toml>  Configuración (por defecto <libro>/cartera.toml)");
    println!("  --verbose                Logs detallados (o CARTERA_LOG=debug)");
    println!("  --log <nivel>            error, warn, info, debug o trace");
    println!();
    println!("EXAMPLES:");
    println!("  cartera_tools distribuir ./libro --csv cartera_marzo.csv");
    println!("  cartera_tools distribuir ./libro --reiniciar --si");
    println!("  cartera_tools estado_compromiso ./libro Ana_Diaz --hoy 10/03/2025");
}
