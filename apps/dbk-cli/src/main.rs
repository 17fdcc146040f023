use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::Path;
use tracing::{error, info};

use device_registry as devreg;
use devreg::{
    BackupOptions, BackupRecord, DeviceFamilyDescriptor, DeviceHandle, FamilyRegistry,
    LogNotifier, MetricsHub, ParameterDescriptor, ReadStatus, RestoreOptions, TypeTag, Value,
    Verbosity,
};

mod config;
mod sim;

use config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "dbk",
    version,
    about = "CIP device parameter backup and restore",
    disable_help_subcommand = true
)]
struct Cli {
    /// Config file (created with defaults when missing)
    #[arg(long, default_value = "dbk.json", global = true)]
    config: String,

    /// Per-parameter output
    #[arg(short, long, action = ArgAction::SetTrue, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only the final tally
    #[arg(short, long, action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered device families
    Families,
    /// Resolve Identity Object bytes and show the family they map to
    Identify {
        /// Identity reply as hex (spaces allowed)
        #[arg(long, value_delimiter = ' ', num_args = 1..)]
        hex: Vec<String>,
    },
    /// Decode attribute bytes with a type tag
    Decode {
        /// Type tag literal (e.g. U2, X2.2, O4)
        #[arg(long)]
        tag: String,
        #[arg(long, value_delimiter = ' ', num_args = 1..)]
        hex: Vec<String>,
    },
    /// Encode a value with a type tag
    Encode {
        #[arg(long)]
        tag: String,
        #[arg(long)]
        value: String,
    },
    /// Validate catalog YAML (built-in catalogs when no path is given)
    CatalogValidate {
        #[arg(long, conflicts_with = "dir")]
        file: Option<String>,
        #[arg(long)]
        dir: Option<String>,
        /// Print the report as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Print the catalog document JSON Schema
    #[cfg(feature = "schema")]
    CatalogSchema,
    /// Back up every selected device of a simulated fleet
    Backup {
        /// Fleet YAML (defaults to `simulation` in the config)
        #[arg(long)]
        sim: Option<String>,
        /// Device addresses; all devices when omitted
        #[arg(long)]
        device: Vec<String>,
        /// Output directory (defaults to `output_dir` in the config)
        #[arg(long)]
        out: Option<String>,
        /// Print Prometheus metrics after the run
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Write a backup record to a simulated device
    Restore {
        #[arg(long)]
        sim: Option<String>,
        #[arg(long)]
        device: String,
        /// Backup record file
        #[arg(long)]
        from: String,
        /// Write even if the record is for another model
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    let verbosity = if cli.verbose {
        Verbosity::Verbose
    } else if cli.quiet {
        Verbosity::Quiet
    } else {
        cfg.verbosity
    };

    match cli.command {
        Commands::Families => families(&cfg),
        Commands::Identify { hex } => identify(&cfg, &hex.join("")),
        Commands::Decode { tag, hex } => decode(&tag, &hex.join("")),
        Commands::Encode { tag, value } => encode(&tag, &value),
        Commands::CatalogValidate { file, dir, json } => {
            catalog_validate(file.as_deref(), dir.as_deref(), json)
        }
        #[cfg(feature = "schema")]
        Commands::CatalogSchema => {
            println!("{}", devreg::catalog_schema()?);
            Ok(())
        }
        Commands::Backup {
            sim,
            device,
            out,
            metrics,
        } => {
            let fleet = fleet_path(sim, &cfg)?;
            let out = out.unwrap_or_else(|| cfg.output_dir.clone());
            backup(&cfg, &fleet, &device, Path::new(&out), verbosity, metrics)
        }
        Commands::Restore {
            sim,
            device,
            from,
            force,
            metrics,
        } => {
            let fleet = fleet_path(sim, &cfg)?;
            let opts = RestoreOptions { verbosity, force };
            restore(&cfg, &fleet, &device, Path::new(&from), &opts, metrics)
        }
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn fleet_path(sim: Option<String>, cfg: &Config) -> Result<String> {
    sim.or_else(|| cfg.simulation.clone())
        .ok_or_else(|| anyhow!("no fleet: pass --sim <fleet.yaml> or set simulation in the config"))
}

/// Built-in families plus any catalogs in the configured directory.
fn load_registry(cfg: &Config) -> Result<FamilyRegistry> {
    let mut reg = FamilyRegistry::builtin()?;
    if let Some(dir) = &cfg.catalog_dir {
        let extra = devreg::load_catalogs_dir(dir)?;
        let n = reg.merge(extra).with_context(|| format!("merging catalogs from {dir}"))?;
        info!(dir = %dir, families = n, "extra catalogs loaded");
    }
    Ok(reg)
}

fn hex_arg(s: &str) -> Result<Vec<u8>> {
    devreg::parse_hex(s).ok_or_else(|| anyhow!("invalid hex: {s}"))
}

fn families(cfg: &Config) -> Result<()> {
    let reg = load_registry(cfg)?;
    for f in reg.families() {
        println!(
            "{}/{}\t{}\tvariant={}\tparams={}\trecordable={}",
            f.device_type,
            f.product_code,
            f.name,
            f.variant.label(),
            f.catalog.len(),
            f.catalog.recordable().count()
        );
    }
    Ok(())
}

fn identify(cfg: &Config, hex: &str) -> Result<()> {
    let rec = devreg::resolve(&hex_arg(hex)?)?;
    let reg = load_registry(cfg)?;
    let family = reg.lookup(rec.device_type, rec.product_code);
    let format = family.map(|f| f.serial_format).unwrap_or_default();
    println!("vendor:       {}", rec.vendor_id);
    println!("device type:  {}", rec.device_type);
    println!("product code: {}", rec.product_code);
    println!("revision:     {}", rec.revision);
    println!("status:       0x{:04X}", rec.status);
    println!("serial:       {}", rec.serial_display(format));
    println!("name:         {}", rec.product_name);
    match family {
        Some(f) => println!("family:       {} ({})", f.name, f.variant.label()),
        None => println!("family:       generic"),
    }
    Ok(())
}

fn decode(tag: &str, hex: &str) -> Result<()> {
    let tag = TypeTag::parse(tag)?;
    let v = devreg::decode_value(tag, &hex_arg(hex)?)?;
    println!("{v}");
    Ok(())
}

fn encode(tag: &str, value: &str) -> Result<()> {
    let tag = TypeTag::parse(tag)?;
    let bytes = devreg::encode_value(tag, &Value::Text(value.to_string()))?;
    println!("{}", devreg::to_hex(&bytes));
    Ok(())
}

#[derive(Serialize)]
struct CatalogReport {
    family: String,
    device_type: u16,
    product_code: u16,
    variant: &'static str,
    parameters: usize,
    recordable: usize,
    gaps: usize,
    issues: Vec<CatalogIssue>,
}

#[derive(Serialize)]
struct CatalogIssue {
    ordinal: u32,
    error: String,
}

impl CatalogReport {
    fn new(f: &DeviceFamilyDescriptor) -> Self {
        Self {
            family: f.name.clone(),
            device_type: f.device_type,
            product_code: f.product_code,
            variant: f.variant.label(),
            parameters: f.catalog.len(),
            recordable: f.catalog.recordable().count(),
            gaps: f
                .catalog
                .iter()
                .filter(|p| **p == ParameterDescriptor::reserved(p.ordinal))
                .count(),
            issues: f
                .catalog
                .issues()
                .into_iter()
                .map(|(ordinal, e)| CatalogIssue {
                    ordinal,
                    error: e.to_string(),
                })
                .collect(),
        }
    }
}

fn catalog_validate(file: Option<&str>, dir: Option<&str>, json: bool) -> Result<()> {
    let reg = match (file, dir) {
        (Some(f), None) => {
            let mut reg = FamilyRegistry::default();
            reg.insert(devreg::load_catalog_file(f)?)?;
            reg
        }
        (None, Some(d)) => devreg::load_catalogs_dir(d)?,
        _ => FamilyRegistry::builtin()?,
    };
    let reports: Vec<CatalogReport> = reg.families().map(CatalogReport::new).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for r in &reports {
            println!(
                "{}: {}/{} variant={} params={} recordable={} gaps={}",
                r.family, r.device_type, r.product_code, r.variant, r.parameters, r.recordable, r.gaps
            );
            for i in &r.issues {
                println!("  ordinal {}: {}", i.ordinal, i.error);
            }
        }
    }
    let bad: usize = reports.iter().map(|r| r.issues.len()).sum();
    if bad > 0 {
        return Err(anyhow!("{bad} catalog issue(s)"));
    }
    println!("ok: {} families", reports.len());
    Ok(())
}

fn backup(
    cfg: &Config,
    fleet_path: &str,
    addresses: &[String],
    out: &Path,
    verbosity: Verbosity,
    show_metrics: bool,
) -> Result<()> {
    let reg = load_registry(cfg)?;
    let fleet = sim::Fleet::load(fleet_path)?;
    let hub = MetricsHub::new().map_err(|e| anyhow!(e))?;
    hub.dev.families_loaded.set(reg.len() as i64);
    let opts = BackupOptions { verbosity };

    let devices = fleet.select(addresses)?;
    let mut completed = 0usize;
    for dev in &devices {
        // a failing device never stops the run
        match backup_device(dev, &reg, &opts, out) {
            Ok((backup, path)) => {
                completed += 1;
                hub.observe_backup(&backup.summary);
                print_backup(&dev.address, &backup, &path, verbosity);
            }
            Err(e) => {
                hub.observe_abort();
                error!(device = %dev.address, error = %format!("{e:#}"), "backup failed");
                if verbosity != Verbosity::Quiet {
                    println!("{}: FAILED {e:#}", dev.address);
                }
            }
        }
    }
    println!(
        "{} device(s): {} completed, {} failed",
        devices.len(),
        completed,
        devices.len() - completed
    );
    if show_metrics {
        print!("{}", hub.encode_text());
    }
    Ok(())
}

fn backup_device(
    dev: &sim::SimDevice,
    reg: &FamilyRegistry,
    opts: &BackupOptions,
    out: &Path,
) -> Result<(devreg::DeviceBackup, std::path::PathBuf)> {
    let mut handle = DeviceHandle::connect(dev.to_transport()?, reg, &LogNotifier)?;
    let backup = handle.backup(opts)?;
    let path = backup.record.save(out)?;
    Ok((backup, path))
}

fn print_backup(address: &str, b: &devreg::DeviceBackup, path: &Path, verbosity: Verbosity) {
    if verbosity == Verbosity::Quiet {
        return;
    }
    let family = b.record.family.as_deref().unwrap_or("generic");
    println!(
        "{address}: {family} read={} defaulted={} unavailable={} skipped={} -> {}",
        b.summary.read,
        b.summary.defaulted,
        b.summary.unavailable,
        b.summary.skipped,
        path.display()
    );
    if verbosity == Verbosity::Verbose {
        for v in b.values.iter().filter(|v| v.is_emitted()) {
            let shown = v
                .value
                .as_ref()
                .map_or_else(|| "<unavailable>".to_string(), Value::to_string);
            let mark = match &v.status {
                ReadStatus::Defaulted { reason } => format!(" (default: {reason})"),
                ReadStatus::Unavailable { reason } => format!(" ({reason})"),
                _ => String::new(),
            };
            println!(
                "  {:>4} {:<24} {shown}{mark}",
                v.ordinal,
                v.name.as_deref().unwrap_or("-")
            );
        }
    }
}

fn restore(
    cfg: &Config,
    fleet_path: &str,
    address: &str,
    from: &Path,
    opts: &RestoreOptions,
    show_metrics: bool,
) -> Result<()> {
    let reg = load_registry(cfg)?;
    let fleet = sim::Fleet::load(fleet_path)?;
    let record = BackupRecord::load(from)?;
    let hub = MetricsHub::new().map_err(|e| anyhow!(e))?;

    let dev = fleet.find(address)?;
    let mut handle = DeviceHandle::connect(dev.to_transport()?, &reg, &LogNotifier)?;
    let report = handle.restore(&record, opts)?;
    hub.observe_restore(&report);

    if opts.verbosity == Verbosity::Verbose {
        for (ordinal, why) in &report.rejected {
            println!("  {ordinal:>4} rejected: {why}");
        }
        for (ordinal, why) in &report.skipped {
            println!("  {ordinal:>4} skipped: {why:?}");
        }
    }
    println!(
        "{address}: written={} rejected={} skipped={} not_in_backup={}",
        report.written.len(),
        report.rejected.len(),
        report.skipped.len(),
        report.not_in_backup
    );
    if show_metrics {
        print!("{}", hub.encode_text());
    }
    match report.aborted {
        Some(e) => Err(anyhow!(e).context(format!("restore of {address} aborted"))),
        None => Ok(()),
    }
}
