use anyhow::{bail, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

// Use library instead of local modules
use taxon_audit::sources::{calflora, eflora, inat, rpi};
use taxon_audit::{Catalog, Config, ErrorLog, Exceptions, InatApi, NameSearch};

/// Source selection and directories for one run
struct Options {
    tools: Vec<String>,
    data_dir: PathBuf,
    external_dir: PathBuf,
    output_dir: PathBuf,
    offline: bool,
    eflora_log_notes: bool,
}

const ALL_TOOLS: &[&str] = &["calflora", "inat", "jepson", "rpi"];

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args)?;
    run(&options)
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options {
        tools: Vec::new(),
        data_dir: PathBuf::from("./data"),
        external_dir: PathBuf::from("./external_data"),
        output_dir: PathBuf::from("./output"),
        offline: false,
        eflora_log_notes: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--tool" | "-t" => {
                let value = match iter.next() {
                    Some(value) => value,
                    None => bail!("--tool requires a value"),
                };
                if value == "all" {
                    options.tools = ALL_TOOLS.iter().map(|t| t.to_string()).collect();
                } else if ALL_TOOLS.contains(&value.as_str()) {
                    options.tools.push(value.clone());
                } else {
                    bail!("unrecognized tool: {}", value);
                }
            }
            "--data" => match iter.next() {
                Some(value) => options.data_dir = PathBuf::from(value),
                None => bail!("--data requires a directory"),
            },
            "--external" => match iter.next() {
                Some(value) => options.external_dir = PathBuf::from(value),
                None => bail!("--external requires a directory"),
            },
            "--output" => match iter.next() {
                Some(value) => options.output_dir = PathBuf::from(value),
                None => bail!("--output requires a directory"),
            },
            "--offline" => options.offline = true,
            "--ef-lognotes" => options.eflora_log_notes = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ => bail!("unrecognized option: {}", arg),
        }
    }

    if options.tools.is_empty() {
        print_usage();
        bail!("no tool selected");
    }

    Ok(options)
}

fn print_usage() {
    println!("Usage: taxon-audit --tool <all|calflora|inat|jepson|rpi> [options]");
    println!();
    println!("Options:");
    println!("  -t, --tool <name>   Tool to run; repeatable, 'all' runs every tool");
    println!("      --data <dir>    Catalog data directory (default ./data)");
    println!("      --external <dir> Downloaded feed directory (default ./external_data)");
    println!("      --output <dir>  Log output directory (default ./output)");
    println!("      --offline       Skip the iNaturalist name-search API");
    println!("      --ef-lognotes   Include eFlora notes and invalid names in the log");
    println!();
    println!("Tools:");
    println!("  calflora  Compare against the Calflora species feeds");
    println!("  inat      Compare against the iNaturalist taxonomy export");
    println!("  jepson    Compare against the Jepson eFlora index");
    println!("  rpi       Compare against the CNPS Rare Plant Inventory");
}

fn run(options: &Options) -> Result<()> {
    println!("🌿 Taxon Audit v{}", taxon_audit::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load the run configuration and the authoritative inputs
    let config = Config::load(options.data_dir.join("config.json"))?;

    println!("\n📂 Loading catalog...");
    let catalog = Catalog::load(&options.data_dir)?;
    println!("✓ Loaded {} taxa", catalog.len());

    let exceptions_path = options.data_dir.join("exceptions.json");
    let exceptions = if exceptions_path.exists() {
        Exceptions::load(&exceptions_path)?
    } else {
        Exceptions::new()
    };
    println!("✓ Loaded {} exception entries", exceptions.len());

    let mut log = ErrorLog::new(true);

    // 2. Run each selected source sequentially
    for tool in &options.tools {
        println!("\n🔍 Checking {}...", tool);
        match tool.as_str() {
            "calflora" => run_calflora(options, &catalog, &exceptions, &mut log)?,
            "inat" => run_inat(options, &config, &catalog, &exceptions, &mut log)?,
            "jepson" => run_eflora(options, &catalog, &exceptions, &mut log)?,
            "rpi" => run_rpi(options, &config, &catalog, &exceptions, &mut log)?,
            _ => bail!("unrecognized tool: {}", tool),
        }
    }

    // 3. Flush the ordered log
    std::fs::create_dir_all(&options.output_dir)?;
    let log_path = options.output_dir.join("log.tsv");
    log.write(&log_path)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✓ Run started {}",
        log.started_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("✓ {} log entries written to {}", log.len(), log_path.display());

    Ok(())
}

fn run_calflora(
    options: &Options,
    catalog: &Catalog,
    exceptions: &Exceptions,
    log: &mut ErrorLog,
) -> Result<()> {
    let active = read_feed(&options.external_dir, "calflora_taxa_active.tsv")?;
    let inactive = read_feed(&options.external_dir, "calflora_taxa_inactive.tsv")?;
    let store = calflora::build_store(&active, &inactive, log)?;
    println!("✓ Calflora: {} records loaded", store.len());
    calflora::analyze(catalog, exceptions, &store, log)
}

fn run_inat(
    options: &Options,
    config: &Config,
    catalog: &Catalog,
    exceptions: &Exceptions,
    log: &mut ErrorLog,
) -> Result<()> {
    let rows = taxon_audit::read_csv(options.external_dir.join("inat_taxa.csv"))?;
    let store = inat::build_store(&rows);
    println!("✓ iNat: {} taxa loaded", store.len());

    let api;
    let search: Option<&dyn NameSearch> = if options.offline {
        None
    } else {
        api = InatApi::new();
        Some(&api)
    };
    let throttle = Duration::from_millis(config.lookup_throttle_ms);
    inat::analyze(catalog, exceptions, &store, log, search, throttle)
}

fn run_eflora(
    options: &Options,
    catalog: &Catalog,
    exceptions: &Exceptions,
    log: &mut ErrorLog,
) -> Result<()> {
    let rows = taxon_audit::read_csv(options.external_dir.join("eflora_index.csv"))?;
    let store = eflora::build_store(&rows, catalog, options.eflora_log_notes, log)?;
    println!("✓ eFlora: {} records loaded", store.len());
    eflora::analyze(catalog, exceptions, &store, log)
}

fn run_rpi(
    options: &Options,
    config: &Config,
    catalog: &Catalog,
    exceptions: &Exceptions,
    log: &mut ErrorLog,
) -> Result<()> {
    let rows = taxon_audit::read_csv(options.external_dir.join("rpi.csv"))?;
    let store = rpi::build_store(&rows, log);
    println!("✓ RPI: {} records loaded", store.len());
    rpi::analyze(catalog, config, exceptions, &store, log)
}

fn read_feed(dir: &Path, file_name: &str) -> Result<Vec<taxon_audit::Row>> {
    taxon_audit::read_tsv(dir.join(file_name))
}
