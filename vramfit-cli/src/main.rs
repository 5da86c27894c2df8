mod display;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use vramfit_core::fit::{self, FitRequest, ModelFit};
use vramfit_core::hardware::{self, GpuCatalog, ScaledResources, SystemMemory};
use vramfit_core::models::{Feature, ModelCatalog};
use vramfit_core::tier::Benchmark;

/// Minimum context for agentic workflows (tool loops, repo-sized prompts), in K tokens.
const AGENTIC_MIN_CONTEXT_K: u32 = 32;

const SYSTEM_RAM_ENV: &str = "VRAMFIT_SYSTEM_RAM";
const MIN_CONTEXT_ENV: &str = "VRAMFIT_MIN_CONTEXT";

#[derive(Parser)]
#[command(name = "vramfit")]
#[command(about = "Find which quantized LLMs run on your GPU", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output results as JSON (for tool integration)
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List GPUs in the catalog
    Gpus,

    /// List all models, grouped by quantization variant
    Models,

    /// Show detected system memory
    System,

    /// Sort the model catalog into fits / tight / no fit for a GPU
    Fit {
        #[command(flatten)]
        hardware: HardwareArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// Collapse quantization variants of the same model
        #[arg(long)]
        group: bool,

        /// Limit number of results per bucket
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show how one model (by id or name) runs on a GPU
    Info {
        /// Model id or partial name
        model: String,

        #[command(flatten)]
        hardware: HardwareArgs,

        #[command(flatten)]
        filters: FilterArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct HardwareArgs {
    /// GPU from the catalog, by id or name (see `vramfit gpus`)
    #[arg(long, value_name = "GPU", required_unless_present = "vram", conflicts_with = "vram")]
    gpu: Option<String>,

    /// Memory configuration of a unified-memory chip, by index (default: largest)
    #[arg(long, value_name = "INDEX", requires = "gpu")]
    option: Option<usize>,

    /// Manual VRAM per GPU (e.g. "24G", "24000M")
    #[arg(long, value_name = "SIZE")]
    vram: Option<String>,

    /// Memory bandwidth per GPU in GB/s, for manual VRAM. Speed is unknown without it.
    #[arg(long, value_name = "GB/S", requires = "vram")]
    bandwidth: Option<f64>,

    /// Number of identical GPUs
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=8))]
    count: u32,

    /// System RAM usable for offloading (e.g. "64G", or "auto" to detect).
    /// Falls back to VRAMFIT_SYSTEM_RAM if not set.
    #[arg(long, value_name = "SIZE|auto")]
    system_ram: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct FilterArgs {
    /// Minimum context in K tokens. Falls back to VRAMFIT_MIN_CONTEXT if not set.
    #[arg(long, value_name = "K", value_parser = clap::value_parser!(u32).range(1..))]
    min_context: Option<u32>,

    /// Minimum decode speed in tokens/sec
    #[arg(long, value_name = "TOK/S")]
    min_speed: Option<f64>,

    /// Required capability (repeatable): vision, reasoning, tool-use, coding, multilingual, long-context
    #[arg(long = "feature", value_name = "FEATURE", value_parser = parse_feature)]
    features: Vec<Feature>,

    /// Agentic workloads: require at least 32K context
    #[arg(long)]
    agentic: bool,

    /// Benchmark used for tiers and ranking
    #[arg(long, value_enum, default_value_t = BenchmarkArg::General)]
    benchmark: BenchmarkArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BenchmarkArg {
    General,
    Coding,
}

impl From<BenchmarkArg> for Benchmark {
    fn from(arg: BenchmarkArg) -> Self {
        match arg {
            BenchmarkArg::General => Benchmark::General,
            BenchmarkArg::Coding => Benchmark::Coding,
        }
    }
}

fn parse_feature(s: &str) -> Result<Feature, String> {
    Feature::parse(s).ok_or_else(|| {
        let known: Vec<_> = Feature::ALL.iter().map(|f| f.label()).collect();
        format!("unknown feature '{s}' (expected one of: {})", known.join(", "))
    })
}

/// Resolved hardware budget, with a label for display.
pub struct Hardware {
    pub label: String,
    pub resources: ScaledResources,
    pub system_ram_gb: Option<f64>,
}

fn resolve_hardware(args: &HardwareArgs, gpus: &GpuCatalog) -> Result<Hardware> {
    let (label, vram_gb, bandwidth_gbps) = if let Some(query) = &args.gpu {
        let gpu = match gpus.find(query).as_slice() {
            [] => bail!("no GPU matches '{query}' (see `vramfit gpus`)"),
            [gpu] => *gpu,
            many => {
                let ids: Vec<_> = many.iter().map(|g| g.id.as_str()).collect();
                bail!("'{query}' matches several GPUs: {}", ids.join(", "));
            }
        };
        let memory = gpu.resolve(args.option)?;
        let label = if gpu.is_unified() {
            format!("{} ({:.0} GB)", gpu.name, memory.vram_gb)
        } else {
            gpu.name.clone()
        };
        (label, memory.vram_gb, Some(memory.bandwidth_gbps))
    } else if let Some(raw) = &args.vram {
        let vram_gb = hardware::parse_memory_size(raw).with_context(|| {
            format!("could not parse --vram value '{raw}'. Expected format: 24G, 24000M, 1.5T")
        })?;
        (format!("{vram_gb:.1} GB VRAM"), vram_gb, args.bandwidth)
    } else {
        bail!("either --gpu or --vram is required");
    };

    let resources = hardware::scale_resources(vram_gb, bandwidth_gbps, Some(args.count));
    let label = if args.count > 1 {
        format!("{}x {label}", args.count)
    } else {
        label
    };

    let env_ram = std::env::var(SYSTEM_RAM_ENV).ok();
    let system_ram_gb = resolve_system_ram(args.system_ram.as_deref(), env_ram.as_deref())?;

    Ok(Hardware {
        label,
        resources,
        system_ram_gb,
    })
}

/// `--system-ram` wins over the environment. A bad flag is an error; a bad
/// environment value is only a warning.
fn resolve_system_ram(flag: Option<&str>, env: Option<&str>) -> Result<Option<f64>> {
    if let Some(raw) = flag {
        return parse_system_ram(raw)
            .with_context(|| format!("could not parse --system-ram value '{raw}'"))
            .map(Some);
    }
    let Some(raw) = env else {
        return Ok(None);
    };
    match parse_system_ram(raw) {
        Some(gb) => Ok(Some(gb)),
        None => {
            log::warn!("could not parse {SYSTEM_RAM_ENV}='{raw}'. Expected a size like 64G or 'auto'.");
            Ok(None)
        }
    }
}

fn parse_system_ram(raw: &str) -> Option<f64> {
    if raw.trim().eq_ignore_ascii_case("auto") {
        Some(SystemMemory::detect().available_ram_gb)
    } else {
        hardware::parse_memory_size(raw)
    }
}

/// Effective minimum context: flag, then environment, raised for agentic use.
fn resolve_min_context(flag: Option<u32>, env: Option<&str>, agentic: bool) -> Option<u32> {
    let base = flag.or_else(|| {
        let raw = env?;
        match raw.trim().parse::<u32>() {
            Ok(v) if v > 0 => Some(v),
            _ => {
                log::warn!(
                    "could not parse {MIN_CONTEXT_ENV}='{raw}'. Expected a positive integer (K tokens)."
                );
                None
            }
        }
    });
    if agentic {
        Some(base.map_or(AGENTIC_MIN_CONTEXT_K, |k| k.max(AGENTIC_MIN_CONTEXT_K)))
    } else {
        base
    }
}

fn build_request(hardware: &Hardware, filters: &FilterArgs) -> FitRequest {
    let env_ctx = std::env::var(MIN_CONTEXT_ENV).ok();
    let min_context_k = resolve_min_context(filters.min_context, env_ctx.as_deref(), filters.agentic);

    FitRequest::new(hardware.resources.vram_gb, hardware.resources.bandwidth_gbps)
        .with_min_context(min_context_k)
        .with_min_speed(filters.min_speed)
        .with_features(filters.features.clone())
        .with_benchmark(filters.benchmark.into())
        .with_system_ram(hardware.system_ram_gb)
}

fn run_fit(
    hardware_args: &HardwareArgs,
    filters: &FilterArgs,
    group: bool,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let hardware = resolve_hardware(hardware_args, &GpuCatalog::embedded())?;
    let request = build_request(&hardware, filters);
    let catalog = ModelCatalog::embedded();

    let mut buckets = fit::bucket_catalog(catalog.all(), &request);
    if let Some(n) = limit {
        buckets.fits.truncate(n);
        buckets.tight.truncate(n);
        buckets.no_fit.truncate(n);
    }

    match (json, group) {
        (true, false) => display::display_json_buckets(&hardware, &request, &buckets),
        (true, true) => display::display_json_groups(&hardware, &request, &buckets),
        (false, _) => {
            display::display_hardware(&hardware, &request);
            display::display_buckets(&buckets, request.benchmark, group);
        }
    }
    Ok(())
}

fn run_info(
    query: &str,
    hardware_args: &HardwareArgs,
    filters: &FilterArgs,
    json: bool,
) -> Result<()> {
    let catalog = ModelCatalog::embedded();
    let matches = match catalog.by_id(query) {
        Some(m) => vec![m],
        None => catalog.find(query),
    };
    let Some(first) = matches.first() else {
        bail!("no model found matching '{query}'");
    };
    if matches.iter().any(|m| m.name != first.name) {
        println!("\nMultiple models found. Please be more specific:");
        for m in &matches {
            println!("  - {} ({})", m.id, m.name);
        }
        return Ok(());
    }

    let hardware = resolve_hardware(hardware_args, &GpuCatalog::embedded())?;
    let request = build_request(&hardware, filters);
    let fits: Vec<ModelFit> = matches
        .iter()
        .map(|m| ModelFit::analyze(m, &request))
        .collect();

    if json {
        display::display_json_fits(&hardware, &request, &fits);
    } else {
        display::display_hardware(&hardware, &request);
        for fit in &fits {
            display::display_model_detail(fit, request.benchmark);
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Gpus => {
            let gpus = GpuCatalog::embedded();
            if cli.json {
                display::display_json_gpus(gpus.all());
            } else {
                display::display_gpus(gpus.all());
            }
        }

        Commands::Models => {
            let catalog = ModelCatalog::embedded();
            if cli.json {
                display::display_json_models(catalog.all());
            } else {
                display::display_models(catalog.all());
            }
        }

        Commands::System => {
            let memory = SystemMemory::detect();
            if cli.json {
                display::display_json_system(&memory);
            } else {
                display::display_system(&memory);
            }
        }

        Commands::Fit {
            hardware,
            filters,
            group,
            limit,
        } => run_fit(&hardware, &filters, group, limit, cli.json)?,

        Commands::Info {
            model,
            hardware,
            filters,
        } => run_info(&model, &hardware, &filters, cli.json)?,
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
