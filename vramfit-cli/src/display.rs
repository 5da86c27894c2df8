use std::cmp::Ordering;
use std::collections::HashMap;

use colored::*;
use tabled::{Table, Tabled, settings::Style};
use vramfit_core::fit::{Bucket, BucketedCatalog, FitRequest, ModelFit};
use vramfit_core::group::{ModelGroup, group_variants};
use vramfit_core::hardware::{GpuMemory, GpuRecord, SystemMemory};
use vramfit_core::models::{Feature, ModelRecord};
use vramfit_core::tier::{Benchmark, Tier};

use crate::Hardware;

#[derive(Tabled)]
struct FitRow {
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Quant")]
    quant: String,
    #[tabled(rename = "Size")]
    weight: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Context")]
    context: String,
    #[tabled(rename = "Speed")]
    tps: String,
    #[tabled(rename = "Offload")]
    offload: String,
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Params")]
    params: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Variants")]
    variants: String,
    #[tabled(rename = "Best Context")]
    context: String,
}

#[derive(Tabled)]
struct GpuRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Vendor")]
    vendor: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Bandwidth")]
    bandwidth: String,
}

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Quant")]
    quant: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Params")]
    params: String,
    #[tabled(rename = "Size")]
    weight: String,
    #[tabled(rename = "Max Context")]
    context: String,
    #[tabled(rename = "MMLU")]
    mmlu: String,
    #[tabled(rename = "SWE")]
    swe: String,
    #[tabled(rename = "Features")]
    features: String,
}

/// "128K", "1M", "1.5M"; "-" when nothing fits.
pub fn format_context_k(k: u32) -> String {
    match k {
        0 => "-".to_string(),
        k if k >= 1000 && k % 1000 == 0 => format!("{}M", k / 1000),
        k if k >= 1000 => format!("{:.1}M", k as f64 / 1000.0),
        k => format!("{k}K"),
    }
}

pub fn format_tps(tps: Option<f64>) -> String {
    match tps {
        Some(t) => format!("~{t:.0} tok/s"),
        None => "unknown".to_string(),
    }
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{s:.1}"))
}

fn format_features(features: &[Feature]) -> String {
    if features.is_empty() {
        return "-".to_string();
    }
    features.iter().map(|f| f.label()).collect::<Vec<_>>().join(", ")
}

fn format_offload(fit: &ModelFit) -> String {
    match &fit.offload {
        Some(info) => format!(
            "{:.0}% (-{}%)",
            info.split.offload_ratio * 100.0,
            info.penalty.penalty_percent
        ),
        None => "-".to_string(),
    }
}

fn tier_colored(tier: Tier) -> ColoredString {
    match tier {
        Tier::Excellent => tier.label().green().bold(),
        Tier::Great => tier.label().green(),
        Tier::Good => tier.label().yellow(),
        Tier::Fair => tier.label().bright_red(),
        Tier::Basic => tier.label().red(),
        Tier::NotAvailable => tier.label().dimmed(),
    }
}

fn bucket_heading(bucket: Bucket, count: usize) -> ColoredString {
    let text = format!("{} {} ({})", bucket.emoji(), bucket.label(), count);
    match bucket {
        Bucket::Fits => text.green().bold(),
        Bucket::Tight => text.yellow().bold(),
        Bucket::NoFit => text.red().bold(),
    }
}

fn fit_row(fit: &ModelFit, benchmark: Benchmark) -> FitRow {
    FitRow {
        name: fit.model.name.clone(),
        quant: fit.model.quantization.label().to_string(),
        weight: format!("{:.1} GB", fit.model.weight_gb),
        score: format_score(fit.score(benchmark)),
        tier: fit.tier.label().to_string(),
        context: format_context_k(fit.max_context_k),
        tps: format_tps(fit.tokens_per_sec),
        offload: format_offload(fit),
    }
}

fn group_row(group: &ModelGroup, benchmark: Benchmark) -> GroupRow {
    let score = match benchmark {
        Benchmark::General => Some(group.mmlu_score),
        Benchmark::Coding => group.swe_bench_score,
    };
    let variants: Vec<_> = group
        .variants
        .iter()
        .map(|v| v.model.quantization.label())
        .collect();
    let context = group
        .variants
        .iter()
        .map(|v| v.max_context_k)
        .max()
        .unwrap_or(0);
    GroupRow {
        name: group.name.clone(),
        params: format!("{:.1}B", group.params_b),
        score: format_score(score),
        tier: group.tier.label().to_string(),
        variants: variants.join(" "),
        context: format_context_k(context),
    }
}

pub fn display_hardware(hardware: &Hardware, request: &FitRequest) {
    println!("\n{}", "=== Hardware ===".bold().cyan());
    println!("{}: {}", "GPU".bold(), hardware.label);
    println!("{}: {:.1} GB", "VRAM".bold(), hardware.resources.vram_gb);
    match hardware.resources.bandwidth_gbps {
        Some(bw) => println!("{}: {:.0} GB/s", "Bandwidth".bold(), bw),
        None => println!("{}: {}", "Bandwidth".bold(), "unknown".dimmed()),
    }
    if let Some(ram) = hardware.system_ram_gb {
        println!("{}: {:.1} GB available for offload", "System RAM".bold(), ram);
    }

    let mut filters = Vec::new();
    if let Some(k) = request.min_context_k {
        filters.push(format!("context >= {}", format_context_k(k)));
    }
    if let Some(tps) = request.min_speed_tps {
        filters.push(format!("speed >= {tps:.0} tok/s"));
    }
    if !request.required_features.is_empty() {
        filters.push(format!("features: {}", format_features(&request.required_features)));
    }
    if !filters.is_empty() {
        println!("{}: {}", "Filters".bold(), filters.join("; "));
    }
    println!("{}: {}", "Ranked by".bold(), request.benchmark.label());
}

pub fn display_buckets(buckets: &BucketedCatalog, benchmark: Benchmark, group: bool) {
    if buckets.is_empty() {
        println!("\n{}", "No models to show.".yellow());
        return;
    }

    for bucket in [Bucket::Fits, Bucket::Tight, Bucket::NoFit] {
        let entries = buckets.bucket(bucket);
        println!("\n{}", bucket_heading(bucket, entries.len()));
        if entries.is_empty() {
            println!("  {}", "(none)".dimmed());
            continue;
        }

        let table = if group {
            let rows: Vec<GroupRow> = group_variants(entries)
                .iter()
                .map(|g| group_row(g, benchmark))
                .collect();
            Table::new(rows).with(Style::rounded()).to_string()
        } else {
            let rows: Vec<FitRow> = entries.iter().map(|f| fit_row(f, benchmark)).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        };
        println!("{}", table);
    }
}

pub fn display_model_detail(fit: &ModelFit, benchmark: Benchmark) {
    let model = &fit.model;
    println!(
        "\n{}",
        format!("=== {} ({}) ===", model.name, model.quantization.label())
            .bold()
            .cyan()
    );
    println!();
    println!("{}: {}", "ID".bold(), model.id);
    println!("{}: {:.1}B", "Parameters".bold(), model.params_b);
    println!("{}: {:.2} GB", "Weights".bold(), model.weight_gb);
    println!(
        "{}: {:.3} GB per 1K tokens",
        "KV Cache".bold(),
        model.kv_per_1k_gb
    );
    println!(
        "{}: {}",
        "Max Context".bold(),
        format_context_k(model.max_context_k)
    );
    println!("{}: {}", "Features".bold(), format_features(&model.features));
    if !model.notes.is_empty() {
        println!("{}: {}", "About".bold(), model.notes);
    }
    println!();

    println!("{}", "Benchmarks:".bold().underline());
    println!("  MMLU: {:.1}", model.mmlu_score);
    println!("  SWE-bench: {}", format_score(model.swe_bench_score));
    println!(
        "  Tier ({}): {}",
        benchmark.label(),
        tier_colored(fit.tier)
    );
    println!();

    println!("{}", "Fit Analysis:".bold().underline());
    println!("  Status: {} {}", fit.bucket.emoji(), fit.bucket.label());
    println!("  Usable Context: {}", format_context_k(fit.max_context_k));
    println!("  Speed: {}", format_tps(fit.tokens_per_sec));
    println!(
        "  Checks: vram {}  context {}  speed {}  features {}",
        check_mark(fit.fits_in_vram),
        check_mark(fit.meets_context),
        check_mark(fit.meets_speed),
        check_mark(fit.meets_features)
    );

    if let Some(info) = &fit.offload {
        println!();
        println!("{}", "Offload:".bold().underline());
        println!(
            "  GPU: {:.2} GB  RAM: {:.2} GB ({:.0}%)",
            info.split.gpu_weight_gb,
            info.split.ram_weight_gb,
            info.split.offload_ratio * 100.0
        );
        println!("  Layers on CPU: ~{}", info.split.estimated_layers);
        println!(
            "  Speed penalty: {}% (x{:.2})",
            info.penalty.penalty_percent, info.penalty.speed_multiplier
        );
    }

    if let Some(ext) = &fit.context_extension {
        println!();
        println!("{}", "Context with System RAM:".bold().underline());
        println!(
            "  {} total ({} from VRAM, {} from RAM)",
            format_context_k(ext.context_k),
            format_context_k(ext.vram_context_k),
            format_context_k(ext.ram_context_k)
        );
    }
    println!();

    if !fit.notes.is_empty() {
        println!("{}", "Notes:".bold().underline());
        for note in &fit.notes {
            println!("  {}", note);
        }
        println!();
    }
}

fn check_mark(ok: bool) -> ColoredString {
    if ok { "yes".green() } else { "no".red() }
}

pub fn display_gpus(gpus: &[GpuRecord]) {
    println!("\n{}", "=== GPU Catalog ===".bold().cyan());
    println!("Total GPUs: {}\n", gpus.len());

    let rows: Vec<GpuRow> = gpus
        .iter()
        .map(|g| {
            let (memory, bandwidth) = match &g.memory {
                GpuMemory::Discrete {
                    vram_gb,
                    bandwidth_gbps,
                } => (format!("{vram_gb:.0} GB"), format!("{bandwidth_gbps:.0} GB/s")),
                GpuMemory::Unified { options } => (
                    options
                        .iter()
                        .map(|o| format!("{:.0}", o.vram_gb))
                        .collect::<Vec<_>>()
                        .join("/")
                        + " GB unified",
                    options
                        .iter()
                        .map(|o| format!("{:.0}", o.bandwidth_gbps))
                        .collect::<Vec<_>>()
                        .join("/")
                        + " GB/s",
                ),
            };
            GpuRow {
                id: g.id.clone(),
                name: g.name.clone(),
                vendor: g.vendor.clone(),
                memory,
                bandwidth,
            }
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn display_models(models: &[ModelRecord]) {
    println!("\n{}", "=== Model Catalog ===".bold().cyan());
    println!("Total variants: {}\n", models.len());

    let rows: Vec<ModelRow> = family_order(models)
        .into_iter()
        .map(|m| ModelRow {
            name: m.name.clone(),
            quant: m.quantization.label().to_string(),
            id: m.id.clone(),
            params: format!("{:.1}B", m.params_b),
            weight: format!("{:.2} GB", m.weight_gb),
            context: format_context_k(m.max_context_k),
            mmlu: format!("{:.1}", m.mmlu_score),
            swe: format_score(m.swe_bench_score),
            features: format_features(&m.features),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Variants of the same model next to each other, lightest first, families
/// in order of first appearance.
fn family_order(models: &[ModelRecord]) -> Vec<&ModelRecord> {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    for (i, m) in models.iter().enumerate() {
        first_seen.entry(m.name.as_str()).or_insert(i);
    }
    let mut ordered: Vec<&ModelRecord> = models.iter().collect();
    ordered.sort_by(|a, b| {
        first_seen[a.name.as_str()]
            .cmp(&first_seen[b.name.as_str()])
            .then(a.weight_gb.partial_cmp(&b.weight_gb).unwrap_or(Ordering::Equal))
    });
    ordered
}

pub fn display_system(memory: &SystemMemory) {
    println!("\n{}", "=== System Memory ===".bold().cyan());
    println!("{}: {:.1} GB", "Total RAM".bold(), memory.total_ram_gb);
    println!("{}: {:.1} GB", "Available RAM".bold(), memory.available_ram_gb);
    println!(
        "\nPass {} to use this for offloading.",
        "--system-ram auto".bold()
    );
}

// ────────────────────────────────────────────────────────────────────
// JSON output for scripts and tool integration
// ────────────────────────────────────────────────────────────────────

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("JSON serialization failed")
    );
}

pub fn display_json_system(memory: &SystemMemory) {
    print_json(&serde_json::json!({
        "system": {
            "total_ram_gb": round2(memory.total_ram_gb),
            "available_ram_gb": round2(memory.available_ram_gb),
        },
    }));
}

pub fn display_json_gpus(gpus: &[GpuRecord]) {
    print_json(&serde_json::json!({ "gpus": gpus }));
}

pub fn display_json_models(models: &[ModelRecord]) {
    print_json(&serde_json::json!({ "models": models }));
}

pub fn display_json_buckets(hardware: &Hardware, request: &FitRequest, buckets: &BucketedCatalog) {
    let list = |fits: &[ModelFit]| fits.iter().map(fit_to_json).collect::<Vec<_>>();
    print_json(&serde_json::json!({
        "hardware": hardware_json(hardware, request),
        "fits": list(&buckets.fits),
        "tight": list(&buckets.tight),
        "no_fit": list(&buckets.no_fit),
    }));
}

pub fn display_json_groups(hardware: &Hardware, request: &FitRequest, buckets: &BucketedCatalog) {
    let list = |fits: &[ModelFit]| {
        group_variants(fits)
            .iter()
            .map(group_to_json)
            .collect::<Vec<_>>()
    };
    print_json(&serde_json::json!({
        "hardware": hardware_json(hardware, request),
        "fits": list(&buckets.fits),
        "tight": list(&buckets.tight),
        "no_fit": list(&buckets.no_fit),
    }));
}

pub fn display_json_fits(hardware: &Hardware, request: &FitRequest, fits: &[ModelFit]) {
    let models: Vec<serde_json::Value> = fits.iter().map(fit_to_json).collect();
    print_json(&serde_json::json!({
        "hardware": hardware_json(hardware, request),
        "models": models,
    }));
}

fn hardware_json(hardware: &Hardware, request: &FitRequest) -> serde_json::Value {
    serde_json::json!({
        "label": hardware.label,
        "vram_gb": round2(hardware.resources.vram_gb),
        "bandwidth_gbps": hardware.resources.bandwidth_gbps.map(round1),
        "system_ram_gb": hardware.system_ram_gb.map(round2),
        "min_context_k": request.min_context_k,
        "min_speed_tps": request.min_speed_tps,
        "required_features": request.required_features,
        "benchmark": request.benchmark,
    })
}

fn fit_to_json(fit: &ModelFit) -> serde_json::Value {
    let offload = fit.offload.as_ref().map(|o| {
        serde_json::json!({
            "gpu_weight_gb": round2(o.split.gpu_weight_gb),
            "ram_weight_gb": round2(o.split.ram_weight_gb),
            "offload_ratio": round2(o.split.offload_ratio),
            "estimated_layers": o.split.estimated_layers,
            "penalty_percent": o.penalty.penalty_percent,
            "speed_multiplier": round2(o.penalty.speed_multiplier),
        })
    });
    serde_json::json!({
        "id": fit.model.id,
        "name": fit.model.name,
        "quantization": fit.model.quantization,
        "params_b": fit.model.params_b,
        "weight_gb": round2(fit.model.weight_gb),
        "bucket": fit.bucket,
        "tier": fit.tier,
        "tier_class": fit.tier.style_class(),
        "mmlu_score": fit.model.mmlu_score,
        "swe_bench_score": fit.model.swe_bench_score,
        "max_context_k": fit.max_context_k,
        "tokens_per_sec": fit.tokens_per_sec,
        "fits_in_vram": fit.fits_in_vram,
        "meets_context": fit.meets_context,
        "meets_speed": fit.meets_speed,
        "meets_features": fit.meets_features,
        "features": fit.model.features,
        "offload": offload,
        "context_extension": fit.context_extension,
        "notes": fit.notes,
    })
}

fn group_to_json(group: &ModelGroup) -> serde_json::Value {
    let variants: Vec<serde_json::Value> = group.variants.iter().map(fit_to_json).collect();
    serde_json::json!({
        "name": group.name,
        "params_b": group.params_b,
        "tier": group.tier,
        "mmlu_score": group.mmlu_score,
        "swe_bench_score": group.swe_bench_score,
        "features": group.features,
        "variants": variants,
    })
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use vramfit_core::models::ModelCatalog;

    #[test]
    fn test_format_context_k() {
        assert_eq!(format_context_k(0), "-");
        assert_eq!(format_context_k(4), "4K");
        assert_eq!(format_context_k(128), "128K");
        assert_eq!(format_context_k(1000), "1M");
        assert_eq!(format_context_k(1500), "1.5M");
    }

    #[test]
    fn test_format_tps() {
        assert_eq!(format_tps(Some(49.6)), "~50 tok/s");
        assert_eq!(format_tps(None), "unknown");
    }

    #[test]
    fn test_format_features() {
        assert_eq!(format_features(&[]), "-");
        assert_eq!(
            format_features(&[Feature::ToolUse, Feature::Vision]),
            "tool-use, vision"
        );
    }

    #[test]
    fn test_fit_json_shape() {
        let catalog = ModelCatalog::embedded();
        let model = catalog.by_id("llama-3.1-8b-q4").unwrap();
        let fit = ModelFit::analyze(model, &FitRequest::new(24.0, Some(1008.0)));
        let json = fit_to_json(&fit);
        assert_eq!(json["id"], "llama-3.1-8b-q4");
        assert_eq!(json["bucket"], serde_json::to_value(fit.bucket).unwrap());
        assert!(json["offload"].is_null());
        assert_eq!(json["max_context_k"], fit.max_context_k);
    }

    #[test]
    fn test_offload_column() {
        let catalog = ModelCatalog::embedded();
        let model = catalog.by_id("llama-3.1-8b-q4").unwrap();
        let fit = ModelFit::analyze(model, &FitRequest::new(24.0, Some(1008.0)));
        assert_eq!(format_offload(&fit), "-");
    }

    #[test]
    fn test_family_order_keeps_variants_together() {
        let catalog = ModelCatalog::embedded();
        let ordered = family_order(catalog.all());
        assert_eq!(ordered.len(), catalog.all().len());

        let mut seen: Vec<&str> = Vec::new();
        for m in &ordered {
            if seen.last() != Some(&m.name.as_str()) {
                assert!(!seen.contains(&m.name.as_str()), "{} split up", m.name);
                seen.push(m.name.as_str());
            }
        }
        for pair in ordered.windows(2) {
            if pair[0].name == pair[1].name {
                assert!(pair[0].weight_gb < pair[1].weight_gb);
            }
        }
    }

    #[test]
    fn test_round_helpers() {
        assert_eq!(round1(49.96), 50.0);
        assert_eq!(round2(0.125), 0.13);
    }
}
