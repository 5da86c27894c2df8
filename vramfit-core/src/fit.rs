use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::models::{Feature, ModelRecord};
use crate::tier::{self, Benchmark, Tier};

/// VRAM held back for KV reads, activations and engine buffers. The same
/// figure is added to the bytes read per decoded token.
pub const OVERHEAD_GB: f64 = 1.0;

/// Beyond this share of weights in system RAM, offloading is not worth it.
pub const MAX_OFFLOAD_RATIO: f64 = 0.5;

/// Below this usable context (in K tokens) a model only fits tightly.
pub const TIGHT_CONTEXT_K: u32 = 4;

const PENALTY_FLOOR: f64 = 0.15;
const PENALTY_SLOPE: f64 = 0.70;
const PENALTY_CEILING: f64 = 0.50;

/// Classification outcome for one model under a hardware budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bucket {
    Fits,
    Tight,
    NoFit,
}

impl Bucket {
    pub fn label(&self) -> &'static str {
        match self {
            Bucket::Fits => "Fits",
            Bucket::Tight => "Tight",
            Bucket::NoFit => "No Fit",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Bucket::Fits => "🟢",
            Bucket::Tight => "🟡",
            Bucket::NoFit => "🔴",
        }
    }
}

// ────────────────────────────────────────────────────────────────────
// Context estimation
// ────────────────────────────────────────────────────────────────────

/// Usable context with the KV cache held in VRAM only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextEstimate {
    pub context_k: u32,
    /// Portion of `context_k` whose KV cache lives in VRAM.
    pub vram_context_k: u32,
    /// Portion of `context_k` whose KV cache spills into system RAM.
    pub ram_context_k: u32,
    pub using_system_ram: bool,
}

fn kv_capacity_k(budget_gb: f64, kv_per_1k_gb: f64) -> u32 {
    (budget_gb / kv_per_1k_gb).floor() as u32
}

/// Largest context (K tokens) whose KV cache fits next to the weights,
/// capped at the model's architectural maximum.
pub fn estimate_max_context(model: &ModelRecord, vram_gb: f64) -> u32 {
    let available_for_kv = vram_gb - model.weight_gb;
    if available_for_kv <= 0.0 {
        return 0;
    }
    if model.kv_per_1k_gb <= 0.0 {
        return model.max_context_k;
    }
    kv_capacity_k(available_for_kv, model.kv_per_1k_gb).min(model.max_context_k)
}

/// Like [`estimate_max_context`], but lets the KV cache grow into system
/// RAM once VRAM is exhausted. Only applies when the weights themselves
/// fit in VRAM; otherwise, or without a RAM budget, this is the VRAM-only
/// estimate.
pub fn estimate_max_context_with_offload(
    model: &ModelRecord,
    vram_gb: f64,
    system_ram_gb: Option<f64>,
) -> ContextEstimate {
    let basic = estimate_max_context(model, vram_gb);
    let vram_only = ContextEstimate {
        context_k: basic,
        vram_context_k: basic,
        ram_context_k: 0,
        using_system_ram: false,
    };

    let Some(ram_gb) = system_ram_gb else {
        return vram_only;
    };
    let available_for_kv = vram_gb - model.weight_gb;
    if available_for_kv <= 0.0 || model.kv_per_1k_gb <= 0.0 || ram_gb <= 0.0 {
        return vram_only;
    }

    let vram_ctx = kv_capacity_k(available_for_kv, model.kv_per_1k_gb);
    if vram_ctx >= model.max_context_k {
        // VRAM alone already reaches the architectural cap
        return vram_only;
    }
    let ram_ctx = kv_capacity_k(ram_gb, model.kv_per_1k_gb);
    let total = vram_ctx.saturating_add(ram_ctx).min(model.max_context_k);

    ContextEstimate {
        context_k: total,
        vram_context_k: vram_ctx,
        ram_context_k: total - vram_ctx,
        using_system_ram: total > vram_ctx,
    }
}

// ────────────────────────────────────────────────────────────────────
// Throughput estimation
// ────────────────────────────────────────────────────────────────────

/// Decode speed in tokens/sec. Decoding is memory-bound: every token reads
/// all weights plus roughly `OVERHEAD_GB` of cache and activations. Unknown
/// bandwidth yields an unknown speed.
pub fn estimate_throughput(model: &ModelRecord, bandwidth_gbps: Option<f64>) -> Option<f64> {
    bandwidth_gbps.map(|bw| (bw / (model.weight_gb + OVERHEAD_GB)).round())
}

// ────────────────────────────────────────────────────────────────────
// Weight offloading
// ────────────────────────────────────────────────────────────────────

/// How weights divide between VRAM and system RAM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OffloadSplit {
    pub gpu_weight_gb: f64,
    pub ram_weight_gb: f64,
    /// Share of weights in system RAM, in (0, `MAX_OFFLOAD_RATIO`].
    pub offload_ratio: f64,
    /// Rough number of layers that end up on the CPU side.
    pub estimated_layers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum OffloadBlocker {
    NoSystemRam,
    RatioTooHigh { offload_ratio: f64 },
    InsufficientRam { needed_gb: f64, available_gb: f64 },
}

impl fmt::Display for OffloadBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffloadBlocker::NoSystemRam => write!(f, "No system RAM budget for offloading"),
            OffloadBlocker::RatioTooHigh { offload_ratio } => write!(
                f,
                "Would offload {:.0}% of weights (max {:.0}%)",
                offload_ratio * 100.0,
                MAX_OFFLOAD_RATIO * 100.0
            ),
            OffloadBlocker::InsufficientRam {
                needed_gb,
                available_gb,
            } => write!(
                f,
                "Offload needs {needed_gb:.1} GB system RAM, only {available_gb:.1} GB given"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum OffloadPlan {
    /// Weights fit in VRAM after the overhead reserve.
    OnDevice,
    Partial(OffloadSplit),
    Infeasible(OffloadBlocker),
}

impl OffloadPlan {
    pub fn is_feasible(&self) -> bool {
        !matches!(self, OffloadPlan::Infeasible(_))
    }

    pub fn offload_ratio(&self) -> Option<f64> {
        match self {
            OffloadPlan::OnDevice => Some(0.0),
            OffloadPlan::Partial(split) => Some(split.offload_ratio),
            OffloadPlan::Infeasible(_) => None,
        }
    }
}

/// Decide whether weights that overflow VRAM can be partly kept in system RAM.
pub fn plan_offload(model: &ModelRecord, vram_gb: f64, system_ram_gb: Option<f64>) -> OffloadPlan {
    let available_for_weights = vram_gb - OVERHEAD_GB;
    if model.weight_gb <= available_for_weights {
        return OffloadPlan::OnDevice;
    }
    let Some(ram_gb) = system_ram_gb else {
        return OffloadPlan::Infeasible(OffloadBlocker::NoSystemRam);
    };

    let gpu_weight_gb = available_for_weights.max(0.0);
    let ram_weight_gb = model.weight_gb - gpu_weight_gb;
    let offload_ratio = ram_weight_gb / model.weight_gb;

    if offload_ratio > MAX_OFFLOAD_RATIO {
        return OffloadPlan::Infeasible(OffloadBlocker::RatioTooHigh { offload_ratio });
    }
    if ram_weight_gb > ram_gb {
        return OffloadPlan::Infeasible(OffloadBlocker::InsufficientRam {
            needed_gb: ram_weight_gb,
            available_gb: ram_gb,
        });
    }

    OffloadPlan::Partial(OffloadSplit {
        gpu_weight_gb,
        ram_weight_gb,
        offload_ratio,
        estimated_layers: (offload_ratio * model.layers as f64).round() as u32,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OffloadPenalty {
    pub penalty_percent: u32,
    /// Factor applied to the on-device throughput estimate.
    pub speed_multiplier: f64,
}

/// Throughput cost of an offload ratio: a 15% floor rising linearly to a
/// 50% ceiling. Slower GPUs sit closer to system-RAM speed, so they lose
/// proportionally less.
pub fn offload_penalty(offload_ratio: f64, bandwidth_gbps: Option<f64>) -> OffloadPenalty {
    if offload_ratio <= 0.0 {
        return OffloadPenalty {
            penalty_percent: 0,
            speed_multiplier: 1.0,
        };
    }

    let base = (PENALTY_FLOOR + offload_ratio * PENALTY_SLOPE).min(PENALTY_CEILING);
    let scale = match bandwidth_gbps {
        Some(bw) if bw < 400.0 => 0.80,
        Some(bw) if bw < 700.0 => 0.90,
        _ => 1.0,
    };
    let penalty = base * scale;

    OffloadPenalty {
        penalty_percent: (penalty * 100.0).round() as u32,
        speed_multiplier: 1.0 - penalty,
    }
}

/// Context an offloaded model can still hold: the KV cache only gets the
/// VRAM overhead reserve.
fn offloaded_context_k(model: &ModelRecord) -> u32 {
    if model.kv_per_1k_gb <= 0.0 {
        return model.max_context_k;
    }
    kv_capacity_k(OVERHEAD_GB, model.kv_per_1k_gb).min(model.max_context_k)
}

// ────────────────────────────────────────────────────────────────────
// Bucketing
// ────────────────────────────────────────────────────────────────────

/// Hardware budget and user filters for one bucketing pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitRequest {
    pub vram_gb: f64,
    pub bandwidth_gbps: Option<f64>,
    pub min_context_k: Option<u32>,
    pub min_speed_tps: Option<f64>,
    pub required_features: Vec<Feature>,
    pub benchmark: Benchmark,
    pub system_ram_gb: Option<f64>,
}

impl FitRequest {
    pub fn new(vram_gb: f64, bandwidth_gbps: Option<f64>) -> Self {
        FitRequest {
            vram_gb,
            bandwidth_gbps,
            ..Default::default()
        }
    }

    pub fn with_min_context(mut self, min_context_k: Option<u32>) -> Self {
        self.min_context_k = min_context_k;
        self
    }

    pub fn with_min_speed(mut self, min_speed_tps: Option<f64>) -> Self {
        self.min_speed_tps = min_speed_tps;
        self
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.required_features = features;
        self
    }

    pub fn with_benchmark(mut self, benchmark: Benchmark) -> Self {
        self.benchmark = benchmark;
        self
    }

    pub fn with_system_ram(mut self, system_ram_gb: Option<f64>) -> Self {
        self.system_ram_gb = system_ram_gb;
        self
    }
}

/// Active weight offload attached to a model fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OffloadInfo {
    #[serde(flatten)]
    pub split: OffloadSplit,
    #[serde(flatten)]
    pub penalty: OffloadPenalty,
}

/// A catalog model evaluated against one [`FitRequest`].
#[derive(Debug, Clone, Serialize)]
pub struct ModelFit {
    pub model: ModelRecord,
    pub bucket: Bucket,
    /// Usable context in K tokens under this budget.
    pub max_context_k: u32,
    /// Weights plus 1K tokens of KV cache fit in VRAM.
    pub fits_in_vram: bool,
    pub meets_context: bool,
    pub meets_speed: bool,
    pub meets_features: bool,
    pub tokens_per_sec: Option<f64>,
    pub tier: Tier,
    pub offload: Option<OffloadInfo>,
    /// Present only when system RAM extends the usable context.
    pub context_extension: Option<ContextEstimate>,
    pub notes: Vec<String>,
}

impl ModelFit {
    pub fn analyze(model: &ModelRecord, request: &FitRequest) -> Self {
        let mut notes = Vec::new();
        let vram_gb = request.vram_gb;

        // Step 1: baseline fit, weights plus the smallest useful context
        let fits_in_vram = model.weight_gb + model.kv_per_1k_gb <= vram_gb;

        // Step 2: weight offload or KV-cache extension through system RAM
        let mut offload = None;
        let mut context_extension = None;
        let max_context_k = if fits_in_vram {
            let estimate = estimate_max_context_with_offload(model, vram_gb, request.system_ram_gb);
            if estimate.using_system_ram {
                notes.push(format!(
                    "Context extended to {}K: {}K in VRAM + {}K in system RAM",
                    estimate.context_k, estimate.vram_context_k, estimate.ram_context_k
                ));
                context_extension = Some(estimate);
            }
            estimate.context_k
        } else if request.system_ram_gb.is_some() {
            match plan_offload(model, vram_gb, request.system_ram_gb) {
                OffloadPlan::Partial(split) => {
                    let penalty = offload_penalty(split.offload_ratio, request.bandwidth_gbps);
                    notes.push(format!(
                        "Offloading {:.1} GB (~{} layers) to system RAM",
                        split.ram_weight_gb, split.estimated_layers
                    ));
                    notes.push(format!(
                        "Expect ~{}% lower speed than fully on-device",
                        penalty.penalty_percent
                    ));
                    offload = Some(OffloadInfo { split, penalty });
                    offloaded_context_k(model)
                }
                OffloadPlan::Infeasible(blocker) => {
                    notes.push(blocker.to_string());
                    estimate_max_context(model, vram_gb)
                }
                OffloadPlan::OnDevice => {
                    notes.push("Weights fit, but leave no room for 1K tokens of context".to_string());
                    estimate_max_context(model, vram_gb)
                }
            }
        } else {
            notes.push(format!(
                "Needs {:.1} GB VRAM for weights plus 1K context",
                model.weight_gb + model.kv_per_1k_gb
            ));
            estimate_max_context(model, vram_gb)
        };

        // Step 3: the architecture caps context no matter the hardware
        let context_reachable = request
            .min_context_k
            .is_none_or(|min| model.max_context_k >= min);
        if !context_reachable {
            notes.push(format!(
                "Architecture supports at most {}K context",
                model.max_context_k
            ));
        }
        let meets_context = request
            .min_context_k
            .is_none_or(|min| max_context_k >= min);

        // Step 4: speed, penalized by any active offload
        let base_tps = estimate_throughput(model, request.bandwidth_gbps);
        let tokens_per_sec = match &offload {
            Some(info) => base_tps.map(|tps| (tps * info.penalty.speed_multiplier).round()),
            None => base_tps,
        };
        let meets_speed = match (request.min_speed_tps, tokens_per_sec) {
            (Some(min), Some(tps)) => tps >= min,
            _ => true,
        };

        // Step 5: features
        let meets_features = request
            .required_features
            .iter()
            .all(|f| model.has_feature(*f));

        // Step 6: tier on the selected benchmark
        let tier = match request.benchmark {
            Benchmark::General => tier::classify_general_tier(model.mmlu_score),
            Benchmark::Coding => tier::classify_coding_tier(model.swe_bench_score),
        };

        let viable = fits_in_vram || offload.is_some();
        let bucket = if !viable || !context_reachable {
            Bucket::NoFit
        } else if offload.is_some() {
            // Offloading never counts as running well
            Bucket::Tight
        } else if !meets_context || !meets_speed || !meets_features {
            Bucket::Tight
        } else if max_context_k < TIGHT_CONTEXT_K {
            Bucket::Tight
        } else {
            Bucket::Fits
        };

        if viable && context_reachable {
            if !meets_context {
                notes.push(format!("Only {max_context_k}K context fits"));
            }
            if !meets_speed {
                notes.push("Below requested speed".to_string());
            }
            if !meets_features {
                notes.push("Missing requested features".to_string());
            }
        }

        ModelFit {
            model: model.clone(),
            bucket,
            max_context_k,
            fits_in_vram,
            meets_context,
            meets_speed,
            meets_features,
            tokens_per_sec,
            tier,
            offload,
            context_extension,
            notes,
        }
    }

    pub fn score(&self, benchmark: Benchmark) -> Option<f64> {
        self.model.score(benchmark)
    }
}

/// Output of [`bucket_catalog`], each list already ranked.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BucketedCatalog {
    pub fits: Vec<ModelFit>,
    pub tight: Vec<ModelFit>,
    pub no_fit: Vec<ModelFit>,
}

impl BucketedCatalog {
    pub fn len(&self) -> usize {
        self.fits.len() + self.tight.len() + self.no_fit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket(&self, bucket: Bucket) -> &[ModelFit] {
        match bucket {
            Bucket::Fits => &self.fits,
            Bucket::Tight => &self.tight,
            Bucket::NoFit => &self.no_fit,
        }
    }
}

/// Evaluate every model against the request, split into buckets, and rank
/// each bucket.
pub fn bucket_catalog(models: &[ModelRecord], request: &FitRequest) -> BucketedCatalog {
    let mut out = BucketedCatalog::default();
    for model in models {
        let fit = ModelFit::analyze(model, request);
        log::trace!(
            "{}: {:?} (ctx {}K, tps {:?})",
            model.id,
            fit.bucket,
            fit.max_context_k,
            fit.tokens_per_sec
        );
        match fit.bucket {
            Bucket::Fits => out.fits.push(fit),
            Bucket::Tight => out.tight.push(fit),
            Bucket::NoFit => out.no_fit.push(fit),
        }
    }

    let benchmark = request.benchmark;
    out.fits.sort_by(|a, b| rank_runnable(a, b, benchmark));
    out.tight.sort_by(|a, b| rank_runnable(a, b, benchmark));
    out.no_fit.sort_by(|a, b| rank_no_fit(a, b, benchmark));

    log::debug!(
        "bucketed {} models at {:.1} GB VRAM: {} fit, {} tight, {} no fit",
        models.len(),
        request.vram_gb,
        out.fits.len(),
        out.tight.len(),
        out.no_fit.len()
    );
    out
}

/// Higher score first; a missing score sorts last.
fn compare_score(a: &ModelFit, b: &ModelFit, benchmark: Benchmark) -> Ordering {
    match (a.score(benchmark), b.score(benchmark)) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn rank_runnable(a: &ModelFit, b: &ModelFit, benchmark: Benchmark) -> Ordering {
    compare_score(a, b, benchmark).then_with(|| b.max_context_k.cmp(&a.max_context_k))
}

/// Among models that don't fit, bigger ones (furthest from fitting) go first.
fn rank_no_fit(a: &ModelFit, b: &ModelFit, benchmark: Benchmark) -> Ordering {
    compare_score(a, b, benchmark).then_with(|| {
        b.model
            .weight_gb
            .partial_cmp(&a.model.weight_gb)
            .unwrap_or(Ordering::Equal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelCatalog, test_model};

    fn scenario_model() -> ModelRecord {
        test_model(8.99, 0.25, 128)
    }

    fn named(id: &str, weight_gb: f64, kv: f64, max_ctx: u32, mmlu: f64) -> ModelRecord {
        let mut m = test_model(weight_gb, kv, max_ctx);
        m.id = id.to_string();
        m.name = id.to_string();
        m.mmlu_score = mmlu;
        m
    }

    fn ids(fits: &[ModelFit]) -> Vec<&str> {
        fits.iter().map(|f| f.model.id.as_str()).collect()
    }

    // ────────────────────────────────────────────────────────────────────
    // estimate_max_context
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_context_scenarios() {
        let model = scenario_model();
        assert_eq!(estimate_max_context(&model, 24.0), 60);
        assert_eq!(estimate_max_context(&model, 12.0), 12);
    }

    #[test]
    fn test_context_zero_when_weights_fill_vram() {
        for weight in [0.67, 4.92, 8.99, 42.52] {
            let model = test_model(weight, 0.125, 128);
            for vram in [0.0, weight * 0.5, weight] {
                assert_eq!(estimate_max_context(&model, vram), 0);
            }
        }
        assert_eq!(estimate_max_context(&test_model(4.0, 0.0, 256), 2.0), 0);
    }

    #[test]
    fn test_context_zero_kv_is_unbounded_by_memory() {
        let model = test_model(4.41, 0.0, 256);
        for vram in [4.42, 8.0, 24.0, 192.0] {
            assert_eq!(estimate_max_context(&model, vram), 256);
        }
    }

    #[test]
    fn test_context_never_exceeds_model_max() {
        let model = test_model(2.0, 0.01, 32);
        for vram in 0..=200 {
            assert!(estimate_max_context(&model, vram as f64) <= 32);
        }
        assert_eq!(estimate_max_context(&model, 200.0), 32);
    }

    // ────────────────────────────────────────────────────────────────────
    // estimate_max_context_with_offload
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_context_offload_without_ram_matches_basic() {
        let model = scenario_model();
        let est = estimate_max_context_with_offload(&model, 12.0, None);
        assert_eq!(
            est,
            ContextEstimate {
                context_k: 12,
                vram_context_k: 12,
                ram_context_k: 0,
                using_system_ram: false,
            }
        );
    }

    #[test]
    fn test_context_offload_extends_into_ram() {
        let model = scenario_model();
        let est = estimate_max_context_with_offload(&model, 12.0, Some(16.0));
        assert_eq!(est.context_k, 76);
        assert_eq!(est.vram_context_k, 12);
        assert_eq!(est.ram_context_k, 64);
        assert!(est.using_system_ram);
    }

    #[test]
    fn test_context_offload_capped_at_model_max() {
        let model = scenario_model();
        let est = estimate_max_context_with_offload(&model, 12.0, Some(64.0));
        assert_eq!(est.context_k, 128);
        assert_eq!(est.vram_context_k, 12);
        assert_eq!(est.ram_context_k, 116);
        assert!(est.using_system_ram);
    }

    #[test]
    fn test_context_offload_unused_when_vram_reaches_cap() {
        let model = scenario_model();
        let est = estimate_max_context_with_offload(&model, 48.0, Some(64.0));
        assert_eq!(est.context_k, 128);
        assert_eq!(est.ram_context_k, 0);
        assert!(!est.using_system_ram);
    }

    #[test]
    fn test_context_offload_requires_weights_in_vram() {
        let model = scenario_model();
        let est = estimate_max_context_with_offload(&model, 8.0, Some(32.0));
        assert_eq!(est.context_k, 0);
        assert!(!est.using_system_ram);
    }

    // ────────────────────────────────────────────────────────────────────
    // estimate_throughput
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_throughput_scenario() {
        assert_eq!(estimate_throughput(&scenario_model(), Some(504.0)), Some(50.0));
    }

    #[test]
    fn test_throughput_unknown_bandwidth() {
        assert_eq!(estimate_throughput(&scenario_model(), None), None);
    }

    #[test]
    fn test_throughput_zero_bandwidth_is_zero_not_unknown() {
        assert_eq!(estimate_throughput(&scenario_model(), Some(0.0)), Some(0.0));
    }

    // ────────────────────────────────────────────────────────────────────
    // plan_offload / offload_penalty
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_plan_offload_scenario() {
        let plan = plan_offload(&scenario_model(), 8.0, Some(32.0));
        assert!(plan.is_feasible());
        let OffloadPlan::Partial(split) = plan else {
            panic!("expected partial offload, got {plan:?}");
        };
        assert!((split.offload_ratio - 0.221).abs() < 0.001);
        assert!((split.gpu_weight_gb - 7.0).abs() < 1e-9);
        assert!((split.ram_weight_gb - 1.99).abs() < 1e-9);
        assert_eq!(split.estimated_layers, 11);
    }

    #[test]
    fn test_plan_offload_on_device() {
        let plan = plan_offload(&scenario_model(), 10.0, None);
        assert_eq!(plan, OffloadPlan::OnDevice);
        assert_eq!(plan.offload_ratio(), Some(0.0));
    }

    #[test]
    fn test_plan_offload_infeasible_cases() {
        let model = scenario_model();
        assert_eq!(
            plan_offload(&model, 8.0, None),
            OffloadPlan::Infeasible(OffloadBlocker::NoSystemRam)
        );
        assert!(matches!(
            plan_offload(&model, 4.0, Some(64.0)),
            OffloadPlan::Infeasible(OffloadBlocker::RatioTooHigh { .. })
        ));
        assert!(matches!(
            plan_offload(&model, 8.0, Some(1.5)),
            OffloadPlan::Infeasible(OffloadBlocker::InsufficientRam { .. })
        ));
        // VRAM below the reserve puts every weight in RAM
        assert!(matches!(
            plan_offload(&test_model(0.67, 0.022, 2), 0.5, Some(64.0)),
            OffloadPlan::Infeasible(OffloadBlocker::RatioTooHigh { offload_ratio }) if offload_ratio == 1.0
        ));
    }

    #[test]
    fn test_penalty_zero_ratio_is_free() {
        for bw in [None, Some(100.0), Some(504.0), Some(1008.0)] {
            let penalty = offload_penalty(0.0, bw);
            assert_eq!(penalty.speed_multiplier, 1.0);
            assert_eq!(penalty.penalty_percent, 0);
        }
    }

    #[test]
    fn test_penalty_monotonic_and_capped() {
        for bw in [None, Some(272.0), Some(504.0), Some(1008.0)] {
            let mut last = 0.0;
            for step in 0..=100 {
                let ratio = step as f64 / 100.0;
                let penalty = 1.0 - offload_penalty(ratio, bw).speed_multiplier;
                assert!(penalty >= last - 1e-12, "ratio {ratio} bw {bw:?}");
                assert!(penalty <= 0.5 + 1e-12);
                last = penalty;
            }
        }
    }

    #[test]
    fn test_penalty_bandwidth_scaling() {
        let fast = offload_penalty(0.5, Some(1008.0));
        assert_eq!(fast.penalty_percent, 50);
        assert!((fast.speed_multiplier - 0.5).abs() < 1e-9);

        let mid = offload_penalty(0.5, Some(504.0));
        assert_eq!(mid.penalty_percent, 45);

        let slow = offload_penalty(0.5, Some(272.0));
        assert_eq!(slow.penalty_percent, 40);

        let floor = offload_penalty(0.01, Some(1008.0));
        assert_eq!(floor.penalty_percent, 16);
    }

    // ────────────────────────────────────────────────────────────────────
    // ModelFit::analyze / bucket_catalog
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_fits_when_everything_met() {
        let model = test_model(4.92, 0.125, 128);
        let fit = ModelFit::analyze(&model, &FitRequest::new(24.0, Some(1008.0)));
        assert_eq!(fit.bucket, Bucket::Fits);
        assert_eq!(fit.max_context_k, 128);
        assert_eq!(fit.tokens_per_sec, Some(170.0));
        assert_eq!(fit.tier, Tier::Good);
        assert!(fit.offload.is_none());
        assert!(fit.context_extension.is_none());
    }

    #[test]
    fn test_offload_is_always_tight() {
        let model = scenario_model();
        let request = FitRequest::new(8.0, Some(272.0)).with_system_ram(Some(32.0));
        let fit = ModelFit::analyze(&model, &request);
        assert_eq!(fit.bucket, Bucket::Tight);
        let info = fit.offload.expect("offload plan should be attached");
        assert_eq!(info.penalty.penalty_percent, 24);
        // round(272 / 9.99) = 27, then x0.756
        assert_eq!(fit.tokens_per_sec, Some(20.0));
        assert_eq!(fit.max_context_k, 4);
        assert!(fit.notes.iter().any(|n| n.contains("system RAM")));
    }

    #[test]
    fn test_no_fit_without_ram() {
        let fit = ModelFit::analyze(&scenario_model(), &FitRequest::new(8.0, Some(272.0)));
        assert_eq!(fit.bucket, Bucket::NoFit);
        assert!(!fit.fits_in_vram);
        assert!(fit.offload.is_none());
    }

    #[test]
    fn test_no_fit_when_weights_fit_but_no_kv_room() {
        let model = test_model(8.5, 1.6, 32);
        let request = FitRequest::new(10.0, None).with_system_ram(Some(32.0));
        let fit = ModelFit::analyze(&model, &request);
        assert_eq!(fit.bucket, Bucket::NoFit);
    }

    #[test]
    fn test_architectural_context_overrides_vram() {
        let model = test_model(5.76, 0.34, 8);
        for vram in [8.0, 24.0, 80.0, 512.0] {
            let request = FitRequest::new(vram, Some(1008.0)).with_min_context(Some(32));
            assert_eq!(ModelFit::analyze(&model, &request).bucket, Bucket::NoFit);
        }
    }

    #[test]
    fn test_min_context_unmet_is_tight_then_extended_by_ram() {
        let model = scenario_model();
        let request = FitRequest::new(12.0, Some(504.0)).with_min_context(Some(32));
        let fit = ModelFit::analyze(&model, &request);
        assert_eq!(fit.bucket, Bucket::Tight);
        assert!(!fit.meets_context);

        let fit = ModelFit::analyze(&model, &request.with_system_ram(Some(16.0)));
        assert_eq!(fit.bucket, Bucket::Fits);
        assert_eq!(fit.max_context_k, 76);
        let ext = fit.context_extension.expect("context extension");
        assert_eq!(ext.ram_context_k, 64);
    }

    #[test]
    fn test_min_speed() {
        let model = scenario_model();
        let slow = FitRequest::new(24.0, Some(504.0)).with_min_speed(Some(60.0));
        let fit = ModelFit::analyze(&model, &slow);
        assert_eq!(fit.bucket, Bucket::Tight);
        assert!(!fit.meets_speed);

        let unknown = FitRequest::new(24.0, None).with_min_speed(Some(60.0));
        let fit = ModelFit::analyze(&model, &unknown);
        assert_eq!(fit.tokens_per_sec, None);
        assert_eq!(fit.bucket, Bucket::Fits);
    }

    #[test]
    fn test_required_features() {
        let mut model = scenario_model();
        let request = FitRequest::new(24.0, Some(1008.0)).with_features(vec![Feature::Vision]);
        assert_eq!(ModelFit::analyze(&model, &request).bucket, Bucket::Tight);

        model.features = vec![Feature::Vision, Feature::ToolUse];
        assert_eq!(ModelFit::analyze(&model, &request).bucket, Bucket::Fits);
        assert_eq!(
            ModelFit::analyze(&model, &FitRequest::new(24.0, None)).bucket,
            Bucket::Fits
        );
    }

    #[test]
    fn test_short_context_is_tight() {
        let model = test_model(0.67, 0.022, 2);
        let fit = ModelFit::analyze(&model, &FitRequest::new(8.0, Some(272.0)));
        assert_eq!(fit.max_context_k, 2);
        assert_eq!(fit.bucket, Bucket::Tight);
    }

    #[test]
    fn test_coding_benchmark_tier() {
        let mut model = scenario_model();
        let request = FitRequest::new(24.0, None).with_benchmark(Benchmark::Coding);
        assert_eq!(ModelFit::analyze(&model, &request).tier, Tier::NotAvailable);
        model.swe_bench_score = Some(23.2);
        assert_eq!(ModelFit::analyze(&model, &request).tier, Tier::Great);
    }

    #[test]
    fn test_bucket_sorting() {
        let models = vec![
            named("mid-short", 4.0, 0.5, 128, 70.0),
            named("best", 4.0, 0.125, 128, 80.0),
            named("mid-long", 4.0, 0.125, 128, 70.0),
            named("small-nofit", 30.0, 0.1, 128, 60.0),
            named("big-nofit", 60.0, 0.1, 128, 60.0),
            named("top-nofit", 40.0, 0.1, 128, 90.0),
        ];
        let out = bucket_catalog(&models, &FitRequest::new(12.0, Some(504.0)));

        assert_eq!(ids(&out.fits), vec!["best", "mid-long", "mid-short"]);
        assert!(out.tight.is_empty());
        assert_eq!(ids(&out.no_fit), vec!["top-nofit", "big-nofit", "small-nofit"]);
    }

    #[test]
    fn test_coding_sort_puts_missing_scores_last() {
        let mut scored = named("scored", 4.0, 0.125, 128, 60.0);
        scored.swe_bench_score = Some(10.0);
        let mut high_mmlu = named("unscored", 4.0, 0.125, 128, 90.0);
        high_mmlu.swe_bench_score = None;
        let mut top = named("top", 4.0, 0.125, 128, 50.0);
        top.swe_bench_score = Some(40.0);

        let request = FitRequest::new(24.0, None).with_benchmark(Benchmark::Coding);
        let out = bucket_catalog(&[high_mmlu, scored, top], &request);
        assert_eq!(ids(&out.fits), vec!["top", "scored", "unscored"]);
    }

    #[test]
    fn test_bucket_catalog_partitions_embedded_catalog() {
        let catalog = ModelCatalog::embedded();
        for (vram, ram) in [(8.0, None), (8.0, Some(32.0)), (24.0, Some(64.0)), (192.0, None)] {
            let request = FitRequest::new(vram, Some(800.0))
                .with_system_ram(ram)
                .with_min_context(Some(8));
            let out = bucket_catalog(catalog.all(), &request);
            assert_eq!(out.len(), catalog.all().len());
            for fit in &out.fits {
                assert!(fit.offload.is_none(), "{} offloaded but fits", fit.model.id);
                assert!(fit.max_context_k >= TIGHT_CONTEXT_K);
            }
            for fit in &out.no_fit {
                assert_eq!(fit.bucket, Bucket::NoFit);
            }
        }
    }

    #[test]
    fn test_offloaded_models_never_fit() {
        let catalog = ModelCatalog::embedded();
        for vram in [4.0, 8.0, 12.0, 16.0, 24.0, 48.0] {
            let request = FitRequest::new(vram, Some(1008.0)).with_system_ram(Some(128.0));
            let out = bucket_catalog(catalog.all(), &request);
            assert!(out.fits.iter().all(|f| f.offload.is_none()));
            assert!(out.tight.iter().chain(out.no_fit.iter()).all(|f| {
                f.offload
                    .is_none_or(|info| info.split.offload_ratio > 0.0 && f.bucket == Bucket::Tight)
            }));
        }
    }
}
