use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::error::CatalogError;

/// Largest number of identical GPUs a rig can pool.
pub const MAX_GPU_COUNT: u32 = 8;

/// One VRAM/bandwidth configuration of a unified-memory chip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryOption {
    pub vram_gb: f64,
    pub bandwidth_gbps: f64,
}

/// Memory layout of a GPU record. The two shapes are told apart by which
/// fields are present in the JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GpuMemory {
    /// Dedicated card with a single VRAM size.
    Discrete { vram_gb: f64, bandwidth_gbps: f64 },
    /// Unified-memory chip sold in several sizes, ordered by VRAM.
    Unified { options: Vec<MemoryOption> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(flatten)]
    pub memory: GpuMemory,
}

impl GpuRecord {
    pub fn is_unified(&self) -> bool {
        matches!(self.memory, GpuMemory::Unified { .. })
    }

    /// Per-unit memory for this GPU. `option` picks a unified-memory
    /// configuration (default: the largest); discrete cards ignore it.
    pub fn resolve(&self, option: Option<usize>) -> Result<MemoryOption, CatalogError> {
        match &self.memory {
            GpuMemory::Discrete {
                vram_gb,
                bandwidth_gbps,
            } => Ok(MemoryOption {
                vram_gb: *vram_gb,
                bandwidth_gbps: *bandwidth_gbps,
            }),
            GpuMemory::Unified { options } => {
                let index = option.unwrap_or(options.len().saturating_sub(1));
                options
                    .get(index)
                    .copied()
                    .ok_or_else(|| CatalogError::NoSuchOption {
                        id: self.id.clone(),
                        index,
                        count: options.len(),
                    })
            }
        }
    }
}

const GPUS_JSON: &str = include_str!("../data/gpus.json");

#[derive(Debug, Clone)]
pub struct GpuCatalog {
    gpus: Vec<GpuRecord>,
}

impl Default for GpuCatalog {
    fn default() -> Self {
        Self::embedded()
    }
}

impl GpuCatalog {
    pub fn embedded() -> Self {
        let gpus: Vec<GpuRecord> =
            serde_json::from_str(GPUS_JSON).expect("Failed to parse embedded gpus.json");
        GpuCatalog { gpus }
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let gpus: Vec<GpuRecord> = serde_json::from_str(json)?;
        let catalog = GpuCatalog { gpus };
        if let Err(e) = catalog.validate() {
            log::warn!("rejecting GPU catalog: {e}");
            return Err(e);
        }
        Ok(catalog)
    }

    pub fn all(&self) -> &[GpuRecord] {
        &self.gpus
    }

    pub fn by_id(&self, id: &str) -> Option<&GpuRecord> {
        self.gpus.iter().find(|g| g.id == id)
    }

    /// Exact id match wins; otherwise case-insensitive substring on id or name.
    pub fn find(&self, query: &str) -> Vec<&GpuRecord> {
        if let Some(exact) = self.by_id(query) {
            return vec![exact];
        }
        let query_lower = query.to_lowercase();
        self.gpus
            .iter()
            .filter(|g| {
                g.id.to_lowercase().contains(&query_lower)
                    || g.name.to_lowercase().contains(&query_lower)
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for g in &self.gpus {
            if !seen.insert(g.id.as_str()) {
                return Err(CatalogError::DuplicateId(g.id.clone()));
            }
            match &g.memory {
                GpuMemory::Discrete {
                    vram_gb,
                    bandwidth_gbps,
                } => {
                    check_range(&g.id, "vram_gb", *vram_gb, 1.0, 256.0, "[1, 256]")?;
                    check_range(
                        &g.id,
                        "bandwidth_gbps",
                        *bandwidth_gbps,
                        50.0,
                        2000.0,
                        "[50, 2000]",
                    )?;
                }
                GpuMemory::Unified { options } => {
                    if options.is_empty()
                        || options.windows(2).any(|w| w[0].vram_gb >= w[1].vram_gb)
                    {
                        return Err(CatalogError::UnorderedOptions(g.id.clone()));
                    }
                    for opt in options {
                        check_range(
                            &g.id,
                            "vram_gb",
                            opt.vram_gb,
                            f64::MIN_POSITIVE,
                            512.0,
                            "(0, 512]",
                        )?;
                        check_range(
                            &g.id,
                            "bandwidth_gbps",
                            opt.bandwidth_gbps,
                            f64::MIN_POSITIVE,
                            2000.0,
                            "(0, 2000]",
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_range(
    id: &str,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
    range: &'static str,
) -> Result<(), CatalogError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CatalogError::OutOfRange {
            id: id.to_string(),
            field,
            value,
            range,
        })
    }
}

// ────────────────────────────────────────────────────────────────────
// Multi-GPU scaling
// ────────────────────────────────────────────────────────────────────

/// Pooled resources across identical GPUs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaledResources {
    pub vram_gb: f64,
    /// `None` when the per-unit bandwidth is unknown.
    pub bandwidth_gbps: Option<f64>,
}

/// Fraction of summed bandwidth that survives cross-device traffic.
fn multi_gpu_efficiency(count: u32) -> f64 {
    match count {
        0 | 1 => 1.0,
        2 => 0.85,
        3 => 0.75,
        _ => 0.70,
    }
}

/// Pool VRAM and bandwidth over `count` identical GPUs.
///
/// VRAM adds up exactly. Bandwidth adds up too, but loses a growing share
/// to inter-device communication as more cards join. A missing or single
/// count passes the inputs through untouched.
pub fn scale_resources(
    vram_gb: f64,
    bandwidth_gbps: Option<f64>,
    count: Option<u32>,
) -> ScaledResources {
    let count = count.unwrap_or(1).clamp(1, MAX_GPU_COUNT);
    if count == 1 {
        return ScaledResources {
            vram_gb,
            bandwidth_gbps,
        };
    }
    let n = count as f64;
    ScaledResources {
        vram_gb: vram_gb * n,
        bandwidth_gbps: bandwidth_gbps.map(|bw| (bw * n * multi_gpu_efficiency(count)).round()),
    }
}

// ────────────────────────────────────────────────────────────────────
// System memory
// ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SystemMemory {
    pub total_ram_gb: f64,
    pub available_ram_gb: f64,
}

impl SystemMemory {
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let total_bytes = sys.total_memory();
        let total_ram_gb = bytes_to_gb(total_bytes);
        let available_bytes = sys.available_memory();
        let available_ram_gb = if available_bytes == 0 && total_bytes > 0 {
            // sysinfo reports 0 available on some newer macOS releases
            let used = sys.used_memory();
            if used > 0 && used < total_bytes {
                bytes_to_gb(total_bytes - used)
            } else {
                total_ram_gb * 0.8
            }
        } else {
            bytes_to_gb(available_bytes)
        };

        log::debug!("detected {total_ram_gb:.1} GB RAM, {available_ram_gb:.1} GB available");
        SystemMemory {
            total_ram_gb,
            available_ram_gb,
        }
    }
}

fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

/// Parse a memory size string like "24G", "24000M", "1.5T" into GB.
pub fn parse_memory_size(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let num_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num_str, suffix) = s.split_at(num_end);
    let value: f64 = num_str.parse().ok()?;

    let suffix = suffix.trim().to_lowercase();
    match suffix.as_str() {
        "g" | "gb" | "gib" | "" => Some(value),
        "m" | "mb" | "mib" => Some(value / 1024.0),
        "t" | "tb" | "tib" => Some(value * 1024.0),
        _ => None,
    }
}
