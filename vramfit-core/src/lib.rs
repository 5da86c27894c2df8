//! Compatibility and ranking engine for running quantized LLMs on a GPU
//! budget.
//!
//! Everything here is a pure, synchronous function over in-memory records:
//! pool multi-GPU resources, estimate usable context and decode speed, plan
//! weight offload to system RAM, then bucket and rank a model catalog and
//! group its quantization variants.

pub mod error;
pub mod fit;
pub mod group;
pub mod hardware;
pub mod models;
pub mod tier;

pub use error::CatalogError;
pub use fit::{
    Bucket, BucketedCatalog, ContextEstimate, FitRequest, ModelFit, OffloadBlocker, OffloadInfo,
    OffloadPenalty, OffloadPlan, OffloadSplit, bucket_catalog, estimate_max_context,
    estimate_max_context_with_offload, estimate_throughput, offload_penalty, plan_offload,
};
pub use group::{ModelGroup, group_variants};
pub use hardware::{
    GpuCatalog, GpuMemory, GpuRecord, MemoryOption, ScaledResources, SystemMemory,
    parse_memory_size, scale_resources,
};
pub use models::{Feature, ModelCatalog, ModelRecord, Quantization};
pub use tier::{Benchmark, Tier, classify_coding_tier, classify_general_tier};
