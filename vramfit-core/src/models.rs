use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::tier::Benchmark;

/// Weight encodings a catalog record can carry, from most compressed to
/// full half-precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quantization {
    #[serde(rename = "Q4_K_M")]
    Q4,
    #[serde(rename = "Q5_K_M")]
    Q5,
    #[serde(rename = "Q6_K")]
    Q6,
    #[serde(rename = "Q8_0")]
    Q8,
    #[serde(rename = "F16")]
    F16,
}

impl Quantization {
    pub fn label(&self) -> &'static str {
        match self {
            Quantization::Q4 => "Q4_K_M",
            Quantization::Q5 => "Q5_K_M",
            Quantization::Q6 => "Q6_K",
            Quantization::Q8 => "Q8_0",
            Quantization::F16 => "F16",
        }
    }

    /// Position in the precision ladder (0 = lowest precision).
    pub fn precision_rank(&self) -> u8 {
        match self {
            Quantization::Q4 => 0,
            Quantization::Q5 => 1,
            Quantization::Q6 => 2,
            Quantization::Q8 => 3,
            Quantization::F16 => 4,
        }
    }
}

/// Capability tags. The vocabulary is closed; unknown tags fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    Vision,
    Reasoning,
    ToolUse,
    Coding,
    Multilingual,
    LongContext,
}

impl Feature {
    pub const ALL: &'static [Feature] = &[
        Feature::Vision,
        Feature::Reasoning,
        Feature::ToolUse,
        Feature::Coding,
        Feature::Multilingual,
        Feature::LongContext,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Feature::Vision => "vision",
            Feature::Reasoning => "reasoning",
            Feature::ToolUse => "tool-use",
            Feature::Coding => "coding",
            Feature::Multilingual => "multilingual",
            Feature::LongContext => "long-context",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase().replace('_', "-");
        Feature::ALL.iter().copied().find(|f| f.label() == s)
    }
}

/// One quantized build of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    /// Family name shared by all quantization variants of the same model.
    pub name: String,
    pub params_b: f64,
    pub quantization: Quantization,
    pub weight_gb: f64,
    /// GB of KV cache per 1,000 tokens. Zero means context is not memory-bound.
    pub kv_per_1k_gb: f64,
    /// Architectural context ceiling, in thousands of tokens.
    pub max_context_k: u32,
    #[serde(default)]
    pub layers: u32,
    pub mmlu_score: f64,
    #[serde(default)]
    pub swe_bench_score: Option<f64>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub notes: String,
}

impl ModelRecord {
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Benchmark score backing the given selector. Coding scores may be absent.
    pub fn score(&self, benchmark: Benchmark) -> Option<f64> {
        match benchmark {
            Benchmark::General => Some(self.mmlu_score),
            Benchmark::Coding => self.swe_bench_score,
        }
    }
}

const MODELS_JSON: &str = include_str!("../data/models.json");

/// The model catalog the engine ranks.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelRecord>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::embedded()
    }
}

impl ModelCatalog {
    /// Catalog compiled into the binary. Its validity is covered by tests.
    pub fn embedded() -> Self {
        let models: Vec<ModelRecord> =
            serde_json::from_str(MODELS_JSON).expect("Failed to parse embedded models.json");
        ModelCatalog { models }
    }

    /// Parse and validate a caller-supplied catalog.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let models: Vec<ModelRecord> = serde_json::from_str(json)?;
        Self::from_records(models)
    }

    pub fn from_records(models: Vec<ModelRecord>) -> Result<Self, CatalogError> {
        let catalog = ModelCatalog { models };
        if let Err(e) = catalog.validate() {
            log::warn!("rejecting model catalog: {e}");
            return Err(e);
        }
        Ok(catalog)
    }

    pub fn all(&self) -> &[ModelRecord] {
        &self.models
    }

    pub fn by_id(&self, id: &str) -> Option<&ModelRecord> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Case-insensitive substring match on id or family name.
    pub fn find(&self, query: &str) -> Vec<&ModelRecord> {
        let query_lower = query.to_lowercase();
        self.models
            .iter()
            .filter(|m| {
                m.id.to_lowercase().contains(&query_lower)
                    || m.name.to_lowercase().contains(&query_lower)
            })
            .collect()
    }

    /// Check the record invariants the engine consumes without re-checking.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for m in &self.models {
            if !seen.insert(m.id.as_str()) {
                return Err(CatalogError::DuplicateId(m.id.clone()));
            }
            validate_record(m)?;
        }

        let mut families: BTreeMap<&str, Vec<&ModelRecord>> = BTreeMap::new();
        for m in &self.models {
            families.entry(m.name.as_str()).or_default().push(m);
        }
        for (name, variants) in families {
            validate_family(name, variants)?;
        }
        Ok(())
    }
}

fn check_range(
    id: &str,
    field: &'static str,
    value: f64,
    ok: bool,
    range: &'static str,
) -> Result<(), CatalogError> {
    if ok {
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

fn validate_record(m: &ModelRecord) -> Result<(), CatalogError> {
    let id = m.id.as_str();
    check_range(id, "params_b", m.params_b, m.params_b > 0.0, "(0, inf)")?;
    check_range(
        id,
        "weight_gb",
        m.weight_gb,
        m.weight_gb > 0.1 && m.weight_gb <= 200.0,
        "(0.1, 200]",
    )?;
    check_range(
        id,
        "kv_per_1k_gb",
        m.kv_per_1k_gb,
        (0.0..=2.0).contains(&m.kv_per_1k_gb),
        "[0, 2]",
    )?;
    check_range(
        id,
        "max_context_k",
        m.max_context_k as f64,
        m.max_context_k > 0,
        "(0, inf)",
    )?;
    check_range(
        id,
        "mmlu_score",
        m.mmlu_score,
        (0.0..=100.0).contains(&m.mmlu_score),
        "[0, 100]",
    )?;
    if let Some(swe) = m.swe_bench_score {
        check_range(
            id,
            "swe_bench_score",
            swe,
            (0.0..=100.0).contains(&swe),
            "[0, 100]",
        )?;
    }

    let unique: HashSet<_> = m.features.iter().collect();
    if unique.len() != m.features.len() {
        return Err(CatalogError::DuplicateFeature(m.id.clone()));
    }
    Ok(())
}

fn validate_family(name: &str, mut variants: Vec<&ModelRecord>) -> Result<(), CatalogError> {
    let mismatch = |field| CatalogError::VariantMismatch {
        name: name.to_string(),
        field,
    };

    let first = variants[0];
    let mut first_features = first.features.clone();
    first_features.sort();
    for v in &variants[1..] {
        if v.params_b != first.params_b {
            return Err(mismatch("params_b"));
        }
        if v.max_context_k != first.max_context_k {
            return Err(mismatch("max_context_k"));
        }
        if v.mmlu_score != first.mmlu_score {
            return Err(mismatch("mmlu_score"));
        }
        if v.kv_per_1k_gb != first.kv_per_1k_gb {
            return Err(mismatch("kv_per_1k_gb"));
        }
        let mut features = v.features.clone();
        features.sort();
        if features != first_features {
            return Err(mismatch("features"));
        }
    }

    variants.sort_by_key(|v| v.quantization.precision_rank());
    for pair in variants.windows(2) {
        let (lower, higher) = (pair[0], pair[1]);
        if lower.quantization == higher.quantization {
            return Err(mismatch("quantization"));
        }
        if lower.weight_gb >= higher.weight_gb {
            return Err(CatalogError::WeightOrder {
                name: name.to_string(),
                lower: lower.id.clone(),
                higher: higher.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_model(weight_gb: f64, kv_per_1k_gb: f64, max_context_k: u32) -> ModelRecord {
    ModelRecord {
        id: format!("test-{weight_gb}"),
        name: "Test Model".to_string(),
        params_b: 14.8,
        quantization: Quantization::Q4,
        weight_gb,
        kv_per_1k_gb,
        max_context_k,
        layers: 48,
        mmlu_score: 70.0,
        swe_bench_score: None,
        features: vec![],
        notes: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: &str, quant: Quantization, weight_gb: f64) -> ModelRecord {
        let mut m = test_model(weight_gb, 0.125, 128);
        m.id = id.to_string();
        m.quantization = quant;
        m
    }

    // ────────────────────────────────────────────────────────────────────
    // Embedded catalog
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_embedded_catalog_is_valid() {
        let catalog = ModelCatalog::embedded();
        assert!(!catalog.all().is_empty());
        catalog.validate().unwrap();
    }

    #[test]
    fn test_embedded_catalog_has_variants_and_zero_kv_model() {
        let catalog = ModelCatalog::embedded();
        let llama: Vec<_> = catalog
            .all()
            .iter()
            .filter(|m| m.name == "Llama 3.1 8B Instruct")
            .collect();
        assert!(llama.len() > 1);
        assert!(catalog.all().iter().any(|m| m.kv_per_1k_gb == 0.0));
        assert!(catalog.all().iter().any(|m| m.swe_bench_score.is_none()));
    }

    #[test]
    fn test_find_model_case_insensitive() {
        let catalog = ModelCatalog::embedded();
        let results = catalog.find("llama");
        assert!(!results.is_empty());
        assert_eq!(results.len(), catalog.find("LLAMA").len());
        assert!(catalog.by_id("llama-3.1-8b-q4").is_some());
        assert!(catalog.by_id("nope").is_none());
    }

    // ────────────────────────────────────────────────────────────────────
    // Parsing
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_defaults_optional_fields() {
        let json = r#"[{
            "id": "m-q4", "name": "M", "params_b": 7.0, "quantization": "Q4_K_M",
            "weight_gb": 4.2, "kv_per_1k_gb": 0.1, "max_context_k": 32, "mmlu_score": 60.0
        }]"#;
        let catalog = ModelCatalog::from_json_str(json).unwrap();
        let m = &catalog.all()[0];
        assert_eq!(m.layers, 0);
        assert!(m.features.is_empty());
        assert_eq!(m.swe_bench_score, None);
        assert_eq!(m.notes, "");
    }

    #[test]
    fn test_parse_features_and_quant_labels() {
        let json = r#"[{
            "id": "m-q8", "name": "M", "params_b": 7.0, "quantization": "Q8_0",
            "weight_gb": 7.7, "kv_per_1k_gb": 0.1, "max_context_k": 32, "mmlu_score": 60.0,
            "swe_bench_score": null, "features": ["tool-use", "long-context"]
        }]"#;
        let catalog = ModelCatalog::from_json_str(json).unwrap();
        let m = &catalog.all()[0];
        assert_eq!(m.quantization, Quantization::Q8);
        assert!(m.has_feature(Feature::ToolUse));
        assert!(m.has_feature(Feature::LongContext));
        assert!(!m.has_feature(Feature::Vision));
    }

    #[test]
    fn test_parse_rejects_unknown_feature() {
        let json = r#"[{
            "id": "m", "name": "M", "params_b": 7.0, "quantization": "Q4_K_M",
            "weight_gb": 4.2, "kv_per_1k_gb": 0.1, "max_context_k": 32, "mmlu_score": 60.0,
            "features": ["telepathy"]
        }]"#;
        assert!(matches!(
            ModelCatalog::from_json_str(json),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_feature_parse() {
        assert_eq!(Feature::parse("tool_use"), Some(Feature::ToolUse));
        assert_eq!(Feature::parse(" Vision "), Some(Feature::Vision));
        assert_eq!(Feature::parse("flight"), None);
    }

    // ────────────────────────────────────────────────────────────────────
    // Validation
    // ────────────────────────────────────────────────────────────────────

    #[test]
    fn test_validate_rejects_duplicate_id() {
        let a = variant("dup", Quantization::Q4, 4.0);
        let b = variant("dup", Quantization::Q8, 8.0);
        assert!(matches!(
            ModelCatalog::from_records(vec![a, b]),
            Err(CatalogError::DuplicateId(id)) if id == "dup"
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_fields() {
        let mut m = variant("a", Quantization::Q4, 0.05);
        assert!(matches!(
            ModelCatalog::from_records(vec![m.clone()]),
            Err(CatalogError::OutOfRange { field: "weight_gb", .. })
        ));

        m.weight_gb = 4.0;
        m.kv_per_1k_gb = 2.5;
        assert!(matches!(
            ModelCatalog::from_records(vec![m.clone()]),
            Err(CatalogError::OutOfRange { field: "kv_per_1k_gb", .. })
        ));

        m.kv_per_1k_gb = 0.1;
        m.swe_bench_score = Some(101.0);
        assert!(matches!(
            ModelCatalog::from_records(vec![m]),
            Err(CatalogError::OutOfRange { field: "swe_bench_score", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_feature() {
        let mut m = variant("a", Quantization::Q4, 4.0);
        m.features = vec![Feature::Vision, Feature::Vision];
        assert!(matches!(
            ModelCatalog::from_records(vec![m]),
            Err(CatalogError::DuplicateFeature(_))
        ));
    }

    #[test]
    fn test_validate_rejects_variant_mismatch() {
        let a = variant("a", Quantization::Q4, 4.0);
        let mut b = variant("b", Quantization::Q8, 8.0);
        b.max_context_k = 64;
        assert!(matches!(
            ModelCatalog::from_records(vec![a, b]),
            Err(CatalogError::VariantMismatch { field: "max_context_k", .. })
        ));
    }

    #[test]
    fn test_validate_accepts_feature_order_difference() {
        let mut a = variant("a", Quantization::Q4, 4.0);
        let mut b = variant("b", Quantization::Q8, 8.0);
        a.features = vec![Feature::Vision, Feature::ToolUse];
        b.features = vec![Feature::ToolUse, Feature::Vision];
        assert!(ModelCatalog::from_records(vec![a, b]).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_monotonic_weight() {
        let a = variant("a", Quantization::Q4, 9.0);
        let b = variant("b", Quantization::Q8, 8.0);
        assert!(matches!(
            ModelCatalog::from_records(vec![b, a]),
            Err(CatalogError::WeightOrder { lower, higher, .. }) if lower == "a" && higher == "b"
        ));
    }

    #[test]
    fn test_score_by_benchmark() {
        let mut m = variant("a", Quantization::Q4, 4.0);
        assert_eq!(m.score(Benchmark::General), Some(70.0));
        assert_eq!(m.score(Benchmark::Coding), None);
        m.swe_bench_score = Some(12.5);
        assert_eq!(m.score(Benchmark::Coding), Some(12.5));
    }
}
