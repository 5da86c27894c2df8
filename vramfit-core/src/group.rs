use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::fit::ModelFit;
use crate::models::Feature;
use crate::tier::Tier;

/// All quantization variants of one model family within a bucket.
#[derive(Debug, Clone, Serialize)]
pub struct ModelGroup {
    pub name: String,
    pub params_b: f64,
    pub tier: Tier,
    pub mmlu_score: f64,
    pub swe_bench_score: Option<f64>,
    pub features: Vec<Feature>,
    /// Lightest variant first.
    pub variants: Vec<ModelFit>,
}

impl ModelGroup {
    fn from_first(fit: &ModelFit) -> Self {
        ModelGroup {
            name: fit.model.name.clone(),
            params_b: fit.model.params_b,
            tier: fit.tier,
            mmlu_score: fit.model.mmlu_score,
            swe_bench_score: fit.model.swe_bench_score,
            features: fit.model.features.clone(),
            variants: vec![fit.clone()],
        }
    }

    /// Heaviest (highest precision) variant in the group.
    pub fn best_variant(&self) -> Option<&ModelFit> {
        self.variants.last()
    }
}

/// Collapse a ranked list into one group per model name.
///
/// Groups keep the order in which each name first appears, so a bucket's
/// ranking carries over. Shared metadata comes from the first-seen variant.
pub fn group_variants(entries: &[ModelFit]) -> Vec<ModelGroup> {
    let mut groups: Vec<ModelGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        match index.get(entry.model.name.as_str()).copied() {
            Some(i) => groups[i].variants.push(entry.clone()),
            None => {
                index.insert(entry.model.name.as_str(), groups.len());
                groups.push(ModelGroup::from_first(entry));
            }
        }
    }

    for group in &mut groups {
        group.variants.sort_by(|a, b| {
            a.model
                .weight_gb
                .partial_cmp(&b.model.weight_gb)
                .unwrap_or(Ordering::Equal)
        });
    }
    groups
}
