use serde::{Deserialize, Serialize};

/// Which benchmark drives tiering and ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Benchmark {
    /// MMLU-style general knowledge.
    #[default]
    General,
    /// SWE-bench-style coding tasks.
    Coding,
}

impl Benchmark {
    pub fn label(&self) -> &'static str {
        match self {
            Benchmark::General => "MMLU",
            Benchmark::Coding => "SWE-bench",
        }
    }
}

/// Discrete quality label derived from a single benchmark score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Excellent,
    Great,
    Good,
    Fair,
    Basic,
    /// No score available for the selected benchmark.
    NotAvailable,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Excellent => "Excellent",
            Tier::Great => "Great",
            Tier::Good => "Good",
            Tier::Fair => "Fair",
            Tier::Basic => "Basic",
            Tier::NotAvailable => "N/A",
        }
    }

    /// Stable token front ends can hang styling on.
    pub fn style_class(&self) -> &'static str {
        match self {
            Tier::Excellent => "tier-excellent",
            Tier::Great => "tier-great",
            Tier::Good => "tier-good",
            Tier::Fair => "tier-fair",
            Tier::Basic => "tier-basic",
            Tier::NotAvailable => "tier-na",
        }
    }
}

/// General-knowledge scale (0-100).
pub fn classify_general_tier(score: f64) -> Tier {
    if score >= 83.0 {
        Tier::Excellent
    } else if score >= 75.0 {
        Tier::Great
    } else if score >= 67.0 {
        Tier::Good
    } else if score >= 55.0 {
        Tier::Fair
    } else {
        Tier::Basic
    }
}

/// Coding scale (% of tasks resolved). Scores run much lower than
/// general-knowledge ones, so the thresholds do too.
pub fn classify_coding_tier(score: Option<f64>) -> Tier {
    let Some(score) = score else {
        return Tier::NotAvailable;
    };
    if score >= 30.0 {
        Tier::Excellent
    } else if score >= 22.0 {
        Tier::Great
    } else if score >= 15.0 {
        Tier::Good
    } else if score >= 8.0 {
        Tier::Fair
    } else {
        Tier::Basic
    }
}
