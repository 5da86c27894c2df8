/// Errors raised while loading or validating catalog data.
///
/// The engine itself never fails; these only surface at the edges where
/// JSON is parsed or a caller asks for something the catalog doesn't have.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to parse catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    #[error("record '{id}': {field} = {value} is outside {range}")]
    OutOfRange {
        id: String,
        field: &'static str,
        value: f64,
        range: &'static str,
    },

    #[error("model '{0}' lists the same feature more than once")]
    DuplicateFeature(String),

    #[error("variants of '{name}' disagree on {field}")]
    VariantMismatch { name: String, field: &'static str },

    #[error("variants of '{name}': weight must grow with precision ({lower} >= {higher})")]
    WeightOrder {
        name: String,
        lower: String,
        higher: String,
    },

    #[error("GPU '{0}' has memory options that are empty or not strictly increasing")]
    UnorderedOptions(String),

    #[error("GPU '{id}' has {count} memory option(s), index {index} is out of range")]
    NoSuchOption { id: String, index: usize, count: usize },
}
