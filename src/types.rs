//! Shared row types for the pipeline.

/// One row as read from a raw source, before any type coercion.
///
/// Every field stays a raw string so the normalizer alone decides what is
/// missing and what is parseable. Derives `Eq`/`Hash` so exact duplicates
/// across the unioned sources can be detected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RawRow {
    pub horse_id: Option<String>,
    pub race_id: Option<String>,
    pub race_seq: Option<String>,
    pub speed_figure: Option<String>,
    pub position: Option<String>,
    pub purse: Option<String>,
    pub earnings: Option<String>,
    pub field_size: Option<String>,
    pub jockey_id: Option<String>,
    pub trainer_id: Option<String>,
    pub track: Option<String>,
    pub distance: Option<String>,
    pub final_odds: Option<String>,
}

/// One race entry after normalization.
///
/// Numeric fields are parsed, NA tokens have become `None`, and the
/// categorical columns (jockey, trainer, track) are encoded as codes into
/// the vocabularies fit over the observed data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaceEntry {
    pub horse_id: Option<String>,
    pub race_id: Option<String>,
    pub race_seq: Option<u32>,
    pub speed_figure: Option<f64>,
    pub position: Option<u32>,
    pub purse: Option<f64>,
    pub earnings: Option<f64>,
    pub field_size: Option<f64>,
    pub jockey: Option<u32>,
    pub trainer: Option<u32>,
    pub track: Option<u32>,
    pub distance: Option<f64>,
    pub final_odds: Option<f64>,
}
