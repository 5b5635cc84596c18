//! Configuration for the RaceLens pipeline.

use serde::{Deserialize, Serialize};

/// Input and output paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_entries_csv")]
    pub entries_csv: String,
    #[serde(default = "default_races_sheet")]
    pub races_sheet: String,
    #[serde(default = "default_horses_sheet")]
    pub horses_sheet: String,
    #[serde(default = "default_output_parquet")]
    pub output_parquet: String,
    #[serde(default = "default_summary_json")]
    pub summary_json: String,
}

fn default_entries_csv() -> String {
    "data/raw/dataset_test_csv.csv".to_string()
}

fn default_races_sheet() -> String {
    "data/raw/races_sheet.xlsx".to_string()
}

fn default_horses_sheet() -> String {
    "data/raw/horses_pps.xlsx".to_string()
}

fn default_output_parquet() -> String {
    "data/processed/cleaned_data.parquet".to_string()
}

fn default_summary_json() -> String {
    "data/processed/data_validation_summary.json".to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            entries_csv: default_entries_csv(),
            races_sheet: default_races_sheet(),
            horses_sheet: default_horses_sheet(),
            output_parquet: default_output_parquet(),
            summary_json: default_summary_json(),
        }
    }
}

/// Cleaning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Literal tokens treated as missing in any column
    #[serde(default = "default_na_tokens")]
    pub na_tokens: Vec<String>,
    /// Speed figure value marking a race the horse did not finish
    #[serde(default = "default_dnf_sentinel")]
    pub dnf_sentinel: f64,
}

fn default_na_tokens() -> Vec<String> {
    ["NA", "N/A", "n/a", "NULL", "null", "None", ".", "-", "—", ""]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_dnf_sentinel() -> f64 {
    999.0
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            na_tokens: default_na_tokens(),
            dnf_sentinel: default_dnf_sentinel(),
        }
    }
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Random seed for the train/test split
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Fraction of rows held out for evaluation
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
}

fn default_seed() -> u64 {
    42
}

fn default_test_fraction() -> f64 {
    0.2
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            test_fraction: default_test_fraction(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (RACELENS_DATA_ENTRIES_CSV, etc.)
            .add_source(
                config::Environment::with_prefix("RACELENS")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Feature names in model input order
pub const FEATURE_NAMES: [&str; 12] = [
    "win_rate_past_3",
    "avg_speed_figure_past_3",
    "dnf_rate_past_3",
    "avg_final_odds_past_3",
    "speed_figure_std",
    "recent_speed_figure",
    "speed_trend",
    "avg_purse",
    "avg_field_size",
    "same_jockey",
    "same_trainer",
    "same_distance",
];
