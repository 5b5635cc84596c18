//! Final dataset assembly.
//!
//! Joins each feature vector to its race-4 win label, validates the
//! result and writes the two artifacts: the parquet feature table and the
//! JSON validation summary. The parquet file is written first so a
//! summary never exists without its table.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::Serialize;

use crate::config::FEATURE_NAMES;
use crate::dnf::DnfSummary;
use crate::features::{CareerSplit, FeatureBuilder, FeatureGap, HorseFeatures};

/// One assembled dataset row: features from races 1..3, label from race 4.
#[derive(Debug, Clone)]
pub struct LabeledRow {
    pub horse_id: String,
    pub features: HorseFeatures,
    pub label: u32,
}

/// Horses dropped between career splitting and the final table, by reason.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ExclusionCounts {
    pub bad_race_sequence: usize,
    pub all_prior_races_dnf: usize,
    pub incomplete_covariates: usize,
    pub missing_label: usize,
    pub label_conflicts: usize,
}

impl ExclusionCounts {
    pub fn total(&self) -> usize {
        self.bad_race_sequence
            + self.all_prior_races_dnf
            + self.incomplete_covariates
            + self.missing_label
            + self.label_conflicts
    }
}

/// Category vocabulary sizes reported in the summary.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CategorySizes {
    pub tracks: usize,
    pub jockeys: usize,
    pub trainers: usize,
}

/// The run's data-quality report, written next to the parquet output.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub generated_at: DateTime<Utc>,
    pub rows_loaded: usize,
    pub duplicate_rows_dropped: usize,
    pub rows_without_identity: usize,
    pub missing_values: BTreeMap<String, usize>,
    pub categories: CategorySizes,
    pub dnf: DnfSummary,
    pub horses_seen: usize,
    pub horses_excluded: ExclusionCounts,
    pub final_rows: usize,
}

/// Build features and labels for every curated career.
///
/// The win label is 1 iff race 4's position is 1; a missing race-4
/// position means the horse cannot be labeled. Validation drops rows
/// whose label identity does not match the feature identity and any
/// duplicate horse, counting both as label conflicts.
pub fn assemble(
    split: &CareerSplit<'_>,
    builder: &FeatureBuilder,
) -> (Vec<LabeledRow>, ExclusionCounts) {
    let mut counts = ExclusionCounts {
        bad_race_sequence: split.bad_race_sequence,
        ..ExclusionCounts::default()
    };
    let mut rows = Vec::with_capacity(split.careers.len());

    for career in &split.careers {
        let features = match builder.build(&career.window) {
            Ok(features) => features,
            Err(FeatureGap::AllPriorRacesDnf) => {
                counts.all_prior_races_dnf += 1;
                continue;
            }
            Err(FeatureGap::IncompleteCovariates) => {
                counts.incomplete_covariates += 1;
                continue;
            }
        };
        if career.target.horse_id.as_deref() != Some(career.horse_id.as_str()) {
            counts.label_conflicts += 1;
            continue;
        }
        let label = match career.target.position {
            Some(1) => 1u32,
            Some(_) => 0u32,
            None => {
                counts.missing_label += 1;
                continue;
            }
        };
        rows.push(LabeledRow {
            horse_id: career.horse_id.clone(),
            features,
            label,
        });
    }

    let mut seen: HashSet<String> = HashSet::new();
    rows.retain(|row| {
        if seen.insert(row.horse_id.clone()) {
            true
        } else {
            counts.label_conflicts += 1;
            false
        }
    });

    (rows, counts)
}

/// Write the assembled table as parquet: `horse_id` categorical, the 12
/// feature columns in `FEATURE_NAMES` order as Float64, `label` UInt32.
pub fn write_parquet(rows: &[LabeledRow], path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let ids: Vec<&str> = rows.iter().map(|r| r.horse_id.as_str()).collect();
    let mut columns: Vec<Column> = Vec::with_capacity(FEATURE_NAMES.len() + 2);
    columns.push(
        Column::new("horse_id".into(), ids)
            .cast(&DataType::Categorical(None, Default::default()))?,
    );
    let arrays: Vec<[f64; 12]> = rows.iter().map(|r| r.features.to_array()).collect();
    for (j, name) in FEATURE_NAMES.iter().enumerate() {
        let values: Vec<f64> = arrays.iter().map(|a| a[j]).collect();
        columns.push(Column::new((*name).into(), values));
    }
    let labels: Vec<u32> = rows.iter().map(|r| r.label).collect();
    columns.push(Column::new("label".into(), labels));

    let mut df = DataFrame::new(columns)?;
    ParquetWriter::new(File::create(path)?).finish(&mut df)?;
    Ok(())
}

/// Write the validation summary as pretty-printed JSON.
pub fn write_summary(summary: &ValidationSummary, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}
