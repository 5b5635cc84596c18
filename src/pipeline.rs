//! End-to-end pipeline: load, normalize, split, assemble, write.

use std::path::PathBuf;

use chrono::Utc;

use crate::config::AppConfig;
use crate::dataset::{self, CategorySizes, ValidationSummary};
use crate::dnf;
use crate::features::{self, FeatureBuilder};
use crate::loader;
use crate::normalize::{self, Normalizer};

/// What a pipeline run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: ValidationSummary,
    pub output_parquet: PathBuf,
    pub summary_json: PathBuf,
}

/// Execute the full pipeline with the given configuration.
pub fn run(cfg: &AppConfig) -> anyhow::Result<RunReport> {
    let normalizer = Normalizer::new(&cfg.cleaning);

    let raw = loader::load_raw(&cfg.data, &normalizer)?;
    let rows_loaded = raw.rows.len();

    let table = normalizer.normalize(&raw.rows);
    let missing_values = normalize::missing_counts(&table.entries);
    let dnf = dnf::summarize(&table.entries, cfg.cleaning.dnf_sentinel);
    tracing::info!(
        rows = table.entries.len(),
        dnf_rows = dnf.dnf_rows,
        "normalized entries"
    );

    let split = features::split_careers(&table.entries);
    tracing::info!(
        horses = split.horses_seen,
        curated = split.careers.len(),
        "split careers"
    );

    let builder = FeatureBuilder::new(cfg.cleaning.dnf_sentinel);
    let (rows, horses_excluded) = dataset::assemble(&split, &builder);
    tracing::info!(
        rows = rows.len(),
        excluded = horses_excluded.total(),
        "assembled dataset"
    );

    let summary = ValidationSummary {
        generated_at: Utc::now(),
        rows_loaded,
        duplicate_rows_dropped: raw.duplicate_rows_dropped,
        rows_without_identity: split.rows_without_identity,
        missing_values,
        categories: CategorySizes {
            tracks: table.tracks.len(),
            jockeys: table.jockeys.len(),
            trainers: table.trainers.len(),
        },
        dnf,
        horses_seen: split.horses_seen,
        horses_excluded,
        final_rows: rows.len(),
    };

    let output_parquet = PathBuf::from(&cfg.data.output_parquet);
    let summary_json = PathBuf::from(&cfg.data.summary_json);
    dataset::write_parquet(&rows, &output_parquet)?;
    dataset::write_summary(&summary, &summary_json)?;
    tracing::info!(
        parquet = %output_parquet.display(),
        summary = %summary_json.display(),
        "wrote artifacts"
    );

    Ok(RunReport {
        summary,
        output_parquet,
        summary_json,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;
    use polars::prelude::*;
    use std::fs;
    use std::fs::File;
    use std::path::Path;

    const CSV_HEADER: &str = "horse_id,race_id,race_seq,speed_figure,position,Purse,Earnings,Field_size,jockey_id,trainer_id,track,Distance,Final Odds";

    fn career_lines(horse: &str, figures: [&str; 4], positions: [&str; 4]) -> Vec<String> {
        (0..4)
            .map(|i| {
                format!(
                    "{h},{h}-R{seq},{seq},{fig},{pos},\"$4,500.00\",\"$1,200.00\",10,J1,T1,Belmont,6F,2.5",
                    h = horse,
                    seq = i + 1,
                    fig = figures[i],
                    pos = positions[i],
                )
            })
            .collect()
    }

    fn test_config(dir: &Path) -> AppConfig {
        AppConfig {
            data: DataConfig {
                entries_csv: dir.join("entries.csv").to_string_lossy().into_owned(),
                races_sheet: dir.join("races_sheet.xlsx").to_string_lossy().into_owned(),
                horses_sheet: dir.join("horses_pps.xlsx").to_string_lossy().into_owned(),
                output_parquet: dir
                    .join("processed/cleaned_data.parquet")
                    .to_string_lossy()
                    .into_owned(),
                summary_json: dir
                    .join("processed/data_validation_summary.json")
                    .to_string_lossy()
                    .into_owned(),
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_full_run_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = vec![CSV_HEADER.to_string()];
        // H1: one DNF in the window, wins race 4
        lines.extend(career_lines("H1", ["80", "999", "85", "90"], ["2", "", "1", "1"]));
        // H2: every window race is a DNF
        lines.extend(career_lines("H2", ["999", "999", "999", "88"], ["", "", "", "3"]));
        // H3: race 4 has no recorded position
        lines.extend(career_lines("H3", ["70", "71", "72", "73"], ["3", "4", "2", ""]));
        fs::write(dir.path().join("entries.csv"), lines.join("\n")).unwrap();

        let cfg = test_config(dir.path());
        let report = run(&cfg).unwrap();

        let summary = &report.summary;
        assert_eq!(summary.rows_loaded, 12);
        assert_eq!(summary.duplicate_rows_dropped, 0);
        assert_eq!(summary.rows_without_identity, 0);
        assert_eq!(summary.horses_seen, 3);
        assert_eq!(summary.horses_excluded.all_prior_races_dnf, 1);
        assert_eq!(summary.horses_excluded.missing_label, 1);
        assert_eq!(summary.final_rows, 1);
        assert_eq!(
            summary.final_rows + summary.horses_excluded.total(),
            summary.horses_seen
        );
        assert_eq!(summary.dnf.dnf_rows, 4);
        assert_eq!(summary.dnf.rows_with_figure, 12);
        assert_eq!(summary.categories.tracks, 1);
        // Race-2 position for H1 and the other blanks show up as missing
        assert_eq!(summary.missing_values["position"], 5);

        let df = ParquetReader::new(File::open(&report.output_parquet).unwrap())
            .finish()
            .unwrap();
        assert_eq!(df.height(), 1);
        let ids = df.column("horse_id").unwrap().cast(&DataType::String).unwrap();
        assert_eq!(ids.str().unwrap().get(0), Some("H1"));
        let avg = df.column("avg_speed_figure_past_3").unwrap().f64().unwrap();
        assert!((avg.get(0).unwrap() - 82.5).abs() < 1e-9);
        let dnf_rate = df.column("dnf_rate_past_3").unwrap().f64().unwrap();
        assert!((dnf_rate.get(0).unwrap() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(df.column("label").unwrap().u32().unwrap().get(0), Some(1));

        let text = fs::read_to_string(&report.summary_json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["final_rows"], 1);
        assert_eq!(value["horses_seen"], 3);
    }

    #[test]
    fn test_run_fails_before_writing_on_bad_schema() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("entries.csv"), "horse_id,race_id\nH1,R1\n").unwrap();
        let cfg = test_config(dir.path());
        assert!(run(&cfg).is_err());
        assert!(!Path::new(&cfg.data.output_parquet).exists());
        assert!(!Path::new(&cfg.data.summary_json).exists());
    }
}
