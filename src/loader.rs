//! Raw data ingestion.
//!
//! Reads the entry CSV plus the two optional spreadsheets, canonicalizes
//! column headers, unions entry-level rows, drops exact duplicates and
//! backfills race-level attributes from the races sheet. Everything stays
//! a string here; type coercion happens in the normalizer.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use calamine::{Data, Reader, Xlsx};
use polars::prelude::*;

use crate::config::DataConfig;
use crate::error::PipelineError;
use crate::normalize::Normalizer;
use crate::types::RawRow;

/// Columns every entry-level source must carry, post-canonicalization.
const REQUIRED_ENTRY_COLUMNS: [&str; 12] = [
    "horse_id",
    "race_id",
    "race_seq",
    "speed_figure",
    "position",
    "purse",
    "earnings",
    "field_size",
    "jockey_id",
    "trainer_id",
    "distance",
    "final_odds",
];

/// Unioned raw rows plus ingestion counters for the validation summary.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
    pub duplicate_rows_dropped: usize,
}

/// Race-level attributes keyed by race id, used to backfill entry cells.
#[derive(Debug, Clone, Default)]
pub struct RaceDetails {
    pub track: Option<String>,
    pub purse: Option<String>,
    pub distance: Option<String>,
    pub field_size: Option<String>,
}

/// Load and union all configured sources.
///
/// The entry CSV is required. The two spreadsheets are enrichment: a
/// configured path that does not exist is skipped with a log line, but an
/// existing file that cannot be parsed is fatal.
pub fn load_raw(cfg: &DataConfig, normalizer: &Normalizer) -> Result<RawTable, PipelineError> {
    let csv_path = Path::new(&cfg.entries_csv);
    let (headers, cells) = read_csv_table(csv_path)?;
    let mut rows = build_entry_rows(csv_path, &headers, &cells)?;
    tracing::info!(rows = rows.len(), path = %csv_path.display(), "loaded entry csv");

    let pps_path = Path::new(&cfg.horses_sheet);
    if pps_path.exists() {
        let (headers, cells) = read_sheet_table(pps_path)?;
        let extra = build_entry_rows(pps_path, &headers, &cells)?;
        tracing::info!(rows = extra.len(), path = %pps_path.display(), "loaded past performance sheet");
        rows.extend(extra);
    } else {
        tracing::info!(path = %pps_path.display(), "past performance sheet not found, skipping");
    }

    let mut seen: HashSet<RawRow> = HashSet::new();
    let before = rows.len();
    rows.retain(|row| seen.insert(row.clone()));
    let duplicate_rows_dropped = before - rows.len();
    if duplicate_rows_dropped > 0 {
        tracing::info!(duplicate_rows_dropped, "dropped exact duplicate rows");
    }

    let races_path = Path::new(&cfg.races_sheet);
    if races_path.exists() {
        let details = read_race_details(races_path)?;
        let filled = fill_race_details(&mut rows, &details, normalizer);
        tracing::info!(races = details.len(), filled, path = %races_path.display(), "joined race sheet attributes");
    } else {
        tracing::info!(path = %races_path.display(), "races sheet not found, skipping");
    }

    Ok(RawTable {
        rows,
        duplicate_rows_dropped,
    })
}

/// Map a raw source header onto its canonical column name.
pub fn canonical_column(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed {
        "Distance" => "distance".to_string(),
        "Purse" => "purse".to_string(),
        "Field_size" => "field_size".to_string(),
        "Earnings" => "earnings".to_string(),
        "Final Odds" => "final_odds".to_string(),
        other => other.to_string(),
    }
}

/// Read a CSV with every column as a string.
fn read_csv_table(path: &Path) -> Result<(Vec<String>, Vec<Vec<Option<String>>>), PipelineError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| PipelineError::source_read(path, e))?
        .finish()
        .map_err(|e| PipelineError::source_read(path, e))?;

    let headers: Vec<String> = df
        .get_columns()
        .iter()
        .map(|col| canonical_column(col.name().as_str()))
        .collect();

    let mut string_cols = Vec::with_capacity(headers.len());
    for col in df.get_columns() {
        string_cols.push(col.str().map_err(|e| PipelineError::source_read(path, e))?);
    }

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let mut row = Vec::with_capacity(string_cols.len());
        for col in &string_cols {
            row.push(col.get(i).map(|s| s.to_string()));
        }
        rows.push(row);
    }

    Ok((headers, rows))
}

/// Read the first worksheet of an xlsx file into the same shape as the
/// CSV reader: canonical headers plus string cells.
fn read_sheet_table(path: &Path) -> Result<(Vec<String>, Vec<Vec<Option<String>>>), PipelineError> {
    let mut workbook: Xlsx<_> =
        calamine::open_workbook(path).map_err(|e| PipelineError::source_read(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::source_read(path, "workbook has no sheets"))?
        .map_err(|e| PipelineError::source_read(path, e))?;

    let mut row_iter = range.rows();
    let headers: Vec<String> = match row_iter.next() {
        Some(cells) => cells
            .iter()
            .map(|c| canonical_column(&cell_to_string(c).unwrap_or_default()))
            .collect(),
        None => return Err(PipelineError::source_read(path, "sheet has no header row")),
    };

    let rows = row_iter
        .map(|cells| cells.iter().map(cell_to_string).collect())
        .collect();

    Ok((headers, rows))
}

/// Render a spreadsheet cell as the string the CSV reader would have
/// produced. Whole-number floats print without the trailing ".0" so that
/// ordinals and counts survive the trip through Excel's number type.
pub fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                Some(format!("{}", *f as i64))
            } else {
                Some(f.to_string())
            }
        }
        Data::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Assemble entry rows from a header list and string cells, failing if a
/// required column is absent.
pub fn build_entry_rows(
    path: &Path,
    headers: &[String],
    cells: &[Vec<Option<String>>],
) -> Result<Vec<RawRow>, PipelineError> {
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();
    for col in REQUIRED_ENTRY_COLUMNS {
        if !index.contains_key(col) {
            return Err(PipelineError::schema(path, col));
        }
    }

    let cell = |row: &Vec<Option<String>>, name: &str| -> Option<String> {
        index.get(name).and_then(|&i| row.get(i).cloned().flatten())
    };

    let rows = cells
        .iter()
        .map(|row| RawRow {
            horse_id: cell(row, "horse_id"),
            race_id: cell(row, "race_id"),
            race_seq: cell(row, "race_seq"),
            speed_figure: cell(row, "speed_figure"),
            position: cell(row, "position"),
            purse: cell(row, "purse"),
            earnings: cell(row, "earnings"),
            field_size: cell(row, "field_size"),
            jockey_id: cell(row, "jockey_id"),
            trainer_id: cell(row, "trainer_id"),
            track: cell(row, "track"),
            distance: cell(row, "distance"),
            final_odds: cell(row, "final_odds"),
        })
        .collect();

    Ok(rows)
}

/// Read the races sheet into a race id -> attributes map.
fn read_race_details(path: &Path) -> Result<HashMap<String, RaceDetails>, PipelineError> {
    let (headers, cells) = read_sheet_table(path)?;
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();
    let race_id_idx = *index
        .get("race_id")
        .ok_or_else(|| PipelineError::schema(path, "race_id"))?;

    let cell = |row: &Vec<Option<String>>, name: &str| -> Option<String> {
        index.get(name).and_then(|&i| row.get(i).cloned().flatten())
    };

    let mut details = HashMap::new();
    for row in &cells {
        let race_id = match row.get(race_id_idx).cloned().flatten() {
            Some(id) => id.trim().to_string(),
            None => continue,
        };
        if race_id.is_empty() {
            continue;
        }
        details.insert(
            race_id,
            RaceDetails {
                track: cell(row, "track"),
                purse: cell(row, "purse"),
                distance: cell(row, "distance"),
                field_size: cell(row, "field_size"),
            },
        );
    }
    Ok(details)
}

/// Fill entry cells that are missing at the entry level from race-level
/// attributes. Existing entry values always win. Returns the number of
/// cells filled.
pub fn fill_race_details(
    rows: &mut [RawRow],
    details: &HashMap<String, RaceDetails>,
    normalizer: &Normalizer,
) -> usize {
    let mut filled = 0usize;
    for row in rows.iter_mut() {
        let key = match row.race_id.as_deref().map(str::trim) {
            Some(k) if !k.is_empty() => k,
            _ => continue,
        };
        let Some(d) = details.get(key) else { continue };
        if normalizer.is_missing(row.track.as_deref()) {
            if let Some(v) = &d.track {
                row.track = Some(v.clone());
                filled += 1;
            }
        }
        if normalizer.is_missing(row.purse.as_deref()) {
            if let Some(v) = &d.purse {
                row.purse = Some(v.clone());
                filled += 1;
            }
        }
        if normalizer.is_missing(row.distance.as_deref()) {
            if let Some(v) = &d.distance {
                row.distance = Some(v.clone());
                filled += 1;
            }
        }
        if normalizer.is_missing(row.field_size.as_deref()) {
            if let Some(v) = &d.field_size {
                row.field_size = Some(v.clone());
                filled += 1;
            }
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleaningConfig;
    use std::fs;

    const CSV_HEADER: &str = "horse_id,race_id,race_seq,speed_figure,position,Purse,Earnings,Field_size,jockey_id,trainer_id,track,Distance,Final Odds";

    fn write_csv(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join("entries.csv");
        let mut body = String::from(CSV_HEADER);
        for line in lines {
            body.push('\n');
            body.push_str(line);
        }
        fs::write(&path, body).unwrap();
        path
    }

    fn config_for(dir: &Path, csv: &Path) -> DataConfig {
        DataConfig {
            entries_csv: csv.to_string_lossy().into_owned(),
            races_sheet: dir.join("races_sheet.xlsx").to_string_lossy().into_owned(),
            horses_sheet: dir.join("horses_pps.xlsx").to_string_lossy().into_owned(),
            ..DataConfig::default()
        }
    }

    #[test]
    fn test_load_csv_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(
            dir.path(),
            &[
                "H1,R1,1,80,1,\"$4,500.00\",\"$1,200.00\",10,J1,T1,Belmont,6F,2.5",
                "H1,R2,2,85,3,\"$4,500.00\",\"$300.00\",10,J1,T1,Belmont,6F,3.0",
            ],
        );
        let normalizer = Normalizer::new(&CleaningConfig::default());
        let table = load_raw(&config_for(dir.path(), &csv), &normalizer).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.duplicate_rows_dropped, 0);
        assert_eq!(table.rows[0].horse_id.as_deref(), Some("H1"));
        assert_eq!(table.rows[0].purse.as_deref(), Some("$4,500.00"));
        assert_eq!(table.rows[1].race_seq.as_deref(), Some("2"));
    }

    #[test]
    fn test_load_csv_drops_exact_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let row = "H1,R1,1,80,1,\"$4,500.00\",\"$1,200.00\",10,J1,T1,Belmont,6F,2.5";
        let csv = write_csv(dir.path(), &[row, row, row]);
        let normalizer = Normalizer::new(&CleaningConfig::default());
        let table = load_raw(&config_for(dir.path(), &csv), &normalizer).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.duplicate_rows_dropped, 2);
    }

    #[test]
    fn test_duplicate_detection_at_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = String::from(CSV_HEADER);
        for i in 0..500 {
            body.push('\n');
            body.push_str(&format!(
                "H{i},R{i},1,80,1,\"$4,500.00\",\"$100.00\",10,J1,T1,Belmont,6F,2.5"
            ));
        }
        // Repeat the first hundred rows verbatim
        for i in 0..100 {
            body.push('\n');
            body.push_str(&format!(
                "H{i},R{i},1,80,1,\"$4,500.00\",\"$100.00\",10,J1,T1,Belmont,6F,2.5"
            ));
        }
        let path = dir.path().join("entries.csv");
        fs::write(&path, body).unwrap();

        let normalizer = Normalizer::new(&CleaningConfig::default());
        let table = load_raw(&config_for(dir.path(), &path), &normalizer).unwrap();
        assert_eq!(table.rows.len(), 500);
        assert_eq!(table.duplicate_rows_dropped, 100);
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.csv");
        fs::write(&path, "horse_id,race_id\nH1,R1\n").unwrap();
        let normalizer = Normalizer::new(&CleaningConfig::default());
        let err = load_raw(&config_for(dir.path(), &path), &normalizer).unwrap_err();
        match err {
            PipelineError::Schema { column, .. } => assert_eq!(column, "race_seq"),
            other => panic!("expected schema error, got {other}"),
        }
    }

    #[test]
    fn test_missing_csv_is_source_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.csv");
        let normalizer = Normalizer::new(&CleaningConfig::default());
        let err = load_raw(&config_for(dir.path(), &path), &normalizer).unwrap_err();
        assert!(matches!(err, PipelineError::SourceRead { .. }));
    }

    #[test]
    fn test_canonical_column_renames() {
        assert_eq!(canonical_column("Distance"), "distance");
        assert_eq!(canonical_column("Purse"), "purse");
        assert_eq!(canonical_column("Field_size"), "field_size");
        assert_eq!(canonical_column("Earnings"), "earnings");
        assert_eq!(canonical_column("Final Odds"), "final_odds");
        assert_eq!(canonical_column(" horse_id "), "horse_id");
        assert_eq!(canonical_column("track"), "track");
    }

    #[test]
    fn test_cell_to_string_kinds() {
        assert_eq!(cell_to_string(&Data::Empty), None);
        assert_eq!(cell_to_string(&Data::String("R1".into())), Some("R1".to_string()));
        assert_eq!(cell_to_string(&Data::Int(4)), Some("4".to_string()));
        assert_eq!(cell_to_string(&Data::Float(3.0)), Some("3".to_string()));
        assert_eq!(cell_to_string(&Data::Float(2.5)), Some("2.5".to_string()));
        assert_eq!(cell_to_string(&Data::Bool(true)), Some("true".to_string()));
    }

    #[test]
    fn test_build_entry_rows_maps_headers() {
        let headers: Vec<String> = CSV_HEADER.split(',').map(canonical_column).collect();
        let cells = vec![vec![
            Some("H1".to_string()),
            Some("R1".to_string()),
            Some("1".to_string()),
            Some("80".to_string()),
            Some("1".to_string()),
            Some("$4,500.00".to_string()),
            Some("$1,200.00".to_string()),
            Some("10".to_string()),
            Some("J1".to_string()),
            Some("T1".to_string()),
            None,
            Some("6F".to_string()),
            Some("2.5".to_string()),
        ]];
        let rows = build_entry_rows(Path::new("test.xlsx"), &headers, &cells).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].final_odds.as_deref(), Some("2.5"));
        assert_eq!(rows[0].track, None);
    }

    #[test]
    fn test_fill_race_details_only_fills_missing() {
        let normalizer = Normalizer::new(&CleaningConfig::default());
        let mut rows = vec![
            RawRow {
                race_id: Some("R1".to_string()),
                track: Some("NA".to_string()),
                purse: Some("$9,000".to_string()),
                ..RawRow::default()
            },
            RawRow {
                race_id: Some("R2".to_string()),
                ..RawRow::default()
            },
        ];
        let mut details = HashMap::new();
        details.insert(
            "R1".to_string(),
            RaceDetails {
                track: Some("Belmont".to_string()),
                purse: Some("$1".to_string()),
                distance: Some("6F".to_string()),
                field_size: Some("10".to_string()),
            },
        );
        let filled = fill_race_details(&mut rows, &details, &normalizer);
        // R1: track (NA counts as missing), distance and field_size filled;
        // purse keeps the entry-level value. R2 has no sheet row.
        assert_eq!(filled, 3);
        assert_eq!(rows[0].track.as_deref(), Some("Belmont"));
        assert_eq!(rows[0].purse.as_deref(), Some("$9,000"));
        assert_eq!(rows[0].distance.as_deref(), Some("6F"));
        assert_eq!(rows[1].track, None);
    }
}
