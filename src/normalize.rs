//! Field normalization: per-column parsing and missing-value handling.
//!
//! Every operation is total: unparseable or missing cells become `None`
//! and rows are never dropped here. Dropping happens downstream in the
//! feature builder and assembler.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use regex::Regex;

use crate::config::CleaningConfig;
use crate::types::{RaceEntry, RawRow};

/// Currency values above this are kept but logged as suspicious.
const CURRENCY_WARN_LIMIT: f64 = 1e9;

/// Category vocabulary for one column, derived from the observed data.
///
/// Codes are assigned in lexicographic order so runs are deterministic.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    index: BTreeMap<String, u32>,
}

impl Vocabulary {
    /// Build a vocabulary from the distinct values of a column.
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        let index = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value.to_string(), code as u32))
            .collect();
        Self { index }
    }

    /// Code for a value, if it was observed during `fit`.
    pub fn encode(&self, value: &str) -> Option<u32> {
        self.index.get(value).copied()
    }

    /// Number of distinct categories.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Normalized table: typed entries plus the category vocabularies that
/// were fit over them.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTable {
    pub entries: Vec<RaceEntry>,
    pub tracks: Vocabulary,
    pub jockeys: Vocabulary,
    pub trainers: Vocabulary,
}

/// Field normalizer. Holds the configured NA tokens and the compiled
/// distance pattern.
pub struct Normalizer {
    na_tokens: HashSet<String>,
    distance_re: Regex,
}

impl Normalizer {
    pub fn new(cfg: &CleaningConfig) -> Self {
        Self {
            na_tokens: cfg.na_tokens.iter().cloned().collect(),
            distance_re: Regex::new(r"([+-]?\d+(?:\.\d+)?)").unwrap(),
        }
    }

    /// True if a cell is considered missing: absent, whitespace-only, or
    /// one of the configured NA tokens (after trimming).
    pub fn is_missing(&self, val: Option<&str>) -> bool {
        match val {
            None => true,
            Some(s) => {
                let t = s.trim();
                t.is_empty() || self.na_tokens.contains(t)
            }
        }
    }

    /// Trim surrounding whitespace; missing cells become `None`.
    pub fn tidy_string(&self, val: Option<&str>) -> Option<String> {
        if self.is_missing(val) {
            return None;
        }
        val.map(|s| s.trim().to_string())
    }

    /// Parse a currency cell: strip `$` and `,`, then parse as a float.
    /// `"$4,500.00"` parses to `4500.00`.
    pub fn parse_currency(&self, val: Option<&str>) -> Option<f64> {
        if self.is_missing(val) {
            return None;
        }
        let raw = val?;
        let stripped: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
        let stripped = stripped.trim();
        if stripped.is_empty() {
            return None;
        }
        match stripped.parse::<f64>() {
            Ok(value) => {
                if value < 0.0 {
                    tracing::warn!(value, "negative currency value");
                } else if value > CURRENCY_WARN_LIMIT {
                    tracing::warn!(value, "extremely large currency value");
                }
                Some(value)
            }
            Err(_) => {
                tracing::warn!(raw, "cannot parse currency value");
                None
            }
        }
    }

    /// Extract the numeric prefix of a distance cell, dropping the unit
    /// suffix. `"4.32F"` parses to `4.32` furlongs.
    pub fn parse_distance(&self, val: Option<&str>) -> Option<f64> {
        if self.is_missing(val) {
            return None;
        }
        let caps = self.distance_re.captures(val?)?;
        caps.get(1)?.as_str().parse::<f64>().ok()
    }

    /// Parse a plain numeric cell.
    pub fn parse_number(&self, val: Option<&str>) -> Option<f64> {
        if self.is_missing(val) {
            return None;
        }
        val?.trim().parse::<f64>().ok()
    }

    /// Parse a non-negative integer cell. Accepts a fraction-free float
    /// form ("3.0") since spreadsheet cells often surface that way.
    pub fn parse_integer(&self, val: Option<&str>) -> Option<u32> {
        if self.is_missing(val) {
            return None;
        }
        let t = val?.trim();
        if let Ok(n) = t.parse::<u32>() {
            return Some(n);
        }
        match t.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => {
                Some(f as u32)
            }
            _ => None,
        }
    }

    /// Normalize a batch of raw rows.
    ///
    /// First pass fits the category vocabularies over the observed
    /// jockey/trainer/track values; second pass coerces every cell.
    /// The output always has exactly one entry per input row.
    pub fn normalize(&self, rows: &[RawRow]) -> NormalizedTable {
        let tidied: Vec<(Option<String>, Option<String>, Option<String>)> = rows
            .iter()
            .map(|row| {
                (
                    self.tidy_string(row.jockey_id.as_deref()),
                    self.tidy_string(row.trainer_id.as_deref()),
                    self.tidy_string(row.track.as_deref()),
                )
            })
            .collect();

        let jockeys = Vocabulary::fit(tidied.iter().filter_map(|(j, _, _)| j.as_deref()));
        let trainers = Vocabulary::fit(tidied.iter().filter_map(|(_, t, _)| t.as_deref()));
        let tracks = Vocabulary::fit(tidied.iter().filter_map(|(_, _, k)| k.as_deref()));

        let entries = rows
            .iter()
            .zip(tidied.iter())
            .map(|(row, (jockey, trainer, track))| RaceEntry {
                horse_id: self.tidy_string(row.horse_id.as_deref()),
                race_id: self.tidy_string(row.race_id.as_deref()),
                race_seq: self.parse_integer(row.race_seq.as_deref()),
                speed_figure: self.parse_number(row.speed_figure.as_deref()),
                position: self.parse_integer(row.position.as_deref()),
                purse: self.parse_currency(row.purse.as_deref()),
                earnings: self.parse_currency(row.earnings.as_deref()),
                field_size: self.parse_number(row.field_size.as_deref()),
                jockey: jockey.as_deref().and_then(|v| jockeys.encode(v)),
                trainer: trainer.as_deref().and_then(|v| trainers.encode(v)),
                track: track.as_deref().and_then(|v| tracks.encode(v)),
                distance: self.parse_distance(row.distance.as_deref()),
                final_odds: self.parse_number(row.final_odds.as_deref()),
            })
            .collect();

        NormalizedTable {
            entries,
            tracks,
            jockeys,
            trainers,
        }
    }
}

/// Count missing values per column over normalized entries.
pub fn missing_counts(entries: &[RaceEntry]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut add = |name: &str, missing: bool| {
        let slot = counts.entry(name.to_string()).or_insert(0);
        if missing {
            *slot += 1;
        }
    };
    for e in entries {
        add("horse_id", e.horse_id.is_none());
        add("race_id", e.race_id.is_none());
        add("race_seq", e.race_seq.is_none());
        add("speed_figure", e.speed_figure.is_none());
        add("position", e.position.is_none());
        add("purse", e.purse.is_none());
        add("earnings", e.earnings.is_none());
        add("field_size", e.field_size.is_none());
        add("jockey_id", e.jockey.is_none());
        add("trainer_id", e.trainer.is_none());
        add("track", e.track.is_none());
        add("distance", e.distance.is_none());
        add("final_odds", e.final_odds.is_none());
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(&CleaningConfig::default())
    }

    #[test]
    fn test_currency_parse() {
        let n = normalizer();
        assert!((n.parse_currency(Some("$4,500.00")).unwrap() - 4500.0).abs() < 1e-9);
        assert!((n.parse_currency(Some("$0.00")).unwrap() - 0.0).abs() < 1e-9);
        assert!((n.parse_currency(Some("1000")).unwrap() - 1000.0).abs() < 1e-9);
        assert_eq!(n.parse_currency(Some("")), None);
        assert_eq!(n.parse_currency(Some("NA")), None);
        assert_eq!(n.parse_currency(Some("twelve")), None);
        assert_eq!(n.parse_currency(None), None);
    }

    #[test]
    fn test_currency_keeps_suspicious_values() {
        let n = normalizer();
        // Negative and huge values are warned about, not discarded
        assert!((n.parse_currency(Some("-$500")).unwrap() + 500.0).abs() < 1e-9);
        assert!((n.parse_currency(Some("$2,000,000,000")).unwrap() - 2e9).abs() < 1e-3);
    }

    #[test]
    fn test_distance_parse() {
        let n = normalizer();
        assert!((n.parse_distance(Some("4.32F")).unwrap() - 4.32).abs() < 1e-9);
        assert!((n.parse_distance(Some("6F")).unwrap() - 6.0).abs() < 1e-9);
        assert_eq!(n.parse_distance(Some("-")), None);
        assert_eq!(n.parse_distance(Some("furlongs")), None);
        assert_eq!(n.parse_distance(None), None);
    }

    #[test]
    fn test_na_tokens_all_missing() {
        let n = normalizer();
        for token in ["NA", "N/A", "n/a", "NULL", "null", "None", ".", "-", "—", "", "   "] {
            assert!(n.is_missing(Some(token)), "token {:?} should be missing", token);
        }
        assert!(n.is_missing(None));
        assert!(!n.is_missing(Some("0")));
        assert!(!n.is_missing(Some("Belmont")));
    }

    #[test]
    fn test_tidy_string() {
        let n = normalizer();
        assert_eq!(n.tidy_string(Some("  Horse 1  ")), Some("Horse 1".to_string()));
        assert_eq!(n.tidy_string(Some("   ")), None);
        assert_eq!(n.tidy_string(Some("NA")), None);
        assert_eq!(n.tidy_string(None), None);
    }

    #[test]
    fn test_parse_integer() {
        let n = normalizer();
        assert_eq!(n.parse_integer(Some("3")), Some(3));
        assert_eq!(n.parse_integer(Some("3.0")), Some(3));
        assert_eq!(n.parse_integer(Some(" 12 ")), Some(12));
        assert_eq!(n.parse_integer(Some("3.5")), None);
        assert_eq!(n.parse_integer(Some("-1")), None);
        assert_eq!(n.parse_integer(Some("x")), None);
    }

    #[test]
    fn test_vocabulary_codes_are_sorted() {
        let vocab = Vocabulary::fit(["zebra", "apple", "zebra", "mango"]);
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.encode("apple"), Some(0));
        assert_eq!(vocab.encode("mango"), Some(1));
        assert_eq!(vocab.encode("zebra"), Some(2));
        assert_eq!(vocab.encode("missing"), None);
    }

    fn raw_row(horse: &str, seq: &str) -> RawRow {
        RawRow {
            horse_id: Some(horse.to_string()),
            race_id: Some(format!("R{}", seq)),
            race_seq: Some(seq.to_string()),
            speed_figure: Some("85".to_string()),
            position: Some("2".to_string()),
            purse: Some("$4,500.00".to_string()),
            earnings: Some("$1,200.00".to_string()),
            field_size: Some("10".to_string()),
            jockey_id: Some("J7".to_string()),
            trainer_id: Some("T2".to_string()),
            track: Some("Belmont".to_string()),
            distance: Some("6F".to_string()),
            final_odds: Some("2.5".to_string()),
        }
    }

    #[test]
    fn test_normalize_row_values() {
        let n = normalizer();
        let table = n.normalize(&[raw_row("H1", "1")]);
        let e = &table.entries[0];
        assert_eq!(e.horse_id.as_deref(), Some("H1"));
        assert_eq!(e.race_seq, Some(1));
        assert!((e.speed_figure.unwrap() - 85.0).abs() < 1e-9);
        assert_eq!(e.position, Some(2));
        assert!((e.purse.unwrap() - 4500.0).abs() < 1e-9);
        assert!((e.distance.unwrap() - 6.0).abs() < 1e-9);
        assert!((e.final_odds.unwrap() - 2.5).abs() < 1e-9);
        assert_eq!(e.jockey, Some(0));
        assert_eq!(e.trainer, Some(0));
        assert_eq!(e.track, Some(0));
    }

    #[test]
    fn test_normalize_encodes_equal_strings_to_equal_codes() {
        let n = normalizer();
        let mut a = raw_row("H1", "1");
        let mut b = raw_row("H1", "2");
        let mut c = raw_row("H1", "3");
        a.jockey_id = Some("  J9 ".to_string());
        b.jockey_id = Some("J9".to_string());
        c.jockey_id = Some("J1".to_string());
        let table = n.normalize(&[a, b, c]);
        assert_eq!(table.jockeys.len(), 2);
        assert_eq!(table.entries[0].jockey, table.entries[1].jockey);
        assert_ne!(table.entries[0].jockey, table.entries[2].jockey);
    }

    #[test]
    fn test_normalize_never_drops_rows() {
        let n = normalizer();
        let rows = vec![
            raw_row("H1", "1"),
            RawRow::default(),
            RawRow {
                speed_figure: Some("garbage".to_string()),
                ..RawRow::default()
            },
        ];
        let table = n.normalize(&rows);
        assert_eq!(table.entries.len(), rows.len());
        assert_eq!(table.entries[1], RaceEntry::default());
        assert_eq!(table.entries[2].speed_figure, None);
    }

    #[test]
    fn test_missing_counts() {
        let n = normalizer();
        let mut incomplete = raw_row("H2", "2");
        incomplete.purse = Some("NA".to_string());
        incomplete.final_odds = None;
        let table = n.normalize(&[raw_row("H1", "1"), incomplete]);
        let counts = missing_counts(&table.entries);
        assert_eq!(counts["purse"], 1);
        assert_eq!(counts["final_odds"], 1);
        assert_eq!(counts["horse_id"], 0);
        assert_eq!(counts.len(), 13);
    }

    #[test]
    fn test_batch_normalize_spot_checks() {
        let n = normalizer();
        let rows: Vec<RawRow> = (0..1000)
            .map(|i| RawRow {
                horse_id: Some(format!("H{i}")),
                race_id: Some(format!("R{}", i % 10)),
                race_seq: Some("1".to_string()),
                distance: Some(format!("{}F", 4.0 + i as f64 / 1000.0)),
                purse: Some(format!("${},000.00", 1000 + i)),
                earnings: Some(format!("${}.00", 100 + i)),
                field_size: Some((5 + i % 10).to_string()),
                final_odds: Some((1.5 + i as f64 / 100.0).to_string()),
                ..RawRow::default()
            })
            .collect();

        let table = n.normalize(&rows);
        assert_eq!(table.entries.len(), 1000);
        assert!((table.entries[0].distance.unwrap() - 4.0).abs() < 1e-9);
        assert!((table.entries[999].distance.unwrap() - 4.999).abs() < 1e-9);
        assert!((table.entries[999].purse.unwrap() - 1_999_000.0).abs() < 1e-9);
        assert!((table.entries[42].earnings.unwrap() - 142.0).abs() < 1e-9);
        assert!((table.entries[7].field_size.unwrap() - 12.0).abs() < 1e-9);
    }
}
