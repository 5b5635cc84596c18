//! Trailing-window feature construction.
//!
//! Features for a horse are computed strictly from its races 1..3; race 4
//! exists only to supply the label downstream. The builder never touches
//! the target entry, which is what keeps the label out of the features.

use std::collections::BTreeMap;

use crate::dnf::{entry_is_dnf, is_dnf};
use crate::types::RaceEntry;

/// Why a horse was dropped during feature construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureGap {
    /// Every race in the window is a DNF, so no speed aggregate exists.
    AllPriorRacesDnf,
    /// A required aggregate has zero present values in the window.
    IncompleteCovariates,
}

/// One horse's curated career: the three-race window plus the target race.
#[derive(Debug, Clone)]
pub struct HorseCareer<'a> {
    pub horse_id: String,
    pub window: [&'a RaceEntry; 3],
    pub target: &'a RaceEntry,
}

/// Careers that passed the curated-career check, plus counters for the
/// validation summary.
#[derive(Debug, Clone, Default)]
pub struct CareerSplit<'a> {
    pub careers: Vec<HorseCareer<'a>>,
    pub horses_seen: usize,
    pub rows_without_identity: usize,
    pub bad_race_sequence: usize,
}

/// Group entries per horse and validate the curated invariant: exactly
/// four races with sequence numbers 1,2,3,4. Horses failing the check are
/// counted, not fatal. Careers come out sorted by horse id so downstream
/// output order is deterministic.
pub fn split_careers(entries: &[RaceEntry]) -> CareerSplit<'_> {
    let mut split = CareerSplit::default();
    let mut by_horse: BTreeMap<&str, Vec<&RaceEntry>> = BTreeMap::new();

    for entry in entries {
        match (entry.horse_id.as_deref(), entry.race_seq) {
            (Some(horse_id), Some(_)) => {
                by_horse.entry(horse_id).or_default().push(entry);
            }
            _ => split.rows_without_identity += 1,
        }
    }
    split.horses_seen = by_horse.len();

    for (horse_id, races) in by_horse {
        let mut by_seq: [Option<&RaceEntry>; 4] = [None; 4];
        let mut curated = races.len() == 4;
        for race in races {
            match race.race_seq {
                Some(seq @ 1..=4) => {
                    let slot = &mut by_seq[(seq - 1) as usize];
                    if slot.is_some() {
                        curated = false;
                    }
                    *slot = Some(race);
                }
                _ => curated = false,
            }
        }
        match (curated, by_seq) {
            (true, [Some(r1), Some(r2), Some(r3), Some(r4)]) => {
                split.careers.push(HorseCareer {
                    horse_id: horse_id.to_string(),
                    window: [r1, r2, r3],
                    target: r4,
                });
            }
            _ => split.bad_race_sequence += 1,
        }
    }

    split
}

/// The model-ready feature vector for one horse.
#[derive(Debug, Clone, Default)]
pub struct HorseFeatures {
    pub win_rate_past_3: f64,
    pub avg_speed_figure_past_3: f64,
    pub dnf_rate_past_3: f64,
    pub avg_final_odds_past_3: f64,
    pub speed_figure_std: f64,
    pub recent_speed_figure: f64,
    pub speed_trend: f64,
    pub avg_purse: f64,
    pub avg_field_size: f64,
    pub same_jockey: f64,
    pub same_trainer: f64,
    pub same_distance: f64,
}

impl HorseFeatures {
    /// Feature values in `config::FEATURE_NAMES` order.
    pub fn to_array(&self) -> [f64; 12] {
        [
            self.win_rate_past_3,
            self.avg_speed_figure_past_3,
            self.dnf_rate_past_3,
            self.avg_final_odds_past_3,
            self.speed_figure_std,
            self.recent_speed_figure,
            self.speed_trend,
            self.avg_purse,
            self.avg_field_size,
            self.same_jockey,
            self.same_trainer,
            self.same_distance,
        ]
    }
}

pub struct FeatureBuilder {
    dnf_sentinel: f64,
}

impl FeatureBuilder {
    pub fn new(dnf_sentinel: f64) -> Self {
        Self { dnf_sentinel }
    }

    /// Compute the feature vector from a three-race window.
    ///
    /// Speed aggregates use usable figures only (present and not DNF).
    /// Covariate averages are means over the present values. Either set
    /// being empty excludes the horse with the matching gap reason.
    pub fn build(&self, window: &[&RaceEntry; 3]) -> Result<HorseFeatures, FeatureGap> {
        let dnf_count = window
            .iter()
            .filter(|e| entry_is_dnf(e, self.dnf_sentinel))
            .count();
        if dnf_count == 3 {
            return Err(FeatureGap::AllPriorRacesDnf);
        }

        let usable: Vec<f64> = window
            .iter()
            .filter_map(|e| match e.speed_figure {
                Some(f) if !is_dnf(f, self.dnf_sentinel) => Some(f),
                _ => None,
            })
            .collect();
        if usable.is_empty() {
            return Err(FeatureGap::IncompleteCovariates);
        }

        let avg_final_odds = mean_present(window, |e| e.final_odds)
            .ok_or(FeatureGap::IncompleteCovariates)?;
        let avg_purse =
            mean_present(window, |e| e.purse).ok_or(FeatureGap::IncompleteCovariates)?;
        let avg_field_size =
            mean_present(window, |e| e.field_size).ok_or(FeatureGap::IncompleteCovariates)?;

        let wins = window.iter().filter(|e| e.position == Some(1)).count();
        let avg_figure = usable.iter().sum::<f64>() / usable.len() as f64;
        // Most recent usable figure; race 3 unless it was a DNF
        let recent = window
            .iter()
            .rev()
            .find_map(|e| match e.speed_figure {
                Some(f) if !is_dnf(f, self.dnf_sentinel) => Some(f),
                _ => None,
            })
            .ok_or(FeatureGap::IncompleteCovariates)?;
        let trend = if usable.len() >= 2 {
            usable[usable.len() - 1] - usable[0]
        } else {
            0.0
        };

        Ok(HorseFeatures {
            win_rate_past_3: wins as f64 / 3.0,
            avg_speed_figure_past_3: avg_figure,
            dnf_rate_past_3: dnf_count as f64 / 3.0,
            avg_final_odds_past_3: avg_final_odds,
            speed_figure_std: std_dev(&usable),
            recent_speed_figure: recent,
            speed_trend: trend,
            avg_purse,
            avg_field_size,
            same_jockey: consistency(window, |e| e.jockey),
            same_trainer: consistency(window, |e| e.trainer),
            same_distance: consistency(window, |e| e.distance),
        })
    }
}

fn mean_present<F>(window: &[&RaceEntry; 3], value: F) -> Option<f64>
where
    F: Fn(&RaceEntry) -> Option<f64>,
{
    let values: Vec<f64> = window.iter().filter_map(|e| value(e)).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation; 0 with fewer than two samples.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

/// 1.0 when the value is present and identical across all three races.
fn consistency<T, F>(window: &[&RaceEntry; 3], value: F) -> f64
where
    T: PartialEq,
    F: Fn(&RaceEntry) -> Option<T>,
{
    match (value(window[0]), value(window[1]), value(window[2])) {
        (Some(a), Some(b), Some(c)) if a == b && b == c => 1.0,
        _ => 0.0,
    }
}
