//! Loading the assembled parquet table into model-ready arrays.

use std::fs::File;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::FEATURE_NAMES;
use crate::error::PipelineError;

/// Feature matrix, labels and the horse id per row.
#[derive(Debug, Clone)]
pub struct TrainingData {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub horse_ids: Vec<String>,
}

/// A seeded train/test partition of the dataset.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
}

/// Read the pipeline's parquet output back into arrays, with the feature
/// columns in `FEATURE_NAMES` order.
pub fn load_training_data(path: &Path) -> anyhow::Result<TrainingData> {
    let file = File::open(path).map_err(|e| PipelineError::source_read(path, e))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| PipelineError::source_read(path, e))?;

    let height = df.height();
    let mut x = Array2::zeros((height, FEATURE_NAMES.len()));
    for (j, name) in FEATURE_NAMES.iter().enumerate() {
        let col = df
            .column(name)
            .map_err(|_| PipelineError::schema(path, name))?;
        let values = col.f64().map_err(|e| PipelineError::source_read(path, e))?;
        for i in 0..height {
            x[[i, j]] = values.get(i).unwrap_or(0.0);
        }
    }

    let labels = df
        .column("label")
        .map_err(|_| PipelineError::schema(path, "label"))?;
    let labels = labels
        .u32()
        .map_err(|e| PipelineError::source_read(path, e))?;
    let mut y = Array1::zeros(height);
    for i in 0..height {
        y[i] = labels.get(i).unwrap_or(0) as f64;
    }

    let ids = df
        .column("horse_id")
        .map_err(|_| PipelineError::schema(path, "horse_id"))?
        .cast(&DataType::String)
        .map_err(|e| PipelineError::source_read(path, e))?;
    let ids = ids.str().map_err(|e| PipelineError::source_read(path, e))?;
    let horse_ids = (0..height)
        .map(|i| ids.get(i).unwrap_or("").to_string())
        .collect();

    Ok(TrainingData { x, y, horse_ids })
}

/// Shuffle row indices with a seeded rng and carve off the test fraction.
/// The same seed always yields the same partition.
pub fn train_test_split(data: &TrainingData, test_fraction: f64, seed: u64) -> TrainTestSplit {
    let n = data.x.nrows();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_size = ((n as f64) * test_fraction).round() as usize;
    let test_size = test_size.min(n);
    let (test_idx, train_idx) = indices.split_at(test_size);

    TrainTestSplit {
        x_train: data.x.select(Axis(0), train_idx),
        y_train: data.y.select(Axis(0), train_idx),
        x_test: data.x.select(Axis(0), test_idx),
        y_test: data.y.select(Axis(0), test_idx),
    }
}
