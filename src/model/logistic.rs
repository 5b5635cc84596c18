//! Logistic regression for race-4 win prediction.

use ndarray::{Array1, Array2};

use super::ModelError;

/// Binary logistic regression fit by gradient descent.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    /// Fitted coefficients, one per feature
    pub coefficients: Option<Array1<f64>>,
    /// Intercept term
    pub intercept: Option<f64>,
    learning_rate: f64,
    max_iter: usize,
    tolerance: f64,
    /// L2 penalty strength; 0 disables regularization
    l2_penalty: f64,
    /// Log loss per iteration during the last fit
    pub cost_history: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(0.1, 1000, 1e-6, 0.01)
    }
}

impl LogisticRegression {
    pub fn new(learning_rate: f64, max_iter: usize, tolerance: f64, l2_penalty: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            learning_rate,
            max_iter,
            tolerance,
            l2_penalty,
            cost_history: Vec::new(),
        }
    }

    /// Numerically stable sigmoid.
    pub fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let exp_z = z.exp();
            exp_z / (1.0 + exp_z)
        }
    }

    fn sigmoid_array(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(Self::sigmoid)
    }

    /// Binary cross-entropy with clipped probabilities.
    fn log_loss(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        let n = y_true.len() as f64;

        -y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(&y, &p)| {
                let p_clipped = p.clamp(eps, 1.0 - eps);
                y * p_clipped.ln() + (1.0 - y) * (1.0 - p_clipped).ln()
            })
            .sum::<f64>()
            / n
    }

    /// Fit by full-batch gradient descent, stopping when the cost change
    /// drops below the tolerance.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyData);
        }
        if x.nrows() != y.len() {
            return Err(ModelError::DimensionMismatch {
                expected: x.nrows(),
                got: y.len(),
            });
        }

        let n_samples = x.nrows() as f64;
        let n_features = x.ncols();
        let mut weights = Array1::<f64>::zeros(n_features);
        let mut bias = 0.0;

        self.cost_history.clear();

        for iter in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid_array(&linear);

            let errors = &predictions - y;
            let mut dw = x.t().dot(&errors) / n_samples;
            let db = errors.sum() / n_samples;

            if self.l2_penalty > 0.0 {
                dw = &dw + &(&weights * self.l2_penalty);
            }

            weights = &weights - &(&dw * self.learning_rate);
            bias -= self.learning_rate * db;

            let cost = Self::log_loss(y, &predictions);
            self.cost_history.push(cost);

            if iter > 0 {
                let cost_diff = (self.cost_history[iter - 1] - cost).abs();
                if cost_diff < self.tolerance {
                    tracing::debug!(iter, cost, "gradient descent converged");
                    break;
                }
            }
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);

        Ok(())
    }

    /// Predicted win probabilities.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let weights = self.coefficients.as_ref().ok_or(ModelError::NotFitted)?;
        let bias = self.intercept.ok_or(ModelError::NotFitted)?;
        if x.ncols() != weights.len() {
            return Err(ModelError::DimensionMismatch {
                expected: weights.len(),
                got: x.ncols(),
            });
        }

        let linear = x.dot(weights) + bias;
        Ok(Self::sigmoid_array(&linear))
    }

    /// Predicted labels at the 0.5 threshold.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Coefficient listing with odds ratios, one line per feature.
    pub fn summary(&self, feature_names: &[&str]) -> String {
        let mut s = String::new();
        match &self.coefficients {
            Some(coef) => {
                s.push_str(&format!(
                    "Intercept: {:.6}\n",
                    self.intercept.unwrap_or(0.0)
                ));
                for (name, &c) in feature_names.iter().zip(coef.iter()) {
                    s.push_str(&format!(
                        "  {:24} {:>10.6} (OR: {:.4})\n",
                        name,
                        c,
                        c.exp()
                    ));
                }
                if let Some(cost) = self.cost_history.last() {
                    s.push_str(&format!("Final cost: {:.6}\n", cost));
                }
            }
            None => s.push_str("Model not fitted yet.\n"),
        }
        s
    }
}
