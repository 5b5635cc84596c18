//! Evaluation metrics for the win classifiers.

use ndarray::Array1;

/// Binary confusion matrix at the 0.5 threshold.
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut tp = 0;
        let mut tn = 0;
        let mut fp = 0;
        let mut fn_ = 0;

        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t >= 0.5, p >= 0.5) {
                (true, true) => tp += 1,
                (false, false) => tn += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
            }
        }

        Self { tp, tn, fp, fn_ }
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }
}

/// Evaluation results for one model on one split.
#[derive(Debug, Clone)]
pub struct ClassificationMetrics {
    pub confusion_matrix: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc_roc: f64,
    pub log_loss: f64,
}

impl ClassificationMetrics {
    pub fn calculate(y_true: &Array1<f64>, y_pred: &Array1<f64>, y_proba: &Array1<f64>) -> Self {
        let cm = ConfusionMatrix::from_predictions(y_true, y_pred);

        let accuracy = Self::accuracy_from_cm(&cm);
        let precision = Self::precision_from_cm(&cm);
        let recall = Self::recall_from_cm(&cm);
        let f1 = Self::f1_from_cm(&cm);
        let auc_roc = Self::auc_roc(y_true, y_proba);
        let log_loss = Self::log_loss(y_true, y_proba);

        Self {
            confusion_matrix: cm,
            accuracy,
            precision,
            recall,
            f1,
            auc_roc,
            log_loss,
        }
    }

    fn accuracy_from_cm(cm: &ConfusionMatrix) -> f64 {
        let total = cm.total() as f64;
        if total < 1e-10 {
            return 0.0;
        }
        (cm.tp + cm.tn) as f64 / total
    }

    fn precision_from_cm(cm: &ConfusionMatrix) -> f64 {
        let denom = (cm.tp + cm.fp) as f64;
        if denom < 1e-10 {
            return 0.0;
        }
        cm.tp as f64 / denom
    }

    fn recall_from_cm(cm: &ConfusionMatrix) -> f64 {
        let denom = (cm.tp + cm.fn_) as f64;
        if denom < 1e-10 {
            return 0.0;
        }
        cm.tp as f64 / denom
    }

    fn f1_from_cm(cm: &ConfusionMatrix) -> f64 {
        let precision = Self::precision_from_cm(cm);
        let recall = Self::recall_from_cm(cm);
        let denom = precision + recall;
        if denom < 1e-10 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }

    /// AUC-ROC via the trapezoid rule, grouping tied scores so ties score
    /// as chance rather than as perfect ranking.
    fn auc_roc(y_true: &Array1<f64>, y_proba: &Array1<f64>) -> f64 {
        let n = y_true.len();
        let mut pairs: Vec<(f64, bool)> = y_proba
            .iter()
            .zip(y_true.iter())
            .map(|(&p, &t)| (p, t >= 0.5))
            .collect();
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let n_pos = pairs.iter().filter(|(_, t)| *t).count() as f64;
        let n_neg = pairs.iter().filter(|(_, t)| !*t).count() as f64;
        if n_pos < 1e-10 || n_neg < 1e-10 {
            return 0.5;
        }

        let mut tpr_prev = 0.0;
        let mut fpr_prev = 0.0;
        let mut auc = 0.0;
        let mut tp = 0.0;
        let mut fp = 0.0;

        let mut i = 0;
        while i < n {
            let score = pairs[i].0;
            let mut j = i;
            while j < n && (pairs[j].0 - score).abs() < 1e-10 {
                if pairs[j].1 {
                    tp += 1.0;
                } else {
                    fp += 1.0;
                }
                j += 1;
            }

            let tpr = tp / n_pos;
            let fpr = fp / n_neg;
            auc += (fpr - fpr_prev) * (tpr + tpr_prev) / 2.0;

            tpr_prev = tpr;
            fpr_prev = fpr;
            i = j;
        }

        auc
    }

    /// Binary cross-entropy with clipped probabilities.
    fn log_loss(y_true: &Array1<f64>, y_proba: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        let n = y_true.len() as f64;

        -y_true
            .iter()
            .zip(y_proba.iter())
            .map(|(&t, &p)| {
                let p_clipped = p.clamp(eps, 1.0 - eps);
                t * p_clipped.ln() + (1.0 - t) * (1.0 - p_clipped).ln()
            })
            .sum::<f64>()
            / n
    }

    /// Human-readable metrics block for terminal output.
    pub fn report(&self) -> String {
        let cm = &self.confusion_matrix;
        let mut s = String::new();
        s.push_str(&format!(
            "  Confusion:   TN={} FP={} FN={} TP={}\n",
            cm.tn, cm.fp, cm.fn_, cm.tp
        ));
        s.push_str(&format!("  Accuracy:    {:.4}\n", self.accuracy));
        s.push_str(&format!("  Precision:   {:.4}\n", self.precision));
        s.push_str(&format!("  Recall:      {:.4}\n", self.recall));
        s.push_str(&format!("  F1 Score:    {:.4}\n", self.f1));
        s.push_str(&format!("  AUC-ROC:     {:.4}\n", self.auc_roc));
        s.push_str(&format!("  Log Loss:    {:.4}\n", self.log_loss));
        s
    }
}
