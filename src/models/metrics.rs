/// Метрики качества классификации

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision_weighted: f64,
    pub recall_weighted: f64,
    pub f1_weighted: f64,
}

impl ClassificationMetrics {
    /// Взвешенные по поддержке метрики; деление на ноль дает 0
    pub fn compute(y_true: &[usize], y_pred: &[usize]) -> Self {
        assert_eq!(y_true.len(), y_pred.len(), "Arrays must have the same length");

        if y_true.is_empty() {
            return Self {
                accuracy: 0.0,
                precision_weighted: 0.0,
                recall_weighted: 0.0,
                f1_weighted: 0.0,
            };
        }

        let n = y_true.len() as f64;
        let labels: BTreeSet<usize> = y_true.iter().chain(y_pred.iter()).copied().collect();

        let mut precision = 0.0;
        let mut recall = 0.0;
        let mut f1 = 0.0;

        for label in labels {
            let tp = y_true
                .iter()
                .zip(y_pred)
                .filter(|&(&t, &p)| t == label && p == label)
                .count() as f64;
            let predicted = y_pred.iter().filter(|&&p| p == label).count() as f64;
            let support = y_true.iter().filter(|&&t| t == label).count() as f64;

            let p = safe_div(tp, predicted);
            let r = safe_div(tp, support);
            let f = safe_div(2.0 * p * r, p + r);

            let weight = support / n;
            precision += p * weight;
            recall += r * weight;
            f1 += f * weight;
        }

        Self {
            accuracy: accuracy(y_true, y_pred),
            precision_weighted: precision,
            recall_weighted: recall,
            f1_weighted: f1,
        }
    }
}

pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let y = [0, 1, 2, 1];
        let m = ClassificationMetrics::compute(&y, &y);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision_weighted, 1.0);
        assert_eq!(m.recall_weighted, 1.0);
        assert_eq!(m.f1_weighted, 1.0);
    }

    #[test]
    fn test_weighted_scores() {
        // класс 0: support 2, класс 1: support 2
        let y_true = [0, 0, 1, 1];
        let y_pred = [0, 1, 1, 1];
        let m = ClassificationMetrics::compute(&y_true, &y_pred);
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        // precision: class0 = 1.0, class1 = 2/3
        assert!((m.precision_weighted - (0.5 + 1.0 / 3.0)).abs() < 1e-12);
        // recall: class0 = 0.5, class1 = 1.0
        assert!((m.recall_weighted - 0.75).abs() < 1e-12);
        let f0 = 2.0 * 1.0 * 0.5 / 1.5;
        let f1 = 2.0 * (2.0 / 3.0) * 1.0 / (2.0 / 3.0 + 1.0);
        assert!((m.f1_weighted - (f0 + f1) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let m = ClassificationMetrics::compute(&[0, 0], &[1, 1]);
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(m.precision_weighted, 0.0);
        assert_eq!(m.f1_weighted, 0.0);
    }
}
