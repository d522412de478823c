//! Logit-adjusted softmax cross-entropy
//!
//! With adjustment enabled, `ln(p^tau + 1e-12)` is added to each class logit
//! before the cross-entropy, where `p` is the class prior.

use serde::Serialize;

use crate::error::{LaError, Result};

/// Added inside the log so empty classes stay finite
pub const PRIOR_EPSILON: f64 = 1e-12;

/// Loss over `[N, C]` row-major logits and `N` integer labels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossFn {
    /// Apply the log-prior adjustment
    pub use_la_loss: bool,
    /// Class priors; length defines the class count
    pub base_probs: Vec<f32>,
    /// Temperature applied to the priors
    pub tau: f32,
    #[serde(skip)]
    offsets: Vec<f32>,
}

/// Build the training loss
pub fn build_loss_fn(use_la_loss: bool, base_probs: Vec<f32>, tau: f32) -> LossFn {
    let offsets = base_probs
        .iter()
        .map(|&p| ((p as f64).powf(tau as f64) + PRIOR_EPSILON).ln() as f32)
        .collect();
    LossFn {
        use_la_loss,
        base_probs,
        tau,
        offsets,
    }
}

impl LossFn {
    /// Class count
    pub fn num_classes(&self) -> usize {
        self.base_probs.len()
    }

    /// Per-class additive offsets applied when adjustment is on
    pub fn offsets(&self) -> &[f32] {
        &self.offsets
    }

    /// Logits as seen by the cross-entropy
    pub fn adjust_logits(&self, logits: &[f32]) -> Result<Vec<f32>> {
        self.check_logits(logits)?;
        if !self.use_la_loss {
            return Ok(logits.to_vec());
        }
        Ok(logits
            .chunks_exact(self.num_classes())
            .flat_map(|row| row.iter().zip(&self.offsets).map(|(l, o)| l + o))
            .collect())
    }

    /// Cross-entropy for each example
    pub fn per_example_loss(&self, labels: &[i64], logits: &[f32]) -> Result<Vec<f32>> {
        let adjusted = self.adjust_logits(logits)?;
        let c = self.num_classes();
        if labels.len() * c != logits.len() {
            return Err(LaError::invalid(format!(
                "{} labels for {} logits over {} classes",
                labels.len(),
                logits.len(),
                c
            )));
        }

        labels
            .iter()
            .zip(adjusted.chunks_exact(c))
            .map(|(&label, row)| {
                let idx = class_index(label, c)?;
                Ok(log_sum_exp(row) - row[idx])
            })
            .collect()
    }

    /// Mean cross-entropy over the batch
    pub fn loss(&self, labels: &[i64], logits: &[f32]) -> Result<f32> {
        let losses = self.per_example_loss(labels, logits)?;
        if losses.is_empty() {
            return Err(LaError::invalid("empty batch"));
        }
        let sum: f64 = losses.iter().map(|&l| l as f64).sum();
        Ok((sum / losses.len() as f64) as f32)
    }

    /// Argmax of `logits - tau * ln(p)`, the post-hoc adjusted prediction
    pub fn adjusted_predictions(&self, logits: &[f32]) -> Result<Vec<usize>> {
        self.check_logits(logits)?;
        Ok(logits
            .chunks_exact(self.num_classes())
            .map(|row| {
                let scores = row.iter().zip(&self.offsets).map(|(l, o)| l - o);
                argmax(scores)
            })
            .collect())
    }

    fn check_logits(&self, logits: &[f32]) -> Result<()> {
        let c = self.num_classes();
        if c == 0 {
            return Err(LaError::invalid("base_probs is empty"));
        }
        if logits.len() % c != 0 {
            return Err(LaError::invalid(format!(
                "logits length {} is not a multiple of {} classes",
                logits.len(),
                c
            )));
        }
        Ok(())
    }
}

fn class_index(label: i64, num_classes: usize) -> Result<usize> {
    usize::try_from(label)
        .ok()
        .filter(|&idx| idx < num_classes)
        .ok_or(LaError::LabelOutOfRange { label, num_classes })
}

fn log_sum_exp(row: &[f32]) -> f32 {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = row.iter().map(|&v| ((v - max) as f64).exp()).sum();
    max + sum.ln() as f32
}

fn argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

/// Count labels per class
pub fn class_counts(labels: &[i64], num_classes: usize) -> Result<Vec<u64>> {
    let mut counts = vec![0u64; num_classes];
    for &label in labels {
        counts[class_index(label, num_classes)?] += 1;
    }
    Ok(counts)
}

/// Normalize class counts into priors
pub fn base_probs_from_counts(counts: &[u64]) -> Result<Vec<f32>> {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return Err(LaError::invalid("no labels counted"));
    }
    Ok(counts
        .iter()
        .map(|&c| (c as f64 / total as f64) as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_plain_cross_entropy() {
        let loss = build_loss_fn(false, vec![0.5, 0.5], 1.0);
        // Equal logits: ln(2)
        let value = loss.loss(&[0], &[1.0, 1.0]).unwrap();
        assert!(close(value, std::f32::consts::LN_2));

        let per = loss.per_example_loss(&[0, 1], &[2.0, 0.0, 2.0, 0.0]).unwrap();
        let expected0 = (1.0f32 + (-2.0f32).exp()).ln();
        assert!(close(per[0], expected0));
        assert!(close(per[1], expected0 + 2.0));
    }

    #[test]
    fn test_adjustment_adds_log_prior() {
        let loss = build_loss_fn(true, vec![0.9, 0.1], 1.0);
        let adjusted = loss.adjust_logits(&[0.0, 0.0]).unwrap();
        assert!(close(adjusted[0], 0.9f32.ln()));
        assert!(close(adjusted[1], 0.1f32.ln()));

        // Zero logits + log priors gives softmax == priors.
        let value = loss.loss(&[1], &[0.0, 0.0]).unwrap();
        assert!(close(value, -(0.1f32.ln())));
    }

    #[test]
    fn test_default_tau_offsets_are_log_priors() {
        let loss = build_loss_fn(true, vec![0.5, 0.3, 0.2], crate::DEFAULT_TAU);
        assert!(close(loss.offsets()[0], 0.5f32.ln()));
        assert!(close(loss.offsets()[2], 0.2f32.ln()));
    }

    #[test]
    fn test_tau_scales_prior() {
        let loss = build_loss_fn(true, vec![0.25, 0.75], 2.0);
        assert!(close(loss.offsets()[0], (0.0625f32).ln()));
        let off = build_loss_fn(true, vec![0.25, 0.75], 0.0);
        assert!(off.offsets().iter().all(|o| o.abs() < 1e-6));
    }

    #[test]
    fn test_zero_prior_stays_finite() {
        let loss = build_loss_fn(true, vec![1.0, 0.0], 1.0);
        let value = loss.loss(&[0], &[0.0, 0.0]).unwrap();
        assert!(value.is_finite());
        assert!(close(loss.offsets()[1], (1e-12f64).ln() as f32));
    }

    #[test]
    fn test_shape_and_label_errors() {
        let loss = build_loss_fn(true, vec![0.5, 0.5], 1.0);
        assert!(loss.loss(&[0], &[0.0, 0.0, 0.0]).is_err());
        assert!(loss.loss(&[0, 1], &[0.0, 0.0]).is_err());
        assert!(matches!(
            loss.loss(&[2], &[0.0, 0.0]),
            Err(LaError::LabelOutOfRange { label: 2, num_classes: 2 })
        ));
        assert!(loss.loss(&[-1], &[0.0, 0.0]).is_err());
        assert!(loss.loss(&[], &[]).is_err());
    }

    #[test]
    fn test_large_logits_are_stable() {
        let loss = build_loss_fn(false, vec![0.5, 0.5], 1.0);
        let value = loss.loss(&[0], &[1000.0, 0.0]).unwrap();
        assert!(close(value, 0.0));
    }

    #[test]
    fn test_adjusted_predictions_favor_rare_class() {
        let loss = build_loss_fn(true, vec![0.99, 0.01], 1.0);
        // Raw argmax is class 0, but the head-class prior is subtracted.
        let preds = loss.adjusted_predictions(&[1.0, 0.0]).unwrap();
        assert_eq!(preds, vec![1]);
    }

    #[test]
    fn test_base_probs_from_counts() {
        let counts = class_counts(&[0, 0, 0, 1], 3).unwrap();
        assert_eq!(counts, vec![3, 1, 0]);
        let probs = base_probs_from_counts(&counts).unwrap();
        assert_eq!(probs, vec![0.75, 0.25, 0.0]);
        assert!(base_probs_from_counts(&[0, 0]).is_err());
        assert!(class_counts(&[5], 3).is_err());
    }
}
