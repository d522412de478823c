//! Step learning-rate schedule with linear warmup

use serde::{Deserialize, Serialize};

use crate::error::{LaError, Result};

/// Serializable form of a [`StepSchedule`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// (multiplier, start epoch) pairs
    pub schedule: Vec<(f64, u32)>,
    pub steps_per_epoch: u64,
    pub base_learning_rate: f64,
}

/// Piecewise-constant schedule.
///
/// The learning rate ramps linearly from zero to `base * m0` over the first
/// `e0` epochs, where `(m0, e0)` is the first entry. From then on the latest
/// entry whose start epoch has been reached sets `base * m`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSchedule {
    schedule: Vec<(f64, u32)>,
    steps_per_epoch: u64,
    base_learning_rate: f64,
}

impl StepSchedule {
    pub fn new(schedule: Vec<(f64, u32)>, steps_per_epoch: u64, base_learning_rate: f64) -> Result<Self> {
        let Some(&(_, warmup_end_epoch)) = schedule.first() else {
            return Err(LaError::invalid("learning-rate schedule is empty"));
        };
        if warmup_end_epoch == 0 {
            return Err(LaError::invalid("warmup must end after epoch 0"));
        }
        if steps_per_epoch == 0 {
            return Err(LaError::invalid("steps_per_epoch must be positive"));
        }
        Ok(Self {
            schedule,
            steps_per_epoch,
            base_learning_rate,
        })
    }

    pub fn from_config(config: ScheduleConfig) -> Result<Self> {
        Self::new(config.schedule, config.steps_per_epoch, config.base_learning_rate)
    }

    /// Learning rate at an optimizer step
    pub fn learning_rate(&self, step: u64) -> f64 {
        let lr_epoch = step as f64 / self.steps_per_epoch as f64;
        let (warmup_mult, warmup_end_epoch) = self.schedule[0];
        let mut lr = self.base_learning_rate * warmup_mult * lr_epoch / f64::from(warmup_end_epoch);
        for &(mult, start_epoch) in &self.schedule {
            if lr_epoch >= f64::from(start_epoch) {
                lr = self.base_learning_rate * mult;
            }
        }
        lr
    }

    /// First step at which each schedule entry takes effect
    pub fn boundaries(&self) -> Vec<u64> {
        self.schedule
            .iter()
            .map(|&(_, epoch)| u64::from(epoch) * self.steps_per_epoch)
            .collect()
    }

    pub fn config(&self) -> ScheduleConfig {
        ScheduleConfig {
            schedule: self.schedule.clone(),
            steps_per_epoch: self.steps_per_epoch,
            base_learning_rate: self.base_learning_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cifar10() -> StepSchedule {
        StepSchedule::new(vec![(1.0, 5), (0.1, 160), (0.01, 180)], 100, 0.1).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_warmup_is_linear() {
        let s = cifar10();
        assert_eq!(s.learning_rate(0), 0.0);
        assert!(close(s.learning_rate(250), 0.05));
        assert!(close(s.learning_rate(499), 0.1 * 4.99 / 5.0));
    }

    #[test]
    fn test_steps_after_warmup() {
        let s = cifar10();
        assert!(close(s.learning_rate(500), 0.1));
        assert!(close(s.learning_rate(15_999), 0.1));
        assert!(close(s.learning_rate(16_000), 0.01));
        assert!(close(s.learning_rate(18_000), 0.001));
        assert!(close(s.learning_rate(1_000_000), 0.001));
    }

    #[test]
    fn test_warmup_multiplier_applies() {
        let s = StepSchedule::new(vec![(2.0, 2)], 10, 0.5).unwrap();
        assert!(close(s.learning_rate(10), 0.5));
        assert!(close(s.learning_rate(20), 1.0));
    }

    #[test]
    fn test_invalid_schedules() {
        assert!(StepSchedule::new(vec![], 10, 0.1).is_err());
        assert!(StepSchedule::new(vec![(1.0, 0)], 10, 0.1).is_err());
        assert!(StepSchedule::new(vec![(1.0, 5)], 0, 0.1).is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let s = cifar10();
        let json = serde_json::to_string(&s.config()).unwrap();
        let back = StepSchedule::from_config(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(back, s);
        assert_eq!(s.boundaries(), vec![500, 16_000, 18_000]);
    }
}
