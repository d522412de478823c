//! Dataset registry
//!
//! Static metadata for the long-tailed CIFAR variants and a tiny fixture
//! dataset used in tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{LaError, Result};
use crate::schedule::StepSchedule;

/// Which half of a dataset to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    /// Training split when `training` is set
    pub fn from_training(training: bool) -> Self {
        if training {
            Split::Train
        } else {
            Split::Test
        }
    }

    pub fn is_train(self) -> bool {
        self == Split::Train
    }
}

/// Metadata for a registered dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Registry key
    pub name: String,
    /// Number of label classes
    pub num_classes: usize,
    /// TFRecord file holding the training split
    pub train_file_name: String,
    /// TFRecord file holding the test split
    pub test_file_name: String,
    /// Training examples
    pub num_train: usize,
    /// Test examples
    pub num_test: usize,
    /// Epochs to train for
    pub num_epochs: u32,
    /// (multiplier, epoch to start) pairs; the first entry ends warmup
    pub lr_schedule: Vec<(f64, u32)>,
}

impl DatasetSpec {
    #[allow(clippy::too_many_arguments)]
    fn new(
        name: &str,
        num_classes: usize,
        train_file_name: &str,
        test_file_name: &str,
        num_train: usize,
        num_test: usize,
        num_epochs: u32,
        lr_schedule: &[(f64, u32)],
    ) -> Self {
        Self {
            name: name.into(),
            num_classes,
            train_file_name: train_file_name.into(),
            test_file_name: test_file_name.into(),
            num_train,
            num_test,
            num_epochs,
            lr_schedule: lr_schedule.to_vec(),
        }
    }

    /// File name for a split
    pub fn file_name(&self, split: Split) -> &str {
        match split {
            Split::Train => &self.train_file_name,
            Split::Test => &self.test_file_name,
        }
    }

    /// Full path of a split's file under `data_home`
    pub fn file_path(&self, data_home: impl AsRef<Path>, split: Split) -> PathBuf {
        data_home.as_ref().join(self.file_name(split))
    }

    /// Example count for a split
    pub fn num_examples(&self, split: Split) -> usize {
        match split {
            Split::Train => self.num_train,
            Split::Test => self.num_test,
        }
    }

    /// Batches per pass over a split.
    ///
    /// Training drops the last partial batch, evaluation keeps it.
    pub fn steps_per_epoch(&self, batch_size: usize, split: Split) -> Result<u64> {
        if batch_size == 0 {
            return Err(LaError::invalid("batch_size must be positive"));
        }
        let n = self.num_examples(split);
        let steps = match split {
            Split::Train => n / batch_size,
            Split::Test => n.div_ceil(batch_size),
        };
        Ok(steps as u64)
    }

    /// Total optimizer steps for the configured number of epochs
    pub fn total_steps(&self, batch_size: usize) -> Result<u64> {
        Ok(self.steps_per_epoch(batch_size, Split::Train)? * u64::from(self.num_epochs))
    }

    /// Learning-rate schedule for this dataset at a given batch size
    pub fn build_schedule(&self, batch_size: usize, base_learning_rate: f64) -> Result<StepSchedule> {
        let steps_per_epoch = self.steps_per_epoch(batch_size, Split::Train)?;
        StepSchedule::new(self.lr_schedule.clone(), steps_per_epoch, base_learning_rate)
    }
}

/// Returns dataset name -> spec mappings
pub fn dataset_mappings() -> BTreeMap<String, DatasetSpec> {
    let specs = [
        DatasetSpec::new(
            "cifar10-lt",
            10,
            "cifar10-lt_train.tfrecord",
            "cifar10_test.tfrecord",
            12406,
            10000,
            200,
            &[(1.0, 5), (0.1, 160), (0.01, 180)],
        ),
        DatasetSpec::new(
            "cifar100-lt",
            100,
            "cifar100-lt_train.tfrecord",
            "cifar100_test.tfrecord",
            10847,
            10000,
            1419,
            &[(1.0, 22), (0.1, 691), (0.01, 1059), (0.001, 1290)],
        ),
        DatasetSpec::new("test", 10, "test.tfrecord", "test.tfrecord", 4, 4, 2, &[(1.0, 2)]),
    ];

    specs.into_iter().map(|s| (s.name.clone(), s)).collect()
}

/// Look up a dataset by name
pub fn lookup(name: &str) -> Result<DatasetSpec> {
    let mut mappings = dataset_mappings();
    mappings.remove(name).ok_or_else(|| LaError::DatasetNotFound {
        name: name.into(),
        known: mappings.keys().cloned().collect::<Vec<_>>().join(", "),
    })
}
