use burn::tensor::backend::AutodiffBackend;
use thiserror::Error;

use crate::model::FewShotEncoder;

pub mod checkpoint;
pub mod csv_logger;
pub mod evaluate;
pub mod lr_scheduler;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("metric `{0}` is not tracked for this run")]
    MissingMetric(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("failed to record checkpoint: {0}")]
    Recorder(#[from] burn::record::RecorderError),
}

/// Ordered per-epoch scalar record. Insertion order is the column order of the
/// metric log.
#[derive(Debug, Clone, Default)]
pub struct EpochMetrics {
    entries: Vec<(String, f64)>,
}

impl EpochMetrics {
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// A post-epoch hook. The training loop invokes every hook in a fixed order;
/// a hook failure aborts the run.
pub trait Callback<B: AutodiffBackend> {
    fn on_train_begin(&mut self, _lr: &mut f64) -> Result<(), CallbackError> {
        Ok(())
    }

    fn on_epoch_begin(&mut self, _epoch: usize, _lr: &mut f64) -> Result<(), CallbackError> {
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        _epoch: usize,
        _model: &FewShotEncoder<B>,
        _lr: f64,
        _metrics: &mut EpochMetrics,
    ) -> Result<(), CallbackError> {
        Ok(())
    }
}
