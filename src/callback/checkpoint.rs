use std::fs;
use std::path::PathBuf;

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use crate::callback::{Callback, CallbackError, EpochMetrics};
use crate::model::FewShotEncoder;

/// Persists the model whenever the monitored metric improves. The file path is
/// fixed for the whole run, so the checkpoint on disk is always the best seen.
pub struct ModelCheckpoint {
    filepath: PathBuf,
    monitor: String,
    best: Option<f64>,
}

impl ModelCheckpoint {
    pub fn new(filepath: impl Into<PathBuf>, monitor: impl Into<String>) -> Self {
        ModelCheckpoint {
            filepath: filepath.into(),
            monitor: monitor.into(),
            best: None,
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

impl<B: AutodiffBackend> Callback<B> for ModelCheckpoint {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        model: &FewShotEncoder<B>,
        _lr: f64,
        metrics: &mut EpochMetrics,
    ) -> Result<(), CallbackError> {
        let value = metrics
            .get(&self.monitor)
            .ok_or_else(|| CallbackError::MissingMetric(self.monitor.clone()))?;

        if self.best.map_or(true, |best| value > best) {
            if let Some(parent) = self.filepath.parent() {
                fs::create_dir_all(parent)?;
            }

            let recorder: NamedMpkFileRecorder<FullPrecisionSettings> = NamedMpkFileRecorder::new();
            model.clone().save_file(self.filepath.clone(), &recorder)?;

            info!(epoch, metric = %self.monitor, value, "saved new best model");
            self.best = Some(value);
        }

        Ok(())
    }
}
