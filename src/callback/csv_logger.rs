use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use burn::tensor::backend::AutodiffBackend;

use crate::callback::{Callback, CallbackError, EpochMetrics};
use crate::model::FewShotEncoder;

/// Appends one row per epoch to a CSV file. Columns are pinned to the metrics
/// of the first logged epoch; rows are never rewritten.
pub struct CsvLogger {
    path: PathBuf,
    keys: Option<Vec<String>>,
}

impl CsvLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvLogger {
            path: path.into(),
            keys: None,
        }
    }
}

impl<B: AutodiffBackend> Callback<B> for CsvLogger {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        _model: &FewShotEncoder<B>,
        lr: f64,
        metrics: &mut EpochMetrics,
    ) -> Result<(), CallbackError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let write_header = !self.path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        let keys = self
            .keys
            .get_or_insert_with(|| metrics.iter().map(|(name, _)| name.to_owned()).collect());

        if write_header {
            let mut header = vec!["epoch".to_owned(), "lr".to_owned()];
            header.extend(keys.iter().cloned());
            writer.write_record(&header)?;
        }

        let mut row = vec![epoch.to_string(), lr.to_string()];
        row.extend(
            keys.iter()
                .map(|key| metrics.get(key).map(|value| value.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
        writer.flush()?;

        Ok(())
    }
}
