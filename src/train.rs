use std::sync::Arc;

use burn::data::dataloader::DataLoader;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use thiserror::Error;
use tracing::info;

use crate::callback::{Callback, CallbackError, EpochMetrics};
use crate::episode::EpisodeBatch;
use crate::model::FewShotEncoder;
use crate::proto::proto_net_episode;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Callback(#[from] CallbackError),
}

/// Episodic training loop: one optimisation step per episode, callbacks at
/// epoch boundaries. Epochs are numbered from 1. Any callback failure aborts
/// the run; the last written checkpoint is the restart point.
pub fn fit<B, O>(
    mut model: FewShotEncoder<B>,
    mut optimizer: O,
    epochs: usize,
    initial_lr: f64,
    dataloader: Arc<dyn DataLoader<EpisodeBatch<B>>>,
    callbacks: &mut [Box<dyn Callback<B>>],
) -> Result<FewShotEncoder<B>, TrainError>
where
    B: AutodiffBackend,
    O: Optimizer<FewShotEncoder<B>, B>,
{
    let mut lr = initial_lr;

    for callback in callbacks.iter_mut() {
        callback.on_train_begin(&mut lr)?;
    }

    for epoch in 1..=epochs {
        for callback in callbacks.iter_mut() {
            callback.on_epoch_begin(epoch, &mut lr)?;
        }

        let mut loss_sum = 0.0;
        let mut accuracy_sum = 0.0;
        let mut episodes = 0usize;

        for batch in dataloader.iter() {
            let output = proto_net_episode(&model, batch);

            let grads = output.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(lr, model, grads);

            loss_sum += output.loss.into_scalar().elem::<f64>();
            accuracy_sum += output.accuracy;
            episodes += 1;
        }

        let episodes = episodes.max(1) as f64;
        let mut metrics = EpochMetrics::default();
        metrics.push("loss", loss_sum / episodes);
        metrics.push("categorical_accuracy", accuracy_sum / episodes);

        for callback in callbacks.iter_mut() {
            callback.on_epoch_end(epoch, &model, lr, &mut metrics)?;
        }

        info!(
            "epoch {}/{}: loss={:.4}, acc={:.4}",
            epoch,
            epochs,
            metrics.get("loss").unwrap_or(f64::NAN),
            metrics.get("categorical_accuracy").unwrap_or(f64::NAN),
        );
    }

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::DataLoaderBuilder;
    use burn::optim::AdamConfig;
    use std::fs;

    use crate::callback::checkpoint::ModelCheckpoint;
    use crate::callback::csv_logger::CsvLogger;
    use crate::callback::evaluate::EvaluateFewShot;
    use crate::callback::lr_scheduler::LearningRateScheduler;
    use crate::data::synthetic::SyntheticImages;
    use crate::episode::{EpisodeBatcher, EpisodeDataset, EpisodeShape};
    use crate::model::FewShotEncoderConfig;

    type B = Autodiff<NdArray>;

    #[test]
    fn one_epoch_smoke_run_writes_checkpoint_and_log_row() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_stem = dir.path().join("models").join("smoke");
        let log_path = dir.path().join("logs").join("smoke.csv");

        let device = NdArrayDevice::Cpu;
        let shape = EpisodeShape::new(1, 5, 1);
        let dataset = Arc::new(SyntheticImages::new(5, 20, 1, 16));

        let train_tasks = EpisodeDataset::new(dataset.clone(), 2, shape).unwrap();
        let train_loader = DataLoaderBuilder::new(EpisodeBatcher::<B>::new(device))
            .batch_size(1)
            .build(train_tasks);

        let eval_tasks = EpisodeDataset::new(dataset, 2, shape).unwrap();
        let eval_loader = DataLoaderBuilder::new(EpisodeBatcher::<NdArray>::new(device))
            .batch_size(1)
            .build(eval_tasks);

        let model = FewShotEncoderConfig::new(1).init::<B>(&device);
        let optimizer = AdamConfig::new().init();

        let mut callbacks: Vec<Box<dyn Callback<B>>> = vec![
            Box::new(EvaluateFewShot::<B>::new(eval_loader, shape)),
            Box::new(ModelCheckpoint::new(
                &checkpoint_stem,
                shape.accuracy_metric_name(),
            )),
            Box::new(LearningRateScheduler::step_decay(20)),
            Box::new(CsvLogger::new(&log_path)),
        ];

        fit(model, optimizer, 1, 1e-3, train_loader, &mut callbacks).unwrap();

        assert!(checkpoint_stem.with_extension("mpk").exists());

        let log = fs::read_to_string(&log_path).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "epoch,lr,loss,categorical_accuracy,val_loss,val_1-shot_5-way_acc"
        );
        assert!(lines[1].starts_with("1,0.001,"));
    }

    #[test]
    fn callback_failure_aborts_the_run() {
        let device = NdArrayDevice::Cpu;
        let shape = EpisodeShape::new(1, 3, 1);
        let dataset = Arc::new(SyntheticImages::new(3, 4, 1, 8));

        let train_tasks = EpisodeDataset::new(dataset, 1, shape).unwrap();
        let train_loader = DataLoaderBuilder::new(EpisodeBatcher::<B>::new(device))
            .batch_size(1)
            .build(train_tasks);

        let model = FewShotEncoderConfig::new(1).init::<B>(&device);
        let optimizer = AdamConfig::new().init();

        // monitors a metric nothing produces
        let mut callbacks: Vec<Box<dyn Callback<B>>> = vec![Box::new(ModelCheckpoint::new(
            std::env::temp_dir().join("never-written"),
            "val_acc",
        ))];

        let result = fit(model, optimizer, 1, 1e-3, train_loader, &mut callbacks);
        assert!(matches!(
            result,
            Err(TrainError::Callback(CallbackError::MissingMetric(_)))
        ));
    }
}
