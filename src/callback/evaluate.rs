use std::sync::Arc;

use burn::data::dataloader::DataLoader;
use burn::module::AutodiffModule;
use burn::prelude::ElementConversion;
use burn::tensor::backend::AutodiffBackend;

use crate::callback::{Callback, CallbackError, EpochMetrics};
use crate::episode::{EpisodeBatch, EpisodeShape};
use crate::model::FewShotEncoder;
use crate::proto::proto_net_episode;

/// Runs the validation-mode model over a held-out episode loader and reports
/// the averaged loss and n-shot accuracy.
pub struct EvaluateFewShot<B: AutodiffBackend> {
    loader: Arc<dyn DataLoader<EpisodeBatch<B::InnerBackend>>>,
    shape: EpisodeShape,
}

impl<B: AutodiffBackend> EvaluateFewShot<B> {
    pub fn new(
        loader: Arc<dyn DataLoader<EpisodeBatch<B::InnerBackend>>>,
        shape: EpisodeShape,
    ) -> Self {
        EvaluateFewShot { loader, shape }
    }
}

impl<B: AutodiffBackend> Callback<B> for EvaluateFewShot<B> {
    fn on_epoch_end(
        &mut self,
        _epoch: usize,
        model: &FewShotEncoder<B>,
        _lr: f64,
        metrics: &mut EpochMetrics,
    ) -> Result<(), CallbackError> {
        let model = model.valid();

        let mut loss_sum = 0.0;
        let mut accuracy_sum = 0.0;
        let mut episodes = 0usize;

        for batch in self.loader.iter() {
            let output = proto_net_episode(&model, batch);

            loss_sum += output.loss.into_scalar().elem::<f64>();
            accuracy_sum += output.accuracy;
            episodes += 1;
        }

        let episodes = episodes.max(1) as f64;
        metrics.push("val_loss", loss_sum / episodes);
        metrics.push(self.shape.accuracy_metric_name(), accuracy_sum / episodes);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::DataLoaderBuilder;

    use crate::data::synthetic::SyntheticImages;
    use crate::episode::{EpisodeBatcher, EpisodeDataset};
    use crate::model::FewShotEncoderConfig;

    type B = Autodiff<NdArray>;

    #[test]
    fn reports_val_metrics() {
        let device = NdArrayDevice::Cpu;
        let shape = EpisodeShape::new(1, 5, 1);

        let tasks = EpisodeDataset::new(
            Arc::new(SyntheticImages::new(5, 20, 1, 16)),
            2,
            shape,
        )
        .unwrap();
        let loader = DataLoaderBuilder::new(EpisodeBatcher::<NdArray>::new(device))
            .batch_size(1)
            .build(tasks);

        let model = FewShotEncoderConfig::new(1).init::<B>(&NdArrayDevice::Cpu);
        let mut evaluate = EvaluateFewShot::<B>::new(loader, shape);

        let mut metrics = EpochMetrics::default();
        Callback::<B>::on_epoch_end(&mut evaluate, 1, &model, 1e-3, &mut metrics).unwrap();

        assert!(metrics.get("val_loss").unwrap().is_finite());
        let accuracy = metrics.get("val_1-shot_5-way_acc").unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
    }
}
