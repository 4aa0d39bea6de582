use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::episode::EpisodeShape;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported dataset `{0}`")]
    UnsupportedDataset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DatasetName {
    Omniglot,
    MiniImageNet,
}

impl FromStr for DatasetName {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "omniglot" => Ok(DatasetName::Omniglot),
            "miniImageNet" => Ok(DatasetName::MiniImageNet),
            other => Err(ConfigError::UnsupportedDataset(other.to_owned())),
        }
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatasetName::Omniglot => "omniglot",
            DatasetName::MiniImageNet => "miniImageNet",
        })
    }
}

/// Everything about a run that is fixed at process start.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentConfig {
    pub dataset: DatasetName,
    pub train: EpisodeShape,
    pub eval: EpisodeShape,
    pub n_epochs: usize,
    pub num_input_channels: usize,
    pub drop_lr_every: usize,
    pub episodes_per_epoch: usize,
    pub evaluation_episodes: usize,
    pub initial_lr: f64,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ExperimentConfig {
    pub fn resolve(
        dataset: DatasetName,
        train: EpisodeShape,
        eval: EpisodeShape,
        data_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        let (n_epochs, num_input_channels, drop_lr_every) = match dataset {
            DatasetName::Omniglot => (40, 1, 20),
            DatasetName::MiniImageNet => (40, 3, 40),
        };

        ExperimentConfig {
            dataset,
            train,
            eval,
            n_epochs,
            num_input_channels,
            drop_lr_every,
            episodes_per_epoch: 100,
            evaluation_episodes: 1000,
            initial_lr: 1e-3,
            data_dir,
            output_dir,
        }
    }

    pub fn param_str(&self) -> String {
        format!(
            "proto_net_{}_n={}_k={}_q={}",
            self.dataset, self.train.n_shot, self.train.k_way, self.train.q_queries
        )
    }

    /// Checkpoint stem; the recorder appends its own extension.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join("models").join(self.param_str())
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir
            .join("logs")
            .join("proto_nets")
            .join(format!("{}.csv", self.param_str()))
    }

    pub fn monitor_metric(&self) -> String {
        self.eval.accuracy_metric_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(dataset: DatasetName) -> ExperimentConfig {
        ExperimentConfig::resolve(
            dataset,
            EpisodeShape::new(1, 30, 15),
            EpisodeShape::new(1, 5, 1),
            PathBuf::from("data"),
            PathBuf::from("output"),
        )
    }

    #[test]
    fn omniglot_resolution() {
        let config = resolve(DatasetName::Omniglot);

        assert_eq!(config.n_epochs, 40);
        assert_eq!(config.num_input_channels, 1);
        assert_eq!(config.drop_lr_every, 20);
        assert_eq!(config.episodes_per_epoch, 100);
        assert_eq!(config.evaluation_episodes, 1000);
    }

    #[test]
    fn mini_imagenet_resolution() {
        let config = resolve(DatasetName::MiniImageNet);

        assert_eq!(config.n_epochs, 40);
        assert_eq!(config.num_input_channels, 3);
        assert_eq!(config.drop_lr_every, 40);
    }

    #[test]
    fn unsupported_dataset_fails_at_parse() {
        assert_eq!(
            "cifar".parse::<DatasetName>(),
            Err(ConfigError::UnsupportedDataset("cifar".to_owned()))
        );
    }

    #[test]
    fn dataset_names_round_trip() {
        for name in ["omniglot", "miniImageNet"] {
            assert_eq!(name.parse::<DatasetName>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn artifact_names_are_deterministic() {
        let config = resolve(DatasetName::Omniglot);

        assert_eq!(config.param_str(), "proto_net_omniglot_n=1_k=30_q=15");
        assert_eq!(config.param_str(), resolve(DatasetName::Omniglot).param_str());
        assert_eq!(
            config.checkpoint_path(),
            PathBuf::from("output/models/proto_net_omniglot_n=1_k=30_q=15")
        );
        assert_eq!(
            config.log_path(),
            PathBuf::from("output/logs/proto_nets/proto_net_omniglot_n=1_k=30_q=15.csv")
        );
        assert_eq!(config.monitor_metric(), "val_1-shot_5-way_acc");
    }

    #[test]
    fn artifact_names_do_not_collide() {
        let base = resolve(DatasetName::Omniglot);

        let mut n5 = base.clone();
        n5.train = EpisodeShape::new(5, 30, 15);
        let mut k20 = base.clone();
        k20.train = EpisodeShape::new(1, 20, 15);
        let mut q5 = base.clone();
        q5.train = EpisodeShape::new(1, 30, 5);

        let names = [
            base.param_str(),
            n5.param_str(),
            k20.param_str(),
            q5.param_str(),
            resolve(DatasetName::MiniImageNet).param_str(),
        ];
        for (i, a) in names.iter().enumerate() {
            for b in names.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
