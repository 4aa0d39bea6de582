use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::backend::wgpu::WgpuDevice;
use burn::backend::{Autodiff, Wgpu};
use burn::data::dataloader::DataLoaderBuilder;
use burn::optim::AdamConfig;
use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use protonet::callback::checkpoint::ModelCheckpoint;
use protonet::callback::csv_logger::CsvLogger;
use protonet::callback::evaluate::EvaluateFewShot;
use protonet::callback::lr_scheduler::LearningRateScheduler;
use protonet::callback::Callback;
use protonet::config::{DatasetName, ExperimentConfig};
use protonet::data::mini_imagenet::MiniImageNet;
use protonet::data::omniglot::Omniglot;
use protonet::data::{ClassDataset, DataError, Split};
use protonet::episode::{EpisodeBatcher, EpisodeDataset, EpisodeShape};
use protonet::model::FewShotEncoderConfig;
use protonet::train::fit;

type B = Wgpu;

/// Reproduce the Prototypical Networks few-shot classification result.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    dataset: String,
    #[arg(long, default_value_t = 1)]
    n_train: usize,
    #[arg(long, default_value_t = 1)]
    n_test: usize,
    #[arg(long, default_value_t = 30)]
    k_train: usize,
    #[arg(long, default_value_t = 5)]
    k_test: usize,
    #[arg(long, default_value_t = 15)]
    q_train: usize,
    #[arg(long, default_value_t = 1)]
    q_test: usize,
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

fn open_dataset(
    name: DatasetName,
    data_dir: &Path,
    split: Split,
) -> Result<Arc<dyn ClassDataset>, DataError> {
    Ok(match name {
        DatasetName::Omniglot => Arc::new(Omniglot::new(data_dir, split)?),
        DatasetName::MiniImageNet => Arc::new(MiniImageNet::new(data_dir, split)?),
    })
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // fail on an unknown dataset before touching disk or device
    let dataset: DatasetName = args.dataset.parse()?;
    let config = ExperimentConfig::resolve(
        dataset,
        EpisodeShape::new(args.n_train, args.k_train, args.q_train),
        EpisodeShape::new(args.n_test, args.k_test, args.q_test),
        args.data_dir,
        args.output_dir,
    );

    let device = WgpuDevice::default();

    let background = open_dataset(config.dataset, &config.data_dir, Split::Background)?;
    let background_tasks =
        EpisodeDataset::new(background, config.episodes_per_epoch, config.train)?;
    let background_taskloader =
        DataLoaderBuilder::new(EpisodeBatcher::<Autodiff<B>>::new(device.clone()))
            .batch_size(1)
            .num_workers(4)
            .build(background_tasks);

    let evaluation = open_dataset(config.dataset, &config.data_dir, Split::Evaluation)?;
    let evaluation_tasks =
        EpisodeDataset::new(evaluation, config.evaluation_episodes, config.eval)?;
    let evaluation_taskloader = DataLoaderBuilder::new(EpisodeBatcher::<B>::new(device.clone()))
        .batch_size(1)
        .num_workers(4)
        .build(evaluation_tasks);

    let model = FewShotEncoderConfig::new(config.num_input_channels).init::<Autodiff<B>>(&device);
    let optimizer = AdamConfig::new().init();

    if let Some(parent) = config.log_path().parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(
        config.log_path().with_extension("json"),
        serde_json::to_string_pretty(&config)?,
    )?;

    info!("training prototypical network on {}", config.dataset);

    let mut callbacks: Vec<Box<dyn Callback<Autodiff<B>>>> = vec![
        Box::new(EvaluateFewShot::<Autodiff<B>>::new(
            evaluation_taskloader,
            config.eval,
        )),
        Box::new(ModelCheckpoint::new(
            config.checkpoint_path(),
            config.monitor_metric(),
        )),
        Box::new(LearningRateScheduler::step_decay(config.drop_lr_every)),
        Box::new(CsvLogger::new(config.log_path())),
    ];

    fit(
        model,
        optimizer,
        config.n_epochs,
        config.initial_lr,
        background_taskloader,
        &mut callbacks,
    )?;

    info!(
        "done; best checkpoint at {}.mpk, log at {}",
        config.checkpoint_path().display(),
        config.log_path().display()
    );

    Ok(())
}
