use std::iter;
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::{Backend, Int, Tensor};
use itertools::Itertools;
use rand::{thread_rng, Rng};
use serde::Serialize;

use crate::data::{ClassDataset, DataError, ImageSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EpisodeShape {
    pub n_shot: usize,
    pub k_way: usize,
    pub q_queries: usize,
}

impl EpisodeShape {
    pub fn new(n_shot: usize, k_way: usize, q_queries: usize) -> Self {
        EpisodeShape {
            n_shot,
            k_way,
            q_queries,
        }
    }

    pub fn accuracy_metric_name(&self) -> String {
        format!("val_{}-shot_{}-way_acc", self.n_shot, self.k_way)
    }
}

/// One sampled k-way task. Support and query samples are class-major, so the
/// episode-local target of query `i` is `i / q_queries`.
#[derive(Debug, Clone)]
pub struct Episode {
    pub support: Vec<ImageSample>,
    pub query: Vec<ImageSample>,
    pub shape: EpisodeShape,
}

pub fn sample_episode<D: ClassDataset + ?Sized>(
    dataset: &D,
    shape: EpisodeShape,
    rng: &mut impl Rng,
) -> Episode {
    let mut support = Vec::with_capacity(shape.k_way * shape.n_shot);
    let mut query = Vec::with_capacity(shape.k_way * shape.q_queries);

    let classes = rand::seq::index::sample(rng, dataset.num_classes(), shape.k_way);
    for class in classes {
        let picks = rand::seq::index::sample(
            rng,
            dataset.class_len(class),
            shape.n_shot + shape.q_queries,
        );
        for (position, index) in picks.into_iter().enumerate() {
            if position < shape.n_shot {
                support.push(dataset.get(class, index));
            } else {
                query.push(dataset.get(class, index));
            }
        }
    }

    Episode {
        support,
        query,
        shape,
    }
}

/// A finite run of freshly sampled episodes over a base dataset. Iterating
/// twice yields different tasks; an epoch is never replayed.
pub struct EpisodeDataset {
    dataset: Arc<dyn ClassDataset>,
    episodes: usize,
    shape: EpisodeShape,
}

impl EpisodeDataset {
    pub fn new(
        dataset: Arc<dyn ClassDataset>,
        episodes: usize,
        shape: EpisodeShape,
    ) -> Result<Self, DataError> {
        if shape.k_way > dataset.num_classes() {
            return Err(DataError::NotEnoughClasses {
                k: shape.k_way,
                available: dataset.num_classes(),
            });
        }

        let needed = shape.n_shot + shape.q_queries;
        for class in 0..dataset.num_classes() {
            let available = dataset.class_len(class);
            if available < needed {
                return Err(DataError::NotEnoughExamples {
                    class,
                    needed,
                    available,
                });
            }
        }

        Ok(EpisodeDataset {
            dataset,
            episodes,
            shape,
        })
    }
}

impl Dataset<Episode> for EpisodeDataset {
    fn get(&self, index: usize) -> Option<Episode> {
        if index >= self.episodes {
            return None;
        }

        Some(sample_episode(
            self.dataset.as_ref(),
            self.shape,
            &mut thread_rng(),
        ))
    }

    fn len(&self) -> usize {
        self.episodes
    }
}

#[derive(Clone, Debug)]
pub struct EpisodeBatch<B: Backend> {
    pub support: Tensor<B, 4>,
    pub query: Tensor<B, 4>,
    pub query_targets: Tensor<B, 1, Int>,
    pub shape: EpisodeShape,
}

#[derive(Clone)]
pub struct EpisodeBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> EpisodeBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        EpisodeBatcher { device }
    }
}

fn stack_samples<B: Backend>(samples: &[ImageSample], device: &B::Device) -> Tensor<B, 4> {
    let tensors = samples
        .iter()
        .map(|sample| sample.to_tensor(device))
        .collect_vec();

    Tensor::stack(tensors, 0)
}

impl<B: Backend> Batcher<Episode, EpisodeBatch<B>> for EpisodeBatcher<B> {
    fn batch(&self, mut items: Vec<Episode>) -> EpisodeBatch<B> {
        // one episode per optimisation step
        assert_eq!(items.len(), 1, "episode batches hold exactly one task");
        let episode = items.pop().unwrap();
        let shape = episode.shape;

        let targets = (0..shape.k_way)
            .flat_map(|class| iter::repeat(class as i32).take(shape.q_queries))
            .collect_vec();

        EpisodeBatch {
            support: stack_samples(&episode.support, &self.device),
            query: stack_samples(&episode.query, &self.device),
            query_targets: Tensor::from_ints(targets.as_slice(), &self.device),
            shape,
        }
    }
}
