use burn::nn::loss::CrossEntropyLoss;
use burn::prelude::{Backend, ElementConversion, Int, Tensor};

use crate::episode::EpisodeBatch;
use crate::model::FewShotEncoder;

pub struct EpisodeOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub accuracy: f64,
}

/// Per-class mean of class-major support embeddings.
pub fn class_prototypes<B: Backend>(
    support: Tensor<B, 2>,
    k_way: usize,
    n_shot: usize,
) -> Tensor<B, 2> {
    let [_, features] = support.dims();

    support
        .reshape([k_way, n_shot, features])
        .mean_dim(1)
        .squeeze(1)
}

pub fn pairwise_sq_distances<B: Backend>(
    queries: Tensor<B, 2>,
    prototypes: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let [num_queries, features] = queries.dims();
    let [num_prototypes, _] = prototypes.dims();

    let queries = queries
        .unsqueeze_dim::<3>(1)
        .expand([num_queries, num_prototypes, features]);
    let prototypes = prototypes
        .unsqueeze_dim::<3>(0)
        .expand([num_queries, num_prototypes, features]);

    // Q x K
    (queries - prototypes).powi_scalar(2).sum_dim(2).squeeze(2)
}

pub fn categorical_accuracy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> f64 {
    let [num_queries, _] = logits.dims();

    let predictions = logits.argmax(1);
    let correct = predictions
        .equal(targets.unsqueeze_dim(1))
        .int()
        .sum()
        .into_scalar()
        .elem::<f64>();

    correct / num_queries as f64
}

/// One prototypical-network step: embed support and query sets, classify each
/// query by negated squared distance to the class prototypes.
pub fn proto_net_episode<B: Backend>(
    model: &FewShotEncoder<B>,
    batch: EpisodeBatch<B>,
) -> EpisodeOutput<B> {
    let shape = batch.shape;
    let device = batch.support.device();

    let support = model.forward(batch.support); // (k·n) x F
    let query = model.forward(batch.query); // (k·q) x F

    let prototypes = class_prototypes(support, shape.k_way, shape.n_shot);
    let logits = pairwise_sq_distances(query, prototypes).neg();

    let accuracy = categorical_accuracy(logits.clone(), batch.query_targets.clone());
    let loss = CrossEntropyLoss::new(None, &device).forward(logits, batch.query_targets);

    EpisodeOutput { loss, accuracy }
}
