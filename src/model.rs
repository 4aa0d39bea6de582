use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};
use itertools::Itertools;

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    activation: Relu,
    pool: MaxPool2d,
}

#[derive(Config)]
pub struct ConvBlockConfig {
    channels_in: usize,
    channels_out: usize,
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(self, device: &B::Device) -> ConvBlock<B> {
        ConvBlock {
            conv: Conv2dConfig::new([self.channels_in, self.channels_out], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            norm: BatchNormConfig::new(self.channels_out).init(device),
            activation: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let hidden = self.conv.forward(input);
        let hidden = self.norm.forward(hidden);
        let hidden = self.activation.forward(hidden);

        self.pool.forward(hidden)
    }
}

/// The embedding network of Snell et al.: four conv blocks, each halving the
/// spatial resolution, flattened into the feature vector.
#[derive(Config)]
pub struct FewShotEncoderConfig {
    pub num_input_channels: usize,
    #[config(default = 64)]
    pub hidden_channels: usize,
    #[config(default = 4)]
    pub num_blocks: usize,
}

impl FewShotEncoderConfig {
    pub fn init<B: Backend>(self, device: &B::Device) -> FewShotEncoder<B> {
        let dims = channel_dims(self.num_input_channels, self.hidden_channels, self.num_blocks);

        FewShotEncoder {
            blocks: dims
                .into_iter()
                .tuple_windows()
                .map(|(channels_in, channels_out)| {
                    ConvBlockConfig::new(channels_in, channels_out).init(device)
                })
                .collect_vec(),
        }
    }
}

fn channel_dims(input: usize, hidden: usize, blocks: usize) -> Vec<usize> {
    std::iter::once(input)
        .chain(std::iter::repeat(hidden).take(blocks))
        .collect_vec()
}

#[derive(Module, Debug)]
pub struct FewShotEncoder<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
}

impl<B: Backend> FewShotEncoder<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // images: B x C x H x W
        let mut hidden = images;
        for block in &self.blocks {
            hidden = block.forward(hidden);
        }

        // B x (C·H·W)
        hidden.flatten::<2>(1, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn omniglot_embedding_is_64_wide() {
        let device = NdArrayDevice::Cpu;
        let encoder = FewShotEncoderConfig::new(1).init::<NdArray>(&device);

        let images = Tensor::zeros([2, 1, 28, 28], &device);
        let embeddings = encoder.forward(images);

        assert_eq!(embeddings.dims(), [2, 64]);
    }

    #[test]
    fn mini_imagenet_embedding_is_1600_wide() {
        let device = NdArrayDevice::Cpu;
        let encoder = FewShotEncoderConfig::new(3).init::<NdArray>(&device);

        let images = Tensor::zeros([2, 3, 84, 84], &device);
        let embeddings = encoder.forward(images);

        assert_eq!(embeddings.dims(), [2, 1600]);
    }
}
