use itertools::Itertools;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::{ClassDataset, ImageSample};

/// In-memory stand-in dataset: every class has a distinct mean intensity with
/// a little per-example noise. Deterministic in (class, index).
pub struct SyntheticImages {
    num_classes: usize,
    examples_per_class: usize,
    channels: usize,
    size: usize,
}

impl SyntheticImages {
    pub fn new(num_classes: usize, examples_per_class: usize, channels: usize, size: usize) -> Self {
        SyntheticImages {
            num_classes,
            examples_per_class,
            channels,
            size,
        }
    }
}

impl ClassDataset for SyntheticImages {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn class_len(&self, _class: usize) -> usize {
        self.examples_per_class
    }

    fn get(&self, class: usize, index: usize) -> ImageSample {
        let mean = (class as f32 + 0.5) / self.num_classes as f32;
        let rng = StdRng::seed_from_u64(((class as u64) << 32) | index as u64);

        let pixels = rng
            .sample_iter(Uniform::new(-0.1, 0.1))
            .take(self.channels * self.size * self.size)
            .map(|noise: f32| (mean + noise).clamp(0.0, 1.0))
            .collect_vec();

        ImageSample {
            pixels,
            channels: self.channels,
            height: self.size,
            width: self.size,
            class_id: class,
        }
    }
}
