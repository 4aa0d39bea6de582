use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use burn::prelude::{Backend, Tensor};
use burn::tensor::TensorData;
use image::imageops::FilterType;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod mini_imagenet;
pub mod omniglot;
pub mod synthetic;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("dataset root `{0}` does not exist")]
    MissingRoot(PathBuf),
    #[error("no classes found under `{0}`")]
    NoClasses(PathBuf),
    #[error("episode needs {k} classes but the dataset has {available}")]
    NotEnoughClasses { k: usize, available: usize },
    #[error("episode needs {needed} examples per class but class {class} has {available}")]
    NotEnoughExamples {
        class: usize,
        needed: usize,
        available: usize,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Background,
    Evaluation,
}

impl Split {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Background => "images_background",
            Split::Evaluation => "images_evaluation",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    pub pixels: Vec<f32>,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub class_id: usize,
}

impl ImageSample {
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 3> {
        Tensor::from_data(
            TensorData::new(
                self.pixels.clone(),
                [self.channels, self.height, self.width],
            ),
            device,
        )
    }
}

/// Labeled examples grouped by class, as the episodic sampler needs them.
pub trait ClassDataset: Send + Sync {
    fn num_classes(&self) -> usize;

    fn class_len(&self, class: usize) -> usize;

    fn get(&self, class: usize, index: usize) -> ImageSample;
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ext == "png" || ext == "jpg" || ext == "jpeg"
        })
        .unwrap_or(false)
}

fn leaf_dirs(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            subdirs.push(path);
        }
    }

    if subdirs.is_empty() {
        out.push(dir.to_path_buf());
        return Ok(());
    }

    subdirs.sort();
    for subdir in subdirs {
        leaf_dirs(&subdir, out)?;
    }

    Ok(())
}

fn image_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;

    files.retain(|path| is_image_file(path));
    files.sort();

    Ok(files)
}

/// Indexes every bottom-level directory containing image files as one class.
/// Class ids are assigned in path order so they are stable across runs.
pub(crate) fn scan_class_dirs(split_dir: &Path) -> Result<Vec<Vec<PathBuf>>, DataError> {
    if !split_dir.is_dir() {
        return Err(DataError::MissingRoot(split_dir.to_path_buf()));
    }

    let mut dirs = Vec::new();
    leaf_dirs(split_dir, &mut dirs)?;

    let classes = dirs
        .par_iter()
        .map(|dir| image_files(dir))
        .collect::<io::Result<Vec<_>>>()?;

    let classes: Vec<_> = classes.into_iter().filter(|files| !files.is_empty()).collect();
    if classes.is_empty() {
        return Err(DataError::NoClasses(split_dir.to_path_buf()));
    }

    Ok(classes)
}

/// Decodes an image to `channels` x `size` x `size` floats in [0, 1].
/// A sample that cannot be decoded aborts the run; the dataset is broken and
/// there is nothing to recover to.
pub(crate) fn load_image(path: &Path, size: u32, channels: usize) -> Vec<f32> {
    let image = image::open(path)
        .unwrap_or_else(|e| panic!("failed to decode {}: {e}", path.display()))
        .resize_exact(size, size, FilterType::Triangle);

    let pixel_count = (size * size) as usize;
    match channels {
        1 => image
            .into_luma8()
            .pixels()
            .map(|pixel| pixel.0[0] as f32 / 255.0)
            .collect(),
        3 => {
            let rgb = image.into_rgb8();
            let mut pixels = vec![0.0; 3 * pixel_count];
            for (x, y, pixel) in rgb.enumerate_pixels() {
                let offset = (y * size + x) as usize;
                for channel in 0..3 {
                    pixels[channel * pixel_count + offset] = pixel.0[channel] as f32 / 255.0;
                }
            }
            pixels
        }
        other => panic!("unsupported channel count {other}"),
    }
}
