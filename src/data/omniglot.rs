use std::path::{Path, PathBuf};

use crate::data::{load_image, scan_class_dirs, ClassDataset, DataError, ImageSample, Split};

pub const IMAGE_SIZE: u32 = 28;

/// Handwritten characters, one class per alphabet/character directory.
pub struct Omniglot {
    classes: Vec<Vec<PathBuf>>,
}

impl Omniglot {
    pub fn new(data_dir: &Path, split: Split) -> Result<Self, DataError> {
        let root = data_dir.join("Omniglot").join(split.dir_name());
        let classes = scan_class_dirs(&root)?;

        Ok(Omniglot { classes })
    }
}

impl ClassDataset for Omniglot {
    fn num_classes(&self) -> usize {
        self.classes.len()
    }

    fn class_len(&self, class: usize) -> usize {
        self.classes[class].len()
    }

    fn get(&self, class: usize, index: usize) -> ImageSample {
        let pixels = load_image(&self.classes[class][index], IMAGE_SIZE, 1);

        ImageSample {
            pixels,
            channels: 1,
            height: IMAGE_SIZE as usize,
            width: IMAGE_SIZE as usize,
            class_id: class,
        }
    }
}
