use std::io;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::data::idx::{self, ImageSet};
use crate::error::{Error, Result};

pub const NUM_CLASSES: usize = 10;

pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

pub fn class_name(label: u8) -> Option<&'static str> {
    CLASS_NAMES.get(label as usize).copied()
}

/// Images paired with their class labels.
#[derive(Debug, Clone)]
pub struct Split {
    pub images: ImageSet,
    pub labels: Vec<u8>,
}

impl Split {
    pub fn new(images: ImageSet, labels: Vec<u8>) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(Error::LengthMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }
        if let Some(&label) = labels.iter().find(|&&l| l as usize >= NUM_CLASSES) {
            return Err(Error::InvalidLabel {
                label,
                classes: NUM_CLASSES,
            });
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn image_shape(&self) -> [usize; 2] {
        [self.images.rows, self.images.cols]
    }

    /// Shuffles the examples with `seed` and holds out `validation_ratio` of
    /// them. Returns `(train, validation)`.
    pub fn split_validation(&self, validation_ratio: f64, seed: u64) -> Result<(Split, Split)> {
        if !(validation_ratio > 0.0 && validation_ratio < 1.0) {
            return Err(Error::Config(format!(
                "validation ratio must be in (0, 1), got {validation_ratio}"
            )));
        }

        let mut indices: Vec<usize> = (0..self.len()).collect();
        let mut rng = Pcg64::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let validation_size = (validation_ratio * self.len() as f64).round() as usize;
        let (validation, train) = indices.split_at(validation_size);

        Ok((self.select(train), self.select(validation)))
    }

    fn select(&self, indices: &[usize]) -> Split {
        Split {
            images: self.images.select(indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// The Fashion-MNIST train and test splits.
#[derive(Debug, Clone)]
pub struct FashionMnist {
    pub train: Split,
    pub test: Split,
}

impl FashionMnist {
    /// Loads the four standard IDX files from `dir`. Each file may be stored
    /// gzipped (`.gz` suffix) or raw.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!(dir = %dir.display(), "loading Fashion-MNIST");

        let train = load_split(dir, "train-images-idx3-ubyte", "train-labels-idx1-ubyte")?;
        let test = load_split(dir, "t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte")?;

        tracing::info!(
            train = train.len(),
            test = test.len(),
            rows = train.images.rows,
            cols = train.images.cols,
            "dataset loaded"
        );
        Ok(Self { train, test })
    }
}

fn load_split(dir: &Path, images: &str, labels: &str) -> Result<Split> {
    let images = idx::read_images(locate(dir, images)?)?;
    let labels = idx::read_labels(locate(dir, labels)?)?;
    Split::new(images, labels)
}

/// Prefers `<stem>.gz` over `<stem>` when both are present.
fn locate(dir: &Path, stem: &str) -> Result<PathBuf> {
    let gz = dir.join(format!("{stem}.gz"));
    if gz.is_file() {
        return Ok(gz);
    }
    let raw = dir.join(stem);
    if raw.is_file() {
        return Ok(raw);
    }
    Err(Error::io(
        raw,
        io::Error::new(io::ErrorKind::NotFound, "no such file (also tried .gz)"),
    ))
}
