#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

pub const ROWS: usize = 4;
pub const COLS: usize = 4;

pub fn images_bytes(magic: u32, images: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&magic.to_be_bytes());
    bytes.extend_from_slice(&(images.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&(ROWS as u32).to_be_bytes());
    bytes.extend_from_slice(&(COLS as u32).to_be_bytes());
    for image in images {
        bytes.extend_from_slice(image);
    }
    bytes
}

pub fn labels_bytes(magic: u32, labels: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&magic.to_be_bytes());
    bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    bytes.extend_from_slice(labels);
    bytes
}

pub fn write(path: &Path, bytes: &[u8]) {
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap();
    } else {
        File::create(path).unwrap().write_all(bytes).unwrap();
    }
}

/// Images of class `c` have one bright pixel at position `c` over a dim,
/// label-independent background.
pub fn synthetic(count: usize, offset: usize) -> (Vec<Vec<u8>>, Vec<u8>) {
    let mut images = Vec::with_capacity(count);
    let mut labels = Vec::with_capacity(count);
    for i in 0..count {
        let label = ((i + offset) % 10) as u8;
        let mut image: Vec<u8> = (0..ROWS * COLS).map(|p| ((p * 7 + i * 13) % 40) as u8).collect();
        image[label as usize] = 255;
        images.push(image);
        labels.push(label);
    }
    (images, labels)
}

/// Writes a Fashion-MNIST style directory. The training files are gzipped,
/// the test files are raw.
pub fn write_dataset(dir: &Path, train: usize, test: usize) {
    let (images, labels) = synthetic(train, 0);
    write(&dir.join("train-images-idx3-ubyte.gz"), &images_bytes(2051, &images));
    write(&dir.join("train-labels-idx1-ubyte.gz"), &labels_bytes(2049, &labels));

    let (images, labels) = synthetic(test, 3);
    write(&dir.join("t10k-images-idx3-ubyte"), &images_bytes(2051, &images));
    write(&dir.join("t10k-labels-idx1-ubyte"), &labels_bytes(2049, &labels));
}
