//! Readers for the IDX format used by the MNIST family of datasets.
//!
//! Every file starts with a big-endian `u32` magic number followed by one
//! big-endian `u32` per dimension, then the raw `u8` payload. Files ending
//! in `.gz` are decompressed on the fly.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{Error, Result};

pub const IMAGES_MAGIC: u32 = 2051;
pub const LABELS_MAGIC: u32 = 2049;

/// A set of equally sized grayscale images stored back to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSet {
    pub rows: usize,
    pub cols: usize,
    count: usize,
    pixels: Vec<u8>,
}

impl ImageSet {
    pub fn new(rows: usize, cols: usize, pixels: Vec<u8>) -> Result<Self> {
        let image_size = rows * cols;
        if image_size == 0 {
            return Err(Error::Shape(format!("images must not be empty, got {rows}x{cols}")));
        }
        if pixels.len() % image_size != 0 {
            return Err(Error::Shape(format!(
                "{} pixels is not a whole number of {rows}x{cols} images",
                pixels.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            count: pixels.len() / image_size,
            pixels,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn image_size(&self) -> usize {
        self.rows * self.cols
    }

    pub fn image(&self, index: usize) -> &[u8] {
        let size = self.image_size();
        &self.pixels[index * size..(index + 1) * size]
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Gathers the images at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> ImageSet {
        let mut pixels = Vec::with_capacity(indices.len() * self.image_size());
        for &i in indices {
            pixels.extend_from_slice(self.image(i));
        }
        ImageSet {
            rows: self.rows,
            cols: self.cols,
            count: indices.len(),
            pixels,
        }
    }
}

fn open(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = BufReader::new(file);

    let is_gzip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if is_gzip {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn read_exact(reader: &mut dyn Read, buf: &mut [u8], path: &Path, what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Truncated {
            path: path.to_path_buf(),
            what: what.to_string(),
        },
        _ => Error::io(path, e),
    })
}

/// Reads exactly `len` payload bytes. The buffer only grows with bytes that
/// actually arrive, so a header claiming more than the file holds costs no
/// more memory than the file itself.
fn read_payload(reader: &mut dyn Read, len: Option<usize>, path: &Path, what: &str) -> Result<Vec<u8>> {
    let truncated = || Error::Truncated {
        path: path.to_path_buf(),
        what: what.to_string(),
    };
    let len = len.ok_or_else(truncated)?;
    let limit = u64::try_from(len).map_err(|_| truncated())?;

    let mut buf = Vec::new();
    reader
        .take(limit)
        .read_to_end(&mut buf)
        .map_err(|e| Error::io(path, e))?;
    if buf.len() < len {
        return Err(truncated());
    }
    Ok(buf)
}

fn read_u32(reader: &mut dyn Read, path: &Path, what: &str) -> Result<u32> {
    let mut bytes = [0u8; 4];
    read_exact(reader, &mut bytes, path, what)?;
    Ok(u32::from_be_bytes(bytes))
}

fn check_magic(reader: &mut dyn Read, path: &Path, expected: u32) -> Result<()> {
    let found = read_u32(reader, path, "magic number")?;
    if found != expected {
        return Err(Error::BadMagic {
            path: path.to_path_buf(),
            found,
            expected,
        });
    }
    Ok(())
}

pub fn read_images(path: impl AsRef<Path>) -> Result<ImageSet> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    check_magic(&mut *reader, path, IMAGES_MAGIC)?;

    let count = read_u32(&mut *reader, path, "number of images")? as usize;
    let rows = read_u32(&mut *reader, path, "image rows")? as usize;
    let cols = read_u32(&mut *reader, path, "image cols")? as usize;
    tracing::debug!(path = %path.display(), count, rows, cols, "reading images");

    let len = count.checked_mul(rows).and_then(|n| n.checked_mul(cols));
    let pixels = read_payload(&mut *reader, len, path, "image data")?;

    ImageSet::new(rows, cols, pixels)
}

pub fn read_labels(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    check_magic(&mut *reader, path, LABELS_MAGIC)?;

    let count = read_u32(&mut *reader, path, "number of labels")? as usize;
    tracing::debug!(path = %path.display(), count, "reading labels");

    read_payload(&mut *reader, Some(count), path, "label data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_set_indexes_whole_images() {
        let set = ImageSet::new(2, 2, (0..12).collect()).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.image(1), &[4, 5, 6, 7]);

        let picked = set.select(&[2, 0]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.pixels(), &[8, 9, 10, 11, 0, 1, 2, 3]);
    }

    #[test]
    fn image_set_rejects_partial_images() {
        assert!(matches!(ImageSet::new(2, 2, vec![0; 5]), Err(Error::Shape(_))));
        assert!(matches!(ImageSet::new(0, 2, vec![]), Err(Error::Shape(_))));
    }
}
