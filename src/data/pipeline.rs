//! Input pipeline feeding batches to the model.
//!
//! A [`Pipeline`] is built from a [`Split`] with the usual stages:
//! `map` (element transform, run in parallel), `cache` (materialize mapped
//! examples once), `shuffle` (buffered, reshuffled every epoch), `batch` and
//! `prefetch` (assemble batches on a producer thread). Each call to
//! [`Pipeline::epoch`] yields one full pass over the data.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use candle_core::{Device, Tensor};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;

use crate::data::fashion::Split;
use crate::error::{Error, Result};

/// Element transform: reads one image and writes the same number of
/// values into `out`.
pub type MapFn = Arc<dyn Fn(&[u8], &mut [f32]) + Send + Sync>;

/// Scales `u8` pixels into `[0, 1]`.
pub fn normalize(image: &[u8], out: &mut [f32]) {
    for (o, &p) in out.iter_mut().zip(image) {
        *o = p as f32 / 255.0;
    }
}

fn cast(image: &[u8], out: &mut [f32]) {
    for (o, &p) in out.iter_mut().zip(image) {
        *o = p as f32;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShuffleOptions {
    buffer_size: usize,
    seed: u64,
}

/// One batch of images `(b, rows, cols)` and `u32` labels `(b,)`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Tensor,
    pub labels: Tensor,
    size: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[derive(Clone)]
pub struct Pipeline {
    source: Arc<Split>,
    map: Option<MapFn>,
    cache: Option<Arc<Vec<f32>>>,
    shuffle: Option<ShuffleOptions>,
    batch_size: usize,
    prefetch: usize,
}

impl Pipeline {
    pub fn from_split(split: &Split) -> Self {
        Self {
            source: Arc::new(split.clone()),
            map: None,
            cache: None,
            shuffle: None,
            batch_size: 1,
            prefetch: 0,
        }
    }

    /// Sets the element transform. A previously cached result is dropped.
    pub fn map<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8], &mut [f32]) + Send + Sync + 'static,
    {
        self.map = Some(Arc::new(f));
        self.cache = None;
        self
    }

    /// Runs the transform over every example now and keeps the result, so
    /// later epochs skip the `map` stage.
    pub fn cache(mut self) -> Self {
        let images = &self.source.images;
        let map = self.map.clone();
        let mut buffer = vec![0f32; images.pixels().len()];

        buffer
            .par_chunks_mut(images.image_size())
            .enumerate()
            .for_each(|(i, out)| match &map {
                Some(f) => f(images.image(i), out),
                None => cast(images.image(i), out),
            });

        tracing::debug!(examples = images.len(), "pipeline cached");
        self.cache = Some(Arc::new(buffer));
        self
    }

    /// Buffered shuffle: a `buffer_size` window is kept and a uniformly
    /// random element of it is emitted at each step. A buffer at least as
    /// large as the data yields a full permutation.
    pub fn shuffle(mut self, buffer_size: usize, seed: u64) -> Self {
        self.shuffle = Some(ShuffleOptions {
            buffer_size: buffer_size.max(1),
            seed,
        });
        self
    }

    pub fn batch(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Number of batches assembled ahead of the consumer. Zero disables the
    /// producer thread.
    pub fn prefetch(mut self, batches: usize) -> Self {
        self.prefetch = batches;
        self
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        if self.batch_size == 0 {
            return 0;
        }
        (self.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn image_shape(&self) -> [usize; 2] {
        self.source.image_shape()
    }

    /// Example order for `epoch`; depends only on the shuffle seed and the
    /// epoch number.
    pub fn order(&self, epoch: usize) -> Vec<usize> {
        match self.shuffle {
            None => (0..self.len()).collect(),
            Some(opts) => {
                let seed = opts
                    .seed
                    .wrapping_add((epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                let mut rng = Pcg64::seed_from_u64(seed);
                buffered_shuffle(self.len(), opts.buffer_size, &mut rng)
            }
        }
    }

    pub fn epoch(&self, epoch: usize) -> Result<Batches> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be at least 1".to_string()));
        }

        let assembler = Assembler {
            source: self.source.clone(),
            map: self.map.clone(),
            cache: self.cache.clone(),
            order: self.order(epoch),
            batch_size: self.batch_size,
        };

        if self.prefetch == 0 {
            return Ok(Batches {
                inner: BatchSource::Inline { assembler, next: 0 },
            });
        }

        let expected = assembler.num_batches();
        let (tx, rx) = mpsc::sync_channel(self.prefetch);
        let handle = thread::spawn(move || {
            for i in 0..expected {
                if tx.send(assembler.assemble(i)).is_err() {
                    break;
                }
            }
        });

        Ok(Batches {
            inner: BatchSource::Prefetched {
                rx: Some(rx),
                handle: Some(handle),
                received: 0,
                expected,
            },
        })
    }
}

fn buffered_shuffle(len: usize, buffer_size: usize, rng: &mut impl Rng) -> Vec<usize> {
    let mut stream = 0..len;
    let mut buffer: Vec<usize> = stream.by_ref().take(buffer_size).collect();
    let mut order = Vec::with_capacity(len);

    while !buffer.is_empty() {
        let pick = rng.gen_range(0..buffer.len());
        match stream.next() {
            Some(next) => order.push(std::mem::replace(&mut buffer[pick], next)),
            None => order.push(buffer.swap_remove(pick)),
        }
    }
    order
}

struct Assembler {
    source: Arc<Split>,
    map: Option<MapFn>,
    cache: Option<Arc<Vec<f32>>>,
    order: Vec<usize>,
    batch_size: usize,
}

impl Assembler {
    fn num_batches(&self) -> usize {
        (self.order.len() + self.batch_size - 1) / self.batch_size
    }

    fn assemble(&self, index: usize) -> Result<Batch> {
        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.order.len());
        let indices = &self.order[start..end];

        let images = &self.source.images;
        let size = images.image_size();

        let mut pixels = vec![0f32; indices.len() * size];
        match (&self.cache, &self.map) {
            (Some(cache), _) => {
                for (out, &i) in pixels.chunks_mut(size).zip(indices) {
                    out.copy_from_slice(&cache[i * size..(i + 1) * size]);
                }
            }
            (None, Some(f)) => pixels
                .par_chunks_mut(size)
                .zip(indices.par_iter())
                .for_each(|(out, &i)| f(images.image(i), out)),
            (None, None) => {
                for (out, &i) in pixels.chunks_mut(size).zip(indices) {
                    cast(images.image(i), out);
                }
            }
        }

        let labels: Vec<u32> = indices
            .iter()
            .map(|&i| self.source.labels[i] as u32)
            .collect();

        let b = indices.len();
        Ok(Batch {
            images: Tensor::from_vec(pixels, (b, images.rows, images.cols), &Device::Cpu)?,
            labels: Tensor::from_vec(labels, b, &Device::Cpu)?,
            size: b,
        })
    }
}

/// Iterator over the batches of one epoch.
pub struct Batches {
    inner: BatchSource,
}

enum BatchSource {
    Inline {
        assembler: Assembler,
        next: usize,
    },
    Prefetched {
        rx: Option<Receiver<Result<Batch>>>,
        handle: Option<JoinHandle<()>>,
        received: usize,
        expected: usize,
    },
}

impl Iterator for Batches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            BatchSource::Inline { assembler, next } => {
                if *next >= assembler.num_batches() {
                    return None;
                }
                let batch = assembler.assemble(*next);
                *next += 1;
                Some(batch)
            }
            BatchSource::Prefetched {
                rx,
                handle,
                received,
                expected,
            } => {
                if let Ok(batch) = rx.as_ref()?.recv() {
                    *received += 1;
                    return Some(batch);
                }

                // The producer hung up. Report it once, then end the epoch.
                drop(rx.take());
                let panicked = handle.take().is_some_and(|h| h.join().is_err());
                if panicked {
                    Some(Err(Error::Pipeline("prefetch thread panicked".to_string())))
                } else if *received < *expected {
                    Some(Err(Error::Pipeline(format!(
                        "prefetch thread stopped after {received} of {expected} batches"
                    ))))
                } else {
                    None
                }
            }
        }
    }
}

impl Drop for Batches {
    fn drop(&mut self) {
        if let BatchSource::Prefetched { rx, handle, .. } = &mut self.inner {
            // Hang up first so a blocked producer returns from `send`.
            drop(rx.take());
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    tracing::warn!("prefetch thread panicked");
                }
            }
        }
    }
}
