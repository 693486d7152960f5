pub mod fashion;
pub mod idx;
pub mod pipeline;

pub use fashion::{class_name, FashionMnist, Split, CLASS_NAMES, NUM_CLASSES};
pub use idx::{read_images, read_labels, ImageSet};
pub use pipeline::{normalize, Batch, Batches, Pipeline};
