pub mod demosaic;

pub use demosaic::{demosaic, unpack_samples, Normalization};
