//! Raster decoding and tensor preparation.

pub mod raster;
mod tensor;

pub use tensor::{InputTensor, preprocess};
