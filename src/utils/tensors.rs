use burn::tensor::{backend::Backend, Int, Tensor};

/// Flatten an integer tensor into a row-major buffer
pub fn to_int_vec<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Vec<i64> {
    tensor.into_data().convert::<i64>().value
}

/// Flatten a float tensor into a row-major buffer
pub fn to_float_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f64> {
    tensor.into_data().convert::<f64>().value
}
