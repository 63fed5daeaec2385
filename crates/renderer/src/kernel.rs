//! One-dimensional Gaussian kernels for the separable blur.

/// Ratio between kernel radius and Gaussian sigma.
pub const SIGMA_RATIO: f32 = 0.4;

/// Smallest kernel the generator emits.
pub const MIN_KERNEL_LEN: usize = 3;

/// Builds an unnormalized, symmetric Gaussian kernel for `radius`.
///
/// The length is `floor(2 * radius + 1)`, raised to at least three and rounded
/// up to the next odd number so the kernel always has a centre tap. Weights are
/// `exp(-x^2 / (2 * sigma^2))` with `sigma = radius * 0.4`, so the centre is 1.
/// The fragment shader divides by the accumulated weight, which keeps the
/// output normalized without normalizing here.
pub fn generate_kernel(radius: f32) -> Vec<f32> {
    let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
    let mut len = ((radius * 2.0 + 1.0).floor() as usize).max(MIN_KERNEL_LEN);
    if len % 2 == 0 {
        len += 1;
    }

    let sigma = radius * SIGMA_RATIO;
    let center = len / 2;
    let mut kernel = vec![0.0; len];
    for i in 0..=center {
        let x = i as f32;
        let weight = if sigma > 0.0 {
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        } else if i == 0 {
            1.0
        } else {
            0.0
        };
        kernel[center + i] = weight;
        kernel[center - i] = weight;
    }
    kernel
}
