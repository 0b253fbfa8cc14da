/// A square 2D convolution kernel stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel2d {
    radius: usize,
    weights: Vec<f32>,
}

impl Kernel2d {
    /// Create a kernel from row-major weights of a `(2 * radius + 1)²` window.
    ///
    /// Returns `None` if the number of weights does not match the radius.
    pub fn new(radius: usize, weights: Vec<f32>) -> Option<Self> {
        let side = 2 * radius + 1;
        if weights.len() != side * side {
            return None;
        }
        Some(Self { radius, weights })
    }

    /// The kernel radius.
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// The kernel side length, `2 * radius + 1`.
    pub fn side(&self) -> usize {
        2 * self.radius + 1
    }

    /// The row-major weights.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight at offset `(dx, dy)` from the kernel center.
    pub fn at(&self, dx: isize, dy: isize) -> f32 {
        let r = self.radius as isize;
        let idx = (dy + r) as usize * self.side() + (dx + r) as usize;
        self.weights[idx]
    }

    /// Sum of all weights.
    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }
}

/// Precomputed Gaussian blur kernel for a given radius and sigma.
///
/// Holds both the normalized 2D weights and the 1D factor they separate into,
/// so the blur can run either as a dense or as a separable convolution.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    /// Blur radius in pixels.
    pub radius: usize,
    /// Standard deviation of the gaussian.
    pub sigma: f32,
    /// Normalized 1D weights of length `2 * radius + 1`.
    pub weights_1d: Vec<f32>,
    /// Normalized 2D weights.
    pub weights_2d: Kernel2d,
}

impl GaussianKernel {
    /// Build the kernel for `radius` and `sigma`.
    pub fn new(radius: usize, sigma: f32) -> Self {
        let side = 2 * radius + 1;
        let weights_1d = gaussian_kernel_1d(side, sigma);
        let weights_2d = gaussian_kernel_2d(radius, sigma);
        Self {
            radius,
            sigma,
            weights_1d,
            weights_2d,
        }
    }

    /// Whether this kernel was built for the given parameters.
    pub fn matches(&self, radius: usize, sigma: f32) -> bool {
        self.radius == radius && self.sigma == sigma
    }
}

/// Create a box blur kernel.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
///
/// # Returns
///
/// A vector of the kernel.
pub fn box_blur_kernel_1d(kernel_size: usize) -> Vec<f32> {
    vec![1.0 / kernel_size as f32; kernel_size]
}

/// Create a gaussian blur kernel.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
/// * `sigma` - The sigma of the gaussian kernel.
///
/// # Returns
///
/// A vector of the kernel.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    let mut kernel = Vec::with_capacity(kernel_size);

    let mean = (kernel_size - 1) as f32 / 2.0;
    let sigma_sq = sigma * sigma;

    // compute the kernel
    for i in 0..kernel_size {
        let x = i as f32 - mean;
        kernel.push((-(x * x) / (2.0 * sigma_sq)).exp());
    }

    // normalize the kernel
    let norm = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= norm);
    kernel
}

/// Create a normalized 2D gaussian kernel of size `(2 * radius + 1)²`.
///
/// Each weight is `exp(-(dx² + dy²) / (2σ²))` before normalization to unit sum.
///
/// # Example
///
/// ```
/// use tagsight_imgproc::filter::kernels::gaussian_kernel_2d;
///
/// let kernel = gaussian_kernel_2d(2, 1.0);
/// assert_eq!(kernel.side(), 5);
/// assert!((kernel.sum() - 1.0).abs() < 1e-5);
/// ```
pub fn gaussian_kernel_2d(radius: usize, sigma: f32) -> Kernel2d {
    let side = 2 * radius + 1;
    let r = radius as isize;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut weights = Vec::with_capacity(side * side);
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = (dx * dx + dy * dy) as f32;
            weights.push((-d2 / two_sigma_sq).exp());
        }
    }

    let norm = weights.iter().sum::<f32>();
    weights.iter_mut().for_each(|w| *w /= norm);

    Kernel2d { radius, weights }
}

/// Create the 3x3 laplacian kernel used for edge enhancement.
///
/// The weights sum to zero, so flat regions produce no response.
pub fn laplacian_kernel() -> Kernel2d {
    #[rustfmt::skip]
    let weights = vec![
         0.0, -1.0,  0.0,
        -1.0,  4.0, -1.0,
         0.0, -1.0,  0.0,
    ];
    Kernel2d { radius: 1, weights }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_kernel_1d() {
        let kernel = gaussian_kernel_1d(5, 0.5);

        let expected = [
            0.00026386508,
            0.10645077,
            0.78657067,
            0.10645077,
            0.00026386508,
        ];

        for (i, &k) in kernel.iter().enumerate() {
            assert_relative_eq!(k, expected[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_gaussian_kernel_2d_sums_to_one() {
        for radius in 1..=5 {
            for sigma in [0.5f32, 1.0, 1.5, 2.0, 3.0] {
                let kernel = gaussian_kernel_2d(radius, sigma);
                assert_eq!(kernel.weights().len(), (2 * radius + 1).pow(2));
                assert_relative_eq!(kernel.sum(), 1.0, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_gaussian_kernel_2d_is_outer_product() {
        let kernel = GaussianKernel::new(2, 1.2);
        let r = kernel.radius as isize;
        for dy in -r..=r {
            for dx in -r..=r {
                let expected =
                    kernel.weights_1d[(dx + r) as usize] * kernel.weights_1d[(dy + r) as usize];
                assert_relative_eq!(kernel.weights_2d.at(dx, dy), expected, epsilon = 1e-6);
            }
        }
        assert!(kernel.matches(2, 1.2));
        assert!(!kernel.matches(3, 1.2));
    }

    #[test]
    fn test_gaussian_kernel_2d_symmetric_peak() {
        let kernel = gaussian_kernel_2d(1, 1.0);
        assert_relative_eq!(kernel.at(-1, 0), kernel.at(1, 0));
        assert_relative_eq!(kernel.at(0, -1), kernel.at(0, 1));
        assert!(kernel.at(0, 0) > kernel.at(1, 1));
    }

    #[test]
    fn test_laplacian_kernel() {
        let kernel = laplacian_kernel();
        assert_eq!(kernel.side(), 3);
        assert_relative_eq!(kernel.sum(), 0.0);
        assert!(Kernel2d::new(1, vec![0.0; 8]).is_none());
    }

    #[test]
    fn test_box_blur_kernel_1d() {
        assert_eq!(box_blur_kernel_1d(4), vec![0.25; 4]);
    }
}
