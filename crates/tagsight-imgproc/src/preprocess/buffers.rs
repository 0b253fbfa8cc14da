use half::f16;
use tagsight_image::{Image, ImageError, ImageSize};

/// Two same-sized single channel buffers that passes ping-pong between.
///
/// A pass reads the front buffer and writes the back buffer, then the roles
/// swap. Reads and writes therefore never touch the same buffer.
#[derive(Debug, Clone)]
pub struct DoubleBuffer {
    a: Image<f32, 1>,
    b: Image<f32, 1>,
    front_is_a: bool,
}

impl DoubleBuffer {
    /// Allocate both buffers at `size`.
    pub fn new(size: ImageSize) -> Result<Self, ImageError> {
        Ok(Self {
            a: Image::from_size_val(size, 0.0)?,
            b: Image::from_size_val(size, 0.0)?,
            front_is_a: true,
        })
    }

    /// Resolution of the buffers.
    pub fn size(&self) -> ImageSize {
        self.a.size()
    }

    /// The buffer holding the latest result.
    pub fn front(&self) -> &Image<f32, 1> {
        if self.front_is_a {
            &self.a
        } else {
            &self.b
        }
    }

    /// Mutable access to the front buffer, used by the first pass of a frame.
    pub fn front_mut(&mut self) -> &mut Image<f32, 1> {
        if self.front_is_a {
            &mut self.a
        } else {
            &mut self.b
        }
    }

    /// Borrow the front buffer for reading and the back buffer for writing.
    pub fn split(&mut self) -> (&Image<f32, 1>, &mut Image<f32, 1>) {
        if self.front_is_a {
            (&self.a, &mut self.b)
        } else {
            (&self.b, &mut self.a)
        }
    }

    /// Make the back buffer the new front.
    pub fn swap(&mut self) {
        self.front_is_a = !self.front_is_a;
    }

    /// Reset so the next frame starts writing into buffer A.
    pub fn reset(&mut self) {
        self.front_is_a = true;
    }
}

/// Round every value of the buffer through IEEE half precision.
///
/// Matches the storage precision of half-float textures so results do not
/// depend on whether the device keeps intermediates at 16 or 32 bits.
pub fn quantize_half(image: &mut Image<f32, 1>) {
    image
        .as_slice_mut()
        .iter_mut()
        .for_each(|v| *v = f16::from_f32(*v).to_f32());
}
