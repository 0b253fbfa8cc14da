use crate::error::ImageError;

/// Width and height of a frame in pixels.
///
/// # Examples
///
/// ```
/// use tagsight_image::ImageSize;
///
/// let hd = ImageSize { width: 1280, height: 720 };
///
/// assert_eq!(hd.area(), 921_600);
/// assert_eq!(hd.scaled(0.5), ImageSize { width: 640, height: 360 });
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct ImageSize {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl ImageSize {
    /// Number of pixels covered by this size.
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Whether either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Scale both dimensions by `factor`, rounding down and keeping at least one pixel.
    pub fn scaled(&self, factor: f32) -> ImageSize {
        ImageSize {
            width: ((self.width as f32 * factor) as usize).max(1),
            height: ((self.height as f32 * factor) as usize).max(1),
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from([width, height]: [usize; 2]) -> Self {
        ImageSize { width, height }
    }
}

/// Interleaved pixel buffer with a compile time channel count.
///
/// Pixels are stored row-major, so the channel `c` of pixel `(x, y)` lives at
/// `(y * width + x) * CHANNELS + c`. Frames from the camera are `Image<u8, 4>`
/// (RGBA8) and the conditioning passes work on `Image<f32, 1>` in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T, const CHANNELS: usize> {
    size: ImageSize,
    data: Vec<T>,
}

impl<T, const CHANNELS: usize> Image<T, CHANNELS> {
    /// Wrap existing pixel data.
    ///
    /// # Errors
    ///
    /// Fails when `data` does not hold exactly `width * height * CHANNELS` values.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagsight_image::{Image, ImageSize};
    ///
    /// let frame = Image::<u8, 4>::new([2, 1].into(), vec![255, 0, 0, 255, 0, 255, 0, 255])?;
    ///
    /// assert_eq!(frame.width(), 2);
    /// assert_eq!(frame.get_pixel(1, 0, 1)?, 255);
    /// # Ok::<(), tagsight_image::ImageError>(())
    /// ```
    pub fn new(size: ImageSize, data: Vec<T>) -> Result<Self, ImageError> {
        let expected = size.area() * CHANNELS;
        if data.len() != expected {
            return Err(ImageError::InvalidChannelShape(data.len(), expected));
        }
        Ok(Self { size, data })
    }

    /// Image of `size` with every channel set to `val`.
    pub fn from_size_val(size: ImageSize, val: T) -> Result<Self, ImageError>
    where
        T: Clone,
    {
        Image::new(size, vec![val; size.area() * CHANNELS])
    }

    /// Size in pixels.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.size.width
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.size.height
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Raw interleaved data.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable raw interleaved data.
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    fn index(&self, x: usize, y: usize, ch: usize) -> Result<usize, ImageError> {
        if x >= self.width() || y >= self.height() {
            return Err(ImageError::PixelIndexOutOfBounds(
                x,
                y,
                self.width(),
                self.height(),
            ));
        }
        if ch >= CHANNELS {
            return Err(ImageError::ChannelIndexOutOfBounds(ch, CHANNELS));
        }
        Ok((y * self.width() + x) * CHANNELS + ch)
    }

    /// Value of channel `ch` at pixel `(x, y)`.
    pub fn get_pixel(&self, x: usize, y: usize, ch: usize) -> Result<T, ImageError>
    where
        T: Copy,
    {
        let idx = self.index(x, y, ch)?;
        Ok(self.data[idx])
    }

    /// Overwrite channel `ch` at pixel `(x, y)`.
    pub fn set_pixel(&mut self, x: usize, y: usize, ch: usize, val: T) -> Result<(), ImageError> {
        let idx = self.index(x, y, ch)?;
        self.data[idx] = val;
        Ok(())
    }
}
