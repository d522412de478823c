//! Image decoding and augmentation
//!
//! Images are HWC `f32` buffers. Raw CIFAR payloads are 32x32x3 `u8`.

use rand::Rng;

use crate::error::{LaError, Result};

/// Height and width of raw images
pub const IMAGE_SIZE: usize = 32;
/// Color channels
pub const CHANNELS: usize = 3;
/// Zero padding added on each side before random cropping
pub const PADDING: usize = 4;
/// Bytes in one raw image
pub const RAW_IMAGE_BYTES: usize = IMAGE_SIZE * IMAGE_SIZE * CHANNELS;

/// Dense HWC image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl Image {
    /// All-zero image
    pub fn zeros(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
            data: vec![0.0; height * width * channels],
        }
    }

    /// Pixel slice at (row, col)
    pub fn pixel(&self, row: usize, col: usize) -> &[f32] {
        let start = (row * self.width + col) * self.channels;
        &self.data[start..start + self.channels]
    }

    fn row(&self, row: usize) -> &[f32] {
        let stride = self.width * self.channels;
        &self.data[row * stride..(row + 1) * stride]
    }
}

/// Decode a raw 32x32x3 payload and scale pixels to [-0.5, 0.5]
pub fn decode_raw(bytes: &[u8]) -> Result<Image> {
    if bytes.len() != RAW_IMAGE_BYTES {
        return Err(LaError::InvalidImage {
            expected: RAW_IMAGE_BYTES,
            actual: bytes.len(),
        });
    }
    let scale = 1.0f32 / 255.0;
    Ok(Image {
        height: IMAGE_SIZE,
        width: IMAGE_SIZE,
        channels: CHANNELS,
        data: bytes.iter().map(|&b| f32::from(b) * scale - 0.5).collect(),
    })
}

/// Center-crop or zero-pad to the target size.
///
/// When the difference is odd the extra row/column goes after the image.
pub fn resize_with_crop_or_pad(image: &Image, height: usize, width: usize) -> Image {
    let mut out = Image::zeros(height, width, image.channels);
    let c = image.channels;

    // Source and destination offsets along each axis
    let (src_row, dst_row, rows) = axis_offsets(image.height, height);
    let (src_col, dst_col, cols) = axis_offsets(image.width, width);

    for r in 0..rows {
        let src = &image.row(src_row + r)[src_col * c..(src_col + cols) * c];
        let dst_start = ((dst_row + r) * width + dst_col) * c;
        out.data[dst_start..dst_start + cols * c].copy_from_slice(src);
    }
    out
}

fn axis_offsets(src: usize, dst: usize) -> (usize, usize, usize) {
    if src >= dst {
        ((src - dst) / 2, 0, dst)
    } else {
        (0, (dst - src) / 2, src)
    }
}

/// Crop a window of the given size at a uniformly random offset
pub fn random_crop<R: Rng + ?Sized>(
    image: &Image,
    height: usize,
    width: usize,
    rng: &mut R,
) -> Result<Image> {
    if height > image.height || width > image.width {
        return Err(LaError::invalid(format!(
            "crop {}x{} larger than image {}x{}",
            height, width, image.height, image.width
        )));
    }
    let top = rng.gen_range(0..=image.height - height);
    let left = rng.gen_range(0..=image.width - width);
    Ok(crop(image, top, left, height, width))
}

/// Crop a window at a fixed offset
pub fn crop(image: &Image, top: usize, left: usize, height: usize, width: usize) -> Image {
    let c = image.channels;
    let mut data = Vec::with_capacity(height * width * c);
    for r in top..top + height {
        data.extend_from_slice(&image.row(r)[left * c..(left + width) * c]);
    }
    Image {
        height,
        width,
        channels: c,
        data,
    }
}

/// Mirror columns
pub fn flip_left_right(image: &Image) -> Image {
    let c = image.channels;
    let mut data = Vec::with_capacity(image.data.len());
    for r in 0..image.height {
        for pixel in image.row(r).chunks_exact(c).rev() {
            data.extend_from_slice(pixel);
        }
    }
    Image {
        data,
        ..*image
    }
}

/// Mirror columns with probability one half
pub fn random_flip_left_right<R: Rng + ?Sized>(image: Image, rng: &mut R) -> Image {
    if rng.gen_bool(0.5) {
        flip_left_right(&image)
    } else {
        image
    }
}

/// Decode a raw payload, augmenting when training.
///
/// Training images are zero-padded by [`PADDING`] on each side, randomly
/// cropped back to 32x32 and randomly mirrored.
pub fn process_image<R: Rng + ?Sized>(bytes: &[u8], training: bool, rng: &mut R) -> Result<Image> {
    let image = decode_raw(bytes)?;
    if !training {
        return Ok(image);
    }
    let padded = resize_with_crop_or_pad(&image, IMAGE_SIZE + 2 * PADDING, IMAGE_SIZE + 2 * PADDING);
    let cropped = random_crop(&padded, IMAGE_SIZE, IMAGE_SIZE, rng)?;
    Ok(random_flip_left_right(cropped, rng))
}
