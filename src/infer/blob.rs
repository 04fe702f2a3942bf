use image::RgbImage;

use crate::error::{DetectError, DetectResult};

/// NCHW float tensor `(1, 3, height, width)` fed to the network.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }
}

/// Planar BGR blob with raw 0..255 values; the network was trained on unnormalized BGR input.
pub fn image_to_blob(img: &RgbImage, expected: (u32, u32)) -> DetectResult<ImageTensor> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(DetectError::EmptyImage);
    }
    if (w, h) != expected {
        return Err(DetectError::InputSize { expected, actual: (w, h) });
    }
    let numel = w as usize * h as usize;
    let mut data = vec![0.0f32; numel * 3];
    // HWC RGB -> CHW BGR
    for (i, p) in img.pixels().enumerate() {
        data[i] = p[2] as f32;
        data[numel + i] = p[1] as f32;
        data[2 * numel + i] = p[0] as f32;
    }
    Ok(ImageTensor { width: w, height: h, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn planes_are_bgr() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([10, 20, 30]));
        img.put_pixel(1, 0, Rgb([40, 50, 60]));
        let blob = image_to_blob(&img, (2, 1)).unwrap();
        assert_eq!(blob.shape(), [1, 3, 1, 2]);
        assert_eq!(blob.data, vec![30.0, 60.0, 20.0, 50.0, 10.0, 40.0]);
    }

    #[test]
    fn empty_image_is_rejected() {
        let img = RgbImage::new(0, 0);
        assert!(matches!(image_to_blob(&img, (0, 0)), Err(DetectError::EmptyImage)));
    }

    #[test]
    fn wrong_size_is_rejected() {
        let img = RgbImage::new(32, 16);
        let err = image_to_blob(&img, (32, 32)).unwrap_err();
        assert!(err.is_input_error());
        assert!(matches!(err, DetectError::InputSize { actual: (32, 16), .. }));
    }
}
