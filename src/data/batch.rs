use crate::error::DataError;

/// Label value used for pixels that must not be scored or trained on.
pub const IGNORE_LABEL: i64 = 250;

/// Dense image with channel-interleaved pixels (`[y][x][c]` flattened).
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub pixels: Vec<f64>,
}

impl Image {
    pub fn zeros(width: usize, height: usize, channels: usize) -> Image {
        Image {
            width,
            height,
            channels,
            pixels: vec![0.0; width * height * channels],
        }
    }

    pub fn from_pixels(
        width: usize,
        height: usize,
        channels: usize,
        pixels: Vec<f64>,
    ) -> Result<Image, DataError> {
        if pixels.len() != width * height * channels {
            return Err(DataError::ShapeMismatch(format!(
                "{}x{}x{} image needs {} values, got {}",
                width,
                height,
                channels,
                width * height * channels,
                pixels.len()
            )));
        }
        Ok(Image { width, height, channels, pixels })
    }

    pub fn n_pixels(&self) -> usize {
        self.width * self.height
    }

    /// Channel values of pixel `p` (row-major index).
    pub fn pixel(&self, p: usize) -> &[f64] {
        &self.pixels[p * self.channels..(p + 1) * self.channels]
    }

    pub fn pixel_mut(&mut self, p: usize) -> &mut [f64] {
        &mut self.pixels[p * self.channels..(p + 1) * self.channels]
    }
}

/// Per-pixel ground-truth classes. Values outside `[0, n_classes)` are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<i64>,
}

impl LabelMap {
    pub fn filled(width: usize, height: usize, label: i64) -> LabelMap {
        LabelMap {
            width,
            height,
            labels: vec![label; width * height],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image: Image,
    pub label: LabelMap,
}

/// A batch of samples as handed to the model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    pub images: Vec<Image>,
    pub labels: Vec<LabelMap>,
}

impl Batch {
    /// Stacks samples into a batch, checking that every label map matches its image.
    pub fn collate(samples: Vec<Sample>) -> Result<Batch, DataError> {
        let mut batch = Batch {
            images: Vec::with_capacity(samples.len()),
            labels: Vec::with_capacity(samples.len()),
        };
        for Sample { image, label } in samples {
            if image.width != label.width
                || image.height != label.height
                || label.labels.len() != image.n_pixels()
            {
                return Err(DataError::ShapeMismatch(format!(
                    "image is {}x{} but label map is {}x{} with {} labels",
                    image.width,
                    image.height,
                    label.width,
                    label.height,
                    label.labels.len()
                )));
            }
            batch.images.push(image);
            batch.labels.push(label);
        }
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn n_pixels(&self) -> usize {
        self.images.iter().map(Image::n_pixels).sum()
    }

    /// All labels flattened image by image, matching the pixel order of model output.
    pub fn targets(&self) -> Vec<i64> {
        self.labels.iter().flat_map(|l| l.labels.iter().copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(w: usize, h: usize, label: i64) -> Sample {
        Sample {
            image: Image::zeros(w, h, 3),
            label: LabelMap::filled(w, h, label),
        }
    }

    #[test]
    fn collate_flattens_targets_in_image_order() {
        let batch = Batch::collate(vec![sample(2, 1, 0), sample(1, 2, 1)]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.n_pixels(), 4);
        assert_eq!(batch.targets(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn collate_rejects_mismatched_labels() {
        let mut bad = sample(2, 2, 0);
        bad.label.labels.pop();
        let err = Batch::collate(vec![bad]).unwrap_err();
        assert!(matches!(err, DataError::ShapeMismatch(_)));
    }

    #[test]
    fn from_pixels_checks_length() {
        assert!(Image::from_pixels(2, 2, 1, vec![0.0; 4]).is_ok());
        assert!(Image::from_pixels(2, 2, 3, vec![0.0; 4]).is_err());
    }

    #[test]
    fn pixel_slices_are_channel_interleaved() {
        let img = Image::from_pixels(2, 1, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(img.pixel(0), &[1.0, 2.0]);
        assert_eq!(img.pixel(1), &[3.0, 4.0]);
    }
}
