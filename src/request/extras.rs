//! `extra-single-image` and `extra-batch-images` requests (upscaling and face restoration).

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{Endpoint, PreparedRequest};
use crate::codec::{encode_data_uri, PngImage};
use crate::error::ClientError;
use crate::params::Upscaler;

/// Post-processing options shared by the single and batch extras endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ExtrasOptions {
    /// 0 scales by `upscaling_resize`, 1 resizes to `upscaling_resize_w`/`_h`.
    pub resize_mode: u32,
    /// Return the processed images.
    pub show_extras_results: bool,
    /// GFPGAN face restoration visibility.
    pub gfpgan_visibility: f64,
    /// CodeFormer face restoration visibility.
    pub codeformer_visibility: f64,
    /// CodeFormer weight.
    pub codeformer_weight: f64,
    /// Scale factor for resize mode 0.
    pub upscaling_resize: f64,
    /// Target width for resize mode 1.
    pub upscaling_resize_w: u32,
    /// Target height for resize mode 1.
    pub upscaling_resize_h: u32,
    /// Crop to fit in resize mode 1.
    pub upscaling_crop: bool,
    /// Primary upscaler.
    pub upscaler_1: String,
    /// Secondary upscaler.
    pub upscaler_2: String,
    /// Blend weight of the secondary upscaler.
    pub extras_upscaler_2_visibility: f64,
    /// Upscale before face restoration.
    pub upscale_first: bool,
}

impl Default for ExtrasOptions {
    fn default() -> Self {
        Self {
            resize_mode: 0,
            show_extras_results: true,
            gfpgan_visibility: 0.0,
            codeformer_visibility: 0.0,
            codeformer_weight: 0.0,
            upscaling_resize: 2.0,
            upscaling_resize_w: 512,
            upscaling_resize_h: 512,
            upscaling_crop: true,
            upscaler_1: Upscaler::None.into(),
            upscaler_2: Upscaler::None.into(),
            extras_upscaler_2_visibility: 0.0,
            upscale_first: false,
        }
    }
}

impl ExtrasOptions {
    /// Set the primary upscaler.
    #[must_use]
    pub fn upscaler(mut self, upscaler: impl Into<String>) -> Self {
        self.upscaler_1 = upscaler.into();
        self
    }

    /// Scale by a factor (resize mode 0).
    #[must_use]
    pub fn scale(mut self, factor: f64) -> Self {
        self.resize_mode = 0;
        self.upscaling_resize = factor;
        self
    }

    /// Resize to explicit dimensions (resize mode 1).
    #[must_use]
    pub fn resize_to(mut self, width: u32, height: u32, crop: bool) -> Self {
        self.resize_mode = 1;
        self.upscaling_resize_w = width;
        self.upscaling_resize_h = height;
        self.upscaling_crop = crop;
        self
    }

    fn to_map(&self) -> Result<Map<String, Value>, ClientError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(ClientError::Validation("extras options did not serialize to an object".into())),
        }
    }
}

/// Post-process one image.
#[derive(Debug, Clone)]
pub struct ExtraSingleImageRequest {
    /// Image to process.
    pub image: PngImage,
    /// Processing options.
    pub options: ExtrasOptions,
}

impl ExtraSingleImageRequest {
    /// Create a request for `image` with default options.
    pub fn new(image: impl Into<PngImage>) -> Self {
        Self { image: image.into(), options: ExtrasOptions::default() }
    }

    /// Replace the processing options.
    #[must_use]
    pub fn options(mut self, options: ExtrasOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encoding`] if the image cannot be encoded.
    pub fn prepare(&self) -> Result<PreparedRequest, ClientError> {
        let mut payload = self.options.to_map()?;
        payload.insert("image".into(), Value::String(encode_data_uri(&self.image)?));
        Ok(PreparedRequest { endpoint: Endpoint::api("extra-single-image"), payload: Value::Object(payload) })
    }
}

/// Post-process several images in one call.
#[derive(Debug, Clone)]
pub struct ExtraBatchImagesRequest {
    /// Images to process.
    pub images: Vec<PngImage>,
    /// Names for the images; must match `images` in length when set.
    pub names: Option<Vec<String>>,
    /// Processing options.
    pub options: ExtrasOptions,
}

impl ExtraBatchImagesRequest {
    /// Create a request for `images` with default options.
    #[must_use]
    pub fn new(images: Vec<PngImage>) -> Self {
        Self { images, names: None, options: ExtrasOptions::default() }
    }

    /// Name each image explicitly.
    #[must_use]
    pub fn names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    /// Replace the processing options.
    #[must_use]
    pub fn options(mut self, options: ExtrasOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the payload. Without explicit names, images are named
    /// `image00001`, `image00002`, ...
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] if the name list length differs
    /// from the image count, and [`ClientError::Encoding`] if an image cannot
    /// be encoded.
    pub fn prepare(&self) -> Result<PreparedRequest, ClientError> {
        let names = match &self.names {
            Some(names) if names.len() != self.images.len() => {
                return Err(ClientError::Validation(format!(
                    "{} names given for {} images",
                    names.len(),
                    self.images.len()
                )));
            }
            Some(names) => names.clone(),
            None => sequential_names(self.images.len()),
        };

        let image_list = self
            .images
            .iter()
            .zip(names)
            .map(|(image, name)| -> Result<Value, ClientError> {
                Ok(json!({ "data": encode_data_uri(image)?, "name": name }))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut payload = self.options.to_map()?;
        payload.insert("imageList".into(), Value::Array(image_list));
        Ok(PreparedRequest { endpoint: Endpoint::api("extra-batch-images"), payload: Value::Object(payload) })
    }
}

fn sequential_names(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("image{i:05}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DATA_URI_PREFIX;
    use image::{DynamicImage, RgbImage};

    fn image() -> PngImage {
        PngImage::new(DynamicImage::ImageRgb8(RgbImage::new(4, 4)))
    }

    #[test]
    fn single_image_payload() {
        let prepared = ExtraSingleImageRequest::new(image())
            .options(ExtrasOptions::default().upscaler(Upscaler::Esrgan4x).scale(4.0))
            .prepare()
            .unwrap();
        let p = &prepared.payload;
        assert_eq!(prepared.endpoint, Endpoint::api("extra-single-image"));
        assert!(p["image"].as_str().unwrap().starts_with(DATA_URI_PREFIX));
        assert_eq!(p["upscaler_1"], "ESRGAN_4x");
        assert_eq!(p["upscaler_2"], "None");
        assert_eq!(p["upscaling_resize"], 4.0);
        assert_eq!(p["show_extras_results"], true);
    }

    #[test]
    fn batch_synthesizes_names() {
        let prepared = ExtraBatchImagesRequest::new(vec![image(), image()]).prepare().unwrap();
        let list = prepared.payload["imageList"].as_array().unwrap();
        assert_eq!(list[0]["name"], "image00001");
        assert_eq!(list[1]["name"], "image00002");
        assert!(list[0]["data"].as_str().unwrap().starts_with(DATA_URI_PREFIX));
    }

    #[test]
    fn batch_uses_given_names() {
        let prepared = ExtraBatchImagesRequest::new(vec![image()])
            .names(vec!["front".into()])
            .prepare()
            .unwrap();
        assert_eq!(prepared.payload["imageList"][0]["name"], "front");
    }

    #[test]
    fn batch_name_mismatch_is_validation_error() {
        let err = ExtraBatchImagesRequest::new(vec![image(), image()])
            .names(vec!["only-one".into()])
            .prepare()
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[test]
    fn resize_to_switches_mode() {
        let options = ExtrasOptions::default().resize_to(1024, 768, false);
        assert_eq!(options.resize_mode, 1);
        assert_eq!(options.upscaling_resize_w, 1024);
        assert!(!options.upscaling_crop);
    }

    #[test]
    fn sequential_names_are_zero_padded() {
        assert_eq!(sequential_names(3), vec!["image00001", "image00002", "image00003"]);
        assert!(sequential_names(0).is_empty());
    }
}
