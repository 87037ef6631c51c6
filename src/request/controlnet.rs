//! ControlNet unit serialization.

use serde_json::{json, Value};

use crate::codec::{encode_raw, PngImage};
use crate::error::ClientError;

/// One ControlNet conditioning directive.
///
/// Images are sent as bare base64: the ControlNet extension rejects data URIs.
#[derive(Debug, Clone)]
pub struct ControlNetUnit {
    /// Conditioning image. Sent as an empty string when absent.
    pub input_image: Option<PngImage>,
    /// Optional mask. Sent as `null` when absent.
    pub mask: Option<PngImage>,
    /// Preprocessor module, e.g. `canny`.
    pub module: String,
    /// ControlNet model name.
    pub model: String,
    /// Control weight.
    pub weight: f64,
    /// How the input image is fitted to the output size.
    pub resize_mode: String,
    /// Low-VRAM mode.
    pub lowvram: bool,
    /// Preprocessor resolution.
    pub processor_res: u32,
    /// First preprocessor threshold.
    pub threshold_a: f64,
    /// Second preprocessor threshold.
    pub threshold_b: f64,
    /// Guidance strength.
    pub guidance: f64,
    /// Fraction of steps at which guidance starts.
    pub guidance_start: f64,
    /// Fraction of steps at which guidance ends.
    pub guidance_end: f64,
    /// Control mode (0 balanced, 1 prompt-weighted, 2 control-weighted).
    pub control_mode: Option<u32>,
    /// Pick the preprocessor resolution automatically.
    pub pixel_perfect: bool,
    /// Deprecated alias of `control_mode`.
    pub guessmode: Option<u32>,
}

impl Default for ControlNetUnit {
    fn default() -> Self {
        Self {
            input_image: None,
            mask: None,
            module: "none".to_string(),
            model: "None".to_string(),
            weight: 1.0,
            resize_mode: "Resize and Fill".to_string(),
            lowvram: false,
            processor_res: 512,
            threshold_a: 64.0,
            threshold_b: 64.0,
            guidance: 1.0,
            guidance_start: 0.0,
            guidance_end: 1.0,
            control_mode: None,
            pixel_perfect: false,
            guessmode: None,
        }
    }
}

impl ControlNetUnit {
    /// A unit with default settings and no image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the conditioning image.
    #[must_use]
    pub fn input_image(mut self, image: impl Into<PngImage>) -> Self {
        self.input_image = Some(image.into());
        self
    }

    /// Set the mask image.
    #[must_use]
    pub fn mask(mut self, image: impl Into<PngImage>) -> Self {
        self.mask = Some(image.into());
        self
    }

    /// Set the preprocessor module.
    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Set the ControlNet model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the control weight.
    #[must_use]
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the guidance window as fractions of the sampling steps.
    #[must_use]
    pub fn guidance_range(mut self, start: f64, end: f64) -> Self {
        self.guidance_start = start;
        self.guidance_end = end;
        self
    }

    /// Set the resize mode, e.g. `"Crop and Resize"`.
    #[must_use]
    pub fn resize_mode(mut self, mode: impl Into<String>) -> Self {
        self.resize_mode = mode.into();
        self
    }

    /// Set the control mode.
    #[must_use]
    pub fn control_mode(mut self, mode: u32) -> Self {
        self.control_mode = Some(mode);
        self
    }

    /// Set the deprecated guess mode; it is mapped onto `control_mode`.
    #[deprecated(note = "use `control_mode` instead")]
    #[must_use]
    pub fn guessmode(mut self, mode: u32) -> Self {
        self.guessmode = Some(mode);
        self
    }

    /// Enable pixel-perfect preprocessing.
    #[must_use]
    pub fn pixel_perfect(mut self, enabled: bool) -> Self {
        self.pixel_perfect = enabled;
        self
    }

    /// Resolve `control_mode`, folding in the deprecated `guessmode`.
    fn resolved_control_mode(&self) -> u32 {
        match (self.control_mode, self.guessmode) {
            (Some(mode), Some(guess)) => {
                log::warn!(
                    "ControlNetUnit guessmode is deprecated and ignored because control_mode is set \
                     (guessmode={guess}, control_mode={mode})"
                );
                mode
            }
            (None, Some(guess)) => {
                log::warn!("ControlNetUnit guessmode is deprecated, use control_mode instead");
                guess
            }
            (mode, None) => mode.unwrap_or(0),
        }
    }

    /// Serialize the unit for the ControlNet extension.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encoding`] if an image cannot be encoded.
    pub fn to_payload(&self) -> Result<Value, ClientError> {
        let input_image = match &self.input_image {
            Some(image) => encode_raw(image)?,
            None => String::new(),
        };
        let mask = self.mask.as_ref().map(encode_raw).transpose()?;

        Ok(json!({
            "input_image": input_image,
            "mask": mask,
            "module": self.module,
            "model": self.model,
            "weight": self.weight,
            "resize_mode": self.resize_mode,
            "lowvram": self.lowvram,
            "processor_res": self.processor_res,
            "threshold_a": self.threshold_a,
            "threshold_b": self.threshold_b,
            "guidance": self.guidance,
            "guidance_start": self.guidance_start,
            "guidance_end": self.guidance_end,
            "control_mode": self.resolved_control_mode(),
            "pixel_perfect": self.pixel_perfect,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::capture_warnings;
    use image::{DynamicImage, GrayImage};

    fn pixel() -> PngImage {
        PngImage::new(DynamicImage::ImageLuma8(GrayImage::new(2, 2)))
    }

    #[test]
    fn default_unit_payload() {
        let payload = ControlNetUnit::new().to_payload().unwrap();
        assert_eq!(payload["input_image"], "");
        assert!(payload["mask"].is_null());
        assert_eq!(payload["module"], "none");
        assert_eq!(payload["model"], "None");
        assert_eq!(payload["resize_mode"], "Resize and Fill");
        assert_eq!(payload["processor_res"], 512);
        assert_eq!(payload["control_mode"], 0);
    }

    #[test]
    fn images_are_raw_base64() {
        let payload = ControlNetUnit::new().input_image(pixel()).mask(pixel()).to_payload().unwrap();
        let input = payload["input_image"].as_str().unwrap();
        let mask = payload["mask"].as_str().unwrap();
        assert!(!input.is_empty());
        assert!(!input.starts_with("data:"));
        assert!(!mask.starts_with("data:"));
    }

    #[test]
    #[allow(deprecated)]
    fn guessmode_maps_to_control_mode() {
        let payload = ControlNetUnit::new().guessmode(2).to_payload().unwrap();
        assert_eq!(payload["control_mode"], 2);
        assert!(payload.get("guessmode").is_none());
    }

    #[test]
    #[allow(deprecated)]
    fn control_mode_wins_over_guessmode() {
        let unit = ControlNetUnit::new().guessmode(2).control_mode(1);
        let (payload, warnings) = capture_warnings(|| unit.to_payload().unwrap());
        assert_eq!(payload["control_mode"], 1);
        assert_eq!(warnings.len(), 1, "{warnings:?}");
        assert!(warnings[0].contains("guessmode is deprecated"), "{}", warnings[0]);
    }

    #[test]
    #[allow(deprecated)]
    fn guessmode_alone_warns_once() {
        let unit = ControlNetUnit::new().guessmode(2);
        let (_, warnings) = capture_warnings(|| unit.to_payload().unwrap());
        assert_eq!(warnings.len(), 1, "{warnings:?}");
    }

    #[test]
    fn control_mode_alone_is_quiet() {
        let unit = ControlNetUnit::new().control_mode(1);
        let (_, warnings) = capture_warnings(|| unit.to_payload().unwrap());
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn guidance_range_setter() {
        let payload = ControlNetUnit::new().guidance_range(0.2, 0.8).weight(0.5).to_payload().unwrap();
        assert_eq!(payload["guidance_start"], 0.2);
        assert_eq!(payload["guidance_end"], 0.8);
        assert_eq!(payload["weight"], 0.5);
    }
}
