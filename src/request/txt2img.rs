//! `txt2img` request.

use serde::Serialize;

use super::{attach_controlnet, base_payload, BuildContext, Endpoint, GenerationOptions, GenerationParams, PreparedRequest};
use crate::error::ClientError;
use crate::params::{validate_unit_interval, HiResUpscaler};

/// Text-to-image generation request.
///
/// # Example
/// ```
/// use starrysky::request::{BuildContext, GenerationOptions, Txt2ImgRequest};
///
/// let prepared = Txt2ImgRequest::new("a lighthouse at dusk")
///     .negative_prompt("blurry")
///     .size(512, 768)
///     .steps(25)
///     .prepare(&BuildContext::default())
///     .unwrap();
///
/// assert_eq!(prepared.endpoint.path, "txt2img");
/// assert_eq!(prepared.payload["sampler_name"], "Euler a");
/// assert_eq!(prepared.payload["steps"], 25);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Txt2ImgRequest {
    /// Shared generation parameters.
    #[serde(flatten)]
    pub params: GenerationParams,
    /// Enable the high-resolution fix.
    pub enable_hr: bool,
    /// Denoising strength of the high-resolution pass.
    pub denoising_strength: f64,
    /// First-pass width (legacy high-resolution fix).
    pub firstphase_width: u32,
    /// First-pass height (legacy high-resolution fix).
    pub firstphase_height: u32,
    /// Upscale factor of the high-resolution pass.
    pub hr_scale: f64,
    /// Upscaler of the high-resolution pass.
    pub hr_upscaler: String,
    /// Steps of the second pass; 0 reuses `steps`.
    pub hr_second_pass_steps: u32,
    /// Explicit target width of the high-resolution pass.
    pub hr_resize_x: u32,
    /// Explicit target height of the high-resolution pass.
    pub hr_resize_y: u32,
}

impl Default for Txt2ImgRequest {
    fn default() -> Self {
        Self {
            params: GenerationParams::default(),
            enable_hr: false,
            denoising_strength: 0.7,
            firstphase_width: 0,
            firstphase_height: 0,
            hr_scale: 2.0,
            hr_upscaler: HiResUpscaler::Latent.into(),
            hr_second_pass_steps: 0,
            hr_resize_x: 0,
            hr_resize_y: 0,
        }
    }
}

impl Txt2ImgRequest {
    /// Create a request for the given prompt with default parameters.
    pub fn new(prompt: impl Into<String>) -> Self {
        let mut request = Self::default();
        request.params.prompt = prompt.into();
        request
    }

    /// Enable the high-resolution fix with the given upscaler and scale.
    #[must_use]
    pub fn hires_fix(mut self, upscaler: impl Into<String>, scale: f64) -> Self {
        self.enable_hr = true;
        self.hr_upscaler = upscaler.into();
        self.hr_scale = scale;
        self
    }

    /// Set the denoising strength of the high-resolution pass.
    #[must_use]
    pub fn denoising_strength(mut self, strength: f64) -> Self {
        self.denoising_strength = strength;
        self
    }

    /// Build the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] for out-of-range parameters and
    /// [`ClientError::Encoding`] if a ControlNet image cannot be encoded.
    pub fn prepare(&self, ctx: &BuildContext) -> Result<PreparedRequest, ClientError> {
        validate_unit_interval("denoising_strength", self.denoising_strength)
            .map_err(ClientError::Validation)?;
        let payload = base_payload(self, &self.params, ctx)?;
        attach_controlnet(
            payload,
            &self.params,
            ctx,
            Endpoint::api("txt2img"),
            Endpoint::root("controlnet/txt2img"),
        )
    }
}

impl GenerationOptions for Txt2ImgRequest {
    fn params_mut(&mut self) -> &mut GenerationParams {
        &mut self.params
    }
}
