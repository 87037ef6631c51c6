//! `img2img` request.

use serde::Serialize;
use serde_json::Value;

use super::{attach_controlnet, base_payload, BuildContext, Endpoint, GenerationOptions, GenerationParams, PreparedRequest};
use crate::codec::{encode_data_uri, PngImage};
use crate::error::ClientError;
use crate::params::validate_unit_interval;

/// Image-to-image (and inpainting) request.
#[derive(Debug, Clone, Serialize)]
pub struct Img2ImgRequest {
    /// Shared generation parameters.
    #[serde(flatten)]
    pub params: GenerationParams,
    /// Source images, sent as data URIs under `init_images`.
    #[serde(skip)]
    pub images: Vec<PngImage>,
    /// Inpainting mask, sent as a data URI under `mask` only when present.
    #[serde(skip)]
    pub mask_image: Option<PngImage>,
    /// How source images are fitted to the output size.
    pub resize_mode: u32,
    /// How much of the source to replace.
    pub denoising_strength: f64,
    /// Image guidance scale (instruct-pix2pix models).
    pub image_cfg_scale: f64,
    /// Mask blur radius.
    pub mask_blur: u32,
    /// Fill mode for masked content.
    pub inpainting_fill: u32,
    /// Inpaint at full resolution.
    pub inpaint_full_res: bool,
    /// Padding around the masked area at full resolution.
    pub inpaint_full_res_padding: u32,
    /// Invert the mask.
    pub inpainting_mask_invert: u32,
    /// Noise multiplier for the initial latent.
    pub initial_noise_multiplier: f64,
    /// Return the source images in the response.
    pub include_init_images: bool,
}

impl Default for Img2ImgRequest {
    fn default() -> Self {
        Self {
            params: GenerationParams::default(),
            images: Vec::new(),
            mask_image: None,
            resize_mode: 0,
            denoising_strength: 0.75,
            image_cfg_scale: 1.5,
            mask_blur: 4,
            inpainting_fill: 0,
            inpaint_full_res: true,
            inpaint_full_res_padding: 0,
            inpainting_mask_invert: 0,
            initial_noise_multiplier: 1.0,
            include_init_images: false,
        }
    }
}

impl Img2ImgRequest {
    /// Create a request that transforms `images` according to `prompt`.
    pub fn new(prompt: impl Into<String>, images: Vec<PngImage>) -> Self {
        let mut request = Self { images, ..Self::default() };
        request.params.prompt = prompt.into();
        request
    }

    /// Set the inpainting mask.
    #[must_use]
    pub fn mask(mut self, mask: impl Into<PngImage>) -> Self {
        self.mask_image = Some(mask.into());
        self
    }

    /// Set the denoising strength.
    #[must_use]
    pub fn denoising_strength(mut self, strength: f64) -> Self {
        self.denoising_strength = strength;
        self
    }

    /// Set the resize mode.
    #[must_use]
    pub fn resize_mode(mut self, mode: u32) -> Self {
        self.resize_mode = mode;
        self
    }

    /// Return source images alongside the generated ones.
    #[must_use]
    pub fn include_init_images(mut self, enabled: bool) -> Self {
        self.include_init_images = enabled;
        self
    }

    /// Build the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] for out-of-range parameters and
    /// [`ClientError::Encoding`] if any image cannot be encoded.
    pub fn prepare(&self, ctx: &BuildContext) -> Result<PreparedRequest, ClientError> {
        validate_unit_interval("denoising_strength", self.denoising_strength)
            .map_err(ClientError::Validation)?;
        let mut payload = base_payload(self, &self.params, ctx)?;

        let init_images = self
            .images
            .iter()
            .map(|image| encode_data_uri(image).map(Value::String))
            .collect::<Result<Vec<_>, _>>()?;
        payload.insert("init_images".into(), Value::Array(init_images));
        if let Some(mask) = &self.mask_image {
            payload.insert("mask".into(), Value::String(encode_data_uri(mask)?));
        }

        attach_controlnet(
            payload,
            &self.params,
            ctx,
            Endpoint::api("img2img"),
            Endpoint::root("controlnet/img2img"),
        )
    }
}

impl GenerationOptions for Img2ImgRequest {
    fn params_mut(&mut self) -> &mut GenerationParams {
        &mut self.params
    }
}
