//! [sd-webui-controlnet](https://github.com/Mikubill/sd-webui-controlnet) extension.
//!
//! For generation, prefer attaching [`ControlNetUnit`](crate::ControlNetUnit)s
//! to a regular txt2img/img2img request. The flat `controlnet/txt2img` and
//! `controlnet/img2img` routes wrapped here are deprecated upstream.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::Client;
use crate::codec::{encode_data_uri, encode_raw, PngImage};
use crate::error::ClientError;
use crate::request::{BuildContext, Endpoint, PreparedRequest};
use crate::result::GenerationResult;

/// Run a preprocessor over images without generating anything.
#[derive(Debug, Clone, Serialize)]
pub struct DetectRequest {
    /// Images to preprocess, sent as data URIs.
    #[serde(skip)]
    pub images: Vec<PngImage>,
    /// Preprocessor name.
    #[serde(rename = "controlnet_module")]
    pub module: String,
    /// Preprocessor resolution.
    #[serde(rename = "controlnet_processor_res")]
    pub processor_res: u32,
    /// First preprocessor threshold.
    #[serde(rename = "controlnet_threshold_a")]
    pub threshold_a: f64,
    /// Second preprocessor threshold.
    #[serde(rename = "controlnet_threshold_b")]
    pub threshold_b: f64,
}

impl DetectRequest {
    /// Preprocess `images` with `module`.
    pub fn new(module: impl Into<String>, images: Vec<PngImage>) -> Self {
        Self { images, module: module.into(), processor_res: 512, threshold_a: 64.0, threshold_b: 64.0 }
    }

    /// Build the payload.
    ///
    /// # Errors
    ///
    /// [`ClientError::Encoding`] if an image cannot be encoded.
    pub fn prepare(&self) -> Result<PreparedRequest, ClientError> {
        let mut payload = to_object(self)?;
        let images = self
            .images
            .iter()
            .map(|image| encode_data_uri(image).map(Value::String))
            .collect::<Result<Vec<_>, _>>()?;
        payload.insert("controlnet_input_images".into(), Value::Array(images));
        Ok(PreparedRequest { endpoint: Endpoint::root("controlnet/detect"), payload: Value::Object(payload) })
    }
}

/// The flattened `controlnet_*` fields of the deprecated routes.
#[derive(Debug, Clone, Serialize)]
pub struct LegacyControlNetArgs {
    /// Control images, sent as raw base64.
    #[serde(skip)]
    pub input_images: Vec<PngImage>,
    /// Control masks, sent as raw base64.
    #[serde(skip)]
    pub masks: Vec<PngImage>,
    /// Preprocessor name.
    #[serde(rename = "controlnet_module")]
    pub module: String,
    /// ControlNet model name.
    #[serde(rename = "controlnet_model")]
    pub model: String,
    /// Control weight.
    #[serde(rename = "controlnet_weight")]
    pub weight: f64,
    /// How control images are fitted.
    #[serde(rename = "controlnet_resize_mode")]
    pub resize_mode: String,
    /// Low VRAM mode.
    #[serde(rename = "controlnet_lowvram")]
    pub lowvram: bool,
    /// Preprocessor resolution.
    #[serde(rename = "controlnet_processor_res")]
    pub processor_res: u32,
    /// First preprocessor threshold.
    #[serde(rename = "controlnet_threshold_a")]
    pub threshold_a: f64,
    /// Second preprocessor threshold.
    #[serde(rename = "controlnet_threshold_b")]
    pub threshold_b: f64,
    /// Guidance strength.
    #[serde(rename = "controlnet_guidance")]
    pub guidance: f64,
    /// Guess mode.
    pub guess_mode: bool,
}

impl Default for LegacyControlNetArgs {
    fn default() -> Self {
        Self {
            input_images: Vec::new(),
            masks: Vec::new(),
            module: String::new(),
            model: String::new(),
            weight: 1.0,
            resize_mode: "Scale to Fit (Inner Fit)".into(),
            lowvram: false,
            processor_res: 512,
            threshold_a: 64.0,
            threshold_b: 64.0,
            guidance: 1.0,
            guess_mode: true,
        }
    }
}

impl LegacyControlNetArgs {
    fn insert_images(&self, payload: &mut Map<String, Value>) -> Result<(), ClientError> {
        payload.insert("controlnet_input_image".into(), raw_images(&self.input_images)?);
        payload.insert("controlnet_mask".into(), raw_images(&self.masks)?);
        Ok(())
    }
}

/// Deprecated flat txt2img with ControlNet.
#[derive(Debug, Clone, Serialize)]
pub struct LegacyTxt2ImgRequest {
    /// ControlNet fields.
    #[serde(flatten)]
    pub controlnet: LegacyControlNetArgs,
    /// Positive prompt.
    pub prompt: String,
    /// Negative prompt.
    pub negative_prompt: String,
    /// Enable hires fix.
    pub enable_hr: bool,
    /// Hires fix denoising strength.
    pub denoising_strength: f64,
    /// Hires fix scale.
    pub hr_scale: f64,
    /// Hires fix upscaler.
    pub hr_upscale: String,
    /// Seed; -1 lets the service choose.
    pub seed: i64,
    /// Variation seed.
    pub subseed: i64,
    /// Variation strength; -1 leaves it to the service.
    pub subseed_strength: f64,
    /// Sampler, sent as `sampler_index`; `None` uses the client default.
    #[serde(skip)]
    pub sampler: Option<String>,
    /// Images per batch.
    pub batch_size: u32,
    /// Number of batches.
    pub n_iter: u32,
    /// Steps; `None` uses the client default.
    #[serde(skip)]
    pub steps: Option<u32>,
    /// Guidance scale.
    pub cfg_scale: f64,
    /// Output width.
    pub width: u32,
    /// Output height.
    pub height: u32,
    /// Run face restoration.
    pub restore_faces: bool,
    /// Server options to override for this call.
    pub override_settings: Option<Map<String, Value>>,
    /// Restore overridden options afterwards.
    pub override_settings_restore_afterwards: bool,
}

impl Default for LegacyTxt2ImgRequest {
    fn default() -> Self {
        Self {
            controlnet: LegacyControlNetArgs { weight: 0.5, ..LegacyControlNetArgs::default() },
            prompt: String::new(),
            negative_prompt: String::new(),
            enable_hr: false,
            denoising_strength: 0.5,
            hr_scale: 1.5,
            hr_upscale: "Latent".into(),
            seed: -1,
            subseed: -1,
            subseed_strength: -1.0,
            sampler: None,
            batch_size: 1,
            n_iter: 1,
            steps: None,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            restore_faces: false,
            override_settings: None,
            override_settings_restore_afterwards: true,
        }
    }
}

impl LegacyTxt2ImgRequest {
    /// A request for `prompt` with no control images.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    /// Build the payload.
    ///
    /// # Errors
    ///
    /// [`ClientError::Encoding`] if an image cannot be encoded.
    pub fn prepare(&self, ctx: &BuildContext) -> Result<PreparedRequest, ClientError> {
        let mut payload = to_object(self)?;
        self.controlnet.insert_images(&mut payload)?;
        insert_sampling(&mut payload, ctx, self.sampler.as_deref(), self.steps);
        Ok(PreparedRequest { endpoint: Endpoint::root("controlnet/txt2img"), payload: Value::Object(payload) })
    }
}

/// Deprecated flat img2img with ControlNet.
#[derive(Debug, Clone, Serialize)]
pub struct LegacyImg2ImgRequest {
    /// Source images, sent as raw base64.
    #[serde(skip)]
    pub init_images: Vec<PngImage>,
    /// Inpainting mask, sent as raw base64 or `null`.
    #[serde(skip)]
    pub mask: Option<PngImage>,
    /// Mask blur radius.
    pub mask_blur: u32,
    /// Fill mode for masked content.
    pub inpainting_fill: u32,
    /// Inpaint at full resolution.
    pub inpaint_full_res: bool,
    /// Padding at full resolution.
    pub inpaint_full_res_padding: u32,
    /// Invert the mask.
    pub inpainting_mask_invert: u32,
    /// How source images are fitted.
    pub resize_mode: u32,
    /// How much of the source to replace.
    pub denoising_strength: f64,
    /// Positive prompt.
    pub prompt: String,
    /// Negative prompt.
    pub negative_prompt: String,
    /// ControlNet fields.
    #[serde(flatten)]
    pub controlnet: LegacyControlNetArgs,
    /// Seed; -1 lets the service choose.
    pub seed: i64,
    /// Variation seed.
    pub subseed: i64,
    /// Variation strength; -1 leaves it to the service.
    pub subseed_strength: f64,
    /// Sampler, sent as `sampler_index`; `None` uses the client default.
    #[serde(skip)]
    pub sampler: Option<String>,
    /// Images per batch.
    pub batch_size: u32,
    /// Number of batches.
    pub n_iter: u32,
    /// Steps; `None` uses the client default.
    #[serde(skip)]
    pub steps: Option<u32>,
    /// Guidance scale.
    pub cfg_scale: f64,
    /// Output width.
    pub width: u32,
    /// Output height.
    pub height: u32,
    /// Run face restoration.
    pub restore_faces: bool,
    /// Return the source images in the response.
    pub include_init_images: bool,
    /// Server options to override for this call.
    pub override_settings: Option<Map<String, Value>>,
    /// Restore overridden options afterwards.
    pub override_settings_restore_afterwards: bool,
}

impl Default for LegacyImg2ImgRequest {
    fn default() -> Self {
        Self {
            init_images: Vec::new(),
            mask: None,
            mask_blur: 30,
            inpainting_fill: 0,
            inpaint_full_res: true,
            inpaint_full_res_padding: 1,
            inpainting_mask_invert: 1,
            resize_mode: 0,
            denoising_strength: 0.7,
            prompt: String::new(),
            negative_prompt: String::new(),
            controlnet: LegacyControlNetArgs::default(),
            seed: -1,
            subseed: -1,
            subseed_strength: -1.0,
            sampler: None,
            batch_size: 1,
            n_iter: 1,
            steps: None,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            restore_faces: false,
            include_init_images: true,
            override_settings: None,
            override_settings_restore_afterwards: true,
        }
    }
}

impl LegacyImg2ImgRequest {
    /// Transform `images` according to `prompt`.
    pub fn new(prompt: impl Into<String>, images: Vec<PngImage>) -> Self {
        Self { prompt: prompt.into(), init_images: images, ..Self::default() }
    }

    /// Build the payload.
    ///
    /// # Errors
    ///
    /// [`ClientError::Encoding`] if an image cannot be encoded.
    pub fn prepare(&self, ctx: &BuildContext) -> Result<PreparedRequest, ClientError> {
        let mut payload = to_object(self)?;
        payload.insert("init_images".into(), raw_images(&self.init_images)?);
        let mask = match &self.mask {
            Some(mask) => Value::String(encode_raw(mask)?),
            None => Value::Null,
        };
        payload.insert("mask".into(), mask);
        self.controlnet.insert_images(&mut payload)?;
        insert_sampling(&mut payload, ctx, self.sampler.as_deref(), self.steps);
        Ok(PreparedRequest { endpoint: Endpoint::root("controlnet/img2img"), payload: Value::Object(payload) })
    }
}

/// ControlNet routes: metadata, preprocessing and the deprecated generation
/// endpoints.
#[derive(Debug, Clone)]
pub struct ControlNetInterface {
    client: Client,
    show_deprecation_warning: bool,
}

impl ControlNetInterface {
    /// Bind to a client. With `show_deprecation_warning`, every call to the
    /// deprecated generation routes logs a warning.
    #[must_use]
    pub fn new(client: &Client, show_deprecation_warning: bool) -> Self {
        Self { client: client.clone(), show_deprecation_warning }
    }

    async fn field(&self, route: &str, key: &str) -> Result<Value, ClientError> {
        let mut body = self.client.custom_get(route, false).await?;
        body.get_mut(key)
            .map(Value::take)
            .ok_or_else(|| ClientError::InvalidResponse(format!("{route} response lacks {key:?}")))
    }

    /// Extension version.
    ///
    /// # Errors
    ///
    /// As [`Client::custom_get`], or [`ClientError::InvalidResponse`] if
    /// `version` is missing.
    pub async fn version(&self) -> Result<Value, ClientError> {
        self.field("controlnet/version", "version").await
    }

    /// Installed ControlNet models.
    ///
    /// # Errors
    ///
    /// As [`Client::custom_get`], or [`ClientError::InvalidResponse`] if
    /// `model_list` is missing or not a list of strings.
    pub async fn model_list(&self) -> Result<Vec<String>, ClientError> {
        string_list(self.field("controlnet/model_list", "model_list").await?)
    }

    /// Available preprocessors.
    ///
    /// # Errors
    ///
    /// As [`ControlNetInterface::model_list`], for `module_list`.
    pub async fn module_list(&self) -> Result<Vec<String>, ClientError> {
        string_list(self.field("controlnet/module_list", "module_list").await?)
    }

    /// Run a preprocessor. The annotated images come back as the result's images.
    ///
    /// # Errors
    ///
    /// Encoding errors before sending, then as [`Client::send`].
    pub async fn detect(&self, request: &DetectRequest) -> Result<GenerationResult, ClientError> {
        self.client.send(request.prepare()?).await
    }

    /// Deprecated flat txt2img.
    ///
    /// # Errors
    ///
    /// Encoding errors before sending, then as [`Client::send`].
    pub async fn txt2img(&self, request: &LegacyTxt2ImgRequest) -> Result<GenerationResult, ClientError> {
        self.warn_deprecated();
        self.client.send(request.prepare(self.client.build_context())?).await
    }

    /// Deprecated flat img2img.
    ///
    /// # Errors
    ///
    /// Encoding errors before sending, then as [`Client::send`].
    pub async fn img2img(&self, request: &LegacyImg2ImgRequest) -> Result<GenerationResult, ClientError> {
        self.warn_deprecated();
        self.client.send(request.prepare(self.client.build_context())?).await
    }

    fn warn_deprecated(&self) {
        if self.show_deprecation_warning {
            log::warn!(
                "ControlNetInterface txt2img/img2img is deprecated, \
                 attach controlnet units to a regular txt2img/img2img request instead"
            );
        }
    }
}

fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>, ClientError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(ClientError::Validation("request did not serialize to an object".into())),
    }
}

fn raw_images(images: &[PngImage]) -> Result<Value, ClientError> {
    images
        .iter()
        .map(|image| encode_raw(image).map(Value::String))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn insert_sampling(
    payload: &mut Map<String, Value>,
    ctx: &BuildContext,
    sampler: Option<&str>,
    steps: Option<u32>,
) {
    payload.insert("sampler_index".into(), Value::String(ctx.defaults.sampler(sampler)));
    payload.insert("steps".into(), Value::from(ctx.defaults.steps(steps)));
}

fn string_list(value: Value) -> Result<Vec<String>, ClientError> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::InvalidResponse(format!("Expected a list of names: {e}")))
}
