//! Async client for the webui HTTP API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapters::live::http::HttpTransport;
use crate::codec::PngImage;
use crate::error::ClientError;
use crate::model::resolve_model;
use crate::pending::PendingResult;
use crate::ports::transport::{Transport, WireRequest, WireResponse};
use crate::request::{
    single_image, BuildContext, Defaults, Endpoint, ExtraBatchImagesRequest,
    ExtraSingleImageRequest, Img2ImgRequest, PreparedRequest, Txt2ImgRequest, CONTROLNET_SCRIPT,
};
use crate::result::{decode_response, GenerationResult};

/// Connection settings for a [`Client`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// API base URL, e.g. `http://127.0.0.1:7860/sdapi/v1`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: String,
    /// Sampler used when a request leaves it unset.
    pub default_sampler: Option<String>,
    /// Step count used when a request leaves it unset.
    pub default_steps: Option<u32>,
}

impl ClientConfig {
    /// Settings with no sampler/step defaults.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), token: token.into(), ..Self::default() }
    }

    /// Set the default sampler.
    #[must_use]
    pub fn sampler(mut self, sampler: impl Into<String>) -> Self {
        self.default_sampler = Some(sampler.into());
        self
    }

    /// Set the default step count.
    #[must_use]
    pub fn steps(mut self, steps: u32) -> Self {
        self.default_steps = Some(steps);
        self
    }

    fn defaults(&self) -> Defaults {
        Defaults { sampler: self.default_sampler.clone(), steps: self.default_steps }
    }
}

/// Output of the `progress` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    /// Fraction of the current job done, `0.0..=1.0`.
    pub progress: f64,
    /// Estimated seconds remaining.
    pub eta_relative: f64,
    /// Queue and sampler state.
    pub state: ProgressState,
    /// Base64 preview of the current image, when enabled.
    pub current_image: Option<String>,
    /// Status text.
    pub textinfo: Option<String>,
}

/// The `state` object inside [`Progress`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressState {
    /// Jobs queued, including the running one.
    pub job_count: i64,
    /// Index of the running job.
    pub job_no: i64,
    /// Current sampling step.
    pub sampling_step: i64,
    /// Total sampling steps.
    pub sampling_steps: i64,
    /// The current job was skipped.
    pub skipped: bool,
    /// The current job was interrupted.
    pub interrupted: bool,
    /// Job description.
    pub job: String,
    /// Job start timestamp.
    pub job_timestamp: String,
}

impl Progress {
    /// No job is running or queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.progress.abs() < f64::EPSILON && self.state.job_count == 0
    }
}

/// Output of the `scripts` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptList {
    /// Scripts available to txt2img.
    pub txt2img: Vec<String>,
    /// Scripts available to img2img.
    pub img2img: Vec<String>,
}

/// Async client bound to one webui instance.
///
/// Only [`Client::connect`] and [`Client::connect_with_transport`] hand one
/// out, so every session has probed for ControlNet before its first request.
/// The answer is fixed for the session's lifetime and copied into clones,
/// which share the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    base: String,
    origin: String,
    ctx: BuildContext,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base", &self.base)
            .field("origin", &self.origin)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Unprobed client over the live HTTP transport. No network I/O.
    pub(crate) fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config.token)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Unprobed client over any transport. No network I/O.
    pub(crate) fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let (base, origin) = validate_config(config)?;
        Ok(Self {
            transport,
            base,
            origin,
            ctx: BuildContext { defaults: config.defaults(), controlnet_detected: false },
        })
    }

    /// Build a client and probe the server for the ControlNet extension.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`], before any request is sent, if the
    /// base URL or token is empty or the base URL is not an absolute http(s)
    /// URL. Probe failures are not errors.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut client = Self::new(config)?;
        client.probe().await;
        Ok(client)
    }

    /// [`Client::connect`] over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Same as [`Client::connect`].
    pub async fn connect_with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let mut client = Self::with_transport(config, transport)?;
        client.probe().await;
        Ok(client)
    }

    /// Look for the ControlNet script in the txt2img script list. Any
    /// failure leaves the flag `false`.
    async fn probe(&mut self) {
        let detected = match self.scripts().await {
            Ok(scripts) => scripts.txt2img.iter().any(|s| s == CONTROLNET_SCRIPT),
            Err(e) => {
                log::debug!("ControlNet probe failed, assuming absent: {e}");
                false
            }
        };
        log::debug!("ControlNet extension detected: {detected}");
        self.ctx.controlnet_detected = detected;
    }

    /// Whether the probe found the ControlNet extension.
    #[must_use]
    pub fn has_controlnet(&self) -> bool {
        self.ctx.controlnet_detected
    }

    /// Defaults and capability state handed to request builders.
    #[must_use]
    pub fn build_context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Absolute URL of `name`, either under the API base or at the host root.
    #[must_use]
    pub fn resolve_endpoint(&self, name: &str, relative_to_base: bool) -> String {
        let name = name.trim_start_matches('/');
        let url = if relative_to_base {
            format!("{}/{name}", self.base)
        } else {
            format!("{}{name}", self.origin)
        };
        log::debug!("resolved endpoint {name} -> {url}");
        url
    }

    fn url(&self, endpoint: &Endpoint) -> String {
        self.resolve_endpoint(&endpoint.path, endpoint.relative_to_base)
    }

    async fn execute(&self, request: WireRequest) -> Result<WireResponse, ClientError> {
        self.transport.execute(&request).await
    }

    /// Post a prepared request and decode the response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Service`] for non-200 responses,
    /// [`ClientError::InvalidResponse`] or [`ClientError::Encoding`] if the
    /// body cannot be decoded, and [`ClientError::Network`] on transport failure.
    pub async fn send(&self, prepared: PreparedRequest) -> Result<GenerationResult, ClientError> {
        let url = self.url(&prepared.endpoint);
        let response = self.execute(WireRequest::post(url, Some(prepared.payload))).await?;
        decode_response(response.status, &response.body)
    }

    /// Post a prepared request in the background and return immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Task`] when called outside a Tokio runtime.
    /// Request failures surface when the handle is awaited.
    pub fn submit(&self, prepared: PreparedRequest) -> Result<PendingResult, ClientError> {
        let client = self.clone();
        PendingResult::spawn(async move { client.send(prepared).await })
    }

    async fn get_json(&self, endpoint: &Endpoint) -> Result<Value, ClientError> {
        self.execute(WireRequest::get(self.url(endpoint))).await?.json()
    }

    async fn post_json(&self, endpoint: &Endpoint, body: Option<Value>) -> Result<Value, ClientError> {
        self.execute(WireRequest::post(self.url(endpoint), body)).await?.json()
    }

    // Generation

    /// Build a txt2img request against this client's defaults.
    ///
    /// # Errors
    ///
    /// See [`Txt2ImgRequest::prepare`].
    pub fn prepare_txt2img(&self, request: &Txt2ImgRequest) -> Result<PreparedRequest, ClientError> {
        request.prepare(&self.ctx)
    }

    /// Build an img2img request against this client's defaults.
    ///
    /// # Errors
    ///
    /// See [`Img2ImgRequest::prepare`].
    pub fn prepare_img2img(&self, request: &Img2ImgRequest) -> Result<PreparedRequest, ClientError> {
        request.prepare(&self.ctx)
    }

    /// Build an `extra-single-image` request.
    ///
    /// # Errors
    ///
    /// See [`ExtraSingleImageRequest::prepare`].
    pub fn prepare_extra_single_image(
        &self,
        request: &ExtraSingleImageRequest,
    ) -> Result<PreparedRequest, ClientError> {
        request.prepare()
    }

    /// Build an `extra-batch-images` request.
    ///
    /// # Errors
    ///
    /// See [`ExtraBatchImagesRequest::prepare`].
    pub fn prepare_extra_batch_images(
        &self,
        request: &ExtraBatchImagesRequest,
    ) -> Result<PreparedRequest, ClientError> {
        request.prepare()
    }

    /// Generate images from a prompt.
    ///
    /// # Errors
    ///
    /// Validation and encoding errors before sending, then as [`Client::send`].
    pub async fn txt2img(&self, request: &Txt2ImgRequest) -> Result<GenerationResult, ClientError> {
        self.send(self.prepare_txt2img(request)?).await
    }

    /// Transform images according to a prompt.
    ///
    /// # Errors
    ///
    /// Validation and encoding errors before sending, then as [`Client::send`].
    pub async fn img2img(&self, request: &Img2ImgRequest) -> Result<GenerationResult, ClientError> {
        self.send(self.prepare_img2img(request)?).await
    }

    /// Upscale or restore faces on one image.
    ///
    /// # Errors
    ///
    /// Encoding errors before sending, then as [`Client::send`].
    pub async fn extra_single_image(
        &self,
        request: &ExtraSingleImageRequest,
    ) -> Result<GenerationResult, ClientError> {
        self.send(self.prepare_extra_single_image(request)?).await
    }

    /// Upscale or restore faces on several images.
    ///
    /// # Errors
    ///
    /// [`ClientError::Validation`] on a name/image count mismatch, without
    /// any network call; otherwise as [`Client::send`].
    pub async fn extra_batch_images(
        &self,
        request: &ExtraBatchImagesRequest,
    ) -> Result<GenerationResult, ClientError> {
        self.send(self.prepare_extra_batch_images(request)?).await
    }

    /// Read the generation parameters embedded in a PNG.
    ///
    /// # Errors
    ///
    /// As [`Client::send`].
    pub async fn png_info(&self, image: &PngImage) -> Result<GenerationResult, ClientError> {
        self.send(single_image(Endpoint::api("png-info"), image)?).await
    }

    /// Caption an image. The caption is returned as the result's info text.
    ///
    /// # Errors
    ///
    /// As [`Client::send`].
    pub async fn interrogate(&self, image: &PngImage) -> Result<GenerationResult, ClientError> {
        self.send(single_image(Endpoint::api("interrogate"), image)?).await
    }

    /// [`Client::txt2img`] in the background.
    ///
    /// # Errors
    ///
    /// Validation and encoding errors, or [`ClientError::Task`] outside a runtime.
    pub fn submit_txt2img(&self, request: &Txt2ImgRequest) -> Result<PendingResult, ClientError> {
        self.submit(self.prepare_txt2img(request)?)
    }

    /// [`Client::img2img`] in the background.
    ///
    /// # Errors
    ///
    /// Validation and encoding errors, or [`ClientError::Task`] outside a runtime.
    pub fn submit_img2img(&self, request: &Img2ImgRequest) -> Result<PendingResult, ClientError> {
        self.submit(self.prepare_img2img(request)?)
    }

    /// [`Client::extra_single_image`] in the background.
    ///
    /// # Errors
    ///
    /// Encoding errors, or [`ClientError::Task`] outside a runtime.
    pub fn submit_extra_single_image(
        &self,
        request: &ExtraSingleImageRequest,
    ) -> Result<PendingResult, ClientError> {
        self.submit(self.prepare_extra_single_image(request)?)
    }

    /// [`Client::extra_batch_images`] in the background.
    ///
    /// # Errors
    ///
    /// Validation and encoding errors, or [`ClientError::Task`] outside a runtime.
    pub fn submit_extra_batch_images(
        &self,
        request: &ExtraBatchImagesRequest,
    ) -> Result<PendingResult, ClientError> {
        self.submit(self.prepare_extra_batch_images(request)?)
    }

    // Control

    /// Interrupt the running job.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn interrupt(&self) -> Result<Value, ClientError> {
        self.post_json(&Endpoint::api("interrupt"), None).await
    }

    /// Skip the current image of the running job.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn skip(&self) -> Result<Value, ClientError> {
        self.post_json(&Endpoint::api("skip"), None).await
    }

    /// Server options.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn options(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("options")).await
    }

    /// Change server options. Only the keys present in `options` are touched.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn set_options(&self, options: &Value) -> Result<Value, ClientError> {
        self.post_json(&Endpoint::api("options"), Some(options.clone())).await
    }

    /// Command-line flags the server was started with.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn cmd_flags(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("cmd-flags")).await
    }

    /// Progress of the running job.
    ///
    /// # Errors
    ///
    /// Non-200 status, an unexpected body shape, or transport failure.
    pub async fn progress(&self) -> Result<Progress, ClientError> {
        let value = self.get_json(&Endpoint::api("progress")).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::InvalidResponse(format!("Unexpected progress body: {e}")))
    }

    /// Rescan the checkpoint directory.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn refresh_checkpoints(&self) -> Result<Value, ClientError> {
        self.post_json(&Endpoint::api("refresh-checkpoints"), None).await
    }

    // Listings

    /// Available samplers.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn samplers(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("samplers")).await
    }

    /// Available VAEs.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn sd_vae(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("sd-vae")).await
    }

    /// Available upscalers.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn upscalers(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("upscalers")).await
    }

    /// Available latent upscale modes.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn latent_upscale_modes(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("latent-upscale-modes")).await
    }

    /// Available LoRAs.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn loras(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("loras")).await
    }

    /// Available checkpoints, each with at least a `title`.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn sd_models(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("sd-models")).await
    }

    /// Available hypernetworks.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn hypernetworks(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("hypernetworks")).await
    }

    /// Available face restorers.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn face_restorers(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("face-restorers")).await
    }

    /// Available Real-ESRGAN models.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn realesrgan_models(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("realesrgan-models")).await
    }

    /// Saved prompt styles.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn prompt_styles(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("prompt-styles")).await
    }

    /// Artist categories. Removed from recent webui versions.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn artist_categories(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("artist-categories")).await
    }

    /// Artists. Removed from recent webui versions.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn artists(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("artists")).await
    }

    /// Installed scripts per generation mode.
    ///
    /// # Errors
    ///
    /// Non-200 status, an unexpected body shape, or transport failure.
    pub async fn scripts(&self) -> Result<ScriptList, ClientError> {
        let value = self.get_json(&Endpoint::api("scripts")).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::InvalidResponse(format!("Unexpected scripts body: {e}")))
    }

    /// Loaded and skipped textual inversion embeddings.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn embeddings(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("embeddings")).await
    }

    /// RAM and CUDA memory statistics.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn memory(&self) -> Result<Value, ClientError> {
        self.get_json(&Endpoint::api("memory")).await
    }

    // Raw access

    /// GET any endpoint and return its JSON body.
    ///
    /// # Errors
    ///
    /// Non-200 status, non-JSON body or transport failure.
    pub async fn custom_get(&self, endpoint: &str, relative_to_base: bool) -> Result<Value, ClientError> {
        self.get_json(&endpoint_for(endpoint, relative_to_base)).await
    }

    /// POST a JSON payload to any endpoint and decode it as a generation result.
    ///
    /// # Errors
    ///
    /// As [`Client::send`].
    pub async fn custom_post(
        &self,
        endpoint: &str,
        payload: Value,
        relative_to_base: bool,
    ) -> Result<GenerationResult, ClientError> {
        self.send(PreparedRequest { endpoint: endpoint_for(endpoint, relative_to_base), payload })
            .await
    }

    // Utilities

    /// Checkpoint titles, sorted.
    ///
    /// # Errors
    ///
    /// As [`Client::sd_models`], or [`ClientError::InvalidResponse`] if the
    /// listing is not an array of objects with a `title`.
    pub async fn model_names(&self) -> Result<Vec<String>, ClientError> {
        let models = self.sd_models().await?;
        let entries = models
            .as_array()
            .ok_or_else(|| ClientError::InvalidResponse("sd-models is not an array".into()))?;
        let mut titles = entries
            .iter()
            .map(|m| {
                m.get("title").and_then(Value::as_str).map(str::to_string).ok_or_else(|| {
                    ClientError::InvalidResponse(format!("sd-models entry without title: {m}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        titles.sort();
        Ok(titles)
    }

    /// Title of the loaded checkpoint.
    ///
    /// # Errors
    ///
    /// As [`Client::options`], or [`ClientError::InvalidResponse`] if
    /// `sd_model_checkpoint` is missing.
    pub async fn current_model(&self) -> Result<String, ClientError> {
        let options = self.options().await?;
        options
            .get("sd_model_checkpoint")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::InvalidResponse("options lack sd_model_checkpoint".into()))
    }

    /// Switch the loaded checkpoint. Returns the title that was loaded, or
    /// `None` when nothing matched.
    ///
    /// An exact title always wins. With `find_closest`, the lower-cased
    /// name is matched to the most similar title instead.
    ///
    /// # Errors
    ///
    /// As [`Client::model_names`] and [`Client::set_options`].
    pub async fn set_model(&self, name: &str, find_closest: bool) -> Result<Option<String>, ClientError> {
        let titles = self.model_names().await?;
        let Some(found) = resolve_model(name, &titles, find_closest) else {
            log::info!("model {name:?} not found");
            return Ok(None);
        };
        log::info!("loading model {found}");
        self.set_options(&serde_json::json!({ "sd_model_checkpoint": found })).await?;
        log::info!("model changed to {found}");
        Ok(Some(found.to_string()))
    }

    /// Poll `progress` every `interval` until no job is running or queued.
    ///
    /// # Errors
    ///
    /// [`ClientError::Validation`] if `max_polls` is 0,
    /// [`ClientError::InvalidResponse`] if the server is still busy after
    /// `max_polls` polls, and any error from [`Client::progress`].
    pub async fn wait_until_idle(&self, interval: Duration, max_polls: u32) -> Result<(), ClientError> {
        if max_polls == 0 {
            return Err(ClientError::Validation("max_polls must be at least 1".into()));
        }
        let mut last = Progress::default();
        for poll in 1..=max_polls {
            last = self.progress().await?;
            if last.is_idle() {
                return Ok(());
            }
            log::info!(
                "[WAIT] progress = {:.4}, job_count = {}",
                last.progress,
                last.state.job_count
            );
            if poll < max_polls {
                tokio::time::sleep(interval).await;
            }
        }
        Err(ClientError::InvalidResponse(format!(
            "server still busy after {max_polls} polls (progress = {:.4}, job_count = {})",
            last.progress, last.state.job_count
        )))
    }
}

fn endpoint_for(path: &str, relative_to_base: bool) -> Endpoint {
    if relative_to_base {
        Endpoint::api(path)
    } else {
        Endpoint::root(path)
    }
}

/// Check the base URL and token, returning the trimmed base and the host
/// root (scheme, host and port, ending in `/`).
fn validate_config(config: &ClientConfig) -> Result<(String, String), ClientError> {
    let base = config.base_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(ClientError::Config("base_url cannot be empty".into()));
    }
    if config.token.trim().is_empty() {
        return Err(ClientError::Config("token cannot be empty".into()));
    }
    let mut origin = Url::parse(base)
        .map_err(|e| ClientError::Config(format!("Invalid base_url {base:?}: {e}")))?;
    if !matches!(origin.scheme(), "http" | "https") {
        return Err(ClientError::Config(format!("base_url must be http(s), got {base:?}")));
    }
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    Ok((base.to_string(), origin.to_string()))
}
