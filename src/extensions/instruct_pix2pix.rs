//! [instruct-pix2pix](https://github.com/Klace/stable-diffusion-webui-instruct-pix2pix) extension.

use serde::Serialize;
use serde_json::Value;

use crate::client::Client;
use crate::codec::{encode_data_uri, PngImage};
use crate::error::ClientError;
use crate::request::{BuildContext, Endpoint, PreparedRequest};
use crate::result::GenerationResult;

/// Instruction-driven image editing request.
#[derive(Debug, Clone, Serialize)]
pub struct InstructPix2PixRequest {
    /// Images to edit, sent as data URIs under `init_images`.
    #[serde(skip)]
    pub images: Vec<PngImage>,
    /// Edit instruction.
    pub prompt: String,
    /// Negative prompt.
    pub negative_prompt: String,
    /// Number of output batches.
    pub output_batches: u32,
    /// Sampler; `None` uses the client default.
    #[serde(skip)]
    pub sampler: Option<String>,
    /// Steps; `None` uses the client default.
    #[serde(skip)]
    pub steps: Option<u32>,
    /// Seed, ignored when `randomize_seed` is set.
    pub seed: i64,
    /// Pick a random seed.
    pub randomize_seed: bool,
    /// Text guidance scale.
    pub text_cfg: f64,
    /// Image guidance scale.
    pub image_cfg: f64,
    /// Randomize both guidance scales.
    pub randomize_cfg: bool,
    /// Output width; height follows the input aspect ratio.
    pub output_image_width: u32,
}

impl Default for InstructPix2PixRequest {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            prompt: String::new(),
            negative_prompt: String::new(),
            output_batches: 1,
            sampler: None,
            steps: None,
            seed: 0,
            randomize_seed: true,
            text_cfg: 7.5,
            image_cfg: 1.5,
            randomize_cfg: false,
            output_image_width: 512,
        }
    }
}

impl InstructPix2PixRequest {
    /// Edit `images` according to `prompt`.
    pub fn new(prompt: impl Into<String>, images: Vec<PngImage>) -> Self {
        Self { images, prompt: prompt.into(), ..Self::default() }
    }

    /// Build the payload.
    ///
    /// # Errors
    ///
    /// [`ClientError::Encoding`] if an image cannot be encoded.
    pub fn prepare(&self, ctx: &BuildContext) -> Result<PreparedRequest, ClientError> {
        let Value::Object(mut payload) = serde_json::to_value(self)? else {
            return Err(ClientError::Validation("request did not serialize to an object".into()));
        };
        let init_images = self
            .images
            .iter()
            .map(|image| encode_data_uri(image).map(Value::String))
            .collect::<Result<Vec<_>, _>>()?;
        payload.insert("init_images".into(), Value::Array(init_images));
        payload.insert("sampler".into(), Value::String(ctx.defaults.sampler(self.sampler.as_deref())));
        payload.insert("steps".into(), Value::from(ctx.defaults.steps(self.steps)));
        Ok(PreparedRequest {
            endpoint: Endpoint::root("instruct-pix2pix/img2img"),
            payload: Value::Object(payload),
        })
    }
}

/// Instruction-driven image editing.
#[derive(Debug, Clone)]
pub struct InstructPix2PixInterface {
    client: Client,
}

impl InstructPix2PixInterface {
    /// Bind to a client.
    #[must_use]
    pub fn new(client: &Client) -> Self {
        Self { client: client.clone() }
    }

    /// Edit images according to the request's instruction.
    ///
    /// # Errors
    ///
    /// Encoding errors before sending, then as [`Client::send`].
    pub async fn img2img(&self, request: &InstructPix2PixRequest) -> Result<GenerationResult, ClientError> {
        self.client.send(request.prepare(self.client.build_context())?).await
    }
}
