//! Blocking wrapper around [`Client`] for callers without an async runtime.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

use crate::client::{Client, ClientConfig, Progress, ScriptList};
use crate::codec::PngImage;
use crate::error::ClientError;
use crate::extensions::{
    ControlNetInterface, DetectRequest, InstructPix2PixInterface, InstructPix2PixRequest,
    LegacyImg2ImgRequest, LegacyTxt2ImgRequest, ModelKeywordInterface, ModelKeywordResult,
};
use crate::ports::transport::Transport;
use crate::request::{
    ExtraBatchImagesRequest, ExtraSingleImageRequest, Img2ImgRequest, PreparedRequest,
    Txt2ImgRequest,
};
use crate::result::GenerationResult;

/// A [`Client`] driven by its own single-threaded runtime. Every method
/// blocks the calling thread until the response is decoded.
///
/// Must not be used from inside an async context.
#[derive(Debug)]
pub struct BlockingClient {
    inner: Client,
    runtime: Runtime,
}

fn runtime() -> Result<Runtime, ClientError> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

impl BlockingClient {
    /// Connect and probe for ControlNet, as [`Client::connect`].
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] for an invalid configuration, or
    /// [`ClientError::Io`] if the runtime cannot start.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let runtime = runtime()?;
        let inner = runtime.block_on(Client::connect(config))?;
        Ok(Self { inner, runtime })
    }

    /// Connect over a caller-supplied transport, as
    /// [`Client::connect_with_transport`].
    ///
    /// # Errors
    ///
    /// Same as [`BlockingClient::connect`].
    pub fn connect_with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let runtime = runtime()?;
        let inner = runtime.block_on(Client::connect_with_transport(config, transport))?;
        Ok(Self { inner, runtime })
    }

    /// The async client underneath.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Blocking [`ControlNetInterface`] bound to this client.
    #[must_use]
    pub fn controlnet(&self, show_deprecation_warning: bool) -> BlockingControlNet<'_> {
        BlockingControlNet {
            runtime: &self.runtime,
            inner: ControlNetInterface::new(&self.inner, show_deprecation_warning),
        }
    }

    /// Blocking [`ModelKeywordInterface`] bound to this client.
    #[must_use]
    pub fn model_keyword(&self) -> BlockingModelKeyword<'_> {
        BlockingModelKeyword { runtime: &self.runtime, inner: ModelKeywordInterface::new(&self.inner) }
    }

    /// Blocking [`InstructPix2PixInterface`] bound to this client.
    #[must_use]
    pub fn instruct_pix2pix(&self) -> BlockingInstructPix2Pix<'_> {
        BlockingInstructPix2Pix {
            runtime: &self.runtime,
            inner: InstructPix2PixInterface::new(&self.inner),
        }
    }

    /// See [`Client::has_controlnet`].
    #[must_use]
    pub fn has_controlnet(&self) -> bool {
        self.inner.has_controlnet()
    }

    /// See [`Client::resolve_endpoint`].
    #[must_use]
    pub fn resolve_endpoint(&self, name: &str, relative_to_base: bool) -> String {
        self.inner.resolve_endpoint(name, relative_to_base)
    }

    /// See [`Client::send`].
    ///
    /// # Errors
    ///
    /// As [`Client::send`].
    pub fn send(&self, prepared: PreparedRequest) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.send(prepared))
    }

    /// See [`Client::txt2img`].
    ///
    /// # Errors
    ///
    /// As [`Client::txt2img`].
    pub fn txt2img(&self, request: &Txt2ImgRequest) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.txt2img(request))
    }

    /// See [`Client::img2img`].
    ///
    /// # Errors
    ///
    /// As [`Client::img2img`].
    pub fn img2img(&self, request: &Img2ImgRequest) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.img2img(request))
    }

    /// See [`Client::extra_single_image`].
    ///
    /// # Errors
    ///
    /// As [`Client::extra_single_image`].
    pub fn extra_single_image(
        &self,
        request: &ExtraSingleImageRequest,
    ) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.extra_single_image(request))
    }

    /// See [`Client::extra_batch_images`].
    ///
    /// # Errors
    ///
    /// As [`Client::extra_batch_images`].
    pub fn extra_batch_images(
        &self,
        request: &ExtraBatchImagesRequest,
    ) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.extra_batch_images(request))
    }

    /// See [`Client::png_info`].
    ///
    /// # Errors
    ///
    /// As [`Client::png_info`].
    pub fn png_info(&self, image: &PngImage) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.png_info(image))
    }

    /// See [`Client::interrogate`].
    ///
    /// # Errors
    ///
    /// As [`Client::interrogate`].
    pub fn interrogate(&self, image: &PngImage) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.interrogate(image))
    }

    /// See [`Client::interrupt`].
    ///
    /// # Errors
    ///
    /// As [`Client::interrupt`].
    pub fn interrupt(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.interrupt())
    }

    /// See [`Client::skip`].
    ///
    /// # Errors
    ///
    /// As [`Client::skip`].
    pub fn skip(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.skip())
    }

    /// See [`Client::options`].
    ///
    /// # Errors
    ///
    /// As [`Client::options`].
    pub fn options(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.options())
    }

    /// See [`Client::set_options`].
    ///
    /// # Errors
    ///
    /// As [`Client::set_options`].
    pub fn set_options(&self, options: &Value) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.set_options(options))
    }

    /// See [`Client::cmd_flags`].
    ///
    /// # Errors
    ///
    /// As [`Client::cmd_flags`].
    pub fn cmd_flags(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.cmd_flags())
    }

    /// See [`Client::progress`].
    ///
    /// # Errors
    ///
    /// As [`Client::progress`].
    pub fn progress(&self) -> Result<Progress, ClientError> {
        self.runtime.block_on(self.inner.progress())
    }

    /// See [`Client::refresh_checkpoints`].
    ///
    /// # Errors
    ///
    /// As [`Client::refresh_checkpoints`].
    pub fn refresh_checkpoints(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.refresh_checkpoints())
    }

    /// See [`Client::samplers`].
    ///
    /// # Errors
    ///
    /// As [`Client::samplers`].
    pub fn samplers(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.samplers())
    }

    /// See [`Client::sd_vae`].
    ///
    /// # Errors
    ///
    /// As [`Client::sd_vae`].
    pub fn sd_vae(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.sd_vae())
    }

    /// See [`Client::upscalers`].
    ///
    /// # Errors
    ///
    /// As [`Client::upscalers`].
    pub fn upscalers(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.upscalers())
    }

    /// See [`Client::latent_upscale_modes`].
    ///
    /// # Errors
    ///
    /// As [`Client::latent_upscale_modes`].
    pub fn latent_upscale_modes(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.latent_upscale_modes())
    }

    /// See [`Client::loras`].
    ///
    /// # Errors
    ///
    /// As [`Client::loras`].
    pub fn loras(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.loras())
    }

    /// See [`Client::sd_models`].
    ///
    /// # Errors
    ///
    /// As [`Client::sd_models`].
    pub fn sd_models(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.sd_models())
    }

    /// See [`Client::hypernetworks`].
    ///
    /// # Errors
    ///
    /// As [`Client::hypernetworks`].
    pub fn hypernetworks(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.hypernetworks())
    }

    /// See [`Client::face_restorers`].
    ///
    /// # Errors
    ///
    /// As [`Client::face_restorers`].
    pub fn face_restorers(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.face_restorers())
    }

    /// See [`Client::realesrgan_models`].
    ///
    /// # Errors
    ///
    /// As [`Client::realesrgan_models`].
    pub fn realesrgan_models(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.realesrgan_models())
    }

    /// See [`Client::prompt_styles`].
    ///
    /// # Errors
    ///
    /// As [`Client::prompt_styles`].
    pub fn prompt_styles(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.prompt_styles())
    }

    /// See [`Client::artist_categories`].
    ///
    /// # Errors
    ///
    /// As [`Client::artist_categories`].
    pub fn artist_categories(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.artist_categories())
    }

    /// See [`Client::artists`].
    ///
    /// # Errors
    ///
    /// As [`Client::artists`].
    pub fn artists(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.artists())
    }

    /// See [`Client::scripts`].
    ///
    /// # Errors
    ///
    /// As [`Client::scripts`].
    pub fn scripts(&self) -> Result<ScriptList, ClientError> {
        self.runtime.block_on(self.inner.scripts())
    }

    /// See [`Client::embeddings`].
    ///
    /// # Errors
    ///
    /// As [`Client::embeddings`].
    pub fn embeddings(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.embeddings())
    }

    /// See [`Client::memory`].
    ///
    /// # Errors
    ///
    /// As [`Client::memory`].
    pub fn memory(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.memory())
    }

    /// See [`Client::custom_get`].
    ///
    /// # Errors
    ///
    /// As [`Client::custom_get`].
    pub fn custom_get(&self, endpoint: &str, relative_to_base: bool) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.custom_get(endpoint, relative_to_base))
    }

    /// See [`Client::custom_post`].
    ///
    /// # Errors
    ///
    /// As [`Client::custom_post`].
    pub fn custom_post(
        &self,
        endpoint: &str,
        payload: Value,
        relative_to_base: bool,
    ) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.custom_post(endpoint, payload, relative_to_base))
    }

    /// See [`Client::model_names`].
    ///
    /// # Errors
    ///
    /// As [`Client::model_names`].
    pub fn model_names(&self) -> Result<Vec<String>, ClientError> {
        self.runtime.block_on(self.inner.model_names())
    }

    /// See [`Client::current_model`].
    ///
    /// # Errors
    ///
    /// As [`Client::current_model`].
    pub fn current_model(&self) -> Result<String, ClientError> {
        self.runtime.block_on(self.inner.current_model())
    }

    /// See [`Client::set_model`].
    ///
    /// # Errors
    ///
    /// As [`Client::set_model`].
    pub fn set_model(&self, name: &str, find_closest: bool) -> Result<Option<String>, ClientError> {
        self.runtime.block_on(self.inner.set_model(name, find_closest))
    }

    /// See [`Client::wait_until_idle`].
    ///
    /// # Errors
    ///
    /// As [`Client::wait_until_idle`].
    pub fn wait_until_idle(&self, interval: Duration, max_polls: u32) -> Result<(), ClientError> {
        self.runtime.block_on(self.inner.wait_until_idle(interval, max_polls))
    }
}

/// [`ControlNetInterface`] driven by a [`BlockingClient`]'s runtime.
#[derive(Debug)]
pub struct BlockingControlNet<'a> {
    runtime: &'a Runtime,
    inner: ControlNetInterface,
}

impl BlockingControlNet<'_> {
    /// See [`ControlNetInterface::version`].
    ///
    /// # Errors
    ///
    /// As [`ControlNetInterface::version`].
    pub fn version(&self) -> Result<Value, ClientError> {
        self.runtime.block_on(self.inner.version())
    }

    /// See [`ControlNetInterface::model_list`].
    ///
    /// # Errors
    ///
    /// As [`ControlNetInterface::model_list`].
    pub fn model_list(&self) -> Result<Vec<String>, ClientError> {
        self.runtime.block_on(self.inner.model_list())
    }

    /// See [`ControlNetInterface::module_list`].
    ///
    /// # Errors
    ///
    /// As [`ControlNetInterface::module_list`].
    pub fn module_list(&self) -> Result<Vec<String>, ClientError> {
        self.runtime.block_on(self.inner.module_list())
    }

    /// See [`ControlNetInterface::detect`].
    ///
    /// # Errors
    ///
    /// As [`ControlNetInterface::detect`].
    pub fn detect(&self, request: &DetectRequest) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.detect(request))
    }

    /// See [`ControlNetInterface::txt2img`].
    ///
    /// # Errors
    ///
    /// As [`ControlNetInterface::txt2img`].
    pub fn txt2img(&self, request: &LegacyTxt2ImgRequest) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.txt2img(request))
    }

    /// See [`ControlNetInterface::img2img`].
    ///
    /// # Errors
    ///
    /// As [`ControlNetInterface::img2img`].
    pub fn img2img(&self, request: &LegacyImg2ImgRequest) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.img2img(request))
    }
}

/// [`ModelKeywordInterface`] driven by a [`BlockingClient`]'s runtime.
#[derive(Debug)]
pub struct BlockingModelKeyword<'a> {
    runtime: &'a Runtime,
    inner: ModelKeywordInterface,
}

impl BlockingModelKeyword<'_> {
    /// See [`ModelKeywordInterface::get_keywords`].
    ///
    /// # Errors
    ///
    /// As [`ModelKeywordInterface::get_keywords`].
    pub fn get_keywords(&self) -> Result<ModelKeywordResult, ClientError> {
        self.runtime.block_on(self.inner.get_keywords())
    }
}

/// [`InstructPix2PixInterface`] driven by a [`BlockingClient`]'s runtime.
#[derive(Debug)]
pub struct BlockingInstructPix2Pix<'a> {
    runtime: &'a Runtime,
    inner: InstructPix2PixInterface,
}

impl BlockingInstructPix2Pix<'_> {
    /// See [`InstructPix2PixInterface::img2img`].
    ///
    /// # Errors
    ///
    /// As [`InstructPix2PixInterface::img2img`].
    pub fn img2img(&self, request: &InstructPix2PixRequest) -> Result<GenerationResult, ClientError> {
        self.runtime.block_on(self.inner.img2img(request))
    }
}
