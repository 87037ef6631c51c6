//! Client for the stable-diffusion-webui HTTP API.
//!
//! Build a [`Client`] from a [`ClientConfig`], then send typed requests:
//!
//! ```no_run
//! use starrysky::{Client, ClientConfig, GenerationOptions, Txt2ImgRequest};
//!
//! # async fn run() -> Result<(), starrysky::ClientError> {
//! let config = ClientConfig::new("http://127.0.0.1:7860/sdapi/v1", "token").steps(30);
//! let client = Client::connect(&config).await?;
//! let result = client.txt2img(&Txt2ImgRequest::new("a lighthouse at dusk").seed(42)).await?;
//! if let Some(image) = result.image() {
//!     image.save("lighthouse.png")?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`BlockingClient`] offers the same calls for synchronous code, and
//! [`Client::submit`] returns a [`PendingResult`] that resolves in the
//! background.

pub mod adapters;
pub mod blocking;
pub mod cassette;
pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod extensions;
pub mod model;
pub mod params;
pub mod pending;
pub mod ports;
pub mod request;
pub mod result;

#[cfg(test)]
mod testing;

pub use blocking::BlockingClient;
pub use client::{Client, ClientConfig, Progress, ProgressState, ScriptList};
pub use codec::PngImage;
pub use error::ClientError;
pub use params::{HiResUpscaler, Upscaler};
pub use pending::PendingResult;
pub use request::{
    ControlNetUnit, ExtraBatchImagesRequest, ExtraSingleImageRequest, ExtrasOptions,
    GenerationOptions, Img2ImgRequest, PreparedRequest, Txt2ImgRequest,
};
pub use result::{GenerationResult, ResultInfo};
