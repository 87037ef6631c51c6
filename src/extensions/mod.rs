//! Interfaces to popular webui extensions.
//!
//! Each interface holds a clone of a [`Client`](crate::Client) and sends to the
//! extension's routes at the host root. They keep no state of their own.

pub mod controlnet;
pub mod instruct_pix2pix;
pub mod model_keyword;

pub use controlnet::{ControlNetInterface, DetectRequest, LegacyControlNetArgs, LegacyImg2ImgRequest, LegacyTxt2ImgRequest};
pub use instruct_pix2pix::{InstructPix2PixInterface, InstructPix2PixRequest};
pub use model_keyword::{ModelKeywordInterface, ModelKeywordResult};
