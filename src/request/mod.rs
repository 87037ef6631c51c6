//! Request payload builders.
//!
//! Each endpoint gets a request struct whose fields carry the webui's
//! defaults. Building a request resolves the sampler and step count against
//! the client's defaults, migrates deprecated fields, encodes images, and
//! attaches ControlNet units. Nothing here touches the network.

pub mod controlnet;
pub mod extras;
pub mod img2img;
pub mod txt2img;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::codec::{encode_data_uri, PngImage};
use crate::error::ClientError;
use crate::params::{
    validate_count, validate_dimensions, validate_unit_interval, FALLBACK_SAMPLER, FALLBACK_STEPS,
};

pub use controlnet::ControlNetUnit;
pub use extras::{ExtraBatchImagesRequest, ExtraSingleImageRequest, ExtrasOptions};
pub use img2img::Img2ImgRequest;
pub use txt2img::Txt2ImgRequest;

/// Script name the webui's ControlNet extension registers for txt2img.
pub const CONTROLNET_SCRIPT: &str = "controlnet m2m";

/// Key of the ControlNet entry in `alwayson_scripts`.
pub const CONTROLNET_ALWAYSON_KEY: &str = "ControlNet";

/// Where a request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Path without a leading slash, e.g. `txt2img` or `controlnet/detect`.
    pub path: String,
    /// `true` to join onto the API base URL, `false` to join onto the host root.
    pub relative_to_base: bool,
}

impl Endpoint {
    /// An endpoint under the configured API base URL.
    pub fn api(path: impl Into<String>) -> Self {
        Self { path: path.into(), relative_to_base: true }
    }

    /// An endpoint served from the application root of the same host.
    pub fn root(path: impl Into<String>) -> Self {
        Self { path: path.into(), relative_to_base: false }
    }
}

/// A fully built payload and its destination.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Target endpoint.
    pub endpoint: Endpoint,
    /// JSON body.
    pub payload: Value,
}

/// A payload carrying one data-URI image under `image`, as used by
/// `png-info` and `interrogate`.
///
/// # Errors
///
/// Returns [`ClientError::Encoding`] if the image cannot be encoded.
pub fn single_image(endpoint: Endpoint, image: &PngImage) -> Result<PreparedRequest, ClientError> {
    Ok(PreparedRequest { endpoint, payload: json!({ "image": encode_data_uri(image)? }) })
}

/// Client-level defaults for fields a call leaves unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    /// Default sampler name.
    pub sampler: Option<String>,
    /// Default step count.
    pub steps: Option<u32>,
}

impl Defaults {
    /// Pick the sampler: explicit value, then the client default, then `"Euler a"`.
    #[must_use]
    pub fn sampler(&self, explicit: Option<&str>) -> String {
        explicit
            .or(self.sampler.as_deref())
            .unwrap_or(FALLBACK_SAMPLER)
            .to_string()
    }

    /// Pick the step count: explicit value, then the client default, then 20.
    #[must_use]
    pub fn steps(&self, explicit: Option<u32>) -> u32 {
        explicit.or(self.steps).unwrap_or(FALLBACK_STEPS)
    }
}

/// Session state a builder needs: defaults plus the probed ControlNet flag.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// Sampler/step defaults.
    pub defaults: Defaults,
    /// Whether the capability probe found the ControlNet extension.
    pub controlnet_detected: bool,
}

/// Parameters shared by txt2img and img2img.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationParams {
    /// Positive prompt.
    pub prompt: String,
    /// Negative prompt.
    pub negative_prompt: String,
    /// Saved prompt styles to apply.
    pub styles: Vec<String>,
    /// Seed; -1 lets the service choose.
    pub seed: i64,
    /// Variation seed; -1 lets the service choose.
    pub subseed: i64,
    /// Variation strength.
    pub subseed_strength: f64,
    /// Height the seed was originally generated at.
    pub seed_resize_from_h: i32,
    /// Width the seed was originally generated at.
    pub seed_resize_from_w: i32,
    /// Sampler name; `None` uses the client default.
    #[serde(skip)]
    pub sampler_name: Option<String>,
    /// Deprecated alias of `sampler_name`.
    #[serde(skip)]
    pub sampler_index: Option<String>,
    /// Images per batch.
    pub batch_size: u32,
    /// Number of batches.
    pub n_iter: u32,
    /// Sampling steps; `None` uses the client default.
    #[serde(skip)]
    pub steps: Option<u32>,
    /// Classifier-free guidance scale.
    pub cfg_scale: f64,
    /// Output width.
    pub width: u32,
    /// Output height.
    pub height: u32,
    /// Run face restoration.
    pub restore_faces: bool,
    /// Produce a tileable image.
    pub tiling: bool,
    /// Do not save samples on the server.
    pub do_not_save_samples: bool,
    /// Do not save the grid on the server.
    pub do_not_save_grid: bool,
    /// Sampler eta.
    pub eta: f64,
    /// Sampler churn.
    pub s_churn: f64,
    /// Sampler tmax.
    pub s_tmax: f64,
    /// Sampler tmin.
    pub s_tmin: f64,
    /// Sampler noise.
    pub s_noise: f64,
    /// Server options to override for this call.
    pub override_settings: Map<String, Value>,
    /// Restore overridden options after the call.
    pub override_settings_restore_afterwards: bool,
    /// Arguments for `script_name`.
    pub script_args: Vec<Value>,
    /// Selectable script to run.
    pub script_name: Option<String>,
    /// Return images in the response.
    pub send_images: bool,
    /// Save images on the server.
    pub save_images: bool,
    /// Always-on script arguments, keyed by script title.
    pub alwayson_scripts: Map<String, Value>,
    /// ControlNet units for this call.
    #[serde(skip)]
    pub controlnet_units: Vec<ControlNetUnit>,
    /// Post units to the old `/controlnet/*` endpoints instead of `alwayson_scripts`.
    #[serde(skip)]
    pub use_deprecated_controlnet: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            styles: Vec::new(),
            seed: -1,
            subseed: -1,
            subseed_strength: 0.0,
            seed_resize_from_h: 0,
            seed_resize_from_w: 0,
            sampler_name: None,
            sampler_index: None,
            batch_size: 1,
            n_iter: 1,
            steps: None,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            restore_faces: false,
            tiling: false,
            do_not_save_samples: false,
            do_not_save_grid: false,
            eta: 1.0,
            s_churn: 0.0,
            s_tmax: 0.0,
            s_tmin: 0.0,
            s_noise: 1.0,
            override_settings: Map::new(),
            override_settings_restore_afterwards: true,
            script_args: Vec::new(),
            script_name: None,
            send_images: true,
            save_images: false,
            alwayson_scripts: Map::new(),
            controlnet_units: Vec::new(),
            use_deprecated_controlnet: false,
        }
    }
}

impl GenerationParams {
    /// Resolve the sampler, folding the deprecated `sampler_index` into
    /// `sampler_name`. A warning is logged whenever `sampler_index` is set.
    fn resolve_sampler(&self, defaults: &Defaults) -> String {
        let explicit = match (&self.sampler_name, &self.sampler_index) {
            (Some(name), Some(index)) => {
                log::warn!(
                    "sampler_index is deprecated and ignored because sampler_name is set \
                     (sampler_index={index:?}, sampler_name={name:?})"
                );
                Some(name.as_str())
            }
            (None, Some(index)) => {
                log::warn!("sampler_index is deprecated, use sampler_name instead ({index:?})");
                Some(index.as_str())
            }
            (name, None) => name.as_deref(),
        };
        defaults.sampler(explicit)
    }

    fn validate(&self) -> Result<(), ClientError> {
        validate_dimensions(self.width, self.height)
            .and_then(|()| validate_count("batch_size", self.batch_size))
            .and_then(|()| validate_count("n_iter", self.n_iter))
            .and_then(|()| validate_unit_interval("subseed_strength", self.subseed_strength))
            .map_err(ClientError::Validation)?;
        if self.steps == Some(0) {
            return Err(ClientError::Validation("steps must be at least 1".into()));
        }
        Ok(())
    }
}

/// Builder-style setters shared by every request that embeds [`GenerationParams`].
pub trait GenerationOptions: Sized {
    /// Mutable access to the shared parameters.
    fn params_mut(&mut self) -> &mut GenerationParams;

    /// Set the negative prompt.
    #[must_use]
    fn negative_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.params_mut().negative_prompt = prompt.into();
        self
    }

    /// Add a saved prompt style.
    #[must_use]
    fn style(mut self, style: impl Into<String>) -> Self {
        self.params_mut().styles.push(style.into());
        self
    }

    /// Set the seed. -1 lets the service choose.
    #[must_use]
    fn seed(mut self, seed: i64) -> Self {
        self.params_mut().seed = seed;
        self
    }

    /// Set the variation seed and its strength.
    #[must_use]
    fn subseed(mut self, subseed: i64, strength: f64) -> Self {
        let params = self.params_mut();
        params.subseed = subseed;
        params.subseed_strength = strength;
        self
    }

    /// Set the sampler name.
    #[must_use]
    fn sampler(mut self, sampler: impl Into<String>) -> Self {
        self.params_mut().sampler_name = Some(sampler.into());
        self
    }

    /// Set the deprecated `sampler_index`; it is mapped onto `sampler_name`.
    #[deprecated(note = "use `sampler` instead")]
    #[must_use]
    fn sampler_index(mut self, sampler: impl Into<String>) -> Self {
        self.params_mut().sampler_index = Some(sampler.into());
        self
    }

    /// Set the number of sampling steps.
    #[must_use]
    fn steps(mut self, steps: u32) -> Self {
        self.params_mut().steps = Some(steps);
        self
    }

    /// Set the classifier-free guidance scale.
    #[must_use]
    fn cfg_scale(mut self, cfg: f64) -> Self {
        self.params_mut().cfg_scale = cfg;
        self
    }

    /// Set output dimensions.
    #[must_use]
    fn size(mut self, width: u32, height: u32) -> Self {
        let params = self.params_mut();
        params.width = width;
        params.height = height;
        self
    }

    /// Set images per batch.
    #[must_use]
    fn batch_size(mut self, size: u32) -> Self {
        self.params_mut().batch_size = size;
        self
    }

    /// Set the number of batches.
    #[must_use]
    fn n_iter(mut self, n: u32) -> Self {
        self.params_mut().n_iter = n;
        self
    }

    /// Enable or disable face restoration.
    #[must_use]
    fn restore_faces(mut self, enabled: bool) -> Self {
        self.params_mut().restore_faces = enabled;
        self
    }

    /// Enable or disable tiling.
    #[must_use]
    fn tiling(mut self, enabled: bool) -> Self {
        self.params_mut().tiling = enabled;
        self
    }

    /// Override a server option for this call only.
    #[must_use]
    fn override_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params_mut().override_settings.insert(key.into(), value.into());
        self
    }

    /// Run a selectable script with the given arguments.
    #[must_use]
    fn script(mut self, name: impl Into<String>, args: Vec<Value>) -> Self {
        let params = self.params_mut();
        params.script_name = Some(name.into());
        params.script_args = args;
        self
    }

    /// Pass arguments to an always-on script.
    #[must_use]
    fn alwayson_script(mut self, title: impl Into<String>, args: Vec<Value>) -> Self {
        self.params_mut().alwayson_scripts.insert(title.into(), json!({ "args": args }));
        self
    }

    /// Attach a ControlNet unit.
    #[must_use]
    fn controlnet_unit(mut self, unit: ControlNetUnit) -> Self {
        self.params_mut().controlnet_units.push(unit);
        self
    }

    /// Send ControlNet units to the old `/controlnet/*` endpoints.
    #[must_use]
    fn use_deprecated_controlnet(mut self, enabled: bool) -> Self {
        self.params_mut().use_deprecated_controlnet = enabled;
        self
    }

    /// Ask the server to save outputs.
    #[must_use]
    fn save_images(mut self, enabled: bool) -> Self {
        self.params_mut().save_images = enabled;
        self
    }
}

/// Serialize a request struct and fill in the resolved sampler and steps.
fn base_payload<T: Serialize>(
    request: &T,
    params: &GenerationParams,
    ctx: &BuildContext,
) -> Result<Map<String, Value>, ClientError> {
    params.validate()?;
    let Value::Object(mut payload) = serde_json::to_value(request)? else {
        return Err(ClientError::Validation("request did not serialize to an object".into()));
    };
    let sampler = params.resolve_sampler(&ctx.defaults);
    payload.insert("sampler_name".into(), Value::String(sampler.clone()));
    payload.insert("sampler_index".into(), Value::String(sampler));
    payload.insert("steps".into(), Value::from(ctx.defaults.steps(params.steps)));
    Ok(payload)
}

/// Attach ControlNet units and pick the destination.
///
/// With the deprecated transport and at least one unit, the units go under
/// `controlnet_units` and the request targets `legacy`. Otherwise units go
/// into `alwayson_scripts.ControlNet.args`. When the extension is installed
/// and there are no units, an empty `args` list is still sent: the webui
/// reuses the previous call's ControlNet arguments if the entry is missing.
fn attach_controlnet(
    mut payload: Map<String, Value>,
    params: &GenerationParams,
    ctx: &BuildContext,
    endpoint: Endpoint,
    legacy: Endpoint,
) -> Result<PreparedRequest, ClientError> {
    let units = &params.controlnet_units;

    if params.use_deprecated_controlnet && !units.is_empty() {
        let serialized = units.iter().map(ControlNetUnit::to_payload).collect::<Result<Vec<_>, _>>()?;
        payload.insert("controlnet_units".into(), Value::Array(serialized));
        return Ok(PreparedRequest { endpoint: legacy, payload: Value::Object(payload) });
    }

    if !units.is_empty() || ctx.controlnet_detected {
        let args = units.iter().map(ControlNetUnit::to_payload).collect::<Result<Vec<_>, _>>()?;
        let scripts = payload
            .entry("alwayson_scripts")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(scripts) = scripts {
            scripts.insert(CONTROLNET_ALWAYSON_KEY.into(), json!({ "args": args }));
        }
    }

    Ok(PreparedRequest { endpoint, payload: Value::Object(payload) })
}
