//! Published option values and request parameter validation.

/// Upscalers accepted by the extras endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Upscaler {
    None,
    Lanczos,
    Nearest,
    Ldsr,
    Bsrgan,
    Esrgan4x,
    RealEsrganGeneral4xV3,
    ScunetGan,
    ScunetPsnr,
    SwinIr4x,
}

impl Upscaler {
    /// All variants in the order the webui lists them.
    pub const ALL: [Self; 10] = [
        Self::None,
        Self::Lanczos,
        Self::Nearest,
        Self::Ldsr,
        Self::Bsrgan,
        Self::Esrgan4x,
        Self::RealEsrganGeneral4xV3,
        Self::ScunetGan,
        Self::ScunetPsnr,
        Self::SwinIr4x,
    ];

    /// The name the webui uses on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Lanczos => "Lanczos",
            Self::Nearest => "Nearest",
            Self::Ldsr => "LDSR",
            Self::Bsrgan => "BSRGAN",
            Self::Esrgan4x => "ESRGAN_4x",
            Self::RealEsrganGeneral4xV3 => "R-ESRGAN General 4xV3",
            Self::ScunetGan => "ScuNET GAN",
            Self::ScunetPsnr => "ScuNET PSNR",
            Self::SwinIr4x => "SwinIR 4x",
        }
    }
}

/// Upscalers accepted by the txt2img high-resolution fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum HiResUpscaler {
    None,
    Latent,
    LatentAntialiased,
    LatentBicubic,
    LatentBicubicAntialiased,
    LatentNearest,
    LatentNearestExact,
    Lanczos,
    Nearest,
    Esrgan4x,
    Ldsr,
    ScunetGan,
    ScunetPsnr,
    SwinIr4x,
}

impl HiResUpscaler {
    /// The name the webui uses on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Latent => "Latent",
            Self::LatentAntialiased => "Latent (antialiased)",
            Self::LatentBicubic => "Latent (bicubic)",
            Self::LatentBicubicAntialiased => "Latent (bicubic antialiased)",
            // Misspelled upstream; the service matches on this exact string.
            Self::LatentNearest => "Latent (nearist)",
            Self::LatentNearestExact => "Latent (nearist-exact)",
            Self::Lanczos => "Lanczos",
            Self::Nearest => "Nearest",
            Self::Esrgan4x => "ESRGAN_4x",
            Self::Ldsr => "LDSR",
            Self::ScunetGan => "ScuNET GAN",
            Self::ScunetPsnr => "ScuNET PSNR",
            Self::SwinIr4x => "SwinIR 4x",
        }
    }
}

impl From<Upscaler> for String {
    fn from(value: Upscaler) -> Self {
        value.as_str().to_string()
    }
}

impl From<HiResUpscaler> for String {
    fn from(value: HiResUpscaler) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Upscaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for HiResUpscaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampler used when neither the call nor the client configures one.
pub const FALLBACK_SAMPLER: &str = "Euler a";

/// Step count used when neither the call nor the client configures one.
pub const FALLBACK_STEPS: u32 = 20;

/// Validate output dimensions.
///
/// # Errors
///
/// Returns an error if either side is zero.
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), String> {
    if width == 0 || height == 0 {
        return Err(format!("Image dimensions must be non-zero, got {width}x{height}"));
    }
    Ok(())
}

/// Validate a strength-like value that must lie in `0.0..=1.0`.
///
/// # Errors
///
/// Returns an error if the value is outside the range or not a number.
pub fn validate_unit_interval(name: &str, value: f64) -> Result<(), String> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{name} must be between 0.0 and 1.0, got {value}"))
    }
}

/// Validate a batch or iteration count.
///
/// # Errors
///
/// Returns an error if the count is zero.
pub fn validate_count(name: &str, value: u32) -> Result<(), String> {
    if value == 0 {
        Err(format!("{name} must be at least 1"))
    } else {
        Ok(())
    }
}
