//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};

/// Command-line client for the stable-diffusion-webui API.
#[derive(Parser, Debug)]
#[command(name = "starrysky", version, about)]
pub struct Cli {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Verbose output (debug logging).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate images from a prompt.
    Txt2img {
        /// Prompt and sampling options.
        #[command(flatten)]
        generation: GenerationArgs,

        /// Enable hires fix with this upscale factor.
        #[arg(long)]
        hires_scale: Option<f64>,
    },

    /// Transform an image according to a prompt.
    Img2img {
        /// Source image.
        image: String,

        /// Prompt and sampling options.
        #[command(flatten)]
        generation: GenerationArgs,

        /// Inpainting mask image.
        #[arg(long)]
        mask: Option<String>,

        /// How much of the source to replace (0-1).
        #[arg(short, long, default_value = "0.75")]
        denoising_strength: f64,
    },

    /// Upscale one or more images.
    Upscale {
        /// Images to upscale.
        #[arg(required = true)]
        images: Vec<String>,

        /// Upscaler name.
        #[arg(short, long, default_value = "ESRGAN_4x")]
        upscaler: String,

        /// Scale factor.
        #[arg(short, long, default_value = "2")]
        scale: f64,

        /// Output file path (auto-generated if not specified).
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Print the generation parameters stored in a PNG.
    PngInfo {
        /// Image to inspect.
        image: String,
    },

    /// Caption an image.
    Interrogate {
        /// Image to caption.
        image: String,
    },

    /// List checkpoint titles.
    Models,

    /// Switch the loaded checkpoint.
    SetModel {
        /// Checkpoint title, or an approximate name.
        name: String,

        /// Require an exact title instead of picking the closest one.
        #[arg(long)]
        exact: bool,
    },

    /// Block until the server has no running or queued jobs.
    Wait {
        /// Seconds between progress checks.
        #[arg(long, default_value = "5")]
        interval: f64,

        /// Give up after this many checks.
        #[arg(long, default_value = "120")]
        max_polls: u32,
    },
}

/// Options shared by txt2img and img2img.
#[derive(Args, Debug)]
pub struct GenerationArgs {
    /// Text prompt describing the desired image.
    #[arg(conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Path to a file containing the prompt text.
    #[arg(short = 'p', long, conflicts_with = "prompt")]
    pub prompt_file: Option<String>,

    /// Negative prompt.
    #[arg(short = 'N', long)]
    pub negative: Option<String>,

    /// Sampler name (config default, then "Euler a").
    #[arg(long)]
    pub sampler: Option<String>,

    /// Sampling steps (config default, then 20).
    #[arg(long)]
    pub steps: Option<u32>,

    /// Seed; -1 picks one at random.
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    pub seed: i64,

    /// Output width.
    #[arg(short = 'W', long, default_value = "512")]
    pub width: u32,

    /// Output height.
    #[arg(short = 'H', long, default_value = "512")]
    pub height: u32,

    /// Classifier-free guidance scale.
    #[arg(long, default_value = "7")]
    pub cfg_scale: f64,

    /// Number of images to generate.
    #[arg(short = 'n', long, default_value = "1")]
    pub count: u32,

    /// Output file path (auto-generated if not specified).
    #[arg(short, long)]
    pub output: Option<String>,
}

impl GenerationArgs {
    /// Resolve the prompt from either the positional argument or the file flag.
    ///
    /// # Errors
    ///
    /// Returns an error if neither prompt nor prompt-file is provided,
    /// or if the file cannot be read.
    pub fn resolve_prompt(&self) -> Result<String, std::io::Error> {
        if let Some(ref text) = self.prompt {
            Ok(text.clone())
        } else if let Some(ref path) = self.prompt_file {
            Ok(std::fs::read_to_string(path)?.trim().to_string())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Provide a prompt string or use -p/--prompt-file",
            ))
        }
    }
}
