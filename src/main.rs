//! starrysky - stable-diffusion-webui CLI.

mod cli;
mod output;

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::Parser;
use starrysky::config::{discover_config_path, Config};
use starrysky::context::ServiceContext;
use starrysky::params::validate_unit_interval;
use starrysky::{
    Client, ClientError, ExtraBatchImagesRequest, ExtraSingleImageRequest, ExtrasOptions,
    GenerationOptions, GenerationResult, Img2ImgRequest, PngImage, ResultInfo, Txt2ImgRequest,
};

use crate::cli::{Cli, Command, GenerationArgs};
use crate::output::{resolve_output_path, save_images};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// A command with all local inputs read and validated.
enum Task {
    Generate { prepared: Generation, output: PathBuf },
    Upscale { images: Vec<PngImage>, names: Vec<String>, options: ExtrasOptions, output: Option<PathBuf> },
    PngInfo(PngImage),
    Interrogate(PngImage),
    Models,
    SetModel { name: String, find_closest: bool },
    Wait { interval: Duration, max_polls: u32 },
}

enum Generation {
    Txt2Img(Box<Txt2ImgRequest>),
    Img2Img(Box<Img2ImgRequest>),
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    let config_path = discover_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;
    log::debug!("config: {}", config_path.display());

    // Everything local is checked before any request goes out.
    let task = plan(cli.command)?;
    let client_config = config.client_config()?;

    let (ctx, recording_session) = ServiceContext::from_env(&client_config)?;
    let client = Client::connect_with_transport(&client_config, ctx.transport).await?;

    let outcome = execute(&client, task).await;
    drop(client);

    if let Some(session) = recording_session {
        match session.finish() {
            Ok(path) => eprintln!("Cassette saved: {}", path.display()),
            Err(e) => eprintln!("Warning: failed to save cassette: {e}"),
        }
    }

    outcome
}

fn plan(command: Command) -> Result<Task, ClientError> {
    let task = match command {
        Command::Txt2img { generation, hires_scale } => {
            let prompt = generation.resolve_prompt()?;
            let mut request = apply_generation(Txt2ImgRequest::new(&prompt), &generation);
            if let Some(scale) = hires_scale {
                request = request.hires_fix(starrysky::HiResUpscaler::Latent, scale);
            }
            Task::Generate {
                prepared: Generation::Txt2Img(Box::new(request)),
                output: resolve_output_path(generation.output.as_deref(), &prompt),
            }
        }
        Command::Img2img { image, generation, mask, denoising_strength } => {
            validate_unit_interval("denoising_strength", denoising_strength)
                .map_err(ClientError::Validation)?;
            let prompt = generation.resolve_prompt()?;
            let mut request = apply_generation(
                Img2ImgRequest::new(&prompt, vec![PngImage::open(&image)?]),
                &generation,
            )
            .denoising_strength(denoising_strength);
            if let Some(mask) = mask {
                request = request.mask(PngImage::open(&mask)?);
            }
            Task::Generate {
                prepared: Generation::Img2Img(Box::new(request)),
                output: resolve_output_path(generation.output.as_deref(), &prompt),
            }
        }
        Command::Upscale { images, upscaler, scale, output } => {
            if scale <= 0.0 {
                return Err(ClientError::Validation(format!("scale must be positive, got {scale}")));
            }
            let names = images.iter().map(|p| file_stem(p)).collect();
            let images = images.iter().map(PngImage::open).collect::<Result<Vec<_>, _>>()?;
            Task::Upscale {
                images,
                names,
                options: ExtrasOptions::default().upscaler(upscaler).scale(scale),
                output: output.map(PathBuf::from),
            }
        }
        Command::PngInfo { image } => Task::PngInfo(PngImage::open(&image)?),
        Command::Interrogate { image } => Task::Interrogate(PngImage::open(&image)?),
        Command::Models => Task::Models,
        Command::SetModel { name, exact } => Task::SetModel { name, find_closest: !exact },
        Command::Wait { interval, max_polls } => {
            let interval = Duration::try_from_secs_f64(interval)
                .map_err(|e| ClientError::Validation(format!("invalid interval: {e}")))?;
            Task::Wait { interval, max_polls }
        }
    };
    Ok(task)
}

fn apply_generation<R: GenerationOptions>(request: R, args: &GenerationArgs) -> R {
    let mut request = request
        .seed(args.seed)
        .size(args.width, args.height)
        .cfg_scale(args.cfg_scale)
        .batch_size(args.count);
    if let Some(negative) = &args.negative {
        request = request.negative_prompt(negative.clone());
    }
    if let Some(sampler) = &args.sampler {
        request = request.sampler(sampler.clone());
    }
    if let Some(steps) = args.steps {
        request = request.steps(steps);
    }
    request
}

async fn execute(client: &Client, task: Task) -> Result<(), ClientError> {
    match task {
        Task::Generate { prepared, output } => {
            let result = match prepared {
                Generation::Txt2Img(request) => client.txt2img(&request).await?,
                Generation::Img2Img(request) => client.img2img(&request).await?,
            };
            save_result(&result, &output)?;
        }
        Task::Upscale { images, names, options, output } => {
            let result = match <[PngImage; 1]>::try_from(images) {
                Ok([image]) => {
                    let request = ExtraSingleImageRequest::new(image).options(options);
                    client.extra_single_image(&request).await?
                }
                Err(images) => {
                    let request =
                        ExtraBatchImagesRequest::new(images).names(names.clone()).options(options);
                    client.extra_batch_images(&request).await?
                }
            };
            let base = output.unwrap_or_else(|| {
                let stem = names.first().map_or("image", String::as_str);
                PathBuf::from(format!("{stem}-upscaled.png"))
            });
            save_result(&result, &base)?;
        }
        Task::PngInfo(image) => print_info(client.png_info(&image).await?.info()),
        Task::Interrogate(image) => print_info(client.interrogate(&image).await?.info()),
        Task::Models => {
            for title in client.model_names().await? {
                println!("{title}");
            }
        }
        Task::SetModel { name, find_closest } => match client.set_model(&name, find_closest).await? {
            Some(found) => println!("Model changed to {found}"),
            None => return Err(ClientError::Validation(format!("No model matching {name:?}"))),
        },
        Task::Wait { interval, max_polls } => {
            client.wait_until_idle(interval, max_polls).await?;
            eprintln!("Server is idle");
        }
    }
    Ok(())
}

fn save_result(result: &GenerationResult, base: &Path) -> Result<(), ClientError> {
    if result.images().is_empty() {
        return Err(ClientError::InvalidResponse("response contained no images".into()));
    }
    for path in save_images(result.images(), base)? {
        eprintln!("Saved: {}", path.display());
    }
    Ok(())
}

fn print_info(info: &ResultInfo) {
    match info {
        ResultInfo::Empty => {}
        ResultInfo::Text(text) => println!("{text}"),
        ResultInfo::Json(value) => println!("{value:#}"),
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned())
}
