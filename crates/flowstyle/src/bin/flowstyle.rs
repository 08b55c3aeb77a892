use std::path::PathBuf;

use argh::FromArgs;
use flowstyle::{
    image::Image,
    io::{
        frames::{list_frame_paths, output_frame_path},
        functional::read_image_rgb8,
        png::{write_image_png_gray8, write_image_png_rgb8},
    },
    stylize::{frame::to_rgb8, FrameOptimizer, SequenceOrchestrator, StylizeConfig, VggExtractor},
};

/// Stylize a directory of video frames with a temporally consistent style
#[derive(FromArgs)]
struct Args {
    /// directory holding the decoded frames, numbered in playback order
    #[argh(positional)]
    frames: PathBuf,

    /// path to the style image
    #[argh(option, short = 's')]
    style: PathBuf,

    /// directory receiving the stylized frames
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// path to the VGG19 weights in safetensors format
    #[argh(option, short = 'w')]
    weights: PathBuf,

    /// optional JSON configuration, missing fields take their default
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// longest side of the working resolution, overrides the configuration
    #[argh(option, short = 'm')]
    max_size: Option<usize>,

    /// also write the occlusion mask of every transition
    #[argh(switch)]
    save_masks: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => StylizeConfig::from_json_file(path)?,
        None => StylizeConfig::default(),
    };
    if let Some(max_size) = args.max_size {
        config.max_image_size = Some(max_size);
    }

    let frame_paths = list_frame_paths(&args.frames)?;
    if frame_paths.is_empty() {
        return Err(format!("no frames found in {}", args.frames.display()).into());
    }

    std::fs::create_dir_all(&args.output)?;
    let mask_dir = args.output.join("masks");
    if args.save_masks {
        std::fs::create_dir_all(&mask_dir)?;
    }

    let style = read_image_rgb8(&args.style)?;

    let extractor = VggExtractor::vgg19(
        &args.weights,
        config.content_layers.clone(),
        config.style_layers.clone(),
    )?;
    let optimizer = FrameOptimizer::with_adam(extractor, &style, config)?;
    let mut sequence = SequenceOrchestrator::new(optimizer);

    log::info!(
        "stylizing {} frames from {}",
        frame_paths.len(),
        args.frames.display()
    );

    for (index, path) in frame_paths.iter().enumerate() {
        let frame = read_image_rgb8(path)?;
        let stylized = sequence.push_frame(&frame)?;

        let output_path = output_frame_path(&args.output, index);
        write_image_png_rgb8(&output_path, &to_rgb8(&stylized)?)?;
        log::info!("wrote {}", output_path.display());

        if args.save_masks {
            if let Some(mask) = sequence.optimizer().occlusion_mask() {
                let data = mask.as_image().as_slice().iter().map(|&v| v * 255).collect();
                let mask = Image::<u8, 1>::new(mask.size(), data)?;
                write_image_png_gray8(output_frame_path(&mask_dir, index), &mask)?;
            }
        }
    }

    sequence.finish();

    Ok(())
}
