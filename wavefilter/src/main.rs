mod cli;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use wavefilter_core::{run_with_progress, Config, ProgressEvent};

use crate::cli::build_cli;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();

    let input_path = matches
        .get_one::<PathBuf>("file_path")
        .expect("required argument");
    if !input_path.is_file() {
        return Err(anyhow!(
            "input file does not exist: {}",
            input_path.display()
        ));
    }

    let output_dir = matches
        .get_one::<PathBuf>("output")
        .expect("defaulted argument");
    let chunk_frames = *matches
        .get_one::<usize>("chunk-frames")
        .expect("defaulted argument");
    let queue_capacity = *matches
        .get_one::<usize>("queue-capacity")
        .expect("defaulted argument");
    let left_name = matches
        .get_one::<String>("left")
        .expect("defaulted argument");
    let right_name = matches
        .get_one::<String>("right")
        .expect("defaulted argument");
    let overwrite = matches.get_flag("overwrite");

    let config = Config::builder(input_path, output_dir)
        .chunk_frames(chunk_frames)
        .queue_capacity(queue_capacity)
        .left_name(left_name.as_str())
        .right_name(right_name.as_str())
        .overwrite(overwrite)
        .build()
        .with_context(|| {
            format!(
                "failed to create configuration for '{}'",
                input_path.display()
            )
        })?;
    let left_path = config.left_path();
    let right_path = config.right_path();
    debug!("{config:?}");

    let progress = ProgressBar::new(0);
    progress.set_draw_target(ProgressDrawTarget::stderr());
    let bar_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(bar_style);

    let progress_handle = progress.clone();
    let result = run_with_progress(config, move |event| match event {
        ProgressEvent::Start { total_bytes } => {
            progress_handle.set_length(total_bytes);
            progress_handle.enable_steady_tick(Duration::from_millis(100));
        }
        ProgressEvent::Advance { bytes_read } => progress_handle.set_position(bytes_read),
        ProgressEvent::Finish => progress_handle.set_message("Completed"),
    })
    .with_context(|| format!("failed to split '{}'", input_path.display()));

    progress.finish_and_clear();

    let report = result?;
    println!(
        "Read {} samples ({} channel(s), {} Hz, {} bit) in {} chunk(s)",
        report.samples_read,
        report.format.channels,
        report.format.sample_rate,
        report.format.bit_depth,
        report.chunks_split
    );
    println!(
        "  {} ({})",
        left_path.display(),
        HumanBytes(report.left_bytes)
    );
    println!(
        "  {} ({})",
        right_path.display(),
        HumanBytes(report.right_bytes)
    );

    Ok(())
}
