//! flipnote-cli - Command-line interface for the flipnote crate
//!
//! A command-line tool for inspecting Flipnote Studio PPM and KWZ files and
//! dumping their frames and audio as raw data.

use clap::{Parser, Subcommand, ValueEnum};
use flipnote::audio::pcm_to_le_bytes;
use flipnote::{AudioTrack, AuthorInfo, Flipnote, FlipnoteDecoder};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "flipnote-cli")]
#[command(about = "A CLI tool for inspecting and extracting Flipnote Studio animations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metadata of a PPM or KWZ file
    Info {
        /// Note to analyze
        input: PathBuf,
    },

    /// Dump every composited frame as raw pixel data
    Frames {
        /// Note to decode
        input: PathBuf,

        /// Directory receiving one file per frame
        output_dir: PathBuf,

        /// Write 0xRRGGBBAA pixels instead of palette indices
        #[arg(long)]
        rgba: bool,
    },

    /// Dump one audio track or the full mix as raw s16le PCM
    Audio {
        /// Note to decode
        input: PathBuf,

        /// Output PCM file
        output: PathBuf,

        /// Track to extract
        #[arg(short, long, value_enum, default_value_t = CliTrack::Master)]
        track: CliTrack,

        /// Output sample rate (defaults to the format's native output rate)
        #[arg(short, long)]
        rate: Option<u32>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CliTrack {
    /// Background music
    Bgm,
    /// Sound effect 1
    Se1,
    /// Sound effect 2
    Se2,
    /// Sound effect 3
    Se3,
    /// Sound effect 4 (KWZ only)
    Se4,
    /// BGM and sound effects mixed over the whole animation
    Master,
}

impl CliTrack {
    fn track(self) -> Option<AudioTrack> {
        match self {
            CliTrack::Bgm => Some(AudioTrack::Bgm),
            CliTrack::Se1 => Some(AudioTrack::Se1),
            CliTrack::Se2 => Some(AudioTrack::Se2),
            CliTrack::Se3 => Some(AudioTrack::Se3),
            CliTrack::Se4 => Some(AudioTrack::Se4),
            CliTrack::Master => None,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("Warning: could not install logger: {}", e);
    }

    let result = match cli.command {
        Commands::Info { input } => show_file_info(&input, cli.verbose),
        Commands::Frames {
            input,
            output_dir,
            rgba,
        } => dump_frames(&input, &output_dir, rgba, cli.verbose, cli.quiet),
        Commands::Audio {
            input,
            output,
            track,
            rate,
        } => dump_audio(&input, &output, track, rate, cli.verbose, cli.quiet),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn open_note(input: &Path) -> Result<Flipnote, Box<dyn std::error::Error>> {
    if !input.exists() {
        return Err(format!("Input file '{}' does not exist", input.display()).into());
    }
    Ok(Flipnote::open(input)?)
}

fn format_author(author: &AuthorInfo) -> String {
    let mut line = format!("{} ({})", author.username, author.fsid);
    if let Some(region) = author.region {
        line.push_str(&format!(" [{:?}]", region));
    }
    line
}

fn show_file_info(input: &Path, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let note = open_note(input)?;
    let meta = note.meta();
    let layout = note.image_layout();

    println!("Flipnote File Information:");
    println!("  File: {}", input.display());
    println!("  Format: {}", note.format());
    println!("  Frames: {}", note.frame_count());
    println!(
        "  Speed: {} ({} fps)",
        note.frame_speed(),
        note.framerate()
    );
    println!("  Duration: {:.2}s", note.duration());
    println!("  Size: {}x{}", layout.width, layout.height);
    println!("  Thumbnail frame: {}", note.thumb_frame_index());
    println!("  Locked: {}, Loop: {}", meta.lock, meta.is_loop);
    println!("  Current author: {}", format_author(&meta.current));
    println!("  Parent author:  {}", format_author(&meta.parent));
    println!("  Root author:    {}", format_author(&meta.root));

    let tracks: Vec<String> = AudioTrack::ALL
        .into_iter()
        .filter(|&track| note.has_audio_track(track))
        .map(|track| track.to_string())
        .collect();
    if tracks.is_empty() {
        println!("  Audio: none");
    } else {
        println!("  Audio: {}", tracks.join(", "));
    }

    if verbose {
        println!("  Modified (unix): {}", meta.unix_timestamp());
        if let Some(filename) = &meta.current.filename {
            println!("  Filename: {}", filename);
        }
        for (track, info) in AudioTrack::ALL.iter().zip(note.sound_meta()) {
            println!(
                "  {} data: {} bytes at {:#x}",
                track, info.length, info.offset
            );
        }
        println!("  Body: {} bytes", note.body()?.len());
    }

    Ok(())
}

fn dump_frames(
    input: &Path,
    output_dir: &Path,
    rgba: bool,
    verbose: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut note = open_note(input)?;
    fs::create_dir_all(output_dir)?;

    let frame_count = note.frame_count();
    let layout = note.image_layout();
    if verbose {
        println!(
            "Decoding {} frames of {}x{} from '{}'",
            frame_count,
            layout.width,
            layout.height,
            input.display()
        );
    }

    let start_time = Instant::now();

    let progress = if !quiet {
        let pb = ProgressBar::new(frame_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
                )?
                .progress_chars("#>-"),
        );
        pb.set_message("Decoding frames...");
        Some(pb)
    } else {
        None
    };

    let extension = if rgba { "rgba" } else { "idx" };
    let mut total_bytes = 0;
    for index in 0..frame_count {
        let data: Vec<u8> = if rgba {
            note.frame_pixels_rgba(index)?
                .into_iter()
                .flat_map(u32::to_be_bytes)
                .collect()
        } else {
            note.frame_pixels(index)?
        };
        total_bytes += data.len();
        fs::write(
            output_dir.join(format!("frame_{:04}.{}", index, extension)),
            &data,
        )?;

        if let Some(ref pb) = progress {
            pb.inc(1);
        }
    }

    if let Some(ref pb) = progress {
        pb.finish_with_message("Frames complete");
    }

    if !quiet {
        println!("✓ Frame dump successful!");
        println!("  Frames: {}", frame_count);
        println!("  Output: {} bytes", total_bytes);
        println!("  Time:   {:.2?}", start_time.elapsed());
    }

    Ok(())
}

fn dump_audio(
    input: &Path,
    output: &Path,
    track: CliTrack,
    rate: Option<u32>,
    verbose: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let note = open_note(input)?;
    let rate = rate.unwrap_or_else(|| note.sample_rate());
    if rate == 0 {
        return Err("Sample rate must be positive".into());
    }

    let start_time = Instant::now();
    let pcm = match track.track() {
        Some(track) => {
            if !note.has_audio_track(track) {
                return Err(format!("Note has no {} track", track).into());
            }
            note.audio_track_pcm(track, rate)?
        }
        None => note.audio_master_pcm(rate)?,
    };

    if verbose {
        println!(
            "Writing {} samples at {} Hz to '{}'",
            pcm.len(),
            rate,
            output.display()
        );
    }

    fs::write(output, pcm_to_le_bytes(&pcm))?;

    if !quiet {
        println!("✓ Audio dump successful!");
        println!("  Samples: {}", pcm.len());
        println!("  Length:  {:.2}s", pcm.len() as f64 / rate as f64);
        println!("  Time:    {:.2?}", start_time.elapsed());
    }

    Ok(())
}
