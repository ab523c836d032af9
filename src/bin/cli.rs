//! polychip CLI: song info, live playback, WAV rendering and register-log export.
//!
//! Usage:
//!   pc-cli info songs/demo.toml
//!   pc-cli play songs/demo.toml --loops 2
//!   pc-cli render songs/demo.toml -o demo.wav
//!   pc-cli export songs/demo.toml -o demo.pcrl

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use env_logger::Env;
use pc_master::{Config, Controller};

#[cfg(feature = "alloc_check")]
#[global_allocator]
static A: assert_no_alloc::AllocDisabler = assert_no_alloc::AllocDisabler;

#[derive(Parser)]
#[command(name = "pc-cli")]
#[command(about = "Multi-chip tracker playback")]
struct Args {
    /// Player settings (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print song structure and length
    Info {
        song: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        subsong: usize,
    },
    /// Play on the default output device
    Play {
        song: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        subsong: usize,
        /// Passes before stopping; loops forever if omitted
        #[arg(short, long)]
        loops: Option<u32>,
    },
    /// Render to a WAV file
    Render {
        song: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        subsong: usize,
        #[arg(short, long, default_value_t = 1)]
        loops: u32,
        /// Length cap in seconds
        #[arg(long, default_value_t = 300)]
        seconds: u32,
    },
    /// Write every chip register write of one pass to a log file
    Export {
        song: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        subsong: usize,
        /// Log format version, e.g. 0x171
        #[arg(long, value_parser = parse_version)]
        version: Option<u32>,
    },
}

fn parse_version(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("bad version '{s}': {e}"))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("reading config {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Info { song, subsong } => {
            let ctrl = open(config, &song)?;
            print_info(&ctrl, subsong)
        }
        Command::Play { song, subsong, loops } => {
            let config = Config { loops, ..config };
            let mut ctrl = open(config, &song)?;
            play(&mut ctrl, subsong)
        }
        Command::Render { song, output, subsong, loops, seconds } => {
            let config = Config { loops: Some(loops.max(1)), ..config };
            let ctrl = open(config, &song)?;
            render(&ctrl, subsong, &output, seconds)
        }
        Command::Export { song, output, subsong, version } => {
            let mut config = config;
            if let Some(version) = version {
                config.export_version = version;
            }
            let ctrl = open(config, &song)?;
            export(&ctrl, subsong, &output)
        }
    }
}

fn open(config: Config, song: &Path) -> anyhow::Result<Controller> {
    let mut ctrl = Controller::default();
    ctrl.set_config(config).context("invalid config")?;
    ctrl.load_song(song)
        .with_context(|| format!("loading {}", song.display()))?;
    log::debug!("{} loaded with {:?}", song.display(), ctrl.config());
    Ok(ctrl)
}

fn print_info(ctrl: &Controller, subsong: usize) -> anyhow::Result<()> {
    let song = ctrl.song();
    let Some(sub) = song.subsong(subsong) else {
        bail!("subsong {subsong} does not exist ({} available)", song.subsongs.len());
    };
    println!("Title:    {}", song.title);
    println!("Author:   {}", song.author);
    let chips: Vec<String> = song.systems.iter().map(|s| s.family.to_string()).collect();
    println!("Chips:    {}", chips.join(", "));
    println!("Channels: {}", song.channel_count());
    println!("Subsongs: {}", song.subsongs.len());
    println!("Orders:   {}", sub.orders.len());
    println!("Rows:     {} per pattern", sub.pattern_length);
    println!("Speed:    {}/{} at {} Hz", sub.speed1, sub.speed2, sub.hz);

    let walk = ctrl.walk(subsong)?;
    let seconds = walk.ticks as f64 / sub.hz;
    println!("Length:   {} rows, {} ticks ({seconds:.2} s)", walk.rows, walk.ticks);
    match walk.loop_point {
        Some(lp) => println!("Loop:     {:02X}:{:02X}", lp.order, lp.row),
        None => println!("Loop:     none (stops)"),
    }
    println!();
    print!("{}", pc_ir::analyze(sub));
    Ok(())
}

fn play(ctrl: &mut Controller, subsong: usize) -> anyhow::Result<()> {
    ctrl.play(subsong).context("starting playback")?;
    println!("Playing...");

    while ctrl.is_playing() {
        if let (Some((order, row)), Some(time)) = (ctrl.position(), ctrl.elapsed()) {
            print!("\rOrd: {order:02X} | Row: {row:02X} | {time}");
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    println!("\rDone.                              ");

    if let Some(err) = ctrl.last_error() {
        bail!("playback stopped: {err}");
    }
    Ok(())
}

fn render(ctrl: &Controller, subsong: usize, path: &Path, seconds: u32) -> anyhow::Result<()> {
    println!("Rendering to {} at {} Hz...", path.display(), ctrl.config().sample_rate);
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let frames = ctrl.render_to_wav(subsong, BufWriter::new(file), seconds)?;
    println!(
        "Rendered {frames} frames ({:.2} s)",
        frames as f64 / ctrl.config().sample_rate as f64
    );
    Ok(())
}

fn export(ctrl: &Controller, subsong: usize, path: &Path) -> anyhow::Result<()> {
    let log = ctrl.export(subsong).context("exporting register log")?;
    let bytes = log.to_bytes()?;
    std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
    println!(
        "Wrote {} writes, {} samples, {} bytes to {}",
        log.writes().count(),
        log.header.total_samples,
        bytes.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_accepts_hex_with_or_without_prefix() {
        assert_eq!(parse_version("0x171"), Ok(0x171));
        assert_eq!(parse_version("150"), Ok(0x150));
        assert!(parse_version("zz").is_err());
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["pc-cli", "export", "a.toml", "-o", "a.pcrl", "--version", "0x160"]).unwrap();
        assert!(matches!(args.command, Command::Export { version: Some(0x160), .. }));
    }
}
