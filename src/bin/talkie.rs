use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "talkie", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a narrated MP4 (requires `ffmpeg` and `ffprobe` on PATH).
    Export(ExportArgs),
    /// Probe a video clip and print its source info as JSON.
    Probe(ProbeArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Segment list JSON (array of segments).
    #[arg(long)]
    segments: PathBuf,

    /// Narration audio (http(s) URL or file path).
    #[arg(long)]
    audio: String,

    /// Output aspect ratio.
    #[arg(long, default_value = "16:9")]
    aspect: talkie::AspectRatio,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Subtitle font file (system sans-serif stack when omitted).
    #[arg(long)]
    font: Option<PathBuf>,

    /// Suppress per-milestone progress output.
    #[arg(long)]
    quiet: bool,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Video file to probe.
    #[arg(long)]
    media: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn read_segments_json(path: &Path) -> anyhow::Result<Vec<talkie::Segment>> {
    let f = File::open(path).with_context(|| format!("open segments '{}'", path.display()))?;
    let r = BufReader::new(f);
    let segments: Vec<talkie::Segment> =
        serde_json::from_reader(r).with_context(|| "parse segments JSON")?;
    Ok(segments)
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let segments = read_segments_json(&args.segments)?;

    let opts = talkie::ExportOpts {
        font_path: args.font,
    };

    let quiet = args.quiet;
    let mut on_progress = move |message: &str, percent: f64| {
        if !quiet {
            eprintln!("{percent:>5.1}%  {message}");
        }
    };

    let buffer = talkie::export(
        &segments,
        &args.audio,
        args.aspect,
        &opts,
        &mut on_progress,
    )?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &buffer)
        .with_context(|| format!("write mp4 '{}'", args.out.display()))?;

    eprintln!("wrote {} ({} bytes)", args.out.display(), buffer.len());
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let info = talkie::probe_video(&args.media)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
