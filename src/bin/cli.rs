use anyhow::{anyhow, bail, Context, Result};
use crabdvr::avi;
use crabdvr::collaborators::ChannelNotifier;
use crabdvr::playback::PlaybackControl;
use crabdvr::signal::{PacingToken, TickNotify, MAX_TICK_BACKLOG};
use crabdvr::testing::ScriptedSource;
use crabdvr::timing::FrameClock;
use crabdvr::{Collaborators, Dvr, DvrConfig, FsStorage, PlaybackEngine, Storage};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    crabdvr::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: crabdvr-cli <record|play|inspect> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "record" => cmd_record(&args),
        "play" => cmd_play(&args),
        "inspect" => cmd_inspect(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

/// Value following `flag`, if present
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First argument after the command that is neither a flag nor a flag value
fn positional(args: &[String]) -> Option<&str> {
    let mut i = 2;
    while i < args.len() {
        if args[i].starts_with("--") {
            i += if args[i] == "--json" { 1 } else { 2 };
            continue;
        }
        return Some(&args[i]);
    }
    None
}

fn load_config(args: &[String]) -> Result<DvrConfig> {
    let mut config = match flag_value(args, "--config") {
        Some(path) => DvrConfig::load_from_file(path)?,
        None => DvrConfig::load_or_default(),
    };
    if let Some(root) = flag_value(args, "--root") {
        config.storage.root = root.to_string();
    }
    Ok(config)
}

fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("Failed to install Ctrl-C handler")?;
    Ok(stop)
}

fn cmd_record(args: &[String]) -> Result<()> {
    // record [--seconds <n>] [--min-seconds <n>] [--frame-len <bytes>] [--timelapse] [--root <dir>] [--config <file>]
    let mut config = load_config(args)?;
    let seconds: u64 = flag_value(args, "--seconds").unwrap_or("10").parse()?;
    if let Some(min) = flag_value(args, "--min-seconds") {
        config.recording.min_seconds = min.parse()?;
    }
    if args.iter().any(|a| a == "--timelapse") {
        config.timelapse.enabled = true;
    }
    let frame_len: usize = match flag_value(args, "--frame-len") {
        Some(len) => len.parse()?,
        None => (config.max_frame_bytes() / 4).max(1024),
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let collaborators = Collaborators::new(Arc::new(ScriptedSource::new(frame_len)))
        .with_notifier(Arc::new(ChannelNotifier::new(tx)));
    let dvr = Dvr::start(config, collaborators)?;

    let stop = interrupt_flag()?;
    dvr.force_record(true);
    println!("Recording synthetic frames for {}s, Ctrl-C to stop early", seconds);

    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(seconds) && !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    let stats = dvr.shutdown();
    for path in rx.try_iter() {
        println!("Saved {}", path);
    }
    if let Some(stats) = stats {
        println!(
            "{} frames captured, {} dropped, {} clips saved, {} discarded",
            stats.frames, stats.dropped, stats.clips_saved, stats.clips_discarded
        );
    }
    Ok(())
}

fn cmd_play(args: &[String]) -> Result<()> {
    // play <clip> [--out <dir>] [--fps <n>] [--root <dir>] [--config <file>]
    let config = load_config(args)?;
    let clip = positional(args).ok_or_else(|| anyhow!("clip path required"))?;
    let out = flag_value(args, "--out").map(PathBuf::from);
    let fps = match flag_value(args, "--fps") {
        Some(fps) => Some(fps.parse::<u32>()?),
        None => config.playback.fps_override,
    };

    let storage = Arc::new(FsStorage::new(&config.storage.root)?);
    let pacing = Arc::new(PacingToken::new());
    let clock = Arc::new(FrameClock::new(
        Arc::new(TickNotify::new(MAX_TICK_BACKLOG)),
        pacing.clone(),
    ));
    let control = Arc::new(PlaybackControl::new(clock, pacing));
    let mut engine = PlaybackEngine::new(storage, control.clone(), config.storage.ram_size, fps)?;

    let stop = interrupt_flag()?;
    let watcher = {
        let control = control.clone();
        let stop = stop.clone();
        std::thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            control.stop_playing(Duration::from_millis(500));
        })
    };

    if let Some(dir) = &out {
        std::fs::create_dir_all(dir)?;
    }
    engine.open(clip)?;
    let mut frames = 0u64;
    while let Some(frame) = engine.next_frame() {
        frames += 1;
        if let Some(dir) = &out {
            std::fs::write(dir.join(format!("frame_{:05}.jpg", frames)), &frame)?;
        }
    }

    if let Some(stats) = engine.last_stats() {
        println!(
            "{} frames, {:.1} fps, read {} kB/s{}",
            stats.frames,
            stats.achieved_fps(),
            stats.read_kbps(),
            if stats.completed { "" } else { " (stopped)" }
        );
    }
    stop.store(true, Ordering::SeqCst);
    let _ = watcher.join();
    Ok(())
}

fn cmd_inspect(args: &[String]) -> Result<()> {
    // inspect <clip> [--json] [--root <dir>]
    let config = load_config(args)?;
    let clip = positional(args).ok_or_else(|| anyhow!("clip path required"))?;
    let storage = FsStorage::new(&config.storage.root)?;
    if !storage.exists(clip) {
        bail!("{} not found under {}", clip, config.storage.root);
    }
    let mut file = storage.open(clip)?;
    let summary = avi::inspect(&mut *file, clip)?;

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string(&summary)?);
        return Ok(());
    }

    let header = &summary.header;
    println!("{}", summary.path);
    if let Some(name) = &summary.name {
        println!(
            "  started {} size {} fps {} duration {}{}",
            name.started,
            name.frame_size,
            name.fps,
            name.duration,
            if name.is_time_lapse() { " min (time lapse)" } else { " s" }
        );
    }
    println!(
        "  {}x{} at {} fps, {} frames in header",
        header.width, header.height, header.fps, header.frame_count
    );
    println!(
        "  {} indexed frames, {} video bytes, {} audio bytes",
        summary.video_frames(),
        summary.video_bytes(),
        summary.audio_bytes()
    );
    Ok(())
}
