use clap::Parser;
use log::{debug, info, trace, warn};
use std::path::PathBuf;
use vsrg::config;
use vsrg::core::audio::SoftwareDevice;
use vsrg::core::gfx::QuadCounter;
use vsrg::game::chart::ChartLoaderRegistry;
use vsrg::game::conductor::{Conductor, ConductorEvent};
use vsrg::game::playfield::{Playfield, PlayfieldLayout};
use vsrg::game::scroll::ScrollSpeedSetting;

// Audio keeps playing this long past the last note.
const TRAILING_SILENCE_SECONDS: f32 = 2.0;

/// Plays a chart headlessly against a software audio clock.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chart to play (.osu or .json)
    #[arg(value_name = "CHART")]
    chart: PathBuf,

    /// Config file to use instead of ./vsrg.ini
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Music rate, overrides MusicRate
    #[arg(short, long)]
    rate: Option<f32>,

    /// Scroll speed such as C600 or 1.5x, overrides ScrollSpeed
    #[arg(short, long, value_name = "SPEC", value_parser = parse_speed)]
    speed: Option<ScrollSpeedSetting>,

    /// Start playback at this song position
    #[arg(long, value_name = "SECONDS")]
    seek: Option<f32>,

    /// Stop after this much simulated time
    #[arg(long, value_name = "N")]
    seconds: Option<f32>,

    /// Print a conductor snapshot as JSON once per second
    #[arg(long)]
    json: bool,
}

fn parse_speed(s: &str) -> Result<ScrollSpeedSetting, String> {
    s.parse()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    // Startup default when config is missing or malformed.
    log::set_max_level(log::LevelFilter::Warn);

    config::load(args.config.as_deref());
    config::update(|cfg| {
        if let Some(rate) = args.rate {
            cfg.music_rate = rate;
        }
        if let Some(speed) = args.speed {
            cfg.scroll_speed = speed;
        }
    });
    let cfg = config::get();
    log::set_max_level(cfg.log_level.as_level_filter());

    let chart = ChartLoaderRegistry::with_default_loaders().load_chart(&args.chart)?;

    let device = SoftwareDevice::new(cfg.audio_sample_rate_hz, cfg.audio_period_frames);
    let track = device.open_stream(chart.last_note_time() + TRAILING_SILENCE_SECONDS);
    let mut conductor = Conductor::new(&device, Some(track), chart.timeline());
    conductor.set_playback_rate(cfg.music_rate);

    let initial_speed = match cfg.scroll_speed {
        ScrollSpeedSetting::CMod(c_bpm) => c_bpm,
        ScrollSpeedSetting::XMod(_) => 1600.0,
    };
    let mut playfield = Playfield::new(
        Some(&chart),
        &conductor,
        chart.metadata.key_count,
        PlayfieldLayout::from_config(&cfg),
        initial_speed,
    );
    if let ScrollSpeedSetting::XMod(_) = cfg.scroll_speed {
        playfield.scroll_mut().set_setting(cfg.scroll_speed);
    }

    if let Some(position) = args.seek {
        conductor.seek(position);
    }
    conductor.play();

    let frame_dt = cfg.frame_time();
    let time_limit = args.seconds.unwrap_or(f32::INFINITY);
    let mut renderer = QuadCounter::default();
    let mut elapsed = 0.0_f32;
    let mut log_timer = 0.0_f32;

    info!(
        "Playing at {}x rate, {} ({} fps)",
        conductor.playback_rate(),
        playfield.scroll().setting(),
        cfg.frame_rate
    );
    match conductor.timeline().bpm_range() {
        Some((lo, hi)) => info!("Tempo range {lo:.2}-{hi:.2} BPM"),
        None => warn!("Chart has no usable tempo points"),
    }

    loop {
        if let Some(track) = conductor.audio_mut() {
            track.advance(frame_dt);
        }
        conductor.update(frame_dt);

        for event in conductor.drain_events() {
            match event {
                ConductorEvent::TempoChanged { index, bpm } => {
                    info!("Tempo segment {index}: {bpm:.2} BPM")
                }
                ConductorEvent::Beat(beat) => debug!("Beat {beat}"),
                ConductorEvent::Step(step) => trace!("Step {step}"),
            }
        }

        playfield.update(&conductor, frame_dt);
        playfield.render(&mut renderer);

        elapsed += frame_dt;
        log_timer += frame_dt;
        if log_timer >= 1.0 {
            log_timer -= 1.0;
            info!(
                "Beat: {}, Step: {}, Time: {:.2}, BPM: {:.2}, Active notes: {}, Quads: {}",
                conductor.beat(),
                conductor.step(),
                conductor.song_position(),
                conductor.bpm(),
                playfield.active_notes(),
                renderer.frame_quads
            );
            if args.json {
                println!("{}", serde_json::to_string(&conductor.snapshot())?);
            }
        }

        if !conductor.is_playing() || elapsed >= time_limit {
            break;
        }
    }

    info!(
        "Finished at {:.2}s of {:.2}s, {} quads submitted.",
        conductor.song_position(),
        conductor.song_duration(),
        renderer.total_quads
    );
    Ok(())
}
