// Entry point: parse the CLI, open the audio file, build every collaborator
// (AudioCache, Scheduler, Compositor, Controller, Clock, AudioPlayer,
// VideoBackend) and hand the assembled `SpettroApp` to `eframe::run_native`.
//
// Replaces the teacher's interactive PortAudio device/channel/rate picker
// (the original `main.rs`) with the spec's non-interactive, flag-driven
// spectrogram viewer; env_logger init and the `--enable-logs`-gated
// `RUST_LOG` override are carried over unchanged.

mod app;
mod audio_cache;
mod audio_player;
mod audio_source;
mod bar_markers;
mod cli;
mod clock;
mod compositor;
mod controller;
mod palette;
mod result_cache;
mod scheduler;
mod spectrum_engine;
mod video_backend;
mod view_state;
mod window_table;

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};

use app::SpettroApp;
use audio_cache::AudioCache;
use audio_player::{AudioPlayer, NullAudioPlayer, PortAudioPlayer};
use audio_source::{AudioSource, SampleFormat, WavAudioSource};
use bar_markers::BarMarkers;
use cli::Cli;
use clock::Clock;
use compositor::Compositor;
use controller::Controller;
use scheduler::Scheduler;
use spectrum_engine::SpectrumEngine;
use video_backend::EguiVideoBackend;
use view_state::ViewState;
use window_table::WindowTable;

fn main() {
    {
        let args: Vec<String> = env::args().collect();
        if !args.iter().any(|arg| arg == "--enable-logs") {
            env::set_var("RUST_LOG", "off");
        }
    }
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("spettro: fatal: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.files.len() > 1 {
        warn!(
            "spettro: {} files given, only the first ({}) is opened this session",
            cli.files.len(),
            cli.files[0].display()
        );
    }
    let path = cli.files[0].to_string_lossy().to_string();
    let source: Arc<dyn AudioSource> = Arc::new(WavAudioSource::open(&path)?);
    let sample_rate = source.sample_rate();

    let mut view = ViewState {
        disp_width: cli.width,
        disp_height: cli.height,
        crosshair_column: cli.width / 2,
        crosshair_disabled: false,
        disp_time: cli.start_time,
        min_freq: cli.min_freq,
        max_freq: cli.max_freq,
        min_y: 0,
        max_y: cli.height.saturating_sub(1) as i32,
        ppsec: cli.ppsec,
        fps: cli.fps,
        fft_freq: cli.fft_freq,
        window_function: cli.window_function(),
        dyn_range_db: cli.dyn_range_db,
        auto_brightness: cli.logmax.is_none(),
        playing: cli.autoplay,
        sample_rate,
        bar_markers: {
            let mut m = BarMarkers::new();
            if let Some(l) = cli.left_bar {
                m.set_left(l);
            }
            if let Some(r) = cli.right_bar {
                m.set_right(r);
            }
            m.beats_per_bar = cli.beats_per_bar.max(1);
            m
        },
        piano_overlay: cli.piano,
        staff_overlay: cli.staff,
        guitar_overlay: cli.guitar,
        freq_axes: cli.freq_axis,
        time_axes: cli.time_axis,
        fullscreen: false,
    };
    view.clamp();

    let last_column_time = view.time_for_column(view.disp_width as isize - 1);
    let audio_end = source.length_frames() as f64 / sample_rate;
    if view.disp_time > audio_end {
        warn!("spettro: start_time {} beyond audio length {audio_end}, clamping", view.disp_time);
        view.disp_time = (audio_end - (last_column_time - view.disp_time)).max(0.0);
    }

    let view = Arc::new(RwLock::new(view));
    let audio_cache = Arc::new(AudioCache::new(source.channels()));
    {
        let v = view.read().unwrap();
        audio_cache.reposition(&v, source.as_ref());
    }

    let windows = Arc::new(WindowTable::new());
    let engine = Arc::new(SpectrumEngine::new());
    let (result_tx, result_rx) = crossbeam_channel::unbounded();

    let scheduler = Scheduler::new(
        Arc::clone(&view),
        Arc::clone(&audio_cache),
        Arc::clone(&windows),
        Arc::clone(&engine),
        sample_rate,
        result_tx,
    );
    let worker_count = cli.max_threads.unwrap_or_else(num_cpus_fallback);
    scheduler.spawn_workers(worker_count);

    let backend = Arc::new(EguiVideoBackend::new(cli.width, cli.height));
    backend.init(cli.width, cli.height, false)?;
    let compositor = Arc::new(Compositor::new(Arc::clone(&view), Arc::clone(&scheduler), backend.clone() as Arc<dyn video_backend::VideoBackend>));
    compositor.repaint_display(false);

    let controller = Controller::new(Arc::clone(&view), Arc::clone(&scheduler), Arc::clone(&compositor));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("spettro: received interrupt, shutting down");
            shutdown.store(true, Ordering::Relaxed);
        })?;
    }

    let clock = Clock::start(cli.fps);

    let channels = source.channels();
    let player: Box<dyn AudioPlayer> = match PortAudioPlayer::new() {
        Ok(mut p) => {
            let cache_for_playback = Arc::clone(&audio_cache);
            let rate = sample_rate;
            let mut played_frames: i64 = (cli.start_time * rate) as i64;
            let fill = move |buf: &mut [i16]| -> usize {
                let frames = buf.len() / channels.max(1);
                let (frames_data, _hit) = cache_for_playback.read(played_frames, frames, SampleFormat::Native16);
                let written = match frames_data {
                    audio_source::Frames::Native16(v) => {
                        let n = v.len().min(buf.len());
                        buf[..n].copy_from_slice(&v[..n]);
                        n
                    }
                    _ => 0,
                };
                played_frames += frames as i64;
                written
            };
            match p.open(rate, channels, 1024, Box::new(fill)) {
                Ok(()) => {
                    p.pause(!cli.autoplay);
                    Box::new(p)
                }
                Err(e) => {
                    warn!("spettro: could not open audio output ({e}), running without playback");
                    Box::new(NullAudioPlayer::new())
                }
            }
        }
        Err(e) => {
            warn!("spettro: PortAudio unavailable ({e}), running without playback");
            Box::new(NullAudioPlayer::new())
        }
    };

    if let Some(out) = &cli.output {
        // `-o`: render synchronously and write a screenshot, spec §6.
        compositor.repaint_display(false);
        if let Err(e) = backend.write_png(&out.to_string_lossy()) {
            warn!("spettro: {e}");
        }
        scheduler.stop();
        return Ok(());
    }

    let app = SpettroApp::new(
        Arc::clone(&view),
        compositor,
        controller,
        backend,
        clock,
        player,
        audio_cache,
        source,
        result_rx,
        Arc::clone(&shutdown),
    );

    let native_options = eframe::NativeOptions::default();
    eframe::run_native("spettro", native_options, Box::new(|_cc| Box::new(app)))
        .map_err(|e| anyhow::anyhow!("eframe run_native failed: {e}"))?;

    scheduler.stop();
    Ok(())
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
