//! Top-level wiring (spec §5 thread model): spawns the worker pool and the
//! Clock, owns the `eframe::App` that drains results onto the Compositor,
//! services the Clock's coalesced scroll tick, and maps key/mouse input to
//! `Controller` calls (spec §4.7, §6 key/mouse surface).
//!
//! Generalizes the teacher's `MyApp` (`plot.rs`) from a slider-driven bar
//! chart into a key/mouse-driven pixel-framebuffer viewer: the 100ms
//! `request_repaint_after` polling idiom survives, repurposed to drain the
//! result channel and service the Clock every frame instead of refreshing
//! plot data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use eframe::egui;
use log::info;

use crate::audio_cache::AudioCache;
use crate::audio_player::AudioPlayer;
use crate::audio_source::AudioSource;
use crate::clock::Clock;
use crate::compositor::Compositor;
use crate::controller::Controller;
use crate::result_cache::CalcResult;
use crate::video_backend::EguiVideoBackend;
use crate::view_state::ViewState;

/// The egui/eframe shell (spec §9: "Abstract as traits/interfaces:
/// AudioPlayer, VideoBackend, Timer, EventLoop" -- `eframe::App` plays the
/// role of EventLoop here).
pub struct SpettroApp {
    view: Arc<std::sync::RwLock<ViewState>>,
    compositor: Arc<Compositor>,
    controller: Controller,
    backend: Arc<EguiVideoBackend>,
    clock: Clock,
    player: Box<dyn AudioPlayer>,
    audio_cache: Arc<AudioCache>,
    audio_source: Arc<dyn AudioSource>,
    results_rx: Receiver<CalcResult>,
    shutdown: Arc<AtomicBool>,
    texture: Option<egui::TextureHandle>,
}

impl SpettroApp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        view: Arc<std::sync::RwLock<ViewState>>,
        compositor: Arc<Compositor>,
        controller: Controller,
        backend: Arc<EguiVideoBackend>,
        clock: Clock,
        player: Box<dyn AudioPlayer>,
        audio_cache: Arc<AudioCache>,
        audio_source: Arc<dyn AudioSource>,
        results_rx: Receiver<CalcResult>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            view,
            compositor,
            controller,
            backend,
            clock,
            player,
            audio_cache,
            audio_source,
            results_rx,
            shutdown,
            texture: None,
        }
    }

    fn drain_results(&self) {
        while let Ok(result) = self.results_rx.try_recv() {
            self.compositor.accept_result(result);
        }
    }

    fn service_clock(&self) {
        if self.clock.take_pending() {
            self.compositor.do_scroll(self.player.get_time());
            let view = self.view.read().unwrap().clone();
            self.audio_cache.reposition(&view, self.audio_source.as_ref());
        }
    }

    fn handle_input(&self, ctx: &egui::Context) {
        ctx.input(|i| {
            for event in &i.events {
                match event {
                    egui::Event::Key { key, pressed: true, modifiers, .. } => {
                        self.handle_key(*key, modifiers.shift);
                    }
                    // `+`/`-`/`x`/`X`/`y`/`Y` are punctuation/shifted-letter
                    // characters: egui reports them as text, not as a
                    // dedicated `Key` variant, in this egui version.
                    egui::Event::Text(text) => {
                        for ch in text.chars() {
                            self.handle_char(ch);
                        }
                    }
                    _ => {}
                }
            }
        });
    }

    fn handle_key(&self, key: egui::Key, shift: bool) {
        match key {
            egui::Key::Space => {
                let playing = !self.view.read().unwrap().playing;
                self.player.pause(!playing);
                self.controller.set_playing(playing);
            }
            egui::Key::ArrowLeft => self.controller.pan_time(if shift { -1.0 } else { -0.1 }),
            egui::Key::ArrowRight => self.controller.pan_time(if shift { 1.0 } else { 0.1 }),
            egui::Key::ArrowUp => self.controller.pan_freq(0.1),
            egui::Key::ArrowDown => self.controller.pan_freq(-0.1),
            egui::Key::K => self.controller.toggle_piano_overlay(),
            egui::Key::S => self.controller.toggle_staff_overlay(),
            egui::Key::G => self.controller.toggle_guitar_overlay(),
            egui::Key::A => self.controller.toggle_freq_axes(),
            egui::Key::F11 => self.controller.toggle_fullscreen(),
            egui::Key::Q | egui::Key::Escape => {
                info!("app: quit requested via keyboard");
                self.controller.quit();
                self.shutdown.store(true, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn handle_char(&self, ch: char) {
        match ch {
            '+' => {
                self.controller.zoom_time(2.0);
                self.controller.zoom_freq(2.0);
            }
            '-' => {
                self.controller.zoom_time(0.5);
                self.controller.zoom_freq(0.5);
            }
            'x' => self.controller.zoom_time(2.0),
            'X' => self.controller.zoom_time(0.5),
            'y' => self.controller.zoom_freq(2.0),
            'Y' => self.controller.zoom_freq(0.5),
            _ => {}
        }
    }
}

impl eframe::App for SpettroApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.drain_results();
        self.service_clock();
        self.handle_input(ctx);

        let (w, h, rgba) = self.backend.snapshot_rgba();
        let image = egui::ColorImage::from_rgba_unmultiplied([w, h], &rgba);
        match &mut self.texture {
            Some(tex) => tex.set(image, egui::TextureOptions::NEAREST),
            None => self.texture = Some(ctx.load_texture("spectrogram", image, egui::TextureOptions::NEAREST)),
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(tex) = &self.texture {
                ui.image((tex.id(), tex.size_vec2()));
            }
        });

        if self.shutdown.load(Ordering::Relaxed) {
            frame.close();
        }
        ctx.request_repaint_after(Duration::from_millis(16));
    }

    fn on_close_event(&mut self) -> bool {
        info!("app: window close requested");
        self.controller.quit();
        self.shutdown.store(true, Ordering::Relaxed);
        true
    }
}
