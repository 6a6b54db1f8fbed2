//! The render loop.
//!
//! [`MatrixRainApp`] is the `eframe::App` for the single rain window. Every
//! frame it measures elapsed time, applies keyboard input to the fall speed,
//! drains the spawn queue into the animation field, advances and paints the
//! rain, then evicts everything that fell off screen. All animation state is
//! owned here; the MQTT side only ever hands over [`SpawnRequest`]s.
//!
//! Keyboard: `+`/`=` speed up, `-` slow down, `c` clears the screen, window
//! close shuts the application down.

use std::time::{Duration, Instant};

use eframe::egui::{self, Align2, Color32, FontFamily, FontId, Frame, Key};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScreensaverSection;
use crate::rain::{FallSpeed, RainField, SpawnRequest};

/// Repaint interval, caps the loop at roughly 60 Hz.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

pub struct MatrixRainApp {
    spawn_rx: mpsc::Receiver<SpawnRequest>,
    field: RainField,
    speed: FallSpeed,
    background: Color32,
    font_id: FontId,
    font_size: f32,
    min_alpha: u8,
    shutdown: CancellationToken,
    last_tick: Instant,
    rng: rand::rngs::ThreadRng,
    listener_gone: bool,
}

impl MatrixRainApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        screensaver: &ScreensaverSection,
        spawn_rx: mpsc::Receiver<SpawnRequest>,
        shutdown: CancellationToken,
    ) -> Self {
        cc.egui_ctx.set_theme(egui::Theme::Dark);

        let font_size = screensaver.font_size as f32;
        let bg = screensaver.background_color;

        MatrixRainApp {
            spawn_rx,
            field: RainField::new(
                screensaver.width as f32,
                screensaver.height as f32,
                font_size,
            ),
            speed: FallSpeed::default(),
            background: Color32::from_rgb(bg.0, bg.1, bg.2),
            font_id: FontId::new(font_size, font_family(&screensaver.font_name)),
            font_size,
            min_alpha: screensaver.min_alpha,
            shutdown,
            last_tick: Instant::now(),
            rng: rand::rng(),
            listener_gone: false,
        }
    }

    fn handle_input(&mut self, ctx: &egui::Context) {
        let (close, speed_up, slow_down, clear) = ctx.input(|i| {
            (
                i.viewport().close_requested(),
                i.key_pressed(Key::Plus) || i.key_pressed(Key::Equals),
                i.key_pressed(Key::Minus),
                i.key_pressed(Key::C),
            )
        });

        if close {
            info!("Window close requested, shutting down");
            self.shutdown.cancel();
        }
        if speed_up {
            self.speed.speed_up();
            info!("Fall speed increased to {}", self.speed);
        }
        if slow_down {
            self.speed.slow_down();
            info!("Fall speed decreased to {}", self.speed);
        }
        if clear {
            self.field.clear();
            info!("Screen cleared");
        }
    }

    /// Moves every queued message into the animation field, stamping it with
    /// the current global speed.
    fn drain_spawn_queue(&mut self) {
        loop {
            match self.spawn_rx.try_recv() {
                Ok(request) => {
                    debug!("Spawning {}", request);
                    self.field.spawn(request, self.speed, &mut self.rng);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if !self.listener_gone {
                        warn!("Listener channel closed, no further messages will arrive");
                        self.listener_gone = true;
                    }
                    break;
                }
            }
        }
    }

    fn paint_rain(&self, ui: &egui::Ui) {
        let painter = ui.painter();
        for message in self.field.messages() {
            for (index, (glyph, color)) in message.chars.iter().enumerate() {
                // Control characters have no glyph; skipping them is the
                // per-character recovery path, the frame goes on.
                if glyph.is_control() {
                    continue;
                }
                let alpha = (f32::from(self.min_alpha) + index as f32 * message.alpha_step)
                    .min(255.0) as u8;
                painter.text(
                    egui::pos2(message.x, message.y + index as f32 * self.font_size),
                    Align2::LEFT_TOP,
                    *glyph,
                    self.font_id.clone(),
                    Color32::from_rgba_unmultiplied(color.0, color.1, color.2, alpha),
                );
            }
        }
    }
}

impl eframe::App for MatrixRainApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(FRAME_INTERVAL);

        let now = Instant::now();
        let delta_time = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;

        self.handle_input(ctx);
        self.drain_spawn_queue();
        self.field.advance(delta_time);

        egui::CentralPanel::default()
            .frame(Frame::new().fill(self.background))
            .show(ctx, |ui| self.paint_rain(ui));

        self.field.prune();
    }
}

/// Maps the configured font name to an egui font family. egui ships its own
/// embedded fonts rather than loading system fonts by name, so the name acts
/// as a family hint; rain defaults to monospace.
fn font_family(name: &str) -> FontFamily {
    let name = name.to_lowercase();
    if name.contains("sans") || name.contains("serif") || name.contains("proportional") {
        FontFamily::Proportional
    } else {
        FontFamily::Monospace
    }
}
