//! Falling-message animation state.
//!
//! [`RainField`] owns every message currently on screen. The MQTT listener
//! never touches it directly: it sends [`SpawnRequest`]s over a channel and
//! the render loop drains them into the field once per frame, so the field
//! has exactly one owner and no locking.

use crate::config::Rgb;
use crate::rain::colorizer::ColoredLine;
use chrono::{DateTime, Local};
use rand::Rng;
use std::fmt;

/// Animation advance is normalized to a 60 Hz baseline so perceived fall
/// speed is independent of the actual frame rate.
const FRAME_RATE_NORMALIZATION: f32 = 60.0;

/// Per-message speed jitter drawn at spawn time.
const SPEED_JITTER: std::ops::RangeInclusive<f32> = 0.7..=1.3;

/// The global fall-speed multiplier, owned by the render loop and passed by
/// value into spawns. Always within [`FallSpeed::MIN`, `FallSpeed::MAX`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FallSpeed(f32);

impl Default for FallSpeed {
    fn default() -> Self {
        Self(1.0)
    }
}

impl FallSpeed {
    pub const MIN: f32 = 0.1;
    pub const MAX: f32 = 5.0;

    /// Multiplies the speed by 1.1, capped at [`FallSpeed::MAX`].
    pub fn speed_up(&mut self) {
        self.0 = (self.0 * 1.1).min(Self::MAX);
    }

    /// Multiplies the speed by 0.9, floored at [`FallSpeed::MIN`].
    pub fn slow_down(&mut self) {
        self.0 = (self.0 * 0.9).max(Self::MIN);
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl fmt::Display for FallSpeed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// One inbound message, colorized and ready to animate.
///
/// Produced by the MQTT listener, consumed by [`RainField::spawn`].
#[derive(Clone, Debug)]
pub struct SpawnRequest {
    pub topic: String,
    pub received_at: DateTime<Local>,
    pub line: ColoredLine,
}

impl fmt::Display for SpawnRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} ({} chars)",
            self.received_at.format("%H:%M:%S%.3f"),
            self.topic,
            self.line.len()
        )
    }
}

/// A message falling down the screen.
#[derive(Clone, Debug)]
pub struct FallingMessage {
    /// Character/color pairs computed once at spawn.
    pub chars: Vec<(char, Rgb)>,
    /// Column position, fixed at spawn.
    pub x: f32,
    /// Top of the message; advances every frame.
    pub y: f32,
    /// Pixels per normalized frame.
    pub speed: f32,
    /// Opacity increase per character along the message.
    pub alpha_step: f32,
}

impl FallingMessage {
    pub fn char_count(&self) -> usize {
        self.chars.len()
    }

    /// Rendered height in pixels given the field's font size.
    fn height(&self, font_size: f32) -> f32 {
        self.chars.len() as f32 * font_size
    }
}

/// The ordered collection of live messages plus the screen geometry needed
/// to place and evict them.
#[derive(Debug)]
pub struct RainField {
    messages: Vec<FallingMessage>,
    width: f32,
    height: f32,
    font_size: f32,
}

impl RainField {
    pub fn new(width: f32, height: f32, font_size: f32) -> Self {
        Self {
            messages: Vec::new(),
            width,
            height,
            font_size,
        }
    }

    /// Creates a falling message from `request` and appends it.
    ///
    /// The column is uniform over the full screen width; the initial
    /// vertical position sits one rendered text height above the top edge,
    /// so longer messages take proportionally longer to scroll into view;
    /// the per-message speed is the global speed with ±30% jitter.
    pub fn spawn<R: Rng>(&mut self, request: SpawnRequest, speed: FallSpeed, rng: &mut R) {
        let line = request.line;
        let x = rng.random_range(0.0..=self.width);
        let y = -(line.len() as f32 * self.font_size);
        let speed = speed.value() * rng.random_range(SPEED_JITTER);

        self.messages.push(FallingMessage {
            alpha_step: line.alpha_step,
            chars: line.chars,
            x,
            y,
            speed,
        });
    }

    /// Moves every message down by `speed × delta_time`, normalized to the
    /// 60 Hz baseline.
    pub fn advance(&mut self, delta_time: f32) {
        for message in &mut self.messages {
            message.y += message.speed * delta_time * FRAME_RATE_NORMALIZATION;
        }
    }

    /// Drops every message whose top has moved past the bottom edge by more
    /// than its own rendered height, i.e. that is fully off screen.
    pub fn prune(&mut self) {
        let bottom = self.height;
        let font_size = self.font_size;
        self.messages
            .retain(|message| message.y <= bottom + message.height(font_size));
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[FallingMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const FONT_SIZE: f32 = 10.0;

    fn field() -> RainField {
        RainField::new(800.0, 600.0, FONT_SIZE)
    }

    fn request(text: &str) -> SpawnRequest {
        SpawnRequest {
            topic: "test".into(),
            received_at: Local::now(),
            line: ColoredLine {
                chars: text.chars().map(|c| (c, Rgb(0, 255, 0))).collect(),
                alpha_step: 10.0,
            },
        }
    }

    fn message(text: &str, y: f32) -> FallingMessage {
        FallingMessage {
            chars: text.chars().map(|c| (c, Rgb(0, 255, 0))).collect(),
            x: 0.0,
            y,
            speed: 1.0,
            alpha_step: 0.0,
        }
    }

    #[test]
    fn spawn_places_message_above_screen_with_jittered_speed() {
        let mut field = field();
        let mut rng = StdRng::seed_from_u64(7);
        field.spawn(request("abcde"), FallSpeed::default(), &mut rng);

        let message = &field.messages()[0];
        assert_eq!(message.char_count(), 5);
        assert_eq!(message.y, -5.0 * FONT_SIZE);
        assert!(message.x >= 0.0 && message.x <= 800.0);
        assert!(message.speed >= 0.7 && message.speed <= 1.3);
    }

    #[test]
    fn advance_with_zero_delta_never_moves() {
        let mut field = field();
        let mut rng = StdRng::seed_from_u64(1);
        field.spawn(request("abc"), FallSpeed::default(), &mut rng);
        let before = field.messages()[0].y;

        field.advance(0.0);
        assert_eq!(field.messages()[0].y, before);
    }

    #[test]
    fn advance_is_normalized_to_sixty_hz() {
        let mut field = field();
        field.messages.push(message("ab", 0.0));
        field.messages[0].speed = 2.0;

        field.advance(0.5);
        assert_eq!(field.messages[0].y, 2.0 * 0.5 * 60.0);
    }

    #[test]
    fn prune_removes_exactly_the_fully_offscreen() {
        let mut field = field();
        let threshold = 600.0 + 3.0 * FONT_SIZE;
        field.messages.push(message("abc", threshold));
        field.messages.push(message("abc", threshold + 0.1));
        field.messages.push(message("abc", 100.0));

        field.prune();
        let remaining: Vec<f32> = field.messages().iter().map(|m| m.y).collect();
        assert_eq!(remaining, vec![threshold, 100.0]);
    }

    #[test]
    fn longer_messages_survive_further_below_the_edge() {
        let mut field = field();
        field.messages.push(message("abcdefgh", 650.0));
        field.messages.push(message("a", 650.0));

        field.prune();
        assert_eq!(field.len(), 1);
        assert_eq!(field.messages()[0].char_count(), 8);
    }

    #[test]
    fn clear_then_advance_and_prune_stays_empty() {
        let mut field = field();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..4 {
            field.spawn(request("msg"), FallSpeed::default(), &mut rng);
        }
        field.clear();
        for _ in 0..10 {
            field.advance(0.016);
            field.prune();
        }
        assert!(field.is_empty());
    }

    #[test]
    fn operations_are_noops_on_empty_field() {
        let mut field = field();
        field.advance(1.0);
        field.prune();
        field.clear();
        assert!(field.is_empty());
    }

    #[test]
    fn speed_is_clamped_upwards() {
        let mut speed = FallSpeed::default();
        for _ in 0..100 {
            speed.speed_up();
        }
        assert_eq!(speed.value(), FallSpeed::MAX);
    }

    #[test]
    fn speed_is_clamped_downwards() {
        let mut speed = FallSpeed::default();
        for _ in 0..100 {
            speed.slow_down();
        }
        assert_eq!(speed.value(), FallSpeed::MIN);
    }

    #[test]
    fn mixed_speed_keys_stay_in_range() {
        let mut speed = FallSpeed::default();
        for i in 0..1000 {
            if i % 3 == 0 {
                speed.slow_down();
            } else {
                speed.speed_up();
            }
            assert!(speed.value() >= FallSpeed::MIN && speed.value() <= FallSpeed::MAX);
        }
    }

    #[test]
    fn spawned_speed_scales_with_global_speed() {
        let mut field = field();
        let mut rng = StdRng::seed_from_u64(11);
        let mut fast = FallSpeed::default();
        for _ in 0..20 {
            fast.speed_up();
        }
        field.spawn(request("abc"), fast, &mut rng);

        let message = &field.messages()[0];
        assert!(message.speed >= fast.value() * 0.7);
        assert!(message.speed <= fast.value() * 1.3);
    }
}
