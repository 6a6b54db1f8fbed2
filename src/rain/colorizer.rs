//! Per-message color assignment.
//!
//! For every inbound message the colorizer builds the complete character
//! sequence that the render loop will draw: topic prefix in the topic color,
//! payload in the payload color, and keyword highlights layered on top via
//! case-insensitive substring search. Colors are computed once per message,
//! at spawn time; the render loop only reads them.

use crate::config::{Rgb, ScreensaverSection};
use tracing::trace;

/// Separator drawn between the topic and the payload.
const SEPARATOR: &str = ": ";

/// Stands in for any payload that exceeds the configured character limit.
const OVERSIZE_PLACEHOLDER: &str = "!!!";

/// Full opacity, the upper end of the per-character fade ramp.
const ALPHA_MAX: f32 = 255.0;

/// One display line with its per-character colors and fade increment.
///
/// Invariant: `chars` holds exactly one entry per character of the display
/// text, in order.
#[derive(Clone, Debug, PartialEq)]
pub struct ColoredLine {
    /// The display text as `(character, color)` pairs.
    pub chars: Vec<(char, Rgb)>,
    /// Opacity increase per character along the line. Not clamped; the
    /// render loop saturates the final opacity at 255.
    pub alpha_step: f32,
}

impl ColoredLine {
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The plain display text, mainly for logging.
    pub fn text(&self) -> String {
        self.chars.iter().map(|(c, _)| *c).collect()
    }
}

/// Styling rules applied to every message: default colors, keyword
/// highlights and the fade parameters.
#[derive(Clone, Debug)]
pub struct RainStyle {
    topic_color: Rgb,
    payload_color: Rgb,
    /// Lowercased keywords with their highlight colors, longest first.
    /// Equal lengths are ordered alphabetically so overlay order is
    /// deterministic.
    keywords: Vec<(String, Rgb)>,
    min_alpha: u8,
    payload_char_limit: usize,
}

impl RainStyle {
    pub fn from_config(config: &ScreensaverSection) -> Self {
        let mut keywords: Vec<(String, Rgb)> = config
            .keywords
            .iter()
            .map(|(keyword, color)| (keyword.to_lowercase(), *color))
            .collect();
        keywords.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(&b.0))
        });

        Self {
            topic_color: config.topic_color,
            payload_color: config.payload_color,
            keywords,
            min_alpha: config.min_alpha,
            payload_char_limit: config.payload_char_limit,
        }
    }

    pub fn min_alpha(&self) -> u8 {
        self.min_alpha
    }

    /// Builds the colored display line for one message.
    ///
    /// The payload is replaced by [`OVERSIZE_PLACEHOLDER`] when it exceeds
    /// the character limit. Character positions inside the topic + separator
    /// span get the topic color, the rest the payload color, and keyword
    /// matches overwrite their span afterwards. Keywords are applied longest
    /// first, each scanning left-to-right over non-overlapping occurrences;
    /// a keyword applied later overwrites any earlier color on the positions
    /// it matches.
    pub fn colorize(&self, topic: &str, payload: &str) -> ColoredLine {
        let payload = if payload.chars().count() > self.payload_char_limit {
            trace!("Payload over {} chars, replaced", self.payload_char_limit);
            OVERSIZE_PLACEHOLDER
        } else {
            payload
        };

        let text: Vec<char> = topic
            .chars()
            .chain(SEPARATOR.chars())
            .chain(payload.chars())
            .collect();
        let topic_span = topic.chars().count() + SEPARATOR.len();

        let mut colors: Vec<Rgb> = (0..text.len())
            .map(|i| {
                if i < topic_span {
                    self.topic_color
                } else {
                    self.payload_color
                }
            })
            .collect();

        // Case-insensitive matching over a char-wise lowercased copy keeps
        // indices aligned with the displayed text.
        let lowered: Vec<char> = text
            .iter()
            .map(|c| c.to_lowercase().next().unwrap_or(*c))
            .collect();

        for (keyword, color) in &self.keywords {
            let pattern: Vec<char> = keyword.chars().collect();
            if pattern.is_empty() {
                continue;
            }
            let mut start = 0;
            while start + pattern.len() <= lowered.len() {
                if lowered[start..start + pattern.len()] == pattern[..] {
                    for slot in &mut colors[start..start + pattern.len()] {
                        *slot = *color;
                    }
                    start += pattern.len();
                } else {
                    start += 1;
                }
            }
        }

        let alpha_step = if text.is_empty() {
            0.0
        } else {
            (ALPHA_MAX - f32::from(self.min_alpha)) / text.len() as f32
        };

        ColoredLine {
            chars: text.into_iter().zip(colors).collect(),
            alpha_step,
        }
    }
}
