//! # Matrix Rain Core
//!
//! The display logic of the application, independent of both the MQTT
//! transport and the window toolkit:
//!
//! ```text
//! rain/
//! ├── colorizer.rs - per-character color assignment and keyword overlays
//! └── state.rs     - falling-message collection, spawn/advance/prune/clear
//! ```
//!
//! The split mirrors the data flow: the colorizer runs once per inbound
//! message (on the listener task) and produces an immutable [`ColoredLine`];
//! the state manager runs once per frame (on the render thread) and owns
//! every animated message exclusively. The two sides meet only in the
//! [`SpawnRequest`] hand-off.

pub mod colorizer;
pub mod state;

pub use colorizer::{ColoredLine, RainStyle};
pub use state::{FallSpeed, FallingMessage, RainField, SpawnRequest};
