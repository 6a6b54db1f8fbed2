//! # MQTT Intake
//!
//! Everything between the broker and the rain: connection lifecycle,
//! subscription setup, payload processing and sanitizing.
//!
//! ```text
//! mqtt/
//! ├── listener.rs - connection state machine and receive loop
//! └── payload.rs  - JSON field extraction and text sanitizing
//! ```
//!
//! The listener owns the `rumqttc` client and event loop on its own tokio
//! task and communicates with the rest of the application exclusively
//! through the bounded spawn-request channel and the shutdown token. Topic
//! filters use `*` as the configured multi-level wildcard marker, which is
//! translated to the broker's `#` at subscribe time.

pub mod listener;
pub mod payload;

pub use listener::{ListenerError, ListenerHandle};
