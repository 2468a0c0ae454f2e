//! Keeps an imperative map engine in step with declarative snapshots.
//!
//! A [`MapView`] owns one engine through a [`MapHandle`]. Each snapshot is
//! diffed by the [`Reconciler`] against what the engine already holds, engine
//! events come back through the [`EventBridge`], and camera motion is settled
//! in the [`ViewportStore`].

pub mod bridge;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod handle;
pub mod live;
pub mod memory;
pub mod metrics;
pub mod reconcile;
pub mod view;
pub mod viewport;

pub use bridge::*;
pub use command::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use event::{ClickEvent, EngineEvent, LngLat, ScreenPoint, decode};
pub use handle::*;
pub use live::LiveState;
pub use memory::*;
pub use metrics::*;
pub use reconcile::*;
pub use view::*;
pub use viewport::*;
