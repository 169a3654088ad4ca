//! Kinescope: timed, chained GPU shader effects over live video.
//!
//! Effects are registered against a driving clock. Once per frame the
//! [`EffectPipeline`] is advanced to the current time, which starts and
//! expires effects, and then renders the source frame through every running
//! effect in activation order, the last one drawing onto the window surface.

pub mod catalog;
pub mod compositor;
pub mod config;
pub mod effect;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod scheduler;
pub mod shader;
pub mod source;
pub mod utils;

pub use catalog::{BuiltinCatalog, ShaderCatalog, ShaderName};
pub use config::{Timeline, TimelineWatcher};
pub use effect::{Effect, EffectKind};
pub use error::{Error, Result};
pub use frame::{Resolution, VideoFrame};
pub use pipeline::EffectPipeline;
pub use scheduler::{EffectScheduler, EffectState, Transitions};
