//! Rackhost Effects - built-in module types
//!
//! Each type implements [`EffectModule`](rackhost_core::EffectModule) and hands
//! out one context per rack instance:
//!
//! - [`Equalizer`] - 3-band peaking EQ, up to 5 instances, single and double precision
//! - [`Gain`] - Smoothed output gain, single precision only, no editor
//! - [`Delay`] - Feedback delay whose line is allocated in `begin_playback`
//!
//! ## Example
//!
//! ```rust
//! use rackhost_core::{EffectModule, PlaybackSettings};
//! use rackhost_effects::Equalizer;
//!
//! let info = Equalizer.info();
//! assert_eq!(info.max_instances, 5);
//!
//! let mut ctx = Equalizer.create_context();
//! ctx.begin_playback(0, &PlaybackSettings::new(48000.0, 256, 2)).unwrap();
//! ```

pub mod delay;
pub mod equalizer;
pub mod gain;

pub use delay::{Delay, DelayContext};
pub use equalizer::{Equalizer, EqualizerContext};
pub use gain::{Gain, GainContext};

use rackhost_core::EffectModule;
use std::sync::Arc;

/// Every built-in module type, in registration order.
pub fn builtin_modules() -> Vec<Arc<dyn EffectModule>> {
    vec![Arc::new(Equalizer), Arc::new(Gain), Arc::new(Delay)]
}
