//! Rackhost Core - the module contract and realtime-safe primitives
//!
//! This crate defines what a DSP module is and how its controls are stored,
//! independent of any rack, device or host.
//!
//! # Core Abstractions
//!
//! ## Module contract
//!
//! - [`EffectModule`] - A registrable algorithm type (capabilities, parameter list, context factory)
//! - [`ModuleContext`] - Per-instance DSP state with `begin_playback` / `process_*` / `finish_playback`
//! - [`PlaybackSettings`], [`SetupError`]
//!
//! ## Buffers
//!
//! - [`AudioBlock`] - In-place interleaved view, generic over [`Sample`] (`f32` / `f64`)
//! - [`EventBuffer`] - Fixed-capacity per-block event list
//!
//! ## Parameters
//!
//! - [`ParamDescriptor`] - Declarative metadata, formatting and [`ControlKind`]
//! - [`ParameterSet`] - Atomic storage created once per module type
//! - [`ParamBinding`] - An instance's immutable window onto its parameters
//! - [`AutomationHistory`] - Gestures, undo and redo
//!
//! ## DSP utilities
//!
//! - [`Biquad`] with RBJ peaking coefficients
//! - [`db_to_linear`], [`linear_to_db`], [`flush_denormal`]
//!
//! # Realtime rules
//!
//! Anything called from `process_*` must not allocate, lock or block.
//! Parameter reads are a single atomic load; everything else a module needs
//! is allocated in `begin_playback`.

pub mod automation;
pub mod biquad;
pub mod buffer;
pub mod math;
pub mod module;
pub mod param;
pub mod param_info;

pub use automation::{AutomationHistory, DEFAULT_HISTORY_DEPTH};
pub use biquad::{Biquad, Coefficients};
pub use buffer::{AudioBlock, EventBuffer, MidiEvent, Sample};
pub use math::{db_to_linear, flush_denormal, linear_to_db};
pub use module::{
    EffectModule, MAX_BLOCK_SIZE, ModuleContext, ModuleInfo, PlaybackSettings, SAMPLE_RATE_RANGE,
    SetupError,
};
pub use param::{ParamBinding, ParamChange, Parameter, ParameterSet};
pub use param_info::{ControlKind, ParamDescriptor, ParamFlags, ParamScale, ParamUnit};
