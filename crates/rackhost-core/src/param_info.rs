//! Declarative parameter metadata.
//!
//! A module type describes its controls once, as a list of [`ParamDescriptor`]s
//! returned from [`EffectModule::create_parameters`](crate::EffectModule::create_parameters).
//! The descriptors drive clamping, normalization, text formatting, state
//! serialization (by `string_id`) and the control kind a collaborator attaches
//! to each parameter.
//!
//! # Example
//!
//! ```rust
//! use rackhost_core::{ControlKind, ParamDescriptor};
//!
//! let gain = ParamDescriptor::gain_db("Output", "out_gain", -24.0, 24.0, 0.0);
//! assert_eq!(gain.clamp(30.0), 24.0);
//! assert_eq!(gain.control_kind(), ControlKind::Slider);
//! assert_eq!(gain.format_value(-3.0), "-3.0 dB");
//! ```

/// Scaling curve for parameter normalization.
///
/// - **Linear**: `normalized = (value - min) / (max - min)`
/// - **Logarithmic**: `normalized = ln(value/min) / ln(max/min)`, requires `min > 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamScale {
    /// Equal resolution across the range.
    #[default]
    Linear,
    /// More resolution at low values. Used for frequencies.
    Logarithmic,
}

/// Parameter capability flags.
///
/// ```rust
/// use rackhost_core::ParamFlags;
///
/// let flags = ParamFlags::AUTOMATABLE.union(ParamFlags::STEPPED);
/// assert!(flags.contains(ParamFlags::STEPPED));
/// assert!(!flags.contains(ParamFlags::HIDDEN));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamFlags(u8);

impl ParamFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Host automation may write this parameter.
    pub const AUTOMATABLE: Self = Self(1 << 0);
    /// Discrete integer steps between `min` and `max`.
    pub const STEPPED: Self = Self(1 << 1);
    /// Not shown by generic editors.
    pub const HIDDEN: Self = Self(1 << 2);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for ParamFlags {
    fn default() -> Self {
        Self::AUTOMATABLE
    }
}

/// Unit used when formatting a value for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamUnit {
    /// Decibels.
    Decibels,
    /// Hertz.
    Hertz,
    /// Milliseconds.
    Milliseconds,
    /// Percentage, 0–100.
    Percent,
    /// Dimensionless.
    None,
}

impl ParamUnit {
    /// Suffix appended by [`ParamDescriptor::format_value`].
    pub const fn suffix(&self) -> &'static str {
        match self {
            ParamUnit::Decibels => " dB",
            ParamUnit::Hertz => " Hz",
            ParamUnit::Milliseconds => " ms",
            ParamUnit::Percent => "%",
            ParamUnit::None => "",
        }
    }
}

/// The kind of control a collaborator binds to a parameter.
///
/// Resolved from the descriptor when the module type is registered, so each
/// parameter maps to exactly one attachment kind for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// Continuous value.
    Slider,
    /// Two-state on/off.
    Toggle,
    /// One of `count` discrete options.
    Choice {
        /// Number of options.
        count: u32,
    },
}

/// Describes a single parameter's metadata for display and validation.
///
/// `string_id` is the persisted name: state trees store values under it, so it
/// must never change once a module type ships.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDescriptor {
    /// Display name.
    pub name: &'static str,
    /// Stable identifier used in serialized state.
    pub string_id: &'static str,
    /// Display unit.
    pub unit: ParamUnit,
    /// Minimum value.
    pub min: f32,
    /// Maximum value.
    pub max: f32,
    /// Value after creation or reset.
    pub default: f32,
    /// Normalization curve.
    pub scale: ParamScale,
    /// Capability flags.
    pub flags: ParamFlags,
}

impl ParamDescriptor {
    /// A continuous parameter with no unit.
    pub const fn new(
        name: &'static str,
        string_id: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self {
            name,
            string_id,
            unit: ParamUnit::None,
            min,
            max,
            default,
            scale: ParamScale::Linear,
            flags: ParamFlags::AUTOMATABLE,
        }
    }

    /// Gain in decibels.
    pub const fn gain_db(
        name: &'static str,
        string_id: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self::new(name, string_id, min, max, default).with_unit(ParamUnit::Decibels)
    }

    /// Frequency in Hz with logarithmic scaling.
    pub const fn frequency(
        name: &'static str,
        string_id: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self::new(name, string_id, min, max, default)
            .with_unit(ParamUnit::Hertz)
            .with_scale(ParamScale::Logarithmic)
    }

    /// Time in milliseconds.
    pub const fn time_ms(
        name: &'static str,
        string_id: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self::new(name, string_id, min, max, default).with_unit(ParamUnit::Milliseconds)
    }

    /// Percentage, 0–100.
    pub const fn percent(name: &'static str, string_id: &'static str, default: f32) -> Self {
        Self::new(name, string_id, 0.0, 100.0, default).with_unit(ParamUnit::Percent)
    }

    /// On/off switch stored as 0.0 or 1.0.
    pub const fn toggle(name: &'static str, string_id: &'static str, default: bool) -> Self {
        Self::new(name, string_id, 0.0, 1.0, if default { 1.0 } else { 0.0 })
            .with_flags(ParamFlags::AUTOMATABLE.union(ParamFlags::STEPPED))
    }

    /// Sets the display unit.
    pub const fn with_unit(mut self, unit: ParamUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the normalization scale.
    pub const fn with_scale(mut self, scale: ParamScale) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the capability flags.
    pub const fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Clamps a value to the valid range, snapping stepped parameters to
    /// the nearest integer. NaN maps to the default.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        let v = value.clamp(self.min, self.max);
        if self.flags.contains(ParamFlags::STEPPED) {
            libm::roundf(v)
        } else {
            v
        }
    }

    /// Converts a plain value to `0.0..=1.0`.
    pub fn normalize(&self, value: f32) -> f32 {
        let range = self.max - self.min;
        if range == 0.0 {
            return 0.0;
        }
        let n = match self.scale {
            ParamScale::Linear => (value - self.min) / range,
            ParamScale::Logarithmic => {
                if self.min <= 0.0 || value <= 0.0 {
                    return 0.0;
                }
                libm::logf(value / self.min) / libm::logf(self.max / self.min)
            }
        };
        n.clamp(0.0, 1.0)
    }

    /// Inverse of [`normalize`](Self::normalize).
    pub fn denormalize(&self, normalized: f32) -> f32 {
        let n = normalized.clamp(0.0, 1.0);
        let v = match self.scale {
            ParamScale::Linear => self.min + n * (self.max - self.min),
            ParamScale::Logarithmic => {
                if self.min <= 0.0 {
                    return self.min;
                }
                self.min * libm::powf(self.max / self.min, n)
            }
        };
        self.clamp(v)
    }

    /// Attachment kind derived from range and flags.
    pub fn control_kind(&self) -> ControlKind {
        if !self.flags.contains(ParamFlags::STEPPED) {
            return ControlKind::Slider;
        }
        if self.min == 0.0 && self.max == 1.0 {
            ControlKind::Toggle
        } else {
            ControlKind::Choice {
                count: (self.max - self.min) as u32 + 1,
            }
        }
    }

    /// Formats a value with its unit suffix.
    pub fn format_value(&self, value: f32) -> String {
        match self.control_kind() {
            ControlKind::Toggle => {
                if value >= 0.5 {
                    "On".to_owned()
                } else {
                    "Off".to_owned()
                }
            }
            ControlKind::Choice { .. } => format!("{:.0}{}", value, self.unit.suffix()),
            ControlKind::Slider => match self.unit {
                ParamUnit::Hertz | ParamUnit::Milliseconds | ParamUnit::Percent => {
                    format!("{:.0}{}", value, self.unit.suffix())
                }
                _ => format!("{:.1}{}", value, self.unit.suffix()),
            },
        }
    }

    /// Parses user text back into a clamped value.
    ///
    /// Accepts the output of [`format_value`](Self::format_value), bare
    /// numbers, and `On`/`Off` for toggles.
    pub fn parse_value(&self, text: &str) -> Option<f32> {
        let trimmed = text.trim();
        if self.control_kind() == ControlKind::Toggle {
            if trimmed.eq_ignore_ascii_case("on") {
                return Some(1.0);
            }
            if trimmed.eq_ignore_ascii_case("off") {
                return Some(0.0);
            }
        }
        let number = trimmed
            .strip_suffix(self.unit.suffix().trim_start())
            .unwrap_or(trimmed)
            .trim();
        number.parse::<f32>().ok().map(|v| self.clamp(v))
    }
}
