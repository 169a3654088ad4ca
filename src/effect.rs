//! Effects: a shader kind with typed parameters, placed on the timeline.

use crate::catalog::{ShaderName, UniformValue};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters of the `basic` color adjustment shader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicParams {
    pub brightness: Option<f32>,
    pub contrast: Option<f32>,
    pub saturation: Option<f32>,
    pub sepia: Option<f32>,
}

/// Parameters of the `shine` flash shader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShineParams {
    /// Clip-space center of the flash.
    pub center: Option<[f32; 2]>,
    pub radius: Option<f32>,
    pub intensity: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrayscaleParams {
    pub intensity: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurParams {
    /// Tap distance in pixels.
    pub radius: Option<f32>,
}

/// Which shader an effect runs, together with its explicitly set parameters.
///
/// Unset parameters fall back to the catalog defaults when uniforms are bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shader", rename_all = "snake_case")]
pub enum EffectKind {
    Basic(BasicParams),
    Shine(ShineParams),
    Grayscale(GrayscaleParams),
    Blur(BlurParams),
    Passthrough,
}

impl EffectKind {
    pub fn shader_name(&self) -> ShaderName {
        match self {
            EffectKind::Basic(_) => ShaderName::Basic,
            EffectKind::Shine(_) => ShaderName::Shine,
            EffectKind::Grayscale(_) => ShaderName::Grayscale,
            EffectKind::Blur(_) => ShaderName::Blur,
            EffectKind::Passthrough => ShaderName::Passthrough,
        }
    }

    /// Uniform values this effect sets explicitly, keyed by uniform name.
    pub fn uniform_overrides(&self) -> Vec<(&'static str, UniformValue)> {
        let mut overrides = Vec::new();
        let mut set = |name: &'static str, value: Option<UniformValue>| {
            if let Some(value) = value {
                overrides.push((name, value));
            }
        };

        match self {
            EffectKind::Basic(p) => {
                set("u_brightness", p.brightness.map(UniformValue::Float));
                set("u_contrast", p.contrast.map(UniformValue::Float));
                set("u_saturation", p.saturation.map(UniformValue::Float));
                set("u_sepia", p.sepia.map(UniformValue::Float));
            }
            EffectKind::Shine(p) => {
                set("u_center", p.center.map(UniformValue::Vec2));
                set("u_radius", p.radius.map(UniformValue::Float));
                set("u_intensity", p.intensity.map(UniformValue::Float));
            }
            EffectKind::Grayscale(p) => {
                set("u_intensity", p.intensity.map(UniformValue::Float));
            }
            EffectKind::Blur(p) => {
                set("u_radius", p.radius.map(UniformValue::Float));
            }
            EffectKind::Passthrough => {}
        }

        overrides
    }

    /// Explicit value for one uniform, if this effect sets it.
    pub fn uniform_override(&self, name: &str) -> Option<UniformValue> {
        self.uniform_overrides()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value)
    }
}

/// A timed application of one shader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    #[serde(rename = "id")]
    pub identifier: String,
    #[serde(flatten)]
    pub kind: EffectKind,
    /// Seconds on the driving clock at which the effect becomes active.
    #[serde(rename = "start", default)]
    pub start_time: f64,
    /// Seconds the effect stays active. `None` runs until removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Effect {
    pub fn new(identifier: impl Into<String>, kind: EffectKind, start_time: f64) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
            start_time,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn shader_name(&self) -> ShaderName {
        self.kind.shader_name()
    }

    /// Driving time at which the effect expires, if it has a duration.
    pub fn end_time(&self) -> Option<f64> {
        self.duration.map(|d| self.start_time + d)
    }

    pub fn has_started_at(&self, time: f64) -> bool {
        self.start_time <= time
    }

    pub fn has_expired_at(&self, time: f64) -> bool {
        self.end_time().is_some_and(|end| end <= time)
    }

    /// Rejects non-finite start times and negative or non-finite durations.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidTiming {
            id: self.identifier.clone(),
            reason,
        };

        if !self.start_time.is_finite() {
            return Err(invalid(format!("start time {} is not finite", self.start_time)));
        }
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration < 0.0 {
                return Err(invalid(format!("duration {duration} must be finite and >= 0")));
            }
        }
        Ok(())
    }
}
