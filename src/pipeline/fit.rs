//! Dimension fitting: scale an image's intrinsic size into a bounding box.
//!
//! The default [`FitPolicy::TwoStepClamp`] clamps width first and height
//! second. It never upscales and always lands inside both bounds, but it is
//! not a minimal uniform scale: a tall image in a wide box keeps whatever
//! width the height clamp leaves it. Report layouts depend on that exact
//! behaviour, so the order of the two steps must not change.
//! [`FitPolicy::Proportional`] is the uniform min-scale alternative.
//!
//! One intrinsic pixel is treated as one point.

use crate::config::{BoxSize, FitPolicy, LogoSpec};
use tracing::warn;

/// Fit `(intrinsic_width, intrinsic_height)` into `max_width × max_height`
/// with the two-step clamp.
///
/// Non-positive intrinsic dimensions are rejected: the max box is returned
/// unchanged and a warning is logged.
pub fn fit(intrinsic_width: f32, intrinsic_height: f32, max_width: f32, max_height: f32) -> (f32, f32) {
    fit_with_policy(
        FitPolicy::TwoStepClamp,
        intrinsic_width,
        intrinsic_height,
        max_width,
        max_height,
    )
}

/// Fit with an explicit policy.
pub fn fit_with_policy(
    policy: FitPolicy,
    intrinsic_width: f32,
    intrinsic_height: f32,
    max_width: f32,
    max_height: f32,
) -> (f32, f32) {
    if !(intrinsic_width > 0.0 && intrinsic_height > 0.0) {
        warn!(
            intrinsic_width,
            intrinsic_height, "Rejecting non-positive image dimensions; using the full box"
        );
        return (max_width, max_height);
    }

    match policy {
        FitPolicy::TwoStepClamp => {
            let aspect = intrinsic_height / intrinsic_width;
            let (mut width, mut height) = (intrinsic_width, intrinsic_height);
            if width > max_width {
                width = max_width;
                height = width * aspect;
            }
            if height > max_height {
                height = max_height;
                width = height / aspect;
            }
            (width, height)
        }
        FitPolicy::Proportional => {
            let scale = (max_width / intrinsic_width)
                .min(max_height / intrinsic_height)
                .min(1.0);
            (intrinsic_width * scale, intrinsic_height * scale)
        }
    }
}

/// A configured fitter for one kind of slot (grid cell, logo, …).
#[derive(Debug, Clone, Copy)]
pub struct DimensionFitter {
    pub policy: FitPolicy,
    pub bounds: BoxSize,
    /// Each side is raised to at least this, then capped by `bounds`.
    pub min_side: f32,
}

impl DimensionFitter {
    pub fn new(policy: FitPolicy, bounds: BoxSize, min_side: f32) -> Self {
        Self {
            policy,
            bounds,
            min_side,
        }
    }

    /// Fit intrinsic pixel dimensions into this fitter's box.
    pub fn fit(&self, intrinsic_width: u32, intrinsic_height: u32) -> (f32, f32) {
        let (w, h) = fit_with_policy(
            self.policy,
            intrinsic_width as f32,
            intrinsic_height as f32,
            self.bounds.width,
            self.bounds.height,
        );
        (
            w.max(self.min_side).min(self.bounds.width),
            h.max(self.min_side).min(self.bounds.height),
        )
    }
}

/// Size a header logo: scale to the logo's target height, then clamp width
/// and height in turn, keeping the aspect ratio. Logos are upscaled when the
/// source is small.
pub fn fit_logo(intrinsic_width: u32, intrinsic_height: u32, spec: &LogoSpec) -> Option<(f32, f32)> {
    if intrinsic_width == 0 || intrinsic_height == 0 {
        warn!(file = %spec.file_name, "Logo has zero dimensions");
        return None;
    }
    let ratio = intrinsic_width as f32 / intrinsic_height as f32;
    let mut height = spec.target_height;
    let mut width = height * ratio;
    if width > spec.max_width {
        width = spec.max_width;
        height = width / ratio;
    }
    if height > spec.max_height {
        height = spec.max_height;
        width = height * ratio;
    }
    Some((width, height))
}
