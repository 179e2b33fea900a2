//! Mapping from a user-facing linear zoom value to hardware zoom ramps.

use tracing::{debug, info, warn};

use crate::config::ZoomPolicy;
use crate::traits::{
    CameraError, ConfigurationGuard, LensDescriptor, LensType, Result, ZoomControl,
};

/// Zoom factor treated as "unzoomed" when nothing better is known.
pub const UNIT_ZOOM: f64 = 1.0;

/// Zoom factor at which the assembly leaves the ultra-wide lens.
///
/// The first lens that is not ultra-wide decides: if it is not the first lens,
/// the switch-over factor just before it is the standard zoom. Devices without
/// an ultra-wide lens, or with fewer thresholds than lenses, get [`UNIT_ZOOM`].
#[must_use]
pub fn compute_standard_zoom(lenses: &[LensDescriptor], switch_over: &[f64]) -> f64 {
    lenses
        .iter()
        .position(|lens| lens.lens_type != LensType::UltraWide)
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| switch_over.get(index).copied())
        .unwrap_or(UNIT_ZOOM)
}

/// Usable zoom range of the current device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRange {
    /// Lowest factor.
    pub min: f64,
    /// Highest factor, already capped by policy.
    pub max: f64,
    /// Perceptual "1x" factor, always within `min..=max`.
    pub standard: f64,
}

impl ZoomRange {
    /// Range used when no zoom hardware is available.
    #[must_use]
    pub fn fallback(policy: &ZoomPolicy) -> Self {
        let min = policy.fallback_min.max(0.0);
        let max = policy.fallback_max.max(min);
        Self {
            min,
            max,
            standard: UNIT_ZOOM.clamp(min, max),
        }
    }

    /// Range of `control`, with `max` capped at `policy_cap`.
    pub fn from_control<Z: ZoomControl + ?Sized>(control: &Z, policy_cap: f64) -> Self {
        let (hardware_min, hardware_max) = control.zoom_bounds();
        let standard = compute_standard_zoom(control.lenses(), control.switch_over_factors());
        compute_range(hardware_min, hardware_max, policy_cap, standard)
    }

    /// Clamp `factor` into this range.
    #[must_use]
    pub fn clamp(&self, factor: f64) -> f64 {
        factor.clamp(self.min, self.max)
    }
}

/// Build a [`ZoomRange`] from raw hardware bounds.
///
/// `max` is the smaller of `hardware_max` and `policy_cap`, never below `min`.
/// `standard` is clamped into the resulting range.
#[must_use]
pub fn compute_range(
    hardware_min: f64,
    hardware_max: f64,
    policy_cap: f64,
    standard: f64,
) -> ZoomRange {
    let min = hardware_min.max(0.0);
    let max = hardware_max.min(policy_cap).max(min);
    ZoomRange {
        min,
        max,
        standard: standard.clamp(min, max),
    }
}

/// Zoom value currently selected by the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    linear_factor: f64,
}

impl ZoomState {
    /// State holding `factor` clamped into `range`.
    #[must_use]
    pub fn clamped(factor: f64, range: &ZoomRange) -> Self {
        Self {
            linear_factor: range.clamp(factor),
        }
    }

    /// The selected linear zoom factor.
    #[must_use]
    pub const fn linear_factor(&self) -> f64 {
        self.linear_factor
    }
}

/// Owns the zoom range and state of one device and issues ramp commands.
///
/// Without zoom hardware the controller runs in a degraded mode: it reports the
/// fallback range and silently drops zoom requests.
pub struct ZoomController<Z: ZoomControl> {
    control: Option<Z>,
    range: ZoomRange,
    state: ZoomState,
    ramp_rate: f64,
}

impl<Z: ZoomControl> ZoomController<Z> {
    /// Create a controller for `control`, or a degraded one for `None`.
    pub fn new(control: Option<Z>, policy: &ZoomPolicy) -> Self {
        let range = match &control {
            Some(control) => {
                let range = ZoomRange::from_control(control, policy.policy_cap);
                info!(
                    min = range.min,
                    max = range.max,
                    standard = range.standard,
                    lenses = control.lenses().len(),
                    switch_over = ?control.switch_over_factors(),
                    "Zoom range computed"
                );
                range
            }
            None => {
                warn!("No zoom hardware available, using fallback range");
                ZoomRange::fallback(policy)
            }
        };

        Self {
            control,
            range,
            state: ZoomState::clamped(range.min, &range),
            ramp_rate: policy.ramp_rate,
        }
    }

    /// The usable zoom range.
    pub const fn range(&self) -> &ZoomRange {
        &self.range
    }

    /// The currently selected linear zoom factor.
    pub const fn linear_factor(&self) -> f64 {
        self.state.linear_factor()
    }

    /// The zoom hardware, if any.
    pub const fn control(&self) -> Option<&Z> {
        self.control.as_ref()
    }

    /// Whether zoom hardware is attached.
    pub const fn has_hardware(&self) -> bool {
        self.control.is_some()
    }

    /// Select `factor` and ramp the hardware towards it.
    ///
    /// The selection is kept even when the ramp fails.
    pub fn set_linear_factor(&mut self, factor: f64) {
        self.state = ZoomState::clamped(factor, &self.range);
        self.apply_zoom(self.state.linear_factor());
    }

    /// Select the standard zoom, used once the session has started.
    pub fn reset_to_standard(&mut self) {
        self.set_linear_factor(self.range.standard);
    }

    /// Ramp the hardware towards `target`, logging failures.
    pub fn apply_zoom(&mut self, target: f64) {
        match self.try_apply_zoom(target) {
            Ok(()) => {}
            Err(CameraError::DeviceUnavailable(_)) => {
                debug!(factor = target, "Zoom request dropped, no hardware");
            }
            Err(err) => warn!(factor = target, "Error zooming: {err}"),
        }
    }

    /// Ramp the hardware towards `target`.
    ///
    /// Cancels the in-flight ramp first. The configuration lock is held only
    /// for the duration of this call.
    pub fn try_apply_zoom(&mut self, target: f64) -> Result<()> {
        let control = self
            .control
            .as_mut()
            .ok_or_else(|| CameraError::DeviceUnavailable("no zoom hardware".to_owned()))?;

        let mut guard = ConfigurationGuard::acquire(control)?;
        guard.cancel_zoom_ramp();
        guard.ramp_to_zoom(target, self.ramp_rate)?;
        debug!(factor = target, rate = self.ramp_rate, "Zoom ramp issued");
        Ok(())
    }

    /// Read the hardware zoom back into the selected factor.
    ///
    /// Returns the new factor, or `None` without hardware or on read failure.
    pub fn reconcile(&mut self) -> Option<f64> {
        let control = self.control.as_ref()?;
        match control.zoom_factor() {
            Ok(actual) => {
                self.state = ZoomState::clamped(actual, &self.range);
                Some(self.state.linear_factor())
            }
            Err(err) => {
                warn!("Failed to read zoom factor: {err}");
                None
            }
        }
    }
}
