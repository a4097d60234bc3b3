//! Secret key rate estimates for decoy-state QKD channels
//!
//! The rate of a quantum channel degrades with the Raman noise leaking in from
//! the classical channels around it. [`interference_load`] turns a
//! configuration and the set of occupied channels into one noise figure per
//! quantum channel; [`KeyRateParams::secret_key_rate`] maps that figure to a
//! rate.

use tracing::debug;

use crate::channel::{Channel, Configuration};
use crate::interference::InterferenceTable;

/// Planck's constant (J·s)
const PLANCK: f64 = 6.626e-34;

/// Output scaling applied to the raw rate
const RATE_SCALE: f64 = 1e-7;

/// Physical parameters of the link
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyRateParams {
    /// Dark count rate per gate
    pub dark_count_rate: f64,
    /// Detector gate width (s)
    pub gate_width: f64,
    /// Classical launch power (W)
    pub launch_power: f64,
    /// Fibre attenuation (1/km)
    pub attenuation: f64,
    /// Fibre length (km)
    pub length_km: f64,
    /// Channel spacing (GHz)
    pub channel_spacing_ghz: f64,
    /// Detector efficiency
    pub detector_efficiency: f64,
    /// Optical misalignment error
    pub optical_error: f64,
    /// Symbol period (s)
    pub symbol_period: f64,
    /// Error-correction inefficiency
    pub error_correction: f64,
    /// Single-photon yield
    pub single_photon_yield: f64,
    /// Mean photon number of the signal state
    pub mean_photon_number: f64,
}

impl Default for KeyRateParams {
    fn default() -> Self {
        Self {
            dark_count_rate: 1e-10,
            gate_width: 100e-12,
            launch_power: 8e-10,
            attenuation: 0.046,
            length_km: 50.0,
            channel_spacing_ghz: 125.0,
            detector_efficiency: 0.3,
            optical_error: 0.015,
            symbol_period: 250e-12,
            error_correction: 1.16,
            single_photon_yield: 1.0,
            mean_photon_number: 0.48,
        }
    }
}

impl KeyRateParams {
    /// Forward Raman coefficient converting a crosstalk figure into a noise
    /// photon probability
    pub fn forward_coefficient(&self) -> f64 {
        let loss = (-self.attenuation * self.length_km).exp();
        self.launch_power * loss * self.length_km * self.gate_width * self.detector_efficiency
            / (2.0 * PLANCK * self.channel_spacing_ghz * 1e9)
    }

    /// Secret key rate for one quantum channel given its noise figure `p_m`
    ///
    /// Never negative; parameter combinations that make the estimate
    /// meaningless (NaN) yield 0.
    pub fn secret_key_rate(&self, p_m: f64) -> f64 {
        let mu = self.mean_photon_number;
        let p_dc = self.dark_count_rate * self.gate_width;
        let p_noise = p_m * self.forward_coefficient();

        let y0 = 1.0 - (1.0 - (p_dc + p_noise)).powi(2);
        let eta = 0.5 * self.detector_efficiency * (-self.attenuation * self.length_km).exp();
        let q_mu = 1.0 - (1.0 - y0) * (-eta * mu).exp();
        let e_mu = (y0 / 2.0 + self.optical_error * (1.0 - (-eta * mu).exp())) / q_mu;
        let q1 = self.single_photon_yield * mu * (-mu).exp();
        let e1 = (y0 / 2.0 + self.optical_error * eta) / self.single_photon_yield;

        let p_y0 = q1 * (1.0 - binary_entropy(e1))
            - self.error_correction * q_mu * binary_entropy(e_mu);
        let rate = p_y0 / self.symbol_period;

        // NaN compares false and clamps to zero as well
        if rate > 0.0 {
            rate * RATE_SCALE
        } else {
            0.0
        }
    }

    /// Sum of the per-channel rates
    pub fn total_key_rate(&self, loads: &[f64]) -> f64 {
        loads.iter().map(|&p| self.secret_key_rate(p)).sum()
    }
}

/// h(x) = -x log2 x - (1-x) log2 (1-x), with h(0) = h(1) = 0
///
/// Outside [0, 1] the result is NaN.
pub fn binary_entropy(x: f64) -> f64 {
    if x == 0.0 || x == 1.0 {
        return 0.0;
    }
    -x * x.log2() - (1.0 - x) * (1.0 - x).log2()
}

/// Aggregated crosstalk on each channel of `config` from the occupied channels
///
/// For each q in Q: Σ_{c ∈ occupied} q · B(c, q). Undefined or infinite
/// contributions (unknown channels, NaN cells, c = q) are skipped.
pub fn interference_load(
    table: &InterferenceTable,
    config: &Configuration,
    occupied: &[Channel],
) -> Vec<f64> {
    config
        .channels()
        .iter()
        .map(|&q| {
            occupied
                .iter()
                .filter_map(|&c| {
                    let contribution = table.get(c, q)? * q.wavelength();
                    if contribution.is_finite() {
                        Some(contribution)
                    } else {
                        debug!("Skipping undefined contribution B({}, {})", c, q);
                        None
                    }
                })
                .sum()
        })
        .collect()
}
