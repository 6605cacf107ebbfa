//! Log-distance path loss model.
//!
//! distance = 10 ^ ((tx_power - rssi - A) / (10 * n))
//!
//! where A is the reference signal strength at 1 m and n the path-loss
//! exponent (about 2 in free space, 3 to 4 indoors or in clutter).

/// Exponents shown next to the configured one, since the true exponent of
/// the test site is not known up front.
pub const ILLUSTRATIVE_EXPONENTS: [f32; 3] = [2.0, 3.0, 4.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceModel {
    /// Signal strength at 1 m (dB)
    pub reference_rssi_at_1m: f32,
    pub path_loss_exponent: f32,
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self {
            reference_rssi_at_1m: 35.0,
            path_loss_exponent: 2.7,
        }
    }
}

impl DistanceModel {
    /// Distance in meters at the configured exponent.
    pub fn estimate(&self, tx_power_dbm: f32, rssi: f32) -> f32 {
        self.estimate_with(tx_power_dbm, rssi, self.path_loss_exponent)
    }

    /// Distance in meters at an arbitrary exponent `n`.
    pub fn estimate_with(&self, tx_power_dbm: f32, rssi: f32, n: f32) -> f32 {
        estimate_distance(tx_power_dbm, rssi, self.reference_rssi_at_1m, n)
    }
}

pub fn estimate_distance(tx_power_dbm: f32, rssi: f32, reference_rssi_at_1m: f32, n: f32) -> f32 {
    10f32.powf((tx_power_dbm - rssi - reference_rssi_at_1m) / (10.0 * n))
}
