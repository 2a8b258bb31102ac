use serde::{Deserialize, Serialize};

/// Asr shadow-length convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrConvention {
    /// Shafi'i/standard (shadow factor 1).
    #[default]
    Standard,
    /// Hanafi (shadow factor 2).
    Hanafi,
}

/// Optional twilight-angle overrides passed through to the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomAngles {
    pub fajr: Option<f64>,
    pub maghrib: Option<f64>,
    pub isha: Option<f64>,
}

impl CustomAngles {
    pub fn is_empty(&self) -> bool {
        self.fajr.is_none() && self.maghrib.is_none() && self.isha.is_none()
    }
}

/// Location and method settings consumed from the external configuration
/// store. The store owns persistence and merging; after a write it swaps
/// new values in via [`crate::PrayerCalculator::set_settings`] and calls
/// `clear_cache()`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationSettings {
    pub latitude: f64,
    pub longitude: f64,
    pub calculation_method: String,
    pub asr_method: AsrConvention,
    pub custom_angles: Option<CustomAngles>,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            calculation_method: "ISNA".to_string(),
            asr_method: AsrConvention::Standard,
            custom_angles: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = CalculationSettings::default();
        assert_eq!(settings.calculation_method, "ISNA");
        assert_eq!(settings.asr_method, AsrConvention::Standard);
        assert!(settings.custom_angles.is_none());
    }

    #[test]
    fn test_empty_custom_angles() {
        assert!(CustomAngles::default().is_empty());
        let angles = CustomAngles {
            fajr: Some(18.0),
            ..Default::default()
        };
        assert!(!angles.is_empty());
    }
}
