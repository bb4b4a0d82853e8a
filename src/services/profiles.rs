//! Named frequency band profiles

use serde::Serialize;

/// A named set of frequency ranges to scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanProfile {
    pub id: &'static str,
    pub name: &'static str,
    /// Inclusive ranges in MHz
    pub ranges: &'static [(f64, f64)],
    /// Channel step in kHz
    pub step_khz: f64,
    pub description: &'static str,
}

pub const SCAN_PROFILES: &[ScanProfile] = &[
    ScanProfile {
        id: "vhf",
        name: "VHF Amateur (144-148 MHz)",
        ranges: &[(144.0, 148.0)],
        step_khz: 25.0,
        description: "VHF Amateur Radio Band",
    },
    ScanProfile {
        id: "uhf",
        name: "UHF Amateur (420-450 MHz)",
        ranges: &[(420.0, 450.0)],
        step_khz: 25.0,
        description: "UHF Amateur Radio Band",
    },
    ScanProfile {
        id: "ism",
        name: "ISM Band (2.4 GHz)",
        ranges: &[(2400.0, 2485.0)],
        step_khz: 1000.0,
        description: "Industrial, Scientific, Medical Band",
    },
    ScanProfile {
        id: "airband",
        name: "Airband (118-137 MHz)",
        ranges: &[(118.0, 137.0)],
        step_khz: 25.0,
        description: "Aviation Communication Band",
    },
    ScanProfile {
        id: "marine",
        name: "Marine VHF (156-162 MHz)",
        ranges: &[(156.0, 162.0)],
        step_khz: 25.0,
        description: "Marine VHF Radio Band",
    },
    ScanProfile {
        id: "gsm900",
        name: "GSM 900 (880-960 MHz)",
        ranges: &[(880.0, 915.0), (925.0, 960.0)],
        step_khz: 200.0,
        description: "GSM 900 MHz Band",
    },
    ScanProfile {
        id: "gsm1800",
        name: "GSM 1800 (1710-1880 MHz)",
        ranges: &[(1710.0, 1785.0), (1805.0, 1880.0)],
        step_khz: 200.0,
        description: "GSM 1800 MHz Band",
    },
    ScanProfile {
        id: "wifi5",
        name: "WiFi 5 GHz (5150-5850 MHz)",
        ranges: &[(5150.0, 5350.0), (5470.0, 5850.0)],
        step_khz: 20000.0,
        description: "5 GHz WiFi Bands",
    },
];

impl ScanProfile {
    /// Look up a profile by id, case-insensitively
    pub fn by_id(id: &str) -> Option<&'static ScanProfile> {
        SCAN_PROFILES
            .iter()
            .find(|profile| profile.id.eq_ignore_ascii_case(id.trim()))
    }

    pub fn all() -> &'static [ScanProfile] {
        SCAN_PROFILES
    }

    /// Whether a frequency in Hz falls inside any of the profile's ranges
    pub fn contains_hz(&self, frequency_hz: f64) -> bool {
        let mhz = frequency_hz / 1e6;
        self.ranges
            .iter()
            .any(|&(start, end)| mhz >= start && mhz <= end)
    }

    /// Midpoint of the first range, in Hz
    pub fn center_hz(&self) -> f64 {
        let (start, end) = self.ranges[0];
        (start + end) / 2.0 * 1e6
    }
}
