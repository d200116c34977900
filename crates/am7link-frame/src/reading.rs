use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Particle counts per size bin (particles above the given diameter).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParticleCounts {
    /// > 0.3 µm
    pub pc03: u16,
    /// > 0.5 µm
    pub pc05: u16,
    /// > 1.0 µm
    pub pc10: u16,
    /// > 2.5 µm
    pub pc25: u16,
    /// > 5.0 µm
    pub pc50: u16,
    /// > 10 µm
    pub pc100: u16,
}

impl ParticleCounts {
    /// Bins in wire order.
    pub fn to_array(&self) -> [u16; 6] {
        [
            self.pc03, self.pc05, self.pc10, self.pc25, self.pc50, self.pc100,
        ]
    }

    pub fn from_array(bins: [u16; 6]) -> Self {
        let [pc03, pc05, pc10, pc25, pc50, pc100] = bins;
        Self {
            pc03,
            pc05,
            pc10,
            pc25,
            pc50,
            pc100,
        }
    }
}

/// Telemetry carried only by long frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtendedTelemetry {
    /// 0 = on battery, 1 = charging.
    pub battery_status: u8,
    /// Battery bars, 1-4.
    pub battery_level: u8,
    /// Cumulative runtime.
    pub runtime_hours: u16,
    pub particle_counts: ParticleCounts,
}

impl ExtendedTelemetry {
    pub fn is_charging(&self) -> bool {
        self.battery_status == 1
    }
}

/// Field values exactly as they appear on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub pm25: u16,
    pub pm10: u16,
    /// mg/m³ × 1000
    pub hcho: u16,
    /// mg/m³ × 1000
    pub tvoc: u16,
    pub co2: u16,
    /// °C × 100
    pub temperature: i16,
    /// % × 100
    pub humidity: u16,
    /// Present for long (checksummed) frames.
    pub extended: Option<ExtendedTelemetry>,
}

/// One validated sensor reading.
///
/// Only produced by frame parsing, after the checksum (when present) and the
/// non-zero CO2 check have passed. Scaled values are derived from the stored
/// wire values, so equal frames always give equal readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReading {
    raw: RawFrame,
}

impl SensorReading {
    pub(crate) fn from_validated(raw: RawFrame) -> Self {
        Self { raw }
    }

    /// PM2.5 in µg/m³.
    pub fn pm25(&self) -> u16 {
        self.raw.pm25
    }

    /// PM10 in µg/m³.
    pub fn pm10(&self) -> u16 {
        self.raw.pm10
    }

    /// Formaldehyde in mg/m³.
    pub fn hcho(&self) -> f32 {
        f32::from(self.raw.hcho) / 1000.0
    }

    /// Total volatile organic compounds in mg/m³.
    pub fn tvoc(&self) -> f32 {
        f32::from(self.raw.tvoc) / 1000.0
    }

    /// CO2 in ppm. Never zero.
    pub fn co2(&self) -> u16 {
        self.raw.co2
    }

    /// Temperature in °C.
    pub fn temperature(&self) -> f32 {
        f32::from(self.raw.temperature) / 100.0
    }

    /// Relative humidity in %.
    pub fn humidity(&self) -> f32 {
        f32::from(self.raw.humidity) / 100.0
    }

    pub fn extended(&self) -> Option<&ExtendedTelemetry> {
        self.raw.extended.as_ref()
    }

    /// Whether the reading came from a long, checksummed frame.
    pub fn is_long_frame(&self) -> bool {
        self.raw.extended.is_some()
    }

    /// The wire values this reading was decoded from.
    pub fn raw(&self) -> &RawFrame {
        &self.raw
    }
}

impl Serialize for SensorReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SensorReading", 8)?;
        state.serialize_field("pm25", &self.pm25())?;
        state.serialize_field("pm10", &self.pm10())?;
        state.serialize_field("hcho", &self.hcho())?;
        state.serialize_field("tvoc", &self.tvoc())?;
        state.serialize_field("co2", &self.co2())?;
        state.serialize_field("temperature", &self.temperature())?;
        state.serialize_field("humidity", &self.humidity())?;
        state.serialize_field("extended", &self.raw.extended)?;
        state.end()
    }
}
