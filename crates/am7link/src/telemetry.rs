//! Documents the gateway publishes about the sensor.
//!
//! - [`StatePayload`]: the compact reading sent on the telemetry bus.
//! - [`StatusDocument`]: everything known about the link, for a status page.
//! - [`discovery_messages`]: Home Assistant MQTT discovery configs, one per
//!   measurement.
//!
//! Transport to the bus is out of scope; anything implementing
//! [`TelemetrySink`] can carry the messages.

use std::io::Write;

use am7link_frame::SensorReading;
use am7link_poll::{LinkSnapshot, LinkState, ReadingHandle};
use serde::Serialize;
use tracing::{debug, trace};

/// Errors raised while building or publishing telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A document failed to serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The sink rejected the message.
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Telemetry-bus payload for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatePayload {
    pub temp: f32,
    pub humidity: f32,
    pub co2: u16,
    pub pm25: u16,
    pub pm10: u16,
    pub tvoc: f32,
    pub hcho: f32,
}

impl From<&SensorReading> for StatePayload {
    fn from(reading: &SensorReading) -> Self {
        Self {
            temp: reading.temperature(),
            humidity: reading.humidity(),
            co2: reading.co2(),
            pm25: reading.pm25(),
            pm10: reading.pm10(),
            tvoc: reading.tvoc(),
            hcho: reading.hcho(),
        }
    }
}

/// All reading fields, extended telemetry included when the sensor sends it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusData {
    pub pm25: u16,
    pub pm10: u16,
    pub hcho: f32,
    pub tvoc: f32,
    pub co2: u16,
    pub temp: f32,
    pub humidity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_hours: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc03: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc05: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc10: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc25: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc50: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pc100: Option<u16>,
}

impl From<&SensorReading> for StatusData {
    fn from(reading: &SensorReading) -> Self {
        let ext = reading.extended();
        let bins = ext.map(|e| e.particle_counts);
        Self {
            pm25: reading.pm25(),
            pm10: reading.pm10(),
            hcho: reading.hcho(),
            tvoc: reading.tvoc(),
            co2: reading.co2(),
            temp: reading.temperature(),
            humidity: reading.humidity(),
            battery_status: ext.map(|e| e.battery_status),
            battery_level: ext.map(|e| e.battery_level),
            runtime_hours: ext.map(|e| e.runtime_hours),
            pc03: bins.map(|b| b.pc03),
            pc05: bins.map(|b| b.pc05),
            pc10: bins.map(|b| b.pc10),
            pc25: bins.map(|b| b.pc25),
            pc50: bins.map(|b| b.pc50),
            pc100: bins.map(|b| b.pc100),
        }
    }
}

/// The status endpoint document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusDocument {
    pub version: &'static str,
    pub connected: bool,
    pub state: LinkState,
    pub last_rx_sec: u32,
    /// Absent until the first frame has been accepted.
    pub data: Option<StatusData>,
}

impl From<&LinkSnapshot> for StatusDocument {
    fn from(snapshot: &LinkSnapshot) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            connected: snapshot.connected,
            state: snapshot.state,
            last_rx_sec: snapshot.seconds_since_last_frame,
            data: snapshot.reading.as_ref().map(StatusData::from),
        }
    }
}

/// One measurement exposed to Home Assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    Temperature,
    Humidity,
    Co2,
    Pm25,
    Pm10,
    Tvoc,
    Hcho,
}

impl Measurement {
    pub const ALL: [Measurement; 7] = [
        Measurement::Temperature,
        Measurement::Humidity,
        Measurement::Co2,
        Measurement::Pm25,
        Measurement::Pm10,
        Measurement::Tvoc,
        Measurement::Hcho,
    ];

    /// Key in [`StatePayload`].
    pub fn key(self) -> &'static str {
        match self {
            Measurement::Temperature => "temp",
            Measurement::Humidity => "humidity",
            Measurement::Co2 => "co2",
            Measurement::Pm25 => "pm25",
            Measurement::Pm10 => "pm10",
            Measurement::Tvoc => "tvoc",
            Measurement::Hcho => "hcho",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Measurement::Temperature => "Temperature",
            Measurement::Humidity => "Humidity",
            Measurement::Co2 => "CO2",
            Measurement::Pm25 => "PM2.5",
            Measurement::Pm10 => "PM10",
            Measurement::Tvoc => "TVOC",
            Measurement::Hcho => "Formaldehyde",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Measurement::Temperature => "°C",
            Measurement::Humidity => "%",
            Measurement::Co2 => "ppm",
            Measurement::Pm25 | Measurement::Pm10 => "µg/m³",
            Measurement::Tvoc | Measurement::Hcho => "mg/m³",
        }
    }

    /// Home Assistant device class, where one fits the unit.
    pub fn device_class(self) -> Option<&'static str> {
        match self {
            Measurement::Temperature => Some("temperature"),
            Measurement::Humidity => Some("humidity"),
            Measurement::Co2 => Some("carbon_dioxide"),
            Measurement::Pm25 => Some("pm25"),
            Measurement::Pm10 => Some("pm10"),
            Measurement::Tvoc | Measurement::Hcho => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDevice {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: &'static str,
    pub manufacturer: &'static str,
    pub sw_version: &'static str,
}

/// Home Assistant sensor discovery config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryConfig {
    pub name: &'static str,
    pub unique_id: String,
    pub state_topic: String,
    pub value_template: String,
    pub unit_of_measurement: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    pub state_class: &'static str,
    pub device: DiscoveryDevice,
}

/// A discovery config and where it goes. Always published retained.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub config: DiscoveryConfig,
}

/// Discovery configs for every measurement of `device_id`.
pub fn discovery_messages(device_id: &str, state_topic: &str) -> Vec<DiscoveryMessage> {
    let device = DiscoveryDevice {
        identifiers: vec![device_id.to_string()],
        name: device_id.to_string(),
        model: "AM7 Gateway",
        manufacturer: "am7link",
        sw_version: env!("CARGO_PKG_VERSION"),
    };

    Measurement::ALL
        .iter()
        .map(|&m| {
            let unique_id = format!("{device_id}_{}", m.key());
            DiscoveryMessage {
                topic: format!("homeassistant/sensor/{unique_id}/config"),
                config: DiscoveryConfig {
                    name: m.name(),
                    unique_id,
                    state_topic: state_topic.to_string(),
                    value_template: format!("{{{{ value_json.{} }}}}", m.key()),
                    unit_of_measurement: m.unit(),
                    device_class: m.device_class(),
                    state_class: "measurement",
                    device: device.clone(),
                },
            }
        })
        .collect()
}

/// Default state topic for a device.
pub fn state_topic(device_id: &str) -> String {
    format!("am7/{device_id}/state")
}

/// Something that can carry messages to the telemetry bus.
pub trait TelemetrySink {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<()>;
}

/// Writes `topic payload` lines, e.g. to stdout.
#[derive(Debug)]
pub struct LineSink<W: Write> {
    writer: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TelemetrySink for LineSink<W> {
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        let flag = if retain { " (retained)" } else { "" };
        writeln!(self.writer, "{topic}{flag} {payload}")
            .and_then(|()| self.writer.flush())
            .map_err(|err| TelemetryError::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }
}

/// Publish the current reading if, and only if, the link is connected.
///
/// Returns whether anything was published.
pub fn publish_current(
    handle: &ReadingHandle,
    topic: &str,
    sink: &mut impl TelemetrySink,
) -> Result<bool> {
    let (reading, connected, age) = handle.get_current_reading();
    let Some(reading) = reading.filter(|_| connected) else {
        trace!(connected, "nothing to publish");
        return Ok(false);
    };
    let payload = serde_json::to_string(&StatePayload::from(&reading))?;
    sink.publish(topic, &payload, false)?;
    debug!(topic, age, "reading published");
    Ok(true)
}

/// Publish every discovery config, retained.
pub fn announce(device_id: &str, state_topic: &str, sink: &mut impl TelemetrySink) -> Result<()> {
    for message in discovery_messages(device_id, state_topic) {
        let payload = serde_json::to_string(&message.config)?;
        sink.publish(&message.topic, &payload, true)?;
    }
    debug!(device_id, "discovery configs published");
    Ok(())
}
