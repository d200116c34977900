use std::io::IsTerminal;

use am7link::frame::{DecoderStats, SensorReading};
use am7link::telemetry::StatusDocument;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

const READING_HEADER: [&str; 8] = [
    "CO2", "PM2.5", "PM10", "TEMP", "HUMIDITY", "TVOC", "HCHO", "BATTERY",
];

fn reading_row(reading: &SensorReading) -> Vec<String> {
    vec![
        format!("{} ppm", reading.co2()),
        format!("{} µg/m³", reading.pm25()),
        format!("{} µg/m³", reading.pm10()),
        format!("{:.2} °C", reading.temperature()),
        format!("{:.2} %", reading.humidity()),
        format!("{:.3} mg/m³", reading.tvoc()),
        format!("{:.3} mg/m³", reading.hcho()),
        battery_label(reading),
    ]
}

fn battery_label(reading: &SensorReading) -> String {
    match reading.extended() {
        Some(ext) if ext.is_charging() => format!("{}/4 charging", ext.battery_level),
        Some(ext) => format!("{}/4", ext.battery_level),
        None => "-".to_string(),
    }
}

fn pretty_reading(reading: &SensorReading) -> String {
    format!(
        "co2={} pm25={} pm10={} temp={:.2} humidity={:.2} tvoc={:.3} hcho={:.3} battery={}",
        reading.co2(),
        reading.pm25(),
        reading.pm10(),
        reading.temperature(),
        reading.humidity(),
        reading.tvoc(),
        reading.hcho(),
        battery_label(reading)
    )
}

fn to_json(value: &impl Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

pub fn print_status(status: &StatusDocument, reading: Option<&SensorReading>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json(status)),
        OutputFormat::Table => {
            let mut header = vec!["STATE", "CONNECTED", "LAST RX"];
            header.extend(READING_HEADER);
            let mut row = vec![
                status.state.to_string(),
                status.connected.to_string(),
                format!("{}s", status.last_rx_sec),
            ];
            match reading {
                Some(reading) => row.extend(reading_row(reading)),
                None => row.extend(READING_HEADER.iter().map(|_| "-".to_string())),
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(header)
                .add_row(row);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let data = reading.map(pretty_reading).unwrap_or_else(|| "no data".to_string());
            println!(
                "state={} connected={} last_rx={}s {}",
                status.state, status.connected, status.last_rx_sec, data
            );
        }
    }
}

#[derive(Serialize)]
struct DecodeOutput<'a> {
    readings: &'a [SensorReading],
    stats: &'a DecoderStats,
}

pub fn print_readings(readings: &[SensorReading], stats: &DecoderStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json(&DecodeOutput { readings, stats })),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(READING_HEADER.to_vec());
            for reading in readings {
                table.add_row(reading_row(reading));
            }
            println!("{table}");
            println!(
                "{} accepted, {} rejected, {} noise bytes",
                stats.frames,
                stats.rejected(),
                stats.noise_bytes
            );
        }
        OutputFormat::Pretty => {
            for reading in readings {
                println!("{}", pretty_reading(reading));
            }
            println!(
                "accepted={} rejected={} noise_bytes={}",
                stats.frames,
                stats.rejected(),
                stats.noise_bytes
            );
        }
    }
}

#[derive(Serialize)]
struct RequestOutput {
    command: String,
    len: usize,
}

pub fn print_request(bytes: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            to_json(&RequestOutput {
                command: hex::encode(bytes),
                len: bytes.len(),
            })
        ),
        OutputFormat::Table | OutputFormat::Pretty => println!("{}", spaced_hex(bytes)),
    }
}

/// Upper-case hex bytes separated by spaces (`55 CD 47 ...`).
pub fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use am7link::frame::REQUEST_COMMAND;

    #[test]
    fn spaced_hex_matches_protocol_notation() {
        assert_eq!(
            spaced_hex(&REQUEST_COMMAND),
            "55 CD 47 00 00 00 00 00 00 01 69 0D 0A"
        );
    }

    #[test]
    fn decode_output_serializes() {
        let stats = DecoderStats::default();
        let json = to_json(&DecodeOutput {
            readings: &[],
            stats: &stats,
        });
        assert!(json.contains("\"readings\":[]"));
        assert!(json.contains("\"frames\":0"));
    }
}
