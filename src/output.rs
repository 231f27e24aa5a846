//! Output formatters for render documents.
//!
//! Supports human-readable (with colors), JSON, GeoJSON, and NDJSON formats.

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::pipeline::RenderDocument;
use crate::scale::{ColorToken, LegendEntry};
use crate::styler::StyledMarker;

// ANSI codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const YELLOW: &str = "\x1b[93m";

const ICON_QUAKE: &str = "🌍";
const ICON_ALERT: &str = "⚠️";
const SWATCH: &str = "●";

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// The full render document as JSON
    Json,
    /// One GeoJSON FeatureCollection with styled properties
    Geojson,
    /// Newline-delimited JSON (one marker per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "geojson" => Ok(Self::Geojson),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!(
                "unknown format: {s} (expected: human, json, geojson, ndjson)"
            )),
        }
    }
}

/// Truecolor foreground escape for a hex token.
fn ansi_fg(color: &ColorToken) -> String {
    let (r, g, b) = color.rgb();
    format!("\x1b[38;2;{r};{g};{b}m")
}

fn to_io(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Write legend rows with color swatches.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_legend<W: Write>(writer: &mut W, legend: &[LegendEntry]) -> io::Result<()> {
    for entry in legend {
        writeln!(
            writer,
            "  {fg}{SWATCH}{RESET} {label:<8} {DIM}{color}{RESET}",
            fg = ansi_fg(&entry.color),
            label = entry.label,
            color = entry.color,
        )?;
    }
    Ok(())
}

fn write_marker_line<W: Write>(writer: &mut W, marker: &StyledMarker) -> io::Result<()> {
    let popup = &marker.popup;
    let (lat, lon) = marker.position;
    let depth = marker
        .depth
        .map_or_else(|| "   ?".to_string(), |d| format!("{d:>4.0}"));
    writeln!(
        writer,
        "  {fg}{SWATCH}{RESET} {BOLD}M{mag:<4.1}{RESET} │ r={radius:<5.1} │ {DIM}{depth}km{RESET} │ \
         {lat:>7.2}, {lon:>8.2} │ {time} │ {place}",
        fg = ansi_fg(&marker.fill_color),
        mag = popup.magnitude,
        radius = marker.radius,
        time = popup.time_label(),
        place = popup.place,
    )
}

/// Write the document for a terminal.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_human<W: Write>(writer: &mut W, doc: &RenderDocument) -> io::Result<()> {
    writeln!(
        writer,
        "{ICON_QUAKE} {BOLD}{}{RESET} {DIM}│ scale: {} │ {} markers{RESET}",
        doc.overlay_group,
        doc.scale,
        doc.marker_count()
    )?;

    for layer in &doc.layers {
        writeln!(writer)?;
        writeln!(
            writer,
            "{BOLD}{}{RESET} {DIM}({} markers, {} skipped){RESET}",
            layer.name,
            layer.markers.len(),
            layer.skipped
        )?;
        for marker in &layer.markers {
            write_marker_line(writer, marker)?;
        }
    }

    writeln!(writer)?;
    writeln!(writer, "{BOLD}Legend{RESET}")?;
    write_legend(writer, &doc.legend)?;

    let failures: Vec<_> = doc
        .diagnostics
        .iter()
        .filter(|d| d.index.is_none())
        .collect();
    if !failures.is_empty() {
        writeln!(writer)?;
        for d in failures {
            writeln!(
                writer,
                "{YELLOW}{ICON_ALERT} layer '{}' unavailable: {}{RESET}",
                d.layer, d.message
            )?;
        }
    }
    Ok(())
}

/// Write the full render document as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write>(writer: &mut W, doc: &RenderDocument) -> io::Result<()> {
    let json = serde_json::to_string_pretty(doc).map_err(to_io)?;
    writeln!(writer, "{json}")
}

/// GeoJSON Feature for one styled marker.
#[must_use]
pub fn marker_feature(layer: &str, marker: &StyledMarker) -> Value {
    let (lat, lon) = marker.position;
    let mut coordinates = vec![lon, lat];
    coordinates.extend(marker.depth);

    let mut feature = json!({
        "type": "Feature",
        "geometry": { "type": "Point", "coordinates": coordinates },
        "properties": {
            "layer": layer,
            "radius": marker.radius,
            "fillColor": marker.fill_color,
            "place": marker.popup.place,
            "time": marker.popup.time_millis,
            "timeUtc": marker.popup.time().map(|t| t.to_rfc3339()),
            "mag": marker.popup.magnitude,
        }
    });
    if let Some(id) = &marker.id {
        feature["id"] = json!(id);
    }
    feature
}

/// FeatureCollection for `(layer, marker)` rows, legend attached as a
/// foreign member.
#[must_use]
pub fn feature_collection(rows: &[(&str, &StyledMarker)], legend: &[LegendEntry]) -> Value {
    let features: Vec<Value> = rows.iter().map(|(layer, m)| marker_feature(layer, m)).collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
        "legend": legend,
    })
}

/// Markers in output order: all of them, or the de-duplicated union.
fn rows(doc: &RenderDocument, union: bool) -> Vec<(&str, &StyledMarker)> {
    if union { doc.union() } else { doc.markers() }
}

/// Write all layers as a single GeoJSON FeatureCollection.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_geojson<W: Write>(
    writer: &mut W,
    doc: &RenderDocument,
    union: bool,
) -> io::Result<()> {
    let collection = feature_collection(&rows(doc, union), &doc.legend);
    let json = serde_json::to_string(&collection).map_err(to_io)?;
    writeln!(writer, "{json}")
}

/// Write one marker per line.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_ndjson<W: Write>(
    writer: &mut W,
    doc: &RenderDocument,
    union: bool,
) -> io::Result<()> {
    for (layer, marker) in rows(doc, union) {
        let mut line = serde_json::to_value(marker).map_err(to_io)?;
        line["layer"] = json!(layer);
        let json = serde_json::to_string(&line).map_err(to_io)?;
        writeln!(writer, "{json}")?;
    }
    Ok(())
}

/// Write the document in the specified format.
///
/// `union` collapses events repeated across layers; it applies to the
/// marker-per-feature formats (`geojson`, `ndjson`) only.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_document<W: Write>(
    writer: &mut W,
    doc: &RenderDocument,
    format: Format,
    union: bool,
) -> io::Result<()> {
    match format {
        Format::Human => write_human(writer, doc),
        Format::Json => write_json(writer, doc),
        Format::Geojson => write_geojson(writer, doc, union),
        Format::Ndjson => write_ndjson(writer, doc, union),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::{MapView, MarkerStyle};
    use crate::pipeline::{Diagnostic, DiagnosticKind, StyledLayer};
    use crate::scale::{Preset, build_legend_entries};
    use crate::styler::Popup;

    fn marker(id: &str, mag: f64, color: &str) -> StyledMarker {
        StyledMarker {
            id: Some(id.into()),
            position: (61.2, -149.9),
            depth: Some(33.0),
            radius: mag * 3.0,
            fill_color: ColorToken::parse(color).unwrap(),
            popup: Popup {
                place: "Anchorage, Alaska".into(),
                time_millis: 1_700_000_000_000,
                magnitude: mag,
            },
        }
    }

    fn document() -> RenderDocument {
        RenderDocument {
            generated: Utc.timestamp_millis_opt(0).unwrap(),
            tile_url: "https://tiles.example/{z}/{x}/{y}.png".into(),
            overlay_group: "Earthquake types".into(),
            view: MapView::default(),
            marker_style: MarkerStyle::default(),
            scale: "classic",
            layers: vec![StyledLayer {
                name: "All: 1 day".into(),
                source: "https://example/all_day.geojson".into(),
                markers: vec![marker("ak1", 4.7, "#F0A76B"), marker("ak2", 1.5, "#E2F350")],
                skipped: 0,
            }],
            legend: build_legend_entries(&Preset::Classic.scale()),
            diagnostics: vec![Diagnostic {
                layer: "Significant: 30 days".into(),
                kind: DiagnosticKind::FetchFailure,
                index: None,
                message: "feed error (HTTP 503): down".into(),
            }],
        }
    }

    fn render(format: Format) -> String {
        render_doc(&document(), format, false)
    }

    fn render_doc(doc: &RenderDocument, format: Format, union: bool) -> String {
        let mut buf = Vec::new();
        write_document(&mut buf, doc, format, union).unwrap();
        String::from_utf8(buf).unwrap()
    }

    /// A second layer repeating `ak1` next to a new event.
    fn overlapping_document() -> RenderDocument {
        let mut doc = document();
        doc.layers.push(StyledLayer {
            name: "Mag 4.5+: 30 days".into(),
            source: "https://example/4.5_month.geojson".into(),
            markers: vec![marker("ak1", 4.7, "#F0A76B"), marker("hv9", 4.9, "#F0A76B")],
            skipped: 0,
        });
        doc
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("human".parse::<Format>().unwrap(), Format::Human);
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("GeoJSON".parse::<Format>().unwrap(), Format::Geojson);
        assert_eq!("ndjson".parse::<Format>().unwrap(), Format::Ndjson);
        assert!("invalid".parse::<Format>().is_err());
    }

    #[test]
    fn test_human_output() {
        let out = render(Format::Human);
        assert!(out.contains("All: 1 day"));
        assert!(out.contains("Anchorage, Alaska"));
        assert!(out.contains("2023-11-14 22:13:20 UTC"));
        assert!(out.contains("\x1b[38;2;240;167;107m"));
        assert!(out.contains("5+"));
        assert!(out.contains("layer 'Significant: 30 days' unavailable"));
    }

    #[test]
    fn test_geojson_output() {
        let out = render(Format::Geojson);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        let first = &value["features"][0];
        assert_eq!(first["id"], "ak1");
        assert_eq!(first["geometry"]["coordinates"], json!([-149.9, 61.2, 33.0]));
        assert_eq!(first["properties"]["fillColor"], "#F0A76B");
        assert_eq!(first["properties"]["layer"], "All: 1 day");
        assert_eq!(first["properties"]["timeUtc"], "2023-11-14T22:13:20+00:00");
        assert_eq!(value["legend"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn test_ndjson_output() {
        let out = render(Format::Ndjson);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["id"], "ak2");
        assert_eq!(second["layer"], "All: 1 day");
        assert_eq!(second["fill_color"], "#E2F350");
    }

    #[test]
    fn test_union_collapses_repeated_events() {
        let doc = overlapping_document();

        let all: Value = serde_json::from_str(&render_doc(&doc, Format::Geojson, false)).unwrap();
        assert_eq!(all["features"].as_array().unwrap().len(), 4);

        let union: Value = serde_json::from_str(&render_doc(&doc, Format::Geojson, true)).unwrap();
        let ids: Vec<&str> = union["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["ak1", "ak2", "hv9"]);
        assert_eq!(union["features"][0]["properties"]["layer"], "All: 1 day");
        assert_eq!(union["features"][2]["properties"]["layer"], "Mag 4.5+: 30 days");

        let lines = render_doc(&doc, Format::Ndjson, true);
        assert_eq!(lines.lines().count(), 3);
    }

    #[test]
    fn test_json_output() {
        let out = render(Format::Json);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["tile_url"], "https://tiles.example/{z}/{x}/{y}.png");
        assert_eq!(value["diagnostics"][0]["kind"], "fetch_failure");
        assert_eq!(value["layers"][0]["markers"].as_array().unwrap().len(), 2);
    }
}
