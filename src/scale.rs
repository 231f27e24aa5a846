//! Magnitude color scales and the legend derived from them.
//!
//! A [`ColorScale`] is the single source of truth for both marker fill colors
//! and legend rows, so the two cannot disagree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::SeismomapError;

/// A CSS hex color (`#rgb` or `#rrggbb`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColorToken(String);

impl ColorToken {
    /// Parse a hex color token.
    ///
    /// # Errors
    ///
    /// Returns [`SeismomapError::Config`] if `s` is not `#` followed by 3 or
    /// 6 hex digits.
    pub fn parse(s: &str) -> Result<Self, SeismomapError> {
        let digits = s.strip_prefix('#').unwrap_or("");
        let valid = matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(SeismomapError::Config(format!(
                "invalid color '{s}' (expected #rgb or #rrggbb)"
            )));
        }
        Ok(Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Red, green and blue components.
    #[must_use]
    pub fn rgb(&self) -> (u8, u8, u8) {
        let digits = &self.0[1..];
        let channel = |i: usize, width: usize| {
            let v = u8::from_str_radix(&digits[i * width..(i + 1) * width], 16).unwrap_or(0);
            if width == 1 { v * 17 } else { v }
        };
        let width = digits.len() / 3;
        (channel(0, width), channel(1, width), channel(2, width))
    }
}

impl TryFrom<String> for ColorToken {
    type Error = SeismomapError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ColorToken> for String {
    fn from(c: ColorToken) -> Self {
        c.0
    }
}

impl fmt::Display for ColorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One bucket boundary: magnitudes strictly above `threshold` get `color`
/// unless a higher step already matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleStep {
    pub threshold: f64,
    pub color: ColorToken,
}

/// Ordered magnitude-to-color table.
///
/// Steps are strictly descending by threshold; `floor` catches everything at
/// or below the lowest threshold, so every input maps to exactly one color.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorScale {
    steps: Vec<ScaleStep>,
    floor: ColorToken,
    legend_floor: f64,
}

impl ColorScale {
    /// Build a scale, checking the ordering invariant.
    ///
    /// # Errors
    ///
    /// Returns [`SeismomapError::Config`] if a threshold is not finite, the
    /// thresholds are not strictly descending, or `legend_floor` is not below
    /// the lowest threshold.
    pub fn new(
        steps: Vec<ScaleStep>,
        floor: ColorToken,
        legend_floor: f64,
    ) -> Result<Self, SeismomapError> {
        if let Some(step) = steps.iter().find(|s| !s.threshold.is_finite()) {
            return Err(SeismomapError::Config(format!(
                "scale threshold {} is not finite",
                step.threshold
            )));
        }
        if let Some(pair) = steps.windows(2).find(|w| w[0].threshold <= w[1].threshold) {
            return Err(SeismomapError::Config(format!(
                "scale thresholds must be strictly descending ({} then {})",
                pair[0].threshold, pair[1].threshold
            )));
        }
        if !legend_floor.is_finite() {
            return Err(SeismomapError::Config("legend floor is not finite".into()));
        }
        if let Some(lowest) = steps.last() {
            if legend_floor >= lowest.threshold {
                return Err(SeismomapError::Config(format!(
                    "legend floor {legend_floor} must be below the lowest threshold {}",
                    lowest.threshold
                )));
            }
        }
        Ok(Self {
            steps,
            floor,
            legend_floor,
        })
    }

    /// Number of buckets, including the catch-all.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len() + 1
    }

    /// Always false: the catch-all bucket exists in every scale.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn steps(&self) -> &[ScaleStep] {
        &self.steps
    }

    #[must_use]
    pub fn floor(&self) -> &ColorToken {
        &self.floor
    }

    #[must_use]
    pub fn legend_floor(&self) -> f64 {
        self.legend_floor
    }
}

/// Built-in palettes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Six warm buckets on whole magnitudes
    #[default]
    Classic,
    /// Five buckets at the 3 / 4.5 / 6 / 7 severity boundaries
    Severity,
}

const CLASSIC: (&[(f64, &str)], &str) = (
    &[
        (5.0, "#F06B6B"),
        (4.0, "#F0A76B"),
        (3.0, "#F3BA4D"),
        (2.0, "#F3DB4D"),
        (1.0, "#E2F350"),
    ],
    "#B7F34D",
);

const SEVERITY: (&[(f64, &str)], &str) = (
    &[
        (7.0, "#ef4444"),
        (6.0, "#f97316"),
        (4.5, "#06b6d4"),
        (3.0, "#10b981"),
    ],
    "#6b7280",
);

impl Preset {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Severity => "severity",
        }
    }

    /// Materialize the preset table.
    #[must_use]
    pub fn scale(self) -> ColorScale {
        let (steps, floor) = match self {
            Self::Classic => CLASSIC,
            Self::Severity => SEVERITY,
        };
        // Built-in tables are sorted and well-formed; see the preset tests.
        ColorScale {
            steps: steps
                .iter()
                .map(|&(threshold, color)| ScaleStep {
                    threshold,
                    color: ColorToken(color.to_string()),
                })
                .collect(),
            floor: ColorToken(floor.to_string()),
            legend_floor: 0.0,
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classic" => Ok(Self::Classic),
            "severity" => Ok(Self::Severity),
            _ => Err(format!("unknown color preset: {s} (expected: classic, severity)")),
        }
    }
}

/// Select the fill color for a magnitude.
///
/// Scans thresholds from the top and takes the first one strictly below `m`,
/// so a magnitude sitting exactly on a threshold lands in the bucket under it.
#[must_use]
pub fn compute_color(magnitude: f64, scale: &ColorScale) -> &ColorToken {
    scale
        .steps
        .iter()
        .find(|step| magnitude > step.threshold)
        .map_or(&scale.floor, |step| &step.color)
}

/// One legend row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: ColorToken,
    pub low: f64,
    /// `None` for the open-ended top bucket
    pub high: Option<f64>,
}

/// Derive legend rows from a scale, lowest bucket first.
#[must_use]
pub fn build_legend_entries(scale: &ColorScale) -> Vec<LegendEntry> {
    let mut entries = Vec::with_capacity(scale.len());

    // Ascending walk: floor bucket, then steps from lowest to highest.
    let mut low = scale.legend_floor;
    let mut color = &scale.floor;
    for step in scale.steps.iter().rev() {
        entries.push(LegendEntry {
            label: format!("{low}\u{2013}{}", step.threshold),
            color: color.clone(),
            low,
            high: Some(step.threshold),
        });
        low = step.threshold;
        color = &step.color;
    }
    entries.push(LegendEntry {
        label: format!("{low}+"),
        color: color.clone(),
        low,
        high: None,
    });

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classic() -> ColorScale {
        Preset::Classic.scale()
    }

    #[test]
    fn test_presets_are_valid() {
        for preset in [Preset::Classic, Preset::Severity] {
            let scale = preset.scale();
            let rebuilt = ColorScale::new(
                scale.steps().to_vec(),
                ColorToken::parse(scale.floor().as_str()).unwrap(),
                scale.legend_floor(),
            )
            .unwrap();
            assert_eq!(rebuilt, scale);
            for step in scale.steps() {
                assert!(ColorToken::parse(step.color.as_str()).is_ok());
            }
        }
        assert_eq!(Preset::Classic.scale().len(), 6);
        assert_eq!(Preset::Severity.scale().len(), 5);
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("classic".parse::<Preset>().unwrap(), Preset::Classic);
        assert_eq!("SEVERITY".parse::<Preset>().unwrap(), Preset::Severity);
        assert!("rainbow".parse::<Preset>().is_err());
    }

    #[test]
    fn test_color_interior_bucket() {
        // 4 < 4.7 <= 5
        assert_eq!(compute_color(4.7, &classic()).as_str(), "#F0A76B");
    }

    #[test]
    fn test_color_threshold_ties_go_below() {
        let scale = classic();
        assert_eq!(compute_color(5.0, &scale).as_str(), "#F0A76B");
        assert_eq!(compute_color(5.000_001, &scale).as_str(), "#F06B6B");
        assert_eq!(compute_color(1.0, &scale).as_str(), "#B7F34D");
    }

    #[test]
    fn test_color_extremes() {
        let scale = classic();
        assert_eq!(compute_color(9.5, &scale).as_str(), "#F06B6B");
        assert_eq!(compute_color(-2.0, &scale).as_str(), "#B7F34D");
        assert_eq!(compute_color(f64::NEG_INFINITY, &scale).as_str(), "#B7F34D");
        assert_eq!(compute_color(f64::NAN, &scale).as_str(), "#B7F34D");
    }

    #[test]
    fn test_severity_preset() {
        let scale = Preset::Severity.scale();
        assert_eq!(compute_color(7.1, &scale).as_str(), "#ef4444");
        assert_eq!(compute_color(4.6, &scale).as_str(), "#06b6d4");
        assert_eq!(compute_color(4.5, &scale).as_str(), "#10b981");
        assert_eq!(compute_color(2.0, &scale).as_str(), "#6b7280");
    }

    #[test]
    fn test_color_is_monotone_step() {
        // Bucket index never decreases as magnitude grows.
        let scale = classic();
        let rank = |c: &ColorToken| {
            build_legend_entries(&scale)
                .iter()
                .position(|e| &e.color == c)
                .unwrap()
        };
        let mut prev = 0;
        for i in -40..=100 {
            let m = f64::from(i) / 10.0;
            let r = rank(compute_color(m, &scale));
            assert!(r >= prev, "bucket dropped at m={m}");
            prev = r;
        }
    }

    #[test]
    fn test_legend_labels() {
        let labels: Vec<String> = build_legend_entries(&classic())
            .into_iter()
            .map(|e| e.label)
            .collect();
        assert_eq!(
            labels,
            ["0\u{2013}1", "1\u{2013}2", "2\u{2013}3", "3\u{2013}4", "4\u{2013}5", "5+"]
        );

        let severity = build_legend_entries(&Preset::Severity.scale());
        assert_eq!(severity[1].label, "3\u{2013}4.5");
        assert_eq!(severity[4].label, "7+");
    }

    #[test]
    fn test_legend_agrees_with_coloring() {
        for preset in [Preset::Classic, Preset::Severity] {
            let scale = preset.scale();
            let legend = build_legend_entries(&scale);
            assert_eq!(legend.len(), scale.len());
            for entry in &legend {
                let sample = entry.high.map_or(entry.low + 1.0, |h| (entry.low + h) / 2.0);
                assert_eq!(compute_color(sample, &scale), &entry.color, "{}", entry.label);
            }
        }
    }

    #[test]
    fn test_floor_only_scale() {
        let scale = ColorScale::new(vec![], ColorToken::parse("#000").unwrap(), 0.0).unwrap();
        assert_eq!(scale.len(), 1);
        assert_eq!(compute_color(3.0, &scale).as_str(), "#000");
        let legend = build_legend_entries(&scale);
        assert_eq!(legend.len(), 1);
        assert_eq!(legend[0].label, "0+");
    }

    #[test]
    fn test_scale_rejects_unsorted() {
        let step = |t: f64| ScaleStep {
            threshold: t,
            color: ColorToken::parse("#fff").unwrap(),
        };
        let floor = ColorToken::parse("#000").unwrap();
        assert!(ColorScale::new(vec![step(2.0), step(3.0)], floor.clone(), 0.0).is_err());
        assert!(ColorScale::new(vec![step(2.0), step(2.0)], floor.clone(), 0.0).is_err());
        assert!(ColorScale::new(vec![step(f64::NAN)], floor.clone(), 0.0).is_err());
        assert!(ColorScale::new(vec![step(1.0)], floor, 1.0).is_err());
    }

    #[test]
    fn test_color_token_parse() {
        assert!(ColorToken::parse("#F06B6B").is_ok());
        assert!(ColorToken::parse("#abc").is_ok());
        assert!(ColorToken::parse("F06B6B").is_err());
        assert!(ColorToken::parse("#GG0000").is_err());
        assert!(ColorToken::parse("#1234").is_err());
    }

    #[test]
    fn test_color_token_rgb() {
        assert_eq!(ColorToken::parse("#F06B6B").unwrap().rgb(), (0xF0, 0x6B, 0x6B));
        assert_eq!(ColorToken::parse("#fa0").unwrap().rgb(), (0xFF, 0xAA, 0x00));
    }

    #[test]
    fn test_color_token_serde() {
        let c: ColorToken = serde_json::from_str("\"#10b981\"").unwrap();
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"#10b981\"");
        assert!(serde_json::from_str::<ColorToken>("\"red\"").is_err());
    }
}
