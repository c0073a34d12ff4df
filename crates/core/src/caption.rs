//! Caption overlay settings and `drawtext` filter construction.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Font family class for captions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontStyle {
    Gothic,
    #[default]
    Mincho,
}

/// Caption appearance shared by every scene of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionSettings {
    pub enabled: bool,
    pub font_size: u32,
    pub font_style: FontStyle,
    pub font_color: String,
    pub shadow_color: String,
    /// Shadow alpha in `0.0..=1.0`.
    pub shadow_opacity: f64,
    /// Shadow offset length in pixels.
    pub shadow_distance: f64,
    /// Shadow direction in degrees, counter-clockwise from the x axis.
    pub shadow_angle: f64,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            font_size: 48,
            font_style: FontStyle::Mincho,
            font_color: "white".into(),
            shadow_color: "black".into(),
            shadow_opacity: 0.4,
            shadow_distance: 5.0,
            shadow_angle: -45.0,
        }
    }
}

impl CaptionSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.font_size == 0 || self.font_size > 400 {
            return Err(CoreError::Validation(format!(
                "font_size {} out of range 1..=400",
                self.font_size
            )));
        }
        if !(0.0..=1.0).contains(&self.shadow_opacity) {
            return Err(CoreError::Validation(
                "shadow_opacity must be within 0.0..=1.0".into(),
            ));
        }
        if !self.shadow_distance.is_finite() || self.shadow_distance < 0.0 {
            return Err(CoreError::Validation(
                "shadow_distance must be a non-negative number".into(),
            ));
        }
        if !self.shadow_angle.is_finite() {
            return Err(CoreError::Validation("shadow_angle must be finite".into()));
        }
        for (field, color) in [
            ("font_color", &self.font_color),
            ("shadow_color", &self.shadow_color),
        ] {
            if !is_plain_color(color) {
                return Err(CoreError::Validation(format!(
                    "{field} '{color}' is not a color name or hex value"
                )));
            }
        }
        Ok(())
    }

    /// Cartesian shadow offset in screen pixels (y grows downward).
    pub fn shadow_offset(&self) -> (i32, i32) {
        shadow_offset(self.shadow_distance, self.shadow_angle)
    }
}

/// Color names reach the filter graph unquoted, so only `[A-Za-z0-9#]`
/// is allowed.
fn is_plain_color(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '#')
}

/// Convert a polar `(distance, angle_degrees)` shadow into a pixel offset.
///
/// Components are truncated toward zero.
pub fn shadow_offset(distance: f64, angle_degrees: f64) -> (i32, i32) {
    let rad = angle_degrees.to_radians();
    let dx = (distance * rad.cos()).trunc() as i32;
    let dy = (-distance * rad.sin()).trunc() as i32;
    (dx, dy)
}

/// Escape text for the `drawtext` filter.
///
/// Order matters: backslashes first so later escapes are not doubled.
pub fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

/// Build a centered `drawtext` filter with a drop shadow.
pub fn drawtext_filter(text: &str, settings: &CaptionSettings, font_file: Option<&Path>) -> String {
    let (dx, dy) = settings.shadow_offset();
    let mut filter = format!(
        "drawtext=text='{}':x=(w-tw)/2:y=(h-th)/2:fontsize={}:fontcolor={}:shadowcolor={}@{}:shadowx={dx}:shadowy={dy}",
        escape_drawtext(text),
        settings.font_size,
        settings.font_color,
        settings.shadow_color,
        settings.shadow_opacity,
    );
    if let Some(font) = font_file {
        filter.push_str(&format!(":fontfile='{}'", font.display()));
    }
    filter
}

/// Font files to try for a style on the current platform.
pub fn font_candidates(style: FontStyle) -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        match style {
            FontStyle::Mincho => &[
                "/System/Library/Fonts/ヒラギノ明朝 ProN.ttc",
                "/System/Library/Fonts/ヒラギノ明朝 ProN W6.ttc",
                "/Library/Fonts/Yu Mincho.ttc",
            ],
            FontStyle::Gothic => &[
                "/System/Library/Fonts/ヒラギノ角ゴシック W6.ttc",
                "/System/Library/Fonts/ヒラギノ角ゴシック W3.ttc",
                "/Library/Fonts/Arial Unicode.ttf",
            ],
        }
    } else if cfg!(target_os = "windows") {
        match style {
            FontStyle::Mincho => &["C:/Windows/Fonts/msmincho.ttc", "C:/Windows/Fonts/YuMincho.ttf"],
            FontStyle::Gothic => &["C:/Windows/Fonts/msgothic.ttc", "C:/Windows/Fonts/meiryo.ttc"],
        }
    } else {
        match style {
            FontStyle::Mincho => &[
                "/usr/share/fonts/opentype/noto/NotoSerifCJK-Regular.ttc",
                "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
                "/usr/share/fonts/truetype/fonts-japanese-mincho.ttf",
            ],
            FontStyle::Gothic => &[
                "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
                "/usr/share/fonts/truetype/fonts-japanese-gothic.ttf",
            ],
        }
    }
}

/// First existing font file for the style, if any.
pub fn resolve_font(style: FontStyle) -> Option<PathBuf> {
    font_candidates(style)
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
