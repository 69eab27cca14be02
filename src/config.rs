//! The configuration descriptor (`ResTable_config`) attached to every type variant.

use std::fmt;

use log::{debug, warn};
use serde::Serialize;

use crate::err::{ResError, Result};
use crate::utils::ByteCursor;

pub const ORIENTATION_ANY: u8 = 0;
pub const ORIENTATION_PORT: u8 = 1;
pub const ORIENTATION_LAND: u8 = 2;
pub const ORIENTATION_SQUARE: u8 = 3;

pub const TOUCHSCREEN_ANY: u8 = 0;
pub const TOUCHSCREEN_NOTOUCH: u8 = 1;
pub const TOUCHSCREEN_STYLUS: u8 = 2;
pub const TOUCHSCREEN_FINGER: u8 = 3;

pub const DENSITY_DEFAULT: u16 = 0;
pub const DENSITY_LOW: u16 = 120;
pub const DENSITY_MEDIUM: u16 = 160;
pub const DENSITY_HIGH: u16 = 240;
pub const DENSITY_XHIGH: u16 = 320;
pub const DENSITY_NONE: u16 = 0xffff;

pub const KEYBOARD_ANY: u8 = 0;
pub const KEYBOARD_NOKEYS: u8 = 1;
pub const KEYBOARD_QWERTY: u8 = 2;
pub const KEYBOARD_12KEY: u8 = 3;

pub const NAVIGATION_ANY: u8 = 0;
pub const NAVIGATION_NONAV: u8 = 1;
pub const NAVIGATION_DPAD: u8 = 2;
pub const NAVIGATION_TRACKBALL: u8 = 3;
pub const NAVIGATION_WHEEL: u8 = 4;

pub const KEYSHIDDEN_MASK: u8 = 0x03;
pub const KEYSHIDDEN_NO: u8 = 0x01;
pub const KEYSHIDDEN_YES: u8 = 0x02;
pub const KEYSHIDDEN_SOFT: u8 = 0x03;
pub const NAVHIDDEN_MASK: u8 = 0x0c;
pub const NAVHIDDEN_NO: u8 = 0x04;
pub const NAVHIDDEN_YES: u8 = 0x08;

pub const SCREENSIZE_MASK: u8 = 0x0f;
pub const SCREENSIZE_SMALL: u8 = 0x01;
pub const SCREENSIZE_NORMAL: u8 = 0x02;
pub const SCREENSIZE_LARGE: u8 = 0x03;
pub const SCREENSIZE_XLARGE: u8 = 0x04;
pub const SCREENLONG_MASK: u8 = 0x30;
pub const SCREENLONG_NO: u8 = 0x10;
pub const SCREENLONG_YES: u8 = 0x20;

pub const UI_MODE_TYPE_MASK: u8 = 0x0f;
pub const UI_MODE_TYPE_NORMAL: u8 = 0x01;
pub const UI_MODE_TYPE_DESK: u8 = 0x02;
pub const UI_MODE_TYPE_CAR: u8 = 0x03;
pub const UI_MODE_TYPE_TELEVISION: u8 = 0x04;
pub const UI_MODE_NIGHT_MASK: u8 = 0x30;
pub const UI_MODE_NIGHT_NO: u8 = 0x10;
pub const UI_MODE_NIGHT_YES: u8 = 0x20;

/// Smallest record that carries every field up to `minorVersion`.
const MIN_SIZE: u32 = 28;

/// Device and locale qualifiers of one resource variant, or of the requested device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct ResTableConfig {
    pub size: u32,
    pub mcc: u16,
    pub mnc: u16,
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
    pub keyboard: u8,
    pub navigation: u8,
    pub input_flags: u8,
    pub screen_width: u16,
    pub screen_height: u16,
    pub sdk_version: u16,
    pub minor_version: u16,
    pub screen_layout: u8,
    pub ui_mode: u8,
    pub smallest_screen_width_dp: u16,
    pub screen_width_dp: u16,
    pub screen_height_dp: u16,
    /// Set when an enumerated field held an unknown value and was reset to "any".
    pub invalid: bool,
}

impl ResTableConfig {
    /// A request for the given screen density, everything else unspecified.
    pub fn with_density(density: u16) -> Self {
        ResTableConfig {
            size: 36,
            density,
            ..ResTableConfig::default()
        }
    }

    /// Decode a record at the cursor. The cursor ends just past the declared record size.
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let start = cursor.pos();
        let size = cursor.u32_named("config size")?;
        if size < MIN_SIZE {
            return Err(ResError::malformed(
                "config",
                start,
                format!("record size {size} is smaller than {MIN_SIZE}"),
            ));
        }

        let mut config = ResTableConfig {
            size,
            mcc: cursor.u16_named("config mcc")?,
            mnc: cursor.u16_named("config mnc")?,
            language: [cursor.u8()?, cursor.u8()?],
            country: [cursor.u8()?, cursor.u8()?],
            orientation: cursor.u8_named("config orientation")?,
            touchscreen: cursor.u8_named("config touchscreen")?,
            density: cursor.u16_named("config density")?,
            keyboard: cursor.u8_named("config keyboard")?,
            navigation: cursor.u8_named("config navigation")?,
            input_flags: cursor.u8_named("config input flags")?,
            ..ResTableConfig::default()
        };
        cursor.skip(1, "config padding")?;
        config.screen_width = cursor.u16_named("config screen width")?;
        config.screen_height = cursor.u16_named("config screen height")?;
        config.sdk_version = cursor.u16_named("config sdk version")?;
        config.minor_version = cursor.u16_named("config minor version")?;

        if size >= 32 {
            config.screen_layout = cursor.u8_named("config screen layout")?;
            config.ui_mode = cursor.u8_named("config ui mode")?;
            config.smallest_screen_width_dp = cursor.u16_named("config smallest width")?;
        }
        if size >= 36 {
            config.screen_width_dp = cursor.u16_named("config screen width dp")?;
            config.screen_height_dp = cursor.u16_named("config screen height dp")?;
        }

        let end = start + size as usize;
        if cursor.pos() < end {
            debug!(
                "config at offset {start}: skipping {} unknown trailing bytes",
                end - cursor.pos()
            );
            cursor.set_pos(end, "config trailing bytes")?;
        }

        config.sanitize(start);
        Ok(config)
    }

    fn sanitize(&mut self, offset: usize) {
        if self.orientation > ORIENTATION_SQUARE {
            self.orientation = ORIENTATION_ANY;
            self.invalid = true;
        }
        if self.touchscreen > TOUCHSCREEN_FINGER {
            self.touchscreen = TOUCHSCREEN_ANY;
            self.invalid = true;
        }
        if self.keyboard > KEYBOARD_12KEY {
            self.keyboard = KEYBOARD_ANY;
            self.invalid = true;
        }
        if self.navigation > NAVIGATION_WHEEL {
            self.navigation = NAVIGATION_ANY;
            self.invalid = true;
        }
        if self.invalid {
            warn!("config at offset {offset} has invalid qualifier values: {self}");
        }
    }

    /// True when a language or region qualifier is present.
    pub fn has_locale(&self) -> bool {
        self.language[0] != 0 || self.country[0] != 0
    }

    /// Whether `self` is a better match than `other` for `requested`.
    ///
    /// Only density takes part. Scaling a bitmap down is preferred over scaling it up: between
    /// a lower density `l` and a higher `h` around the request `r`, the lower one wins only
    /// when `(2*l - r) * h > r * r`.
    pub fn is_better_than(&self, other: &ResTableConfig, requested: Option<&ResTableConfig>) -> bool {
        let Some(requested) = requested else {
            return false;
        };
        if self.density == other.density {
            return false;
        }

        let mut h = effective_density(self.density);
        let mut l = effective_density(other.density);
        let mut i_am_bigger = true;
        if l > h {
            std::mem::swap(&mut h, &mut l);
            i_am_bigger = false;
        }

        let req = effective_density(requested.density);
        if req >= h {
            return i_am_bigger;
        }
        if l >= req {
            return !i_am_bigger;
        }
        if (2 * l - req) * h > req * req {
            !i_am_bigger
        } else {
            i_am_bigger
        }
    }

    /// Android qualifier suffix, e.g. `-mcc310-en-rUS-land-hdpi-v11`.
    pub fn qualifiers(&self) -> String {
        let mut out = String::new();
        if self.mcc != 0 {
            out.push_str(&format!("-mcc{}", self.mcc));
            if self.mnc != 0 {
                out.push_str(&format!("-mnc{}", self.mnc));
            }
        }
        if self.language[0] != 0 {
            out.push('-');
            out.push_str(&locale_part(&self.language));
            if self.country[0] != 0 {
                out.push_str("-r");
                out.push_str(&locale_part(&self.country));
            }
        }
        if self.smallest_screen_width_dp != 0 {
            out.push_str(&format!("-sw{}dp", self.smallest_screen_width_dp));
        }
        if self.screen_width_dp != 0 {
            out.push_str(&format!("-w{}dp", self.screen_width_dp));
        }
        if self.screen_height_dp != 0 {
            out.push_str(&format!("-h{}dp", self.screen_height_dp));
        }
        match self.screen_layout & SCREENSIZE_MASK {
            SCREENSIZE_SMALL => out.push_str("-small"),
            SCREENSIZE_NORMAL => out.push_str("-normal"),
            SCREENSIZE_LARGE => out.push_str("-large"),
            SCREENSIZE_XLARGE => out.push_str("-xlarge"),
            _ => {}
        }
        match self.screen_layout & SCREENLONG_MASK {
            SCREENLONG_YES => out.push_str("-long"),
            SCREENLONG_NO => out.push_str("-notlong"),
            _ => {}
        }
        match self.orientation {
            ORIENTATION_PORT => out.push_str("-port"),
            ORIENTATION_LAND => out.push_str("-land"),
            ORIENTATION_SQUARE => out.push_str("-square"),
            _ => {}
        }
        match self.ui_mode & UI_MODE_TYPE_MASK {
            UI_MODE_TYPE_DESK => out.push_str("-desk"),
            UI_MODE_TYPE_CAR => out.push_str("-car"),
            UI_MODE_TYPE_TELEVISION => out.push_str("-television"),
            _ => {}
        }
        match self.ui_mode & UI_MODE_NIGHT_MASK {
            UI_MODE_NIGHT_YES => out.push_str("-night"),
            UI_MODE_NIGHT_NO => out.push_str("-notnight"),
            _ => {}
        }
        match self.density {
            DENSITY_DEFAULT => {}
            DENSITY_LOW => out.push_str("-ldpi"),
            DENSITY_MEDIUM => out.push_str("-mdpi"),
            DENSITY_HIGH => out.push_str("-hdpi"),
            DENSITY_XHIGH => out.push_str("-xhdpi"),
            DENSITY_NONE => out.push_str("-nodpi"),
            other => out.push_str(&format!("-{other}dpi")),
        }
        match self.touchscreen {
            TOUCHSCREEN_NOTOUCH => out.push_str("-notouch"),
            TOUCHSCREEN_STYLUS => out.push_str("-stylus"),
            TOUCHSCREEN_FINGER => out.push_str("-finger"),
            _ => {}
        }
        match self.input_flags & KEYSHIDDEN_MASK {
            KEYSHIDDEN_NO => out.push_str("-keysexposed"),
            KEYSHIDDEN_YES => out.push_str("-keyshidden"),
            KEYSHIDDEN_SOFT => out.push_str("-keyssoft"),
            _ => {}
        }
        match self.keyboard {
            KEYBOARD_NOKEYS => out.push_str("-nokeys"),
            KEYBOARD_QWERTY => out.push_str("-qwerty"),
            KEYBOARD_12KEY => out.push_str("-12key"),
            _ => {}
        }
        match self.input_flags & NAVHIDDEN_MASK {
            NAVHIDDEN_NO => out.push_str("-navexposed"),
            NAVHIDDEN_YES => out.push_str("-navhidden"),
            _ => {}
        }
        match self.navigation {
            NAVIGATION_NONAV => out.push_str("-nonav"),
            NAVIGATION_DPAD => out.push_str("-dpad"),
            NAVIGATION_TRACKBALL => out.push_str("-trackball"),
            NAVIGATION_WHEEL => out.push_str("-wheel"),
            _ => {}
        }
        if self.screen_width != 0 || self.screen_height != 0 {
            out.push_str(&format!("-{}x{}", self.screen_width, self.screen_height));
        }
        if self.sdk_version != 0 {
            out.push_str(&format!("-v{}", self.sdk_version));
        }
        out
    }
}

impl fmt::Display for ResTableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let qualifiers = self.qualifiers();
        if qualifiers.is_empty() {
            f.write_str("[DEFAULT]")
        } else {
            f.write_str(&qualifiers)
        }
    }
}

fn effective_density(density: u16) -> i64 {
    if density == DENSITY_DEFAULT {
        DENSITY_MEDIUM as i64
    } else {
        density as i64
    }
}

fn locale_part(raw: &[u8; 2]) -> String {
    raw.iter()
        .take_while(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::builders::config_bytes;
    use pretty_assertions::assert_eq;

    fn density(d: u16) -> ResTableConfig {
        ResTableConfig::with_density(d)
    }

    #[test]
    fn test_parses_full_record() {
        let mut raw = config_bytes(DENSITY_HIGH, Some(b"en"));
        raw[4..6].copy_from_slice(&310u16.to_le_bytes());
        raw[10] = b'U';
        raw[11] = b'S';
        raw[12] = ORIENTATION_LAND;
        raw[24..26].copy_from_slice(&11u16.to_le_bytes());
        raw[30..32].copy_from_slice(&600u16.to_le_bytes());

        let mut cursor = ByteCursor::new(&raw);
        let config = ResTableConfig::read(&mut cursor).unwrap();
        assert_eq!(cursor.pos(), 36);
        assert_eq!(config.mcc, 310);
        assert_eq!(config.density, DENSITY_HIGH);
        assert_eq!(config.sdk_version, 11);
        assert!(config.has_locale());
        assert!(!config.invalid);
        assert_eq!(config.qualifiers(), "-mcc310-en-rUS-sw600dp-land-hdpi-v11");
    }

    #[test]
    fn test_short_and_long_records() {
        // A 28-byte record stops before screenLayout.
        let mut raw = config_bytes(DENSITY_LOW, None);
        raw[0..4].copy_from_slice(&28u32.to_le_bytes());
        raw[28] = 0xff;
        let mut cursor = ByteCursor::new(&raw);
        let config = ResTableConfig::read(&mut cursor).unwrap();
        assert_eq!(cursor.pos(), 28);
        assert_eq!(config.screen_layout, 0);

        // Trailing bytes beyond the known fields are skipped.
        let mut raw = config_bytes(DENSITY_LOW, None);
        raw[0..4].copy_from_slice(&44u32.to_le_bytes());
        raw.extend([0u8; 8]);
        let mut cursor = ByteCursor::new(&raw);
        ResTableConfig::read(&mut cursor).unwrap();
        assert_eq!(cursor.pos(), 44);

        let mut raw = config_bytes(DENSITY_LOW, None);
        raw[0..4].copy_from_slice(&20u32.to_le_bytes());
        assert!(ResTableConfig::read(&mut ByteCursor::new(&raw)).is_err());
    }

    #[test]
    fn test_invalid_qualifiers_are_clamped() {
        let mut raw = config_bytes(0, None);
        raw[12] = 9;
        let config = ResTableConfig::read(&mut ByteCursor::new(&raw)).unwrap();
        assert!(config.invalid);
        assert_eq!(config.orientation, ORIENTATION_ANY);
    }

    #[test]
    fn test_density_comparison_without_request_is_false() {
        assert!(!density(120).is_better_than(&density(320), None));
        assert!(!density(240).is_better_than(&density(240), Some(&density(160))));
    }

    #[test]
    fn test_density_boundary_prefers_higher() {
        // (2*120 - 160) * 320 == 160 * 160, so the strict test fails and 320 wins.
        let req = density(160);
        assert!(density(320).is_better_than(&density(120), Some(&req)));
        assert!(!density(120).is_better_than(&density(320), Some(&req)));
    }

    #[test]
    fn test_density_close_lower_wins() {
        let req = density(160);
        assert!(density(150).is_better_than(&density(320), Some(&req)));
        assert!(!density(320).is_better_than(&density(150), Some(&req)));
    }

    #[test]
    fn test_density_outside_range() {
        // Request above both: the higher one.
        let req = density(480);
        assert!(density(320).is_better_than(&density(240), Some(&req)));
        // Request below both: the lower one.
        let req = density(120);
        assert!(density(160).is_better_than(&density(240), Some(&req)));
        // Unspecified densities count as medium.
        assert!(density(0).is_better_than(&density(320), Some(&density(160))));
    }

    #[test]
    fn test_display_default() {
        assert_eq!(ResTableConfig::default().to_string(), "[DEFAULT]");
        assert_eq!(density(DENSITY_NONE).to_string(), "-nodpi");
    }
}
