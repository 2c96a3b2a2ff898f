//! Resource configurations: the qualifier records under which a TYPE
//! chunk's values apply, plus the compatibility filter and the
//! precedence walk the resolver uses to pick among variants.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;

use super::error::{DecodeResult, Error};
use super::Reader;

/* screen_layout bit masks */
const MASK_LAYOUT_DIR: u8 = 0xC0;
const MASK_SCREEN_SIZE: u8 = 0x0F;
const MASK_SCREEN_LONG: u8 = 0x30;

/* ui_mode bit masks */
const MASK_UI_MODE_TYPE: u8 = 0x0F;
const MASK_UI_MODE_NIGHT: u8 = 0x30;

static DENSITY_NAMES: Lazy<BTreeMap<u16, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        (120, "ldpi"),
        (160, "mdpi"),
        (213, "tvdpi"),
        (240, "hdpi"),
        (320, "xhdpi"),
        (480, "xxhdpi"),
        (640, "xxxhdpi"),
        (0xFFFE, "anydpi"),
        (0xFFFF, "nodpi"),
    ])
});

/// A fixed-layout qualifier record. Zero (or an empty byte pair) means
/// the qualifier is unspecified and matches anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResConfig {
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
}

impl ResConfig {
    /// The zero configuration: no qualifiers, matches every variant.
    pub const DEFAULT: ResConfig = ResConfig {
        mcc: 0,
        mnc: 0,
        language: [0; 2],
        country: [0; 2],
        orientation: 0,
        touchscreen: 0,
        density: 0,
        keyboard: 0,
        navigation: 0,
        input_flags: 0,
        screen_width: 0,
        screen_height: 0,
        sdk_version: 0,
        minor_version: 0,
        screen_layout: 0,
        ui_mode: 0,
        smallest_screen_width_dp: 0,
        screen_width_dp: 0,
        screen_height_dp: 0,
    };

    /// Builds a locale-qualified config, the most common selector.
    pub fn with_locale(language: &str, country: &str) -> ResConfig {
        let mut config = ResConfig::DEFAULT;
        config.language = pack_locale(language);
        config.country = pack_locale(country);
        config
    }

    /// Decodes a size-prefixed config record and advances the reader by
    /// exactly the declared size.
    pub(crate) fn read(r: &mut Reader<'_>) -> DecodeResult<ResConfig> {
        let start = r.position();
        let abs = r.abs_position();
        let size = r.read_u32()? as usize;
        if size < 4 {
            return Err(Error::malformed(abs, format!("config size {size} below minimum")));
        }
        let end = start.checked_add(size).ok_or_else(|| {
            Error::malformed(abs, "config size overflow")
        })?;
        if end > r.len() {
            return Err(Error::Truncated {
                offset: abs,
                chunk_type: None,
            });
        }

        let mut config = ResConfig::DEFAULT;
        if size >= 8 {
            config.mcc = r.read_u16()?;
            config.mnc = r.read_u16()?;
        }
        if size >= 12 {
            let lang = r.read_bytes(2)?;
            config.language = [lang[0], lang[1]];
            let country = r.read_bytes(2)?;
            config.country = [country[0], country[1]];
        }
        if size >= 16 {
            config.orientation = r.read_u8()?;
            config.touchscreen = r.read_u8()?;
            config.density = r.read_u16()?;
        }
        if size >= 20 {
            config.keyboard = r.read_u8()?;
            config.navigation = r.read_u8()?;
            config.input_flags = r.read_u8()?;
            r.read_u8()?; // input padding
        }
        if size >= 24 {
            config.screen_width = r.read_u16()?;
            config.screen_height = r.read_u16()?;
        }
        if size >= 28 {
            config.sdk_version = r.read_u16()?;
            config.minor_version = r.read_u16()?;
        }
        if size >= 32 {
            config.screen_layout = r.read_u8()?;
            config.ui_mode = r.read_u8()?;
            config.smallest_screen_width_dp = r.read_u16()?;
        }
        if size >= 36 {
            config.screen_width_dp = r.read_u16()?;
            config.screen_height_dp = r.read_u16()?;
        }
        // Locale script, variant and the newer fields are not qualifiers
        // this resolver selects on; skip to the declared end.
        r.seek(end)?;
        Ok(config)
    }

    pub fn language_str(&self) -> Option<String> {
        unpack_locale(self.language)
    }

    pub fn country_str(&self) -> Option<String> {
        unpack_locale(self.country)
    }

    pub fn is_default(&self) -> bool {
        *self == ResConfig::DEFAULT
    }

    /// Whether this variant's qualifiers are non-conflicting with a
    /// requested config. A qualifier conflicts only when both sides
    /// specify it and the values are incompatible, so a default request
    /// accepts every variant.
    pub fn is_compatible(&self, req: &ResConfig) -> bool {
        let eq_set = |a: u16, b: u16| a == 0 || b == 0 || a == b;
        let eq_set8 = |a: u8, b: u8| a == 0 || b == 0 || a == b;
        // Sizes and versions conflict only when the variant demands more
        // than the request provides.
        let within = |a: u16, b: u16| a == 0 || b == 0 || a <= b;

        if !eq_set(self.mcc, req.mcc) || !eq_set(self.mnc, req.mnc) {
            return false;
        }
        if self.language != [0; 2] && req.language != [0; 2] && self.language != req.language {
            return false;
        }
        if self.country != [0; 2] && req.country != [0; 2] && self.country != req.country {
            return false;
        }
        let dir = |c: &ResConfig| c.screen_layout & MASK_LAYOUT_DIR;
        let long = |c: &ResConfig| c.screen_layout & MASK_SCREEN_LONG;
        let layout_size = |c: &ResConfig| c.screen_layout & MASK_SCREEN_SIZE;
        if !eq_set8(dir(self), dir(req)) || !eq_set8(long(self), long(req)) {
            return false;
        }
        if !within(layout_size(self) as u16, layout_size(req) as u16) {
            return false;
        }
        if !within(self.smallest_screen_width_dp, req.smallest_screen_width_dp)
            || !within(self.screen_width_dp, req.screen_width_dp)
            || !within(self.screen_height_dp, req.screen_height_dp)
        {
            return false;
        }
        if !eq_set8(self.orientation, req.orientation) {
            return false;
        }
        let ui_type = |c: &ResConfig| c.ui_mode & MASK_UI_MODE_TYPE;
        let night = |c: &ResConfig| c.ui_mode & MASK_UI_MODE_NIGHT;
        if !eq_set8(ui_type(self), ui_type(req)) || !eq_set8(night(self), night(req)) {
            return false;
        }
        // Density never excludes a variant; it is best-match only.
        if !eq_set8(self.touchscreen, req.touchscreen)
            || !eq_set8(self.keyboard, req.keyboard)
            || !eq_set8(self.navigation, req.navigation)
            || !eq_set8(self.input_flags, req.input_flags)
        {
            return false;
        }
        if !within(self.screen_width, req.screen_width)
            || !within(self.screen_height, req.screen_height)
        {
            return false;
        }
        if !within(self.sdk_version, req.sdk_version) {
            return false;
        }
        true
    }

    /// Whether this variant is a strictly better match for `req` than
    /// `other`, walking qualifiers in Android's documented precedence
    /// order. Both variants are assumed compatible with `req`.
    ///
    /// At each level, a qualifier the request specifies favors the
    /// variant carrying it; one the request leaves unspecified favors
    /// the variant without it, so an unqualified request lands on the
    /// unqualified variant.
    pub(crate) fn is_better_than(&self, other: &ResConfig, req: &ResConfig) -> bool {
        // A qualifier where compatibility means equality: whichever
        // candidate specifies it wins when requested, loses otherwise.
        fn exact(a: u16, b: u16, requested: u16) -> Option<bool> {
            if a == b {
                return None;
            }
            Some(if requested != 0 { a != 0 } else { a == 0 })
        }
        // A qualifier where larger-but-compatible is closer to the
        // request.
        fn nearest(a: u16, b: u16, requested: u16) -> Option<bool> {
            if a == b {
                return None;
            }
            Some(if requested != 0 { a > b } else { a == 0 })
        }

        // MCC / MNC
        if let Some(better) = exact(self.mcc, other.mcc, req.mcc) {
            return better;
        }
        if let Some(better) = exact(self.mnc, other.mnc, req.mnc) {
            return better;
        }
        // Locale
        if self.language != other.language {
            return if req.language != [0; 2] {
                self.language != [0; 2]
            } else {
                self.language == [0; 2]
            };
        }
        if self.country != other.country {
            return if req.country != [0; 2] {
                self.country != [0; 2]
            } else {
                self.country == [0; 2]
            };
        }
        // Layout direction
        let dir = |c: &ResConfig| (c.screen_layout & MASK_LAYOUT_DIR) as u16;
        if let Some(better) = exact(dir(self), dir(other), dir(req)) {
            return better;
        }
        // Smallest width, then screen size in dp
        if let Some(better) = nearest(
            self.smallest_screen_width_dp,
            other.smallest_screen_width_dp,
            req.smallest_screen_width_dp,
        ) {
            return better;
        }
        if let Some(better) = nearest(self.screen_width_dp, other.screen_width_dp, req.screen_width_dp) {
            return better;
        }
        if let Some(better) = nearest(
            self.screen_height_dp,
            other.screen_height_dp,
            req.screen_height_dp,
        ) {
            return better;
        }
        // Screen size class and aspect
        let layout_size = |c: &ResConfig| (c.screen_layout & MASK_SCREEN_SIZE) as u16;
        if let Some(better) = nearest(layout_size(self), layout_size(other), layout_size(req)) {
            return better;
        }
        let long = |c: &ResConfig| (c.screen_layout & MASK_SCREEN_LONG) as u16;
        if let Some(better) = exact(long(self), long(other), long(req)) {
            return better;
        }
        // Orientation
        if let Some(better) = exact(
            self.orientation as u16,
            other.orientation as u16,
            req.orientation as u16,
        ) {
            return better;
        }
        // UI mode, then night mode
        let ui_type = |c: &ResConfig| (c.ui_mode & MASK_UI_MODE_TYPE) as u16;
        if let Some(better) = exact(ui_type(self), ui_type(other), ui_type(req)) {
            return better;
        }
        let night = |c: &ResConfig| (c.ui_mode & MASK_UI_MODE_NIGHT) as u16;
        if let Some(better) = exact(night(self), night(other), night(req)) {
            return better;
        }
        // Density: closest to the request wins, higher on a tie.
        if self.density != other.density {
            if req.density == 0 {
                return self.density == 0;
            }
            let distance = |d: u16| {
                if d == 0 {
                    u32::MAX
                } else {
                    (d as i32 - req.density as i32).unsigned_abs()
                }
            };
            let (a, b) = (distance(self.density), distance(other.density));
            if a != b {
                return a < b;
            }
            return self.density > other.density;
        }
        // Touchscreen, keyboard state, keyboard, navigation
        if let Some(better) = exact(
            self.touchscreen as u16,
            other.touchscreen as u16,
            req.touchscreen as u16,
        ) {
            return better;
        }
        if let Some(better) = exact(
            self.input_flags as u16,
            other.input_flags as u16,
            req.input_flags as u16,
        ) {
            return better;
        }
        if let Some(better) = exact(self.keyboard as u16, other.keyboard as u16, req.keyboard as u16)
        {
            return better;
        }
        if let Some(better) = exact(
            self.navigation as u16,
            other.navigation as u16,
            req.navigation as u16,
        ) {
            return better;
        }
        // Screen dimensions in pixels
        if let Some(better) = nearest(self.screen_width, other.screen_width, req.screen_width) {
            return better;
        }
        if let Some(better) = nearest(self.screen_height, other.screen_height, req.screen_height) {
            return better;
        }
        // Platform version
        if let Some(better) = nearest(self.sdk_version, other.sdk_version, req.sdk_version) {
            return better;
        }
        if let Some(better) = nearest(self.minor_version, other.minor_version, req.minor_version) {
            return better;
        }
        false
    }
}

fn pack_locale(s: &str) -> [u8; 2] {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        [bytes[0], bytes[1]]
    } else {
        [0; 2]
    }
}

fn unpack_locale(pair: [u8; 2]) -> Option<String> {
    if pair == [0; 2] {
        None
    } else {
        Some(String::from_utf8_lossy(&pair).into_owned())
    }
}

impl fmt::Display for ResConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if self.mcc != 0 {
            parts.push(format!("mcc{}", self.mcc));
        }
        if self.mnc != 0 {
            parts.push(format!("mnc{}", self.mnc));
        }
        if let Some(lang) = self.language_str() {
            parts.push(lang);
        }
        if let Some(country) = self.country_str() {
            parts.push(format!("r{}", country.to_ascii_uppercase()));
        }
        if self.smallest_screen_width_dp != 0 {
            parts.push(format!("sw{}dp", self.smallest_screen_width_dp));
        }
        if self.screen_width_dp != 0 {
            parts.push(format!("w{}dp", self.screen_width_dp));
        }
        if self.screen_height_dp != 0 {
            parts.push(format!("h{}dp", self.screen_height_dp));
        }
        match self.orientation {
            1 => parts.push("port".to_string()),
            2 => parts.push("land".to_string()),
            3 => parts.push("square".to_string()),
            _ => {}
        }
        if self.density != 0 {
            match DENSITY_NAMES.get(&self.density) {
                Some(name) => parts.push((*name).to_string()),
                None => parts.push(format!("{}dpi", self.density)),
            }
        }
        match self.touchscreen {
            1 => parts.push("notouch".to_string()),
            2 => parts.push("stylus".to_string()),
            3 => parts.push("finger".to_string()),
            _ => {}
        }
        match self.keyboard {
            1 => parts.push("nokeys".to_string()),
            2 => parts.push("qwerty".to_string()),
            3 => parts.push("12key".to_string()),
            _ => {}
        }
        match self.navigation {
            1 => parts.push("nonav".to_string()),
            2 => parts.push("dpad".to_string()),
            3 => parts.push("trackball".to_string()),
            4 => parts.push("wheel".to_string()),
            _ => {}
        }
        if self.screen_width != 0 || self.screen_height != 0 {
            parts.push(format!("{}x{}", self.screen_width, self.screen_height));
        }
        if self.sdk_version != 0 {
            parts.push(format!("v{}", self.sdk_version));
        }
        if parts.is_empty() {
            write!(f, "default")
        } else {
            write!(f, "{}", parts.join("-"))
        }
    }
}
