//! Constants and types shared across RomShadow crates
//!
//! Every value in here is dictated by the calculator firmware. Nothing is
//! derived; the numbers were observed on the device and must be reproduced
//! exactly.

pub mod config;

use serde::{Deserialize, Serialize};

pub use config::{AppConfig, ConfigError, Scenario};

/// Message box button bits
pub const BUTTON_OK: i32 = 1 << 5;
pub const BUTTON_YES: i32 = 1 << 6;
pub const BUTTON_NO: i32 = 1 << 7;
pub const BUTTON_ABORT: i32 = 1 << 8;
pub const BUTTON_RETRY: i32 = 1 << 9;
pub const BUTTON_CANCEL: i32 = 1 << 10;

/// Text box flags
pub mod text_box_flags {
    /// Draw the outline and background of the box
    pub const DRAW_BOX: i32 = 1 << 3;
    /// Allow the contents to be edited
    pub const EDITABLE: i32 = 1 << 8;
}

/// Screen height of the device, in pixels
pub const SCREEN_HEIGHT: u16 = 528;
/// Screen width of the device, in pixels
pub const SCREEN_WIDTH: u16 = 320;

/// Height of a dialog, as a share of the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Height {
    Percent25 = 0,
    Percent55 = 1,
    Percent75 = 2,
    Percent95 = 3,
    Percent35 = 4,
    Percent60 = 5,
}

impl Height {
    /// Firmware value passed to the dialog initializer
    pub fn raw(self) -> i32 {
        self as i32
    }

    /// Look up the height for a raw firmware value
    pub fn from_raw(raw: i32) -> Option<Height> {
        Some(match raw {
            0 => Height::Percent25,
            1 => Height::Percent55,
            2 => Height::Percent75,
            3 => Height::Percent95,
            4 => Height::Percent35,
            5 => Height::Percent60,
            _ => return None,
        })
    }

    /// Share of the screen height covered by the dialog
    pub fn percent(self) -> u16 {
        match self {
            Height::Percent25 => 25,
            Height::Percent55 => 55,
            Height::Percent75 => 75,
            Height::Percent95 => 95,
            Height::Percent35 => 35,
            Height::Percent60 => 60,
        }
    }
}

/// Vertical placement of a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Alignment {
    Top = 0,
    Center = 1,
    Bottom = 2,
}

impl Alignment {
    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Option<Alignment> {
        Some(match raw {
            0 => Alignment::Top,
            1 => Alignment::Center,
            2 => Alignment::Bottom,
            _ => return None,
        })
    }
}

/// Soft keyboard shown while a dialog is open
///
/// The firmware also accepts 2 (same as `None`) and 3 (same as `Math1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum KeyboardState {
    #[default]
    None = 0,
    Math1 = 1,
    Math2 = 4,
    Math3 = 5,
    Trig = 6,
    Var = 7,
    Abc = 8,
    Catalog = 9,
    Advance = 10,
    Number = 11,
}

impl KeyboardState {
    pub fn raw(self) -> i32 {
        self as i32
    }
}

/// Event type reported to a dialog for a button created with `event_type`
pub const fn button_event_type(event_type: u16) -> u16 {
    (event_type.wrapping_add(8) << 4) | (1 << 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_event_type() {
        assert_eq!(button_event_type(0), 0x88);
        assert_eq!(button_event_type(1), 0x98);
        assert_eq!(button_event_type(0x10), 0x188);
    }

    #[test]
    fn test_keyboard_raw_values() {
        assert_eq!(KeyboardState::Math2.raw(), 4);
        assert_eq!(KeyboardState::Abc.raw(), 8);
        assert_eq!(KeyboardState::Number.raw(), 11);
    }

    #[test]
    fn test_height_round_trip() {
        for raw in 0..6 {
            let height = Height::from_raw(raw).unwrap();
            assert_eq!(height.raw(), raw);
        }
        assert!(Height::from_raw(6).is_none());
        assert_eq!(Height::Percent35.percent(), 35);
    }

    #[test]
    fn test_button_bits_are_distinct() {
        let all = [BUTTON_OK, BUTTON_YES, BUTTON_NO, BUTTON_ABORT, BUTTON_RETRY, BUTTON_CANCEL];
        let combined = all.iter().fold(0, |acc, b| acc | b);
        assert_eq!(combined.count_ones(), 6);
    }
}
