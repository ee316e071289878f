//! Key code definitions and native key event records

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Key symbol (keysym) values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keysym(pub u32);

impl Keysym {
    pub const BACKSPACE: Keysym = Keysym(0xff08);
    pub const ESCAPE: Keysym = Keysym(0xff1b);
    pub const LEFT: Keysym = Keysym(0xff51);

    // Modifiers
    pub const SHIFT_L: Keysym = Keysym(0xffe1);
    pub const SHIFT_R: Keysym = Keysym(0xffe2);
    pub const CONTROL_L: Keysym = Keysym(0xffe3);
    pub const CONTROL_R: Keysym = Keysym(0xffe4);
    pub const CAPS_LOCK: Keysym = Keysym(0xffe5);
    pub const META_L: Keysym = Keysym(0xffe7);
    pub const META_R: Keysym = Keysym(0xffe8);
    pub const ALT_L: Keysym = Keysym(0xffe9);
    pub const ALT_R: Keysym = Keysym(0xffea);
    pub const SUPER_L: Keysym = Keysym(0xffeb);
    pub const SUPER_R: Keysym = Keysym(0xffec);
    pub const HYPER_L: Keysym = Keysym(0xffed);
    pub const HYPER_R: Keysym = Keysym(0xffee);
    pub const ISO_LEVEL3_SHIFT: Keysym = Keysym(0xfe03);

    // Dead keys
    pub const DEAD_GRAVE: Keysym = Keysym(0xfe50);
    pub const DEAD_ACUTE: Keysym = Keysym(0xfe51);
    pub const DEAD_DIAERESIS: Keysym = Keysym(0xfe57);
    /// Last keysym of the dead key block
    pub const DEAD_LAST: Keysym = Keysym(0xfe93);

    /// Unicode keysyms are `0x0100_0000 + codepoint`
    const UNICODE_OFFSET: u32 = 0x0100_0000;

    /// Keysym for a character, using the Latin-1 range directly and the
    /// Unicode keysym plane otherwise.
    pub fn from_char(ch: char) -> Keysym {
        let cp = ch as u32;
        if (0x20..=0x7e).contains(&cp) || (0xa0..=0xff).contains(&cp) {
            Keysym(cp)
        } else {
            Keysym(Self::UNICODE_OFFSET + cp)
        }
    }

    /// Try to convert this keysym to the character it types
    pub fn to_char(&self) -> Option<char> {
        match self.0 {
            // ASCII printable range and Latin-1 supplement map 1:1
            0x0020..=0x007e | 0x00a0..=0x00ff => char::from_u32(self.0),
            0x0100_0100..=0x0110_ffff => {
                char::from_u32(self.0 - Self::UNICODE_OFFSET).filter(|c| !c.is_control())
            }
            _ => None,
        }
    }

    /// Check if this is a dead key (accent that modifies the next character)
    pub fn is_dead_key(&self) -> bool {
        (Self::DEAD_GRAVE.0..=Self::DEAD_LAST.0).contains(&self.0)
    }

    /// Check if this is a modifier key
    pub fn is_modifier(&self) -> bool {
        matches!(
            *self,
            Self::SHIFT_L
                | Self::SHIFT_R
                | Self::CONTROL_L
                | Self::CONTROL_R
                | Self::CAPS_LOCK
                | Self::ALT_L
                | Self::ALT_R
                | Self::META_L
                | Self::META_R
                | Self::SUPER_L
                | Self::SUPER_R
                | Self::HYPER_L
                | Self::HYPER_R
                | Self::ISO_LEVEL3_SHIFT
        )
    }
}

impl fmt::Display for Keysym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ch) = self.to_char() {
            write!(f, "{}", ch)
        } else {
            write!(f, "Keysym(0x{:04x})", self.0)
        }
    }
}

bitflags! {
    /// Native modifier state word.
    ///
    /// Bits 24 and 25 are private to input methods (IBus marks events it
    /// re-posts with them), so they are absent from
    /// [`ModifierState::MODIFIER_MASK`].
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ModifierState: u32 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        const MOD1 = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
        const BUTTON1 = 1 << 8;
        const BUTTON2 = 1 << 9;
        const BUTTON3 = 1 << 10;
        const BUTTON4 = 1 << 11;
        const BUTTON5 = 1 << 12;
        const IM_PRIVATE_HANDLED = 1 << 24;
        const IM_PRIVATE_IGNORED = 1 << 25;
        const SUPER = 1 << 26;
        const HYPER = 1 << 27;
        const META = 1 << 28;
        const RELEASE = 1 << 30;
        // Unknown bits must survive so the mask comparison sees them
        const _ = !0;
    }
}

impl ModifierState {
    /// Platform modifier mask used for event identity comparisons.
    pub const MODIFIER_MASK: u32 = 0x5c00_1fff;

    /// The modifier bits that take part in identity comparisons.
    pub fn masked(self) -> u32 {
        self.bits() & Self::MODIFIER_MASK
    }

    /// Whether a modifier that turns a key into a shortcut is held.
    pub fn has_shortcut_modifier(self) -> bool {
        self.intersects(Self::CONTROL | Self::MOD1 | Self::SUPER | Self::META)
    }
}

const _: () = assert!(ModifierState::MODIFIER_MASK & (1 << 24) == 0);
const _: () = assert!(ModifierState::MODIFIER_MASK & (1 << 25) == 0);

/// Press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEventKind {
    Press,
    Release,
}

/// A raw key event as delivered by the native toolkit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeKeyEvent {
    /// Native event time in milliseconds. Only used for identity matching.
    pub time: u32,
    pub kind: KeyEventKind,
    pub keysym: Keysym,
    #[serde(default)]
    pub hardware_keycode: u16,
    #[serde(default)]
    pub state: ModifierState,
    /// The toolkit flags modifier keys itself; we fall back to the keysym.
    #[serde(default)]
    pub is_modifier: bool,
}

impl NativeKeyEvent {
    pub fn new(time: u32, kind: KeyEventKind, keysym: Keysym, state: ModifierState) -> Self {
        Self {
            time,
            kind,
            keysym,
            hardware_keycode: 0,
            state,
            is_modifier: keysym.is_modifier(),
        }
    }

    /// Create a simple key press event without modifiers
    pub fn press(time: u32, keysym: Keysym) -> Self {
        Self::new(time, KeyEventKind::Press, keysym, ModifierState::empty())
    }

    /// Create a simple key release event without modifiers
    pub fn release(time: u32, keysym: Keysym) -> Self {
        Self::new(time, KeyEventKind::Release, keysym, ModifierState::empty())
    }

    pub fn with_hardware_keycode(mut self, keycode: u16) -> Self {
        self.hardware_keycode = keycode;
        self
    }

    pub fn is_press(&self) -> bool {
        self.kind == KeyEventKind::Press
    }

    pub fn is_modifier_key(&self) -> bool {
        self.is_modifier || self.keysym.is_modifier()
    }

    /// The character this key types, if it would type one without an IME.
    pub fn to_char(&self) -> Option<char> {
        if self.is_press() && !self.state.has_shortcut_modifier() {
            self.keysym.to_char()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keysym_to_char() {
        assert_eq!(Keysym(0x0061).to_char(), Some('a'));
        assert_eq!(Keysym(0x00e9).to_char(), Some('é'));
        assert_eq!(Keysym(0x0100_3042).to_char(), Some('あ'));
        assert_eq!(Keysym::BACKSPACE.to_char(), None);
        assert_eq!(Keysym::DEAD_ACUTE.to_char(), None);
    }

    #[test]
    fn test_from_char_round_trips_through_to_char() {
        for ch in ['a', 'Z', '~', 'ß', 'あ', '한'] {
            assert_eq!(Keysym::from_char(ch).to_char(), Some(ch));
        }
    }

    #[test]
    fn test_dead_keys() {
        assert!(Keysym::DEAD_GRAVE.is_dead_key());
        assert!(Keysym::DEAD_DIAERESIS.is_dead_key());
        assert!(!Keysym(0x0061).is_dead_key());
        assert!(!Keysym::SHIFT_L.is_dead_key());
    }

    #[test]
    fn test_modifier_mask_drops_im_private_bits() {
        let plain = ModifierState::SHIFT;
        let reposted = ModifierState::SHIFT | ModifierState::IM_PRIVATE_IGNORED;
        assert_ne!(plain, reposted);
        assert_eq!(plain.masked(), reposted.masked());
    }

    #[test]
    fn test_unknown_bits_are_kept() {
        let state = ModifierState::from_bits_retain(1 << 20);
        assert_eq!(state.bits(), 1 << 20);
        assert_eq!(state.masked(), 0);
    }

    #[test]
    fn test_to_char_ignores_shortcuts() {
        let plain = NativeKeyEvent::press(1, Keysym(0x0061));
        assert_eq!(plain.to_char(), Some('a'));

        let ctrl_a = NativeKeyEvent::new(
            1,
            KeyEventKind::Press,
            Keysym(0x0061),
            ModifierState::CONTROL,
        );
        assert_eq!(ctrl_a.to_char(), None);

        let release = NativeKeyEvent::release(2, Keysym(0x0061));
        assert_eq!(release.to_char(), None);
    }
}
