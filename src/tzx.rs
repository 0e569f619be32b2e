/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
//! **TZX** container vocabulary: block identifiers and header constants.
// http://www.worldofspectrum.org/TZXformat.html
use core::convert::TryFrom;
use core::fmt;

/// The signature occupying the first 7 bytes of every TZX file.
pub const TZX_SIGNATURE: &[u8; 7] = b"ZXTape!";
/// The full TZX header: signature, end-of-text marker and the two
/// revision bytes.
pub const TZX_HEADER_SIZE: usize = 10;
/// TAP files carry no header; they are recognized by this extension.
pub const TAP_EXTENSION: &str = ".tap";

macro_rules! tzx_id {
    ($($id:ident = $n:literal: $name:literal),*) => {
        /// A TZX block identifier.
        #[repr(u8)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum TzxId {
            $($id = $n),*
        }

        impl TryFrom<u8> for TzxId {
            type Error = &'static str;
            fn try_from(id: u8) -> Result<Self, Self::Error> {
                match id {
                    $($n => Ok(TzxId::$id),)*
                    _ => Err("Unknown TZX ID")
                }
            }
        }

        impl TzxId {
            /// A human readable block name.
            pub fn name(self) -> &'static str {
                match self {
                    $(TzxId::$id => $name),*
                }
            }
        }
    };
}

tzx_id! {
    StandardSpeed    = 0x10: "Standard Speed Data",
    TurboSpeed       = 0x11: "Turbo Speed Data",
    PureTone         = 0x12: "Pure Tone",
    SeqOfPulses      = 0x13: "Pulse Sequence",
    PureData         = 0x14: "Pure Data",
    DirectRec        = 0x15: "Direct Recording",
    CswRecording     = 0x18: "CSW Recording",
    Generalized      = 0x19: "Generalized Data",
    Pause            = 0x20: "Pause / Stop Tape",
    GroupStart       = 0x21: "Group Start",
    GroupEnd         = 0x22: "Group End",
    Jump             = 0x23: "Jump To Block",
    LoopStart        = 0x24: "Loop Start",
    LoopEnd          = 0x25: "Loop End",
    CallSeq          = 0x26: "Call Sequence",
    Return           = 0x27: "Return From Sequence",
    Select           = 0x28: "Select Block",
    StopIn48k        = 0x2A: "Stop Tape (48K)",
    SetLevel         = 0x2B: "Set Signal Level",
    Text             = 0x30: "Text Description",
    Message          = 0x31: "Message Block",
    Archive          = 0x32: "Archive Info",
    Hardware         = 0x33: "Hardware Type",
    Custom           = 0x35: "Custom Info",
    KansasCity       = 0x4B: "Kansas City",
    Glue             = 0x5A: "Glue"
}

impl From<TzxId> for u8 {
    fn from(id: TzxId) -> u8 {
        id as u8
    }
}

impl fmt::Display for TzxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TzxId {
    /// Blocks that produce an audible pulse train during playback.
    pub fn is_playable(self) -> bool {
        matches!(self,
            TzxId::StandardSpeed | TzxId::TurboSpeed | TzxId::PureTone |
            TzxId::SeqOfPulses | TzxId::PureData | TzxId::DirectRec |
            TzxId::Generalized)
    }
}
