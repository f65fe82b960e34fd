/// Letter document model: everything the composer edits and the viewer replays
use crate::hosting::is_hosted;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_SPEED: u8 = 1;
pub const MAX_SPEED: u8 = 10;
/// Speed at which durations are not scaled.
pub const NEUTRAL_SPEED: u8 = 5;

/// How the letter body is revealed to the recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnimationMode {
    FadeIn,
    #[default]
    WordByWord,
    CharacterByCharacter,
    Typewriter,
}

impl AnimationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationMode::FadeIn => "fade-in",
            AnimationMode::WordByWord => "word-by-word",
            AnimationMode::CharacterByCharacter => "character-by-character",
            AnimationMode::Typewriter => "typewriter",
        }
    }
}

impl fmt::Display for AnimationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnimationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fade-in" | "fadeIn" => Ok(AnimationMode::FadeIn),
            "word-by-word" | "wordByWord" => Ok(AnimationMode::WordByWord),
            "character-by-character" | "characterByCharacter" => {
                Ok(AnimationMode::CharacterByCharacter)
            }
            "typewriter" => Ok(AnimationMode::Typewriter),
            other => Err(format!("Unknown animation mode: {}", other)),
        }
    }
}

/// Image-bearing positions on the envelope and letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageSlotName {
    Stamp,
    Seal,
    Logo1,
    Logo2,
    LetterLogo,
}

impl ImageSlotName {
    pub const ALL: [ImageSlotName; 5] = [
        ImageSlotName::Stamp,
        ImageSlotName::Seal,
        ImageSlotName::Logo1,
        ImageSlotName::Logo2,
        ImageSlotName::LetterLogo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSlotName::Stamp => "stamp",
            ImageSlotName::Seal => "seal",
            ImageSlotName::Logo1 => "logo1",
            ImageSlotName::Logo2 => "logo2",
            ImageSlotName::LetterLogo => "letterLogo",
        }
    }
}

impl fmt::Display for ImageSlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSlotName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ImageSlotName::ALL
            .into_iter()
            .find(|slot| slot.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown image slot: {}", s))
    }
}

/// One image reference. `source_ref` is a hosted URL, a static asset path,
/// or (editor session only) a `data:` URL preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSlot {
    pub source_ref: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub hidden: bool,
}

impl ImageSlot {
    pub fn new(source_ref: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            filename: filename.into(),
            hidden: false,
        }
    }

    /// Visible and pointing at something a recipient can load.
    pub fn is_shareable(&self) -> bool {
        !self.hidden && is_hosted(&self.source_ref)
    }
}

/// The editable/shareable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LetterDocument {
    pub text: String,
    pub animation_mode: AnimationMode,
    /// 1..=10, higher is faster
    pub animation_speed: u8,

    pub letter_font: String,
    pub letter_font_size_px: u32,
    pub letter_text_color: String,

    pub to_text: String,
    pub to_font: String,
    pub to_font_size_px: u32,
    pub from_text: String,
    pub from_font: String,
    pub from_font_size_px: u32,

    pub envelope_outer_color: String,
    pub envelope_inside_color: String,
    pub letter_paper_color: String,

    /// Empty means the postmark is hidden
    pub postmark_label: String,

    pub stamp: Option<ImageSlot>,
    pub seal: Option<ImageSlot>,
    pub logo1: Option<ImageSlot>,
    pub logo2: Option<ImageSlot>,
    pub letter_logo: Option<ImageSlot>,

    /// Only set on saved-history snapshots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

pub const DEFAULT_TO_TEXT: &str = "To: Someone Special";
pub const DEFAULT_FROM_TEXT: &str = "From: Me";
pub const DEFAULT_LETTER_FONT: &str = "Caveat";
pub const DEFAULT_ADDRESS_FONT: &str = "Dancing Script";
pub const DEFAULT_LETTER_FONT_SIZE: u32 = 18;
pub const DEFAULT_ADDRESS_FONT_SIZE: u32 = 22;
pub const DEFAULT_TEXT_COLOR: &str = "#333333";
pub const DEFAULT_ENVELOPE_COLOR: &str = "#f4e4c1";
pub const DEFAULT_ENVELOPE_INSIDE_COLOR: &str = "#e8d4a8";
pub const DEFAULT_PAPER_COLOR: &str = "#fffdf7";

impl Default for LetterDocument {
    fn default() -> Self {
        Self {
            text: String::new(),
            animation_mode: AnimationMode::default(),
            animation_speed: NEUTRAL_SPEED,
            letter_font: DEFAULT_LETTER_FONT.to_string(),
            letter_font_size_px: DEFAULT_LETTER_FONT_SIZE,
            letter_text_color: DEFAULT_TEXT_COLOR.to_string(),
            to_text: DEFAULT_TO_TEXT.to_string(),
            to_font: DEFAULT_ADDRESS_FONT.to_string(),
            to_font_size_px: DEFAULT_ADDRESS_FONT_SIZE,
            from_text: DEFAULT_FROM_TEXT.to_string(),
            from_font: DEFAULT_ADDRESS_FONT.to_string(),
            from_font_size_px: DEFAULT_ADDRESS_FONT_SIZE,
            envelope_outer_color: DEFAULT_ENVELOPE_COLOR.to_string(),
            envelope_inside_color: DEFAULT_ENVELOPE_INSIDE_COLOR.to_string(),
            letter_paper_color: DEFAULT_PAPER_COLOR.to_string(),
            postmark_label: String::new(),
            stamp: None,
            seal: None,
            logo1: None,
            logo2: None,
            letter_logo: None,
            id: None,
            created_at: None,
        }
    }
}

impl LetterDocument {
    pub fn slot(&self, name: ImageSlotName) -> Option<&ImageSlot> {
        match name {
            ImageSlotName::Stamp => self.stamp.as_ref(),
            ImageSlotName::Seal => self.seal.as_ref(),
            ImageSlotName::Logo1 => self.logo1.as_ref(),
            ImageSlotName::Logo2 => self.logo2.as_ref(),
            ImageSlotName::LetterLogo => self.letter_logo.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, name: ImageSlotName) -> &mut Option<ImageSlot> {
        match name {
            ImageSlotName::Stamp => &mut self.stamp,
            ImageSlotName::Seal => &mut self.seal,
            ImageSlotName::Logo1 => &mut self.logo1,
            ImageSlotName::Logo2 => &mut self.logo2,
            ImageSlotName::LetterLogo => &mut self.letter_logo,
        }
    }

    pub fn postmark_visible(&self) -> bool {
        !self.postmark_label.is_empty()
    }

    /// Speed clamped into the supported range.
    pub fn speed(&self) -> u8 {
        self.animation_speed.clamp(MIN_SPEED, MAX_SPEED)
    }

    /// The subset of this document that survives a trip through a share URL:
    /// hidden or non-hosted image slots are dropped, history metadata is cleared.
    pub fn shareable(&self) -> LetterDocument {
        let mut doc = self.clone();
        for name in ImageSlotName::ALL {
            let slot = doc.slot_mut(name);
            if !slot.as_ref().is_some_and(ImageSlot::is_shareable) {
                *slot = None;
            }
        }
        doc.animation_speed = self.speed();
        doc.id = None;
        doc.created_at = None;
        doc
    }
}
