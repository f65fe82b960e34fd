/// URL codec: LetterDocument <-> `?letter=<token>` share links
///
/// Token = base64url(percent-encode(JSON of the shareable projection)).
/// Decoding never fails loudly: anything malformed is "no document".
use crate::letter::{AnimationMode, ImageSlot, ImageSlotName, LetterDocument, MAX_SPEED, MIN_SPEED};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;

/// Query/hash parameter carrying the token
pub const LETTER_PARAM: &str = "letter";

/// Flat wire form of a shareable letter. Absent image fields mean "not shown".
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SharePayload {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    animation_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_speed")]
    animation_speed: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    letter_font: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_px")]
    letter_font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    letter_text_color: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    to_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    to_font: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_px")]
    to_font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    from_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    from_font: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_px")]
    from_font_size: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    envelope_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    envelope_inside_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    letter_paper_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    postmark: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    stamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    stamp_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    seal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    seal_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    logo1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    logo1_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    logo2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    logo2_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    letter_logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    letter_logo_name: Option<String>,
}

// Field decoders: a value of the wrong type reads as absent, so the field
// takes its default instead of rejecting the whole letter.

fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches("px").trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// Rounded and clamped into 1..=10.
fn lenient_speed<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u8>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_number(&value)
        .map(|n| n.round().clamp(f64::from(MIN_SPEED), f64::from(MAX_SPEED)) as u8))
}

/// Positive pixel size, rounded.
fn lenient_px<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(lenient_number(&value)
        .map(f64::round)
        .filter(|n| *n >= 1.0)
        .map(|n| n.min(f64::from(u32::MAX)) as u32))
}

impl SharePayload {
    fn image_fields(&mut self, name: ImageSlotName) -> (&mut Option<String>, &mut Option<String>) {
        match name {
            ImageSlotName::Stamp => (&mut self.stamp, &mut self.stamp_name),
            ImageSlotName::Seal => (&mut self.seal, &mut self.seal_name),
            ImageSlotName::Logo1 => (&mut self.logo1, &mut self.logo1_name),
            ImageSlotName::Logo2 => (&mut self.logo2, &mut self.logo2_name),
            ImageSlotName::LetterLogo => (&mut self.letter_logo, &mut self.letter_logo_name),
        }
    }

    fn from_document(doc: &LetterDocument) -> Self {
        let shared = doc.shareable();
        let mut payload = SharePayload {
            text: Some(shared.text.clone()),
            animation_mode: Some(shared.animation_mode.as_str().to_string()),
            animation_speed: Some(shared.animation_speed),
            letter_font: Some(shared.letter_font.clone()),
            letter_font_size: Some(shared.letter_font_size_px),
            letter_text_color: Some(shared.letter_text_color.clone()),
            to_text: Some(shared.to_text.clone()),
            to_font: Some(shared.to_font.clone()),
            to_font_size: Some(shared.to_font_size_px),
            from_text: Some(shared.from_text.clone()),
            from_font: Some(shared.from_font.clone()),
            from_font_size: Some(shared.from_font_size_px),
            envelope_color: Some(shared.envelope_outer_color.clone()),
            envelope_inside_color: Some(shared.envelope_inside_color.clone()),
            letter_paper_color: Some(shared.letter_paper_color.clone()),
            postmark: Some(shared.postmark_label.clone()),
            ..Default::default()
        };

        for name in ImageSlotName::ALL {
            if let Some(slot) = shared.slot(name) {
                let (source, filename) = payload.image_fields(name);
                *source = Some(slot.source_ref.clone());
                *filename = Some(slot.filename.clone()).filter(|f| !f.is_empty());
            }
        }
        payload
    }

    fn into_document(mut self) -> LetterDocument {
        let defaults = LetterDocument::default();
        let mut doc = LetterDocument {
            text: self.text.take().unwrap_or(defaults.text),
            animation_mode: self
                .animation_mode
                .take()
                .and_then(|m| m.parse::<AnimationMode>().ok())
                .unwrap_or(defaults.animation_mode),
            animation_speed: self.animation_speed.unwrap_or(defaults.animation_speed),
            letter_font: self.letter_font.take().unwrap_or(defaults.letter_font),
            letter_font_size_px: self.letter_font_size.unwrap_or(defaults.letter_font_size_px),
            letter_text_color: self.letter_text_color.take().unwrap_or(defaults.letter_text_color),
            to_text: self.to_text.take().unwrap_or(defaults.to_text),
            to_font: self.to_font.take().unwrap_or(defaults.to_font),
            to_font_size_px: self.to_font_size.unwrap_or(defaults.to_font_size_px),
            from_text: self.from_text.take().unwrap_or(defaults.from_text),
            from_font: self.from_font.take().unwrap_or(defaults.from_font),
            from_font_size_px: self.from_font_size.unwrap_or(defaults.from_font_size_px),
            envelope_outer_color: self.envelope_color.take().unwrap_or(defaults.envelope_outer_color),
            envelope_inside_color: self
                .envelope_inside_color
                .take()
                .unwrap_or(defaults.envelope_inside_color),
            letter_paper_color: self.letter_paper_color.take().unwrap_or(defaults.letter_paper_color),
            postmark_label: self.postmark.take().unwrap_or(defaults.postmark_label),
            ..Default::default()
        };
        doc.animation_speed = doc.speed();

        for name in ImageSlotName::ALL {
            let (source, filename) = self.image_fields(name);
            // Old links may still carry inline data; it never counts as a visible image.
            if let Some(source) = source.take().filter(|s| crate::hosting::is_hosted(s)) {
                *doc.slot_mut(name) = Some(ImageSlot::new(source, filename.take().unwrap_or_default()));
            }
        }
        doc
    }
}

/// Serialize the shareable projection of `doc` into a URL-safe token.
pub fn encode_token(doc: &LetterDocument) -> String {
    let payload = SharePayload::from_document(doc);
    // A struct of strings and integers cannot fail to serialize.
    let json = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
    let escaped = urlencoding::encode(&json);
    general_purpose::URL_SAFE_NO_PAD.encode(escaped.as_bytes())
}

/// Recover a document from a token. Any malformed token yields `None`.
pub fn decode_token(token: &str) -> Option<LetterDocument> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let bytes = decode_base64(token)?;
    let escaped = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(_) => {
            debug!("Letter token is not UTF-8 after base64 decoding");
            return None;
        }
    };
    let json = match urlencoding::decode(&escaped) {
        Ok(s) => s,
        Err(e) => {
            debug!("Letter token is not valid percent-encoding: {}", e);
            return None;
        }
    };

    let value = match serde_json::from_str::<Value>(&json) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            debug!("Letter token is JSON but not an object");
            return None;
        }
        Err(e) => {
            debug!("Letter token does not hold JSON: {}", e);
            return None;
        }
    };

    match serde_json::from_value::<SharePayload>(value) {
        Ok(payload) => Some(payload.into_document()),
        Err(e) => {
            debug!("Letter token does not hold a letter: {}", e);
            None
        }
    }
}

/// Tokens minted by older builds used the standard alphabet with padding.
fn decode_base64(token: &str) -> Option<Vec<u8>> {
    let unpadded = token.trim_end_matches('=');
    general_purpose::URL_SAFE_NO_PAD
        .decode(unpadded)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(unpadded))
        .map_err(|e| debug!("Letter token is not base64: {}", e))
        .ok()
}

/// `origin + path` of `page_url`, with any query and hash removed.
pub fn page_base(page_url: &str) -> &str {
    let end = page_url
        .find(|c| c == '?' || c == '#')
        .unwrap_or(page_url.len());
    &page_url[..end]
}

/// Build the shareable URL `<origin><path>?letter=<token>` for `doc`.
pub fn share_url(page_url: &str, doc: &LetterDocument) -> String {
    format!("{}?{}={}", page_base(page_url), LETTER_PARAM, encode_token(doc))
}

fn param_value<'a>(pairs: &'a str, key: &str) -> Option<Cow<'a, str>> {
    pairs.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k != key || v.is_empty() {
            return None;
        }
        Some(urlencoding::decode(v).unwrap_or(Cow::Borrowed(v)))
    })
}

/// Extract the letter token from a URL. `#letter=` wins over `?letter=`.
pub fn share_token_from_url(url: &str) -> Option<String> {
    let (before_hash, hash) = match url.split_once('#') {
        Some((head, hash)) => (head, Some(hash)),
        None => (url, None),
    };

    if let Some(token) = hash.and_then(|h| param_value(h, LETTER_PARAM)) {
        return Some(token.into_owned());
    }

    let query = before_hash.split_once('?').map(|(_, q)| q)?;
    param_value(query, LETTER_PARAM).map(Cow::into_owned)
}

/// Which face of the app a URL asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMode {
    Composer,
    Viewer { token: String },
}

impl ViewMode {
    pub fn is_viewer(&self) -> bool {
        matches!(self, ViewMode::Viewer { .. })
    }
}

/// Detection uses the same token extraction as [`letter_from_url`], so any
/// URL that can decode is always a viewer URL.
pub fn view_mode(url: &str) -> ViewMode {
    match share_token_from_url(url) {
        Some(token) => ViewMode::Viewer { token },
        None => ViewMode::Composer,
    }
}

pub fn is_viewer_mode(url: &str) -> bool {
    view_mode(url).is_viewer()
}

/// Decode the letter a URL carries, if any.
pub fn letter_from_url(url: &str) -> Option<LetterDocument> {
    match view_mode(url) {
        ViewMode::Viewer { token } => decode_token(&token),
        ViewMode::Composer => None,
    }
}

/// Letter to present for `url`: the decoded one, or the default composer state.
pub fn letter_or_default(url: &str) -> LetterDocument {
    letter_from_url(url).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LetterDocument {
        LetterDocument {
            text: "<p>Hi</p>".to_string(),
            animation_mode: AnimationMode::FadeIn,
            to_text: "Alice".to_string(),
            stamp: Some(ImageSlot::new("https://img.example/s.png", "s.png")),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_is_url_safe() {
        let mut doc = sample();
        doc.text = "<p>Ünïcødé ✉️ & friends? #1 / 100% = yes</p>".to_string();
        let token = encode_token(&doc);
        assert!(!token.is_empty());
        for reserved in ['&', '=', '#', '?', '/', '+', '%', ' '] {
            assert!(!token.contains(reserved), "token contains {:?}", reserved);
        }
        assert_eq!(decode_token(&token).unwrap().text, doc.text);
    }

    #[test]
    fn test_scenario_full_round_trip() {
        let decoded = decode_token(&encode_token(&sample())).unwrap();
        assert_eq!(decoded.to_text, "Alice");
        assert_eq!(
            decoded.stamp.as_ref().map(|s| s.source_ref.as_str()),
            Some("https://img.example/s.png")
        );
        assert_eq!(decoded.animation_mode, AnimationMode::FadeIn);
    }

    #[test]
    fn test_round_trip_matches_projection() {
        let mut doc = sample();
        doc.animation_speed = 8;
        doc.postmark_label = "PARIS".to_string();
        doc.seal = Some(ImageSlot::new("/assets/seals/wax.png", ""));
        doc.logo2 = Some(ImageSlot::new("https://img.example/l2.png", "l2.png"));
        doc.letter_text_color = "#112233".to_string();
        doc.id = Some("local-id".to_string());

        assert_eq!(decode_token(&encode_token(&doc)).unwrap(), doc.shareable());
    }

    #[test]
    fn test_local_preview_is_dropped() {
        let mut doc = sample();
        doc.stamp = Some(ImageSlot::new("data:image/png;base64,iVBORw0KGgo=", "s.png"));
        let decoded = decode_token(&encode_token(&doc)).unwrap();
        assert_eq!(decoded.stamp, None);
    }

    #[test]
    fn test_hidden_slot_is_omitted() {
        let mut doc = sample();
        if let Some(stamp) = doc.stamp.as_mut() {
            stamp.hidden = true;
        }
        let token = encode_token(&doc);
        let json = urlencoding::decode(
            &String::from_utf8(general_purpose::URL_SAFE_NO_PAD.decode(&token).unwrap()).unwrap(),
        )
        .unwrap()
        .into_owned();
        assert!(!json.contains("img.example"));
        assert_eq!(decode_token(&token).unwrap().stamp, None);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let json = r#"{"toText":"Bob","animationMode":"no-such-mode"}"#;
        let token = general_purpose::URL_SAFE_NO_PAD.encode(urlencoding::encode(json).as_bytes());
        let doc = decode_token(&token).unwrap();
        let defaults = LetterDocument::default();
        assert_eq!(doc.to_text, "Bob");
        assert_eq!(doc.from_text, defaults.from_text);
        assert_eq!(doc.animation_mode, defaults.animation_mode);
        assert_eq!(doc.letter_font_size_px, defaults.letter_font_size_px);
    }

    fn token_for(json: &str) -> String {
        general_purpose::URL_SAFE_NO_PAD.encode(urlencoding::encode(json).as_bytes())
    }

    #[test]
    fn test_odd_numeric_fields_fall_back_per_field() {
        let doc = decode_token(&token_for(r#"{"toText":"Bob","animationSpeed":7.5}"#)).unwrap();
        assert_eq!(doc.to_text, "Bob");
        assert_eq!(doc.animation_speed, 8);

        let doc = decode_token(&token_for(r#"{"toText":"Bob","animationSpeed":300}"#)).unwrap();
        assert_eq!(doc.animation_speed, 10);

        let doc = decode_token(&token_for(r#"{"toText":"Bob","letterFontSize":"18"}"#)).unwrap();
        assert_eq!(doc.letter_font_size_px, 18);

        let doc = decode_token(&token_for(r#"{"toText":"Bob","toFontSize":"huge","fromText":7}"#)).unwrap();
        let defaults = LetterDocument::default();
        assert_eq!(doc.to_text, "Bob");
        assert_eq!(doc.to_font_size_px, defaults.to_font_size_px);
        assert_eq!(doc.from_text, defaults.from_text);
    }

    #[test]
    fn test_legacy_standard_alphabet_token() {
        let json = r#"{"toText":"Carol"}"#;
        let token = general_purpose::STANDARD.encode(urlencoding::encode(json).as_bytes());
        assert_eq!(decode_token(&token).unwrap().to_text, "Carol");
    }

    #[test]
    fn test_malformed_tokens_are_none() {
        for token in [
            "",
            "   ",
            "abc123",
            "!!!not base64!!!",
            "%%%",
            &general_purpose::URL_SAFE_NO_PAD.encode(b"not json at all"),
            &general_purpose::URL_SAFE_NO_PAD.encode(b"%E0%A4%A"),
            &general_purpose::URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0x00]),
            &general_purpose::URL_SAFE_NO_PAD.encode(b"[1,2,3]"),
        ] {
            assert!(decode_token(token).is_none(), "decoded {:?}", token);
        }
    }

    #[test]
    fn test_share_url_replaces_query_and_hash() {
        let doc = sample();
        let url = share_url("https://post.example/app/?letter=old#letter=older", &doc);
        assert!(url.starts_with("https://post.example/app/?letter="));
        assert_eq!(url.matches('?').count(), 1);
        assert!(!url.contains('#'));
        assert_eq!(letter_from_url(&url).unwrap().to_text, "Alice");
    }

    #[test]
    fn test_view_mode_detection() {
        assert!(is_viewer_mode("https://post.example/?letter=abc123"));
        assert!(is_viewer_mode("https://post.example/#letter=abc123"));
        assert!(is_viewer_mode("https://post.example/?utm=x&letter=abc123"));
        assert!(!is_viewer_mode("https://post.example/"));
        assert!(!is_viewer_mode("https://post.example/?letters=abc"));
        assert!(!is_viewer_mode("https://post.example/?letter="));
    }

    #[test]
    fn test_hash_takes_precedence() {
        let from_hash = encode_token(&LetterDocument {
            to_text: "Hash".to_string(),
            ..Default::default()
        });
        let from_query = encode_token(&LetterDocument {
            to_text: "Query".to_string(),
            ..Default::default()
        });
        let url = format!("https://post.example/?letter={}#letter={}", from_query, from_hash);
        assert_eq!(view_mode(&url), ViewMode::Viewer { token: from_hash });
        assert_eq!(letter_from_url(&url).unwrap().to_text, "Hash");
    }

    #[test]
    fn test_undecodable_viewer_url_falls_back_to_default() {
        let doc = letter_or_default("https://post.example/?letter=abc123");
        assert_eq!(doc, LetterDocument::default());
    }
}
