/// Animated fragment renderer: letter markup -> tree of timed fragments
///
/// Every text node is cut into chunks (words or characters) and each chunk
/// gets a reveal index from a single pre-order counter over the whole tree,
/// so nested content reveals in reading order. The counter is threaded
/// through the recursion as an explicit accumulator.
use crate::letter::{AnimationMode, LetterDocument, NEUTRAL_SPEED};
use crate::markup::{parse_markup, MarkupElement, MarkupNode};
use serde::Serialize;
use std::collections::BTreeMap;

const WORD_INTERVAL_SECS: f64 = 0.1;
const CHAR_INTERVAL_SECS: f64 = 0.03;
const WORD_DURATION_SECS: f64 = 0.3;
const CHAR_DURATION_SECS: f64 = 0.1;
const FADE_DURATION_SECS: f64 = 1.0;

/// Delay/duration pair for an "initial style -> final style" transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Timing {
    pub delay: f64,
    pub duration: f64,
}

impl Timing {
    pub fn end(&self) -> f64 {
        self.delay + self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChunk {
    pub text: String,
    /// Global reveal index in document order
    pub index: usize,
    pub timing: Timing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementFragment {
    pub tag: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub style: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Set on list items, which fade in as a unit with their first content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal: Option<Timing>,
    pub children: Vec<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Fragment {
    /// Independently animated word or character
    Chunk(TextChunk),
    /// Unsplit text (fade-in mode, where the whole body animates at once)
    Text { text: String },
    Element(ElementFragment),
}

/// Renderer output for one letter body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedLetter {
    pub mode: AnimationMode,
    /// Whole-body reveal (fade-in only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal: Option<Timing>,
    pub fragments: Vec<Fragment>,
    pub chunk_count: usize,
}

impl RenderedLetter {
    /// All chunks in reveal order.
    pub fn chunks(&self) -> Vec<&TextChunk> {
        fn walk<'a>(fragments: &'a [Fragment], out: &mut Vec<&'a TextChunk>) {
            for fragment in fragments {
                match fragment {
                    Fragment::Chunk(chunk) => out.push(chunk),
                    Fragment::Element(element) => walk(&element.children, out),
                    Fragment::Text { .. } => {}
                }
            }
        }
        let mut out = Vec::with_capacity(self.chunk_count);
        walk(&self.fragments, &mut out);
        out
    }

    /// Seconds until the last piece of the letter is fully visible.
    pub fn total_duration(&self) -> f64 {
        let chunks_end = self
            .chunks()
            .iter()
            .map(|c| c.timing.end())
            .fold(0.0_f64, f64::max);
        self.reveal.map(|r| r.end()).unwrap_or(0.0).max(chunks_end)
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Mode/speed/base-delay parameters of one rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    pub mode: AnimationMode,
    pub speed_factor: f64,
    pub base_delay: f64,
}

impl Timeline {
    pub fn new(mode: AnimationMode, speed_factor: f64, base_delay: f64) -> Self {
        let speed_factor = if speed_factor.is_finite() {
            speed_factor.clamp(1.0, 10.0)
        } else {
            f64::from(NEUTRAL_SPEED)
        };
        Self {
            mode,
            speed_factor,
            base_delay: if base_delay.is_finite() { base_delay.max(0.0) } else { 0.0 },
        }
    }

    pub fn for_letter(doc: &LetterDocument, base_delay: f64) -> Self {
        Self::new(doc.animation_mode, f64::from(doc.speed()), base_delay)
    }

    fn scale(&self) -> f64 {
        self.speed_factor / f64::from(NEUTRAL_SPEED)
    }

    /// Delay increment between consecutive chunks
    pub fn chunk_interval(&self) -> f64 {
        let base = match self.mode {
            AnimationMode::WordByWord => WORD_INTERVAL_SECS,
            AnimationMode::CharacterByCharacter | AnimationMode::Typewriter => CHAR_INTERVAL_SECS,
            AnimationMode::FadeIn => 0.0,
        };
        base / self.scale()
    }

    pub fn chunk_duration(&self) -> f64 {
        match self.mode {
            AnimationMode::Typewriter => 0.0,
            AnimationMode::WordByWord => WORD_DURATION_SECS / self.scale(),
            AnimationMode::CharacterByCharacter => CHAR_DURATION_SECS / self.scale(),
            AnimationMode::FadeIn => FADE_DURATION_SECS / self.scale(),
        }
    }

    pub fn timing(&self, index: usize) -> Timing {
        Timing {
            delay: self.base_delay + index as f64 * self.chunk_interval(),
            duration: self.chunk_duration(),
        }
    }

    fn split<'a>(&self, text: &'a str) -> Vec<String> {
        match self.mode {
            AnimationMode::WordByWord => {
                let parts: Vec<&'a str> = text.split(' ').collect();
                let last = parts.len().saturating_sub(1);
                parts
                    .into_iter()
                    .enumerate()
                    .map(|(i, part)| if i < last { format!("{} ", part) } else { part.to_string() })
                    .collect()
            }
            _ => text.chars().map(String::from).collect(),
        }
    }
}

/// Render letter markup into timed fragments. Pure: the same inputs always
/// yield the same delays, so an animation can be restarted by re-rendering.
pub fn render_markup(markup: &str, timeline: Timeline) -> RenderedLetter {
    let nodes = parse_markup(markup);

    if timeline.mode == AnimationMode::FadeIn {
        let fragments = static_nodes(&nodes);
        let reveal = (!fragments.is_empty()).then(|| Timing {
            delay: timeline.base_delay,
            duration: timeline.chunk_duration(),
        });
        return RenderedLetter {
            mode: timeline.mode,
            reveal,
            fragments,
            chunk_count: 0,
        };
    }

    let (fragments, chunk_count) = timed_nodes(&nodes, 0, &timeline);
    RenderedLetter {
        mode: timeline.mode,
        reveal: None,
        fragments,
        chunk_count,
    }
}

/// Render the body of a letter with its own mode and speed.
pub fn render_letter(doc: &LetterDocument, base_delay: f64) -> RenderedLetter {
    render_markup(&doc.text, Timeline::for_letter(doc, base_delay))
}

/// Returns the fragments and the next free reveal index.
fn timed_nodes(nodes: &[MarkupNode], mut next: usize, timeline: &Timeline) -> (Vec<Fragment>, usize) {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            MarkupNode::Text(text) => {
                for piece in timeline.split(text) {
                    out.push(Fragment::Chunk(TextChunk {
                        text: piece,
                        index: next,
                        timing: timeline.timing(next),
                    }));
                    next += 1;
                }
            }
            MarkupNode::Element(element) => {
                let reveal = (element.tag == "li").then(|| timeline.timing(next));
                let (children, after) = timed_nodes(&element.children, next, timeline);
                out.push(Fragment::Element(element_fragment(element, reveal, children)));
                next = after;
            }
        }
    }
    (out, next)
}

fn static_nodes(nodes: &[MarkupNode]) -> Vec<Fragment> {
    nodes
        .iter()
        .map(|node| match node {
            MarkupNode::Text(text) => Fragment::Text { text: text.clone() },
            MarkupNode::Element(element) => {
                Fragment::Element(element_fragment(element, None, static_nodes(&element.children)))
            }
        })
        .collect()
}

fn element_fragment(element: &MarkupElement, reveal: Option<Timing>, children: Vec<Fragment>) -> ElementFragment {
    let mut style = element.attr("style").map(parse_style).unwrap_or_default();
    let marker = match element.tag.as_str() {
        "ul" => Some(("listStyleType", "disc")),
        "ol" => Some(("listStyleType", "decimal")),
        "li" => Some(("display", "list-item")),
        _ => None,
    };
    if let Some((property, value)) = marker {
        style.entry(property.to_string()).or_insert_with(|| value.to_string());
    }

    let is_link = element.tag == "a";
    ElementFragment {
        tag: element.tag.clone(),
        style,
        class: if is_link { None } else { element.attr("class").map(str::to_string) },
        href: if is_link { element.attr("href").map(str::to_string) } else { None },
        target: if is_link { element.attr("target").map(str::to_string) } else { None },
        reveal,
        children,
    }
}

/// `"font-size: 12px; color: red"` -> `{fontSize: "12px", color: "red"}`
pub fn parse_style(declarations: &str) -> BTreeMap<String, String> {
    declarations
        .split(';')
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            Some((camel_case_property(property), value.to_string()))
        })
        .collect()
}

fn camel_case_property(property: &str) -> String {
    let property = property.to_ascii_lowercase();
    if property.starts_with("--") {
        // Custom properties keep their name.
        return property;
    }
    let mut out = String::with_capacity(property.len());
    let mut upper = false;
    // Vendor prefixes ("-webkit-") become a capitalised leading word.
    for c in property.chars() {
        if c == '-' {
            upper = true;
            continue;
        }
        if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(mode: AnimationMode, speed: f64) -> Timeline {
        Timeline::new(mode, speed, 0.0)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reveal_order_crosses_inline_wrappers() {
        let out = render_markup(
            "<p>ab <b>cd</b></p>",
            timeline(AnimationMode::CharacterByCharacter, 5.0),
        );
        let chunks = out.chunks();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", " ", "c", "d"]);
        for pair in chunks.windows(2) {
            assert!(pair[0].timing.delay < pair[1].timing.delay);
            assert_eq!(pair[0].index + 1, pair[1].index);
        }
        assert_eq!(out.chunk_count, 5);
    }

    #[test]
    fn test_typewriter_is_instant() {
        for speed in [1.0, 3.0, 5.0, 7.5, 10.0] {
            let out = render_markup("<p>hello <i>there</i></p>", timeline(AnimationMode::Typewriter, speed));
            assert!(!out.chunks().is_empty());
            assert!(out.chunks().iter().all(|c| c.timing.duration == 0.0));
        }
    }

    #[test]
    fn test_speed_scaling_halves_timings() {
        for mode in [AnimationMode::WordByWord, AnimationMode::CharacterByCharacter] {
            let slow = timeline(mode, 5.0);
            let fast = timeline(mode, 10.0);
            assert!(approx(fast.chunk_interval() * 2.0, slow.chunk_interval()));
            assert!(approx(fast.chunk_duration() * 2.0, slow.chunk_duration()));

            let slow_out = render_markup("<p>one two three</p>", slow);
            let fast_out = render_markup("<p>one two three</p>", fast);
            let step = |r: &RenderedLetter| r.chunks()[1].timing.delay - r.chunks()[0].timing.delay;
            assert!(approx(step(&fast_out) * 2.0, step(&slow_out)));
        }
        assert!(approx(timeline(AnimationMode::WordByWord, 5.0).chunk_interval(), 0.1));
        assert!(approx(timeline(AnimationMode::CharacterByCharacter, 5.0).chunk_duration(), 0.1));
        assert!(approx(timeline(AnimationMode::WordByWord, 5.0).chunk_duration(), 0.3));
    }

    #[test]
    fn test_delay_formula_with_base_delay() {
        let t = Timeline::new(AnimationMode::WordByWord, 2.5, 1.5);
        let out = render_markup("a b c", t);
        let chunks = out.chunks();
        assert!(approx(chunks[0].timing.delay, 1.5));
        assert!(approx(chunks[2].timing.delay, 1.5 + 2.0 * 0.1 / 0.5));
    }

    #[test]
    fn test_word_split_keeps_spacing() {
        let out = render_markup("a  b", timeline(AnimationMode::WordByWord, 5.0));
        let texts: Vec<&str> = out.chunks().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a ", " ", "b"]);
        assert_eq!(texts.concat(), "a  b");
    }

    #[test]
    fn test_list_items_share_the_global_counter() {
        let out = render_markup(
            "<p>hi</p><ol><li>one</li><li>two <ul><li>deep</li></ul></li></ol>",
            timeline(AnimationMode::WordByWord, 5.0),
        );
        let texts: Vec<(usize, &str)> = out.chunks().iter().map(|c| (c.index, c.text.as_str())).collect();
        assert_eq!(
            texts,
            vec![(0, "hi"), (1, "one"), (2, "two "), (3, ""), (4, "deep")]
        );

        let Fragment::Element(ol) = &out.fragments[1] else {
            panic!("expected <ol>");
        };
        assert_eq!(ol.style.get("listStyleType").map(String::as_str), Some("decimal"));
        let Fragment::Element(first_li) = &ol.children[0] else {
            panic!("expected <li>");
        };
        assert_eq!(first_li.style.get("display").map(String::as_str), Some("list-item"));
        assert_eq!(first_li.reveal, Some(out.chunks()[1].timing));

        let Fragment::Element(second_li) = &ol.children[1] else {
            panic!("expected <li>");
        };
        let Some(Fragment::Element(ul)) = second_li.children.get(2) else {
            panic!("expected nested <ul>");
        };
        assert_eq!(ul.style.get("listStyleType").map(String::as_str), Some("disc"));
        let Fragment::Element(deep_li) = &ul.children[0] else {
            panic!("expected nested <li>");
        };
        assert_eq!(deep_li.reveal, Some(out.chunks()[4].timing));
    }

    #[test]
    fn test_fade_in_is_one_unit() {
        let out = render_markup("<p>Hello <b>you</b></p>", Timeline::new(AnimationMode::FadeIn, 10.0, 0.5));
        assert!(out.chunks().is_empty());
        assert_eq!(
            out.reveal,
            Some(Timing {
                delay: 0.5,
                duration: 0.5
            })
        );
        assert!(approx(out.total_duration(), 1.0));
    }

    #[test]
    fn test_links_and_styles() {
        let out = render_markup(
            r#"<p><a href="https://x.example" target="_blank" class="fancy" onclick="x()">go</a><span style="color: #f00; font-size:12px; -webkit-text-stroke: 1px">!</span></p>"#,
            timeline(AnimationMode::WordByWord, 5.0),
        );
        let Fragment::Element(p) = &out.fragments[0] else {
            panic!("expected <p>");
        };
        let Fragment::Element(a) = &p.children[0] else {
            panic!("expected <a>");
        };
        assert_eq!(a.href.as_deref(), Some("https://x.example"));
        assert_eq!(a.target.as_deref(), Some("_blank"));
        assert_eq!(a.class, None);

        let Fragment::Element(span) = &p.children[1] else {
            panic!("expected <span>");
        };
        assert_eq!(span.style.get("color").map(String::as_str), Some("#f00"));
        assert_eq!(span.style.get("fontSize").map(String::as_str), Some("12px"));
        assert_eq!(span.style.get("WebkitTextStroke").map(String::as_str), Some("1px"));
    }

    #[test]
    fn test_empty_and_malformed_markup() {
        let empty = render_markup("", timeline(AnimationMode::Typewriter, 5.0));
        assert!(empty.is_empty());
        assert_eq!(empty.total_duration(), 0.0);
        assert!(render_markup("", timeline(AnimationMode::FadeIn, 5.0)).reveal.is_none());

        let broken = render_markup("<p>open <b>never closed", timeline(AnimationMode::CharacterByCharacter, 5.0));
        let text: String = broken.chunks().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(text, "open never closed");
    }

    #[test]
    fn test_rendering_is_repeatable() {
        let t = timeline(AnimationMode::WordByWord, 7.0);
        let markup = "<ul><li>a b</li><li>c</li></ul>";
        assert_eq!(render_markup(markup, t), render_markup(markup, t));
    }

    #[test]
    fn test_render_letter_uses_document_settings() {
        let doc = LetterDocument {
            text: "<p>Hi there</p>".to_string(),
            animation_mode: AnimationMode::Typewriter,
            animation_speed: 10,
            ..Default::default()
        };
        let out = render_letter(&doc, 0.0);
        assert_eq!(out.mode, AnimationMode::Typewriter);
        assert_eq!(out.chunk_count, 8);
        assert!(approx(out.chunks()[1].timing.delay, 0.015));
    }
}
