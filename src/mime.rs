//! Plain-text resolution for Gmail message payloads.
//!
//! Gmail returns a message body as a tree of parts: `multipart/*` containers
//! with child parts, and leaves carrying a base64url-encoded body. This module
//! turns that tree into the best available plain-text rendering of the email:
//!
//! 1. Every `text/plain` leaf found anywhere in the tree, in document order.
//! 2. Only if there are none, every `text/html` leaf converted to text.
//! 3. Otherwise an empty string.
//!
//! Resolution never fails. Missing bodies, missing child lists, malformed
//! base64 and invalid UTF-8 all degrade to smaller (or empty) contributions.
//!
//! Note that plain text wins globally: a single short `text/plain` disclaimer
//! anywhere in the tree hides every HTML part, even when the HTML branch of a
//! `multipart/alternative` is the richer rendering.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use scraper::{ElementRef, Html};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Separator placed between fragments in the resolved text.
const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Elements dropped with their whole subtree before HTML text extraction.
const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "head", "meta", "link"];

/// URL-safe base64 that accepts missing padding and stray trailing bits.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// A message part exactly as the Gmail API serializes it.
///
/// Every field is optional on the wire; serde defaults keep malformed or
/// partial payloads deserializable.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePart {
    pub mime_type: String,
    pub headers: Vec<Header>,
    pub body: Option<MessagePartBody>,
    pub parts: Option<Vec<MessagePart>>,
}

/// A single `name: value` header of a message part.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Body of a message part. `data` is base64url and absent for containers.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct MessagePartBody {
    pub data: Option<String>,
    pub size: u64,
}

impl MessagePart {
    /// Value of the first header named `name` (ASCII case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn encoded_body(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_ref())
            .filter(|data| !data.is_empty())
            .cloned()
    }
}

/// A payload node classified by the kind of content it carries.
///
/// Text bodies stay encoded until the tree is walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeNode {
    PlainText(Option<String>),
    Html(Option<String>),
    Multipart(Vec<MimeNode>),
    Other(String),
}

impl From<&MessagePart> for MimeNode {
    fn from(part: &MessagePart) -> Self {
        let mime_type = part.mime_type.trim().to_ascii_lowercase();
        if mime_type == "text/plain" {
            MimeNode::PlainText(part.encoded_body())
        } else if mime_type == "text/html" {
            MimeNode::Html(part.encoded_body())
        } else if mime_type.starts_with("multipart/") {
            let children = part
                .parts
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(MimeNode::from)
                .collect();
            MimeNode::Multipart(children)
        } else {
            MimeNode::Other(mime_type)
        }
    }
}

/// Text collected from one payload tree, before the final join.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Fragments {
    pub plain: Vec<String>,
    pub html: Vec<String>,
}

impl MimeNode {
    /// Walk this node depth-first, appending decoded text to `fragments`.
    pub fn collect_into(&self, fragments: &mut Fragments) {
        match self {
            MimeNode::PlainText(Some(data)) => push_decoded(&mut fragments.plain, data),
            MimeNode::Html(Some(data)) => push_decoded(&mut fragments.html, data),
            MimeNode::Multipart(children) => {
                for child in children {
                    child.collect_into(fragments);
                }
            }
            MimeNode::PlainText(None) | MimeNode::Html(None) => {}
            MimeNode::Other(mime_type) => debug!(%mime_type, "Skipping non-text part"),
        }
    }

    pub fn fragments(&self) -> Fragments {
        let mut fragments = Fragments::default();
        self.collect_into(&mut fragments);
        fragments
    }
}

impl Fragments {
    /// Join into the final text, preferring plain fragments over HTML ones.
    pub fn into_text(self) -> String {
        if !self.plain.is_empty() {
            return self.plain.join(FRAGMENT_SEPARATOR);
        }
        self.html
            .iter()
            .map(|html| html_to_text(html))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(FRAGMENT_SEPARATOR)
    }
}

/// Resolve the best plain-text rendering of a Gmail message payload.
#[instrument(level = "debug", skip_all, fields(mime_type = %payload.mime_type))]
pub fn resolve_text(payload: &MessagePart) -> String {
    let fragments = MimeNode::from(payload).fragments();
    debug!(
        plain = fragments.plain.len(),
        html = fragments.html.len(),
        "Collected body fragments"
    );
    fragments.into_text()
}

fn push_decoded(into: &mut Vec<String>, data: &str) {
    let text = decode_body(data);
    if !text.is_empty() {
        into.push(text);
    }
}

/// Decode a base64url body without ever failing.
///
/// Bytes outside the alphabet are skipped, the standard `+`/`/` symbols are
/// accepted as their URL-safe equivalents, and a dangling final symbol that
/// cannot form a byte is dropped. Padding that completes a quantum ends the
/// data; anything after it is ignored. Invalid UTF-8 becomes U+FFFD.
pub fn decode_body(data: &str) -> String {
    let mut cleaned: Vec<u8> = Vec::with_capacity(data.len());
    let mut pads = 0usize;
    for b in data.bytes() {
        let symbol = match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => b,
            b'+' => b'-',
            b'/' => b'_',
            b'=' => {
                let quad_pos = cleaned.len() % 4;
                pads += 1;
                if quad_pos >= 2 && quad_pos + pads >= 4 {
                    break;
                }
                continue;
            }
            _ => continue,
        };
        pads = 0;
        cleaned.push(symbol);
    }
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }

    match LENIENT_URL_SAFE.decode(&cleaned) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!(error = %e, "Undecodable body; treating as empty");
            String::new()
        }
    }
}

/// Convert an HTML document or fragment to plain text.
///
/// `script`, `style`, `head`, `meta` and `link` elements are removed with
/// their content. `noscript` content, which the parser keeps as raw markup,
/// is converted in turn. Text nodes are split into lines, each line is
/// trimmed with inner whitespace runs collapsed, and empty lines are dropped.
///
/// Converting the output again is a no-op unless the source carried
/// entity-escaped markup: `&lt;script&gt;` becomes a literal `<script>` in
/// the text, which a second pass would then strip.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut pieces = Vec::new();
    collect_text(document.root_element(), &mut pieces);

    pieces
        .join("\n")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, pieces: &mut Vec<String>) {
    let raw_markup = element.value().name().eq_ignore_ascii_case("noscript");
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let text: &str = text;
            if raw_markup {
                pieces.push(html_to_text(text));
            } else {
                pieces.push(text.to_owned());
            }
        } else if let Some(child) = ElementRef::wrap(child) {
            let name = child.value().name();
            if !SKIPPED_ELEMENTS.iter().any(|skip| name.eq_ignore_ascii_case(skip)) {
                collect_text(child, pieces);
            }
        }
    }
}
