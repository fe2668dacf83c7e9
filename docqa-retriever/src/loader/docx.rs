//! Plain-text extraction from Office Open XML (`.docx`) documents.
//!
//! A `.docx` file is a zip container; the body text lives in `word/document.xml`
//! as `<w:t>` runs grouped into `<w:p>` paragraphs. Paragraphs come out separated
//! by a blank line, tabs and explicit breaks are kept, all other markup dropped.

use regex::{Captures, Regex};
use std::io::{Cursor, Read};
use std::sync::LazyLock;

const DOCUMENT_PART: &str = "word/document.xml";

static BODY_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|(<w:tab\s*/>)|(<w:(?:br|cr)\b[^>]*/>)|</w:p>")
        .expect("static docx token pattern")
});

static XML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);").expect("static entity pattern")
});

/// Extract the body text of a `.docx` held in memory.
pub fn extract_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a zip container: {e}"))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| format!("missing {DOCUMENT_PART}: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable {DOCUMENT_PART}: {e}"))?;

    Ok(plaintext_from_document_xml(&xml))
}

/// Convert the XML of `word/document.xml` to plain text.
pub fn plaintext_from_document_xml(xml: &str) -> String {
    let mut text = String::new();
    for caps in BODY_TOKENS.captures_iter(xml) {
        if let Some(run) = caps.get(1) {
            text.push_str(&unescape(run.as_str()));
        } else if caps.get(2).is_some() {
            text.push('\t');
        } else if caps.get(3).is_some() {
            text.push('\n');
        } else {
            text.push_str("\n\n");
        }
    }

    text.truncate(text.trim_end().len());
    text
}

fn unescape(raw: &str) -> String {
    XML_ENTITY
        .replace_all(raw, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") => u32::from_str_radix(&entity[2..], 16)
                    .ok()
                    .and_then(char::from_u32),
                _ => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
