//! Chapter sequence codec for the persisted `Work::content` blob.
//!
//! Layout: the [`HEADER`] line, then for every chapter a title field and a
//! content field, each written as `{byte_len}:{bytes}`. Field text is never
//! scanned for delimiters, so titles and bodies may contain anything,
//! including the header itself.
//!
//! An empty sequence serializes to the empty document, which parses back to
//! a single empty chapter. Blobs without the header are legacy plain text and
//! become one chapter.

use thiserror::Error;

use crate::work::Chapter;

/// First line of every serialized chapter document.
pub const HEADER: &str = "quillpad:chapters:v1\n";

/// Decode failure for a headered blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A field has no `:` after its length prefix.
    #[error("missing length prefix at byte {offset}")]
    MissingLength {
        /// Byte offset of the field within the blob.
        offset: usize,
    },
    /// The length prefix is not a decimal number.
    #[error("invalid length prefix {prefix:?} at byte {offset}")]
    BadLength {
        /// Byte offset of the field within the blob.
        offset: usize,
        /// Offending prefix text.
        prefix: String,
    },
    /// The blob ends before the declared field length.
    #[error("field at byte {offset} declares {declared} bytes but only {available} remain")]
    Truncated {
        /// Byte offset of the field within the blob.
        offset: usize,
        /// Declared length.
        declared: usize,
        /// Bytes actually left.
        available: usize,
    },
    /// The declared length ends inside a UTF-8 character.
    #[error("field at byte {offset} ends inside a character")]
    SplitCharacter {
        /// Byte offset of the field within the blob.
        offset: usize,
    },
    /// A title field is not followed by a content field.
    #[error("chapter {index} has a title but no content field")]
    MissingContent {
        /// Zero-based chapter index.
        index: usize,
    },
}

/// Serializes chapters into the persisted document form.
pub fn serialize(chapters: &[Chapter]) -> String {
    if chapters.is_empty() {
        return String::new();
    }

    let body_len: usize = chapters
        .iter()
        .map(|c| c.title.len() + c.content.len() + 16)
        .sum();
    let mut out = String::with_capacity(HEADER.len() + body_len);
    out.push_str(HEADER);
    for chapter in chapters {
        push_field(&mut out, &chapter.title);
        push_field(&mut out, &chapter.content);
    }
    out
}

/// Parses a persisted document. Always yields at least one chapter.
pub fn parse(blob: &str) -> Result<Vec<Chapter>, CodecError> {
    if blob.is_empty() {
        return Ok(vec![Chapter::default()]);
    }

    let Some(mut rest) = blob.strip_prefix(HEADER) else {
        tracing::debug!(len = blob.len(), "parsing legacy plain-text work content");
        return Ok(vec![Chapter::new("", blob)]);
    };

    let mut chapters = Vec::new();
    while !rest.is_empty() {
        let (title, after_title) = take_field(rest, blob.len() - rest.len())?;
        if after_title.is_empty() {
            return Err(CodecError::MissingContent {
                index: chapters.len(),
            });
        }
        let (content, after_content) = take_field(after_title, blob.len() - after_title.len())?;
        chapters.push(Chapter::new(title, content));
        rest = after_content;
    }

    if chapters.is_empty() {
        chapters.push(Chapter::default());
    }
    Ok(chapters)
}

fn push_field(out: &mut String, text: &str) {
    out.push_str(&text.len().to_string());
    out.push(':');
    out.push_str(text);
}

fn take_field(input: &str, offset: usize) -> Result<(&str, &str), CodecError> {
    let colon = input
        .find(':')
        .ok_or(CodecError::MissingLength { offset })?;
    let prefix = &input[..colon];
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::BadLength {
            offset,
            prefix: prefix.to_string(),
        });
    }
    let declared: usize = prefix.parse().map_err(|_| CodecError::BadLength {
        offset,
        prefix: prefix.to_string(),
    })?;

    let body = &input[colon + 1..];
    if body.len() < declared {
        return Err(CodecError::Truncated {
            offset,
            declared,
            available: body.len(),
        });
    }
    if !body.is_char_boundary(declared) {
        return Err(CodecError::SplitCharacter { offset });
    }
    Ok(body.split_at(declared))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sequence_is_empty_document() {
        assert_eq!(serialize(&[]), "");
        assert_eq!(parse("").expect("parse"), vec![Chapter::default()]);
    }

    #[test]
    fn single_empty_chapter_round_trips() {
        let chapters = vec![Chapter::default()];
        let blob = serialize(&chapters);
        assert_eq!(blob, format!("{HEADER}0:0:"));
        assert_eq!(parse(&blob).expect("parse"), chapters);
    }

    #[test]
    fn delimiter_text_inside_fields_survives() {
        let chapters = vec![
            Chapter::new("3:abc", HEADER),
            Chapter::new(format!("{HEADER}0:"), "12:"),
            Chapter::new("第一章", "他说：“好。”"),
        ];
        assert_eq!(parse(&serialize(&chapters)).expect("parse"), chapters);
    }

    #[test]
    fn legacy_blob_becomes_one_chapter() {
        let parsed = parse("plain old text\nwith lines").expect("parse");
        assert_eq!(parsed, vec![Chapter::new("", "plain old text\nwith lines")]);
    }

    #[test]
    fn header_only_yields_one_empty_chapter() {
        assert_eq!(parse(HEADER).expect("parse"), vec![Chapter::default()]);
    }

    #[test]
    fn malformed_blobs_are_rejected() {
        assert!(matches!(
            parse(&format!("{HEADER}5:ab")),
            Err(CodecError::Truncated { declared: 5, .. })
        ));
        assert!(matches!(
            parse(&format!("{HEADER}x:ab")),
            Err(CodecError::BadLength { .. })
        ));
        assert!(matches!(
            parse(&format!("{HEADER}2:ab")),
            Err(CodecError::MissingContent { index: 0 })
        ));
        assert!(matches!(
            parse(&format!("{HEADER}0:1:é")),
            Err(CodecError::SplitCharacter { .. })
        ));
        assert!(matches!(
            parse(&format!("{HEADER}0:0:abc")),
            Err(CodecError::MissingLength { .. })
        ));
    }
}
