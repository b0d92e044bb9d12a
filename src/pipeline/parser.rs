//! Response parser: split generated dialogue into typed fragments.
//!
//! The model is asked to emit `{"person": ..., "text": ...}` objects
//! separated by `#`. Output is not guaranteed well-formed, so decoding is a
//! per-fragment `Result` and failures are dropped, never raised.
//!
//! A `#` inside a message's text corrupts fragment boundaries. Nothing
//! escapes it; affected pieces simply fail to decode.

use serde::Deserialize;
use tracing::{debug, warn};

use super::types::Fragment;

/// Fragment separator in generated output.
pub const DELIMITER: char = '#';

/// Why a fragment was dropped.
#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    #[error("empty fragment")]
    Empty,

    #[error("malformed fragment: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("blank field: {0}")]
    BlankField(&'static str),
}

/// Expected shape of one fragment.
#[derive(Debug, Deserialize)]
struct RawFragment {
    person: String,
    text: String,
}

/// Decode a single fragment.
pub fn decode_fragment(piece: &str) -> Result<Fragment, FragmentError> {
    let piece = piece.trim();
    if piece.is_empty() {
        return Err(FragmentError::Empty);
    }

    let raw: RawFragment = serde_json::from_str(piece)?;
    let author = raw.person.trim();
    let text = raw.text.trim();
    if author.is_empty() {
        return Err(FragmentError::BlankField("person"));
    }
    if text.is_empty() {
        return Err(FragmentError::BlankField("text"));
    }

    Ok(Fragment::new(author, text))
}

/// Decode every `#`-separated piece, keeping the per-piece result.
pub fn decode_fragments(raw: &str) -> impl Iterator<Item = Result<Fragment, FragmentError>> + '_ {
    raw.split(DELIMITER).map(decode_fragment)
}

/// Parse a raw completion into fragments, in order, dropping malformed ones.
pub fn parse(raw: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    for (index, result) in decode_fragments(raw).enumerate() {
        match result {
            Ok(fragment) => fragments.push(fragment),
            // Leading/trailing delimiters produce empty pieces; not worth a warning.
            Err(FragmentError::Empty) => debug!(index, "Skipping empty fragment"),
            Err(e) => warn!(index, error = %e, "Dropping malformed fragment"),
        }
    }
    debug!(count = fragments.len(), "Parsed dialogue fragments");
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_well_formed_fragments() {
        let raw = r#"{"person":"Ana","text":"build failing"}#{"person":"Leo","text":"on it"}"#;
        let fragments = parse(raw);
        assert_eq!(
            fragments,
            vec![
                Fragment::new("Ana", "build failing"),
                Fragment::new("Leo", "on it"),
            ]
        );
    }

    #[test]
    fn drops_malformed_fragment_and_keeps_the_rest() {
        let raw = r#"not-json#{"person":"Ana","text":"ok"}"#;
        assert_eq!(parse(raw), vec![Fragment::new("Ana", "ok")]);
    }

    #[test]
    fn missing_delimiter_is_a_single_fragment() {
        let raw = r#"{"person":"Ana","text":"just me"}"#;
        assert_eq!(parse(raw), vec![Fragment::new("Ana", "just me")]);
    }

    #[test]
    fn missing_delimiter_free_text_yields_nothing() {
        assert!(parse("Ana: build failing\nLeo: on it").is_empty());
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse("").is_empty());
        assert!(parse("###").is_empty());
    }

    #[test]
    fn tolerates_whitespace_and_newlines_between_fragments() {
        let raw = "\n{\"person\":\"Ana\",\"text\":\"hi\"}\n#\n  {\"person\":\"Leo\",\"text\":\"hey\"}  \n#\n";
        let fragments = parse(raw);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[1].author, "Leo");
    }

    #[test]
    fn extra_fields_are_tolerated() {
        let raw = r#"{"person":"Ana","text":"hi","mood":"tired"}"#;
        assert_eq!(parse(raw), vec![Fragment::new("Ana", "hi")]);
    }

    #[test]
    fn rejects_missing_or_mistyped_fields() {
        assert!(matches!(
            decode_fragment(r#"{"person":"Ana"}"#),
            Err(FragmentError::Malformed(_))
        ));
        assert!(matches!(
            decode_fragment(r#"{"person":"Ana","text":42}"#),
            Err(FragmentError::Malformed(_))
        ));
        assert!(matches!(
            decode_fragment(r#"["Ana","hi"]"#),
            Err(FragmentError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_blank_fields() {
        assert!(matches!(
            decode_fragment(r#"{"person":"  ","text":"hi"}"#),
            Err(FragmentError::BlankField("person"))
        ));
        assert!(matches!(
            decode_fragment(r#"{"person":"Ana","text":""}"#),
            Err(FragmentError::BlankField("text"))
        ));
    }

    #[test]
    fn delimiter_inside_text_corrupts_boundaries() {
        let raw = r#"{"person":"Ana","text":"ticket #42 is back"}#{"person":"Leo","text":"on it"}"#;
        // The first object is split in two and both halves fail to decode.
        assert_eq!(parse(raw), vec![Fragment::new("Leo", "on it")]);
    }

    #[test]
    fn never_returns_more_than_piece_count() {
        let inputs = [
            "",
            "#",
            r#"{"person":"A","text":"x"}"#,
            r#"{"person":"A","text":"x"}#garbage#{"person":"B","text":"y"}"#,
            r#"{}#{"person":"","text":""}#{"text":"t","person":"p"}"#,
        ];
        for input in inputs {
            let pieces = input.split(DELIMITER).count();
            let fragments = parse(input);
            assert!(fragments.len() <= pieces, "input: {input}");
            for f in fragments {
                assert!(!f.author.is_empty() && !f.text.is_empty());
            }
        }
    }
}
