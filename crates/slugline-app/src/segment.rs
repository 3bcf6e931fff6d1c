//! Screenplay segmentation: split extracted script text into ordered scenes.
//!
//! Scene boundaries are the usual sluglines (`INT.`/`EXT.` headings). A
//! script with no recognizable headings still yields one catch-all scene so
//! the pipeline can proceed.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

const MIN_HEADER_CHARS: usize = 5;
const FALLBACK_HEADER: &str = "SCENE 1 (HEADER NOT FOUND)";

/// One ordered scene produced from a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneUnit {
    /// 1-based position in the script.
    pub sequence_number: u32,
    /// Scene heading, e.g. `INT. COFFEE SHOP - DAY`.
    pub header: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("document contains no text")]
    EmptyDocument,
    #[error("document is not valid UTF-8 text")]
    InvalidEncoding,
}

/// Splits a source document into ordered scene units. Pure and synchronous;
/// constructed once at startup and shared by reference, with no hidden
/// module-level state.
pub trait Segmenter: Send + Sync {
    fn segment(&self, bytes: &[u8]) -> Result<Vec<SceneUnit>, SegmentError>;
}

fn header_regex() -> &'static Regex {
    static HEADER_RE: OnceLock<Regex> = OnceLock::new();
    HEADER_RE.get_or_init(|| {
        Regex::new(r"(?mi)^[ \t]*((?:INT\.|EXT\.|I/E\.|INT\./EXT\.|EXT\./INT\.)[^\r\n]*)")
            .expect("scene header regex compiles")
    })
}

/// Heading-based screenplay segmenter.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScreenplaySegmenter;

impl ScreenplaySegmenter {
    pub const fn new() -> Self {
        Self
    }
}

impl Segmenter for ScreenplaySegmenter {
    fn segment(&self, bytes: &[u8]) -> Result<Vec<SceneUnit>, SegmentError> {
        let text = std::str::from_utf8(bytes).map_err(|_| SegmentError::InvalidEncoding)?;
        let text = text.replace("\r\n", "\n");
        if text.trim().is_empty() {
            return Err(SegmentError::EmptyDocument);
        }

        struct Boundary {
            header: String,
            content_start: usize,
            header_start: usize,
        }

        let mut boundaries: Vec<Boundary> = Vec::new();
        for captures in header_regex().captures_iter(&text) {
            let matched = captures.get(1).expect("capture group 1 always present");
            let header = matched.as_str().trim().to_string();
            if header.chars().count() < MIN_HEADER_CHARS {
                continue;
            }
            boundaries.push(Boundary {
                header,
                content_start: matched.end(),
                header_start: matched.start(),
            });
        }

        if boundaries.is_empty() {
            return Ok(vec![SceneUnit {
                sequence_number: 1,
                header: FALLBACK_HEADER.to_string(),
                content: text.trim().to_string(),
            }]);
        }

        let mut units = Vec::with_capacity(boundaries.len());
        for (idx, boundary) in boundaries.iter().enumerate() {
            let content_end = boundaries
                .get(idx + 1)
                .map(|next| next.header_start)
                .unwrap_or(text.len());
            let content = text[boundary.content_start..content_end].trim().to_string();
            units.push(SceneUnit {
                sequence_number: (idx + 1) as u32,
                header: boundary.header.clone(),
                content,
            });
        }
        debug_assert!(units
            .iter()
            .enumerate()
            .all(|(idx, unit)| unit.sequence_number == (idx + 1) as u32));
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "\
INT. COFFEE SHOP - DAY

MARA sips her coffee. The door chimes.

EXT. HARBOR - NIGHT

Fog rolls over the pier. JANEK waits.

I/E. CAR - CONTINUOUS

The engine idles.
";

    #[test]
    fn splits_on_scene_headings_in_order() {
        let units = ScreenplaySegmenter::new()
            .segment(SCRIPT.as_bytes())
            .expect("segments");
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].header, "INT. COFFEE SHOP - DAY");
        assert_eq!(units[1].header, "EXT. HARBOR - NIGHT");
        assert_eq!(units[2].header, "I/E. CAR - CONTINUOUS");
        let sequence: Vec<u32> = units.iter().map(|u| u.sequence_number).collect();
        assert_eq!(sequence, vec![1, 2, 3]);
        assert!(units[0].content.contains("MARA sips her coffee"));
        assert!(units[2].content.contains("engine idles"));
    }

    #[test]
    fn text_without_headings_becomes_a_single_scene() {
        let units = ScreenplaySegmenter::new()
            .segment(b"Just prose with no sluglines at all.")
            .expect("segments");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].sequence_number, 1);
        assert_eq!(units[0].header, FALLBACK_HEADER);
    }

    #[test]
    fn empty_document_is_an_error() {
        let err = ScreenplaySegmenter::new()
            .segment(b"   \n  ")
            .expect_err("must fail");
        assert!(matches!(err, SegmentError::EmptyDocument));
    }

    #[test]
    fn non_utf8_input_is_an_error() {
        let err = ScreenplaySegmenter::new()
            .segment(&[0xff, 0xfe, 0x00])
            .expect_err("must fail");
        assert!(matches!(err, SegmentError::InvalidEncoding));
    }

    #[test]
    fn windows_line_endings_are_normalized() {
        let script = "INT. LAB - DAY\r\n\r\nBeakers bubble.\r\n";
        let units = ScreenplaySegmenter::new()
            .segment(script.as_bytes())
            .expect("segments");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].content, "Beakers bubble.");
    }
}
