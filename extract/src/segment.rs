//! Splitting document content into bounded, overlapping segments.
//!
//! Text is windowed by characters, page lists by pages; both use the same
//! index arithmetic in [`windows`].

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

/// Segmentation precondition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    /// The window would never advance.
    #[error("max_length ({max_length}) must be greater than overlap ({overlap})")]
    InvalidWindow {
        /// Requested window size.
        max_length: usize,
        /// Requested overlap.
        overlap: usize,
    },
}

/// One page of a page-oriented document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Extracted text, if the page had any.
    pub text: Option<String>,
    /// Page images as `data:` URIs, in page order.
    pub images: Vec<String>,
}

/// Window sizes for both content shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// When false every document becomes a single segment.
    pub enabled: bool,
    /// Characters per text segment.
    pub max_text_length: usize,
    /// Characters shared by adjacent text segments.
    pub text_overlap: usize,
    /// Pages per page-list segment.
    pub max_pages: usize,
    /// Pages shared by adjacent page-list segments.
    pub page_overlap: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_text_length: 8000,
            text_overlap: 200,
            max_pages: 4,
            page_overlap: 0,
        }
    }
}

impl SegmentationConfig {
    /// Checks both windows.
    ///
    /// # Errors
    /// Returns the first window whose size does not exceed its overlap.
    pub const fn validate(&self) -> Result<(), SegmentError> {
        if self.max_text_length <= self.text_overlap {
            return Err(SegmentError::InvalidWindow {
                max_length: self.max_text_length,
                overlap: self.text_overlap,
            });
        }
        if self.max_pages <= self.page_overlap {
            return Err(SegmentError::InvalidWindow {
                max_length: self.max_pages,
                overlap: self.page_overlap,
            });
        }
        Ok(())
    }
}

/// Index ranges of the chunks for content of length `len`.
///
/// Emits `[pos, pos + max_length)` clipped to `len`, advances by
/// `max_length - overlap`, and stops once `pos + overlap >= len`. The last
/// range therefore always ends at `len`, and content no longer than
/// `overlap` yields exactly one range.
///
/// # Errors
/// Returns [`SegmentError::InvalidWindow`] when `max_length <= overlap`.
pub fn windows(len: usize, max_length: usize, overlap: usize) -> Result<Vec<Range<usize>>, SegmentError> {
    if max_length <= overlap {
        return Err(SegmentError::InvalidWindow { max_length, overlap });
    }

    let step = max_length - overlap;
    let mut ranges = Vec::with_capacity(len / step + 1);
    let mut pos = 0;
    loop {
        ranges.push(pos..len.min(pos + max_length));
        pos += step;
        if pos + overlap >= len {
            break;
        }
    }
    Ok(ranges)
}

/// Splits `content` into character windows.
///
/// # Errors
/// Returns [`SegmentError::InvalidWindow`] when `max_length <= overlap`.
pub fn split_text(content: &str, max_length: usize, overlap: usize) -> Result<Vec<String>, SegmentError> {
    // Byte offset of every char boundary, including the end.
    let bounds: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();
    let char_len = bounds.len() - 1;

    Ok(windows(char_len, max_length, overlap)?
        .into_iter()
        .map(|r| content[bounds[r.start]..bounds[r.end]].to_string())
        .collect())
}

/// Splits a page list into page windows, aggregating each window into one
/// [`Page`]: texts joined by blank lines (`None` when no page had text) and
/// images flattened in order.
///
/// # Errors
/// Returns [`SegmentError::InvalidWindow`] when `max_pages <= overlap`.
pub fn split_pages(pages: &[Page], max_pages: usize, overlap: usize) -> Result<Vec<Page>, SegmentError> {
    Ok(windows(pages.len(), max_pages, overlap)?
        .into_iter()
        .map(|r| merge_pages(&pages[r]))
        .collect())
}

/// Collapses pages into one, the way a disabled segmenter sees a document.
#[must_use]
pub fn merge_pages(pages: &[Page]) -> Page {
    let texts: Vec<&str> = pages.iter().filter_map(|p| p.text.as_deref()).collect();
    Page {
        text: if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n\n"))
        },
        images: pages.iter().flat_map(|p| p.images.iter().cloned()).collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Rebuilds the source from chunks by dropping each chunk's leading overlap.
    fn reassemble(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let skip = if i == 0 { 0 } else { overlap };
            out.extend(chunk.chars().skip(skip));
        }
        out
    }

    #[test]
    fn test_windows_basic() {
        let ranges = windows(10, 4, 1).unwrap();
        assert_eq!(ranges, vec![0..4, 3..7, 6..10]);
    }

    #[test]
    fn test_windows_no_overlap_exact_fit() {
        assert_eq!(windows(8, 4, 0).unwrap(), vec![0..4, 4..8]);
    }

    #[test]
    fn test_short_content_is_single_chunk() {
        assert_eq!(split_text("abc", 10, 5).unwrap(), vec!["abc"]);
        // Shorter than the overlap itself.
        assert_eq!(split_text("ab", 10, 5).unwrap(), vec!["ab"]);
        assert_eq!(split_text("", 10, 5).unwrap(), vec![""]);
    }

    #[test]
    fn test_invalid_window_always_fails() {
        for text in ["", "a", "hello world"] {
            assert_eq!(
                split_text(text, 3, 3).unwrap_err(),
                SegmentError::InvalidWindow {
                    max_length: 3,
                    overlap: 3
                }
            );
            assert!(split_text(text, 2, 5).is_err());
        }
        assert!(split_pages(&[], 1, 1).is_err());
    }

    #[test]
    fn test_split_text_properties() {
        let text: String = ('a'..='z').cycle().take(97).collect();
        for (max, overlap) in [(10, 0), (10, 3), (7, 6), (50, 10), (97, 1), (200, 20)] {
            let chunks = split_text(&text, max, overlap).unwrap();

            assert_eq!(reassemble(&chunks, overlap), text, "max={max} overlap={overlap}");
            for pair in chunks.windows(2) {
                let tail: String = pair[0].chars().skip(pair[0].chars().count() - overlap).collect();
                let head: String = pair[1].chars().take(overlap).collect();
                assert_eq!(tail, head);
            }
            assert!(text.ends_with(chunks.last().unwrap().as_str()));
            assert!(chunks.iter().all(|c| c.chars().count() <= max));
        }
    }

    #[test]
    fn test_split_text_counts_chars_not_bytes() {
        let text = "héllo wörld ünïcode";
        let chunks = split_text(text, 5, 2).unwrap();
        assert_eq!(chunks[0], "héllo");
        assert_eq!(reassemble(&chunks, 2), text);
    }

    #[test]
    fn test_split_pages_aggregates() {
        let pages = vec![
            Page {
                text: Some("p1".to_string()),
                images: vec!["img1".to_string()],
            },
            Page {
                text: None,
                images: vec!["img2".to_string(), "img3".to_string()],
            },
            Page {
                text: Some("p3".to_string()),
                images: vec![],
            },
        ];

        let chunks = split_pages(&pages, 2, 1).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text.as_deref(), Some("p1"));
        assert_eq!(chunks[0].images, vec!["img1", "img2", "img3"]);
        assert_eq!(chunks[1].text.as_deref(), Some("p3"));
        assert_eq!(chunks[1].images, vec!["img2", "img3"]);
    }

    #[test]
    fn test_split_pages_without_text() {
        let pages = vec![Page {
            text: None,
            images: vec!["a".to_string()],
        }];
        let chunks = split_pages(&pages, 3, 0).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, None);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(SegmentationConfig::default().validate().is_ok());
        let bad = SegmentationConfig {
            max_pages: 1,
            page_overlap: 1,
            ..SegmentationConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
