//! Page context lookup for extracted images.

use crate::error::OutOfRangeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One image found by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub path: PathBuf,
    /// One-based page the image was found on
    #[serde(alias = "page")]
    pub page_number: u32,
}

impl ImageReference {
    pub fn new(path: impl Into<PathBuf>, page_number: u32) -> Self {
        Self {
            path: path.into(),
            page_number,
        }
    }
}

/// Markdown of every page of one document, in page order.
///
/// Slot `i` holds page `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pages: Vec<String>,
}

impl PageContext {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Markdown of a one-based page
    pub fn page(&self, page_number: u32) -> Result<&str, OutOfRangeError> {
        let out_of_range = || OutOfRangeError {
            page: page_number,
            available: self.pages.len(),
        };
        let index = (page_number as usize).checked_sub(1).ok_or_else(out_of_range)?;
        self.pages
            .get(index)
            .map(String::as_str)
            .ok_or_else(out_of_range)
    }
}

/// Text that should accompany `image` during extraction.
pub fn context_for<'a>(
    image: &ImageReference,
    pages: &'a PageContext,
) -> Result<&'a str, OutOfRangeError> {
    pages.page(image.page_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(n: usize) -> PageContext {
        PageContext::new((1..=n).map(|i| format!("# Page {i}")).collect())
    }

    #[test]
    fn test_one_based_lookup() {
        let pages = pages(6);
        for (page, expected) in [(2, "# Page 2"), (3, "# Page 3"), (6, "# Page 6")] {
            let image = ImageReference::new(format!("img_p{page}.png"), page);
            assert_eq!(context_for(&image, &pages).unwrap(), expected);
        }
    }

    #[test]
    fn test_last_page_past_end_is_out_of_range() {
        let pages = pages(5);
        let image = ImageReference::new("img_p6.png", 6);
        assert_eq!(
            context_for(&image, &pages).unwrap_err(),
            OutOfRangeError {
                page: 6,
                available: 5
            }
        );
    }

    #[test]
    fn test_page_zero_does_not_wrap() {
        let pages = pages(3);
        let image = ImageReference::new("img.png", 0);
        assert!(context_for(&image, &pages).is_err());
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let pages = pages(4);
        let image = ImageReference::new("img.png", 4);
        let first = context_for(&image, &pages).unwrap();
        for _ in 0..10 {
            assert_eq!(context_for(&image, &pages).unwrap(), first);
        }
    }

    #[test]
    fn test_image_reference_accepts_page_alias() {
        let image: ImageReference =
            serde_json::from_str(r#"{"path": "a.png", "page": 3}"#).unwrap();
        assert_eq!(image, ImageReference::new("a.png", 3));

        let image: ImageReference =
            serde_json::from_str(r#"{"path": "b.png", "page_number": 4}"#).unwrap();
        assert_eq!(image.page_number, 4);
    }
}
