//! The `"selection"` capability, backed by the system clipboard.
//!
//! A fresh `arboard::Clipboard` is opened per call so the interface itself
//! holds no OS resources and can be resolved on any host.

use crate::error::PlatformError;

/// What the launcher reads from or writes to the current selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionContents {
    pub text: Option<String>,
    pub html: Option<String>,
}

impl SelectionContents {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            html: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.html.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionInterface;

impl SelectionInterface {
    pub fn new() -> Self {
        Self
    }

    /// Reads the clipboard. Formats that are absent come back as `None`.
    pub fn get(&self) -> Result<SelectionContents, PlatformError> {
        let mut clipboard = arboard::Clipboard::new()?;
        let text = available(clipboard.get_text())?;
        let html = available(clipboard.get().html())?;
        log::debug!(
            "selection: read text={} html={}",
            text.is_some(),
            html.is_some()
        );
        Ok(SelectionContents { text, html })
    }

    /// Replaces the clipboard contents. Returns `false` without touching the
    /// clipboard when `contents` carries nothing.
    pub fn set(&self, contents: &SelectionContents) -> Result<bool, PlatformError> {
        match (&contents.html, &contents.text) {
            (Some(html), alt) => {
                arboard::Clipboard::new()?.set_html(html.as_str(), alt.as_deref())?
            }
            (None, Some(text)) => arboard::Clipboard::new()?.set_text(text.as_str())?,
            (None, None) => return Ok(false),
        }
        log::debug!("selection: clipboard replaced");
        Ok(true)
    }
}

/// Treats "this format is not on the clipboard" as an empty slot.
fn available<T>(result: Result<T, arboard::Error>) -> Result<Option<T>, PlatformError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(arboard::Error::ContentNotAvailable) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_format_is_none() {
        let read: Result<String, _> = Err(arboard::Error::ContentNotAvailable);
        assert_eq!(available(read).unwrap(), None);
        assert_eq!(available(Ok::<_, arboard::Error>(7)).unwrap(), Some(7));
    }

    #[test]
    fn other_clipboard_failures_propagate() {
        let read: Result<String, _> = Err(arboard::Error::ClipboardNotSupported);
        assert!(matches!(available(read), Err(PlatformError::Clipboard(_))));
    }

    #[test]
    fn empty_contents_are_not_written() {
        let selection = SelectionInterface::new();
        assert!(!selection.set(&SelectionContents::default()).unwrap());
    }

    #[test]
    fn text_constructor() {
        let contents = SelectionContents::text("open calculator");
        assert_eq!(contents.text.as_deref(), Some("open calculator"));
        assert!(contents.html.is_none());
        assert!(!contents.is_empty());
    }
}
