//! Clipboard sink for extracted values

/// Somewhere to surface an extracted value outside the process.
pub trait ClipboardSink: Send + Sync {
    fn write(&self, text: &str) -> Result<(), String>;
}

/// Writes to the desktop clipboard.
#[cfg(feature = "clipboard")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

#[cfg(feature = "clipboard")]
impl ClipboardSink for SystemClipboard {
    fn write(&self, text: &str) -> Result<(), String> {
        let mut clipboard = arboard::Clipboard::new().map_err(|e| e.to_string())?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| e.to_string())
    }
}

/// Write `text` to `sink`, logging instead of failing.
pub fn publish(sink: &dyn ClipboardSink, text: &str) {
    match sink.write(text) {
        Ok(()) => log::info!("Copied value to clipboard"),
        Err(e) => log::warn!("Could not copy value to clipboard: {}", e),
    }
}
