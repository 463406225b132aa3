//! Hardware barcode scanner detection.
//!
//! USB scanners act as keyboards that type a whole code in a burst and end
//! with Enter. Keys arriving faster than [`MAX_KEY_GAP`] are buffered; a
//! slower key starts a new buffer, so manual typing never produces a scan.

use std::time::{Duration, Instant};

/// Largest gap between keys of one scan.
pub const MAX_KEY_GAP: Duration = Duration::from_millis(100);

/// A scan must be longer than this many characters.
pub const MIN_SCAN_LEN: usize = 3;

/// A key event seen by the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Enter,
    /// Any other key (modifiers, arrows).
    Other,
}

/// Buffers scanner bursts.
#[derive(Debug, Clone)]
pub struct BarcodeScanner {
    buffer: String,
    last_key_at: Option<Instant>,
    max_gap: Duration,
    min_len: usize,
}

impl Default for BarcodeScanner {
    fn default() -> Self {
        Self::new(MAX_KEY_GAP, MIN_SCAN_LEN)
    }
}

impl BarcodeScanner {
    /// Scanner with custom timing. Scans must be longer than `min_len`.
    #[must_use]
    pub const fn new(max_gap: Duration, min_len: usize) -> Self {
        Self {
            buffer: String::new(),
            last_key_at: None,
            max_gap,
            min_len,
        }
    }

    /// Feed one key pressed at `at`. Returns a completed scan on Enter.
    pub fn on_key(&mut self, key: KeyInput, at: Instant) -> Option<String> {
        let in_burst = self
            .last_key_at
            .is_some_and(|last| at.saturating_duration_since(last) < self.max_gap);
        if !in_burst {
            self.buffer.clear();
        }
        self.last_key_at = Some(at);

        match key {
            KeyInput::Char(c) => {
                self.buffer.push(c);
                None
            }
            KeyInput::Enter => {
                let scan = std::mem::take(&mut self.buffer);
                self.last_key_at = None;
                (scan.chars().count() > self.min_len).then_some(scan)
            }
            KeyInput::Other => None,
        }
    }

    /// Drop any partial input.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_key_at = None;
    }
}
