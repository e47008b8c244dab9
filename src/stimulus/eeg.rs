//! Rolling EEG waveform buffers for the attract-screen traces.
//!
//! Each channel is a fixed-length byte buffer (centre line 130). Incoming
//! samples are appended at the right edge; between packets the trace keeps
//! scrolling left at the nominal sample rate so it moves smoothly, leaving a
//! zero-filled gap that the next packet fills again.

/// Centre value of a trace at 0 µV.
const BASELINE: f64 = 130.0;
/// Trace amplitude for a full-scale sample.
const AMPLITUDE: f64 = 126.0;
/// Raw value mapped to full amplitude.
const FULL_SCALE: f64 = 10_000.0;
/// Samples per second assumed when scrolling between packets.
const SCROLL_RATE_HZ: f64 = 256.0;

/// Map one raw sample to a trace byte.
pub fn sample_to_level(raw: f64) -> u8 {
    let level = BASELINE + AMPLITUDE * (raw / FULL_SCALE);
    if level.is_nan() {
        return BASELINE as u8;
    }
    level.clamp(0.0, 255.0) as u8
}

#[derive(Debug, Clone, PartialEq)]
pub struct EegWaveform {
    channels: Vec<Vec<u8>>,
    len: usize,
    stride: usize,
    /// Samples at the right edge that are scrolled-in padding rather than
    /// real data.
    scrolled: usize,
}

impl EegWaveform {
    pub fn new(channels: usize, len: usize, stride: usize) -> Self {
        Self {
            channels: vec![vec![0; len]; channels],
            len,
            stride: stride.max(1),
            scrolled: 0,
        }
    }

    pub fn channel(&self, index: usize) -> Option<&[u8]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Padding samples currently waiting to be overwritten.
    pub fn pending_gap(&self) -> usize {
        self.scrolled
    }

    /// Append interleaved samples (`stride` values per frame, channel `c` at
    /// offset `c`). New data first fills the scrolled-in gap, then pushes the
    /// oldest samples out.
    pub fn add_samples(&mut self, data: &[f64]) {
        let count = data.len() / self.stride;
        if count == 0 || self.len == 0 {
            return;
        }
        let to_scroll = count.saturating_sub(self.scrolled);
        let shift = to_scroll.min(self.len);
        // Negative when the packet is longer than the buffer; the oldest
        // samples of the packet then fall off the left edge.
        let insertion = self.len as i64 - self.scrolled as i64 - to_scroll as i64;

        for (ch, buf) in self.channels.iter_mut().enumerate() {
            if shift > 0 {
                buf.copy_within(shift.., 0);
            }
            for i in 0..count {
                let pos = insertion + i as i64;
                if pos < 0 || pos >= self.len as i64 {
                    continue;
                }
                let raw = data.get(ch + i * self.stride).copied().unwrap_or(0.0);
                buf[pos as usize] = sample_to_level(raw);
            }
        }
        self.scrolled = (self.scrolled + to_scroll).saturating_sub(count);
    }

    /// Shift the traces left by the samples due for `elapsed_ms`, zero-filling
    /// the tail. Stops once half the buffer is padding.
    pub fn scroll(&mut self, elapsed_ms: f64) {
        if self.scrolled > self.len / 2 || elapsed_ms.is_nan() || elapsed_ms <= 0.0 {
            return;
        }
        let shift = ((SCROLL_RATE_HZ * elapsed_ms / 1000.0).floor() as usize).min(self.len);
        if shift == 0 {
            return;
        }
        for buf in &mut self.channels {
            buf.copy_within(shift.., 0);
            let tail = self.len - shift;
            buf[tail..].fill(0);
        }
        self.scrolled += shift;
    }
}
