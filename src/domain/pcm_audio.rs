/// Sample rate every batch payload is normalized to.
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Layout of raw signed 16-bit little-endian PCM as sent on the streaming endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl RawPcmFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        2 * self.channels as usize
    }
}

impl Default for RawPcmFormat {
    fn default() -> Self {
        Self::new(CANONICAL_SAMPLE_RATE, 1)
    }
}

/// Mono floating point audio in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PcmAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Interprets `bytes` as interleaved s16le frames and downmixes to mono.
    /// A trailing partial frame is ignored.
    pub fn from_pcm16_le(bytes: &[u8], format: RawPcmFormat) -> Self {
        let channels = format.channels as usize;
        let samples = bytes
            .chunks_exact(format.bytes_per_frame())
            .map(|frame| {
                let sum: f32 = frame
                    .chunks_exact(2)
                    .map(|s| i16::from_le_bytes([s[0], s[1]]) as f32 / 32768.0)
                    .sum();
                sum / channels as f32
            })
            .collect();

        Self::new(samples, format.sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// 16-bit samples, clamping anything outside the unit range.
    pub fn pcm16_samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
    }
}
