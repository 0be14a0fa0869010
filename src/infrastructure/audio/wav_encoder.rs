use std::io::Cursor;

use crate::application::ports::EngineError;
use crate::domain::PcmAudio;

/// Encodes mono PCM as a 16-bit WAV file for upload to remote engines.
pub fn encode_wav(audio: &PcmAudio) -> Result<Vec<u8>, EngineError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + audio.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| EngineError::RecognitionFailed(format!("wav header: {}", e)))?;
        for sample in audio.pcm16_samples() {
            writer
                .write_sample(sample)
                .map_err(|e| EngineError::RecognitionFailed(format!("wav sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| EngineError::RecognitionFailed(format!("wav finalize: {}", e)))?;
    }

    Ok(cursor.into_inner())
}
