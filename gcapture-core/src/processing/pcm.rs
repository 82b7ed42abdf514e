use crate::models::audio_models::EngineFormat;

/// Normalizes engine packets to interleaved little-endian PCM16.
///
/// Supported engine layouts are float32, signed 16-bit and signed 32-bit.
/// Anything else is emitted as silence of the right length so the timeline
/// keeps advancing.
#[derive(Debug, Clone, Copy)]
pub struct PcmNormalizer {
    engine: EngineFormat,
}

impl PcmNormalizer {
    pub fn new(engine: EngineFormat) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &EngineFormat {
        &self.engine
    }

    /// Bytes per output frame.
    pub fn output_block_align(&self) -> usize {
        self.engine.channels as usize * 2
    }

    /// Convert `frames` sample frames of engine data into PCM16.
    pub fn normalize(&self, data: &[u8], frames: u32) -> Vec<u8> {
        let samples = frames as usize * self.engine.channels as usize;
        let mut out = Vec::with_capacity(samples * 2);

        match (self.engine.is_float, self.engine.bits) {
            (true, 32) => {
                for chunk in data.chunks_exact(4).take(samples) {
                    let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    out.extend_from_slice(&float_to_i16(value).to_le_bytes());
                }
            }
            (false, 16) => {
                let len = (samples * 2).min(data.len() - data.len() % 2);
                out.extend_from_slice(&data[..len]);
            }
            (false, 32) => {
                for chunk in data.chunks_exact(4).take(samples) {
                    let value = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    out.extend_from_slice(&((value >> 16) as i16).to_le_bytes());
                }
            }
            _ => {}
        }

        // Short packets and unsupported layouts are padded with silence.
        out.resize(samples * 2, 0);
        out
    }

    /// `frames` sample frames of PCM16 silence.
    pub fn silence(&self, frames: u32) -> Vec<u8> {
        vec![0u8; frames as usize * self.output_block_align()]
    }
}

/// Convert a float sample in `[-1.0, 1.0]` to i16, clamping out-of-range
/// values and rounding half away from zero.
pub fn float_to_i16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (clamped * i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(bits: u16, is_float: bool, channels: u16) -> EngineFormat {
        EngineFormat {
            sample_rate: 48000,
            channels,
            bits,
            is_float,
            block_align: channels * bits / 8,
        }
    }

    fn as_i16(bytes: &[u8]) -> Vec<i16> {
        bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
    }

    #[test]
    fn float_conversion_clamps_and_rounds() {
        assert_eq!(float_to_i16(0.0), 0);
        assert_eq!(float_to_i16(1.0), 32767);
        assert_eq!(float_to_i16(-1.0), -32767);
        assert_eq!(float_to_i16(2.5), 32767);
        assert_eq!(float_to_i16(-7.0), -32767);
        assert_eq!(float_to_i16(f32::NAN), 0);
        // 0.5 * 32767 = 16383.5 rounds away from zero.
        assert_eq!(float_to_i16(0.5), 16384);
        assert_eq!(float_to_i16(-0.5), -16384);
    }

    #[test]
    fn float_packets_normalize_to_pcm16() {
        let norm = PcmNormalizer::new(engine(32, true, 2));
        let data: Vec<u8> = [0.0f32, 1.0, -1.0, 0.25]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        let out = norm.normalize(&data, 2);
        assert_eq!(out.len(), 8);
        assert_eq!(as_i16(&out), vec![0, 32767, -32767, 8192]);
    }

    #[test]
    fn pcm16_is_copied() {
        let norm = PcmNormalizer::new(engine(16, false, 1));
        let data: Vec<u8> = [1i16, -2, 300].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(norm.normalize(&data, 3), data);
    }

    #[test]
    fn pcm32_keeps_high_word() {
        let norm = PcmNormalizer::new(engine(32, false, 1));
        let data: Vec<u8> = [0x1234_0000i32, -65536].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(as_i16(&norm.normalize(&data, 2)), vec![0x1234, -1]);
    }

    #[test]
    fn unsupported_layout_becomes_silence() {
        let norm = PcmNormalizer::new(engine(24, false, 2));
        let out = norm.normalize(&[0xFF; 12], 2);
        assert_eq!(out, vec![0u8; 8]);
        assert_eq!(norm.silence(3).len(), 12);
    }

    #[test]
    fn short_packet_is_padded() {
        let norm = PcmNormalizer::new(engine(16, false, 2));
        let out = norm.normalize(&[1, 0], 2);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..2], &[1, 0]);
    }
}
