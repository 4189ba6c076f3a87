//! Synthetic payloads shaped like camera output.

use crate::capture::Frame;

/// JPEG-like blob of exactly `len` bytes: SOI marker, a pattern that
/// varies with `seq`, EOI marker.
pub fn synthetic_jpeg(seq: u64, len: usize) -> Vec<u8> {
    let mut data: Vec<u8> = (0..len)
        .map(|i| (seq as usize).wrapping_mul(31).wrapping_add(i) as u8)
        .collect();
    if len >= 4 {
        data[0] = 0xFF;
        data[1] = 0xD8;
        data[len - 2] = 0xFF;
        data[len - 1] = 0xD9;
    }
    data
}

pub fn synthetic_frame(seq: u64, len: usize, captured_ms: u64) -> Frame {
    Frame::new(synthetic_jpeg(seq, len), seq, captured_ms)
}

/// 16-bit mono PCM sine at 440 Hz
pub fn synthetic_pcm(samples: usize, sample_rate: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples * 2);
    for i in 0..samples {
        let t = i as f64 / sample_rate as f64;
        let v = ((2.0 * std::f64::consts::PI * 440.0 * t).sin() * 8000.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// SubRip telemetry with one cue per second
pub fn synthetic_srt(secs: u32) -> Vec<u8> {
    let mut out = String::new();
    for s in 0..secs {
        out.push_str(&format!(
            "{}\n00:00:{:02},000 --> 00:00:{:02},000\n{}C 50%RH\n\n",
            s + 1,
            s % 60,
            (s + 1) % 60,
            20 + s % 5
        ));
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_markers_and_length() {
        let jpeg = synthetic_jpeg(7, 1021);
        assert_eq!(jpeg.len(), 1021);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[1019..], &[0xFF, 0xD9]);
        assert_ne!(synthetic_jpeg(8, 1021), jpeg);
        assert_eq!(synthetic_jpeg(1, 3).len(), 3);
    }

    #[test]
    fn test_pcm_length() {
        assert_eq!(synthetic_pcm(160, 16_000).len(), 320);
    }
}
