// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::f32::consts::PI;
use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Renders a 440 Hz sine as a 16-bit WAV file held in memory.
pub fn wav_bytes(channels: u16, sample_rate: u32, seconds: f32) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(
            &mut cursor,
            WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )
        .expect("unable to create wav writer");

        let frames = (sample_rate as f32 * seconds) as usize;
        for frame in 0..frames {
            let t = frame as f32 / sample_rate as f32;
            let sample = ((2.0 * PI * 440.0 * t).sin() * i16::MAX as f32 * 0.5) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).expect("unable to write sample");
            }
        }
        writer.finalize().expect("unable to finalize wav");
    }
    cursor.into_inner()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wav_header() {
        let bytes = wav_bytes(2, 8000, 0.1);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 800 frames of two 16-bit samples after a 44 byte header.
        assert_eq!(bytes.len(), 44 + 800 * 2 * 2);
    }
}
