//! Binary Shazam signature format.
//!
//! A signature is a 48-byte little-endian header followed by one TLV block
//! per frequency band.  Each block holds the peaks of that band, delta
//! encoded by FFT pass number.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

const DATA_URI_PREFIX: &str = "data:audio/vnd.shazam.sig;base64,";

const MAGIC_1: u32 = 0xcafe2580;
const MAGIC_2: u32 = 0x94119c00;
const FIXED_VALUE: u32 = (15 << 19) + 0x40000;
const BANDS_MARKER: u32 = 0x40000000;
const BAND_TAG_BASE: u32 = 0x60030040;
const HEADER_SIZE: u32 = 48;

/// Frequency ranges peaks are grouped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrequencyBand {
    Hz250To520 = 0,
    Hz520To1450 = 1,
    Hz1450To3500 = 2,
    Hz3500To5500 = 3,
}

impl FrequencyBand {
    /// Band containing `frequency_hz`, if any.
    pub fn from_hz(frequency_hz: f32) -> Option<Self> {
        match frequency_hz as i32 {
            250..=519 => Some(FrequencyBand::Hz250To520),
            520..=1449 => Some(FrequencyBand::Hz520To1450),
            1450..=3499 => Some(FrequencyBand::Hz1450To3500),
            3500..=5500 => Some(FrequencyBand::Hz3500To5500),
            _ => None,
        }
    }

    fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(FrequencyBand::Hz250To520),
            1 => Some(FrequencyBand::Hz520To1450),
            2 => Some(FrequencyBand::Hz1450To3500),
            3 => Some(FrequencyBand::Hz3500To5500),
            _ => None,
        }
    }
}

/// A single spectral peak.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyPeak {
    pub fft_pass_number: u32,
    pub peak_magnitude: u16,
    pub corrected_peak_frequency_bin: u16,
    pub sample_rate_hz: u32,
}

impl FrequencyPeak {
    pub fn frequency_hz(&self) -> f32 {
        self.corrected_peak_frequency_bin as f32 * (self.sample_rate_hz as f32 / 2.0 / 1024.0 / 64.0)
    }
}

/// In-memory form of a Shazam signature.
#[derive(Debug, Clone, Default)]
pub struct DecodedSignature {
    pub sample_rate_hz: u32,
    pub number_samples: u32,
    pub frequency_band_to_sound_peaks: HashMap<FrequencyBand, Vec<FrequencyPeak>>,
}

fn sample_rate_id(sample_rate_hz: u32) -> Result<u32> {
    match sample_rate_hz {
        8000 => Ok(1),
        11025 => Ok(2),
        16000 => Ok(3),
        32000 => Ok(4),
        44100 => Ok(5),
        48000 => Ok(6),
        other => Err(Error::Signature(format!("unsupported sample rate {} Hz", other))),
    }
}

fn sample_rate_from_id(id: u32) -> Result<u32> {
    match id {
        1 => Ok(8000),
        2 => Ok(11025),
        3 => Ok(16000),
        4 => Ok(32000),
        5 => Ok(44100),
        6 => Ok(48000),
        other => Err(Error::Signature(format!("unknown sample rate id {}", other))),
    }
}

impl DecodedSignature {
    /// Total number of peaks across all bands.
    pub fn peak_count(&self) -> usize {
        self.frequency_band_to_sound_peaks.values().map(Vec::len).sum()
    }

    /// Duration covered by the signature, in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        if self.sample_rate_hz == 0 {
            return 0;
        }
        (self.number_samples as f64 / self.sample_rate_hz as f64 * 1000.0) as u32
    }

    pub fn encode_to_binary(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());

        cursor.write_u32::<LittleEndian>(MAGIC_1)?;
        cursor.write_u32::<LittleEndian>(0)?; // crc32, patched below
        cursor.write_u32::<LittleEndian>(0)?; // size minus header, patched below
        cursor.write_u32::<LittleEndian>(MAGIC_2)?;
        for _ in 0..3 {
            cursor.write_u32::<LittleEndian>(0)?;
        }
        cursor.write_u32::<LittleEndian>(sample_rate_id(self.sample_rate_hz)? << 27)?;
        for _ in 0..2 {
            cursor.write_u32::<LittleEndian>(0)?;
        }
        cursor.write_u32::<LittleEndian>(
            self.number_samples + (self.sample_rate_hz as f32 * 0.24) as u32,
        )?;
        cursor.write_u32::<LittleEndian>(FIXED_VALUE)?;

        cursor.write_u32::<LittleEndian>(BANDS_MARKER)?;
        cursor.write_u32::<LittleEndian>(0)?; // size minus header, patched below

        let mut bands: Vec<_> = self.frequency_band_to_sound_peaks.iter().collect();
        bands.sort_by_key(|(band, _)| **band);

        for (band, peaks) in bands {
            let mut peaks_cursor = Cursor::new(Vec::new());
            let mut fft_pass_number = 0;

            for peak in peaks {
                if peak.fft_pass_number < fft_pass_number {
                    return Err(Error::Signature("peaks are not in FFT pass order".to_string()));
                }
                if peak.fft_pass_number - fft_pass_number >= 255 {
                    peaks_cursor.write_u8(0xff)?;
                    peaks_cursor.write_u32::<LittleEndian>(peak.fft_pass_number)?;
                    fft_pass_number = peak.fft_pass_number;
                }
                peaks_cursor.write_u8((peak.fft_pass_number - fft_pass_number) as u8)?;
                peaks_cursor.write_u16::<LittleEndian>(peak.peak_magnitude)?;
                peaks_cursor.write_u16::<LittleEndian>(peak.corrected_peak_frequency_bin)?;
                fft_pass_number = peak.fft_pass_number;
            }

            let peaks_buffer = peaks_cursor.into_inner();
            cursor.write_u32::<LittleEndian>(BAND_TAG_BASE + *band as u32)?;
            cursor.write_u32::<LittleEndian>(peaks_buffer.len() as u32)?;
            cursor.write_all(&peaks_buffer)?;
            let padding = (4 - peaks_buffer.len() % 4) % 4;
            cursor.write_all(&[0u8; 3][..padding])?;
        }

        let buffer_size = cursor.position() as u32;
        cursor.seek(SeekFrom::Start(8))?;
        cursor.write_u32::<LittleEndian>(buffer_size - HEADER_SIZE)?;
        cursor.seek(SeekFrom::Start(HEADER_SIZE as u64 + 4))?;
        cursor.write_u32::<LittleEndian>(buffer_size - HEADER_SIZE)?;

        let crc = crc32fast::hash(&cursor.get_ref()[8..]);
        cursor.seek(SeekFrom::Start(4))?;
        cursor.write_u32::<LittleEndian>(crc)?;

        Ok(cursor.into_inner())
    }

    pub fn encode_to_uri(&self) -> Result<String> {
        Ok(format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(self.encode_to_binary()?)))
    }

    pub fn decode_from_binary(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE as usize + 8 {
            return Err(Error::Signature("signature is truncated".to_string()));
        }

        let mut cursor = Cursor::new(data);
        let magic_1 = cursor.read_u32::<LittleEndian>()?;
        let crc = cursor.read_u32::<LittleEndian>()?;
        let size_minus_header = cursor.read_u32::<LittleEndian>()?;
        let magic_2 = cursor.read_u32::<LittleEndian>()?;
        if magic_1 != MAGIC_1 || magic_2 != MAGIC_2 {
            return Err(Error::Signature("bad magic values".to_string()));
        }
        if size_minus_header as usize != data.len() - HEADER_SIZE as usize {
            return Err(Error::Signature("size field does not match data length".to_string()));
        }
        if crc32fast::hash(&data[8..]) != crc {
            return Err(Error::Signature("CRC mismatch".to_string()));
        }

        cursor.seek(SeekFrom::Current(12))?;
        let sample_rate_hz = sample_rate_from_id(cursor.read_u32::<LittleEndian>()? >> 27)?;
        cursor.seek(SeekFrom::Current(8))?;
        let number_samples = cursor
            .read_u32::<LittleEndian>()?
            .saturating_sub((sample_rate_hz as f32 * 0.24) as u32);
        cursor.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        if cursor.read_u32::<LittleEndian>()? != BANDS_MARKER {
            return Err(Error::Signature("missing band marker".to_string()));
        }
        cursor.read_u32::<LittleEndian>()?;

        let mut signature = DecodedSignature {
            sample_rate_hz,
            number_samples,
            frequency_band_to_sound_peaks: HashMap::new(),
        };

        while (cursor.position() as usize) < data.len() {
            let tag = cursor.read_u32::<LittleEndian>()?;
            let size = cursor.read_u32::<LittleEndian>()? as usize;
            let band = tag
                .checked_sub(BAND_TAG_BASE)
                .and_then(FrequencyBand::from_index)
                .ok_or_else(|| Error::Signature(format!("unknown band tag {:#x}", tag)))?;

            let remaining = data.len() - cursor.position() as usize;
            if size > remaining {
                return Err(Error::Signature(format!(
                    "band block of {} bytes exceeds the {} bytes left",
                    size, remaining
                )));
            }
            let mut block = vec![0u8; size];
            cursor.read_exact(&mut block)?;
            let padding = (4 - size % 4) % 4;
            cursor.seek(SeekFrom::Current(padding as i64))?;

            let mut peaks = Vec::new();
            let mut block_cursor = Cursor::new(&block[..]);
            let mut fft_pass_number = 0u32;
            while (block_cursor.position() as usize) < block.len() {
                let mut offset = block_cursor.read_u8()?;
                if offset == 0xff {
                    fft_pass_number = block_cursor.read_u32::<LittleEndian>()?;
                    offset = block_cursor.read_u8()?;
                }
                fft_pass_number = fft_pass_number
                    .checked_add(offset as u32)
                    .ok_or_else(|| Error::Signature("FFT pass number overflows".to_string()))?;
                peaks.push(FrequencyPeak {
                    fft_pass_number,
                    peak_magnitude: block_cursor.read_u16::<LittleEndian>()?,
                    corrected_peak_frequency_bin: block_cursor.read_u16::<LittleEndian>()?,
                    sample_rate_hz,
                });
            }
            signature.frequency_band_to_sound_peaks.insert(band, peaks);
        }

        Ok(signature)
    }

    pub fn decode_from_uri(uri: &str) -> Result<Self> {
        let payload = uri
            .strip_prefix(DATA_URI_PREFIX)
            .ok_or_else(|| Error::Signature("not a Shazam signature data URI".to_string()))?;
        let data = STANDARD
            .decode(payload)
            .map_err(|e| Error::Signature(format!("invalid base64: {}", e)))?;
        Self::decode_from_binary(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(fft_pass_number: u32, magnitude: u16, bin: u16) -> FrequencyPeak {
        FrequencyPeak {
            fft_pass_number,
            peak_magnitude: magnitude,
            corrected_peak_frequency_bin: bin,
            sample_rate_hz: 16000,
        }
    }

    fn sample_signature() -> DecodedSignature {
        let mut bands = HashMap::new();
        bands.insert(
            FrequencyBand::Hz520To1450,
            vec![peak(50, 9000, 8000), peak(52, 9100, 8100), peak(400, 8800, 7000)],
        );
        bands.insert(FrequencyBand::Hz250To520, vec![peak(47, 7000, 3000)]);
        DecodedSignature {
            sample_rate_hz: 16000,
            number_samples: 16000 * 3,
            frequency_band_to_sound_peaks: bands,
        }
    }

    #[test]
    fn test_band_from_hz() {
        assert_eq!(FrequencyBand::from_hz(100.0), None);
        assert_eq!(FrequencyBand::from_hz(250.0), Some(FrequencyBand::Hz250To520));
        assert_eq!(FrequencyBand::from_hz(519.9), Some(FrequencyBand::Hz250To520));
        assert_eq!(FrequencyBand::from_hz(1000.0), Some(FrequencyBand::Hz520To1450));
        assert_eq!(FrequencyBand::from_hz(3499.0), Some(FrequencyBand::Hz1450To3500));
        assert_eq!(FrequencyBand::from_hz(5500.0), Some(FrequencyBand::Hz3500To5500));
        assert_eq!(FrequencyBand::from_hz(5501.0), None);
    }

    #[test]
    fn test_header_layout() {
        let data = sample_signature().encode_to_binary().unwrap();
        let word = |offset: usize| u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());

        assert_eq!(data.len() % 4, 0);
        assert_eq!(word(0), MAGIC_1);
        assert_eq!(word(4), crc32fast::hash(&data[8..]));
        assert_eq!(word(8) as usize, data.len() - 48);
        assert_eq!(word(12), MAGIC_2);
        assert_eq!(word(28), 3 << 27);
        assert_eq!(word(40), 16000 * 3 + 3840);
        assert_eq!(word(44), FIXED_VALUE);
        assert_eq!(word(48), BANDS_MARKER);
        assert_eq!(word(52), word(8));
        // Lowest band is written first
        assert_eq!(word(56), BAND_TAG_BASE);
    }

    #[test]
    fn test_large_pass_gap_uses_escape() {
        let data = sample_signature().encode_to_binary().unwrap();
        let decoded = DecodedSignature::decode_from_binary(&data).unwrap();

        let peaks = &decoded.frequency_band_to_sound_peaks[&FrequencyBand::Hz520To1450];
        let passes: Vec<u32> = peaks.iter().map(|p| p.fft_pass_number).collect();
        assert_eq!(passes, vec![50, 52, 400]);
        assert_eq!(peaks[2].peak_magnitude, 8800);
        assert_eq!(decoded.number_samples, 16000 * 3);
        assert_eq!(decoded.peak_count(), 4);
    }

    #[test]
    fn test_uri_prefix_and_corruption() {
        let uri = sample_signature().encode_to_uri().unwrap();
        assert!(uri.starts_with("data:audio/vnd.shazam.sig;base64,"));
        assert!(DecodedSignature::decode_from_uri(&uri).is_ok());

        let mut data = sample_signature().encode_to_binary().unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        assert!(DecodedSignature::decode_from_binary(&data).is_err());
        assert!(DecodedSignature::decode_from_uri("data:text/plain;base64,AAAA").is_err());
    }

    /// Re-seal a hand-edited signature so only the edited field is wrong.
    fn reseal(data: &mut [u8]) {
        let crc = crc32fast::hash(&data[8..]);
        data[4..8].copy_from_slice(&crc.to_le_bytes());
    }

    #[test]
    fn test_oversized_band_block_is_rejected() {
        let mut data = sample_signature().encode_to_binary().unwrap();
        // Size field of the first band block
        data[60..64].copy_from_slice(&u32::MAX.to_le_bytes());
        reseal(&mut data);

        assert!(matches!(
            DecodedSignature::decode_from_binary(&data),
            Err(Error::Signature(_))
        ));
    }

    #[test]
    fn test_pass_number_overflow_is_rejected() {
        let mut bands = HashMap::new();
        bands.insert(
            FrequencyBand::Hz250To520,
            vec![peak(u32::MAX - 1, 7000, 3000), peak(u32::MAX, 7000, 3000)],
        );
        let signature = DecodedSignature {
            sample_rate_hz: 16000,
            number_samples: 16000,
            frequency_band_to_sound_peaks: bands,
        };
        let mut data = signature.encode_to_binary().unwrap();
        // Second peak's delta byte: block starts at 64, first peak is 0xff + u32 + 5 bytes
        assert_eq!(data[64 + 10], 1);
        data[64 + 10] = 2;
        reseal(&mut data);

        assert!(matches!(
            DecodedSignature::decode_from_binary(&data),
            Err(Error::Signature(_))
        ));
    }

    #[test]
    fn test_unsupported_sample_rate() {
        let signature = DecodedSignature {
            sample_rate_hz: 22050,
            ..Default::default()
        };
        assert!(signature.encode_to_binary().is_err());
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(sample_signature().duration_ms(), 3000);
        assert_eq!(DecodedSignature::default().duration_ms(), 0);
    }
}
