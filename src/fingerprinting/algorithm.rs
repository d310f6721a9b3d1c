//! Peak extraction producing a [`DecodedSignature`] from 16 kHz mono PCM.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use chfft::RFft1D;
use rodio::source::UniformSourceIterator;
use rodio::Decoder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fingerprinting::signature_format::{DecodedSignature, FrequencyBand, FrequencyPeak};

const SAMPLE_RATE: u32 = 16000;
const WINDOW_SIZE: usize = 2048;
const HOP_SIZE: usize = 128;
const FFT_BINS: usize = WINDOW_SIZE / 2 + 1;
const FFT_HISTORY: usize = 256;
const DEFAULT_SEGMENT_SECONDS: u32 = 12;

struct RingBuffer<T> {
    buffer: Vec<T>,
    position: usize,
    num_written: usize,
}

impl<T: Clone> RingBuffer<T> {
    fn new(size: usize, fill: T) -> Self {
        Self {
            buffer: vec![fill; size],
            position: 0,
            num_written: 0,
        }
    }

    /// Index of the slot `offset` positions away from the write head.
    fn offset_index(&self, offset: i32) -> usize {
        (self.position as i32 + offset).rem_euclid(self.buffer.len() as i32) as usize
    }

    fn advance(&mut self) {
        self.position = (self.position + 1) % self.buffer.len();
        self.num_written += 1;
    }
}

pub struct SignatureGenerator {
    samples: RingBuffer<i16>,
    window: Vec<f32>,
    reordered_samples: Vec<f32>,
    fft_outputs: RingBuffer<Vec<f32>>,
    spread_fft_outputs: RingBuffer<Vec<f32>>,
    fft: RFft1D<f32>,
    signature: DecodedSignature,
}

impl SignatureGenerator {
    fn new(number_samples: u32) -> Self {
        // Hanning window of 2050 points with both zero endpoints dropped
        let window = (0..WINDOW_SIZE)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * (i + 1) as f32 / (WINDOW_SIZE + 1) as f32).cos())
            .collect();

        Self {
            samples: RingBuffer::new(WINDOW_SIZE, 0),
            window,
            reordered_samples: vec![0.0; WINDOW_SIZE],
            fft_outputs: RingBuffer::new(FFT_HISTORY, vec![0.0; FFT_BINS]),
            spread_fft_outputs: RingBuffer::new(FFT_HISTORY, vec![0.0; FFT_BINS]),
            fft: RFft1D::new(WINDOW_SIZE),
            signature: DecodedSignature {
                sample_rate_hz: SAMPLE_RATE,
                number_samples,
                frequency_band_to_sound_peaks: HashMap::new(),
            },
        }
    }

    /// Build a signature from signed 16-bit 16 kHz mono samples.
    pub fn make_signature_from_buffer(samples: Vec<i16>) -> DecodedSignature {
        let mut generator = Self::new(samples.len() as u32);

        for chunk in samples.chunks_exact(HOP_SIZE) {
            generator.do_fft(chunk);
            generator.do_peak_spreading();
            if generator.spread_fft_outputs.num_written >= 46 {
                generator.do_peak_recognition();
            }
        }

        debug!(
            samples = generator.signature.number_samples,
            peaks = generator.signature.peak_count(),
            "signature generated"
        );
        generator.signature
    }

    /// Decode an audio file and build a signature from its centred segment
    /// (12 s unless `segment_seconds` says otherwise).
    pub fn make_signature_from_file<P: AsRef<Path>>(
        path: P,
        segment_seconds: Option<u32>,
    ) -> Result<DecodedSignature> {
        let file = File::open(path.as_ref())?;
        let samples = decode_to_mono_16k(BufReader::new(file))?;
        Ok(Self::make_signature_from_buffer(centered_segment(
            samples,
            segment_seconds.unwrap_or(DEFAULT_SEGMENT_SECONDS),
        )))
    }

    /// Same as [`Self::make_signature_from_file`] for encoded audio already in memory.
    pub fn make_signature_from_bytes(
        bytes: Vec<u8>,
        segment_seconds: Option<u32>,
    ) -> Result<DecodedSignature> {
        let samples = decode_to_mono_16k(Cursor::new(bytes))?;
        Ok(Self::make_signature_from_buffer(centered_segment(
            samples,
            segment_seconds.unwrap_or(DEFAULT_SEGMENT_SECONDS),
        )))
    }

    fn do_fft(&mut self, chunk: &[i16]) {
        let start = self.samples.position;
        self.samples.buffer[start..start + HOP_SIZE].copy_from_slice(chunk);
        self.samples.position = (start + HOP_SIZE) % WINDOW_SIZE;
        self.samples.num_written += HOP_SIZE;

        // Oldest sample first, then window
        for index in 0..WINDOW_SIZE {
            self.reordered_samples[index] = self.samples.buffer
                [(index + self.samples.position) % WINDOW_SIZE] as f32
                * self.window[index];
        }

        let complex = self.fft.forward(&self.reordered_samples);

        let output = &mut self.fft_outputs.buffer[self.fft_outputs.position];
        for (bin, value) in output.iter_mut().zip(complex.iter()) {
            *bin = ((value.re * value.re + value.im * value.im) / (1 << 17) as f32).max(0.0000000001);
        }
        self.fft_outputs.advance();
    }

    fn do_peak_spreading(&mut self) {
        let latest = self.fft_outputs.offset_index(-1);
        let mut spread = self.fft_outputs.buffer[latest].clone();

        // Frequency domain
        for position in 0..FFT_BINS - 2 {
            spread[position] = spread[position]
                .max(spread[position + 1])
                .max(spread[position + 2]);
        }

        // Time domain: push maxima back into earlier spread outputs
        for (position, value) in spread.iter().enumerate() {
            let mut max_value = *value;
            for former in [-1, -3, -6] {
                let index = self.spread_fft_outputs.offset_index(former);
                let former_output = &mut self.spread_fft_outputs.buffer[index];
                max_value = max_value.max(former_output[position]);
                former_output[position] = max_value;
            }
        }

        let current = self.spread_fft_outputs.position;
        self.spread_fft_outputs.buffer[current] = spread;
        self.spread_fft_outputs.advance();
    }

    fn do_peak_recognition(&mut self) {
        let fft_minus_46 = &self.fft_outputs.buffer[self.fft_outputs.offset_index(-46)];
        let fft_minus_49 = &self.spread_fft_outputs.buffer[self.spread_fft_outputs.offset_index(-49)];
        let fft_pass_number = (self.spread_fft_outputs.num_written - 46) as u32;

        for bin in 10..=1014 {
            let value = fft_minus_46[bin];
            if value < 1.0 / 64.0 || value < fft_minus_49[bin - 1] {
                continue;
            }

            // Frequency-domain local maximum
            let mut max_neighbor = 0.0f32;
            for offset in [-10i32, -7, -4, -3, 1, 2, 5, 8] {
                max_neighbor = max_neighbor.max(fft_minus_49[(bin as i32 + offset) as usize]);
            }
            if value <= max_neighbor {
                continue;
            }

            // Time-domain local maximum
            for offset in [-53, -45, 165, 172, 179, 186, 193, 200, 214, 221, 228, 235, 242, 249] {
                let other = &self.spread_fft_outputs.buffer[self.spread_fft_outputs.offset_index(offset)];
                max_neighbor = max_neighbor.max(other[bin - 1]);
            }
            if value <= max_neighbor {
                continue;
            }

            let magnitude = |v: f32| v.ln().max(1.0 / 64.0) * 1477.3 + 6144.0;
            let peak_magnitude = magnitude(value);
            let before = magnitude(fft_minus_46[bin - 1]);
            let after = magnitude(fft_minus_46[bin + 1]);

            let variation_1 = peak_magnitude * 2.0 - before - after;
            if variation_1 <= 0.0 {
                continue;
            }
            let variation_2 = (after - before) * 32.0 / variation_1;
            let corrected_bin = (bin as i32 * 64 + variation_2 as i32) as u16;

            let peak = FrequencyPeak {
                fft_pass_number,
                peak_magnitude: peak_magnitude as u16,
                corrected_peak_frequency_bin: corrected_bin,
                sample_rate_hz: SAMPLE_RATE,
            };

            let band = match FrequencyBand::from_hz(peak.frequency_hz()) {
                Some(band) => band,
                None => continue,
            };
            self.signature
                .frequency_band_to_sound_peaks
                .entry(band)
                .or_default()
                .push(peak);
        }
    }
}

/// Decode any supported format and convert it to 16 kHz mono i16.
fn decode_to_mono_16k<R>(reader: R) -> Result<Vec<i16>>
where
    R: Read + Seek + Send + Sync + 'static,
{
    let decoder = Decoder::new(reader)?;
    let converted: UniformSourceIterator<_, i16> = UniformSourceIterator::new(decoder, 1, SAMPLE_RATE);
    let samples: Vec<i16> = converted.collect();

    if samples.is_empty() {
        return Err(Error::Decode("no audio samples decoded".to_string()));
    }
    debug!(samples = samples.len(), "decoded audio to 16 kHz mono");
    Ok(samples)
}

/// Keep `seconds` of audio around the middle of `samples`.
fn centered_segment(samples: Vec<i16>, seconds: u32) -> Vec<i16> {
    let segment_len = seconds as usize * SAMPLE_RATE as usize;
    if segment_len == 0 || samples.len() <= segment_len {
        return samples;
    }
    let start = samples.len() / 2 - segment_len / 2;
    samples[start..start + segment_len].to_vec()
}
