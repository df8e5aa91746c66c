use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::codec::audio::AudioDecoder;
use ac_ffmpeg::packet::PacketMut;

const F32_TO_I16: f32 = 32767.0;

/// Persistent Opus decoder for one pipeline.
///
/// One instance lives for the whole pipeline so the codec keeps its
/// inter-frame prediction state. Output is mono i16 PCM at the stream's
/// rate; stereo frames are downmixed. A 20 ms packet at 48 kHz yields
/// 960 samples.
pub struct OpusDecoder {
    decoder: AudioDecoder,
}

unsafe impl Send for OpusDecoder {}

impl OpusDecoder {
    pub fn new() -> Result<Self, ac_ffmpeg::Error> {
        let decoder = AudioDecoder::new("libopus").or_else(|e| {
            log::warn!(
                "libopus decoder not available ({}), trying built-in opus decoder",
                e
            );
            AudioDecoder::new("opus")
        })?;
        Ok(Self { decoder })
    }

    /// Decode one encoded packet into mono i16 PCM.
    ///
    /// An error marks this packet as undecodable; the decoder itself stays
    /// usable for the next one.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<i16>, ac_ffmpeg::Error> {
        let mut pcm = Vec::new();

        if let Err(e) = self.decoder.try_push(PacketMut::from(data).freeze()) {
            if !e.is_again() {
                return Err(e.unwrap_inner());
            }
            // Decoder wants draining before it accepts more input
            self.drain_into(&mut pcm)?;
            self.decoder
                .try_push(PacketMut::from(data).freeze())
                .map_err(|e| ac_ffmpeg::Error::new(e.to_string()))?;
        }
        self.drain_into(&mut pcm)?;

        Ok(pcm)
    }

    fn drain_into(&mut self, out: &mut Vec<i16>) -> Result<(), ac_ffmpeg::Error> {
        while let Some(frame) = self.decoder.take()? {
            let sample_count = frame.samples();
            if sample_count == 0 {
                continue;
            }

            let channels = frame.channel_layout().channels() as usize;
            let planes = frame.planes();

            if planes.len() >= 2 {
                let left = planes[0].data();
                let right = planes[1].data();
                if !append_planar_mono(out, left, right, sample_count) {
                    log::warn!(
                        "Audio plane too small ({}+{} bytes for {} samples)",
                        left.len(),
                        right.len(),
                        sample_count
                    );
                }
                continue;
            }

            if let Some(data) = planes.first().map(|p| p.data())
                && !append_packed_mono(out, data, sample_count, channels)
            {
                log::warn!(
                    "Packed audio too small ({} bytes for {}x{} samples)",
                    data.len(),
                    sample_count,
                    channels
                );
            }
        }
        Ok(())
    }
}

/// Downmix planar stereo (f32 or i16 planes) to mono i16.
fn append_planar_mono(out: &mut Vec<i16>, left: &[u8], right: &[u8], sample_count: usize) -> bool {
    let min_bytes_f32 = sample_count * 4;
    if left.len() >= min_bytes_f32 && right.len() >= min_bytes_f32 {
        let left_f32: &[f32] =
            unsafe { std::slice::from_raw_parts(left.as_ptr() as *const f32, sample_count) };
        let right_f32: &[f32] =
            unsafe { std::slice::from_raw_parts(right.as_ptr() as *const f32, sample_count) };
        for i in 0..sample_count {
            let mixed = (left_f32[i] + right_f32[i]) * 0.5;
            out.push((mixed.clamp(-1.0, 1.0) * F32_TO_I16) as i16);
        }
        return true;
    }

    let min_bytes_i16 = sample_count * 2;
    if left.len() >= min_bytes_i16 && right.len() >= min_bytes_i16 {
        let left_i16: &[i16] =
            unsafe { std::slice::from_raw_parts(left.as_ptr() as *const i16, sample_count) };
        let right_i16: &[i16] =
            unsafe { std::slice::from_raw_parts(right.as_ptr() as *const i16, sample_count) };
        for i in 0..sample_count {
            out.push(((left_i16[i] as i32 + right_i16[i] as i32) / 2) as i16);
        }
        return true;
    }

    false
}

/// Downmix an interleaved plane (f32 or i16, any channel count) to mono i16.
fn append_packed_mono(
    out: &mut Vec<i16>,
    data: &[u8],
    sample_count: usize,
    channels: usize,
) -> bool {
    let channels = channels.max(1);
    let total_samples = sample_count * channels;

    let min_bytes_f32 = total_samples * 4;
    if data.len() >= min_bytes_f32 {
        let samples: &[f32] =
            unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, total_samples) };
        for frame in samples.chunks_exact(channels) {
            let mixed = frame.iter().sum::<f32>() / channels as f32;
            out.push((mixed.clamp(-1.0, 1.0) * F32_TO_I16) as i16);
        }
        return true;
    }

    let min_bytes_i16 = total_samples * 2;
    if data.len() >= min_bytes_i16 {
        let samples: &[i16] =
            unsafe { std::slice::from_raw_parts(data.as_ptr() as *const i16, total_samples) };
        for frame in samples.chunks_exact(channels) {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            out.push((sum / channels as i32) as i16);
        }
        return true;
    }

    false
}
