use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Mono signed 16-bit track, the scale the analyzer thresholds are tuned for.
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

struct OpenTrack {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
}

fn open_track(path: &Path) -> Result<OpenTrack> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let reader = symphonia::default::get_probe()
        .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unsupported audio container: {}", path.display()))?
        .format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("Audio file has no decodable track")?;
    let params = track.codec_params.clone();
    let track_id = track.id;

    let decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .context("No decoder for the audio codec")?;

    Ok(OpenTrack {
        reader,
        decoder,
        track_id,
        channels: params.channels.map_or(1, |c| c.count()),
        sample_rate: params.sample_rate.context("Audio track has no sample rate")?,
    })
}

/// Decode the first audio track of `path` to mono `i16`.
pub fn decode_audio(path: &Path) -> Result<DecodedAudio> {
    let mut track = open_track(path)?;
    let mut samples: Vec<i16> = Vec::new();
    let mut scratch: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match track.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };
        if packet.track_id() != track.track_id {
            continue;
        }

        let decoded = match track.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packets are skipped, not fatal.
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => return Err(e).context("Audio decode failed"),
        };

        let needed = decoded.capacity() as u64;
        if scratch.as_ref().is_some_and(|buf| (buf.capacity() as u64) < needed) {
            scratch = None;
        }
        let buf = scratch.get_or_insert_with(|| SampleBuffer::<i16>::new(needed, *decoded.spec()));
        buf.copy_interleaved_ref(decoded);
        downmix_into(buf.samples(), track.channels, &mut samples);
    }

    let audio = DecodedAudio {
        samples,
        sample_rate: track.sample_rate,
    };
    log::info!(
        "Decoded audio: {} mono samples, {}Hz, {:.1}s",
        audio.samples.len(),
        audio.sample_rate,
        audio.duration_secs()
    );
    Ok(audio)
}

/// Average interleaved frames down to one channel.
fn downmix_into(interleaved: &[i16], channels: usize, out: &mut Vec<i16>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    for frame in interleaved.chunks(channels) {
        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
        out.push((sum / frame.len() as i32) as i16);
    }
}
