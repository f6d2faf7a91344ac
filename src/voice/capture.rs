//! Utterance capture from per-speaker voice streams
//!
//! Frames are appended per speaker until the speaker's [`SilenceSegmenter`]
//! reports trailing silence, at which point the segment is closed and handed
//! back to the caller. Time is always passed in explicitly so the capture can
//! be driven by synthetic frame sequences and ticks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::voice::GuildId;
use crate::{Error, Result};

/// Sample rate of decoded Discord voice
pub const SAMPLE_RATE: u32 = 48_000;

/// Channel count of decoded Discord voice
pub const CHANNELS: u16 = 2;

/// Speaker identifier: the Discord user id, or the RTP SSRC until it is known
pub type SpeakerId = u64;

/// Segment size at which capture stops waiting for silence: 30 s of decoded
/// voice
pub const DEFAULT_MAX_SEGMENT_BYTES: usize = 30 * 48_000 * 2 * 2;

/// Decides when an open segment has gone silent
pub trait SilenceSegmenter: Send {
    /// Record that a frame arrived at `at`
    fn on_frame(&mut self, at: Instant);

    /// Whether the segment should be closed at `now`
    fn is_silent(&self, now: Instant) -> bool;
}

/// Closes a segment once no frame has arrived for a fixed duration
#[derive(Debug, Clone)]
pub struct TrailingSilence {
    timeout: Duration,
    last_frame: Option<Instant>,
}

impl TrailingSilence {
    /// Create a segmenter with the given trailing-silence duration
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_frame: None,
        }
    }
}

impl SilenceSegmenter for TrailingSilence {
    fn on_frame(&mut self, at: Instant) {
        self.last_frame = Some(at);
    }

    fn is_silent(&self, now: Instant) -> bool {
        self.last_frame
            .is_some_and(|last| now.saturating_duration_since(last) >= self.timeout)
    }
}

/// A closed span of one speaker's audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceSegment {
    /// Guild the audio was captured in
    pub guild_id: GuildId,

    /// Who spoke
    pub speaker: SpeakerId,

    /// Raw PCM bytes in arrival order
    pub audio: Vec<u8>,

    /// Number of frames appended
    pub frames: usize,

    /// When the segment opened
    pub started_at: Instant,

    /// When the segment was closed
    pub closed_at: Instant,
}

impl UtteranceSegment {
    /// Create a segment from already-buffered audio
    #[must_use]
    pub fn new(guild_id: GuildId, speaker: SpeakerId, audio: Vec<u8>) -> Self {
        let now = Instant::now();
        Self {
            guild_id,
            speaker,
            audio,
            frames: 1,
            started_at: now,
            closed_at: now,
        }
    }

    /// Total byte length
    #[must_use]
    pub fn len(&self) -> usize {
        self.audio.len()
    }

    /// Whether no audio was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }

    /// Time between the first frame and close
    #[must_use]
    pub fn span(&self) -> Duration {
        self.closed_at.saturating_duration_since(self.started_at)
    }
}

/// Segment still receiving frames
struct OpenSegment {
    buffer: Vec<u8>,
    frames: usize,
    started_at: Instant,
    segmenter: Box<dyn SilenceSegmenter>,
}

type SegmenterFactory = Box<dyn Fn() -> Box<dyn SilenceSegmenter> + Send + Sync>;

/// Buffers per-speaker audio into utterance segments for one guild
pub struct UtteranceCapture {
    guild_id: GuildId,
    open: HashMap<SpeakerId, OpenSegment>,
    new_segmenter: SegmenterFactory,
    max_segment_bytes: usize,

    /// Segments closed by the size cap, handed out on the next close
    full: Vec<UtteranceSegment>,
}

impl UtteranceCapture {
    /// Create a capture that closes segments after `silence` without frames
    #[must_use]
    pub fn new(guild_id: GuildId, silence: Duration) -> Self {
        Self::with_segmenter(guild_id, move || {
            Box::new(TrailingSilence::new(silence)) as Box<dyn SilenceSegmenter>
        })
    }

    /// Create a capture with a custom silence segmenter per segment
    #[must_use]
    pub fn with_segmenter<F>(guild_id: GuildId, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SilenceSegmenter> + Send + Sync + 'static,
    {
        Self {
            guild_id,
            open: HashMap::new(),
            new_segmenter: Box::new(factory),
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            full: Vec::new(),
        }
    }

    /// Close a segment once it reaches `bytes`, even if the speaker never
    /// pauses
    #[must_use]
    pub fn with_max_segment_bytes(mut self, bytes: usize) -> Self {
        self.max_segment_bytes = bytes.max(1);
        self
    }

    /// Open a segment for `speaker`
    ///
    /// Returns `false` and leaves the existing segment untouched if one is
    /// already open for this speaker.
    pub fn begin(&mut self, speaker: SpeakerId, now: Instant) -> bool {
        if self.open.contains_key(&speaker) {
            tracing::trace!(speaker, "capture already open, ignoring start");
            return false;
        }

        let mut segmenter = (self.new_segmenter)();
        segmenter.on_frame(now);
        self.open.insert(
            speaker,
            OpenSegment {
                buffer: Vec::new(),
                frames: 0,
                started_at: now,
                segmenter,
            },
        );

        tracing::debug!(guild_id = self.guild_id, speaker, "capture started");
        true
    }

    /// Append a frame for `speaker`, opening a segment if needed
    ///
    /// A segment that reaches the size cap is closed immediately and returned
    /// by the next [`close_silent`](Self::close_silent).
    pub fn push_frame(&mut self, speaker: SpeakerId, frame: &[u8], now: Instant) {
        if frame.is_empty() {
            return;
        }

        self.begin(speaker, now);
        let Some(segment) = self.open.get_mut(&speaker) else {
            return;
        };
        segment.buffer.extend_from_slice(frame);
        segment.frames += 1;
        segment.segmenter.on_frame(now);

        if segment.buffer.len() >= self.max_segment_bytes {
            tracing::debug!(
                guild_id = self.guild_id,
                speaker,
                max = self.max_segment_bytes,
                "segment hit size cap"
            );
            if let Some(segment) = self.open.remove(&speaker) {
                let closed = self.finish(speaker, segment, now);
                self.full.push(closed);
            }
        }
    }

    /// Move the open segment of `from` to `to`
    ///
    /// Used once an SSRC is mapped to its user. Does nothing if `from` has no
    /// open segment or `to` already has one.
    pub fn rekey(&mut self, from: SpeakerId, to: SpeakerId) -> bool {
        if from == to || self.open.contains_key(&to) {
            return false;
        }
        let Some(segment) = self.open.remove(&from) else {
            return false;
        };

        self.open.insert(to, segment);
        tracing::trace!(guild_id = self.guild_id, from, to, "open segment re-keyed");
        true
    }

    /// Close every segment that has gone silent at `now`
    ///
    /// Also returns segments closed by the size cap since the last call.
    /// Segments that never received a frame are discarded here.
    pub fn close_silent(&mut self, now: Instant) -> Vec<UtteranceSegment> {
        let silent: Vec<SpeakerId> = self
            .open
            .iter()
            .filter(|(_, segment)| segment.segmenter.is_silent(now))
            .map(|(speaker, _)| *speaker)
            .collect();

        let mut closed = std::mem::take(&mut self.full);
        for speaker in silent {
            let Some(segment) = self.open.remove(&speaker) else {
                continue;
            };

            if segment.buffer.is_empty() {
                tracing::trace!(speaker, "capture closed without audio");
                continue;
            }

            closed.push(self.finish(speaker, segment, now));
        }

        closed
    }

    fn finish(&self, speaker: SpeakerId, segment: OpenSegment, now: Instant) -> UtteranceSegment {
        tracing::debug!(
            guild_id = self.guild_id,
            speaker,
            bytes = segment.buffer.len(),
            frames = segment.frames,
            "utterance segment closed"
        );

        UtteranceSegment {
            guild_id: self.guild_id,
            speaker,
            audio: segment.buffer,
            frames: segment.frames,
            started_at: segment.started_at,
            closed_at: now,
        }
    }

    /// Whether `speaker` has an open segment
    #[must_use]
    pub fn is_capturing(&self, speaker: SpeakerId) -> bool {
        self.open.contains_key(&speaker)
    }

    /// Number of open segments
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Guild this capture belongs to
    #[must_use]
    pub const fn guild_id(&self) -> GuildId {
        self.guild_id
    }
}

/// Flatten decoded i16 samples to little-endian bytes
#[must_use]
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Wrap little-endian 16-bit PCM in a WAV container
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_bytes_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for chunk in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
