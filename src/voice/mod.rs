//! Voice processing: utterance capture, wake word, STT, TTS and playback

mod capture;
mod playback;
mod stt;
mod tts;
mod wake_word;

pub use capture::{
    CHANNELS, DEFAULT_MAX_SEGMENT_BYTES, SAMPLE_RATE, SilenceSegmenter, SpeakerId, TrailingSilence,
    UtteranceCapture, UtteranceSegment, pcm_bytes_to_wav, samples_to_bytes,
};
pub use playback::{
    AudioInfo, AudioPlayer, GuildId, PlayerHandle, PlayerRegistry, VoiceConnection, probe_audio,
};
pub use stt::{GladiaTranscriber, Transcriber};
pub use tts::{GladiaSynthesizer, Synthesizer};
pub use wake_word::WakeWord;
