//! Speech-to-text over a normalized audio resource.

use super::TranscriptionError;
use crate::adapters::{RecognitionRequest, SpeechRecognizer, SpeechSegment};
use crate::audio::{AudioInput, AudioNormalizer, AudioResource};
use crate::translation::LanguageTag;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Language codes the Whisper models understand.
const WHISPER_LANGUAGES: &[&str] = &[
    "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar", "sv", "it", "id", "hi",
    "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta", "no", "th", "ur", "hr", "bg", "lt", "la",
    "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn", "sr", "az", "sl", "kn", "et", "mk", "br", "eu", "is", "hy",
    "ne", "mn", "bs", "kk", "sq", "sw", "gl", "mr", "pa", "si", "km", "sn", "yo", "so", "af", "oc", "ka", "be",
    "tg", "sd", "gu", "am", "yi", "lo", "uz", "fo", "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo", "tl",
    "mg", "as", "tt", "haw", "ln", "ha", "ba", "jw", "su", "yue",
];

/// Decoding settings shared by every call.
#[derive(Debug, Clone)]
pub struct TranscriptionSettings {
    pub beam_size: u32,
    pub min_silence_ms: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    pub detected_language: String,
    pub segments: Vec<SpeechSegment>,
}

impl TranscriptionResult {
    /// All segment texts joined with single spaces.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub struct TranscriptionPipeline {
    recognizer: Arc<dyn SpeechRecognizer>,
    normalizer: Arc<AudioNormalizer>,
    settings: TranscriptionSettings,
}

impl TranscriptionPipeline {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        normalizer: Arc<AudioNormalizer>,
        settings: TranscriptionSettings,
    ) -> Self {
        Self { recognizer, normalizer, settings }
    }

    /// Transcribe a resource. The resource is consumed, so a temporary file
    /// is deleted when this returns, whatever the outcome.
    #[instrument(skip(self, resource), fields(source = ?resource.source_kind(), hint = ?language_hint))]
    pub async fn transcribe(
        &self,
        resource: AudioResource,
        language_hint: Option<&str>,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let language = language_hint.and_then(supported_language);

        let request = RecognitionRequest {
            audio_path: resource.path(),
            language: language.as_deref(),
            beam_size: self.settings.beam_size,
            vad_filter: true,
            min_silence_ms: self.settings.min_silence_ms,
        };

        let recognized = self
            .recognizer
            .recognize(request)
            .await
            .map_err(TranscriptionError::TranscriptionFailed)?;
        drop(resource);

        let mut segments = recognized.segments;
        // Stable, so segments with equal start times keep the model's order.
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        info!(
            detected_language = %recognized.language,
            segments = segments.len(),
            "Transcription complete"
        );
        Ok(TranscriptionResult { detected_language: recognized.language, segments })
    }

    /// Normalize the input and transcribe it.
    pub async fn transcribe_input(
        &self,
        input: AudioInput,
        language_hint: Option<&str>,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let resource = self.normalizer.normalize(input).await?;
        debug!(path = %resource.path().display(), temporary = resource.is_temporary(), "Audio normalized");
        self.transcribe(resource, language_hint).await
    }
}

/// Map a hint to a Whisper code, or `None` (auto-detect) when unrecognized.
fn supported_language(hint: &str) -> Option<String> {
    if hint.trim().is_empty() {
        return None;
    }

    let tag = match LanguageTag::parse(hint) {
        Ok(tag) => tag,
        Err(_) => {
            warn!(hint = %hint, "Unrecognized language hint, falling back to auto-detect");
            return None;
        }
    };

    // Regional tags like `zh-cn` fall back to their primary code.
    let primary = tag.as_str().split('-').next().unwrap_or_default();
    if WHISPER_LANGUAGES.contains(&primary) {
        Some(primary.to_string())
    } else {
        warn!(hint = %hint, "Language not supported by the speech model, falling back to auto-detect");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterError, RecognizedSpeech};
    use crate::config::AppConfig;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedRecognizer {
        fail: bool,
        seen: Mutex<Vec<(PathBuf, bool, Option<String>)>>,
    }

    #[async_trait]
    impl SpeechRecognizer for ScriptedRecognizer {
        async fn recognize(&self, request: RecognitionRequest<'_>) -> Result<RecognizedSpeech, AdapterError> {
            self.seen.lock().unwrap().push((
                request.audio_path.to_path_buf(),
                request.audio_path.exists(),
                request.language.map(str::to_string),
            ));
            if self.fail {
                return Err(AdapterError::Status {
                    endpoint: "v1/audio/transcriptions".to_string(),
                    status: 500,
                    body: "model crashed".to_string(),
                });
            }
            Ok(RecognizedSpeech {
                language: "vi".to_string(),
                segments: vec![
                    SpeechSegment { start: 2.0, end: 3.0, text: " bạn".to_string() },
                    SpeechSegment { start: 0.0, end: 2.0, text: "xin chào".to_string() },
                ],
            })
        }
    }

    fn pipeline(recognizer: Arc<ScriptedRecognizer>, dir: &tempfile::TempDir) -> TranscriptionPipeline {
        let mut audio = AppConfig::default().audio;
        audio.temp_dir = Some(dir.path().to_path_buf());
        let normalizer = Arc::new(AudioNormalizer::new(&audio).unwrap());
        TranscriptionPipeline::new(
            recognizer,
            normalizer,
            TranscriptionSettings { beam_size: audio.beam_size, min_silence_ms: audio.min_silence_ms },
        )
    }

    fn upload() -> AudioInput {
        AudioInput::Upload { bytes: b"RIFFdata".to_vec(), filename: Some("speech.wav".to_string()) }
    }

    #[tokio::test]
    async fn temp_file_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let pipeline = pipeline(recognizer.clone(), &dir);

        let result = pipeline.transcribe_input(upload(), Some("Vietnamese")).await.unwrap();

        let seen = recognizer.seen.lock().unwrap();
        let (path, existed, language) = &seen[0];
        assert!(existed);
        assert_eq!(language.as_deref(), Some("vi"));
        assert!(!path.exists());
        assert_eq!(result.detected_language, "vi");
    }

    #[tokio::test]
    async fn temp_file_removed_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = Arc::new(ScriptedRecognizer { fail: true, ..Default::default() });
        let pipeline = pipeline(recognizer.clone(), &dir);

        let err = pipeline.transcribe_input(upload(), None).await.unwrap_err();

        assert!(matches!(err, TranscriptionError::TranscriptionFailed(_)));
        let (path, existed, _) = recognizer.seen.lock().unwrap()[0].clone();
        assert!(existed);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn segments_sorted_and_joined() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(Arc::new(ScriptedRecognizer::default()), &dir);

        let result = pipeline.transcribe_input(upload(), None).await.unwrap();

        assert_eq!(result.segments[0].start, 0.0);
        assert_eq!(result.segments[1].start, 2.0);
        assert_eq!(result.text(), "xin chào bạn");
    }

    #[tokio::test]
    async fn unknown_hint_becomes_auto_detect() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let pipeline = pipeline(recognizer.clone(), &dir);

        pipeline.transcribe_input(upload(), Some("Klingonese")).await.unwrap();
        pipeline.transcribe_input(upload(), Some("xx")).await.unwrap();

        let seen = recognizer.seen.lock().unwrap();
        assert!(seen.iter().all(|(_, _, language)| language.is_none()));
    }

    #[tokio::test]
    async fn normalizer_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::default());
        let pipeline = pipeline(recognizer.clone(), &dir);

        let err = pipeline
            .transcribe_input(AudioInput::from_reference("blob:http://localhost/abc"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::Audio(_)));
        assert!(recognizer.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn regional_hint_uses_primary_code() {
        assert_eq!(supported_language("zh-CN").as_deref(), Some("zh"));
        assert_eq!(supported_language("English").as_deref(), Some("en"));
        assert_eq!(supported_language("").as_deref(), None);
    }
}
