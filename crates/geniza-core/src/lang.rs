//! Language detection over post text.

use lingua::{Language, LanguageDetector, LanguageDetectorBuilder};

/// The Hebrew alphabet, final letter forms included.
const HEBREW_LETTERS: &str = "אבגדהוזחטיכךלמםנןסעפףצץקרשת";

/// Process-wide language gate.
///
/// The detector scores every candidate language and the gate accepts exactly
/// one target; keeping the full candidate universe in play stops look-alike
/// scripts and loanwords from passing as the target. Building the detector
/// is expensive, so one instance is built at startup and shared read-only
/// across workers. Detection itself is stateless: each call sees one string
/// with no dependency on prior calls.
pub struct LanguageFilter {
    detector: LanguageDetector,
    target: Language,
}

impl LanguageFilter {
    /// Build a detector over all supported languages, accepting `target`.
    pub fn new(target: Language) -> Self {
        let detector = LanguageDetectorBuilder::from_all_languages().build();
        Self { detector, target }
    }

    /// The accepted language.
    pub fn target(&self) -> Language {
        self.target
    }

    /// Classify `text`, returning `None` when the detector is not confident.
    ///
    /// When the target is Hebrew, a charset prescreen skips the detector for
    /// text holding no Hebrew letters at all; nearly all stream traffic is
    /// ruled out by that single pass.
    pub fn detect(&self, text: &str) -> Option<Language> {
        if self.target == Language::Hebrew && !contains_hebrew_letters(text) {
            return None;
        }
        self.detector.detect_language_of(text)
    }

    /// Whether `text` is confidently detected as the target language.
    pub fn matches(&self, text: &str) -> bool {
        self.detect(text) == Some(self.target)
    }
}

/// True when any character of `text` is a Hebrew letter.
pub fn contains_hebrew_letters(text: &str) -> bool {
    text.chars().any(|c| HEBREW_LETTERS.contains(c))
}
