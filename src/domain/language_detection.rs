use super::LanguageTag;

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageDetection {
    pub lang: LanguageTag,
    pub confidence: f32,
}

impl LanguageDetection {
    pub fn new(lang: LanguageTag, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { lang, confidence }
    }

    pub fn certain(lang: LanguageTag) -> Self {
        Self::new(lang, 1.0)
    }
}
