//! Translation between the user's language and the model's working language.
//!
//! Uses the unauthenticated Google translate endpoint (`client=gtx`), the
//! same service the original desktop build leans on. The orchestrator is
//! responsible for skipping the call entirely when the target already equals
//! the working language; calling through here with `target == source` would
//! only add round-trip noise to already-correct text.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::error::TranslationError;

/// The language the generation backend operates in.
pub const WORKING_LANGUAGE: &str = "en";

const TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";
const TRANSLATE_TIMEOUT_SECS: u64 = 10;

/// Supported (speech-recognition locale, translation/synthesis code) pairs.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en-US", "en"),
    ("ar-SA", "ar"),
    ("el-GR", "el"),
    ("fr-FR", "fr"),
    ("es-ES", "es"),
    ("de-DE", "de"),
    ("it-IT", "it"),
    ("pt-PT", "pt"),
    ("ru-RU", "ru"),
    ("zh-CN", "zh-CN"),
    ("ja-JP", "ja"),
    ("he-IL", "he"),
];

/// The user's selected language pair, constant until changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePreference {
    /// Speech-recognition locale tag, e.g. `en-US`.
    pub locale: String,
    /// Translation/synthesis language code, e.g. `en`.
    pub code: String,
}

impl LanguagePreference {
    /// Look up a preference by locale tag or bare language code.
    pub fn resolve(tag: &str) -> Result<Self, TranslationError> {
        SUPPORTED_LANGUAGES
            .iter()
            .find(|(locale, code)| locale.eq_ignore_ascii_case(tag) || code.eq_ignore_ascii_case(tag))
            .map(|(locale, code)| Self {
                locale: locale.to_string(),
                code: code.to_string(),
            })
            .ok_or_else(|| TranslationError::UnsupportedLanguage(tag.to_string()))
    }

    /// Whether replies need no translation out of the working language.
    pub fn is_working_language(&self) -> bool {
        self.code == WORKING_LANGUAGE
    }
}

impl Default for LanguagePreference {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            code: WORKING_LANGUAGE.to_string(),
        }
    }
}

/// Translation backend. `source` may be `"auto"` to detect the language.
#[async_trait]
pub trait Translator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError>;
}

/// Translator backed by the free Google `gtx` endpoint.
pub struct GoogleTranslator {
    client: reqwest::Client,
}

impl GoogleTranslator {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TRANSLATE_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        tracing::debug!(source, target, chars = text.len(), "translating");

        let response = self
            .client
            .get(TRANSLATE_URL)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| TranslationError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| TranslationError::Http(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| TranslationError::Parse(e.to_string()))?;

        parse_gtx_response(&body)
    }
}

/// The gtx endpoint answers with nested arrays; the translated text is the
/// first element of each segment under the first top-level array.
fn parse_gtx_response(body: &Value) -> Result<String, TranslationError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslationError::Parse("missing segment array".to_string()))?;

    let mut translated = String::new();
    for segment in segments {
        if let Some(piece) = segment.get(0).and_then(Value::as_str) {
            translated.push_str(piece);
        }
    }

    if translated.is_empty() {
        return Err(TranslationError::Parse("empty translation".to_string()));
    }
    Ok(translated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_locale_tags_and_bare_codes() {
        let by_locale = LanguagePreference::resolve("fr-FR").unwrap();
        assert_eq!(by_locale.code, "fr");
        let by_code = LanguagePreference::resolve("ja").unwrap();
        assert_eq!(by_code.locale, "ja-JP");
    }

    #[test]
    fn rejects_unknown_languages() {
        assert!(matches!(
            LanguagePreference::resolve("tlh"),
            Err(TranslationError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn english_is_the_working_language() {
        assert!(LanguagePreference::default().is_working_language());
        assert!(!LanguagePreference::resolve("de").unwrap().is_working_language());
    }

    #[test]
    fn parses_gtx_segments() {
        let body = json!([[["Bonjour ", "Hello ", null], ["le monde", "world", null]], null, "en"]);
        assert_eq!(parse_gtx_response(&body).unwrap(), "Bonjour le monde");
    }

    #[test]
    fn empty_gtx_body_is_a_parse_error() {
        assert!(matches!(
            parse_gtx_response(&json!([[]])),
            Err(TranslationError::Parse(_))
        ));
        assert!(matches!(
            parse_gtx_response(&json!({})),
            Err(TranslationError::Parse(_))
        ));
    }
}
