use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::Aspect;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/clearview.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_openai_base_url(),
            timeout_secs: default_generation_timeout(),
            max_attempts: default_max_attempts(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_generation_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    2
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_aspects")]
    pub aspects: Vec<Aspect>,
    #[serde(default = "default_bias_cutoff")]
    pub bias_cutoff: f64,
    /// Number of categories at or above the cutoff that makes the bias level "high".
    #[serde(default = "default_high_bias_count")]
    pub high_bias_count: usize,
    /// Confidence assigned to a YES/NO verdict when the model gives none.
    #[serde(default = "default_verdict_confidence")]
    pub verdict_confidence: f64,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default = "default_summary_sentences")]
    pub summary_sentences: usize,
    /// Overall budget for one aspect unit, retries included.
    #[serde(default = "default_aspect_timeout")]
    pub aspect_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            aspects: default_aspects(),
            bias_cutoff: default_bias_cutoff(),
            high_bias_count: default_high_bias_count(),
            verdict_confidence: default_verdict_confidence(),
            max_prompt_chars: default_max_prompt_chars(),
            summary_sentences: default_summary_sentences(),
            aspect_timeout_secs: default_aspect_timeout(),
        }
    }
}

fn default_aspects() -> Vec<Aspect> {
    Aspect::ALL.to_vec()
}
fn default_bias_cutoff() -> f64 {
    0.5
}
fn default_high_bias_count() -> usize {
    2
}
fn default_verdict_confidence() -> f64 {
    0.85
}
fn default_max_prompt_chars() -> usize {
    5_000
}
fn default_summary_sentences() -> usize {
    3
}
fn default_aspect_timeout() -> u64 {
    90
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_elevenlabs_url")]
    pub primary_base_url: String,
    #[serde(default = "default_elevenlabs_model")]
    pub primary_model: String,
    #[serde(default = "default_voice")]
    pub default_voice: String,
    #[serde(default = "default_fallback_url")]
    pub fallback_base_url: String,
    /// Voice (language/accent) used by the fallback provider. Never the caller's voice.
    #[serde(default = "default_fallback_voice")]
    pub fallback_voice: String,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            primary_base_url: default_elevenlabs_url(),
            primary_model: default_elevenlabs_model(),
            default_voice: default_voice(),
            fallback_base_url: default_fallback_url(),
            fallback_voice: default_fallback_voice(),
            max_chars: default_max_chars(),
            timeout_secs: default_speech_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_elevenlabs_url() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}
fn default_elevenlabs_model() -> String {
    "eleven_turbo_v2_5".to_string()
}
fn default_voice() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}
fn default_fallback_url() -> String {
    "https://translate.google.com/translate_tts".to_string()
}
fn default_fallback_voice() -> String {
    "en".to_string()
}
fn default_max_chars() -> usize {
    5_000
}
fn default_speech_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    /// Scraped pages shorter than this are treated as unreadable.
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_extraction_timeout(),
            max_text_chars: default_max_text_chars(),
            min_words: default_min_words(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_extraction_timeout() -> u64 {
    15
}
fn default_max_text_chars() -> usize {
    50_000
}
fn default_min_words() -> usize {
    50
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; clearview/0.1)".to_string()
}

impl Config {
    /// All-default configuration, used when no config file is present.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig::default(),
            server: ServerConfig::default(),
            generation: GenerationConfig::default(),
            analysis: AnalysisConfig::default(),
            speech: SpeechConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate analysis
    if config.analysis.aspects.is_empty() {
        anyhow::bail!("analysis.aspects must list at least one aspect");
    }
    for (i, aspect) in config.analysis.aspects.iter().enumerate() {
        if config.analysis.aspects[..i].contains(aspect) {
            anyhow::bail!("analysis.aspects lists '{}' more than once", aspect);
        }
    }
    if config.analysis.aspect_timeout_secs == 0 {
        anyhow::bail!("analysis.aspect_timeout_secs must be > 0");
    }
    if !(0.0..=1.0).contains(&config.analysis.bias_cutoff) {
        anyhow::bail!("analysis.bias_cutoff must be in [0.0, 1.0]");
    }
    if !(0.5..=1.0).contains(&config.analysis.verdict_confidence) {
        anyhow::bail!("analysis.verdict_confidence must be in [0.5, 1.0]");
    }
    if config.analysis.high_bias_count == 0 {
        anyhow::bail!("analysis.high_bias_count must be >= 1");
    }
    if config.analysis.max_prompt_chars == 0 {
        anyhow::bail!("analysis.max_prompt_chars must be > 0");
    }

    // Validate retry budgets
    if config.generation.max_attempts == 0 {
        anyhow::bail!("generation.max_attempts must be >= 1");
    }
    let generation_budget =
        u64::from(config.generation.max_attempts).saturating_mul(config.generation.timeout_secs);
    if generation_budget > config.analysis.aspect_timeout_secs {
        anyhow::bail!(
            "analysis.aspect_timeout_secs ({}) must cover generation.max_attempts * generation.timeout_secs ({})",
            config.analysis.aspect_timeout_secs,
            generation_budget
        );
    }
    if config.speech.max_attempts == 0 || config.speech.max_attempts > 2 {
        anyhow::bail!("speech.max_attempts must be 1 or 2");
    }

    if config.speech.max_chars == 0 {
        anyhow::bail!("speech.max_chars must be > 0");
    }
    if config.extraction.max_text_chars == 0 {
        anyhow::bail!("extraction.max_text_chars must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.analysis.aspects.len(), 4);
        assert_eq!(config.generation.max_attempts, 2);
        assert_eq!(config.analysis.bias_cutoff, 0.5);
    }

    #[test]
    fn aspects_parse_from_lowercase_names() {
        let config: Config = toml::from_str(
            r#"
            [analysis]
            aspects = ["scam", "bias"]
            bias_cutoff = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.aspects, vec![Aspect::Scam, Aspect::Bias]);
        assert_eq!(config.analysis.bias_cutoff, 0.7);
    }

    #[test]
    fn example_config_is_valid() {
        let config: Config =
            toml::from_str(include_str!("../config/clearview.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.speech.fallback_voice, "en");
        assert_eq!(config.analysis.high_bias_count, 2);
    }

    #[test]
    fn out_of_range_cutoff_is_rejected() {
        let mut config = Config::minimal();
        config.analysis.bias_cutoff = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn duplicate_aspects_are_rejected() {
        let config: Config = toml::from_str(
            r#"
            [analysis]
            aspects = ["scam", "bias", "scam"]
            "#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn zero_aspect_timeout_is_rejected() {
        let mut config = Config::minimal();
        config.analysis.aspect_timeout_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn aspect_timeout_must_cover_generation_retries() {
        let mut config = Config::minimal();
        config.generation.max_attempts = 3;
        config.generation.timeout_secs = 40;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("aspect_timeout_secs"));

        config.analysis.aspect_timeout_secs = 120;
        validate(&config).unwrap();
    }

    #[test]
    fn speech_retry_bound_is_enforced() {
        let mut config = Config::minimal();
        config.speech.max_attempts = 3;
        assert!(validate(&config).is_err());
    }
}
