use std::fs;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub vad: VadConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8010
}

/// Frame geometry shared by the segmenter and the transcription providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_frame_duration_ms")]
    pub frame_duration_ms: u64,
    #[serde(default = "default_padding_duration_ms")]
    pub padding_duration_ms: u64,
    #[serde(default = "default_min_speech_duration_ms")]
    pub min_speech_duration_ms: u64,
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_frame_duration_ms() -> u64 {
    30
}

fn default_padding_duration_ms() -> u64 {
    300
}

fn default_min_speech_duration_ms() -> u64 {
    250
}

impl AudioConfig {
    /// Expected byte length of one inbound frame (16-bit mono).
    pub fn frame_bytes(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize / 1000) * 2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// "energy", "smoothed_energy" or "banded"
    #[serde(default = "default_classifier")]
    pub classifier: String,
    #[serde(default)]
    pub energy: Option<EnergyClassifierConfig>,
    #[serde(default)]
    pub smoothed_energy: Option<SmoothedEnergyClassifierConfig>,
    #[serde(default)]
    pub banded: Option<BandedClassifierConfig>,
}

fn default_classifier() -> String {
    "energy".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyClassifierConfig {
    #[serde(default = "default_energy_threshold")]
    pub threshold: f32,
}

fn default_energy_threshold() -> f32 {
    0.01
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothedEnergyClassifierConfig {
    #[serde(default = "default_prob_threshold")]
    pub prob_threshold: f32,
    #[serde(default = "default_db_threshold")]
    pub db_threshold: f32,
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
}

fn default_prob_threshold() -> f32 {
    0.5
}

fn default_db_threshold() -> f32 {
    -40.0
}

fn default_smoothing_window() -> usize {
    5
}

impl Default for SmoothedEnergyClassifierConfig {
    fn default() -> Self {
        Self {
            prob_threshold: default_prob_threshold(),
            db_threshold: default_db_threshold(),
            smoothing_window: default_smoothing_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandedClassifierConfig {
    #[serde(default = "default_aggressiveness")]
    pub aggressiveness: u8,
}

fn default_aggressiveness() -> u8 {
    2
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub asr: AsrConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    /// "remote" or "openai_whisper"
    #[serde(default = "default_remote_provider")]
    pub provider: String,
    #[serde(default = "default_asr_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_remote_provider() -> String {
    "remote".to_string()
}

fn default_asr_base_url() -> String {
    "http://localhost:8001".to_string()
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            provider: default_remote_provider(),
            base_url: default_asr_base_url(),
            api_key: None,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai_compatible" or "remote"
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_llm_provider() -> String {
    "openai_compatible".to_string()
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_llm_model() -> String {
    "llama3.1".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_stream() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_llm_model(),
            temperature: default_temperature(),
            stream: default_stream(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// "remote"
    #[serde(default = "default_remote_provider")]
    pub provider: String,
    #[serde(default = "default_tts_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_tts_base_url() -> String {
    "http://localhost:8002".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_remote_provider(),
            base_url: default_tts_base_url(),
            voice: None,
            language: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_history_dir")]
    pub history_dir: String,
}

fn default_system_prompt() -> String {
    "You are an AI communication coach helping users improve their speaking skills. \
     Be encouraging, constructive, and engaging. Ask relevant follow-up questions and \
     provide helpful tips when appropriate. Keep responses conversational and natural."
        .to_string()
}

fn default_history_dir() -> String {
    "chat_history".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;

        // Determine file type by extension
        let path_lower = path.to_lowercase();
        if path_lower.ends_with(".json") {
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            audio: AudioConfig::default(),
            vad: VadConfig::default(),
            providers: ProvidersConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_duration_ms: default_frame_duration_ms(),
            padding_duration_ms: default_padding_duration_ms(),
            min_speech_duration_ms: default_min_speech_duration_ms(),
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            classifier: default_classifier(),
            energy: None,
            smoothed_energy: None,
            banded: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            history_dir: default_history_dir(),
        }
    }
}
