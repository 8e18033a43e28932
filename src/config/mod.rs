//! Configuration management
//!
//! Sources, lowest to highest precedence: compiled defaults, an optional TOML
//! file, `CALLBOT__SECTION__KEY` environment variables, and the flat variable
//! names older deployments already export (`LIVEKIT_URL`, `LLAMA_MODEL`, ...).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "CALLBOT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "callbot.toml";
const ENV_PREFIX: &str = "CALLBOT";

/// Flat variable name → config key
const LEGACY_ENV: [(&str, &str); 20] = [
    ("LIVEKIT_URL", "livekit.url"),
    ("LIVEKIT_API_KEY", "livekit.api_key"),
    ("LIVEKIT_API_SECRET", "livekit.api_secret"),
    ("SIP_OUTBOUND_TRUNK_ID", "sip.outbound_trunk_id"),
    ("LLAMA_MODEL", "pipeline.llm.model"),
    ("LLAMA_BASE_URL", "pipeline.llm.base_url"),
    ("LLM_TIMEOUT", "pipeline.llm.timeout_secs"),
    ("LLM_MAX_RETRIES", "pipeline.llm.max_retries"),
    ("STT_BASE_URL", "pipeline.stt.base_url"),
    ("VOXBOX_HF_REPO_ID", "pipeline.stt.model"),
    ("STT_API_KEY", "pipeline.stt.api_key"),
    ("STT_LANGUAGE", "pipeline.stt.language"),
    ("TTS_SPEAKER", "pipeline.tts.speaker"),
    ("TTS_SAMPLE_RATE", "pipeline.tts.sample_rate"),
    ("TTS_NUM_CHANNELS", "pipeline.tts.num_channels"),
    ("VAD_MIN_SPEECH_DURATION", "pipeline.vad.min_speech_duration"),
    ("VAD_MIN_SILENCE_DURATION", "pipeline.vad.min_silence_duration"),
    ("VAD_PREFIX_PADDING_DURATION", "pipeline.vad.prefix_padding_duration"),
    ("SESSION_MIN_ENDPOINTING_DELAY", "pipeline.turn.min_endpointing_delay"),
    ("SESSION_MIN_INTERRUPTION_WORDS", "pipeline.turn.min_interruption_words"),
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub livekit: LiveKitConfig,
    pub sip: SipConfig,
    pub agent: AgentConfig,
    pub call: CallConfig,
    pub session: SessionConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveKitConfig {
    /// Server URL; `ws(s)://` is accepted and mapped to `http(s)://`
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Upper bound on one API request; dialing waits for the callee to answer
    pub request_timeout_ms: u64,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7880".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout_ms: 60_000,
        }
    }
}

impl LiveKitConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    /// Trunk used to place outbound calls
    pub outbound_trunk_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub inbound_agent_name: String,
    pub outbound_agent_name: String,
    /// Markdown prompt for inbound calls
    pub prompt_path: Option<PathBuf>,
    /// Markdown prompt for outbound calls; falls back to `prompt_path`
    pub outbound_prompt_path: Option<PathBuf>,
    /// Keep only the text after the first line starting with this heading
    pub prompt_heading: Option<String>,
    pub fallback_persona: String,
    /// Spoken once the caller joins; `{client_name}` is substituted
    pub greeting: String,
    pub outbound_greeting: String,
    pub warmup_enabled: bool,
    pub warmup_user_text: String,
    pub default_client_name: String,
    /// Phone number → display name
    pub directory: HashMap<String, String>,
    pub farewell_phrases: Vec<String>,
    pub farewell_end_tolerance: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let directory = [
            ("79133888778", "Денис Сергеевич"),
            ("79955701443", "Денис"),
            ("79137296699", "Павел"),
            ("79831379240", "Артем"),
        ]
        .into_iter()
        .map(|(number, name)| (number.to_string(), name.to_string()))
        .collect();

        Self {
            inbound_agent_name: "elaina-inbound-mango".to_string(),
            outbound_agent_name: "elaina-outbound-caller".to_string(),
            prompt_path: None,
            outbound_prompt_path: None,
            prompt_heading: Some("## Системный промпт для агента Елена".to_string()),
            fallback_persona: "Ты — профессиональный медицинский регистратор Елена сети многопрофильных клиник \"СМИТРА\". Твоя цель: грамотно проконсультировать пациента, записать его на прием и создать атмосферу заботы.".to_string(),
            greeting: "Здравствуйте {client_name}, медицинский центр СМИТРА. Меня зовут Елена, слушаю вас?".to_string(),
            outbound_greeting: "Здравствуйте, меня зовут Елена. Чем могу быть полезна?".to_string(),
            warmup_enabled: true,
            warmup_user_text: "Привет".to_string(),
            default_client_name: "Иван".to_string(),
            directory,
            farewell_phrases: DEFAULT_FAREWELL_PHRASES.iter().map(|p| p.to_string()).collect(),
            farewell_end_tolerance: crate::domain::farewell::DEFAULT_END_TOLERANCE,
        }
    }
}

const DEFAULT_FAREWELL_PHRASES: [&str; 19] = [
    "спасибо за обращение",
    "хорошего дня",
    "до свидания",
    "всего доброго",
    "благодарю за звонок",
    "рада была помочь",
    "звоните еще",
    "обращайтесь еще",
    "спасибо, до свидания",
    "спасибо, хорошего дня",
    "ладно, до свидания",
    "всего наилучшего",
    "благодарю, до новых встреч",
    "рада была помочь, до свидания",
    "спасибо за обращение! до свидания",
    "хорошо, до связи",
    "пока",
    "покидаю вас",
    "завершаю вызов",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub teardown_timeout_ms: u64,
    pub playout_timeout_ms: u64,
    pub agent_farewell_delay_ms: u64,
    pub transfer_notice: String,
    pub transfer_error_notice: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            teardown_timeout_ms: 5000,
            playout_timeout_ms: 10_000,
            agent_farewell_delay_ms: 500,
            transfer_notice: "Сообщите пользователю, что вы собираетесь их перевести.".to_string(),
            transfer_error_notice: "Сообщите пользователю, что при переводе звонка произошла ошибка."
                .to_string(),
        }
    }
}

impl CallConfig {
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    pub fn playout_timeout(&self) -> Duration {
        Duration::from_millis(self.playout_timeout_ms)
    }

    pub fn agent_farewell_delay(&self) -> Duration {
        Duration::from_millis(self.agent_farewell_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a command to the session runtime may wait for its reply
    pub command_timeout_ms: u64,
    /// Buffered events per call before the socket reader applies backpressure
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            event_buffer: 64,
        }
    }
}

impl SessionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Speech pipeline settings, handed verbatim to the session runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub vad: VadConfig,
    pub turn: TurnConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: f64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen3-4b".to_string(),
            base_url: "http://127.0.0.1:11434/v1".to_string(),
            timeout_secs: 5.0,
            max_retries: 3,
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "Systran/faster-whisper-small".to_string(),
            base_url: "http://127.0.0.1:11435/v1".to_string(),
            api_key: "no-key-needed".to_string(),
            language: "ru".to_string(),
        }
    }
}

impl fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("language", &self.language)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub speaker: String,
    pub sample_rate: u32,
    pub num_channels: u16,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            speaker: "baya".to_string(),
            sample_rate: 48_000,
            num_channels: 1,
        }
    }
}

/// Voice activity detection, durations in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub min_speech_duration: f64,
    pub min_silence_duration: f64,
    pub prefix_padding_duration: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            min_speech_duration: 0.1,
            min_silence_duration: 0.5,
            prefix_padding_duration: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Seconds of silence before a user turn is committed
    pub min_endpointing_delay: f64,
    pub min_interruption_words: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            min_endpointing_delay: 0.1,
            min_interruption_words: 2,
        }
    }
}

impl Config {
    /// Load `.env`, then layer the config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal outside development
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path), std::env::vars().collect())
    }

    /// Load from an optional TOML file plus an explicit environment map.
    pub fn load_from(path: &Path, env: HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .source(Some(env.clone())),
            );

        for (var, key) in LEGACY_ENV {
            let value = env.get(var).filter(|v| !v.trim().is_empty()).cloned();
            builder = builder.set_override_option(key, value)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.farewell_phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid("agent.farewell_phrases is empty".to_string()));
        }
        if self.call.teardown_timeout_ms == 0 {
            return Err(ConfigError::Invalid("call.teardown_timeout_ms must be positive".to_string()));
        }
        if self.session.command_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.command_timeout_ms must be positive".to_string(),
            ));
        }
        if self.session.event_buffer == 0 {
            return Err(ConfigError::Invalid("session.event_buffer must be positive".to_string()));
        }
        if let Some(number) = self
            .agent
            .directory
            .keys()
            .find(|number| number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(ConfigError::Invalid(format!(
                "agent.directory key {:?} is not a phone number",
                number
            )));
        }
        Ok(())
    }
}
