//! Process-level configuration, loaded entirely from the environment.

use convo_core::audio::AudioProcessorConfig;
use convo_core::executor::{PoolConfig, PoolName, Scheduler};
use convo_core::janitor::DEFAULT_MAX_IDLE_MS;
use convo_core::orchestrator::OrchestratorConfig;
use convo_core::vad::VadConfig;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttBackend {
    Mock,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Mock,
    OpenAi,
}

/// Everything read once at process start. `stt.*`/`llm.*`/`pool.sizes`/
/// `thresholds.*`/`maxBufferMs`/`ctxTtlMs` are the recognized keys,
/// expressed here as `SCREAMING_SNAKE_CASE` env vars.
pub struct ServerConfig {
    pub bind_address: String,
    pub stt_backend: SttBackend,
    pub stt_languages: Vec<String>,
    pub llm_backend: LlmBackend,
    pub audio: AudioProcessorConfig,
    pub orchestrator: OrchestratorConfig,
    pub session_idle_ms: u64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let stt_backend = match env_or("STT_PROVIDER", "mock").as_str() {
            "http" | "whisper" | "openai" => SttBackend::Http,
            _ => SttBackend::Mock,
        };
        let llm_backend = match env_or("LLM_PROVIDER", "mock").as_str() {
            "openai" | "http" => LlmBackend::OpenAi,
            _ => LlmBackend::Mock,
        };
        let stt_languages: Vec<String> = env_or("STT_LANGUAGES", "en")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let vad = VadConfig {
            energy_threshold: env_parse("THRESHOLDS_ENERGY", VadConfig::default().energy_threshold),
            silence_threshold_ms: env_parse(
                "THRESHOLDS_SILENCE_MS",
                VadConfig::default().silence_threshold_ms,
            ),
            ..VadConfig::default()
        };
        let audio = AudioProcessorConfig {
            max_buffer_duration_ms: env_parse("MAX_BUFFER_MS", 30_000),
            vad,
            ..AudioProcessorConfig::default()
        };

        Self {
            bind_address: env_or("BIND_ADDRESS", "127.0.0.1:8090"),
            stt_backend,
            stt_languages,
            llm_backend,
            audio,
            orchestrator: OrchestratorConfig::default(),
            session_idle_ms: env_parse("CTX_TTL_MS", DEFAULT_MAX_IDLE_MS),
        }
    }

    /// Apply `pool.sizes` overrides of the form `audio=4,stt=3,llm=2,scheduled=2`.
    pub fn apply_pool_sizes(&self, mut scheduler: Scheduler) -> Scheduler {
        let Ok(spec) = std::env::var("POOL_SIZES") else {
            return scheduler;
        };
        for entry in spec.split(',') {
            let Some((name, size)) = entry.split_once('=') else { continue };
            let Ok(size) = size.trim().parse::<usize>() else { continue };
            let pool_name = match name.trim() {
                "audio" => PoolName::Audio,
                "stt" => PoolName::Stt,
                "llm" => PoolName::Llm,
                "scheduled" => PoolName::Scheduled,
                _ => continue,
            };
            scheduler = scheduler.with_pool_config(
                pool_name,
                PoolConfig {
                    size,
                    ..PoolConfig::defaults_for(pool_name)
                },
            );
        }
        scheduler
    }
}
