use crate::common::AnalyzerSettings;
use crate::error::AppError;
use crate::pipeline::domain::{AnalyzerType, QualityLevel, QualityProfiles, ThrottleLevel};
use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "shotcoach";
const CONFIG_PATH_VAR: &str = "SHOTCOACH_CONFIG";
const ENV_PREFIX: &str = "SHOTCOACH";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub log_level: String,
    pub camera_fps: u32,
    /// Demo run length in seconds; 0 runs until Ctrl-C.
    pub run_seconds: u64,
    pub scheduler: SchedulerSettings,
    pub quality: QualitySettings,
    pub monitor: MonitorSettings,
    pub throttle: ThrottleSettings,
    pub analyzers: IndexMap<AnalyzerType, AnalyzerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Soft outer deadline for one frame's analyzer tasks.
    pub dispatch_deadline_ms: u64,
    pub deduplicate_suggestions: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    pub profiles: QualityProfiles,
    /// Highest level the throttle may grant.
    pub ceiling: QualityLevel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub latency_window: usize,
    pub snapshot_window: usize,
    pub target_latency_ms: u64,
    pub max_memory_mb: u64,
    pub low_battery_threshold: f32,
    /// Latency samples older than this are left out of the moving average.
    pub latency_max_age_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    pub tick_interval_ms: u64,
    /// Latency counts as pressure once the average exceeds target x margin.
    pub latency_margin: f32,
    /// How long a pressure signal must stay clear before stepping down.
    pub debounce_ms: u64,
    pub initial_level: ThrottleLevel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub enabled: bool,
    pub priority: Option<u8>,
    pub settings: AnalyzerSettings,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            camera_fps: 30,
            run_seconds: 0,
            scheduler: SchedulerSettings::default(),
            quality: QualitySettings::default(),
            monitor: MonitorSettings::default(),
            throttle: ThrottleSettings::default(),
            analyzers: AnalyzerType::ALL
                .into_iter()
                .map(|t| (t, AnalyzerConfig::default()))
                .collect(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            dispatch_deadline_ms: 250,
            deduplicate_suggestions: true,
        }
    }
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            profiles: QualityProfiles::default(),
            ceiling: QualityLevel::High,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            latency_window: 30,
            snapshot_window: 60,
            target_latency_ms: 66,
            max_memory_mb: 512,
            low_battery_threshold: 0.2,
            latency_max_age_ms: 5_000,
        }
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            latency_margin: 1.25,
            debounce_ms: 5_000,
            initial_level: ThrottleLevel::None,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
            settings: AnalyzerSettings::default(),
        }
    }
}

impl SchedulerSettings {
    pub fn dispatch_deadline(&self) -> Duration {
        Duration::from_millis(self.dispatch_deadline_ms)
    }
}

impl MonitorSettings {
    pub fn target_latency(&self) -> Duration {
        Duration::from_millis(self.target_latency_ms)
    }

    pub fn latency_max_age(&self) -> Duration {
        Duration::from_millis(self.latency_max_age_ms)
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb * 1024 * 1024
    }
}

impl ThrottleSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Configuration {
    /// Load from an optional TOML file layered under `SHOTCOACH__*` environment variables.
    ///
    /// The file is `$SHOTCOACH_CONFIG` when set, otherwise `shotcoach.toml` in
    /// the working directory if present.
    pub fn load() -> Result<Self, AppError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self, AppError> {
        let configuration: Configuration = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Parse a TOML document directly; used by embedders that own their config storage.
    pub fn from_toml(document: &str) -> Result<Self, AppError> {
        let configuration: Configuration = config::Config::builder()
            .add_source(config::File::from_str(document, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (level, profile) in self.quality.profiles.iter() {
            if profile.max_analyzers == 0 {
                return Err(invalid(format!(
                    "quality level '{}' must allow at least one analyzer",
                    level
                )));
            }
            if profile.downsample_factor == 0 {
                return Err(invalid(format!(
                    "quality level '{}' needs a downsample factor of at least 1",
                    level
                )));
            }
        }

        if self.scheduler.dispatch_deadline_ms == 0 {
            return Err(invalid("dispatch deadline must be greater than 0"));
        }

        if self.monitor.latency_window == 0 || self.monitor.snapshot_window == 0 {
            return Err(invalid("monitor windows must hold at least one sample"));
        }

        if self.monitor.latency_max_age_ms == 0 {
            return Err(invalid("latency max age must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.monitor.low_battery_threshold) {
            return Err(invalid("low battery threshold must be between 0.0 and 1.0"));
        }

        if self.throttle.latency_margin < 1.0 {
            return Err(invalid("latency margin must be at least 1.0"));
        }

        if self.throttle.tick_interval_ms == 0 {
            return Err(invalid("throttle tick interval must be greater than 0"));
        }

        Ok(())
    }

    /// Settings for one analyzer; types missing from the `analyzers` table run with defaults.
    pub fn analyzer_config(&self, analyzer_type: AnalyzerType) -> AnalyzerConfig {
        self.analyzers
            .get(&analyzer_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Log level for the `fmt` subscriber, `INFO` when unrecognised.
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::InvalidConfiguration(message.into())
}
