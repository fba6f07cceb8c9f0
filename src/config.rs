use crate::{
    catalog::{self, Difficulty, GRAMMAR_CATEGORIES},
    quiz_session::DEFAULT_BATCH_SIZE,
};
use color_eyre::eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Globally accessible application configuration values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_batch_size_value")]
    pub batch_size: usize,
    #[serde(default = "default_request_timeout_value")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub default_category: usize,
    #[serde(default)]
    pub default_difficulty: Difficulty,
    #[serde(default)]
    pub shuffle_options: bool,
    #[serde(default = "default_gemini_model_kind")]
    pub gemini_model: GeminiModelKind,
    #[serde(default)]
    pub gemini_api_key: String,
}

impl AppConfig {
    fn normalize(&mut self) {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        self.batch_size = self.batch_size.min(MAX_BATCH_SIZE);
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        if self.default_category >= GRAMMAR_CATEGORIES.len() {
            self.default_category = 0;
        }
    }

    pub fn default_category_label(&self) -> &'static str {
        catalog::category_at(self.default_category)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            default_category: 0,
            default_difficulty: Difficulty::default(),
            shuffle_options: false,
            gemini_model: default_gemini_model_kind(),
            gemini_api_key: String::new(),
        }
    }
}

const MAX_BATCH_SIZE: usize = 20;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const fn default_gemini_model_kind() -> GeminiModelKind {
    GeminiModelKind::Gemini3FlashPreview
}

const CONFIG_FILE_PATH: &str = "config/app_config.toml";

static APP_CONFIG: OnceLock<RwLock<AppConfig>> = OnceLock::new();

fn config_lock() -> &'static RwLock<AppConfig> {
    APP_CONFIG.get_or_init(|| RwLock::new(AppConfig::default()))
}

fn read_config() -> RwLockReadGuard<'static, AppConfig> {
    config_lock().read().unwrap_or_else(PoisonError::into_inner)
}

fn write_config() -> RwLockWriteGuard<'static, AppConfig> {
    config_lock().write().unwrap_or_else(PoisonError::into_inner)
}

/// Attempt to load configuration from disk. If loading fails, the in-memory config will be reset to defaults
/// and the error will be returned for the caller to surface if desired.
pub fn initialize() -> Result<()> {
    match load_config_from_path(&config_file_path()) {
        Ok(config) => {
            *write_config() = config;
            Ok(())
        }
        Err(err) => {
            *write_config() = AppConfig::default();
            Err(err)
        }
    }
}

/// Retrieve a clone of the current configuration.
pub fn current() -> AppConfig {
    read_config().clone()
}

/// Apply the provided mutation to the in-memory configuration and persist the result to disk.
pub fn update<F>(mutator: F) -> Result<AppConfig>
where
    F: FnOnce(&mut AppConfig),
{
    let mut config = write_config();
    mutator(&mut config);
    config.normalize();
    save_config_to_path(&config, &config_file_path())?;
    Ok(config.clone())
}

/// Relative path to the configuration file used for persistence.
pub fn config_file_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE_PATH)
}

pub(crate) fn load_config_from_path(path: &Path) -> Result<AppConfig> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let mut config: AppConfig = toml::from_str(&contents)
                .wrap_err_with(|| format!("failed to parse configuration at {}", path.display()))?;
            config.normalize();
            Ok(config)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(err) => Err(eyre!(
            "failed to read configuration at {}: {}",
            path.display(),
            err
        )),
    }
}

pub(crate) fn save_config_to_path(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).wrap_err_with(|| {
            format!(
                "failed to create configuration directory {}",
                parent.display()
            )
        })?;
    }
    let serialized =
        toml::to_string_pretty(config).wrap_err("failed to serialize configuration to TOML")?;
    fs::write(path, serialized)
        .wrap_err_with(|| format!("failed to write configuration to {}", path.display()))
}

const fn default_batch_size_value() -> usize {
    DEFAULT_BATCH_SIZE
}

const fn default_request_timeout_value() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigField {
    BatchSize,
    RequestTimeout,
    DefaultCategory,
    DefaultDifficulty,
    ShuffleOptions,
    GeminiModel,
    GeminiKey,
}

#[derive(Debug, Clone)]
pub struct ConfigForm {
    pub(crate) batch_size: usize,
    pub(crate) request_timeout_secs: u64,
    pub(crate) default_category: usize,
    pub(crate) default_difficulty: Difficulty,
    pub(crate) shuffle_options: bool,
    pub(crate) gemini_model: GeminiModelKind,
    pub(crate) gemini_api_key: String,
    editing_gemini_key: bool,
    gemini_key_buffer: String,
    field: ConfigField,
    pub(crate) dirty: bool,
    pub(crate) status: Option<String>,
}

impl ConfigForm {
    pub(crate) fn from_config(config: AppConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            request_timeout_secs: config.request_timeout_secs,
            default_category: config.default_category,
            default_difficulty: config.default_difficulty,
            shuffle_options: config.shuffle_options,
            gemini_model: config.gemini_model,
            gemini_api_key: config.gemini_api_key,
            editing_gemini_key: false,
            gemini_key_buffer: String::new(),
            field: ConfigField::BatchSize,
            dirty: false,
            status: None,
        }
    }

    pub(crate) fn selected_index(&self) -> usize {
        self.field.index()
    }

    pub(crate) fn select_next(&mut self) {
        self.field = self.field.next();
    }

    pub(crate) fn select_previous(&mut self) {
        self.field = self.field.previous();
    }

    pub(crate) fn adjust_current(&mut self, delta: isize) {
        if delta == 0 {
            return;
        }

        let changed = match self.field {
            ConfigField::BatchSize => {
                let updated = (self.batch_size as isize + delta).clamp(1, MAX_BATCH_SIZE as isize)
                    as usize;
                replace_if_changed(&mut self.batch_size, updated)
            }
            ConfigField::RequestTimeout => {
                let updated = (self.request_timeout_secs as i64 + delta as i64 * 5).max(5) as u64;
                replace_if_changed(&mut self.request_timeout_secs, updated)
            }
            ConfigField::DefaultCategory => {
                let len = GRAMMAR_CATEGORIES.len() as isize;
                let updated = (self.default_category as isize + delta).rem_euclid(len) as usize;
                replace_if_changed(&mut self.default_category, updated)
            }
            ConfigField::DefaultDifficulty => {
                let updated = if delta > 0 {
                    self.default_difficulty.next()
                } else {
                    self.default_difficulty.previous()
                };
                replace_if_changed(&mut self.default_difficulty, updated)
            }
            ConfigField::ShuffleOptions => {
                let updated = !self.shuffle_options;
                replace_if_changed(&mut self.shuffle_options, updated)
            }
            ConfigField::GeminiModel => {
                let updated = if delta > 0 {
                    self.gemini_model.next()
                } else {
                    self.gemini_model.previous()
                };
                replace_if_changed(&mut self.gemini_model, updated)
            }
            ConfigField::GeminiKey => false,
        };

        if changed {
            self.dirty = true;
            self.status = None;
        }
    }

    /// Copy the form values onto `config`.
    pub(crate) fn apply_to(&self, config: &mut AppConfig) {
        config.batch_size = self.batch_size;
        config.request_timeout_secs = self.request_timeout_secs;
        config.default_category = self.default_category;
        config.default_difficulty = self.default_difficulty;
        config.shuffle_options = self.shuffle_options;
        config.gemini_model = self.gemini_model;
        config.gemini_api_key = self.gemini_api_key.clone();
    }

    pub(crate) fn apply_saved(&mut self, config: AppConfig) {
        *self = Self {
            field: self.field,
            ..Self::from_config(config)
        };
    }

    pub(crate) fn set_status<S: Into<String>>(&mut self, status: S) {
        self.status = Some(status.into());
    }

    pub(crate) fn is_gemini_key_selected(&self) -> bool {
        matches!(self.field, ConfigField::GeminiKey)
    }

    pub(crate) fn is_editing_gemini_key(&self) -> bool {
        self.editing_gemini_key
    }

    pub(crate) fn start_editing_gemini_key(&mut self) {
        self.editing_gemini_key = true;
        self.gemini_key_buffer = self.gemini_api_key.clone();
        self.status = Some("Editing Gemini API key (Enter to apply, Esc to cancel)".to_string());
    }

    pub(crate) fn cancel_gemini_key_edit(&mut self) {
        self.editing_gemini_key = false;
        self.gemini_key_buffer.clear();
        self.status = Some("Cancelled Gemini API key edit.".to_string());
    }

    pub(crate) fn apply_gemini_key_edit(&mut self) {
        let new_value = self.gemini_key_buffer.trim().to_string();
        if new_value != self.gemini_api_key {
            self.gemini_api_key = new_value;
            self.dirty = true;
            self.status = Some("Updated Gemini API key. Press s to save.".to_string());
        } else {
            self.status = Some("Gemini API key unchanged.".to_string());
        }
        self.editing_gemini_key = false;
        self.gemini_key_buffer.clear();
    }

    pub(crate) fn backspace_gemini_key(&mut self) {
        self.gemini_key_buffer.pop();
    }

    pub(crate) fn push_gemini_key_char(&mut self, ch: char) {
        self.gemini_key_buffer.push(ch);
    }

    pub(crate) fn masked_gemini_key(&self) -> String {
        mask_secret(&self.gemini_api_key)
    }

    pub(crate) fn masked_gemini_key_buffer(&self) -> String {
        mask_secret(&self.gemini_key_buffer)
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, updated: T) -> bool {
    if *slot == updated {
        false
    } else {
        *slot = updated;
        true
    }
}

fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return "<not set>".to_string();
    }
    let len = value.chars().count();
    if len <= 4 {
        "****".to_string()
    } else {
        let suffix: String = value.chars().skip(len - 4).collect();
        format!("{}{}", "*".repeat(len - 4), suffix)
    }
}

impl ConfigField {
    fn index(self) -> usize {
        match self {
            Self::BatchSize => 0,
            Self::RequestTimeout => 1,
            Self::DefaultCategory => 2,
            Self::DefaultDifficulty => 3,
            Self::ShuffleOptions => 4,
            Self::GeminiModel => 5,
            Self::GeminiKey => 6,
        }
    }

    fn next(self) -> Self {
        match self {
            Self::BatchSize => Self::RequestTimeout,
            Self::RequestTimeout => Self::DefaultCategory,
            Self::DefaultCategory => Self::DefaultDifficulty,
            Self::DefaultDifficulty => Self::ShuffleOptions,
            Self::ShuffleOptions => Self::GeminiModel,
            Self::GeminiModel => Self::GeminiKey,
            Self::GeminiKey => Self::BatchSize,
        }
    }

    fn previous(self) -> Self {
        match self {
            Self::BatchSize => Self::GeminiKey,
            Self::RequestTimeout => Self::BatchSize,
            Self::DefaultCategory => Self::RequestTimeout,
            Self::DefaultDifficulty => Self::DefaultCategory,
            Self::ShuffleOptions => Self::DefaultDifficulty,
            Self::GeminiModel => Self::ShuffleOptions,
            Self::GeminiKey => Self::GeminiModel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeminiModelKind {
    Gemini3FlashPreview,
    Gemini25Flash,
    Gemini25Pro,
}

impl GeminiModelKind {
    pub fn as_model_name(self) -> &'static str {
        match self {
            Self::Gemini3FlashPreview => "gemini-3-flash-preview",
            Self::Gemini25Flash => "gemini-2.5-flash",
            Self::Gemini25Pro => "gemini-2.5-pro",
        }
    }

    pub fn label(self) -> &'static str {
        self.as_model_name()
    }

    pub fn next(self) -> Self {
        match self {
            Self::Gemini3FlashPreview => Self::Gemini25Flash,
            Self::Gemini25Flash => Self::Gemini25Pro,
            Self::Gemini25Pro => Self::Gemini3FlashPreview,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            Self::Gemini3FlashPreview => Self::Gemini25Pro,
            Self::Gemini25Flash => Self::Gemini3FlashPreview,
            Self::Gemini25Pro => Self::Gemini25Flash,
        }
    }
}
