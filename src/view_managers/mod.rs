pub mod config_manager;
pub mod quiz_manager;

pub(crate) use config_manager::ConfigManager;
pub(crate) use quiz_manager::QuizManager;
