use crate::{
    App, AppView,
    config::{self, AppConfig, ConfigForm},
    log_util::log_debug,
    quiz_session::QuizSession,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub(crate) struct ConfigManager<'a> {
    app: &'a mut App,
}

impl<'a> ConfigManager<'a> {
    pub(crate) fn new(app: &'a mut App) -> Self {
        Self { app }
    }

    pub(crate) fn show_config(&mut self) {
        self.app.config_form = ConfigForm::from_config(config::current());
        self.app
            .config_form
            .set_status("Use ←/→ to adjust values, s to save changes.");
        self.app.view = AppView::Config;
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) {
        if self.app.config_form.is_editing_gemini_key() {
            self.handle_key_edit(key);
            return;
        }

        match (key.modifiers, key.code) {
            (KeyModifiers::NONE, KeyCode::Down | KeyCode::Char('j')) => {
                self.app.config_form.select_next();
            }
            (KeyModifiers::NONE, KeyCode::Up | KeyCode::Char('k')) => {
                self.app.config_form.select_previous();
            }
            (KeyModifiers::NONE, KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('-')) => {
                self.app.config_form.adjust_current(-1);
            }
            (
                KeyModifiers::NONE,
                KeyCode::Right | KeyCode::Char('l') | KeyCode::Char('+') | KeyCode::Char('='),
            ) => {
                self.app.config_form.adjust_current(1);
            }
            (KeyModifiers::NONE, KeyCode::Enter) if self.app.config_form.is_gemini_key_selected() => {
                self.app.config_form.start_editing_gemini_key();
            }
            (KeyModifiers::NONE, KeyCode::Char('s')) | (KeyModifiers::NONE, KeyCode::Enter) => {
                self.save_config_changes();
            }
            (KeyModifiers::NONE, KeyCode::Char('r')) => self.reset_config_form(),
            (KeyModifiers::NONE, KeyCode::Char('m')) => self.app.return_to_quiz(),
            _ => {}
        }
    }

    fn handle_key_edit(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => self.app.config_form.apply_gemini_key_edit(),
            KeyCode::Esc => self.app.config_form.cancel_gemini_key_edit(),
            KeyCode::Backspace => self.app.config_form.backspace_gemini_key(),
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.app.config_form.push_gemini_key_char(ch)
            }
            _ => {}
        }
    }

    fn save_config_changes(&mut self) {
        if !self.app.config_form.dirty {
            self.app
                .config_form
                .set_status("No pending changes to save.");
            return;
        }

        let previous = config::current();
        let form = self.app.config_form.clone();
        match config::update(|config| form.apply_to(config)) {
            Ok(updated) => {
                Self::sync_session_defaults(&mut self.app.session, &previous, &updated);
                self.app.config_form.apply_saved(updated);
                self.app.config_form.set_status(format!(
                    "Saved configuration to {}. New defaults apply from the next refresh.",
                    config::config_file_path().display()
                ));
                log_debug("App: configuration saved");
            }
            Err(err) => {
                App::push_error(
                    &mut self.app.error,
                    format!("Failed to save configuration: {}", err),
                );
                self.app
                    .config_form
                    .set_status("Failed to save configuration. Check error panel.");
                log_debug(&format!("App: failed to save configuration: {}", err));
            }
        }
    }

    /// Carry changed default category or difficulty over to the session's next fetch.
    pub(crate) fn sync_session_defaults(
        session: &mut QuizSession,
        previous: &AppConfig,
        updated: &AppConfig,
    ) -> bool {
        let mut changed = false;
        if previous.default_category != updated.default_category {
            session.set_category(updated.default_category_label());
            changed = true;
        }
        if previous.default_difficulty != updated.default_difficulty {
            session.set_difficulty(updated.default_difficulty);
            changed = true;
        }
        changed
    }

    fn reset_config_form(&mut self) {
        let current = config::current();
        self.app.config_form = ConfigForm::from_config(current);
        self.app
            .config_form
            .set_status("Reverted to saved configuration values.");
    }
}
