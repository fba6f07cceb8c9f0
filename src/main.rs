mod catalog;
mod config;
mod log_util;
mod markdown_text;
mod question_provider;
mod quiz_session;
mod ui_renderer;
mod view_managers;

use color_eyre::Result;
use config::ConfigForm;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use dotenvy::dotenv;
use log_util::log_debug;
use question_provider::{BatchOutcome, FetchMessage};
use quiz_session::{QuizSession, SessionPhase};
use ratatui::{DefaultTerminal, Frame};
use std::{
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};
use ui_renderer::UiRenderer;
use view_managers::{ConfigManager, QuizManager};

pub(crate) const LOADING_FRAMES: [&str; 4] = ["-", "\\", "|", "/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AppView {
    Quiz,
    Config,
}

fn main() -> color_eyre::Result<()> {
    dotenv().ok();
    color_eyre::install()?;
    let terminal = ratatui::init();
    let result = App::new().run(terminal);
    ratatui::restore();
    result
}

/// The main application which holds the state and logic of the application.
#[derive(Debug)]
pub struct App {
    /// Is the application running?
    pub(crate) running: bool,
    /// Current view being displayed.
    pub(crate) view: AppView,
    /// Quiz progression for the current batch.
    pub(crate) session: QuizSession,
    /// Errors worth showing in the status panel.
    pub(crate) error: Option<String>,
    /// Latest status line.
    pub(crate) status: Option<String>,
    /// Spinner frame index for the loading indicator.
    pub(crate) loading_frame: usize,
    /// Receives the outcome of the background fetch, if one is running.
    pub(crate) fetch_receiver: Option<Receiver<FetchMessage>>,
    /// Shown on the summary screen once the batch is finished.
    pub(crate) encouragement: Option<&'static str>,
    /// Holds the editable configuration state when rendering the config view.
    pub(crate) config_form: ConfigForm,
}

impl App {
    /// Construct a new instance of [`App`].
    pub fn new() -> Self {
        let mut error: Option<String> = None;

        if let Err(err) = config::initialize() {
            Self::push_error(&mut error, format!("Configuration load failed: {}", err));
        }
        let current = config::current();

        Self {
            running: false,
            view: AppView::Quiz,
            session: QuizSession::new(
                current.default_category_label(),
                current.default_difficulty,
            ),
            error,
            status: None,
            loading_frame: 0,
            fetch_receiver: None,
            encouragement: None,
            config_form: ConfigForm::from_config(current),
        }
    }

    /// Run the application's main loop. The first batch is requested immediately.
    pub fn run(mut self, mut terminal: DefaultTerminal) -> Result<()> {
        self.running = true;
        question_provider::trigger_batch_fetch(&mut self);
        let tick_rate = Duration::from_millis(120);
        while self.running {
            self.poll_fetch_messages();
            terminal.draw(|frame| self.render(frame))?;
            self.handle_crossterm_events(tick_rate)?;
        }
        Ok(())
    }

    fn render(&mut self, frame: &mut Frame) {
        UiRenderer::new(self).render(frame);
    }

    /// Reads the crossterm events and updates the state of [`App`].
    fn handle_crossterm_events(&mut self, tick_rate: Duration) -> Result<()> {
        if event::poll(tick_rate)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => self.on_key_event(key),
                _ => {}
            }
            self.poll_fetch_messages();
        } else {
            self.on_tick();
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        if self.session.is_loading() {
            self.loading_frame = (self.loading_frame + 1) % LOADING_FRAMES.len();
            self.update_loading_status();
        }
        self.poll_fetch_messages();
    }

    pub(crate) fn poll_fetch_messages(&mut self) {
        let Some(receiver) = self.fetch_receiver.as_ref() else {
            return;
        };
        match receiver.try_recv() {
            Ok(message) => {
                if self.handle_fetch_message(message) {
                    self.fetch_receiver = None;
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.fetch_receiver = None;
                if let SessionPhase::Loading { generation } = *self.session.phase() {
                    self.handle_fetch_message(FetchMessage {
                        generation,
                        outcome: BatchOutcome::Failed(
                            "Background fetch worker disconnected".to_string(),
                        ),
                    });
                }
            }
        }
    }

    /// Returns `false` when the message belonged to a superseded fetch.
    fn handle_fetch_message(&mut self, message: FetchMessage) -> bool {
        if !self.session.complete_fetch(message.generation, message.outcome) {
            return false;
        }
        self.encouragement = None;
        self.status = Some(match self.session.phase() {
            SessionPhase::Empty {
                failure: Some(note),
            } => {
                log_debug(&format!("App: fetch produced no questions: {}", note));
                "No questions this time. Press r to try again.".to_string()
            }
            SessionPhase::Empty { failure: None } => {
                "The provider returned no questions. Press r to try again.".to_string()
            }
            _ => format!("Loaded {} question(s).", self.session.questions().len()),
        });
        true
    }

    pub(crate) fn update_loading_status(&mut self) {
        if self.session.is_loading() {
            let frame = LOADING_FRAMES[self.loading_frame % LOADING_FRAMES.len()];
            self.status = Some(format!("{} Searching the deep sea for questions…", frame));
        }
    }

    /// Handles the key events and updates the state of [`App`].
    fn on_key_event(&mut self, key: KeyEvent) {
        if self.view == AppView::Config && self.config_form.is_editing_gemini_key() {
            ConfigManager::new(self).handle_key(key);
            return;
        }
        match (key.modifiers, key.code) {
            (_, KeyCode::Esc | KeyCode::Char('q'))
            | (KeyModifiers::CONTROL, KeyCode::Char('c') | KeyCode::Char('C')) => self.quit(),
            _ => match self.view {
                AppView::Quiz => QuizManager::new(self).handle_key(key),
                AppView::Config => ConfigManager::new(self).handle_key(key),
            },
        }
    }

    pub(crate) fn return_to_quiz(&mut self) {
        if matches!(self.view, AppView::Config) {
            self.config_form = ConfigForm::from_config(config::current());
        }
        self.view = AppView::Quiz;
    }

    /// Set running to false to quit the application.
    fn quit(&mut self) {
        self.running = false;
    }

    /// Append a message to an optional error slot.
    pub(crate) fn push_error(slot: &mut Option<String>, message: String) {
        if let Some(existing) = slot {
            existing.push_str(" | ");
            existing.push_str(&message);
        } else {
            *slot = Some(message);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::idle_app;
    use super::*;
    use crate::question_provider::GrammarQuestion;
    use std::sync::mpsc;

    #[test]
    fn fetch_message_seeds_session_and_status() {
        let mut app = idle_app();
        let request = app.session.restart();
        let (sender, receiver) = mpsc::channel();
        app.fetch_receiver = Some(receiver);

        sender
            .send(FetchMessage {
                generation: request.generation,
                outcome: BatchOutcome::Loaded(vec![GrammarQuestion {
                    id: "q1".to_string(),
                    sentence: "She ______ here.".to_string(),
                    options: vec!["lives".to_string(), "live".to_string()],
                    correct_answer: "lives".to_string(),
                    ..GrammarQuestion::default()
                }]),
            })
            .unwrap();
        app.poll_fetch_messages();

        assert!(app.fetch_receiver.is_none());
        assert_eq!(app.session.progress(), Some((1, 1)));
        assert_eq!(app.status.as_deref(), Some("Loaded 1 question(s)."));
    }

    #[test]
    fn disconnected_worker_does_not_leave_a_spinner() {
        let mut app = idle_app();
        app.session.restart();
        let (sender, receiver) = mpsc::channel::<FetchMessage>();
        app.fetch_receiver = Some(receiver);
        drop(sender);

        app.poll_fetch_messages();

        assert!(!app.session.is_loading());
        assert!(matches!(
            app.session.phase(),
            SessionPhase::Empty { failure: Some(_) }
        ));
    }

    #[test]
    fn stale_fetch_message_is_ignored() {
        let mut app = idle_app();
        let stale = app.session.restart();
        app.session.restart();
        let (sender, receiver) = mpsc::channel();
        app.fetch_receiver = Some(receiver);

        sender
            .send(FetchMessage {
                generation: stale.generation,
                outcome: BatchOutcome::Loaded(Vec::new()),
            })
            .unwrap();
        app.poll_fetch_messages();

        assert!(app.session.is_loading());
        assert_eq!(app.status, None);
    }

    #[test]
    fn push_error_joins_messages() {
        let mut slot = None;
        App::push_error(&mut slot, "first".to_string());
        App::push_error(&mut slot, "second".to_string());
        assert_eq!(slot.as_deref(), Some("first | second"));
    }
}
