use super::config_manager::ConfigManager;
use crate::{
    App, catalog, log_util::log_debug, question_provider, quiz_session::SessionPhase,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub(crate) struct QuizManager<'a> {
    app: &'a mut App,
}

impl<'a> QuizManager<'a> {
    pub(crate) fn new(app: &'a mut App) -> Self {
        Self { app }
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) {
        if !matches!(key.modifiers, KeyModifiers::NONE | KeyModifiers::SHIFT) {
            return;
        }
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Char(digit @ '1'..='9') => {
                let position = digit as usize - '1' as usize;
                self.pick_option(position);
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.confirm(),
            KeyCode::Char('r') | KeyCode::Char('R') => self.refresh(),
            KeyCode::Char('c') => self.cycle_category(true),
            KeyCode::Char('C') => self.cycle_category(false),
            KeyCode::Char('d') => self.cycle_difficulty(true),
            KeyCode::Char('D') => self.cycle_difficulty(false),
            KeyCode::Char('o') | KeyCode::Char('O') => ConfigManager::new(self.app).show_config(),
            _ => {}
        }
    }

    fn move_selection(&mut self, delta: isize) {
        if self.app.session.select_offset(delta) {
            self.app.status = None;
        }
    }

    fn pick_option(&mut self, position: usize) {
        if self.app.session.select_option_at(position) {
            self.app.status = None;
        }
    }

    /// Submit, advance, or start over depending on where the session is.
    pub(crate) fn confirm(&mut self) {
        match self.app.session.phase() {
            SessionPhase::InProgress { tentative: None, .. } => {
                self.app.status = Some("Pick an option first (j/k or 1-4).".to_string());
            }
            SessionPhase::InProgress { .. } => self.submit(),
            SessionPhase::Revealed { .. } => self.advance(),
            SessionPhase::Finished | SessionPhase::Empty { .. } => self.refresh(),
            SessionPhase::Loading { .. } => {}
        }
    }

    fn submit(&mut self) {
        let Some(record) = self.app.session.submit() else {
            return;
        };
        self.app.status = Some(if record.is_correct {
            "Correct! Press Enter for the next question.".to_string()
        } else {
            let correct = self
                .app
                .session
                .current_question()
                .map(|question| question.correct_answer.clone())
                .unwrap_or_default();
            format!("Not quite. The answer is \"{}\".", correct)
        });
    }

    fn advance(&mut self) {
        if !self.app.session.advance() {
            return;
        }
        if matches!(self.app.session.phase(), SessionPhase::Finished) {
            self.app.encouragement = Some(catalog::random_encouragement());
            self.app.status = Some(format!(
                "Dive complete: {} / {}",
                self.app.session.score(),
                self.app.session.questions().len()
            ));
        } else {
            self.app.status = None;
        }
    }

    pub(crate) fn refresh(&mut self) {
        self.app.encouragement = None;
        log_debug("App: refresh requested");
        question_provider::trigger_batch_fetch(self.app);
    }

    fn cycle_category(&mut self, forward: bool) {
        let next = catalog::cycle_category(self.app.session.category(), forward);
        self.app.session.set_category(next);
        self.app.status = Some(format!("Category: {}. Press r to refresh.", next));
    }

    fn cycle_difficulty(&mut self, forward: bool) {
        let current = self.app.session.difficulty();
        let next = if forward {
            current.next()
        } else {
            current.previous()
        };
        self.app.session.set_difficulty(next);
        self.app.status = Some(format!("Difficulty: {}. Press r to refresh.", next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{Difficulty, GRAMMAR_CATEGORIES},
        question_provider::{BatchOutcome, GrammarQuestion},
        test_support::idle_app,
    };
    use crossterm::event::KeyEvent;

    fn press(app: &mut App, code: KeyCode) {
        QuizManager::new(app).handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn question(id: &str, correct: &str) -> GrammarQuestion {
        GrammarQuestion {
            id: id.to_string(),
            sentence: "They ______ dinner when the phone rang.".to_string(),
            options: vec![
                "were having".to_string(),
                "had".to_string(),
                "have".to_string(),
                "are having".to_string(),
            ],
            correct_answer: correct.to_string(),
            ..GrammarQuestion::default()
        }
    }

    fn app_with_questions(questions: Vec<GrammarQuestion>) -> App {
        let mut app = idle_app();
        let request = app.session.restart();
        app.session
            .complete_fetch(request.generation, BatchOutcome::Loaded(questions));
        app
    }

    #[test]
    fn keys_drive_select_submit_and_advance() {
        let mut app = app_with_questions(vec![
            question("q1", "were having"),
            question("q2", "were having"),
        ]);

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.session.answers().len(), 0);
        assert!(app.status.as_deref().unwrap().starts_with("Pick an option"));

        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.session.tentative_choice(), Some("were having"));
        press(&mut app, KeyCode::Enter);
        assert!(app.session.answers()[0].is_correct);

        press(&mut app, KeyCode::Char('3'));
        assert_eq!(app.session.tentative_choice(), Some("were having"));

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.session.progress(), Some((2, 2)));

        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char(' '));
        assert!(!app.session.answers()[1].is_correct);
        assert_eq!(
            app.status.as_deref(),
            Some("Not quite. The answer is \"were having\".")
        );

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.session.phase(), &SessionPhase::Finished);
        assert_eq!(app.session.score(), 1);
        assert!(app.encouragement.is_some());
    }

    #[test]
    fn category_and_difficulty_keys_update_next_fetch_selection() {
        let mut app = idle_app();

        press(&mut app, KeyCode::Char('c'));
        assert_eq!(app.session.category(), GRAMMAR_CATEGORIES[1]);
        press(&mut app, KeyCode::Char('C'));
        press(&mut app, KeyCode::Char('C'));
        assert_eq!(
            app.session.category(),
            GRAMMAR_CATEGORIES[GRAMMAR_CATEGORIES.len() - 1]
        );

        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.session.difficulty(), Difficulty::Advanced);
        press(&mut app, KeyCode::Char('D'));
        press(&mut app, KeyCode::Char('D'));
        assert_eq!(app.session.difficulty(), Difficulty::Beginner);
    }

    #[test]
    fn control_modified_keys_are_ignored() {
        let mut app = app_with_questions(vec![question("q1", "had")]);

        QuizManager::new(&mut app)
            .handle_key(KeyEvent::new(KeyCode::Char('j'), KeyModifiers::ALT));

        assert_eq!(app.session.tentative_choice(), None);
    }
}
