use crate::{
    catalog::Difficulty,
    log_util::log_debug,
    question_provider::{BatchOutcome, GrammarQuestion},
};

pub(crate) const DEFAULT_BATCH_SIZE: usize = 5;

/// The user's submitted answer to one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question_id: String,
    pub selected_option: String,
    pub is_correct: bool,
}

/// Where the session currently is. Reveal always carries the submitted choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Loading { generation: u64 },
    /// No question available: nothing fetched yet, an empty batch, or a failed call.
    Empty { failure: Option<String> },
    InProgress { index: usize, tentative: Option<String> },
    Revealed { index: usize, selected: String },
    Finished,
}

/// Parameters of one provider call, tagged with the generation that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub(crate) generation: u64,
    pub(crate) category: String,
    pub(crate) difficulty: Difficulty,
    pub(crate) count: usize,
}

impl FetchRequest {
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count.max(1);
        self
    }
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<GrammarQuestion>,
    answers: Vec<AnswerRecord>,
    phase: SessionPhase,
    category: String,
    difficulty: Difficulty,
    generation: u64,
}

impl QuizSession {
    pub fn new(category: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            questions: Vec::new(),
            answers: Vec::new(),
            phase: SessionPhase::Empty { failure: None },
            category: category.into(),
            difficulty,
            generation: 0,
        }
    }

    /// Drop the current batch and enter `Loading` for a new request.
    /// Any request issued before this one becomes stale.
    pub fn begin_fetch(
        &mut self,
        category: impl Into<String>,
        difficulty: Difficulty,
    ) -> FetchRequest {
        self.category = category.into();
        self.difficulty = difficulty;
        self.generation += 1;
        self.questions.clear();
        self.answers.clear();
        self.phase = SessionPhase::Loading {
            generation: self.generation,
        };
        log_debug(&format!(
            "QuizSession: loading generation {} ({} / {})",
            self.generation,
            self.category,
            self.difficulty.label()
        ));
        FetchRequest {
            generation: self.generation,
            category: self.category.clone(),
            difficulty: self.difficulty,
            count: DEFAULT_BATCH_SIZE,
        }
    }

    /// Fetch again with the currently selected category and difficulty.
    pub fn restart(&mut self) -> FetchRequest {
        let category = self.category.clone();
        self.begin_fetch(category, self.difficulty)
    }

    /// Seed the session from a finished fetch. Returns `false` when the result is stale.
    pub fn complete_fetch(&mut self, generation: u64, outcome: BatchOutcome) -> bool {
        match self.phase {
            SessionPhase::Loading { generation: current } if current == generation => {}
            _ => {
                log_debug(&format!(
                    "QuizSession: discarded stale result for generation {} (current {})",
                    generation, self.generation
                ));
                return false;
            }
        }

        self.answers.clear();
        self.phase = match outcome {
            BatchOutcome::Loaded(questions) if !questions.is_empty() => {
                self.questions = questions;
                SessionPhase::InProgress {
                    index: 0,
                    tentative: None,
                }
            }
            BatchOutcome::Loaded(_) => {
                self.questions.clear();
                SessionPhase::Empty { failure: None }
            }
            BatchOutcome::Failed(note) => {
                self.questions.clear();
                SessionPhase::Empty {
                    failure: Some(note),
                }
            }
        };
        log_debug(&format!(
            "QuizSession: generation {} settled with {} question(s)",
            generation,
            self.questions.len()
        ));
        true
    }

    /// Record `option` as the tentative choice. Ignored unless a question is awaiting submission.
    pub fn select_option(&mut self, option: &str) -> bool {
        match &mut self.phase {
            SessionPhase::InProgress { tentative, .. } => {
                *tentative = Some(option.to_string());
                true
            }
            _ => false,
        }
    }

    /// Select the option at `position` in the current question's list.
    pub fn select_option_at(&mut self, position: usize) -> bool {
        let Some(option) = self
            .awaiting_question()
            .and_then(|question| question.options.get(position))
            .cloned()
        else {
            return false;
        };
        self.select_option(&option)
    }

    /// Move the tentative choice `delta` places through the options, wrapping at either end.
    pub fn select_offset(&mut self, delta: isize) -> bool {
        let Some(question) = self.awaiting_question() else {
            return false;
        };
        let len = question.options.len();
        if len == 0 {
            return false;
        }
        let current = self
            .tentative_choice()
            .and_then(|choice| question.options.iter().position(|option| option == choice));
        let next = match current {
            Some(position) => (position as isize + delta).rem_euclid(len as isize) as usize,
            None if delta >= 0 => 0,
            None => len - 1,
        };
        let option = question.options[next].clone();
        self.select_option(&option)
    }

    /// Score the tentative choice by exact string equality and reveal the result.
    pub fn submit(&mut self) -> Option<AnswerRecord> {
        let SessionPhase::InProgress {
            index,
            tentative: Some(choice),
        } = &self.phase
        else {
            log_debug("QuizSession: submit ignored without a tentative choice");
            return None;
        };
        let index = *index;
        let choice = choice.clone();
        let question = self.questions.get(index)?;

        let record = AnswerRecord {
            question_id: question.id.clone(),
            selected_option: choice.clone(),
            is_correct: choice == question.correct_answer,
        };
        self.answers.push(record.clone());
        self.phase = SessionPhase::Revealed {
            index,
            selected: choice,
        };
        log_debug(&format!(
            "QuizSession: question {} answered (correct: {})",
            index + 1,
            record.is_correct
        ));
        Some(record)
    }

    /// Move past a revealed question, finishing after the last one.
    pub fn advance(&mut self) -> bool {
        let SessionPhase::Revealed { index, .. } = &self.phase else {
            return false;
        };
        let next = *index + 1;
        self.phase = if next < self.questions.len() {
            SessionPhase::InProgress {
                index: next,
                tentative: None,
            }
        } else {
            log_debug(&format!(
                "QuizSession: finished with {} / {}",
                self.score(),
                self.questions.len()
            ));
            SessionPhase::Finished
        };
        true
    }

    /// Number of correct answers recorded so far.
    pub fn score(&self) -> usize {
        self.answers.iter().filter(|answer| answer.is_correct).count()
    }

    /// Takes effect on the next fetch.
    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category = category.into();
    }

    /// Takes effect on the next fetch.
    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn questions(&self) -> &[GrammarQuestion] {
        &self.questions
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::Loading { .. })
    }

    /// The question on screen, if any.
    pub fn current_question(&self) -> Option<&GrammarQuestion> {
        match &self.phase {
            SessionPhase::InProgress { index, .. } | SessionPhase::Revealed { index, .. } => {
                self.questions.get(*index)
            }
            _ => None,
        }
    }

    /// Tentative choice while answering, or the submitted one once revealed.
    pub fn tentative_choice(&self) -> Option<&str> {
        match &self.phase {
            SessionPhase::InProgress { tentative, .. } => tentative.as_deref(),
            SessionPhase::Revealed { selected, .. } => Some(selected.as_str()),
            _ => None,
        }
    }

    /// The record produced by the most recent submit, while it is being revealed.
    pub fn revealed_answer(&self) -> Option<&AnswerRecord> {
        match self.phase {
            SessionPhase::Revealed { .. } => self.answers.last(),
            _ => None,
        }
    }

    /// One-based position and batch length of the question on screen.
    pub fn progress(&self) -> Option<(usize, usize)> {
        match &self.phase {
            SessionPhase::InProgress { index, .. } | SessionPhase::Revealed { index, .. } => {
                Some((*index + 1, self.questions.len()))
            }
            _ => None,
        }
    }

    fn awaiting_question(&self) -> Option<&GrammarQuestion> {
        match &self.phase {
            SessionPhase::InProgress { index, .. } => self.questions.get(*index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question_provider::Explanation;
    use serde_json::from_str;
    use std::{fs, path::Path};

    fn load_batch(filename: &str) -> Vec<GrammarQuestion> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(filename);
        let contents = fs::read_to_string(&path)
            .unwrap_or_else(|err| panic!("failed to read {}: {}", path.display(), err));
        from_str(&contents).unwrap_or_else(|err| {
            panic!(
                "failed to parse {} as grammar questions: {}",
                path.display(),
                err
            )
        })
    }

    fn loaded_session(questions: Vec<GrammarQuestion>) -> QuizSession {
        let mut session = QuizSession::new("非谓语动词 (Non-finite Verbs)", Difficulty::Intermediate);
        let request = session.restart();
        assert!(session.complete_fetch(request.generation, BatchOutcome::Loaded(questions)));
        session
    }

    fn being_question() -> GrammarQuestion {
        GrammarQuestion {
            id: "q1".to_string(),
            sentence: "______ tired, she still finished the report.".to_string(),
            options: vec![
                "Being".to_string(),
                "Been".to_string(),
                "To be".to_string(),
                "Be".to_string(),
            ],
            correct_answer: "Being".to_string(),
            explanation: Explanation {
                rule: "现在分词作原因状语".to_string(),
                example: "Being ill, he stayed at home.".to_string(),
                common_mistakes: "误用过去分词 **Been**".to_string(),
            },
            category: "非谓语动词 (Non-finite Verbs)".to_string(),
            difficulty: Difficulty::Intermediate,
        }
    }

    fn answer_current(session: &mut QuizSession, correctly: bool) {
        let question = session.current_question().cloned().expect("question on screen");
        let choice = if correctly {
            question.correct_answer.clone()
        } else {
            question
                .options
                .iter()
                .find(|option| **option != question.correct_answer)
                .cloned()
                .expect("a wrong option exists")
        };
        assert!(session.select_option(&choice));
        assert!(session.submit().is_some());
    }

    #[test]
    fn each_submitted_question_advances_until_finished() {
        let batch = load_batch("test_fixtures/grammar_batch.json");
        let total = batch.len();
        let mut session = loaded_session(batch);

        for step in 0..total {
            assert_eq!(session.progress(), Some((step + 1, total)));
            answer_current(&mut session, step % 2 == 0);
            assert!(session.advance());
        }

        assert_eq!(session.phase(), &SessionPhase::Finished);
        assert_eq!(session.answers().len(), total);
        assert_eq!(
            session.score(),
            session.answers().iter().filter(|a| a.is_correct).count()
        );
        assert!(!session.advance(), "nothing to advance past once finished");
    }

    #[test]
    fn selection_is_locked_after_submit() {
        let mut session = loaded_session(vec![being_question()]);

        assert!(session.select_option("Been"));
        session.submit().expect("submit succeeds");
        assert!(!session.select_option("Being"));
        assert!(!session.select_offset(1));

        assert_eq!(session.tentative_choice(), Some("Been"));
        assert_eq!(session.answers().len(), 1);
    }

    #[test]
    fn submit_without_choice_is_a_no_op() {
        let mut session = loaded_session(vec![being_question()]);

        assert_eq!(session.submit(), None);
        assert_eq!(
            session.phase(),
            &SessionPhase::InProgress {
                index: 0,
                tentative: None
            }
        );
        assert!(session.answers().is_empty());
        assert!(!session.advance(), "advance requires a reveal first");
    }

    #[test]
    fn correctness_uses_exact_string_equality() {
        let mut session = loaded_session(vec![being_question(), being_question()]);

        session.select_option("Been");
        let wrong = session.submit().unwrap();
        assert!(!wrong.is_correct);
        assert_eq!(wrong.selected_option, "Been");
        assert_eq!(wrong.question_id, "q1");
        session.advance();

        session.select_option("being");
        session.select_option("Being");
        let right = session.submit().unwrap();
        assert!(right.is_correct);
        assert_eq!(session.revealed_answer(), Some(&right));
    }

    #[test]
    fn correct_answer_missing_from_options_never_scores() {
        let mut question = being_question();
        question.correct_answer = "Being ".to_string();
        let mut session = loaded_session(vec![question]);

        for position in 0..4 {
            assert!(session.select_option_at(position));
        }
        assert!(!session.select_option_at(4));
        let record = session.submit().unwrap();
        assert!(!record.is_correct);
        session.advance();
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn restart_twice_always_resets_index_and_history() {
        let batch = load_batch("test_fixtures/grammar_batch.json");
        let mut session = loaded_session(batch.clone());
        answer_current(&mut session, true);
        session.advance();
        answer_current(&mut session, true);

        for _ in 0..2 {
            let request = session.restart();
            assert!(session.is_loading());
            assert!(session.answers().is_empty());
            assert!(session.complete_fetch(request.generation, BatchOutcome::Loaded(batch.clone())));
            assert_eq!(session.progress(), Some((1, batch.len())));
            assert!(session.answers().is_empty());
            assert_eq!(session.tentative_choice(), None);
        }
    }

    #[test]
    fn empty_batch_settles_into_idle_state() {
        let mut session = QuizSession::new("连词辨析 (Conjunctions)", Difficulty::Beginner);
        let request = session.restart();

        assert!(session.complete_fetch(request.generation, BatchOutcome::Loaded(Vec::new())));

        assert_eq!(session.phase(), &SessionPhase::Empty { failure: None });
        assert_eq!(session.score(), 0);
        assert!(session.current_question().is_none());
        assert!(!session.select_option("anything"));
        assert_eq!(session.submit(), None);
        assert!(!session.advance());
    }

    #[test]
    fn failed_fetch_keeps_the_note_and_no_questions() {
        let mut session = QuizSession::new("连词辨析 (Conjunctions)", Difficulty::Beginner);
        let request = session.restart();

        session.complete_fetch(
            request.generation,
            BatchOutcome::Failed("GEMINI_API_KEY is missing".to_string()),
        );

        assert_eq!(
            session.phase(),
            &SessionPhase::Empty {
                failure: Some("GEMINI_API_KEY is missing".to_string())
            }
        );
        assert_eq!(session.score(), 0);
        assert!(session.progress().is_none());
    }

    #[test]
    fn stale_results_are_discarded() {
        let batch = load_batch("test_fixtures/grammar_batch.json");
        let mut session = QuizSession::new("时态语态 (Tenses & Voices)", Difficulty::Advanced);

        let first = session.restart();
        let second = session.restart();
        assert!(second.generation > first.generation);

        assert!(!session.complete_fetch(first.generation, BatchOutcome::Loaded(batch.clone())));
        assert!(session.is_loading());

        assert!(session.complete_fetch(second.generation, BatchOutcome::Loaded(vec![being_question()])));
        assert_eq!(session.questions().len(), 1);

        assert!(!session.complete_fetch(second.generation, BatchOutcome::Loaded(batch)));
        assert_eq!(session.questions().len(), 1);
    }

    #[test]
    fn loading_rejects_interaction() {
        let mut session = loaded_session(vec![being_question()]);
        session.restart();

        assert!(!session.select_option("Being"));
        assert!(!session.select_offset(1));
        assert_eq!(session.submit(), None);
        assert!(session.current_question().is_none());
    }

    #[test]
    fn selection_offset_wraps_through_options() {
        let mut session = loaded_session(vec![being_question()]);

        assert!(session.select_offset(-1));
        assert_eq!(session.tentative_choice(), Some("Be"));
        assert!(session.select_offset(1));
        assert_eq!(session.tentative_choice(), Some("Being"));
        assert!(session.select_offset(1));
        assert_eq!(session.tentative_choice(), Some("Been"));
    }

    #[test]
    fn selection_changes_apply_to_the_next_fetch() {
        let mut session = loaded_session(vec![being_question()]);
        session.set_category("名词性从句 (Noun Clause)");
        session.set_difficulty(Difficulty::Advanced);

        assert_eq!(session.questions().len(), 1, "current batch is untouched");

        let request = session.restart();
        assert_eq!(request.category, "名词性从句 (Noun Clause)");
        assert_eq!(request.difficulty, Difficulty::Advanced);
        assert_eq!(request.count, DEFAULT_BATCH_SIZE);
        assert_eq!(request.with_count(0).count, 1);
    }

    #[test]
    fn five_question_run_scores_three_then_restarts_fresh() {
        let batch = load_batch("test_fixtures/grammar_batch.json");
        assert_eq!(batch.len(), 5, "fixture should hold a full batch");
        let mut session = loaded_session(batch.clone());

        for correctly in [true, false, true, false, true] {
            answer_current(&mut session, correctly);
            session.advance();
        }

        assert_eq!(session.phase(), &SessionPhase::Finished);
        assert_eq!(session.score(), 3);
        assert_eq!(session.answers().len(), 5);

        let request = session.restart();
        assert!(session.complete_fetch(request.generation, BatchOutcome::Loaded(batch)));
        assert_eq!(session.progress(), Some((1, 5)));
        assert!(session.answers().is_empty());
        assert_eq!(session.score(), 0);
    }
}
