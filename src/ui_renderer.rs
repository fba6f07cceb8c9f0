use crate::{
    App, AppView, LOADING_FRAMES, catalog, config,
    markdown_text::render_markdown,
    question_provider::{BLANK_MARKER, GrammarQuestion},
    quiz_session::SessionPhase,
};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, List, ListItem, ListState, Paragraph, Wrap},
};

pub(crate) struct UiRenderer<'a> {
    app: &'a mut App,
}

impl<'a> UiRenderer<'a> {
    pub(crate) fn new(app: &'a mut App) -> Self {
        Self { app }
    }

    pub(crate) fn render(&mut self, frame: &mut Frame) {
        match self.app.view {
            AppView::Quiz => self.render_quiz(frame),
            AppView::Config => self.render_config(frame),
        }
    }

    fn render_quiz(&mut self, frame: &mut Frame) {
        let app = &*self.app;
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(5),
            ])
            .split(frame.area());

        frame.render_widget(
            Paragraph::new(Self::header_text(app))
                .block(Block::bordered().title(Self::title()))
                .centered(),
            layout[0],
        );

        match app.session.phase() {
            SessionPhase::Loading { .. } => {
                let symbol = LOADING_FRAMES[app.loading_frame % LOADING_FRAMES.len()];
                Self::render_message(
                    frame,
                    layout[1],
                    format!("{} Generating questions for {}…", symbol, app.session.category()),
                );
            }
            SessionPhase::Empty { failure } => {
                let mut text = String::from("No questions available right now.");
                if let Some(note) = failure {
                    text.push_str(&format!("\n\nReason: {}", note));
                }
                text.push_str("\n\nPress r to try again, or c/d to pick another topic first.");
                Self::render_message(frame, layout[1], text);
            }
            SessionPhase::InProgress { .. } | SessionPhase::Revealed { .. } => {
                Self::render_question(frame, layout[1], app);
            }
            SessionPhase::Finished => {
                let total = app.session.questions().len();
                let mut text = format!(
                    "Dive complete!\n\nScore: {} / {}",
                    app.session.score(),
                    total
                );
                if let Some(words) = app.encouragement {
                    text.push_str(&format!("\n\n{}", words));
                }
                text.push_str("\n\nPress Enter or r for a fresh batch.");
                Self::render_message(frame, layout[1], text);
            }
        }

        let mut status_lines = Vec::new();
        if let Some(error) = &app.error {
            status_lines.push(format!("Error: {}", error));
        }
        if let Some(status) = &app.status {
            status_lines.push(status.clone());
        }
        status_lines.push(
            "j/k or 1-9 choose. Enter submits or continues. r refreshes the batch.".to_string(),
        );
        status_lines.push("c/C category, d/D difficulty, o settings. Esc or q to quit.".to_string());

        frame.render_widget(
            Paragraph::new(status_lines.join("\n"))
                .wrap(Wrap { trim: false })
                .block(Block::bordered().title(Line::from("Status"))),
            layout[2],
        );
    }

    fn render_question(frame: &mut Frame, area: Rect, app: &App) {
        let Some(question) = app.session.current_question() else {
            return;
        };
        let revealed = app.session.revealed_answer();
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints(if revealed.is_some() {
                [Constraint::Percentage(50), Constraint::Percentage(50)]
            } else {
                [Constraint::Min(6), Constraint::Length(0)]
            })
            .split(area);

        let (position, total) = app.session.progress().unwrap_or((0, 0));
        let tentative = app.session.tentative_choice();
        let mut lines = vec![
            Self::sentence_line(
                question,
                tentative,
                revealed.map(|record| record.is_correct),
            ),
            Line::default(),
        ];
        for (index, option) in question.options.iter().enumerate() {
            let marker = match revealed {
                Some(_) if *option == question.correct_answer => "✓",
                Some(record) if *option == record.selected_option => "✗",
                _ => " ",
            };
            let prefix = if tentative == Some(option.as_str()) { "▶" } else { " " };
            let mut style = Style::default();
            if revealed.is_some() && *option == question.correct_answer {
                style = style.fg(Color::Green);
            } else if marker == "✗" {
                style = style.fg(Color::Red);
            } else if prefix == "▶" {
                style = style.add_modifier(Modifier::REVERSED);
            }
            lines.push(Line::from(Span::styled(
                format!("{} {} {}. {}", prefix, marker, index + 1, option),
                style,
            )));
        }

        frame.render_widget(
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .block(Block::bordered().title(Line::from(format!(
                    "Question {}/{}",
                    position, total
                )))),
            sections[0],
        );

        if let Some(record) = revealed {
            let verdict = if record.is_correct {
                Line::from("Correct!").green().bold()
            } else {
                Line::from(format!("Correct answer: {}", question.correct_answer))
                    .red()
                    .bold()
            };
            frame.render_widget(
                Paragraph::new(Self::explanation_lines(question, verdict))
                    .wrap(Wrap { trim: false })
                    .block(Block::bordered().title(Line::from("Explanation"))),
                sections[1],
            );
        }
    }

    /// The sentence with the blank filled by the tentative or submitted choice.
    fn sentence_line(
        question: &GrammarQuestion,
        choice: Option<&str>,
        verdict: Option<bool>,
    ) -> Line<'static> {
        let fill_style = match verdict {
            Some(true) => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            Some(false) => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            None => Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::UNDERLINED),
        };
        let fill = choice.unwrap_or(BLANK_MARKER).to_string();

        let mut spans = Vec::new();
        for (index, part) in question.sentence_parts().into_iter().enumerate() {
            if index > 0 {
                spans.push(Span::styled(fill.clone(), fill_style));
            }
            spans.push(Span::raw(part.to_string()));
        }
        Line::from(spans)
    }

    fn explanation_lines(question: &GrammarQuestion, verdict: Line<'static>) -> Vec<Line<'static>> {
        let explanation = &question.explanation;
        let mut lines = vec![verdict, Line::default()];

        if !explanation.rule.trim().is_empty() {
            lines.push(Line::from("Rule").bold().cyan());
            lines.extend(render_markdown(&explanation.rule, Style::default()));
            lines.push(Line::default());
        }
        if !explanation.example.trim().is_empty() {
            lines.push(Line::from("Example").bold().cyan());
            lines.extend(render_markdown(
                &format!("\"{}\"", explanation.example.trim()),
                Style::default().add_modifier(Modifier::ITALIC),
            ));
            lines.push(Line::default());
        }
        if !explanation.common_mistakes.trim().is_empty() {
            lines.push(Line::from("Common mistakes").bold().cyan());
            lines.extend(render_markdown(
                &explanation.common_mistakes,
                Style::default().fg(Color::Yellow),
            ));
        }
        lines
    }

    fn render_message(frame: &mut Frame, area: Rect, text: String) {
        frame.render_widget(
            Paragraph::new(text)
                .wrap(Wrap { trim: false })
                .centered()
                .block(Block::bordered()),
            area,
        );
    }

    fn render_config(&mut self, frame: &mut Frame) {
        let app = &*self.app;
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(6),
                Constraint::Length(5),
            ])
            .split(frame.area());

        let config_path = config::config_file_path();
        let header_text = format!(
            "Config file: {}\nDefaults used when the next batch is requested.",
            config_path.display()
        );

        frame.render_widget(
            Paragraph::new(header_text)
                .block(Block::bordered().title(Self::title()))
                .centered(),
            layout[0],
        );

        let form = &app.config_form;
        let items = vec![
            ListItem::new(format!("Questions per batch: {}", form.batch_size)),
            ListItem::new(format!("Request timeout: {}s", form.request_timeout_secs)),
            ListItem::new(format!(
                "Default category: {}",
                catalog::category_at(form.default_category)
            )),
            ListItem::new(format!("Default difficulty: {}", form.default_difficulty)),
            ListItem::new(format!(
                "Shuffle options: {}",
                if form.shuffle_options {
                    "Enabled"
                } else {
                    "Disabled"
                }
            )),
            ListItem::new(format!("Gemini model: {}", form.gemini_model.label())),
            ListItem::new(if form.is_editing_gemini_key() {
                format!(
                    "Gemini API key (editing): {}",
                    form.masked_gemini_key_buffer()
                )
            } else {
                format!("Gemini API key: {}", form.masked_gemini_key())
            }),
        ];

        let mut list_state = ListState::default();
        list_state.select(Some(form.selected_index()));

        frame.render_stateful_widget(
            List::new(items)
                .block(Block::bordered().title(Line::from("Defaults")))
                .highlight_symbol("▶ ")
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED)),
            layout[1],
            &mut list_state,
        );

        let mut status_lines = Vec::new();
        if let Some(error) = &app.error {
            status_lines.push(format!("Error: {}", error));
        }
        status_lines.push("↑/↓ or j/k choose field. ←/→ or h/l adjust value.".to_string());
        status_lines.push(
            "Select \"Gemini API key\" and press Enter to edit. Enter applies, Esc cancels."
                .to_string(),
        );
        status_lines.push("Press s to save, r to reset, m to return to the quiz.".to_string());

        if form.dirty {
            status_lines.push("Unsaved changes".to_string());
        }
        if let Some(config_status) = &form.status {
            status_lines.push(config_status.clone());
        }

        frame.render_widget(
            Paragraph::new(status_lines.join("\n"))
                .block(Block::bordered().title(Line::from("Status"))),
            layout[2],
        );
    }

    fn title() -> Line<'static> {
        Line::from("Grammar Deep Dive").bold().blue().centered()
    }

    fn header_text(app: &App) -> String {
        let progress = match app.session.progress() {
            Some((position, total)) => format!("{}/{}", position, total),
            None => "-".to_string(),
        };
        // The batch on screen may predate a category or difficulty change.
        let (category, difficulty) = match app.session.current_question() {
            Some(question) if !question.category.trim().is_empty() => {
                (question.category.as_str(), question.difficulty)
            }
            Some(question) => (app.session.category(), question.difficulty),
            None => (app.session.category(), app.session.difficulty()),
        };
        format!(
            "{} • {} • Question {} • Score {}",
            category,
            difficulty,
            progress,
            app.session.score()
        )
    }
}
