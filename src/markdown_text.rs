use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
};

/// Render a small markdown fragment into styled terminal lines.
///
/// Only the inline and block constructs explanations actually use are mapped:
/// paragraphs, headings, emphasis, strong, inline code, lists and line breaks.
/// Everything else degrades to its plain text.
pub(crate) fn render_markdown(markdown: &str, base: Style) -> Vec<Line<'static>> {
    let mut renderer = LineBuilder::new(base);
    let parser = Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH);

    for event in parser {
        match event {
            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => renderer.finish_block(),
            Event::Start(Tag::Heading { .. }) => renderer.push_modifier(Modifier::BOLD),
            Event::End(TagEnd::Heading(_)) => {
                renderer.pop_modifier();
                renderer.finish_block();
            }
            Event::Start(Tag::Strong) => renderer.push_modifier(Modifier::BOLD),
            Event::Start(Tag::Emphasis) => renderer.push_modifier(Modifier::ITALIC),
            Event::Start(Tag::Strikethrough) => renderer.push_modifier(Modifier::CROSSED_OUT),
            Event::End(TagEnd::Strong | TagEnd::Emphasis | TagEnd::Strikethrough) => {
                renderer.pop_modifier()
            }
            Event::Start(Tag::List(_)) => renderer.list_depth += 1,
            Event::End(TagEnd::List(_)) => {
                renderer.list_depth = renderer.list_depth.saturating_sub(1);
                if renderer.list_depth == 0 {
                    renderer.blank_line();
                }
            }
            Event::Start(Tag::Item) => {
                renderer.break_line();
                let indent = "  ".repeat(renderer.list_depth.saturating_sub(1));
                renderer.push_raw(format!("{indent}• "), base);
            }
            Event::End(TagEnd::Item) => renderer.break_line(),
            Event::Code(code) => {
                let style = renderer.current_style().add_modifier(Modifier::REVERSED);
                renderer.push_raw(code.into_string(), style);
            }
            Event::Text(text) => {
                let style = renderer.current_style();
                renderer.push_raw(text.into_string(), style);
            }
            Event::SoftBreak => renderer.push_raw(" ".to_string(), base),
            Event::HardBreak => renderer.break_line(),
            Event::Rule => renderer.finish_block(),
            _ => {}
        }
    }

    renderer.finish()
}

struct LineBuilder {
    base: Style,
    modifiers: Vec<Modifier>,
    current: Vec<Span<'static>>,
    lines: Vec<Line<'static>>,
    list_depth: usize,
}

impl LineBuilder {
    fn new(base: Style) -> Self {
        Self {
            base,
            modifiers: Vec::new(),
            current: Vec::new(),
            lines: Vec::new(),
            list_depth: 0,
        }
    }

    fn current_style(&self) -> Style {
        self.modifiers
            .iter()
            .fold(self.base, |style, modifier| style.add_modifier(*modifier))
    }

    fn push_modifier(&mut self, modifier: Modifier) {
        self.modifiers.push(modifier);
    }

    fn pop_modifier(&mut self) {
        self.modifiers.pop();
    }

    fn push_raw(&mut self, text: String, style: Style) {
        self.current.push(Span::styled(text, style));
    }

    fn break_line(&mut self) {
        if !self.current.is_empty() {
            let spans = std::mem::take(&mut self.current);
            self.lines.push(Line::from(spans));
        }
    }

    fn blank_line(&mut self) {
        self.break_line();
        self.lines.push(Line::default());
    }

    fn finish_block(&mut self) {
        if self.list_depth > 0 {
            self.break_line();
        } else {
            self.blank_line();
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.break_line();
        while self
            .lines
            .last()
            .is_some_and(|line| line.spans.is_empty())
        {
            self.lines.pop();
        }
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn strong_and_emphasis_become_styled_spans() {
        let lines = render_markdown("关系代词 **which** 指代 *物*。", Style::default());

        assert_eq!(lines.len(), 1);
        assert_eq!(plain(&lines[0]), "关系代词 which 指代 物。");
        let which = lines[0]
            .spans
            .iter()
            .find(|span| span.content == "which")
            .unwrap();
        assert!(which.style.add_modifier.contains(Modifier::BOLD));
        let thing = lines[0]
            .spans
            .iter()
            .find(|span| span.content == "物")
            .unwrap();
        assert!(thing.style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn list_items_are_bulleted_on_their_own_lines() {
        let lines = render_markdown("- first\n- second", Style::default());

        let rendered: Vec<String> = lines.iter().map(plain).collect();
        assert_eq!(rendered, vec!["• first", "• second"]);
    }

    #[test]
    fn paragraphs_are_separated_by_blank_lines() {
        let lines = render_markdown("one\ntwo\n\nthree", Style::default());

        let rendered: Vec<String> = lines.iter().map(plain).collect();
        assert_eq!(rendered, vec!["one two", "", "three"]);
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert!(render_markdown("", Style::default()).is_empty());
    }
}
