use crate::app::App;
use crate::lifecycle::PresentationState;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // question box
            Constraint::Length(1), // status line
            Constraint::Min(0),    // answer area
        ])
        .split(f.area());

    render_input(f, app, chunks[0]);
    render_status(f, app, chunks[1]);
    render_answer(f, app, chunks[2]);
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let loading = app.state().is_loading();

    let text = if app.question().is_empty() && !loading {
        Line::from(Span::styled(
            "Ask a question...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Line::from(format!("{}_", app.question()))
    };

    let style = if loading {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Green)
    };

    let input = Paragraph::new(text).style(style).block(
        Block::default()
            .title("❓ Question")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(input, area);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let status_text = if app.state().is_loading() {
        "Waiting for the answering service... (Enter disabled)"
    } else {
        "Ready | Enter: ask  Esc: clear  Ctrl-C: quit  ↑↓: scroll"
    };

    let status = Paragraph::new(status_text).style(Style::default().fg(Color::Gray));

    f.render_widget(status, area);
}

fn render_answer(f: &mut Frame, app: &App, area: Rect) {
    let text = match app.state() {
        PresentationState::Idle => Text::from(vec![
            Line::from(""),
            Line::from(Span::styled(
                "💡 Type your question and press Enter",
                Style::default().fg(Color::Gray),
            )),
            Line::from(""),
            Line::from(Span::styled(
                "Example: \"What is ISO 27001?\"",
                Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
            )),
        ]),
        PresentationState::Loading => Text::from(Line::from(Span::styled(
            "Loading...",
            Style::default().fg(Color::Yellow),
        ))),
        PresentationState::Failed { message } => Text::from(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        ))),
        PresentationState::Answered { text } => Text::from(text.clone()),
    };

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .title("💬 Answer")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: true })
        .scroll((app.scroll_offset, 0));

    f.render_widget(paragraph, area);
}
