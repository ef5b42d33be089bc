use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;

use crate::client::AnswerService;
use crate::lifecycle::{InFlight, PresentationState, RequestLifecycle};

pub struct App {
    pub lifecycle: RequestLifecycle,
    in_flight: Option<InFlight>,
    pub should_quit: bool,
    // Scroll offset for the answer window
    pub scroll_offset: u16,
}

impl App {
    pub fn new(service: Arc<dyn AnswerService>) -> Self {
        Self {
            lifecycle: RequestLifecycle::new(service),
            in_flight: None,
            should_quit: false,
            scroll_offset: 0,
        }
    }

    pub fn state(&self) -> &PresentationState {
        self.lifecycle.state()
    }

    pub fn question(&self) -> &str {
        self.lifecycle.question()
    }

    pub fn clear_input(&mut self) {
        self.lifecycle.question_mut().clear();
    }

    pub fn push_char(&mut self, c: char) {
        self.lifecycle.question_mut().push(c);
    }

    pub fn pop_char(&mut self) {
        self.lifecycle.question_mut().pop();
    }

    pub fn scroll_up(&mut self) {
        if self.scroll_offset > 0 {
            self.scroll_offset -= 1;
        }
    }

    pub fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(1);
    }

    /// Submit the current question; a no-op while one is in flight.
    pub fn submit(&mut self) {
        if let Some(pending) = self.lifecycle.start_submission() {
            self.in_flight = Some(pending.spawn());
        }
        self.scroll_offset = 0;
    }

    /// Resolve the in-flight request if it has finished. Returns whether the
    /// state changed.
    pub async fn settle(&mut self) -> bool {
        if !self.in_flight.as_ref().is_some_and(InFlight::is_finished) {
            return false;
        }
        let Some(task) = self.in_flight.take() else {
            return false;
        };
        let outcome = task.join().await;
        self.lifecycle.resolve(outcome);
        self.scroll_offset = 0;
        true
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let loading = self.state().is_loading();
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Enter if !loading => self.submit(),
            KeyCode::Enter => {}
            KeyCode::Esc => {
                if self.question().is_empty() {
                    self.should_quit = true;
                } else {
                    self.clear_input();
                }
            }
            KeyCode::Up => self.scroll_up(),
            KeyCode::Down => self.scroll_down(),
            KeyCode::Backspace => self.pop_char(),
            KeyCode::Char(c) => self.push_char(c),
            _ => {}
        }
    }
}
