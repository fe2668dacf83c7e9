use crate::query::AnswerRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write;

/// Questions remembered by a [`Session`] unless configured otherwise.
pub const DEFAULT_HISTORY_LEN: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub record: AnswerRecord,
    pub asked_at: DateTime<Utc>,
}

/// Per-user question history for the interactive front-end.
///
/// History is display-only: it is never fed back into retrieval or generation.
#[derive(Debug, Clone)]
pub struct Session {
    history: VecDeque<SessionEntry>,
    capacity: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl Session {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, dropping the oldest once the history is full.
    pub fn record(&mut self, record: AnswerRecord) -> &SessionEntry {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(SessionEntry {
            record,
            asked_at: Utc::now(),
        });
        &self.history[self.history.len() - 1]
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &SessionEntry> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// One line of REPL input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Exit,
    History,
    /// Forget the session history
    Clear,
    Ask(&'a str),
}

impl<'a> ReplCommand<'a> {
    /// Keywords are matched case-insensitively; anything else is a question.
    pub fn parse(input: &'a str) -> Self {
        let input = input.trim();
        match input.to_ascii_lowercase().as_str() {
            "exit" | "quit" => Self::Exit,
            "history" => Self::History,
            "clear" => Self::Clear,
            _ => Self::Ask(input),
        }
    }
}

/// Answer text followed by a numbered source list.
pub fn format_answer(record: &AnswerRecord) -> String {
    let mut out = record.answer_text.clone();
    if record.sources.is_empty() {
        out.push_str("\n\n(no sources)");
        return out;
    }

    out.push_str("\n\nSources:");
    for (i, source) in record.sources.iter().enumerate() {
        let snippet = source.snippet.split_whitespace().collect::<Vec<_>>().join(" ");
        let _ = write!(
            out,
            "\n  [{}] {} (score {:.3})\n      {}",
            i + 1,
            source.title,
            source.score,
            snippet
        );
    }
    out
}

pub fn format_history(session: &Session) -> String {
    if session.is_empty() {
        return "No questions asked yet.".to_string();
    }
    session
        .history()
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "{:>2}. [{}] {}",
                i + 1,
                entry.asked_at.format("%H:%M:%S"),
                entry.record.question
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
