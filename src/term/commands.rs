//! Shell-integration command tracking via OSC 133 markers
//! (FinalTerm/iTerm2 protocol):
//!   OSC 133;A — prompt start
//!   OSC 133;B — command start (user pressed enter)
//!   OSC 133;C — command output start
//!   OSC 133;D;exit_code — command finished
//!
//! Rows are recorded in absolute coordinates (scrollback origin) so
//! records stay valid as lines scroll out of the viewport.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

const MAX_RECORDS: usize = 1000;

#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub started_at: DateTime<Utc>,
    pub prompt_row: usize,
    pub command_row: usize,
    pub output_row: usize,
    pub end_row: usize,
    pub exit_code: Option<i32>,
    pub duration: Option<Duration>,
    pub working_dir: String,
}

impl CommandRecord {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.map(|d| d.as_millis() as u64).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Prompt,
    Command,
    Output,
}

pub struct CommandTracker {
    phase: Phase,
    records: Vec<CommandRecord>,
    prompt_row: usize,
    command_row: usize,
    output_row: usize,
    started: Option<Instant>,
    pub working_dir: String,
}

impl Default for CommandTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTracker {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            records: Vec::new(),
            prompt_row: 0,
            command_row: 0,
            output_row: 0,
            started: None,
            working_dir: String::new(),
        }
    }

    /// Feed one OSC 133 payload (`A`, `B`, `C`, or `D;N`) with the cursor's
    /// absolute row at the time the marker arrived.
    pub fn handle_marker(&mut self, payload: &str, row: usize) {
        match payload.chars().next() {
            Some('A') => {
                self.phase = Phase::Prompt;
                self.prompt_row = row;
            }
            Some('B') => {
                self.phase = Phase::Command;
                self.command_row = row;
                self.started = Some(Instant::now());
            }
            Some('C') => {
                self.phase = Phase::Output;
                self.output_row = row;
                if self.started.is_none() {
                    self.started = Some(Instant::now());
                }
            }
            Some('D') => {
                let exit_code = payload
                    .strip_prefix("D;")
                    .and_then(|s| s.trim().parse::<i32>().ok());
                let duration = self.started.take().map(|s| s.elapsed());
                self.records.push(CommandRecord {
                    started_at: Utc::now(),
                    prompt_row: self.prompt_row,
                    command_row: self.command_row,
                    output_row: self.output_row,
                    end_row: row,
                    exit_code,
                    duration,
                    working_dir: self.working_dir.clone(),
                });
                if self.records.len() > MAX_RECORDS {
                    self.records.remove(0);
                }
                self.phase = Phase::Idle;
            }
            _ => {}
        }
    }

    /// OSC 7 working-directory update: `file://hostname/path`.
    pub fn handle_cwd(&mut self, uri: &str) {
        if let Some(rest) = uri.strip_prefix("file://") {
            if let Some(idx) = rest.find('/') {
                self.working_dir = rest[idx..].to_string();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&CommandRecord> {
        self.records.get(idx)
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.records.last().and_then(|r| r.exit_code)
    }

    /// Nearest prompt row above `row`, for prompt-jump navigation.
    pub fn prev_prompt(&self, row: usize) -> Option<usize> {
        self.records
            .iter()
            .rev()
            .find(|r| r.prompt_row < row)
            .map(|r| r.prompt_row)
    }

    /// Nearest prompt row below `row`.
    pub fn next_prompt(&self, row: usize) -> Option<usize> {
        self.records
            .iter()
            .find(|r| r.prompt_row > row)
            .map(|r| r.prompt_row)
    }

    /// Dropped on RIS together with the rest of the screen state.
    pub fn clear(&mut self) {
        self.records.clear();
        self.phase = Phase::Idle;
        self.started = None;
    }

    pub fn in_command(&self) -> bool {
        matches!(self.phase, Phase::Command | Phase::Output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_command_cycle() {
        let mut t = CommandTracker::new();
        t.handle_marker("A", 0);
        t.handle_marker("B", 0);
        t.handle_marker("C", 1);
        t.handle_marker("D;0", 5);

        assert_eq!(t.len(), 1);
        let rec = t.get(0).unwrap();
        assert_eq!(rec.prompt_row, 0);
        assert_eq!(rec.output_row, 1);
        assert_eq!(rec.end_row, 5);
        assert_eq!(rec.exit_code, Some(0));
        assert!(rec.duration.is_some());
        assert!(rec.success());
    }

    #[test]
    fn test_failed_command_exit_code() {
        let mut t = CommandTracker::new();
        t.handle_marker("A", 0);
        t.handle_marker("B", 0);
        t.handle_marker("C", 1);
        t.handle_marker("D;127", 2);
        assert_eq!(t.last_exit_code(), Some(127));
        assert!(!t.get(0).unwrap().success());
    }

    #[test]
    fn test_d_without_code() {
        let mut t = CommandTracker::new();
        t.handle_marker("A", 0);
        t.handle_marker("D", 1);
        assert_eq!(t.get(0).unwrap().exit_code, None);
    }

    #[test]
    fn test_prompt_navigation() {
        let mut t = CommandTracker::new();
        for i in 0..3 {
            t.handle_marker("A", i * 10);
            t.handle_marker("B", i * 10);
            t.handle_marker("C", i * 10 + 1);
            t.handle_marker("D;0", i * 10 + 5);
        }
        assert_eq!(t.prev_prompt(25), Some(20));
        assert_eq!(t.prev_prompt(5), Some(0));
        assert_eq!(t.prev_prompt(0), None);
        assert_eq!(t.next_prompt(5), Some(10));
        assert_eq!(t.next_prompt(25), None);
    }

    #[test]
    fn test_cwd_from_file_uri() {
        let mut t = CommandTracker::new();
        t.handle_cwd("file://somehost/home/user/src");
        assert_eq!(t.working_dir, "/home/user/src");
        // recorded on completion
        t.handle_marker("A", 0);
        t.handle_marker("D;0", 1);
        assert_eq!(t.get(0).unwrap().working_dir, "/home/user/src");
    }

    #[test]
    fn test_record_cap() {
        let mut t = CommandTracker::new();
        for i in 0..(MAX_RECORDS + 10) {
            t.handle_marker("A", i);
            t.handle_marker("D;0", i);
        }
        assert_eq!(t.len(), MAX_RECORDS);
        // oldest dropped
        assert_eq!(t.get(0).unwrap().prompt_row, 10);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut t = CommandTracker::new();
        t.handle_marker("A", 0);
        t.handle_marker("B", 0);
        assert!(t.in_command());
        t.handle_marker("D;0", 1);
        t.clear();
        assert!(t.is_empty());
        assert!(!t.in_command());
    }

    #[test]
    fn test_unknown_marker_ignored() {
        let mut t = CommandTracker::new();
        t.handle_marker("Z", 0);
        t.handle_marker("", 0);
        assert!(t.is_empty());
    }
}
