//! Operator command surface: single-key commands plus line prompts.

use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    ReturnToRelay,
    StartTest,
    ConfigureTest,
    ConfigureDistanceModel,
    ShowParameters,
    ShowTable,
    RequestInfo,
    ShowLocalInfo,
    ShowHelp,
    None,
}

impl OperatorCommand {
    pub fn from_key(key: Option<char>) -> Self {
        match key.map(|c| c.to_ascii_lowercase()) {
            Some('r') => OperatorCommand::ReturnToRelay,
            Some('s') => OperatorCommand::StartTest,
            Some('c') => OperatorCommand::ConfigureTest,
            Some('d') => OperatorCommand::ConfigureDistanceModel,
            Some('p') => OperatorCommand::ShowParameters,
            Some('t') => OperatorCommand::ShowTable,
            Some('q') => OperatorCommand::RequestInfo,
            Some('i') => OperatorCommand::ShowLocalInfo,
            Some('h') => OperatorCommand::ShowHelp,
            _ => OperatorCommand::None,
        }
    }
}

pub trait Console {
    /// Next pending key, without blocking.
    fn poll_key(&mut self) -> Option<char>;

    /// Asks for a value; returns `default` on empty input or timeout.
    fn prompt(&mut self, label: &str, default: &str) -> String;
}

/// Line-buffered stdin. A helper thread feeds lines into a channel so the
/// role loops can poll without blocking.
pub struct StdinConsole {
    lines: Receiver<String>,
    prompt_timeout: Duration,
}

impl StdinConsole {
    pub fn spawn(prompt_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            debug!("[console] stdin closed");
        });
        Self {
            lines: rx,
            prompt_timeout,
        }
    }
}

impl Console for StdinConsole {
    fn poll_key(&mut self) -> Option<char> {
        let line = self.lines.try_recv().ok()?;
        Some(line.trim().chars().next().unwrap_or('\n'))
    }

    fn prompt(&mut self, label: &str, default: &str) -> String {
        print!("{} [{}]: ", label, default);
        let _ = std::io::stdout().flush();
        match self.lines.recv_timeout(self.prompt_timeout) {
            Ok(line) if !line.trim().is_empty() => line.trim().to_string(),
            Ok(_) => default.to_string(),
            Err(RecvTimeoutError::Timeout) => {
                println!("\n[Timeout - using default]");
                default.to_string()
            }
            Err(RecvTimeoutError::Disconnected) => default.to_string(),
        }
    }
}
