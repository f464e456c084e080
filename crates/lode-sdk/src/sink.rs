//! Where user-facing notices go.
//!
//! Progress lines and warnings are not log records: they are part of the
//! command's output, written to stderr so they never mix with a diff on
//! stdout. Tests capture them instead.

use std::sync::{Arc, Mutex};

#[derive(Debug)]
enum Target {
    Stderr,
    Captured(Vec<String>),
}

/// A cloneable handle to a line-oriented notice destination.
#[derive(Clone, Debug)]
pub struct MessageSink {
    target: Arc<Mutex<Target>>,
}

impl MessageSink {
    pub fn stderr() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Stderr)),
        }
    }

    /// A sink that keeps every line for later inspection.
    pub fn captured() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Captured(Vec::new()))),
        }
    }

    pub fn line(&self, text: &str) {
        match &mut *self.target.lock().expect("lock poisoned") {
            Target::Stderr => eprintln!("{text}"),
            Target::Captured(lines) => lines.push(text.to_string()),
        }
    }

    /// Lines written so far. Always empty for stderr.
    pub fn lines(&self) -> Vec<String> {
        match &*self.target.lock().expect("lock poisoned") {
            Target::Stderr => Vec::new(),
            Target::Captured(lines) => lines.clone(),
        }
    }
}

impl Default for MessageSink {
    fn default() -> Self {
        Self::stderr()
    }
}
