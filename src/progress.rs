//! Optional progress side channel for a fetch.
//!
//! The fetcher runs one code path and reports through [`Progress`]; the
//! default [`NoProgress`] ignores everything. The CLI picks console output,
//! a JSON progress file, or both.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub trait Progress {
    /// A stage starts: `label` is the part name or a free-form step.
    fn begin(&mut self, _label: &str, _fields: &[String], _expected: usize) {}

    /// `done` units of the current stage are complete.
    fn advance(&mut self, _done: usize) {}

    fn finish(&mut self) {}

    fn message(&mut self, _text: &str) {}
}

impl<P: Progress + ?Sized> Progress for &mut P {
    fn begin(&mut self, label: &str, fields: &[String], expected: usize) {
        (**self).begin(label, fields, expected);
    }

    fn advance(&mut self, done: usize) {
        (**self).advance(done);
    }

    fn finish(&mut self) {
        (**self).finish();
    }

    fn message(&mut self, text: &str) {
        (**self).message(text);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Human readable progress, one line per update.
pub struct ConsoleProgress<W: Write> {
    out: W,
    expected: usize,
}

impl ConsoleProgress<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out, expected: 0 }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Progress for ConsoleProgress<W> {
    fn begin(&mut self, label: &str, fields: &[String], expected: usize) {
        self.expected = expected;
        let _ = writeln!(self.out, "Request '{label}' for: {}", fields.join(", "));
    }

    fn advance(&mut self, done: usize) {
        let _ = writeln!(self.out, "  {}/{}", done.min(self.expected), self.expected);
    }

    fn finish(&mut self) {
        let _ = writeln!(self.out);
    }

    fn message(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub progress: u8,
    pub message: String,
}

/// Writes the latest [`ProgressReport`] to a JSON file, replacing it
/// atomically on every update.
#[derive(Clone)]
pub struct ProgressFile {
    path: PathBuf,
    label: String,
    expected: usize,
}

impl ProgressFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            label: String::new(),
            expected: 0,
        }
    }

    fn write(&self, progress: u8, message: &str) {
        let report = ProgressReport {
            progress: progress.min(100),
            message: message.to_string(),
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(err) = fs::create_dir_all(parent)
        {
            warn!(%err, "could not create progress dir");
            return;
        }

        let tmp_path = self.path.with_extension("tmp");
        match serde_json::to_vec(&report) {
            Ok(payload) => {
                if let Err(err) = fs::write(&tmp_path, payload) {
                    warn!(%err, "could not write progress file");
                    return;
                }
                if let Err(err) = fs::rename(&tmp_path, &self.path) {
                    warn!(%err, "could not finalize progress file");
                }
            }
            Err(err) => {
                warn!(%err, "could not serialize progress report");
            }
        }
    }
}

impl Progress for ProgressFile {
    fn begin(&mut self, label: &str, _fields: &[String], expected: usize) {
        self.label = label.to_string();
        self.expected = expected;
        self.write(0, &format!("Requesting {label}"));
    }

    fn advance(&mut self, done: usize) {
        let percent = if self.expected == 0 {
            100
        } else {
            (done.min(self.expected) * 100 / self.expected) as u8
        };
        self.write(
            percent,
            &format!("{} {}/{}", self.label, done.min(self.expected), self.expected),
        );
    }

    fn finish(&mut self) {
        self.write(100, &format!("{} complete", self.label));
    }

    fn message(&mut self, text: &str) {
        self.write(100, text);
    }
}

/// Fans every update out to several sinks.
#[derive(Default)]
pub struct ProgressSinks {
    sinks: Vec<Box<dyn Progress>>,
}

impl ProgressSinks {
    pub fn push(&mut self, sink: impl Progress + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Progress for ProgressSinks {
    fn begin(&mut self, label: &str, fields: &[String], expected: usize) {
        for sink in &mut self.sinks {
            sink.begin(label, fields, expected);
        }
    }

    fn advance(&mut self, done: usize) {
        for sink in &mut self.sinks {
            sink.advance(done);
        }
    }

    fn finish(&mut self) {
        for sink in &mut self.sinks {
            sink.finish();
        }
    }

    fn message(&mut self, text: &str) {
        for sink in &mut self.sinks {
            sink.message(text);
        }
    }
}
