//! Seam for the optional on-device scripting collaborator. The engine
//! itself lives outside this crate; while it reports loading mode, the
//! controller forwards every message it does not recognize as a built-in
//! command to the sink verbatim. The engine reads and writes controller
//! state back through [`Controller::sys_get`] and [`Controller::sys_set`]
//! using short symbolic references (`#n` pin, `%n` elapsed, `+n` count,
//! `*n` active, `$0` system time).
//!
//! [`Controller::sys_get`]: crate::controller::Controller::sys_get
//! [`Controller::sys_set`]: crate::controller::Controller::sys_set

pub trait ProgramSink: Send {
    /// True while a program is being loaded and unknown messages should
    /// be captured instead of ignored.
    fn loading(&self) -> bool;

    /// One forwarded message line, integrity suffix already stripped.
    fn accept(&mut self, line: &str);
}

// Lets callers keep a handle on the sink they hand the controller.
impl<T: ProgramSink + ?Sized> ProgramSink for std::sync::Arc<std::sync::Mutex<T>> {
    fn loading(&self) -> bool {
        self.lock().map(|sink| sink.loading()).unwrap_or(false)
    }

    fn accept(&mut self, line: &str) {
        if let Ok(mut sink) = self.lock() {
            sink.accept(line);
        }
    }
}

/// Minimal sink that records forwarded lines; used by tests and as a
/// building block for an external engine.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub active: bool,
    pub lines: Vec<String>,
}

impl ProgramSink for RecordingSink {
    fn loading(&self) -> bool {
        self.active
    }

    fn accept(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}
