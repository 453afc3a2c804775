use std::io::Write;

/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` so that
/// results go to stdout while diagnostics go to stderr, and so tests can
/// capture what a command printed.
pub trait UserOutput: Send + Sync {
    /// Informational line on stdout (tables, JSON, summaries)
    fn status(&self, message: &str);

    /// Success message (e.g., "Started 'fetch' (PID 4242)")
    fn success(&self, message: &str);

    /// Warning message on stderr
    fn warning(&self, message: &str);

    /// Error message on stderr
    fn error(&self, message: &str);

    /// Inline progress (no trailing newline). Call `finish_progress` after.
    fn progress(&self, message: &str);

    /// Finish an inline progress line with a result.
    fn finish_progress(&self, result: &str);

    /// A blank line separator.
    fn blank(&self);
}

/// Standard CLI output: stdout/stderr, errors in red.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("{}", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("Warning: {}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn progress(&self, message: &str) {
        print!("{}", message);
        std::io::stdout().flush().ok();
    }

    fn finish_progress(&self, result: &str) {
        println!("{}", result);
    }

    fn blank(&self) {
        println!();
    }
}

/// Collects output in memory.
#[cfg(test)]
#[derive(Default)]
pub struct CapturedOutput {
    pub lines: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl CapturedOutput {
    pub fn text(&self) -> String {
        self.lines.lock().join("\n")
    }
}

#[cfg(test)]
impl UserOutput for CapturedOutput {
    fn status(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }
    fn success(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }
    fn warning(&self, message: &str) {
        self.lines.lock().push(format!("Warning: {}", message));
    }
    fn error(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }
    fn progress(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }
    fn finish_progress(&self, result: &str) {
        if let Some(last) = self.lines.lock().last_mut() {
            last.push_str(result);
        }
    }
    fn blank(&self) {
        self.lines.lock().push(String::new());
    }
}
