//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for the tianqi CLI, including
//! live rendering of chat event streams.

use crate::protocol::StreamEvent;
use owo_colors::OwoColorize;
use std::io::{self, Write};

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the startup banner
    pub fn banner(&self) {
        if self.colored {
            println!(
                "\n   {} {}\n",
                "tianqi".bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            println!("\n   tianqi v{}\n", env!("CARGO_PKG_VERSION"));
        }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a file skipped message
    pub fn skipped(&self, path: &str, reason: &str) {
        if self.colored {
            println!(
                "  {} {} {}",
                "○".yellow(),
                path.dimmed(),
                format!("({})", reason).yellow()
            );
        } else {
            println!("  [SKIPPED] {} ({})", path, reason);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "💡".dimmed(), message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    /// Render one chat event as it arrives.
    ///
    /// Tokens are printed without a newline and flushed so the answer grows
    /// in place. Returns `false` for an error event.
    pub fn event(&self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::Context(text) => {
                if text.is_empty() {
                    self.info("No reference material found");
                } else if self.colored {
                    println!("{}", "── context ──".cyan().bold());
                    println!("{}", text.dimmed());
                    println!("{}", "── answer ──".cyan().bold());
                } else {
                    println!("--- context ---\n{}\n--- answer ---", text);
                }
                true
            }
            StreamEvent::Token(token) => {
                print!("{}", token);
                io::stdout().flush().ok();
                true
            }
            StreamEvent::Done => {
                println!();
                true
            }
            StreamEvent::Error(message) => {
                println!();
                self.error(message);
                false
            }
        }
    }

    /// Print newline
    pub fn newline(&self) {
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_new() {
        assert!(Output::new().colored);
        assert!(!Output::no_color().colored);
        assert!(Output::default().colored);
    }

    #[test]
    fn test_event_reports_errors() {
        let output = Output::no_color();

        assert!(output.event(&StreamEvent::Context("B\n\nA".into())));
        assert!(output.event(&StreamEvent::Context(String::new())));
        assert!(output.event(&StreamEvent::Token("Hel".into())));
        assert!(output.event(&StreamEvent::Done));
        assert!(!output.event(&StreamEvent::Error("boom".into())));
    }

    #[test]
    fn test_output_methods_no_panic() {
        for output in [Output::no_color(), Output::new()] {
            output.banner();
            output.success("test success");
            output.info("test info");
            output.warning("test warning");
            output.error("test error");
            output.skipped("path", "reason");
            output.header("Test Header");
            output.kv("key", "value");
            output.hint("hint message");
            output.newline();
        }
    }
}
