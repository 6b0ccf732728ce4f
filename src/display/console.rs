use std::io::Write;

use super::DisplaySink;

/// Prints the conversation to stdout
///
/// Reply chunks are written without newlines as they arrive.
#[derive(Debug, Default)]
pub struct ConsoleDisplay;

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self
    }
}

impl DisplaySink for ConsoleDisplay {
    fn show_listening(&self) {
        println!("[listening...]");
    }

    fn add_user_message(&self, text: &str) {
        println!("\nYou: {}", text);
    }

    fn start_reply(&self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "AI: ");
        let _ = out.flush();
    }

    fn append_reply(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{}", text);
        let _ = out.flush();
    }

    fn finish_reply(&self) {
        println!("\n");
    }
}
