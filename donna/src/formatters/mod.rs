pub mod terminal;

pub use terminal::{format_transcript, TerminalFormatter};
