//! Terminal prompter.
//!
//! Answers the core's questions from the terminal with dialoguer. When stdin
//! or stderr is not a terminal, the non-interactive prompter is used instead
//! so every question takes its default answer.

use std::io::{self, IsTerminal};
use std::sync::Arc;

use console::{Term, style};
use dialoguer::{Input, theme::ColorfulTheme};

use tern_core::Error;
use tern_core::prompt::{NonInteractive, Prompter};

pub struct TermPrompter {
    term: Term,
    theme: ColorfulTheme,
}

impl TermPrompter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            theme: ColorfulTheme::default(),
        }
    }

    /// Terminal prompter if attached to one, otherwise [`NonInteractive`].
    pub fn detect(interactive: bool) -> Arc<dyn Prompter> {
        if interactive && io::stdin().is_terminal() && io::stderr().is_terminal() {
            Arc::new(Self::new())
        } else {
            Arc::new(NonInteractive)
        }
    }
}

/// Ctrl-C at a prompt cancels the invocation.
fn prompt_error(err: dialoguer::Error) -> Error {
    let dialoguer::Error::IO(err) = err;
    if err.kind() == io::ErrorKind::Interrupted {
        Error::Cancelled
    } else {
        Error::Io(err)
    }
}

impl Prompter for TermPrompter {
    fn read_line(&self, prompt: &str) -> tern_core::Result<Option<String>> {
        let answer: String = Input::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text_on(&self.term)
            .map_err(prompt_error)?;
        Ok(Some(answer))
    }

    fn say(&self, line: &str) {
        let styled = if line.starts_with("  ") {
            line.to_string()
        } else {
            style(line).bold().to_string()
        };
        if let Err(err) = self.term.write_line(&styled) {
            tracing::debug!("Failed to write to terminal: {err}");
        }
    }
}
