//! Interactive input port.
//!
//! Core logic never touches a terminal. It asks a [`Prompter`] for a line of
//! input and gets `None` back when no operator is attached, so every decision
//! point has a defined non-interactive outcome.

use crate::error::{Error, Result};

/// Upper bound on re-prompts for a single question.
pub const MAX_PROMPT_ATTEMPTS: usize = 5;

pub trait Prompter: Send + Sync {
    /// Read one line of input. `Ok(None)` means no interactive input is available.
    fn read_line(&self, prompt: &str) -> Result<Option<String>>;

    /// Show a line of output to the operator.
    fn say(&self, line: &str);
}

/// Prompter used when stdin is not a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn read_line(&self, _prompt: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn say(&self, line: &str) {
        tracing::info!("{line}");
    }
}

/// Ask a yes/no question. Without interactive input the answer is "no".
pub fn confirm(prompter: &dyn Prompter, question: &str) -> Result<bool> {
    let prompt = format!("{question} [y/N]");
    for _ in 0..MAX_PROMPT_ATTEMPTS {
        let Some(answer) = prompter.read_line(&prompt)? else {
            return Ok(false);
        };
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "" | "n" | "no" => return Ok(false),
            other => prompter.say(&format!("'{other}' is not a valid answer, enter y or n")),
        }
    }
    Err(Error::PromptAttemptsExhausted(MAX_PROMPT_ATTEMPTS))
}

/// Show `items` as a 1-based list and ask the operator to pick one.
///
/// Returns the zero-based index, or `None` without interactive input.
pub fn pick(prompter: &dyn Prompter, header: &str, items: &[String]) -> Result<Option<usize>> {
    prompter.say(header);
    for (i, item) in items.iter().enumerate() {
        prompter.say(&format!("  {}) {item}", i + 1));
    }
    let prompt = format!("Select 1-{}", items.len());
    for _ in 0..MAX_PROMPT_ATTEMPTS {
        let Some(answer) = prompter.read_line(&prompt)? else {
            return Ok(None);
        };
        match answer.trim().parse::<usize>() {
            Ok(n) if (1..=items.len()).contains(&n) => return Ok(Some(n - 1)),
            _ => prompter.say(&format!(
                "'{}' is not a number between 1 and {}",
                answer.trim(),
                items.len()
            )),
        }
    }
    Err(Error::PromptAttemptsExhausted(MAX_PROMPT_ATTEMPTS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Script {
        answers: Mutex<VecDeque<String>>,
        said: Mutex<Vec<String>>,
    }

    impl Script {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().map(|s| s.to_string()).collect()),
                said: Mutex::new(Vec::new()),
            }
        }
    }

    impl Prompter for Script {
        fn read_line(&self, _prompt: &str) -> Result<Option<String>> {
            Ok(self.answers.lock().unwrap().pop_front())
        }

        fn say(&self, line: &str) {
            self.said.lock().unwrap().push(line.to_string());
        }
    }

    #[test]
    fn confirm_retries_until_valid() {
        let script = Script::new(&["maybe", "Y"]);
        assert!(confirm(&script, "Proceed?").unwrap());
        assert_eq!(script.said.lock().unwrap().len(), 1);
    }

    #[test]
    fn confirm_without_input_is_no() {
        assert!(!confirm(&NonInteractive, "Proceed?").unwrap());
    }

    #[test]
    fn pick_is_one_based() {
        let script = Script::new(&["0", "4", "2"]);
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(pick(&script, "Choose", &items).unwrap(), Some(1));
    }

    #[test]
    fn pick_gives_up_after_bounded_attempts() {
        let script = Script::new(&["x"; MAX_PROMPT_ATTEMPTS + 1]);
        let items = vec!["a".to_string()];
        assert!(matches!(
            pick(&script, "Choose", &items),
            Err(Error::PromptAttemptsExhausted(_))
        ));
    }
}
