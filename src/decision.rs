//! Operator decisions for transient service failures.
//!
//! When the vision service refuses a request for a reason the operator can
//! fix (quota, billing, credentials), the driver stops and asks a
//! [`DecisionProvider`] what to do with the current item.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::WorkItem;

/// What to do with an item that hit a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Record this item as Failed and continue with the next one.
    Skip,
    /// Stop the run now, leaving this and every later item Pending.
    Halt,
}

impl Decision {
    /// Parse an operator answer. Accepts `s`/`skip` and `h`/`halt`.
    pub fn parse_answer(answer: &str) -> Option<Decision> {
        match answer.trim().to_ascii_lowercase().as_str() {
            "s" | "skip" => Some(Decision::Skip),
            "h" | "halt" => Some(Decision::Halt),
            _ => None,
        }
    }
}

/// Source of operator decisions.
pub trait DecisionProvider {
    fn decide(&mut self, item: &WorkItem, status_code: u16) -> Result<Decision>;
}

impl<T: DecisionProvider + ?Sized> DecisionProvider for Box<T> {
    fn decide(&mut self, item: &WorkItem, status_code: u16) -> Result<Decision> {
        (**self).decide(item, status_code)
    }
}

impl<T: DecisionProvider + ?Sized> DecisionProvider for &mut T {
    fn decide(&mut self, item: &WorkItem, status_code: u16) -> Result<Decision> {
        (**self).decide(item, status_code)
    }
}

/// Always answers the same way. Used for unattended runs.
pub struct FixedDecision(pub Decision);

impl DecisionProvider for FixedDecision {
    fn decide(&mut self, _item: &WorkItem, _status_code: u16) -> Result<Decision> {
        Ok(self.0)
    }
}

/// Interactive prompt over any line reader and writer.
///
/// Re-asks until it gets a valid answer. End of input counts as
/// [`Decision::Halt`], which leaves the item Pending.
pub struct ConsolePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsolePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl ConsolePrompt<std::io::StdinLock<'static>, std::io::Stderr> {
    /// Prompt on stderr, read answers from stdin.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> DecisionProvider for ConsolePrompt<R, W> {
    fn decide(&mut self, item: &WorkItem, status_code: u16) -> Result<Decision> {
        writeln!(
            self.output,
            "Vision service returned HTTP {status_code} for {} ({}).",
            item.source_path.display(),
            item.id
        )?;
        writeln!(
            self.output,
            "This usually means quota, billing or credentials need attention."
        )?;

        loop {
            write!(self.output, "[s]kip this image or [h]alt the run? ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(Decision::Halt);
            }

            match Decision::parse_answer(&line) {
                Some(decision) => return Ok(decision),
                None => writeln!(self.output, "Please answer 's' or 'h'.")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, Status};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn item() -> WorkItem {
        WorkItem {
            id: ItemId(2),
            source_path: PathBuf::from("/in/photo2.jpg"),
            status: Status::Pending,
            comment: None,
        }
    }

    #[test]
    fn prompt_repeats_until_valid_answer() {
        let mut out = Vec::new();
        let mut prompt = ConsolePrompt::new(Cursor::new("maybe\n\n  SKIP \n"), &mut out);

        let decision = prompt.decide(&item(), 403).unwrap();
        assert_eq!(decision, Decision::Skip);

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("[s]kip this image").count(), 3);
        assert!(out.contains("HTTP 403"));
        assert!(out.contains("photo2.jpg"));
    }

    #[test]
    fn prompt_accepts_short_halt() {
        let mut prompt = ConsolePrompt::new(Cursor::new("h\n"), Vec::new());
        assert_eq!(prompt.decide(&item(), 403).unwrap(), Decision::Halt);
    }

    #[test]
    fn end_of_input_halts() {
        let mut prompt = ConsolePrompt::new(Cursor::new("what\n"), Vec::new());
        assert_eq!(prompt.decide(&item(), 429).unwrap(), Decision::Halt);
    }

    #[test]
    fn fixed_decision_ignores_item() {
        let mut provider = FixedDecision(Decision::Skip);
        assert_eq!(provider.decide(&item(), 403).unwrap(), Decision::Skip);
    }
}
