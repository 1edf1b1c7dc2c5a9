//! Operator confirmation prompt.
//!
//! One yes/no question on stderr, default No. Non-interactive sessions
//! (piped stdin/stderr) never block on input.

use std::io::{self, IsTerminal, Write};
use anyhow::Result;

/// Asks `message [y/N]` on stderr and reads one line from stdin.
///
/// Returns `Ok(false)` without prompting when stdin or stderr is not a
/// terminal; a build in CI should never hang waiting for a keypress.
pub fn confirm(message: &str) -> Result<bool> {
    if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
        return Ok(false);
    }

    write!(io::stderr(), "{} [y/N] ", message)?;
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(is_affirmative(&input))
}

/// Anything other than an explicit yes counts as No.
pub fn is_affirmative(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_variants_are_affirmative() {
        for answer in ["y", "Y", "yes", "YES", " yes ", "y\n"] {
            assert!(is_affirmative(answer), "rejected: {:?}", answer);
        }
    }

    #[test]
    fn everything_else_is_a_no() {
        for answer in ["", "n", "no", "nope", "yep", "ok", "1", "\n"] {
            assert!(!is_affirmative(answer), "accepted: {:?}", answer);
        }
    }
}
