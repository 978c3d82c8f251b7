//! Slash commands typed into the input line.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stage files for the next outgoing turn.
    Attach(Vec<PathBuf>),
    /// Remove a pending attachment by name before send.
    Detach(String),
    /// Toggle voice capture.
    Voice,
    /// Clear the conversation (refused while a turn is in flight).
    Clear,
}

/// `None` when the input is not a command; `Some(Err(..))` carries the
/// usage message for a malformed one.
pub fn parse(input: &str) -> Option<Result<Command, String>> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    Some(match name {
        "/attach" => {
            if rest.is_empty() {
                Err("Usage: /attach <path> [path ...]".to_string())
            } else {
                Ok(Command::Attach(rest.iter().map(PathBuf::from).collect()))
            }
        }
        "/detach" => {
            if rest.is_empty() {
                Err("Usage: /detach <name>".to_string())
            } else {
                Ok(Command::Detach(rest.join(" ")))
            }
        }
        "/voice" => Ok(Command::Voice),
        "/clear" => Ok(Command::Clear),
        other => Err(format!("Unknown command: {other}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert!(parse("客户压价怎么办").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn attach_collects_paths() {
        let cmd = parse("/attach a.txt b.png").unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::Attach(vec![PathBuf::from("a.txt"), PathBuf::from("b.png")])
        );
        assert!(parse("/attach").unwrap().is_err());
    }

    #[test]
    fn detach_takes_a_name() {
        let cmd = parse("/detach 报价单.txt").unwrap().unwrap();
        assert_eq!(cmd, Command::Detach("报价单.txt".to_string()));
    }

    #[test]
    fn unknown_commands_report_usage() {
        assert!(parse("/frobnicate").unwrap().is_err());
    }
}
