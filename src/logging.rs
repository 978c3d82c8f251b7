//! Session transcript logging: an append-only chat log for the client,
//! enabled with `--log-file`.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};

pub struct TranscriptLog {
    file_path: Option<String>,
}

impl TranscriptLog {
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let log = TranscriptLog {
            file_path: log_file,
        };
        if log.file_path.is_some() {
            log.write_entry(&format!(
                "## Session started {}",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            ))?;
        }
        Ok(log)
    }

    pub fn log_user(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.write_entry(&format!("You: {content}"))
    }

    pub fn log_assistant(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.write_entry(content)
    }

    fn write_entry(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = &self.file_path else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);

        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        // Blank line between entries, matching the on-screen spacing.
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_log_writes_nothing() {
        let log = TranscriptLog::new(None).unwrap();
        assert!(log.log_user("hello").is_ok());
    }

    #[test]
    fn entries_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.log");
        let log = TranscriptLog::new(Some(path.to_string_lossy().into_owned())).unwrap();
        log.log_user("客户压价").unwrap();
        log.log_assistant("1 结论\n先稳住").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let user_pos = contents.find("You: 客户压价").unwrap();
        let reply_pos = contents.find("1 结论").unwrap();
        assert!(contents.starts_with("## Session started"));
        assert!(user_pos < reply_pos);
    }
}
