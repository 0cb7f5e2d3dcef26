//! Terminal chat with the coach
//!
//! Turns are kept in memory for the life of the session. When a transcript
//! path is given each turn is also appended to it as one JSON line.

use crate::coach::{ChatTurn, Coach};
use crate::utils::ensure_dir;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", ":q"];

const GREETING: &str = "Hello! I'm NexusByte, your wellness coach. Ask me about nutrition, \
exercise, sleep or stress. Type 'exit' to leave.";

/// JSON-lines log of chat turns
pub struct Transcript {
    writer: BufWriter<File>,
}

impl Transcript {
    /// Open for appending, creating the file and its directory if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open transcript {:?}", path))?;
        info!("Appending chat turns to {:?}", path);
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, turn: &ChatTurn) -> Result<()> {
        serde_json::to_writer(&mut self.writer, turn)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read every turn of a transcript file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<ChatTurn>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript {:?}", path))?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Invalid transcript line"))
            .collect()
    }
}

/// One conversation with the coach
pub struct ChatSession<'a> {
    coach: &'a Coach,
    history: Vec<ChatTurn>,
    transcript: Option<Transcript>,
}

impl<'a> ChatSession<'a> {
    pub fn new(coach: &'a Coach) -> Self {
        Self {
            coach,
            history: Vec::new(),
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Ask one question and record both turns
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let reply = self.coach.chat(question, &self.history).await;
        self.record(ChatTurn::user(question))?;
        self.record(ChatTurn::assistant(reply.clone()))?;
        Ok(reply)
    }

    fn record(&mut self, turn: ChatTurn) -> Result<()> {
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append(&turn)?;
        }
        self.history.push(turn);
        Ok(())
    }

    /// Read questions line by line until end of input or an exit command
    ///
    /// Returns the number of questions answered.
    pub async fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<usize> {
        writeln!(output, "{}", GREETING)?;
        if !self.coach.is_ready() {
            writeln!(output, "(The coach is offline; replies will say so.)")?;
        }

        let mut answered = 0;
        write!(output, "\nyou> ")?;
        output.flush()?;
        for line in input.lines() {
            let line = line?;
            let question = line.trim();
            if EXIT_COMMANDS.contains(&question.to_lowercase().as_str()) {
                break;
            }
            if !question.is_empty() {
                let reply = self.ask(question).await?;
                writeln!(output, "\nNexusByte> {}", reply)?;
                answered += 1;
                debug!("History holds {} turns", self.history.len());
            }
            write!(output, "\nyou> ")?;
            output.flush()?;
        }
        writeln!(output, "\nGoodbye!")?;
        Ok(answered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::engine::testing::fake_coach;
    use crate::coach::provider::testing::EchoChat;
    use crate::coach::{DISCLAIMER, UNAVAILABLE_MESSAGE};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_session_keeps_history_until_exit() {
        let llm = Arc::new(EchoChat::replying("Sleep seven hours."));
        let coach = fake_coach(llm.clone()).await;
        let mut session = ChatSession::new(&coach);

        let input = "How much sleep?\n\nAnd why?\nquit\nignored\n".as_bytes();
        let mut output = Vec::new();
        let answered = session.run(input, &mut output).await.unwrap();

        assert_eq!(answered, 2);
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history()[2], ChatTurn::user("And why?"));
        // the second question sees the first exchange
        assert!(llm.last_prompt().unwrap().contains("user: How much sleep?"));

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("NexusByte> Sleep seven hours."));
        assert!(printed.contains(DISCLAIMER));
        assert!(printed.trim_end().ends_with("Goodbye!"));
    }

    #[tokio::test]
    async fn test_transcript_is_appended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chats").join("session.jsonl");
        let coach = Coach::unavailable("no key");

        let mut session = ChatSession::new(&coach).with_transcript(Transcript::open(&path).unwrap());
        let reply = session.ask("hello").await.unwrap();
        assert_eq!(reply, UNAVAILABLE_MESSAGE);

        let mut again = ChatSession::new(&coach).with_transcript(Transcript::open(&path).unwrap());
        again.ask("still there?").await.unwrap();

        let turns = Transcript::read(&path).unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0], ChatTurn::user("hello"));
        assert_eq!(turns[3].role, "assistant");
    }
}
