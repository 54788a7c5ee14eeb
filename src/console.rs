//! Line-oriented user interaction.
//!
//! Every component that prints to the user or asks a question takes a
//! [`Console`], so the interactive flow can be replayed from a script.

#[cfg(test)]
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

pub trait Console {
    /// Print a full line
    fn say(&mut self, line: &str);

    /// Print without a trailing newline and flush, for prompts and progress bars
    fn write(&mut self, text: &str);

    /// Read one line of input without its line terminator
    ///
    /// End of input is an error: callers that loop until they get a valid
    /// answer must not spin forever on a closed stdin.
    fn read_line(&mut self) -> io::Result<String>;

    /// Show `prompt` and read the answer
    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        self.write(prompt);
        self.read_line()
    }
}

/// The process' stdout and stdin
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn say(&mut self, line: &str) {
        println!("{line}");
    }

    fn write(&mut self, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "standard input closed while waiting for an answer",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_owned())
    }
}

/// Replays canned answers and records everything printed
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ScriptedConsole {
    inputs: VecDeque<String>,
    output: String,
    reads: usize,
}

#[cfg(test)]
impl ScriptedConsole {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedConsole {
            inputs: inputs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Everything printed so far
    pub fn output(&self) -> &str {
        &self.output
    }

    /// How many lines have been read
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Answers not yet consumed
    pub fn remaining(&self) -> usize {
        self.inputs.len()
    }
}

#[cfg(test)]
impl Console for ScriptedConsole {
    fn say(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
    }

    fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn read_line(&mut self) -> io::Result<String> {
        let line = self.inputs.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "scripted input exhausted")
        })?;
        self.reads += 1;
        Ok(line)
    }
}
