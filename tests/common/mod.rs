//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;

use brewdata_setup::Console;
use httpmock::MockServer;

/// Replays canned answers and records everything printed
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    inputs: VecDeque<String>,
    output: String,
    reads: usize,
}

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

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn reads(&self) -> usize {
        self.reads
    }
}

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

/// A `profiles.yml` with one Snowflake profile whose account lives on `server`
pub fn profiles_yaml(profile: &str, server: &MockServer) -> String {
    format!(
        "{profile}:
  target: dev
  outputs:
    dev:
      type: snowflake
      account: XY12345
      user: ANALYST
      password: hunter2
      warehouse: COMPUTE_WH
      database: ANALYTICS
      schema: PUBLIC
      role: TRANSFORMER
      host: {}
      port: {}
      protocol: http
",
        server.host(),
        server.port()
    )
}

/// The `{"data": ..., "success": true}` envelope of a successful call
pub fn success(data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({"data": data, "success": true, "code": null, "message": null})
}

/// The envelope of a call Snowflake rejected
pub fn failure(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"data": null, "success": false, "code": code, "message": message})
}
