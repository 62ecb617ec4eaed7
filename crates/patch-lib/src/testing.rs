//! Scripted command runner for unit tests

use crate::process::{CommandOutput, CommandRunner, Invocation};
use async_trait::async_trait;
use std::io;
use std::sync::Mutex;

#[derive(Clone)]
enum Reply {
    Output(CommandOutput),
    NotFound,
}

struct Rule {
    program: String,
    prefix: Vec<String>,
    reply: Reply,
}

/// Replies to commands by program and argument prefix and records every call.
///
/// Later rules win over earlier ones; unmatched commands succeed with empty
/// output.
pub(crate) struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A clean checkout on `branch` with a GitHub `origin`
    pub(crate) fn repo(branch: &str) -> Self {
        Self::new()
            .on("git", &["rev-parse", "--abbrev-ref", "HEAD"], CommandOutput::ok(format!("{branch}\n")))
            .on("git", &["rev-parse", "--verify"], CommandOutput::failed(1, ""))
            .on(
                "git",
                &["remote", "get-url"],
                CommandOutput::ok("https://github.com/acme/deploys.git\n"),
            )
    }

    pub(crate) fn on(self, program: &str, prefix: &[&str], output: CommandOutput) -> Self {
        self.push(program, prefix, Reply::Output(output))
    }

    pub(crate) fn missing(self, program: &str) -> Self {
        self.push(program, &[], Reply::NotFound)
    }

    fn push(mut self, program: &str, prefix: &[&str], reply: Reply) -> Self {
        self.rules.get_mut().unwrap().push(Rule {
            program: program.to_string(),
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            reply,
        });
        self
    }

    pub(crate) fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls rendered as command lines
    pub(crate) fn commands(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    /// Whether any recorded command line starts with `command`
    pub(crate) fn ran(&self, command: &str) -> bool {
        self.commands().iter().any(|c| c.starts_with(command))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        let reply = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.program == invocation.program && invocation.args.starts_with(&r.prefix))
            .map(|r| r.reply.clone());

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::NotFound) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not installed", invocation.program),
            )),
            None => Ok(CommandOutput::ok("")),
        }
    }
}
