use log::debug;
use std::{
    io::{BufRead, BufReader, Read, Write},
    process::{Command, Stdio},
    sync::mpsc,
    thread,
};

use crate::services::{CommandRunner, RunError};

/// Runs a docker compatible CLI, `docker` or `podman`.
pub struct EngineCli {
    program: String,
}

impl EngineCli {
    pub fn new<P: Into<String>>(program: P) -> EngineCli {
        EngineCli {
            program: program.into(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        debug!("running {} {}", self.program, args.join(" "));
        let mut command = Command::new(&self.program);
        command.args(args).stdin(Stdio::null());
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> RunError {
        RunError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

fn forward_lines<R: Read + Send + 'static>(reader: R, lines: mpsc::Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if lines.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

impl CommandRunner for EngineCli {
    fn run(&mut self, output: &mut dyn Write, args: &[String]) -> Result<(), RunError> {
        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.spawn_error(err))?;

        // Both pipes feed one channel so lines reach the sink in the order
        // the engine wrote them.
        let (sender, receiver) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, sender.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, sender);
        }

        let mut forwarded = Ok(());
        for line in receiver {
            if forwarded.is_ok() {
                forwarded = output.write_all(&line);
            }
        }

        let status = child.wait().map_err(|err| self.spawn_error(err))?;
        forwarded?;
        output.flush()?;

        if status.success() {
            Ok(())
        } else {
            Err(RunError::Exited {
                args: args.to_vec(),
                code: status.code(),
            })
        }
    }

    fn output(&mut self, args: &[String]) -> Result<Vec<u8>, RunError> {
        let output = self
            .command(args)
            .stderr(Stdio::inherit())
            .output()
            .map_err(|err| self.spawn_error(err))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(RunError::Exited {
                args: args.to_vec(),
                code: output.status.code(),
            })
        }
    }
}
