//! Process-backed engine
//!
//! Runs each tool with `std::process::Command` on the blocking pool.

use super::{Engine, EngineError, Invocation, ToolOutput};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Engine that executes the tool binaries
#[derive(Debug, Clone, Default)]
pub struct ProcessEngine {
    bin_dir: Option<PathBuf>,
}

impl ProcessEngine {
    /// Create an engine; binaries are looked up in `bin_dir` or on PATH
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self { bin_dir }
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, EngineError> {
        let tool = invocation.tool();
        let program = self.program(tool.binary_name());
        let args = invocation.arguments().to_vec();
        let stdin = invocation.stdin().map(<[u8]>::to_vec);

        let output = tokio::task::spawn_blocking({
            let program = program.clone();
            move || execute(&program, &args, stdin)
        })
        .await
        .map_err(|e| EngineError::Join(e.to_string()))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::BinaryNotFound(program.display().to_string())
            } else {
                EngineError::Spawn {
                    tool,
                    message: e.to_string(),
                }
            }
        })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Stdin is written from its own thread while `wait_with_output` drains
/// stdout and stderr
fn execute(program: &Path, args: &[OsString], stdin: Option<Vec<u8>>) -> std::io::Result<Output> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let Some(input) = stdin else {
        return command.stdin(Stdio::null()).output();
    };

    let mut child = command.stdin(Stdio::piped()).spawn()?;
    let writer = child.stdin.take().map(|mut pipe| {
        std::thread::spawn(move || match pipe.write_all(&input) {
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        })
    });
    let output = child.wait_with_output()?;
    if let Some(writer) = writer {
        writer
            .join()
            .map_err(|_| std::io::Error::other("stdin writer panicked"))??;
    }
    Ok(output)
}
