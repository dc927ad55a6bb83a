// Thin synchronous wrapper around the `git` command line.
//
// Every invocation passes its arguments as a vector; nothing goes through a
// shell, so commit labels and pathspecs are never interpolated.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitError {
    #[error("git add needs at least one pathspec")]
    NoPathspec,

    #[error("could not start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` exited with {code:?}: {}", .output.trim())]
    Exit { command: String, code: Option<i32>, output: String },
}

impl GitError {
    /// Text the failing command printed (stderr, or stdout when stderr was
    /// empty).
    pub fn output(&self) -> &str {
        match self {
            Self::NoPathspec => "",
            Self::Spawn { reason, .. } => reason,
            Self::Exit { output, .. } => output,
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            Self::NoPathspec => None,
            Self::Spawn { command, .. } | Self::Exit { command, .. } => Some(command),
        }
    }
}

/// Captured result of one finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub succeeded: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Process-spawning seam; tests script the results instead of running git.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> io::Result<ProcessOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> io::Result<ProcessOutput> {
        // Output is matched against English messages.
        let finished =
            Command::new(program).args(args).current_dir(cwd).env("LC_ALL", "C").output()?;
        Ok(ProcessOutput {
            succeeded: finished.status.success(),
            code: finished.status.code(),
            stdout: String::from_utf8_lossy(&finished.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&finished.stderr).into_owned(),
        })
    }
}

/// Runs git subcommands inside one working tree.
#[derive(Debug, Clone)]
pub struct GitWorker<R = SystemRunner> {
    repo_path: PathBuf,
    runner: R,
}

impl GitWorker<SystemRunner> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self::with_runner(repo_path, SystemRunner)
    }
}

impl<R: CommandRunner> GitWorker<R> {
    pub fn with_runner(repo_path: impl Into<PathBuf>, runner: R) -> Self {
        Self { repo_path: repo_path.into(), runner }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Whether the working tree carries repository metadata (`.git` dir or
    /// worktree file). Does not invoke git.
    pub fn is_repository(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    /// `git status --porcelain`, limited to `paths` when any are given.
    pub fn status_porcelain<S: AsRef<str>>(&self, paths: &[S]) -> Result<GitOutput, GitError> {
        let mut args = vec!["status".to_owned(), "--porcelain".to_owned()];
        push_pathspecs(&mut args, paths);
        self.git(args)
    }

    /// Stage additions, modifications and deletions under `paths`.
    pub fn add_all<S: AsRef<str>>(&self, paths: &[S]) -> Result<GitOutput, GitError> {
        if paths.is_empty() {
            return Err(GitError::NoPathspec);
        }
        let mut args = vec!["add".to_owned(), "-A".to_owned()];
        push_pathspecs(&mut args, paths);
        self.git(args)
    }

    pub fn commit(&self, message: &str) -> Result<GitOutput, GitError> {
        self.git(["commit", "-m", message].map(str::to_owned).to_vec())
    }

    pub fn push(&self, remote: &str, branch: &str) -> Result<GitOutput, GitError> {
        self.git(["push", remote, branch].map(str::to_owned).to_vec())
    }

    fn git(&self, args: Vec<String>) -> Result<GitOutput, GitError> {
        let command = format!("git {}", args.join(" "));
        let finished = self
            .runner
            .run("git", &args, &self.repo_path)
            .map_err(|error| GitError::Spawn { command: command.clone(), reason: error.to_string() })?;

        let ProcessOutput { succeeded, code, stdout, stderr } = finished;
        if succeeded {
            Ok(GitOutput { stdout, stderr })
        } else {
            let output = if stderr.trim().is_empty() { stdout } else { stderr };
            Err(GitError::Exit { command, code, output })
        }
    }
}

fn push_pathspecs<S: AsRef<str>>(args: &mut Vec<String>, paths: &[S]) {
    if paths.is_empty() {
        return;
    }
    args.push("--".to_owned());
    args.extend(paths.iter().map(|path| path.as_ref().to_owned()));
}
