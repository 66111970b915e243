use std::fmt;

/// Errors produced while driving a local git workspace.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// git (or gpg) exited unsuccessfully.
    #[error("git {}: {}\n{output}", args.join(" "), ExitDisplay(*status))]
    Command {
        args: Vec<String>,
        status: Option<i32>,
        /// stdout followed by stderr.
        output: String,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git operation cancelled")]
    Cancelled,

    #[error("git operation timed out")]
    TimedOut,

    /// A failure annotated with the workspace step it happened in.
    #[error("{step}: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<GitError>,
    },

    #[error("configure gpg signing: {0}")]
    Signing(String),

    #[error("workspace io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    InvalidInput(String),
}

struct ExitDisplay(Option<i32>);

impl fmt::Display for ExitDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit status {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

impl GitError {
    /// Wrap `source` with the name of the step that failed.
    pub fn step(step: impl Into<String>, source: GitError) -> Self {
        GitError::Step {
            step: step.into(),
            source: Box::new(source),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            GitError::Cancelled => true,
            GitError::Step { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        match self {
            GitError::TimedOut => true,
            GitError::Step { source, .. } => source.is_timed_out(),
            _ => false,
        }
    }

    /// Combined subprocess output of the innermost failed command, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            GitError::Command { output, .. } => Some(output),
            GitError::Step { source, .. } => source.output(),
            _ => None,
        }
    }
}

pub type GitResult<T> = std::result::Result<T, GitError>;
