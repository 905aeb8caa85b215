use thiserror::Error;

/// Result type for everything a command can fail with.
pub type ShellResult<T> = Result<T, ShellError>;

/// Recoverable command errors. `Display` renders `<command>: <message>`,
/// the dispatcher adds the `smash error: ` prefix.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{cmd}: {msg}")]
    Parse { cmd: String, msg: String },
    #[error("{cmd}: {msg}")]
    Argument { cmd: String, msg: String },
    #[error("{cmd}: {msg}")]
    Lookup { cmd: String, msg: String },
    #[error("{cmd}: {msg}")]
    Launch { cmd: String, msg: String },
    #[error("{cmd}: {msg}: {source}")]
    Signal {
        cmd: String,
        msg: String,
        #[source]
        source: nix::Error,
    },
    #[error("{cmd}: {source}")]
    Io {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
}

impl ShellError {
    pub fn parse(cmd: &str, msg: impl Into<String>) -> Self {
        ShellError::Parse {
            cmd: cmd.to_string(),
            msg: msg.into(),
        }
    }

    pub fn argument(cmd: &str, msg: impl Into<String>) -> Self {
        ShellError::Argument {
            cmd: cmd.to_string(),
            msg: msg.into(),
        }
    }

    pub fn lookup(cmd: &str, msg: impl Into<String>) -> Self {
        ShellError::Lookup {
            cmd: cmd.to_string(),
            msg: msg.into(),
        }
    }

    pub fn launch(cmd: &str, msg: impl Into<String>) -> Self {
        ShellError::Launch {
            cmd: cmd.to_string(),
            msg: msg.into(),
        }
    }

    pub fn signal(cmd: &str, msg: impl Into<String>, source: nix::Error) -> Self {
        ShellError::Signal {
            cmd: cmd.to_string(),
            msg: msg.into(),
            source,
        }
    }

    pub fn io(cmd: &str, source: std::io::Error) -> Self {
        ShellError::Io {
            cmd: cmd.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_prefixed_with_command() {
        let err = ShellError::argument("kill", "invalid arguments");
        assert_eq!(err.to_string(), "kill: invalid arguments");

        let err = ShellError::signal("bg", "failed to continue", nix::Error::ESRCH);
        assert!(err.to_string().starts_with("bg: failed to continue: "));
    }
}
