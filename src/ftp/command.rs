//! # Command
//!
//! The subset of FTP commands understood by the stub server

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ftp commands with their arguments, as read from the control channel
pub(crate) enum Command {
    /// Change working directory
    Cwd(String),
    /// List stored file names, one per line
    List,
    /// List stored file names, CRLF separated
    Nlst,
    /// Provide login password
    Pass(String),
    /// Enter passive mode
    Pasv,
    /// Print working directory
    Pwd,
    /// Quit
    Quit,
    /// Retrieve stored file
    Retr(String),
    /// Store file
    Stor(String),
    /// Set transfer type; the argument is acknowledged but otherwise ignored
    Type(Option<String>),
    /// Provide user to login as
    User(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CommandError {
    #[error("command {0} not recognized")]
    Unknown(String),
    #[error("{0} requires an argument")]
    MissingArgument(&'static str),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.trim_end().splitn(2, ' ');
        let token = parts.next().unwrap_or_default();
        let argument = parts
            .next()
            .map(str::trim)
            .filter(|argument| !argument.is_empty());
        let required = |name| argument.map(str::to_string).ok_or(CommandError::MissingArgument(name));
        match token.to_ascii_uppercase().as_str() {
            "CWD" => required("CWD").map(Self::Cwd),
            // LIST and NLST accept an optional pathname, which the stub ignores
            "LIST" => Ok(Self::List),
            "NLST" => Ok(Self::Nlst),
            "PASS" => required("PASS").map(Self::Pass),
            "PASV" => Ok(Self::Pasv),
            "PWD" => Ok(Self::Pwd),
            "QUIT" => Ok(Self::Quit),
            "RETR" => required("RETR").map(Self::Retr),
            "STOR" => required("STOR").map(Self::Stor),
            "TYPE" => Ok(Self::Type(argument.map(str::to_string))),
            "USER" => required("USER").map(Self::User),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}
