//! Host OS command execution

pub mod command;
pub mod process;
pub mod tokenize;

pub use self::command::{AuthorizedBy, AuthorizedCommand, HostCommandExecutor};
pub use self::process::{run_with_timeout, ProcessOutput};
pub use self::tokenize::{find_shell_metacharacter, tokenize, ParsedCommand};
