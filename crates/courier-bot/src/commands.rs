use std::fmt;
use std::str::FromStr;

/// Every command the bot knows how to run. Which of them answer is decided
/// by the [`CommandRegistry`] built at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Echo,
    Help,
    Seen,
    Tell,
    /// Storage health probe.
    Test,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Echo,
        Command::Help,
        Command::Seen,
        Command::Tell,
        Command::Test,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Echo => "echo",
            Command::Help => "help",
            Command::Seen => "seen",
            Command::Tell => "tell",
            Command::Test => "test",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CommandError::Unknown(s.to_string()))
    }
}

/// The set of commands enabled for this deployment. Fixed after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRegistry {
    enabled: Vec<Command>,
}

impl CommandRegistry {
    /// Duplicates are dropped; first occurrence wins the position.
    pub fn new(commands: impl IntoIterator<Item = Command>) -> Self {
        let mut enabled = Vec::new();
        for command in commands {
            if !enabled.contains(&command) {
                enabled.push(command);
            }
        }
        Self { enabled }
    }

    /// Build from configured names such as `["echo", "Help", "tell"]`.
    /// Blank entries are skipped; an unknown name is an error.
    pub fn from_names<I, S>(names: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut commands = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            commands.push(name.parse()?);
        }
        Ok(Self::new(commands))
    }

    pub fn lookup(&self, name: &str) -> Option<Command> {
        name.parse::<Command>()
            .ok()
            .filter(|c| self.enabled.contains(c))
    }

    pub fn commands(&self) -> &[Command] {
        &self.enabled
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new([Command::Echo, Command::Help, Command::Seen, Command::Tell])
    }
}

/// A prefixed line split into a lowercased command name and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
}

/// Returns `None` for lines that don't start with `prefix` (after trimming)
/// or that contain nothing after it.
pub fn parse_invocation(text: &str, prefix: char) -> Option<Invocation> {
    let rest = text.trim().strip_prefix(prefix)?;
    let mut parts = rest.split_whitespace();
    let name = parts.next()?.to_lowercase();

    Some(Invocation {
        name,
        args: parts.map(str::to_owned).collect(),
    })
}
