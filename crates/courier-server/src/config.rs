use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use courier_bot::{BotSettings, CommandRegistry};
use courier_types::events::is_channel_name;

use crate::irc::client::IrcConfig;

/// Everything the binary needs, read from `COURIER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub irc: IrcConfig,
    pub db_path: PathBuf,
    pub registry: CommandRegistry,
    pub settings: BotSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let channels: Vec<String> = var("COURIER_CHANNELS", "#courier-test")
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if channels.is_empty() {
            bail!("COURIER_CHANNELS must name at least one channel");
        }
        if let Some(bad) = channels.iter().find(|c| !is_channel_name(c)) {
            bail!("COURIER_CHANNELS entry '{}' is not a channel name", bad);
        }

        let prefix = parse_prefix(&var("COURIER_PREFIX", "."))?;
        let mention_reply = parse_bool(&var("COURIER_MENTION_REPLY", "false"))
            .context("COURIER_MENTION_REPLY")?;

        let registry = CommandRegistry::from_names(var("COURIER_COMMANDS", "echo,help,seen,tell").split(','))
            .context("COURIER_COMMANDS")?;

        Ok(Self {
            irc: IrcConfig {
                server: var("COURIER_SERVER", "irc.libera.chat:6667"),
                nick: var("COURIER_NICK", "courier"),
                ident: var("COURIER_IDENT", "courier"),
                realname: var("COURIER_REALNAME", "Courier message bot"),
                channels,
            },
            db_path: var("COURIER_DB_PATH", "courier.db").into(),
            registry,
            settings: BotSettings {
                prefix,
                mention_reply,
            },
        })
    }
}

fn parse_prefix(raw: &str) -> Result<char> {
    let mut chars = raw.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => bail!("COURIER_PREFIX must be exactly one character, got '{}'", raw),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use courier_bot::Command;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.irc.server, "irc.libera.chat:6667");
        assert_eq!(config.irc.nick, "courier");
        assert_eq!(config.irc.channels, vec!["#courier-test"]);
        assert_eq!(config.db_path, PathBuf::from("courier.db"));
        assert_eq!(config.settings.prefix, '.');
        assert!(!config.settings.mention_reply);
        assert_eq!(config.registry, CommandRegistry::default());
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("COURIER_CHANNELS", "#a, &b ,"),
            ("COURIER_PREFIX", "!"),
            ("COURIER_MENTION_REPLY", "yes"),
            ("COURIER_COMMANDS", "echo,help,test"),
            ("COURIER_NICK", "postman"),
        ])
        .unwrap();
        assert_eq!(config.irc.channels, vec!["#a", "&b"]);
        assert_eq!(config.irc.nick, "postman");
        assert_eq!(config.settings.prefix, '!');
        assert!(config.settings.mention_reply);
        assert_eq!(
            config.registry.commands(),
            &[Command::Echo, Command::Help, Command::Test]
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("COURIER_PREFIX", "!!")]).is_err());
        assert!(load(&[("COURIER_PREFIX", "")]).is_err());
        assert!(load(&[("COURIER_MENTION_REPLY", "maybe")]).is_err());
        assert!(load(&[("COURIER_COMMANDS", "echo,karaoke")]).is_err());
        assert!(load(&[("COURIER_CHANNELS", "lobby")]).is_err());
        assert!(load(&[("COURIER_CHANNELS", " , ")]).is_err());
    }
}
