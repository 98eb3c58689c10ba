//! Inbound command interactions.
//!
//! An [`Interaction`] is what the platform delivers when a user invokes a
//! command. Handlers read the supplied options through the [`OptionLookup`]
//! helpers:
//!
//! ```rust
//! use tether_core::interaction::{Interaction, InteractionOption, OptionLookup, OptionValue};
//!
//! let interaction = Interaction::new("1", "roll")
//!     .with_option(InteractionOption::new("sides", OptionValue::Integer(20)));
//!
//! assert_eq!(interaction.options.integer_option("sides"), Ok(20));
//! assert_eq!(interaction.options.integer_option_or("dice", 1), 1);
//! ```

use serde::{Deserialize, Serialize};

use crate::command::{OptionKind, Permissions};
use crate::error::{OptionError, OptionResult};

// ============================================================================
// Option Values
// ============================================================================

/// A value supplied for a command option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    /// A sub-command selection, carrying the sub-command's own options.
    SubCommand(Vec<InteractionOption>),
    String(String),
    Integer(i64),
    Boolean(bool),
    Number(f64),
}

impl OptionValue {
    /// Returns the schema kind of this value.
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::SubCommand(_) => OptionKind::SubCommand,
            Self::String(_) => OptionKind::String,
            Self::Integer(_) => OptionKind::Integer,
            Self::Boolean(_) => OptionKind::Boolean,
            Self::Number(_) => OptionKind::Number,
        }
    }
}

/// A named option value from an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOption {
    pub name: String,
    pub value: OptionValue,
}

impl InteractionOption {
    pub fn new(name: impl Into<String>, value: OptionValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

// ============================================================================
// Option Lookup
// ============================================================================

/// Typed lookups over a list of interaction options.
///
/// The plain variants fail with [`OptionError::NotFound`] when the option is
/// missing and [`OptionError::UnexpectedType`] when it carries a different
/// type. The `_or` variants fall back to the default in both cases.
pub trait OptionLookup {
    /// Finds an option by name.
    fn find_option(&self, name: &str) -> Option<&InteractionOption>;

    fn string_option(&self, name: &str) -> OptionResult<String> {
        match &self.lookup(name)?.value {
            OptionValue::String(value) => Ok(value.clone()),
            other => Err(mismatch(name, OptionKind::String, other)),
        }
    }

    fn string_option_or(&self, name: &str, default: impl Into<String>) -> String {
        self.string_option(name).unwrap_or_else(|_| default.into())
    }

    fn integer_option(&self, name: &str) -> OptionResult<i64> {
        match &self.lookup(name)?.value {
            OptionValue::Integer(value) => Ok(*value),
            other => Err(mismatch(name, OptionKind::Integer, other)),
        }
    }

    fn integer_option_or(&self, name: &str, default: i64) -> i64 {
        self.integer_option(name).unwrap_or(default)
    }

    fn boolean_option(&self, name: &str) -> OptionResult<bool> {
        match &self.lookup(name)?.value {
            OptionValue::Boolean(value) => Ok(*value),
            other => Err(mismatch(name, OptionKind::Boolean, other)),
        }
    }

    fn boolean_option_or(&self, name: &str, default: bool) -> bool {
        self.boolean_option(name).unwrap_or(default)
    }

    #[doc(hidden)]
    fn lookup(&self, name: &str) -> OptionResult<&InteractionOption> {
        self.find_option(name)
            .ok_or_else(|| OptionError::NotFound(name.to_string()))
    }
}

impl OptionLookup for [InteractionOption] {
    fn find_option(&self, name: &str) -> Option<&InteractionOption> {
        self.iter().find(|option| option.name == name)
    }
}

impl OptionLookup for Vec<InteractionOption> {
    fn find_option(&self, name: &str) -> Option<&InteractionOption> {
        self.as_slice().find_option(name)
    }
}

fn mismatch(name: &str, expected: OptionKind, got: &OptionValue) -> OptionError {
    OptionError::UnexpectedType {
        name: name.to_string(),
        expected,
        got: got.kind(),
    }
}

// ============================================================================
// Interaction
// ============================================================================

/// A command invocation delivered by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub command_name: String,
    #[serde(default)]
    pub options: Vec<InteractionOption>,
    pub user_id: Option<String>,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    /// Resolved permission bits of the invoking member, if invoked in a guild.
    pub member_permissions: Option<Permissions>,
}

impl Interaction {
    pub fn new(id: impl Into<String>, command_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command_name: command_name.into(),
            options: Vec::new(),
            user_id: None,
            guild_id: None,
            channel_id: None,
            member_permissions: None,
        }
    }

    pub fn with_option(mut self, option: InteractionOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.member_permissions = Some(permissions);
        self
    }

    /// Returns the selected sub-command name and its options, if the first
    /// option is a sub-command.
    pub fn subcommand(&self) -> Option<(&str, &[InteractionOption])> {
        match self.options.first() {
            Some(InteractionOption {
                name,
                value: OptionValue::SubCommand(options),
            }) => Some((name.as_str(), options.as_slice())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Interaction {
        Interaction::new("42", "greet")
            .with_option(InteractionOption::new(
                "name",
                OptionValue::String("ferris".into()),
            ))
            .with_option(InteractionOption::new("loud", OptionValue::Boolean(true)))
    }

    #[test]
    fn test_typed_lookups() {
        let interaction = sample();

        assert_eq!(interaction.options.string_option("name").unwrap(), "ferris");
        assert!(interaction.options.boolean_option("loud").unwrap());
    }

    #[test]
    fn test_missing_option() {
        let interaction = sample();

        assert_eq!(
            interaction.options.integer_option("count"),
            Err(OptionError::NotFound("count".into()))
        );
        assert_eq!(interaction.options.integer_option_or("count", 3), 3);
        assert_eq!(interaction.options.string_option_or("title", "none"), "none");
    }

    #[test]
    fn test_mistyped_option() {
        let interaction = sample();

        assert_eq!(
            interaction.options.integer_option("name"),
            Err(OptionError::UnexpectedType {
                name: "name".into(),
                expected: OptionKind::Integer,
                got: OptionKind::String,
            })
        );
        assert!(!interaction.options.boolean_option_or("name", false));
    }

    #[test]
    fn test_subcommand() {
        let interaction = Interaction::new("1", "error-test").with_option(InteractionOption::new(
            "reply",
            OptionValue::SubCommand(vec![InteractionOption::new(
                "ephemeral",
                OptionValue::Boolean(true),
            )]),
        ));

        let (name, options) = interaction.subcommand().unwrap();
        assert_eq!(name, "reply");
        assert_eq!(options.boolean_option("ephemeral"), Ok(true));
        assert!(sample().subcommand().is_none());
    }
}
