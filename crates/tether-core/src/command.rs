//! Command schemas and remote command handles.
//!
//! A [`CommandSchema`] is the immutable descriptor a feature module declares
//! for a request-style command. The same value is sent to the platform when
//! the command is created, so it derives `Serialize`/`Deserialize`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Member permission bits, as understood by the platform.
pub type Permissions = u64;

/// Well-known permission bits.
pub mod permissions {
    use super::Permissions;

    pub const CREATE_INVITE: Permissions = 1 << 0;
    pub const KICK_MEMBERS: Permissions = 1 << 1;
    pub const BAN_MEMBERS: Permissions = 1 << 2;
    /// Grants every other permission.
    pub const ADMINISTRATOR: Permissions = 1 << 3;
    pub const MANAGE_CHANNELS: Permissions = 1 << 4;
    pub const MANAGE_GUILD: Permissions = 1 << 5;
    pub const SEND_MESSAGES: Permissions = 1 << 11;
    pub const MANAGE_MESSAGES: Permissions = 1 << 13;
}

/// The value type of a command option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    SubCommand,
    SubCommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Number,
}

impl OptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubCommand => "sub_command",
            Self::SubCommandGroup => "sub_command_group",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::User => "user",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Number => "number",
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of a single command option (or sub-command).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSchema {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    #[serde(default)]
    pub required: bool,
    /// Nested options; only meaningful for sub-commands and groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSchema>,
}

impl OptionSchema {
    pub fn new(kind: OptionKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
            options: Vec::new(),
        }
    }

    /// Marks the option as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Adds a nested option.
    pub fn option(mut self, option: OptionSchema) -> Self {
        self.options.push(option);
        self
    }
}

/// The descriptor of a request-style command.
///
/// # Example
///
/// ```rust
/// use tether_core::command::{CommandSchema, OptionKind, OptionSchema, permissions};
///
/// let schema = CommandSchema::new("purge", "Delete recent messages")
///     .option(OptionSchema::new(OptionKind::Integer, "count", "How many").required())
///     .permissions(permissions::MANAGE_MESSAGES);
///
/// assert_eq!(schema.name, "purge");
/// assert_eq!(schema.default_member_permissions, Some(permissions::MANAGE_MESSAGES));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSchema {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSchema>,
    /// Permission bits a member needs to see and invoke the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_member_permissions: Option<Permissions>,
}

impl CommandSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            default_member_permissions: None,
        }
    }

    pub fn option(mut self, option: OptionSchema) -> Self {
        self.options.push(option);
        self
    }

    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.default_member_permissions = Some(permissions);
        self
    }
}

/// The platform's identity for a registered command.
///
/// Not owned by this engine; it is only used to reconcile local
/// registrations against what the platform currently knows about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteCommand {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_wire_format_skips_empty_fields() {
        let schema = CommandSchema::new("ping", "Ping the bot");
        let json = serde_json::to_value(&schema).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "name": "ping", "description": "Ping the bot" })
        );
    }

    #[test]
    fn test_nested_sub_commands_deserialize() {
        let json = serde_json::json!({
            "name": "error-test",
            "description": "Development command",
            "default_member_permissions": 8,
            "options": [{
                "name": "reply",
                "description": "Reply first",
                "kind": "sub_command",
                "options": [{ "name": "ephemeral", "description": "Hide it", "kind": "boolean" }]
            }]
        });

        let schema: CommandSchema = serde_json::from_value(json).unwrap();
        assert_eq!(
            schema.default_member_permissions,
            Some(permissions::ADMINISTRATOR)
        );
        assert_eq!(schema.options[0].kind, OptionKind::SubCommand);
        assert_eq!(schema.options[0].options[0].kind, OptionKind::Boolean);
        assert!(!schema.options[0].options[0].required);
    }
}
