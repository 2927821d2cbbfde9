use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of payload an envelope object carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Request,
    Reply,
    Result,
    Error,
    Value,
}

/// Protocol family an envelope object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    NotSet,
    Redis,
    PostgreSql,
    Http,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::NotSet => "not_set",
            Target::Redis => "redis",
            Target::PostgreSql => "postgresql",
            Target::Http => "http",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable `{type, target}` tag shared by every envelope object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Object {
    kind: ObjectType,
    target: Target,
}

impl Object {
    pub const fn new(kind: ObjectType, target: Target) -> Self {
        Self { kind, target }
    }

    pub fn kind(&self) -> ObjectType {
        self.kind
    }

    pub fn target(&self) -> Target {
        self.target
    }
}
