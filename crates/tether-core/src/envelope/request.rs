use super::object::{Object, ObjectType, Target};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a request is dispatched. Only one-shot execution exists today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    OneShot,
}

/// An HTTP transfer description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    /// Per-transfer timeout, overriding the device's operation timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
            timeout: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// SQL text sent through the simple query protocol; may hold several statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlQuery {
    pub text: String,
}

/// A queue command such as `INCR counter` or `LPUSH jobs payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueCommand {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum RequestPayload {
    Http(HttpRequest),
    Sql(SqlQuery),
    Queue(QueueCommand),
}

impl RequestPayload {
    pub fn target(&self) -> Target {
        match self {
            RequestPayload::Http(_) => Target::Http,
            RequestPayload::Sql(_) => Target::PostgreSql,
            RequestPayload::Queue(_) => Target::Redis,
        }
    }
}

/// A protocol request. Owned by the caller; devices only borrow it during `execute`.
#[derive(Debug, Clone)]
pub struct Request {
    object: Object,
    mode: Mode,
    payload: RequestPayload,
}

impl Request {
    pub fn new(payload: RequestPayload) -> Self {
        Self {
            object: Object::new(ObjectType::Request, payload.target()),
            mode: Mode::OneShot,
            payload,
        }
    }

    pub fn http(request: HttpRequest) -> Self {
        Self::new(RequestPayload::Http(request))
    }

    pub fn sql(text: impl Into<String>) -> Self {
        Self::new(RequestPayload::Sql(SqlQuery { text: text.into() }))
    }

    pub fn queue<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RequestPayload::Queue(QueueCommand {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }))
    }

    pub fn object(&self) -> Object {
        self.object
    }

    pub fn target(&self) -> Target {
        self.object.target()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn payload(&self) -> &RequestPayload {
        &self.payload
    }
}
