use super::object::{Object, ObjectType, Target};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// A completed HTTP transfer. Any status code counts as a reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpReply {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Round-trip time from submission to the last body byte.
    pub rtt: Duration,
}

impl HttpReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Execution status of one SQL result set, named after the server protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlExecStatus {
    EmptyQuery,
    CommandOk,
    TuplesOk,
    BadResponse,
    NonfatalError,
    FatalError,
}

impl SqlExecStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SqlExecStatus::EmptyQuery | SqlExecStatus::CommandOk | SqlExecStatus::TuplesOk
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SqlExecStatus::EmptyQuery => "PGRES_EMPTY_QUERY",
            SqlExecStatus::CommandOk => "PGRES_COMMAND_OK",
            SqlExecStatus::TuplesOk => "PGRES_TUPLES_OK",
            SqlExecStatus::BadResponse => "PGRES_BAD_RESPONSE",
            SqlExecStatus::NonfatalError => "PGRES_NONFATAL_ERROR",
            SqlExecStatus::FatalError => "PGRES_FATAL_ERROR",
        }
    }
}

/// One table-shaped result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub rows_affected: u64,
}

impl SqlTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell at `row`, column `name`.
    pub fn value(&self, row: usize, name: &str) -> Option<&JsonValue> {
        let column = self.columns.iter().position(|c| c == name)?;
        self.rows.get(row)?.get(column)
    }
}

/// All result sets produced by one SQL execution, in statement order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlReply {
    pub tables: Vec<SqlTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum QueueValue {
    Nil,
    Int(i64),
    Data(Vec<u8>),
    Bulk(Vec<QueueValue>),
    Status(String),
    Okay,
}

impl QueueValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            QueueValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            QueueValue::Nil => JsonValue::Null,
            QueueValue::Int(value) => JsonValue::from(*value),
            QueueValue::Data(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
            QueueValue::Bulk(items) => JsonValue::Array(items.iter().map(|v| v.to_json()).collect()),
            QueueValue::Status(status) => JsonValue::String(status.clone()),
            QueueValue::Okay => JsonValue::String("OK".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueReply {
    pub value: QueueValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ReplyPayload {
    Http(HttpReply),
    Sql(SqlReply),
    Queue(QueueReply),
}

impl ReplyPayload {
    fn target(&self) -> Target {
        match self {
            ReplyPayload::Http(_) => Target::Http,
            ReplyPayload::Sql(_) => Target::PostgreSql,
            ReplyPayload::Queue(_) => Target::Redis,
        }
    }
}

/// Successful protocol reply attached to an [`ExecResult`](super::ExecResult).
#[derive(Debug, Clone)]
pub struct Reply {
    object: Object,
    payload: ReplyPayload,
}

impl Reply {
    pub fn new(payload: ReplyPayload) -> Self {
        Self {
            object: Object::new(ObjectType::Reply, payload.target()),
            payload,
        }
    }

    pub fn object(&self) -> Object {
        self.object
    }

    pub fn payload(&self) -> &ReplyPayload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut ReplyPayload {
        &mut self.payload
    }

    pub fn into_payload(self) -> ReplyPayload {
        self.payload
    }

    pub fn as_http(&self) -> Option<&HttpReply> {
        match &self.payload {
            ReplyPayload::Http(reply) => Some(reply),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> Option<&SqlReply> {
        match &self.payload {
            ReplyPayload::Sql(reply) => Some(reply),
            _ => None,
        }
    }

    pub fn as_queue(&self) -> Option<&QueueReply> {
        match &self.payload {
            ReplyPayload::Queue(reply) => Some(reply),
            _ => None,
        }
    }

    /// JSON rendering used by the CLI and by logging.
    pub fn to_json(&self) -> JsonValue {
        match &self.payload {
            ReplyPayload::Http(reply) => serde_json::json!({
                "status_code": reply.status_code,
                "headers": reply.headers.iter().map(|(k, v)| (k.clone(), JsonValue::String(v.clone()))).collect::<serde_json::Map<_, _>>(),
                "body": reply.body_text(),
                "rtt_ms": reply.rtt.as_millis() as u64,
            }),
            ReplyPayload::Sql(reply) => serde_json::json!({
                "tables": reply.tables.iter().map(|t| serde_json::json!({
                    "columns": t.columns,
                    "rows": t.rows,
                    "rows_affected": t.rows_affected,
                })).collect::<Vec<_>>(),
            }),
            ReplyPayload::Queue(reply) => reply.value.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_table_lookup() {
        let table = SqlTable {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![vec![JsonValue::from(7), JsonValue::from("seven")]],
            rows_affected: 1,
        };
        assert_eq!(table.value(0, "name"), Some(&JsonValue::from("seven")));
        assert_eq!(table.value(0, "missing"), None);
        assert_eq!(table.value(1, "id"), None);
    }

    #[test]
    fn test_http_header_lookup_is_case_insensitive() {
        let reply = HttpReply {
            status_code: 200,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: b"ok".to_vec(),
            rtt: Duration::from_millis(3),
        };
        assert_eq!(reply.header("content-type"), Some("text/plain"));
        assert_eq!(reply.body_text(), "ok");
    }

    #[test]
    fn test_queue_value_json() {
        let value = QueueValue::Bulk(vec![QueueValue::Int(1), QueueValue::Nil, QueueValue::Okay]);
        assert_eq!(value.to_json(), serde_json::json!([1, null, "OK"]));
    }
}
