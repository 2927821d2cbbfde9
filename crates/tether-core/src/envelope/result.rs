use super::error::ExecError;
use super::object::{Object, ObjectType, Target};
use super::reply::Reply;

/// Payload carried by an [`ExecResult`]: a reply on success, an error otherwise.
#[derive(Debug, Clone)]
pub enum DataObject {
    Reply(Reply),
    Error(ExecError),
}

impl DataObject {
    pub fn object(&self) -> Object {
        match self {
            DataObject::Reply(reply) => reply.object(),
            DataObject::Error(error) => error.object(),
        }
    }
}

impl From<Reply> for DataObject {
    fn from(reply: Reply) -> Self {
        DataObject::Reply(reply)
    }
}

impl From<ExecError> for DataObject {
    fn from(error: ExecError) -> Self {
        DataObject::Error(error)
    }
}

/// Outcome of one execution. Owns at most one attached data object;
/// dropping the result drops whatever is still attached.
#[derive(Debug, Clone)]
pub struct ExecResult {
    object: Object,
    data: Option<DataObject>,
}

impl ExecResult {
    pub fn new(target: Target) -> Self {
        Self {
            object: Object::new(ObjectType::Result, target),
            data: None,
        }
    }

    pub fn with_reply(reply: Reply) -> Self {
        let mut result = Self::new(reply.object().target());
        result.data = Some(DataObject::Reply(reply));
        result
    }

    pub fn with_error(error: ExecError) -> Self {
        let mut result = Self::new(error.target());
        result.data = Some(DataObject::Error(error));
        result
    }

    pub fn object(&self) -> Object {
        self.object
    }

    pub fn target(&self) -> Target {
        self.object.target()
    }

    /// Transfers ownership of `data` into the result. The slot must be empty;
    /// otherwise `data` is handed back untouched.
    pub fn attach_data_object(&mut self, data: impl Into<DataObject>) -> Result<(), DataObject> {
        let data = data.into();
        if self.data.is_some() {
            return Err(data);
        }
        self.data = Some(data);
        Ok(())
    }

    /// Takes the attached object back out, leaving the slot empty.
    pub fn detach_data_object(&mut self) -> Option<DataObject> {
        self.data.take()
    }

    pub fn data_objects_count(&self) -> usize {
        usize::from(self.data.is_some())
    }

    pub fn data_object(&self) -> Option<&DataObject> {
        self.data.as_ref()
    }

    pub fn data_object_mut(&mut self) -> Option<&mut DataObject> {
        self.data.as_mut()
    }

    pub fn reply(&self) -> Option<&Reply> {
        match &self.data {
            Some(DataObject::Reply(reply)) => Some(reply),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ExecError> {
        match &self.data {
            Some(DataObject::Error(error)) => Some(error),
            _ => None,
        }
    }

    pub fn into_reply(self) -> Option<Reply> {
        match self.data {
            Some(DataObject::Reply(reply)) => Some(reply),
            _ => None,
        }
    }
}
