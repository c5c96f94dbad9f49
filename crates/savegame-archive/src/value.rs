use std::collections::BTreeMap;

use savegame_types::{ObjectHandle, ObjectPath};
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, ArchiveResult};
use crate::structured::{Archivable, Slot};

/// A reference to another object.
///
/// While saving the live `handle` (when set) wins over `path`. After loading,
/// `path` holds the redirected path and `handle` the object it resolved to,
/// or `None` if nothing could be resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub path: ObjectPath,
    #[serde(skip)]
    pub handle: Option<ObjectHandle>,
}

impl ObjectRef {
    pub fn null() -> Self {
        Self::default()
    }

    pub fn from_handle(handle: ObjectHandle) -> Self {
        Self {
            path: ObjectPath::null(),
            handle: Some(handle),
        }
    }

    pub fn from_path(path: ObjectPath) -> Self {
        Self { path, handle: None }
    }

    pub fn is_null(&self) -> bool {
        self.handle.is_none() && self.path.is_null()
    }
}

/// Persistence flags of a named item passed to
/// [`SaveGameArchive::serialize_item`](crate::SaveGameArchive::serialize_item).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropertyFlags {
    pub editable: bool,
    pub read_only: bool,
}

impl PropertyFlags {
    pub const EDITABLE: Self = Self {
        editable: true,
        read_only: false,
    };

    pub const READ_ONLY: Self = Self {
        editable: true,
        read_only: true,
    };

    pub fn is_persistable(&self) -> bool {
        self.editable && !self.read_only
    }
}

/// Dynamically typed value of a persistable field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Vector([f64; 3]),
    Object(ObjectRef),
    Array(Vec<PropertyValue>),
    Struct(BTreeMap<String, PropertyValue>),
}

impl Default for PropertyValue {
    fn default() -> Self {
        Self::Bool(false)
    }
}

impl PropertyValue {
    /// Wire tag of this variant.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Str(_) => 4,
            Self::Name(_) => 5,
            Self::Vector(_) => 6,
            Self::Object(_) => 7,
            Self::Array(_) => 8,
            Self::Struct(_) => 9,
        }
    }

    /// Empty value of the variant with wire tag `tag`.
    pub fn empty_for_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Bool(false),
            2 => Self::Int(0),
            3 => Self::Float(0.0),
            4 => Self::Str(String::new()),
            5 => Self::Name(String::new()),
            6 => Self::Vector([0.0; 3]),
            7 => Self::Object(ObjectRef::null()),
            8 => Self::Array(Vec::new()),
            9 => Self::Struct(BTreeMap::new()),
            _ => return None,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Name(_) => "name",
            Self::Vector(_) => "vector",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Struct(_) => "struct",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) | Self::Name(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(r) => Some(r),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<ObjectRef> for PropertyValue {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

impl Archivable for PropertyValue {
    fn archive(&mut self, mut slot: Slot<'_>) -> ArchiveResult<()> {
        // Text output is self-describing, binary carries a one-byte tag.
        if !slot.is_text() {
            let stream = slot.archive().proxy_mut().stream_mut();
            if stream.is_loading() {
                let offset = stream.tell();
                let tag = stream.read_u8()?;
                *self = Self::empty_for_tag(tag)
                    .ok_or(ArchiveError::UnknownPropertyTag { offset, tag })?;
            } else {
                stream.write_u8(self.tag());
            }
        }

        match self {
            Self::Bool(v) => slot.bool(v),
            Self::Int(v) => slot.i64(v),
            Self::Float(v) => slot.f64(v),
            Self::Str(v) | Self::Name(v) => slot.string(v),
            Self::Vector(v) => {
                let offset = slot.archive().tell();
                let mut count = 3;
                let mut array = slot.array(&mut count)?;
                if count != 3 {
                    return Err(ArchiveError::Malformed {
                        offset,
                        reason: format!("vector has {count} components"),
                    });
                }
                for component in v.iter_mut() {
                    array.element().f64(component)?;
                }
                Ok(())
            }
            Self::Object(r) => slot.object_ref(r),
            Self::Array(items) => slot.value(items),
            Self::Struct(fields) => {
                let mut count = fields.len() as i32;
                let loading = slot.is_loading();
                let mut map = slot.map(&mut count)?;
                if loading {
                    for _ in 0..count {
                        let mut key = String::new();
                        let mut value = PropertyValue::default();
                        map.element(&mut key)?.value(&mut value)?;
                        fields.insert(key, value);
                    }
                } else {
                    for (key, value) in fields.iter_mut() {
                        let mut key = key.clone();
                        map.element(&mut key)?.value(value)?;
                    }
                }
                Ok(())
            }
        }
    }
}
