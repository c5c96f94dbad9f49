//! Structured archive: records, named fields, arrays and maps over either a
//! binary stream or a JSON text tree.
//!
//! The binary form carries no structure of its own. Field names are not
//! written, arrays and maps are an `i32` count followed by their elements,
//! and map keys are strings. The text form is save-only and produces a JSON
//! document mirroring the record structure.
//!
//! Scopes are closed when their handle is dropped.

use std::sync::Arc;

use savegame_types::{ClassPath, ObjectPath, SpawnId, VersionTagId};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ArchiveError, ArchiveResult};
use crate::proxy::{ObjectResolver, ProxyArchive};
use crate::stream::MemoryStream;
use crate::value::ObjectRef;
use crate::version::{CustomVersionContainer, VersionRegistry, NO_VERSION};

/// A value that can be written to and read from a [`Slot`].
pub trait Archivable {
    fn archive(&mut self, slot: Slot<'_>) -> ArchiveResult<()>;
}

/// Archive over a stream, with the custom version table of the snapshot
/// being written or read.
pub struct StructuredArchive {
    proxy: ProxyArchive,
    text: Option<TextTree>,
    versions: CustomVersionContainer,
    registry: Arc<VersionRegistry>,
}

impl StructuredArchive {
    pub fn binary_writer(resolver: Arc<dyn ObjectResolver>) -> Self {
        Self::with_parts(MemoryStream::writer(), resolver, None)
    }

    pub fn binary_reader(data: Vec<u8>, resolver: Arc<dyn ObjectResolver>) -> Self {
        Self::with_parts(MemoryStream::reader(data), resolver, None)
    }

    pub fn text_writer(resolver: Arc<dyn ObjectResolver>) -> Self {
        Self::with_parts(MemoryStream::writer(), resolver, Some(TextTree::new()))
    }

    fn with_parts(
        stream: MemoryStream,
        resolver: Arc<dyn ObjectResolver>,
        text: Option<TextTree>,
    ) -> Self {
        Self {
            proxy: ProxyArchive::new(stream, resolver),
            text,
            versions: CustomVersionContainer::new(),
            registry: VersionRegistry::global(),
        }
    }

    /// Use `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: Arc<VersionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn is_loading(&self) -> bool {
        self.proxy.is_loading()
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn proxy(&self) -> &ProxyArchive {
        &self.proxy
    }

    pub fn proxy_mut(&mut self) -> &mut ProxyArchive {
        &mut self.proxy
    }

    /// Current byte position. Always 0 for text archives.
    pub fn tell(&self) -> u64 {
        self.proxy.tell()
    }

    pub fn seek(&mut self, position: u64) -> ArchiveResult<()> {
        self.proxy.seek(position)
    }

    /// A bare slot at the current position.
    pub fn slot(&mut self) -> Slot<'_> {
        Slot { ar: self }
    }

    /// Open the root record.
    pub fn root(&mut self) -> Record<'_> {
        self.slot().record()
    }

    pub fn registry(&self) -> &Arc<VersionRegistry> {
        &self.registry
    }

    pub fn versions(&self) -> &CustomVersionContainer {
        &self.versions
    }

    pub fn set_versions(&mut self, versions: CustomVersionContainer) {
        self.versions = versions;
    }

    /// Version of `tag` for the data being serialized.
    ///
    /// When saving this is the tag's latest version, recorded in the
    /// archive's version table. When loading it is the version stored in the
    /// snapshot, or [`NO_VERSION`] if the snapshot predates the tag.
    /// Unregistered tags always yield [`NO_VERSION`].
    pub fn custom_version(&mut self, tag: &str) -> i32 {
        let Some((id, latest)) = self.registry.lookup(tag) else {
            warn!(tag, "custom version tag is not registered");
            return NO_VERSION;
        };
        if self.is_loading() {
            self.versions.get(&id).unwrap_or(NO_VERSION)
        } else {
            self.versions.register(id, latest)
        }
    }

    /// Record `id` at `latest` when saving, if it is not already present.
    pub fn using_custom_version(&mut self, id: VersionTagId, latest: i32) {
        if !self.is_loading() {
            self.versions.register(id, latest);
        }
    }

    /// The written bytes: the binary stream, or pretty-printed JSON.
    pub fn finish(self) -> ArchiveResult<Vec<u8>> {
        match self.text {
            Some(tree) => serde_json::to_vec_pretty(&tree.into_value())
                .map_err(|e| ArchiveError::Serialization(e.to_string())),
            None => Ok(self.proxy.into_stream().into_inner()),
        }
    }
}

/// A position in the archive that holds exactly one value.
pub struct Slot<'a> {
    ar: &'a mut StructuredArchive,
}

macro_rules! scalar {
    ($name:ident, $ty:ty, $write:ident, $read:ident) => {
        pub fn $name(self, value: &mut $ty) -> ArchiveResult<()> {
            if let Some(text) = self.ar.text.as_mut() {
                text.emit(Value::from(*value));
                return Ok(());
            }
            let stream = self.ar.proxy.stream_mut();
            if stream.is_loading() {
                *value = stream.$read()?;
            } else {
                stream.$write(*value);
            }
            Ok(())
        }
    };
}

impl<'a> Slot<'a> {
    pub fn is_loading(&self) -> bool {
        self.ar.is_loading()
    }

    pub fn is_text(&self) -> bool {
        self.ar.is_text()
    }

    pub fn archive(&mut self) -> &mut StructuredArchive {
        self.ar
    }

    scalar!(bool, bool, write_bool, read_bool);
    scalar!(u8, u8, write_u8, read_u8);
    scalar!(i32, i32, write_i32, read_i32);
    scalar!(u32, u32, write_u32, read_u32);
    scalar!(i64, i64, write_i64, read_i64);
    scalar!(u64, u64, write_u64, read_u64);
    scalar!(f32, f32, write_f32, read_f32);
    scalar!(f64, f64, write_f64, read_f64);

    pub fn string(self, value: &mut String) -> ArchiveResult<()> {
        if let Some(text) = self.ar.text.as_mut() {
            text.emit(Value::String(value.clone()));
            return Ok(());
        }
        let stream = self.ar.proxy.stream_mut();
        if stream.is_loading() {
            *value = stream.read_string()?;
        } else {
            stream.write_string(value);
        }
        Ok(())
    }

    /// Sixteen raw bytes, written as lowercase hex in text form.
    pub fn bytes16(self, value: &mut [u8; 16]) -> ArchiveResult<()> {
        if let Some(text) = self.ar.text.as_mut() {
            let hex: String = value.iter().map(|b| format!("{b:02x}")).collect();
            text.emit(Value::String(hex));
            return Ok(());
        }
        let stream = self.ar.proxy.stream_mut();
        if stream.is_loading() {
            *value = stream.read_array16()?;
        } else {
            stream.write_array16(value);
        }
        Ok(())
    }

    pub fn object_path(self, path: &mut ObjectPath) -> ArchiveResult<()> {
        if let Some(text) = self.ar.text.as_mut() {
            text.emit(Value::String(path.to_string()));
            return Ok(());
        }
        self.ar.proxy.serialize_object_path(path)
    }

    pub fn object_ref(self, r: &mut ObjectRef) -> ArchiveResult<()> {
        if self.ar.text.is_some() {
            let path = self.ar.proxy.path_for(r);
            if let Some(text) = self.ar.text.as_mut() {
                text.emit(Value::String(path.to_string()));
            }
            return Ok(());
        }
        self.ar.proxy.serialize_object_ref(r)
    }

    pub fn value<T: Archivable + ?Sized>(self, value: &mut T) -> ArchiveResult<()> {
        value.archive(self)
    }

    pub fn record(self) -> Record<'a> {
        if let Some(text) = self.ar.text.as_mut() {
            text.push(TextFrame::object());
        }
        Record { ar: self.ar }
    }

    /// Open an array of `count` elements. When loading, `count` is replaced
    /// by the stored element count.
    pub fn array(mut self, count: &mut i32) -> ArchiveResult<ArrayScope<'a>> {
        self.open_sequence(count, TextFrame::Array(Vec::new()))?;
        Ok(ArrayScope { ar: self.ar })
    }

    /// Open a string-keyed map of `count` entries. When loading, `count` is
    /// replaced by the stored entry count.
    pub fn map(mut self, count: &mut i32) -> ArchiveResult<MapScope<'a>> {
        self.open_sequence(count, TextFrame::object())?;
        Ok(MapScope { ar: self.ar })
    }

    fn open_sequence(&mut self, count: &mut i32, frame: TextFrame) -> ArchiveResult<()> {
        if let Some(text) = self.ar.text.as_mut() {
            text.push(frame);
            return Ok(());
        }
        let stream = self.ar.proxy.stream_mut();
        if stream.is_loading() {
            *count = stream.read_count()? as i32;
        } else {
            stream.write_i32(*count);
        }
        Ok(())
    }
}

/// A record: a sequence of named fields.
pub struct Record<'a> {
    ar: &'a mut StructuredArchive,
}

impl Record<'_> {
    pub fn is_loading(&self) -> bool {
        self.ar.is_loading()
    }

    pub fn is_text(&self) -> bool {
        self.ar.is_text()
    }

    pub fn archive(&mut self) -> &mut StructuredArchive {
        self.ar
    }

    pub fn field(&mut self, name: &str) -> Slot<'_> {
        if let Some(text) = self.ar.text.as_mut() {
            text.set_key(name);
        }
        Slot { ar: self.ar }
    }

    /// A field that may be absent.
    ///
    /// Binary archives store a presence flag before the value. Text archives
    /// simply omit absent fields. Returns the slot when the field is present.
    pub fn try_field(
        &mut self,
        name: &str,
        present_when_saving: bool,
    ) -> ArchiveResult<Option<Slot<'_>>> {
        let present = if self.ar.is_text() {
            present_when_saving
        } else {
            let stream = self.ar.proxy.stream_mut();
            if stream.is_loading() {
                stream.read_bool()?
            } else {
                stream.write_bool(present_when_saving);
                present_when_saving
            }
        };
        if present {
            Ok(Some(self.field(name)))
        } else {
            Ok(None)
        }
    }
}

impl Drop for Record<'_> {
    fn drop(&mut self) {
        if let Some(text) = self.ar.text.as_mut() {
            text.pop();
        }
    }
}

pub struct ArrayScope<'a> {
    ar: &'a mut StructuredArchive,
}

impl ArrayScope<'_> {
    pub fn element(&mut self) -> Slot<'_> {
        Slot { ar: self.ar }
    }

    pub fn archive(&mut self) -> &mut StructuredArchive {
        self.ar
    }
}

impl Drop for ArrayScope<'_> {
    fn drop(&mut self) {
        if let Some(text) = self.ar.text.as_mut() {
            text.pop();
        }
    }
}

pub struct MapScope<'a> {
    ar: &'a mut StructuredArchive,
}

impl MapScope<'_> {
    /// Serialize an entry's key and return the slot for its value.
    pub fn element(&mut self, key: &mut String) -> ArchiveResult<Slot<'_>> {
        if let Some(text) = self.ar.text.as_mut() {
            text.set_key(key);
        } else {
            let stream = self.ar.proxy.stream_mut();
            if stream.is_loading() {
                *key = stream.read_string()?;
            } else {
                stream.write_string(key);
            }
        }
        Ok(Slot { ar: self.ar })
    }

    pub fn archive(&mut self) -> &mut StructuredArchive {
        self.ar
    }
}

impl Drop for MapScope<'_> {
    fn drop(&mut self) {
        if let Some(text) = self.ar.text.as_mut() {
            text.pop();
        }
    }
}

enum TextFrame {
    Root(Option<Value>),
    Object {
        fields: Map<String, Value>,
        key: Option<String>,
    },
    Array(Vec<Value>),
}

impl TextFrame {
    fn object() -> Self {
        Self::Object {
            fields: Map::new(),
            key: None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Root(value) => value.unwrap_or(Value::Null),
            Self::Object { fields, .. } => Value::Object(fields),
            Self::Array(items) => Value::Array(items),
        }
    }
}

/// Stack of JSON values under construction.
struct TextTree {
    frames: Vec<TextFrame>,
}

impl TextTree {
    fn new() -> Self {
        Self {
            frames: vec![TextFrame::Root(None)],
        }
    }

    fn set_key(&mut self, name: &str) {
        if let Some(TextFrame::Object { key, .. }) = self.frames.last_mut() {
            *key = Some(name.to_string());
        }
    }

    fn emit(&mut self, value: Value) {
        match self.frames.last_mut() {
            Some(TextFrame::Root(slot)) => *slot = Some(value),
            Some(TextFrame::Object { fields, key }) => {
                fields.insert(key.take().unwrap_or_default(), value);
            }
            Some(TextFrame::Array(items)) => items.push(value),
            None => {}
        }
    }

    fn push(&mut self, frame: TextFrame) {
        self.frames.push(frame);
    }

    fn pop(&mut self) {
        if self.frames.len() > 1 {
            if let Some(frame) = self.frames.pop() {
                self.emit(frame.into_value());
            }
        }
    }

    fn into_value(mut self) -> Value {
        while self.frames.len() > 1 {
            self.pop();
        }
        self.frames
            .pop()
            .map(TextFrame::into_value)
            .unwrap_or(Value::Null)
    }
}

macro_rules! archivable_scalar {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl Archivable for $ty {
                fn archive(&mut self, slot: Slot<'_>) -> ArchiveResult<()> {
                    slot.$method(self)
                }
            }
        )*
    };
}

archivable_scalar! {
    bool => bool,
    u8 => u8,
    i32 => i32,
    u32 => u32,
    i64 => i64,
    u64 => u64,
    f32 => f32,
    f64 => f64,
    String => string,
    ObjectPath => object_path,
    ObjectRef => object_ref,
}

impl Archivable for ClassPath {
    fn archive(&mut self, slot: Slot<'_>) -> ArchiveResult<()> {
        let mut s = self.as_str().to_string();
        slot.string(&mut s)?;
        *self = ClassPath::new(s);
        Ok(())
    }
}

impl Archivable for SpawnId {
    fn archive(&mut self, slot: Slot<'_>) -> ArchiveResult<()> {
        if slot.is_text() {
            return slot.string(&mut self.to_string());
        }
        let mut bytes = *self.as_bytes();
        slot.bytes16(&mut bytes)?;
        *self = SpawnId::from_bytes(bytes);
        Ok(())
    }
}

impl Archivable for VersionTagId {
    fn archive(&mut self, slot: Slot<'_>) -> ArchiveResult<()> {
        if slot.is_text() {
            return slot.string(&mut self.to_string());
        }
        let mut bytes = *self.as_bytes();
        slot.bytes16(&mut bytes)?;
        *self = VersionTagId::from_bytes(bytes);
        Ok(())
    }
}

impl<T: Archivable + Default> Archivable for Vec<T> {
    fn archive(&mut self, slot: Slot<'_>) -> ArchiveResult<()> {
        let loading = slot.is_loading();
        let remaining = slot.ar.proxy.stream().remaining();
        let mut count = self.len() as i32;
        let mut array = slot.array(&mut count)?;
        if loading {
            self.clear();
            // Every element takes at least one byte.
            self.reserve((count as u64).min(remaining) as usize);
            for _ in 0..count {
                let mut item = T::default();
                array.element().value(&mut item)?;
                self.push(item);
            }
        } else {
            for item in self.iter_mut() {
                array.element().value(item)?;
            }
        }
        Ok(())
    }
}
