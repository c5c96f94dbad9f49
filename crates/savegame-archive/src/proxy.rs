//! Reference redirection around the raw stream.
//!
//! Objects are persisted by path. While loading, a path may be rewritten
//! through the redirect table before it is resolved, which is how objects
//! spawned under a new name are bound to references written against their
//! old level path.

use std::collections::HashMap;
use std::sync::Arc;

use savegame_types::{ObjectHandle, ObjectPath};
use tracing::trace;

use crate::error::ArchiveResult;
use crate::stream::MemoryStream;
use crate::value::ObjectRef;

/// Maps between live objects and their persisted paths.
pub trait ObjectResolver: Send + Sync {
    /// Persisted path of a live object.
    fn path_of(&self, handle: ObjectHandle) -> Option<ObjectPath>;

    /// Find an already-live object by path.
    fn resolve(&self, path: &ObjectPath) -> Option<ObjectHandle>;

    /// Load an object that is not live yet, e.g. an asset.
    fn load(&self, _path: &ObjectPath) -> Option<ObjectHandle> {
        None
    }
}

/// Resolver that knows no objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl ObjectResolver for NullResolver {
    fn path_of(&self, _handle: ObjectHandle) -> Option<ObjectPath> {
        None
    }

    fn resolve(&self, _path: &ObjectPath) -> Option<ObjectHandle> {
        None
    }
}

/// A stream wrapped with a path redirect table and an object resolver.
pub struct ProxyArchive {
    stream: MemoryStream,
    redirects: HashMap<ObjectPath, ObjectPath>,
    resolver: Arc<dyn ObjectResolver>,
}

impl ProxyArchive {
    pub fn new(stream: MemoryStream, resolver: Arc<dyn ObjectResolver>) -> Self {
        Self {
            stream,
            redirects: HashMap::new(),
            resolver,
        }
    }

    /// Rewrite `from` to `to` on every subsequent load. Identity redirects
    /// are ignored.
    pub fn add_redirect(&mut self, from: ObjectPath, to: ObjectPath) {
        if from == to {
            return;
        }
        trace!(%from, %to, "adding object redirect");
        self.redirects.insert(from, to);
    }

    pub fn redirect_count(&self) -> usize {
        self.redirects.len()
    }

    /// `path` after applying the redirect table.
    pub fn redirected(&self, path: ObjectPath) -> ObjectPath {
        match self.redirects.get(&path) {
            Some(to) => to.clone(),
            None => path,
        }
    }

    pub fn resolver(&self) -> &Arc<dyn ObjectResolver> {
        &self.resolver
    }

    pub fn stream(&self) -> &MemoryStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut MemoryStream {
        &mut self.stream
    }

    pub fn into_stream(self) -> MemoryStream {
        self.stream
    }

    pub fn is_loading(&self) -> bool {
        self.stream.is_loading()
    }

    pub fn tell(&self) -> u64 {
        self.stream.tell()
    }

    pub fn seek(&mut self, position: u64) -> ArchiveResult<()> {
        self.stream.seek(position)
    }

    /// Path persisted for `r` when saving. Unresolvable handles persist as
    /// the null path.
    pub fn path_for(&self, r: &ObjectRef) -> ObjectPath {
        match r.handle {
            Some(handle) => self.resolver.path_of(handle).unwrap_or_default(),
            None => r.path.clone(),
        }
    }

    /// Resolve a loaded path to a live object, loading it if needed.
    pub fn resolve_path(&self, path: &ObjectPath) -> Option<ObjectHandle> {
        if path.is_null() {
            return None;
        }
        self.resolver
            .resolve(path)
            .or_else(|| self.resolver.load(path))
    }

    /// Serialize a path. Loaded paths are redirected.
    pub fn serialize_object_path(&mut self, path: &mut ObjectPath) -> ArchiveResult<()> {
        if self.is_loading() {
            let raw = ObjectPath::parse(&self.stream.read_string()?)?;
            *path = self.redirected(raw);
        } else {
            self.stream.write_string(&path.to_string());
        }
        Ok(())
    }

    /// Serialize an object reference as its path. Loaded references are
    /// redirected and then resolved.
    pub fn serialize_object_ref(&mut self, r: &mut ObjectRef) -> ArchiveResult<()> {
        if self.is_loading() {
            let mut path = ObjectPath::null();
            self.serialize_object_path(&mut path)?;
            r.handle = self.resolve_path(&path);
            r.path = path;
        } else {
            let mut path = self.path_for(r);
            self.serialize_object_path(&mut path)?;
        }
        Ok(())
    }
}
