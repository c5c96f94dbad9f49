//! Field-indexed records.
//!
//! A binary record starts with a `u64` offset (relative to the record start)
//! to its field index, followed by the field values, followed by the index
//! itself: an `i32` count and `{ name, offset }` pairs. Fields can therefore
//! be read in any order, and fields a reader does not ask for are never
//! decoded. Closing a record always leaves the stream at the record's end.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, warn};

use crate::error::{ArchiveError, ArchiveResult};
use crate::stream::Placeholder;
use crate::structured::{Archivable, Record, Slot};
use crate::value::{PropertyFlags, PropertyValue};

/// Field renames, scoped by type name.
#[derive(Clone, Debug, Default)]
pub struct FieldRedirects {
    renames: HashMap<String, HashMap<String, String>>,
}

impl FieldRedirects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename `old_name` to `new_name` for objects of `type_name` and its
    /// subtypes.
    pub fn add(
        &mut self,
        type_name: impl Into<String>,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
    ) {
        self.renames
            .entry(type_name.into())
            .or_default()
            .insert(old_name.into(), new_name.into());
    }

    /// New name for `name`, searching `type_hierarchy` from the most derived
    /// type.
    pub fn redirect(&self, type_hierarchy: &[&str], name: &str) -> Option<&str> {
        type_hierarchy.iter().find_map(|type_name| {
            self.renames
                .get(*type_name)
                .and_then(|fields| fields.get(name))
                .map(String::as_str)
        })
    }

    pub fn len(&self) -> usize {
        self.renames.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A record whose fields are addressed by name.
pub struct SaveGameArchive<'a> {
    record: Record<'a>,
    start: u64,
    end: u64,
    index_offset: Option<Placeholder>,
    fields: BTreeMap<String, u64>,
    closed: bool,
}

impl<'a> SaveGameArchive<'a> {
    /// Open a field-indexed record inside `record`.
    ///
    /// When loading a binary archive the field index is read up front and
    /// stored names are migrated through `redirects` for `type_hierarchy`
    /// (most derived type first).
    pub fn open(
        mut record: Record<'a>,
        type_hierarchy: &[&str],
        redirects: &FieldRedirects,
    ) -> ArchiveResult<Self> {
        let mut fields = BTreeMap::new();
        let mut index_offset = None;
        let mut start = 0;
        let mut end = 0;

        if !record.is_text() {
            let ar = record.archive();
            start = ar.tell();
            if ar.is_loading() {
                let stream = ar.proxy_mut().stream_mut();
                let offset = stream.read_u64()?;
                let index_at = start.checked_add(offset).ok_or(ArchiveError::InvalidLength {
                    offset: start,
                    length: offset as i64,
                })?;
                stream.seek(index_at)?;
                let count = stream.read_count()?;
                for _ in 0..count {
                    let mut name = stream.read_string()?;
                    let field_offset = stream.read_u64()?;
                    if let Some(renamed) = redirects.redirect(type_hierarchy, &name) {
                        debug!(from = %name, to = renamed, "migrating renamed field");
                        name = renamed.to_string();
                    }
                    fields.insert(name, field_offset);
                }
                end = stream.tell();
                stream.seek(start + 8)?;
            } else {
                index_offset = Some(Placeholder::reserve(ar.proxy_mut().stream_mut()));
            }
        }

        Ok(Self {
            record,
            start,
            end,
            index_offset,
            fields,
            closed: false,
        })
    }

    pub fn is_loading(&self) -> bool {
        self.record.is_loading()
    }

    pub fn is_text(&self) -> bool {
        self.record.is_text()
    }

    /// Enter a named field.
    ///
    /// Returns `None` when saving a field that was already written in this
    /// record, or when loading a field the record does not contain.
    pub fn enter_field(&mut self, name: &str) -> ArchiveResult<Option<Slot<'_>>> {
        let loading = self.is_loading();
        if !loading && self.fields.contains_key(name) {
            warn!(field = name, "field already serialized in this record; skipping");
            return Ok(None);
        }

        if self.is_text() {
            if !loading {
                self.fields.insert(name.to_string(), 0);
            }
        } else if loading {
            let Some(&offset) = self.fields.get(name) else {
                return Ok(None);
            };
            self.record.archive().seek(self.start + offset)?;
        } else {
            let offset = self.record.archive().tell() - self.start;
            self.fields.insert(name.to_string(), offset);
        }
        Ok(Some(self.record.field(name)))
    }

    /// Serialize `value` under `name`. Returns `false` if the field was
    /// skipped (duplicate on save, absent on load).
    pub fn serialize_field<T: Archivable + ?Sized>(
        &mut self,
        name: &str,
        value: &mut T,
    ) -> ArchiveResult<bool> {
        match self.enter_field(name)? {
            Some(slot) => {
                slot.value(value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Like [`serialize_field`](Self::serialize_field), but when saving the
    /// field is only written if `save` is `true`.
    pub fn try_serialize_field<T: Archivable + ?Sized>(
        &mut self,
        name: &str,
        save: bool,
        value: &mut T,
    ) -> ArchiveResult<bool> {
        if !self.is_loading() && !save {
            return Ok(false);
        }
        self.serialize_field(name, value)
    }

    /// Serialize a dynamically typed item.
    ///
    /// Items whose flags do not mark them editable and writable are a usage
    /// error: debug builds log and fail, release builds skip the item.
    pub fn serialize_item(
        &mut self,
        name: &str,
        value: &mut PropertyValue,
        flags: PropertyFlags,
    ) -> ArchiveResult<bool> {
        if !flags.is_persistable() {
            if cfg!(debug_assertions) {
                error!(field = name, "serialize_item used on a value that is not an editable variable");
                return Err(ArchiveError::NotPersistable(name.to_string()));
            }
            return Ok(false);
        }
        self.serialize_field(name, value)
    }

    /// Version of `tag` for the data in this record.
    pub fn custom_version(&mut self, tag: &str) -> i32 {
        self.record.archive().custom_version(tag)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Names in the field index.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Close the record: write the index when saving and move to the
    /// record's end.
    pub fn close(mut self) -> ArchiveResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> ArchiveResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.is_text() {
            return Ok(());
        }

        let loading = self.is_loading();
        let stream = self.record.archive().proxy_mut().stream_mut();
        if !loading {
            let index_at = stream.tell() - self.start;
            stream.write_count(self.fields.len());
            for (name, offset) in &self.fields {
                stream.write_string(name);
                stream.write_u64(*offset);
            }
            self.end = stream.tell();
            if let Some(slot) = self.index_offset.take() {
                slot.fill(stream, index_at)?;
            }
        }
        stream.seek(self.end)
    }
}

impl Drop for SaveGameArchive<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!(error = %e, "failed to close field-indexed record");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::proxy::NullResolver;
    use crate::structured::StructuredArchive;

    const HIERARCHY: &[&str] = &["Door", "Actor"];

    fn write_abc() -> Vec<u8> {
        let mut ar = StructuredArchive::binary_writer(Arc::new(NullResolver));
        {
            let mut root = ar.root();
            let mut record =
                SaveGameArchive::open(root.field("Data").record(), HIERARCHY, &FieldRedirects::new())
                    .unwrap();
            record.serialize_field("A", &mut 1i32).unwrap();
            record.serialize_field("B", &mut "two".to_string()).unwrap();
            record.serialize_field("C", &mut 3.5f64).unwrap();
            record.close().unwrap();
            root.field("Trailer").u32(&mut 0xfeed).unwrap();
        }
        ar.finish().unwrap()
    }

    #[test]
    fn direct_access_and_end_position() {
        let bytes = write_abc();
        let mut ar = StructuredArchive::binary_reader(bytes, Arc::new(NullResolver));
        let mut root = ar.root();
        {
            let mut record =
                SaveGameArchive::open(root.field("Data").record(), HIERARCHY, &FieldRedirects::new())
                    .unwrap();
            let mut c = 0.0f64;
            assert!(record.serialize_field("C", &mut c).unwrap());
            assert_eq!(c, 3.5);
            let names: Vec<_> = record.field_names().collect();
            assert_eq!(names, vec!["A", "B", "C"]);
        }
        let mut trailer = 0u32;
        root.field("Trailer").u32(&mut trailer).unwrap();
        assert_eq!(trailer, 0xfeed);
    }

    #[test]
    fn fields_read_in_any_order() {
        let bytes = write_abc();
        let mut ar = StructuredArchive::binary_reader(bytes, Arc::new(NullResolver));
        let mut root = ar.root();
        let mut record =
            SaveGameArchive::open(root.field("Data").record(), HIERARCHY, &FieldRedirects::new())
                .unwrap();
        let (mut a, mut b, mut c) = (0i32, String::new(), 0.0f64);
        record.serialize_field("C", &mut c).unwrap();
        record.serialize_field("A", &mut a).unwrap();
        record.serialize_field("B", &mut b).unwrap();
        assert_eq!((a, b.as_str(), c), (1, "two", 3.5));
    }

    #[test]
    fn missing_field_on_load_is_skipped() {
        let bytes = write_abc();
        let mut ar = StructuredArchive::binary_reader(bytes, Arc::new(NullResolver));
        let mut root = ar.root();
        let mut record =
            SaveGameArchive::open(root.field("Data").record(), HIERARCHY, &FieldRedirects::new())
                .unwrap();
        let mut d = 9i32;
        assert!(!record.serialize_field("D", &mut d).unwrap());
        assert_eq!(d, 9);
    }

    #[test]
    fn duplicate_field_is_rejected_and_first_write_wins() {
        let mut ar = StructuredArchive::binary_writer(Arc::new(NullResolver));
        {
            let mut record =
                SaveGameArchive::open(ar.root(), HIERARCHY, &FieldRedirects::new()).unwrap();
            assert!(record.serialize_field("A", &mut 1i32).unwrap());
            assert!(record.enter_field("A").unwrap().is_none());
            assert!(!record.serialize_field("A", &mut 2i32).unwrap());
        }
        let bytes = ar.finish().unwrap();

        let mut ar = StructuredArchive::binary_reader(bytes, Arc::new(NullResolver));
        let mut record = SaveGameArchive::open(ar.root(), HIERARCHY, &FieldRedirects::new()).unwrap();
        let mut a = 0i32;
        record.serialize_field("A", &mut a).unwrap();
        assert_eq!(a, 1);
        assert_eq!(record.field_names().count(), 1);
    }

    #[test]
    fn renamed_fields_follow_type_hierarchy() {
        let mut ar = StructuredArchive::binary_writer(Arc::new(NullResolver));
        {
            let mut record =
                SaveGameArchive::open(ar.root(), HIERARCHY, &FieldRedirects::new()).unwrap();
            record.serialize_field("Hp", &mut 40i32).unwrap();
        }
        let bytes = ar.finish().unwrap();

        let mut redirects = FieldRedirects::new();
        redirects.add("Actor", "Hp", "Health");
        redirects.add("Door", "Hp", "Durability");
        let mut ar = StructuredArchive::binary_reader(bytes, Arc::new(NullResolver));
        let mut record = SaveGameArchive::open(ar.root(), HIERARCHY, &redirects).unwrap();
        assert!(!record.has_field("Hp"));
        let mut durability = 0i32;
        assert!(record.serialize_field("Durability", &mut durability).unwrap());
        assert_eq!(durability, 40);
    }

    #[test]
    fn try_serialize_field_respects_save_flag() {
        let mut ar = StructuredArchive::binary_writer(Arc::new(NullResolver));
        {
            let mut record =
                SaveGameArchive::open(ar.root(), HIERARCHY, &FieldRedirects::new()).unwrap();
            assert!(!record.try_serialize_field("Skipped", false, &mut 1i32).unwrap());
            assert!(record.try_serialize_field("Kept", true, &mut 2i32).unwrap());
            let names: Vec<_> = record.field_names().collect();
            assert_eq!(names, vec!["Kept"]);
        }
    }

    #[test]
    fn serialize_item_rejects_non_persistable() {
        let mut ar = StructuredArchive::binary_writer(Arc::new(NullResolver));
        let mut record =
            SaveGameArchive::open(ar.root(), HIERARCHY, &FieldRedirects::new()).unwrap();
        let mut value = PropertyValue::Int(3);
        assert!(record
            .serialize_item("Score", &mut value, PropertyFlags::EDITABLE)
            .unwrap());
        let result = record.serialize_item("Id", &mut value, PropertyFlags::READ_ONLY);
        if cfg!(debug_assertions) {
            assert!(matches!(result, Err(ArchiveError::NotPersistable(_))));
        } else {
            assert!(!result.unwrap());
        }
    }

    #[test]
    fn drop_closes_record() {
        let mut ar = StructuredArchive::binary_writer(Arc::new(NullResolver));
        {
            let mut record =
                SaveGameArchive::open(ar.root(), HIERARCHY, &FieldRedirects::new()).unwrap();
            record.serialize_field("A", &mut 7i32).unwrap();
        }
        let bytes = ar.finish().unwrap();
        // offset slot + value + index (count + "A" + offset)
        assert_eq!(bytes.len(), 8 + 4 + 4 + 4 + 1 + 8);
        assert_eq!(&bytes[..8], &12u64.to_be_bytes());
    }

    #[test]
    fn text_records_have_no_index() {
        let mut ar = StructuredArchive::text_writer(Arc::new(NullResolver));
        {
            let mut record =
                SaveGameArchive::open(ar.root(), HIERARCHY, &FieldRedirects::new()).unwrap();
            record.serialize_field("A", &mut 1i32).unwrap();
            assert!(!record.serialize_field("A", &mut 2i32).unwrap());
        }
        let json: serde_json::Value = serde_json::from_slice(&ar.finish().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "A": 1 }));
    }

    proptest::proptest! {
        #[test]
        fn any_subset_reads_back(values in proptest::collection::btree_map("[A-Za-z]{1,8}", proptest::num::i64::ANY, 1..12), pick in proptest::num::usize::ANY) {
            let mut ar = StructuredArchive::binary_writer(Arc::new(NullResolver));
            {
                let mut root = ar.root();
                let mut record = SaveGameArchive::open(root.field("Data").record(), &[], &FieldRedirects::new()).unwrap();
                for (name, value) in &values {
                    record.serialize_field(name, &mut value.clone()).unwrap();
                }
                record.close().unwrap();
                root.field("After").i32(&mut -7).unwrap();
            }
            let bytes = ar.finish().unwrap();

            let (name, expected) = values.iter().nth(pick % values.len()).unwrap();
            let mut ar = StructuredArchive::binary_reader(bytes, Arc::new(NullResolver));
            let mut root = ar.root();
            {
                let mut record = SaveGameArchive::open(root.field("Data").record(), &[], &FieldRedirects::new()).unwrap();
                let mut got = 0i64;
                proptest::prop_assert!(record.serialize_field(name, &mut got).unwrap());
                proptest::prop_assert_eq!(got, *expected);
            }
            let mut after = 0i32;
            root.field("After").i32(&mut after).unwrap();
            proptest::prop_assert_eq!(after, -7);
        }
    }
}
