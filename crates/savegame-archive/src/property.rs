//! Flagged-property blob.
//!
//! Binary layout: a sequence of `{ name, size: u64, value }` terminated by an
//! empty name, where `value` is a tagged [`PropertyValue`]. The size lets a
//! reader skip values whose tag it does not know. Text archives write a plain
//! record of `name: value` pairs.

use tracing::{trace, warn};

use crate::error::{ArchiveError, ArchiveResult};
use crate::stream::Placeholder;
use crate::structured::Slot;
use crate::value::PropertyValue;

/// Write `properties` into `slot`. Returns how many were written.
pub fn write_properties<I>(slot: Slot<'_>, properties: I) -> ArchiveResult<usize>
where
    I: IntoIterator<Item = (String, PropertyValue)>,
{
    let mut written = 0;
    if slot.is_text() {
        let mut record = slot.record();
        for (name, mut value) in properties {
            record.field(&name).value(&mut value)?;
            written += 1;
        }
        return Ok(written);
    }

    let mut slot = slot;
    let ar = slot.archive();
    for (name, mut value) in properties {
        if name.is_empty() {
            warn!("skipping property with an empty name");
            continue;
        }
        ar.proxy_mut().stream_mut().write_string(&name);
        let size = Placeholder::reserve(ar.proxy_mut().stream_mut());
        let start = ar.tell();
        ar.slot().value(&mut value)?;
        let len = ar.tell() - start;
        size.fill(ar.proxy_mut().stream_mut(), len)?;
        written += 1;
    }
    ar.proxy_mut().stream_mut().write_string("");
    Ok(written)
}

/// Read a property blob written by [`write_properties`]. Values with an
/// unknown tag are skipped.
pub fn read_properties(mut slot: Slot<'_>) -> ArchiveResult<Vec<(String, PropertyValue)>> {
    let ar = slot.archive();
    let mut properties = Vec::new();
    loop {
        let name = ar.proxy_mut().stream_mut().read_string()?;
        if name.is_empty() {
            break;
        }
        let size = ar.proxy_mut().stream_mut().read_u64()?;
        let start = ar.tell();
        let end = start.checked_add(size).ok_or(ArchiveError::InvalidLength {
            offset: start,
            length: size as i64,
        })?;

        let mut value = PropertyValue::default();
        match ar.slot().value(&mut value) {
            Ok(()) => {
                trace!(property = %name, kind = value.type_name(), "read property");
                properties.push((name, value));
            }
            Err(ArchiveError::UnknownPropertyTag { tag, .. }) => {
                warn!(property = %name, tag, "skipping property of unknown type");
            }
            Err(e) => return Err(e),
        }
        ar.seek(end)?;
    }
    Ok(properties)
}
