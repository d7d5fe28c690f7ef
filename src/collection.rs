// ── pwsafe3 / collection ─────────────────────────────────────────────────────
//
// Ordered, uniqueness-constrained sets of fields keyed by type (§4.2).
// `HeaderCollection` and `RecordCollection` are both instantiations of the
// same generic shape; the one type that never auto-creates (`Version`) is
// marked via `FieldTypeCode::must_already_exist` and rejected right here in
// `get_or_insert`, not left to the caller to remember.

use crate::error::{Error, Result};
use crate::field::{Field, FieldTypeCode};
use crate::handle::DocHandle;

/// Ordered sequence of fields of a single type space (headers or records),
/// with at most one field per non-repeatable type. Mutating a collection
/// whose owning document is read-only fails with `Error::ReadOnly`; any
/// successful mutation marks the owning document changed.
#[derive(Debug, Clone)]
pub struct FieldCollection<T> {
    fields: Vec<Field<T>>,
    handle: DocHandle,
}

impl<T: FieldTypeCode> FieldCollection<T> {
    pub(crate) fn new(handle: DocHandle) -> Self {
        FieldCollection {
            fields: Vec::new(),
            handle,
        }
    }

    pub(crate) fn from_fields(fields: Vec<Field<T>>, handle: DocHandle) -> Self {
        FieldCollection { fields, handle }
    }

    pub(crate) fn handle(&self) -> &DocHandle {
        &self.handle
    }

    /// Number of fields currently stored (not counting the `EndOfEntry`
    /// sentinel, which this collection never stores — it is synthesized by
    /// the codec on write and consumed by it on read).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, type_code: T) -> bool {
        self.fields.iter().any(|f| f.type_code() == type_code)
    }

    /// First field of the given type, in insertion order.
    pub fn field(&self, type_code: T) -> Option<&Field<T>> {
        self.fields.iter().find(|f| f.type_code() == type_code)
    }

    /// Mutable access to an existing field; does not auto-create. Used for
    /// the handful of fields (e.g. `Version`) that must already be present.
    pub fn field_mut_existing(&mut self, type_code: T) -> Result<&mut Field<T>> {
        if self.handle.is_read_only() {
            return Err(Error::ReadOnly);
        }
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.type_code() == type_code)
            .ok_or_else(|| Error::InvalidArgument(format!("field not present")))?;
        self.handle.mark_changed();
        Ok(field)
    }

    /// Mutable access to a field of the given type, appending an empty
    /// field of that type if not already present — unless `type_code` is one
    /// that `must_already_exist` (e.g. `Version`), in which case a missing
    /// field is an error rather than something to fabricate.
    pub fn get_or_insert(&mut self, type_code: T) -> Result<&mut Field<T>> {
        if self.handle.is_read_only() {
            return Err(Error::ReadOnly);
        }
        let present = self.fields.iter().any(|f| f.type_code() == type_code);
        if !present {
            if type_code.must_already_exist() {
                return self.field_mut_existing(type_code);
            }
            self.fields.push(Field::new(type_code, Vec::new()));
        }
        self.handle.mark_changed();
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.type_code() == type_code)
            .expect("just inserted");
        Ok(field)
    }

    /// Removes the first field of the given type, if any.
    pub fn remove(&mut self, type_code: T) -> Result<Option<Field<T>>> {
        if self.handle.is_read_only() {
            return Err(Error::ReadOnly);
        }
        let pos = self.fields.iter().position(|f| f.type_code() == type_code);
        let removed = pos.map(|i| self.fields.remove(i));
        if removed.is_some() {
            self.handle.mark_changed();
        }
        Ok(removed)
    }

    /// Appends a field constructed by the container parser. Internal-only:
    /// does not enforce uniqueness (the parser is trusted to produce a
    /// well-formed stream) and does not mark the document changed.
    pub(crate) fn push_parsed(&mut self, field: Field<T>) {
        self.fields.push(field);
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Field<T>> {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::HeaderType;

    #[test]
    fn get_or_insert_auto_creates() {
        let mut col: FieldCollection<HeaderType> = FieldCollection::new(DocHandle::new(false));
        assert!(!col.contains(HeaderType::DatabaseName));
        col.get_or_insert(HeaderType::DatabaseName)
            .unwrap()
            .set_text("safe");
        assert!(col.contains(HeaderType::DatabaseName));
        assert_eq!(
            col.field(HeaderType::DatabaseName).unwrap().as_text().unwrap(),
            "safe"
        );
    }

    #[test]
    fn read_only_collection_rejects_mutation() {
        let handle = DocHandle::new(true);
        let mut col: FieldCollection<HeaderType> = FieldCollection::new(handle);
        assert!(matches!(
            col.get_or_insert(HeaderType::DatabaseName),
            Err(Error::ReadOnly)
        ));
    }

    #[test]
    fn mutation_marks_owner_changed() {
        let handle = DocHandle::new(false);
        let mut col: FieldCollection<HeaderType> = FieldCollection::new(handle.clone());
        assert!(!handle.has_changed());
        col.get_or_insert(HeaderType::DatabaseName).unwrap();
        assert!(handle.has_changed());
    }

    #[test]
    fn remove_existing_field() {
        let mut col: FieldCollection<HeaderType> = FieldCollection::new(DocHandle::new(false));
        col.get_or_insert(HeaderType::DatabaseName).unwrap();
        let removed = col.remove(HeaderType::DatabaseName).unwrap();
        assert!(removed.is_some());
        assert!(!col.contains(HeaderType::DatabaseName));
    }

    #[test]
    fn get_or_insert_refuses_to_fabricate_version() {
        let mut col: FieldCollection<HeaderType> = FieldCollection::new(DocHandle::new(false));
        assert!(col.get_or_insert(HeaderType::Version).is_err());
        assert!(!col.contains(HeaderType::Version));
    }

    #[test]
    fn field_mut_existing_fails_when_absent() {
        let mut col: FieldCollection<HeaderType> = FieldCollection::new(DocHandle::new(false));
        assert!(col.field_mut_existing(HeaderType::Version).is_err());
    }
}
