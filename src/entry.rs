// ── pwsafe3 / entry ──────────────────────────────────────────────────────────
//
// Entry: a collection of Records forming one logical password entry.
// EntryCollection: an ordered sequence of Entries owned by exactly one
// Document at a time (§3, §4.3).

use std::rc::Rc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::collection::FieldCollection;
use crate::error::{DomainError, Error, Result};
use crate::field::{Field, RecordType};
use crate::handle::DocHandle;

/// Identity token proving which `EntryCollection` (if any) owns an `Entry`.
/// Compared by pointer identity, never by value, so two distinct empty
/// collections never compare equal.
#[derive(Debug, Clone)]
pub struct CollectionId(Rc<()>);

impl CollectionId {
    fn new() -> Self {
        CollectionId(Rc::new(()))
    }
}

impl PartialEq for CollectionId {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for CollectionId {}

macro_rules! text_accessor {
    ($get:ident, $set:ident, $ty:expr) => {
        pub fn $get(&self) -> &str {
            self.records
                .field($ty)
                .and_then(|f| f.as_text().ok())
                .unwrap_or("")
        }

        pub fn $set(&mut self, value: &str) -> Result<()> {
            self.records.get_or_insert($ty)?.set_text(value);
            Ok(())
        }
    };
}

macro_rules! time_accessor {
    ($get:ident, $set:ident, $ty:expr) => {
        pub fn $get(&self) -> DateTime<Utc> {
            self.records
                .field($ty)
                .and_then(|f| f.as_time().ok())
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        }

        pub fn $set(&mut self, value: DateTime<Utc>) -> Result<()> {
            self.records.get_or_insert($ty)?.set_time(value);
            Ok(())
        }
    };
}

/// A logical password entry: a `Uuid` record plus a loose bag of other
/// typed records, most of which are exposed below as thin typed views.
#[derive(Debug, Clone)]
pub struct Entry {
    records: FieldCollection<RecordType>,
    owner: Option<CollectionId>,
}

impl Entry {
    /// Default constructor: a fresh v4 `Uuid`, and empty `Title`/`Password`
    /// records (§3).
    pub fn new() -> Self {
        let mut records = FieldCollection::new(DocHandle::new(false));
        records
            .get_or_insert(RecordType::Uuid)
            .expect("fresh collection is never read-only")
            .set_uuid(Uuid::new_v4());
        records
            .get_or_insert(RecordType::Title)
            .expect("fresh collection is never read-only")
            .set_text("");
        records
            .get_or_insert(RecordType::Password)
            .expect("fresh collection is never read-only")
            .set_text("");
        Entry {
            records,
            owner: None,
        }
    }

    pub fn with_title(title: &str) -> Self {
        let mut entry = Entry::new();
        entry
            .set_title(title)
            .expect("fresh entry is never read-only");
        entry
    }

    /// Parser path: build an entry directly from an already-populated
    /// record set (the `Uuid`/`Title`/`Password` presence invariants are
    /// the container codec's responsibility to uphold when parsing).
    pub(crate) fn from_records(records: FieldCollection<RecordType>) -> Self {
        Entry {
            records,
            owner: None,
        }
    }

    pub(crate) fn rebind_handle(&mut self, handle: DocHandle) {
        self.records = FieldCollection::from_fields(
            self.records.iter().cloned().collect(),
            handle,
        );
    }

    pub fn records(&self) -> &FieldCollection<RecordType> {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut FieldCollection<RecordType> {
        &mut self.records
    }

    pub fn owner(&self) -> Option<&CollectionId> {
        self.owner.as_ref()
    }

    pub fn uuid(&self) -> Uuid {
        self.records
            .field(RecordType::Uuid)
            .and_then(|f| f.as_uuid().ok())
            .unwrap_or_else(Uuid::nil)
    }

    text_accessor!(group, set_group, RecordType::Group);
    text_accessor!(title, set_title, RecordType::Title);
    text_accessor!(username, set_username, RecordType::UserName);
    text_accessor!(password, set_password, RecordType::Password);
    text_accessor!(notes, set_notes, RecordType::Notes);
    text_accessor!(url, set_url, RecordType::Url);
    text_accessor!(email, set_email, RecordType::Email);
    text_accessor!(
        credit_card_number,
        set_credit_card_number,
        RecordType::CreditCardNumber
    );
    text_accessor!(
        credit_card_expiration,
        set_credit_card_expiration,
        RecordType::CreditCardExpiration
    );
    text_accessor!(
        credit_card_verification_value,
        set_credit_card_verification_value,
        RecordType::CreditCardVerificationValue
    );
    text_accessor!(
        credit_card_pin,
        set_credit_card_pin,
        RecordType::CreditCardPin
    );

    time_accessor!(
        creation_time,
        set_creation_time,
        RecordType::CreationTime
    );
    time_accessor!(
        password_modification_time,
        set_password_modification_time,
        RecordType::PasswordModificationTime
    );
    time_accessor!(last_access_time, set_last_access_time, RecordType::LastAccessTime);
    time_accessor!(
        password_expiry_time,
        set_password_expiry_time,
        RecordType::PasswordExpiryTime
    );
    time_accessor!(
        last_modification_time,
        set_last_modification_time,
        RecordType::LastModificationTime
    );
}

impl Default for Entry {
    fn default() -> Self {
        Entry::new()
    }
}

/// Ordered sequence of Entries owned by exactly one Document at a time.
#[derive(Debug, Clone)]
pub struct EntryCollection {
    id: CollectionId,
    handle: DocHandle,
    entries: Vec<Entry>,
}

impl EntryCollection {
    pub(crate) fn new(handle: DocHandle) -> Self {
        EntryCollection {
            id: CollectionId::new(),
            handle,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an entry, taking ownership. Fails if the entry is already
    /// owned by some collection (this one or another).
    pub fn add(&mut self, mut entry: Entry) -> Result<()> {
        if self.handle.is_read_only() {
            return Err(Error::ReadOnly);
        }
        if entry.owner.is_some() {
            return Err(Error::InvalidArgument(
                "entry is already owned by a collection".into(),
            ));
        }
        entry.rebind_handle(self.handle.clone());
        entry.owner = Some(self.id.clone());
        self.entries.push(entry);
        self.handle.mark_changed();
        Ok(())
    }

    pub fn add_range(&mut self, entries: impl IntoIterator<Item = Entry>) -> Result<()> {
        for entry in entries {
            self.add(entry)?;
        }
        Ok(())
    }

    pub fn insert(&mut self, index: usize, mut entry: Entry) -> Result<()> {
        if self.handle.is_read_only() {
            return Err(Error::ReadOnly);
        }
        if index > self.entries.len() {
            return Err(Error::InvalidArgument("index out of bounds".into()));
        }
        if entry.owner.is_some() {
            return Err(Error::InvalidArgument(
                "entry is already owned by a collection".into(),
            ));
        }
        entry.rebind_handle(self.handle.clone());
        entry.owner = Some(self.id.clone());
        self.entries.insert(index, entry);
        self.handle.mark_changed();
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Entry> {
        if self.handle.is_read_only() {
            return Err(Error::ReadOnly);
        }
        if index >= self.entries.len() {
            return Err(Error::InvalidArgument("index out of bounds".into()));
        }
        self.handle.mark_changed();
        let mut entry = self.entries.remove(index);
        entry.owner = None;
        Ok(entry)
    }

    /// Removes the first entry with the given `Uuid`, if present.
    pub fn remove(&mut self, uuid: Uuid) -> Result<Option<Entry>> {
        if self.handle.is_read_only() {
            return Err(Error::ReadOnly);
        }
        if let Some(pos) = self.entries.iter().position(|e| e.uuid() == uuid) {
            self.handle.mark_changed();
            let mut entry = self.entries.remove(pos);
            entry.owner = None;
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.handle.is_read_only() {
            return Err(Error::ReadOnly);
        }
        if !self.entries.is_empty() {
            self.handle.mark_changed();
        }
        for entry in self.entries.iter_mut() {
            entry.owner = None;
        }
        self.entries.clear();
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.entries.get_mut(index)
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.entries.iter().any(|e| same_fold(e.title(), title))
    }

    pub fn contains_group_title(&self, group: &str, title: &str) -> bool {
        self.entries.iter().any(|e| {
            same_fold(e.group(), group) && same_fold(e.title(), title)
        })
    }

    /// Looks up by title (case-insensitive). If absent and the collection
    /// is mutable, creates and appends a new entry with that title and
    /// returns a clone of the now-owned entry (use `entry_mut` for further
    /// live mutation); if absent and read-only, returns a detached dummy
    /// entry that is not inserted into the collection.
    pub fn entry_or_create(&mut self, title: &str) -> Entry {
        if let Some(pos) = self.entries.iter().position(|e| same_fold(e.title(), title)) {
            return self.entries[pos].clone();
        }
        if self.handle.is_read_only() {
            return Entry::with_title(title);
        }
        self.add(Entry::with_title(title))
            .expect("checked not read-only");
        self.entries.last().expect("just inserted").clone()
    }

    /// Looks up by title (case-insensitive) without creating on miss.
    pub fn entry(&self, title: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| same_fold(e.title(), title))
    }

    pub fn entry_mut(&mut self, title: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| same_fold(e.title(), title))
    }

    pub fn entry_group_title(&self, group: &str, title: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| same_fold(e.group(), group) && same_fold(e.title(), title))
    }

    /// Indexer by `(title, record_type)`: delegates to the entry's own
    /// record; `None` if no entry has that title at all, or the entry has
    /// no record of that type.
    pub fn record(&self, title: &str, record_type: RecordType) -> Option<&Field<RecordType>> {
        self.entry(title)?.records().field(record_type)
    }

    /// Indexer by `(group, title, record_type)`: same delegation, scoped to
    /// a matching `(group, title)` pair.
    pub fn record_group_title(
        &self,
        group: &str,
        title: &str,
        record_type: RecordType,
    ) -> Option<&Field<RecordType>> {
        self.entry_group_title(group, title)?.records().field(record_type)
    }

    /// Setter side of the `(title, record_type)` indexer: only `None` is
    /// accepted, and it removes the named record from an already-present
    /// entry without creating the entry if absent (§4.3).
    pub fn set_record(
        &mut self,
        title: &str,
        record_type: RecordType,
        value: Option<()>,
    ) -> Result<()> {
        match value {
            None => {
                if let Some(entry) = self.entry_mut(title) {
                    entry.records_mut().remove(record_type)?;
                }
                Ok(())
            }
            Some(()) => Err(Error::Domain(DomainError::OnlyNoneSupported)),
        }
    }

    /// Setter side of the `(group, title, record_type)` indexer: same
    /// semantics as `set_record`, scoped to a matching `(group, title)`.
    pub fn set_record_group_title(
        &mut self,
        group: &str,
        title: &str,
        record_type: RecordType,
        value: Option<()>,
    ) -> Result<()> {
        match value {
            None => {
                let pos = self
                    .entries
                    .iter()
                    .position(|e| same_fold(e.group(), group) && same_fold(e.title(), title));
                if let Some(pos) = pos {
                    self.entries[pos].records_mut().remove(record_type)?;
                }
                Ok(())
            }
            Some(()) => Err(Error::Domain(DomainError::OnlyNoneSupported)),
        }
    }

    /// Sentinel-indexer form of removal, kept for source-compatibility
    /// with ports of the original API: only `None` may be assigned.
    /// Anything else is `DomainError::OnlyNoneSupported`.
    pub fn set_by_title(&mut self, title: &str, value: Option<()>) -> Result<()> {
        match value {
            None => {
                if let Some(uuid) = self.entry(title).map(|e| e.uuid()) {
                    self.remove(uuid)?;
                }
                Ok(())
            }
            Some(()) => Err(Error::Domain(DomainError::OnlyNoneSupported)),
        }
    }

    /// Stable sort by `(Group, Title)`, both compared case-insensitively.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            fold(a.group())
                .cmp(&fold(b.group()))
                .then_with(|| fold(a.title()).cmp(&fold(b.title())))
        });
        self.handle.mark_changed();
    }

    /// Returns a snapshot of the current entries, safe to iterate while the
    /// caller subsequently mutates the collection (§4.3, §5).
    pub fn iter(&self) -> impl Iterator<Item = Entry> {
        self.entries.clone().into_iter()
    }
}

fn fold(s: &str) -> String {
    s.to_lowercase()
}

fn same_fold(a: &str, b: &str) -> bool {
    fold(a) == fold(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_has_uuid_title_password() {
        let e = Entry::new();
        assert_ne!(e.uuid(), Uuid::nil());
        assert_eq!(e.title(), "");
        assert_eq!(e.password(), "");
    }

    #[test]
    fn add_sets_owner_and_marks_changed() {
        let handle = DocHandle::new(false);
        let mut col = EntryCollection::new(handle.clone());
        let entry = Entry::with_title("gmail");
        col.add(entry).unwrap();
        assert_eq!(col.len(), 1);
        assert!(col.get(0).unwrap().owner().is_some());
        assert!(handle.has_changed());
    }

    #[test]
    fn adding_already_owned_entry_fails() {
        let mut col_a = EntryCollection::new(DocHandle::new(false));
        let mut col_b = EntryCollection::new(DocHandle::new(false));
        let entry = Entry::with_title("gmail");
        col_a.add(entry.clone()).unwrap();
        let owned = col_a.get(0).unwrap().clone();
        assert!(col_b.add(owned).is_err());
    }

    #[test]
    fn case_insensitive_lookup() {
        let mut col = EntryCollection::new(DocHandle::new(false));
        col.add(Entry::with_title("GMail")).unwrap();
        assert!(col.contains_title("gmail"));
        assert!(col.entry("GMAIL").is_some());
    }

    #[test]
    fn entry_or_create_appends_when_mutable() {
        let mut col = EntryCollection::new(DocHandle::new(false));
        assert_eq!(col.len(), 0);
        let e = col.entry_or_create("new one");
        assert_eq!(e.title(), "new one");
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn entry_or_create_returns_detached_when_read_only() {
        let handle = DocHandle::new(true);
        let mut col = EntryCollection::new(handle);
        let e = col.entry_or_create("ghost");
        assert_eq!(e.title(), "ghost");
        assert_eq!(col.len(), 0);
    }

    #[test]
    fn sort_orders_by_group_then_title_case_insensitive() {
        let mut col = EntryCollection::new(DocHandle::new(false));
        let mut b = Entry::with_title("Banana");
        b.set_group("Fruit").unwrap();
        let mut a = Entry::with_title("apple");
        a.set_group("fruit").unwrap();
        col.add(b).unwrap();
        col.add(a).unwrap();
        col.sort();
        assert_eq!(col.get(0).unwrap().title(), "apple");
        assert_eq!(col.get(1).unwrap().title(), "Banana");
    }

    #[test]
    fn record_indexer_delegates_to_entry() {
        let mut col = EntryCollection::new(DocHandle::new(false));
        col.add(Entry::with_title("gmail")).unwrap();
        col.entry_mut("gmail").unwrap().set_url("http://x").unwrap();
        assert_eq!(
            col.record("gmail", RecordType::Url).unwrap().as_text().unwrap(),
            "http://x"
        );
        assert!(col.record("gmail", RecordType::Notes).is_none());
        assert!(col.record("nope", RecordType::Url).is_none());
    }

    #[test]
    fn set_record_none_removes_without_creating_entry() {
        let mut col = EntryCollection::new(DocHandle::new(false));
        col.add(Entry::with_title("gmail")).unwrap();
        col.entry_mut("gmail").unwrap().set_url("http://x").unwrap();

        col.set_record("gmail", RecordType::Url, None).unwrap();
        assert!(col.record("gmail", RecordType::Url).is_none());

        // Missing entry: a no-op, not a fabricated one.
        col.set_record("nope", RecordType::Url, None).unwrap();
        assert_eq!(col.len(), 1);
        assert!(col.entry("nope").is_none());
    }

    #[test]
    fn set_record_rejects_some() {
        let mut col = EntryCollection::new(DocHandle::new(false));
        col.add(Entry::with_title("gmail")).unwrap();
        assert!(col.set_record("gmail", RecordType::Url, Some(())).is_err());
    }

    #[test]
    fn iteration_is_a_snapshot() {
        let mut col = EntryCollection::new(DocHandle::new(false));
        col.add(Entry::with_title("one")).unwrap();
        let snapshot: Vec<Entry> = col.iter().collect();
        col.add(Entry::with_title("two")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(col.len(), 2);
    }
}
