// ── pwsafe3 / field ──────────────────────────────────────────────────────────
//
// Typed view over a raw byte payload tagged by a field-type code. The type
// codes themselves are closed enumerations (one for headers, one for
// records) shaped after `kdbx_rs`'s `OuterHeaderId`/`InnerHeaderId` pattern:
// `From<u8>`/`Into<u8>` round-trip, with an `Unknown(u8)` catch-all so a
// container carrying a field type this crate doesn't recognize still parses.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, FormatError, Result};

/// Sentinel type code, valid in both the header and record type spaces,
/// that marks the end of a header group or a record group.
pub const END_OF_ENTRY: u8 = 0xff;

/// Header field type codes defined by the Password Safe V3 format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderType {
    Version,
    Uuid,
    NonDefaultPreferences,
    TreeDisplayStatus,
    TimestampOfLastSave,
    WhoPerformedLastSaveDeprecated,
    WhatPerformedLastSave,
    LastSavedByUserDeprecated,
    LastSavedByUser,
    LastSavedOnHost,
    DatabaseName,
    DatabaseDescription,
    DatabaseFilters,
    RecentlyUsedEntries,
    NamedPasswordPolicies,
    EmptyGroups,
    Yubico,
    EndOfEntry,
    Unknown(u8),
}

impl From<u8> for HeaderType {
    fn from(code: u8) -> Self {
        match code {
            0x00 => HeaderType::Version,
            0x01 => HeaderType::Uuid,
            0x02 => HeaderType::NonDefaultPreferences,
            0x03 => HeaderType::TreeDisplayStatus,
            0x04 => HeaderType::TimestampOfLastSave,
            0x05 => HeaderType::WhoPerformedLastSaveDeprecated,
            0x06 => HeaderType::WhatPerformedLastSave,
            0x07 => HeaderType::LastSavedByUserDeprecated,
            0x08 => HeaderType::LastSavedByUser,
            0x09 => HeaderType::LastSavedOnHost,
            0x0a => HeaderType::DatabaseName,
            0x0b => HeaderType::DatabaseDescription,
            0x0c => HeaderType::DatabaseFilters,
            0x10 => HeaderType::RecentlyUsedEntries,
            0x11 => HeaderType::NamedPasswordPolicies,
            0x12 => HeaderType::EmptyGroups,
            0x13 => HeaderType::Yubico,
            0xff => HeaderType::EndOfEntry,
            other => HeaderType::Unknown(other),
        }
    }
}

impl From<HeaderType> for u8 {
    fn from(ty: HeaderType) -> u8 {
        match ty {
            HeaderType::Version => 0x00,
            HeaderType::Uuid => 0x01,
            HeaderType::NonDefaultPreferences => 0x02,
            HeaderType::TreeDisplayStatus => 0x03,
            HeaderType::TimestampOfLastSave => 0x04,
            HeaderType::WhoPerformedLastSaveDeprecated => 0x05,
            HeaderType::WhatPerformedLastSave => 0x06,
            HeaderType::LastSavedByUserDeprecated => 0x07,
            HeaderType::LastSavedByUser => 0x08,
            HeaderType::LastSavedOnHost => 0x09,
            HeaderType::DatabaseName => 0x0a,
            HeaderType::DatabaseDescription => 0x0b,
            HeaderType::DatabaseFilters => 0x0c,
            HeaderType::RecentlyUsedEntries => 0x10,
            HeaderType::NamedPasswordPolicies => 0x11,
            HeaderType::EmptyGroups => 0x12,
            HeaderType::Yubico => 0x13,
            HeaderType::EndOfEntry => 0xff,
            HeaderType::Unknown(code) => code,
        }
    }
}

impl HeaderType {
    /// Headers of these types may appear at most once; all header types
    /// currently modeled are non-repeatable.
    pub fn is_non_repeatable(&self) -> bool {
        !matches!(self, HeaderType::EndOfEntry)
    }
}

/// Record field type codes defined by the Password Safe V3 format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Uuid,
    Group,
    Title,
    UserName,
    Notes,
    Password,
    CreationTime,
    PasswordModificationTime,
    LastAccessTime,
    PasswordExpiryTime,
    LastModificationTime,
    Url,
    Autotype,
    PasswordHistory,
    PasswordPolicy,
    PasswordExpiryInterval,
    RunCommand,
    DoubleClickAction,
    Email,
    ProtectedValue,
    OwnSymbolsForPassword,
    ShiftDoubleClickAction,
    PasswordPolicyName,
    EntryKeyboardShortcut,
    TwoFactorKey,
    CreditCardNumber,
    CreditCardExpiration,
    CreditCardVerificationValue,
    CreditCardPin,
    QrCode,
    EndOfEntry,
    Unknown(u8),
}

impl From<u8> for RecordType {
    fn from(code: u8) -> Self {
        match code {
            0x01 => RecordType::Uuid,
            0x02 => RecordType::Group,
            0x03 => RecordType::Title,
            0x04 => RecordType::UserName,
            0x05 => RecordType::Notes,
            0x06 => RecordType::Password,
            0x07 => RecordType::CreationTime,
            0x08 => RecordType::PasswordModificationTime,
            0x09 => RecordType::LastAccessTime,
            0x0a => RecordType::PasswordExpiryTime,
            0x0c => RecordType::LastModificationTime,
            0x0d => RecordType::Url,
            0x0e => RecordType::Autotype,
            0x0f => RecordType::PasswordHistory,
            0x10 => RecordType::PasswordPolicy,
            0x11 => RecordType::PasswordExpiryInterval,
            0x12 => RecordType::RunCommand,
            0x13 => RecordType::DoubleClickAction,
            0x14 => RecordType::Email,
            0x15 => RecordType::ProtectedValue,
            0x16 => RecordType::OwnSymbolsForPassword,
            0x17 => RecordType::ShiftDoubleClickAction,
            0x18 => RecordType::PasswordPolicyName,
            0x19 => RecordType::EntryKeyboardShortcut,
            0x1a => RecordType::TwoFactorKey,
            0x1b => RecordType::CreditCardNumber,
            0x1c => RecordType::CreditCardExpiration,
            0x1d => RecordType::CreditCardVerificationValue,
            0x1e => RecordType::CreditCardPin,
            0x1f => RecordType::QrCode,
            0xff => RecordType::EndOfEntry,
            other => RecordType::Unknown(other),
        }
    }
}

impl From<RecordType> for u8 {
    fn from(ty: RecordType) -> u8 {
        match ty {
            RecordType::Uuid => 0x01,
            RecordType::Group => 0x02,
            RecordType::Title => 0x03,
            RecordType::UserName => 0x04,
            RecordType::Notes => 0x05,
            RecordType::Password => 0x06,
            RecordType::CreationTime => 0x07,
            RecordType::PasswordModificationTime => 0x08,
            RecordType::LastAccessTime => 0x09,
            RecordType::PasswordExpiryTime => 0x0a,
            RecordType::LastModificationTime => 0x0c,
            RecordType::Url => 0x0d,
            RecordType::Autotype => 0x0e,
            RecordType::PasswordHistory => 0x0f,
            RecordType::PasswordPolicy => 0x10,
            RecordType::PasswordExpiryInterval => 0x11,
            RecordType::RunCommand => 0x12,
            RecordType::DoubleClickAction => 0x13,
            RecordType::Email => 0x14,
            RecordType::ProtectedValue => 0x15,
            RecordType::OwnSymbolsForPassword => 0x16,
            RecordType::ShiftDoubleClickAction => 0x17,
            RecordType::PasswordPolicyName => 0x18,
            RecordType::EntryKeyboardShortcut => 0x19,
            RecordType::TwoFactorKey => 0x1a,
            RecordType::CreditCardNumber => 0x1b,
            RecordType::CreditCardExpiration => 0x1c,
            RecordType::CreditCardVerificationValue => 0x1d,
            RecordType::CreditCardPin => 0x1e,
            RecordType::QrCode => 0x1f,
            RecordType::EndOfEntry => 0xff,
            RecordType::Unknown(code) => code,
        }
    }
}

/// A type code shared by the header and record type spaces: both support
/// `EndOfEntry` as a sentinel and both round-trip through a `u8`.
pub trait FieldTypeCode: Copy + Eq + std::hash::Hash + From<u8> + Into<u8> {
    fn end_of_entry() -> Self;
    fn is_end_of_entry(&self) -> bool;

    /// Types that must already be present in a collection and are never
    /// fabricated on demand (§4.2: `Version` is required and is the sole
    /// exception to "index by type auto-creates").
    fn must_already_exist(&self) -> bool {
        false
    }
}

impl FieldTypeCode for HeaderType {
    fn end_of_entry() -> Self {
        HeaderType::EndOfEntry
    }
    fn is_end_of_entry(&self) -> bool {
        matches!(self, HeaderType::EndOfEntry)
    }
    fn must_already_exist(&self) -> bool {
        matches!(self, HeaderType::Version)
    }
}

impl FieldTypeCode for RecordType {
    fn end_of_entry() -> Self {
        RecordType::EndOfEntry
    }
    fn is_end_of_entry(&self) -> bool {
        matches!(self, RecordType::EndOfEntry)
    }
}

/// A single field: a type code plus its raw payload. Shared shape for both
/// `Header` and `Record` entries (§3 of the format).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field<T> {
    type_code: T,
    raw: Vec<u8>,
}

impl<T: FieldTypeCode> Field<T> {
    /// Construct a field from a type code and its raw payload, as produced
    /// by the container parser.
    pub fn new(type_code: T, raw: Vec<u8>) -> Self {
        Field { type_code, raw }
    }

    pub fn type_code(&self) -> T {
        self.type_code
    }

    /// The canonical byte payload. Round-trips byte-identically for `Text`.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }

    /// Interpret `raw` as UTF-8 text. Fails with `BadFieldWidth` only in the
    /// sense that invalid UTF-8 is treated as a width mismatch at the
    /// boundary of this view (there is no separate "invalid encoding" kind
    /// in §7's taxonomy).
    pub fn as_text(&self) -> Result<&str> {
        std::str::from_utf8(&self.raw).map_err(|_| {
            Error::Format(FormatError::BadFieldWidth {
                expected: self.raw.len(),
                actual: self.raw.len(),
            })
        })
    }

    pub fn set_text(&mut self, value: &str) {
        self.raw = value.as_bytes().to_vec();
    }

    /// Little-endian 32-bit Unix-seconds timestamp. `0` means "unset", and
    /// is reported as `DateTime::<Utc>::MIN_UTC` rather than the 1970 epoch.
    pub fn as_time(&self) -> Result<DateTime<Utc>> {
        let secs = self.as_u32()?;
        if secs == 0 {
            return Ok(DateTime::<Utc>::MIN_UTC);
        }
        Ok(DateTime::from_timestamp(secs as i64, 0).unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    pub fn set_time(&mut self, value: DateTime<Utc>) {
        let secs = value.timestamp().max(0) as u32;
        self.raw = secs.to_le_bytes().to_vec();
    }

    /// 16 raw bytes, no endianness swap on any platform.
    pub fn as_uuid(&self) -> Result<Uuid> {
        let bytes: [u8; 16] = self.raw.as_slice().try_into().map_err(|_| {
            Error::Format(FormatError::BadFieldWidth {
                expected: 16,
                actual: self.raw.len(),
            })
        })?;
        Ok(Uuid::from_bytes(bytes))
    }

    pub fn set_uuid(&mut self, value: Uuid) {
        self.raw = value.into_bytes().to_vec();
    }

    /// Little-endian 16-bit version. Default for new documents is `0x030D`.
    pub fn as_version(&self) -> Result<u16> {
        let bytes: [u8; 2] = self.raw.as_slice().try_into().map_err(|_| {
            Error::Format(FormatError::BadFieldWidth {
                expected: 2,
                actual: self.raw.len(),
            })
        })?;
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn set_version(&mut self, value: u16) {
        self.raw = value.to_le_bytes().to_vec();
    }

    pub fn as_u32(&self) -> Result<u32> {
        let bytes: [u8; 4] = self.raw.as_slice().try_into().map_err(|_| {
            Error::Format(FormatError::BadFieldWidth {
                expected: 4,
                actual: self.raw.len(),
            })
        })?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn set_u32(&mut self, value: u32) {
        self.raw = value.to_le_bytes().to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_type_round_trips_through_u8() {
        for code in 0u8..=255 {
            let ty = HeaderType::from(code);
            assert_eq!(u8::from(ty), code);
        }
    }

    #[test]
    fn record_type_round_trips_through_u8() {
        for code in 0u8..=255 {
            let ty = RecordType::from(code);
            assert_eq!(u8::from(ty), code);
        }
    }

    #[test]
    fn text_round_trips_byte_identical() {
        let mut field = Field::new(RecordType::Title, b"hello".to_vec());
        assert_eq!(field.as_text().unwrap(), "hello");
        field.set_text("caf\u{e9}");
        assert_eq!(field.raw(), "caf\u{e9}".as_bytes());
    }

    #[test]
    fn time_zero_is_minimum() {
        let field = Field::new(RecordType::CreationTime, 0u32.to_le_bytes().to_vec());
        assert_eq!(field.as_time().unwrap(), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn time_round_trips() {
        let mut field = Field::new(RecordType::CreationTime, vec![0; 4]);
        let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        field.set_time(t);
        assert_eq!(field.as_time().unwrap(), t);
    }

    #[test]
    fn bad_width_is_reported() {
        let field = Field::new(RecordType::CreationTime, vec![0; 3]);
        let err = field.as_time().unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::BadFieldWidth {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn uuid_raw_layout_no_swap() {
        let bytes: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let mut field = Field::new(RecordType::Uuid, vec![0; 16]);
        field.set_uuid(Uuid::from_bytes(bytes));
        assert_eq!(field.raw(), &bytes);
    }

    #[test]
    fn version_default_encoding() {
        let mut field = Field::new(HeaderType::Version, vec![0; 2]);
        field.set_version(0x030D);
        assert_eq!(field.as_version().unwrap(), 0x030D);
        assert_eq!(field.raw(), &[0x0D, 0x03]);
    }
}
