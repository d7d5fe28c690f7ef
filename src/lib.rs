//! Reads, mutates, and writes Password Safe V3 (`.psafe3`) encrypted
//! database files.
//!
//! The container is an authenticated, tag-delimited byte stream: a TwoFish-
//! 256 body under a passphrase-stretched key, an HMAC-SHA-256 over field
//! values, and a length-type-value field framing with a historically quirky
//! padding rule (`codec`). On top of that sits a typed field model
//! (`field`, `collection`), an entry/document object model (`entry`,
//! `document`), and a small escape-language tokenizer for auto-type
//! scripts (`autotype`).
//!
//! Start at [`Document`]: `Document::new` for a fresh database,
//! `Document::load` to open an existing one, `document.save` to persist it.

mod autotype;
mod codec;
mod collection;
mod entry;
mod error;
mod field;
mod handle;
mod keyschedule;
mod passphrase;

pub mod document;

pub use autotype::{tokenize, tokenize_unbound, Token};
pub use collection::FieldCollection;
pub use document::{Document, DocumentOptions};
pub use entry::{CollectionId, Entry, EntryCollection};
pub use error::{CryptoError, DomainError, Error, FormatError, Result};
pub use field::{Field, FieldTypeCode, HeaderType, RecordType, END_OF_ENTRY};
pub use passphrase::Passphrase;
