// Black-box scenarios from the format's testable-properties section,
// exercised only through the public `Document`/`tokenize` surface.

use pwsafe3::{tokenize, Document, Entry, Token};

#[test]
fn empty_document_round_trips() {
    let mut doc = Document::new("hunter2").unwrap();
    let mut bytes = Vec::new();
    doc.save(&mut bytes, None).unwrap();

    assert!(bytes.len() >= 200);
    assert_eq!(&bytes[0..4], b"PWS3");
    let len = bytes.len();
    assert_eq!(&bytes[len - 44..len - 40], &[0x2D, 0x45, 0x4F, 0x46]);

    let loaded = Document::load(&bytes[..], "hunter2").unwrap();
    assert_eq!(loaded.version().unwrap(), 0x030D);
    assert!(loaded.entries().is_empty());
    assert!(loaded.headers().contains(pwsafe3::HeaderType::Version));
    assert!(loaded.headers().contains(pwsafe3::HeaderType::Uuid));
}

#[test]
fn single_entry_round_trips() {
    let mut doc = Document::new("hunter2").unwrap();
    let mut entry = Entry::with_title("gmail");
    entry.set_username("a@b").unwrap();
    entry.set_password("p!").unwrap();
    doc.entries_mut().add(entry).unwrap();

    let mut bytes = Vec::new();
    doc.save(&mut bytes, None).unwrap();

    let loaded = Document::load(&bytes[..], "hunter2").unwrap();
    assert_eq!(loaded.entries().len(), 1);
    let e = loaded.entries().entry("gmail").unwrap();
    assert_eq!(e.title(), "gmail");
    assert_eq!(e.username(), "a@b");
    assert_eq!(e.password(), "p!");
}

#[test]
fn wrong_passphrase_is_rejected() {
    let mut doc = Document::new("x").unwrap();
    let mut bytes = Vec::new();
    doc.save(&mut bytes, None).unwrap();

    let err = Document::load(&bytes[..], "y").unwrap_err();
    assert!(matches!(
        err,
        pwsafe3::Error::Crypto(pwsafe3::CryptoError::PasswordMismatch)
    ));
}

#[test]
fn truncated_container_is_rejected() {
    let mut doc = Document::new("hunter2").unwrap();
    let mut bytes = Vec::new();
    doc.save(&mut bytes, None).unwrap();
    bytes.truncate(bytes.len() - 1);

    let err = Document::load(&bytes[..], "hunter2").unwrap_err();
    assert!(matches!(
        err,
        pwsafe3::Error::Format(pwsafe3::FormatError::UnrecognizedFormat)
    ));
}

#[test]
fn tampered_body_fails_authentication() {
    let mut doc = Document::new("hunter2").unwrap();
    doc.entries_mut()
        .add(Entry::with_title("gmail"))
        .unwrap();
    let mut bytes = Vec::new();
    doc.save(&mut bytes, None).unwrap();

    bytes[180] ^= 0x01;

    let err = Document::load(&bytes[..], "hunter2").unwrap_err();
    assert!(matches!(
        err,
        pwsafe3::Error::Crypto(pwsafe3::CryptoError::AuthenticationMismatch)
    ));
}

#[test]
fn autotype_with_entry_expands_username_and_password() {
    let mut entry = Entry::new();
    entry.set_username("x").unwrap();
    entry.set_password("y").unwrap();

    let tokens = tokenize("\\u\\t\\p\\n", &entry);
    assert_eq!(
        tokens,
        vec![
            Token::Key("x".into()),
            Token::Key("{Tab}".into()),
            Token::Key("y".into()),
            Token::Key("{Enter}".into()),
        ]
    );
}

#[test]
fn save_reuses_load_time_passphrase_when_none_given() {
    let mut doc = Document::new("hunter2").unwrap();
    doc.entries_mut().add(Entry::with_title("a")).unwrap();
    let mut first = Vec::new();
    doc.save(&mut first, None).unwrap();

    let mut loaded = Document::load(&first[..], "hunter2").unwrap();
    let mut second = Vec::new();
    loaded.save(&mut second, None).unwrap();

    let reloaded = Document::load(&second[..], "hunter2").unwrap();
    assert_eq!(reloaded.entries().len(), 1);
}
