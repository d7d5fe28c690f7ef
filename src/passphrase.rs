// ── pwsafe3 / passphrase ─────────────────────────────────────────────────────
//
// Obfuscated-at-rest custody of the passphrase a Document was opened or
// saved with (§4.6, §10.5). Grounded in `sorng-vault`'s platform split
// (`Cargo.toml`: `windows` DPAPI on Windows, `security-framework` Keychain
// on macOS, `zbus` Secret Service on Linux); other targets fall back to an
// in-process XOR mask, documented as the weaker threat model §4.6 permits.

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Holds a passphrase obfuscated under a platform-provided current-user
/// protection facility. Never exposes the plaintext except through
/// `reveal`, which returns a `Zeroizing` buffer the caller is responsible
/// for dropping promptly.
pub struct Passphrase {
    ciphertext: Zeroizing<Vec<u8>>,
    entropy: [u8; 16],
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passphrase").finish_non_exhaustive()
    }
}

impl Passphrase {
    /// Protects `plaintext` under fresh entropy. Does not take ownership of
    /// the caller's buffer and does not zeroize it — only this crate's own
    /// internal copy is zeroized (§9 open question).
    pub fn new(plaintext: &[u8]) -> Result<Self> {
        let mut entropy = [0u8; 16];
        OsRng.fill_bytes(&mut entropy);
        let ciphertext = Zeroizing::new(backend::protect(plaintext, &entropy)?);
        Ok(Passphrase { ciphertext, entropy })
    }

    /// Replaces the held passphrase with a freshly protected copy of
    /// `plaintext`, re-randomizing the entropy. The previously protected
    /// copy is forgotten from whatever platform facility held it, so
    /// rotating a passphrase doesn't leave the old one behind.
    pub fn set(&mut self, plaintext: &[u8]) -> Result<()> {
        let mut entropy = [0u8; 16];
        OsRng.fill_bytes(&mut entropy);
        let new_ciphertext = Zeroizing::new(backend::protect(plaintext, &entropy)?);
        backend::forget(&self.ciphertext);
        self.ciphertext = new_ciphertext;
        self.entropy = entropy;
        Ok(())
    }

    /// Decrypts and returns a fresh plaintext buffer. The caller must drop
    /// (or otherwise zeroize) it promptly; `Zeroizing` does so automatically
    /// when it goes out of scope.
    pub fn reveal(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(backend::unprotect(
            &self.ciphertext,
            &self.entropy,
        )?))
    }
}

impl Drop for Passphrase {
    fn drop(&mut self) {
        backend::forget(&self.ciphertext);
    }
}

#[cfg(target_os = "windows")]
mod backend {
    use windows::Win32::Foundation::LocalFree;
    use windows::Win32::Security::Cryptography::{
        CryptProtectData, CryptUnprotectData, CRYPT_INTEGER_BLOB, CRYPTPROTECT_UI_FORBIDDEN,
    };

    use crate::error::{Error, Result};

    fn blob(bytes: &[u8]) -> CRYPT_INTEGER_BLOB {
        CRYPT_INTEGER_BLOB {
            cbData: bytes.len() as u32,
            pbData: bytes.as_ptr() as *mut u8,
        }
    }

    /// DPAPI `CryptProtectData` under the current user's master key, with
    /// `entropy` as the (non-secret) associated-data blob.
    pub(super) fn protect(plaintext: &[u8], entropy: &[u8; 16]) -> Result<Vec<u8>> {
        unsafe {
            let input = blob(plaintext);
            let opt_entropy = blob(entropy);
            let mut output = CRYPT_INTEGER_BLOB::default();
            CryptProtectData(
                &input,
                None,
                Some(&opt_entropy),
                None,
                None,
                CRYPTPROTECT_UI_FORBIDDEN,
                &mut output,
            )
            .map_err(|_| Error::InvalidArgument("DPAPI protect failed".into()))?;
            let out = std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec();
            let _ = LocalFree(Some(windows::Win32::Foundation::HLOCAL(
                output.pbData as *mut _,
            )));
            Ok(out)
        }
    }

    pub(super) fn unprotect(ciphertext: &[u8], entropy: &[u8; 16]) -> Result<Vec<u8>> {
        unsafe {
            let input = blob(ciphertext);
            let opt_entropy = blob(entropy);
            let mut output = CRYPT_INTEGER_BLOB::default();
            CryptUnprotectData(
                &input,
                None,
                Some(&opt_entropy),
                None,
                None,
                CRYPTPROTECT_UI_FORBIDDEN,
                &mut output,
            )
            .map_err(|_| Error::InvalidArgument("DPAPI unprotect failed".into()))?;
            let out = std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec();
            let _ = LocalFree(Some(windows::Win32::Foundation::HLOCAL(
                output.pbData as *mut _,
            )));
            Ok(out)
        }
    }

    /// No-op: the DPAPI blob stored in `ciphertext` is the entire protected
    /// artifact, not a handle into some external store, so there's nothing
    /// else to release.
    pub(super) fn forget(_ciphertext: &[u8]) {}
}

#[cfg(target_os = "macos")]
mod backend {
    use security_framework::passwords::{
        delete_generic_password, get_generic_password, set_generic_password,
    };

    use crate::error::{Error, Result};

    const SERVICE: &str = "pwsafe3";

    fn account(entropy: &[u8; 16]) -> String {
        hex_encode(entropy)
    }

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Stores the plaintext directly in the user's login Keychain under a
    /// per-call account name derived from `entropy`; the Keychain item
    /// itself is the protection facility, so `ciphertext` on the `Passphrase`
    /// struct is really just this account name's bytes.
    pub(super) fn protect(plaintext: &[u8], entropy: &[u8; 16]) -> Result<Vec<u8>> {
        set_generic_password(SERVICE, &account(entropy), plaintext)
            .map_err(|_| Error::InvalidArgument("Keychain store failed".into()))?;
        Ok(account(entropy).into_bytes())
    }

    pub(super) fn unprotect(ciphertext: &[u8], _entropy: &[u8; 16]) -> Result<Vec<u8>> {
        let account = std::str::from_utf8(ciphertext)
            .map_err(|_| Error::InvalidArgument("malformed Keychain account tag".into()))?;
        get_generic_password(SERVICE, account)
            .map_err(|_| Error::InvalidArgument("Keychain read failed".into()))
    }

    /// Deletes the Keychain item `ciphertext` names, so rotating or dropping
    /// a `Passphrase` doesn't leave the old entry behind forever. Best
    /// effort: a malformed tag or an already-gone item is not this crate's
    /// problem to report on the way out.
    pub(super) fn forget(ciphertext: &[u8]) {
        if let Ok(account) = std::str::from_utf8(ciphertext) {
            let _ = delete_generic_password(SERVICE, account);
        }
    }
}

#[cfg(target_os = "linux")]
mod backend {
    use std::collections::HashMap;

    use zbus::blocking::{Connection, Proxy};
    use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

    use crate::error::{Error, Result};

    const DEST: &str = "org.freedesktop.secrets";
    const SERVICE_PATH: &str = "/org/freedesktop/secrets";
    const DEFAULT_COLLECTION: &str = "/org/freedesktop/secrets/aliases/default";
    const SERVICE_IFACE: &str = "org.freedesktop.Secret.Service";
    const COLLECTION_IFACE: &str = "org.freedesktop.Secret.Collection";
    const ITEM_IFACE: &str = "org.freedesktop.Secret.Item";
    const ATTR_KEY: &str = "pwsafe3-entropy";

    /// `ciphertext` is prefixed with one of these so `unprotect`/`forget`
    /// know how to interpret the rest without having to guess from
    /// whether a D-Bus session happens to be reachable right now — the two
    /// custody mechanisms' payloads (a lookup tag vs. masked bytes) aren't
    /// otherwise distinguishable, and guessing wrong silently returns
    /// garbage plaintext instead of an error.
    pub(super) const MARKER_SECRET_SERVICE: u8 = 1;
    pub(super) const MARKER_XOR: u8 = 0;

    /// The `(oayays)` secret struct every Secret Service call exchanges:
    /// owning session, algorithm parameters (unused for the "plain"
    /// algorithm), the value itself, and its content type.
    type SecretStruct = (OwnedObjectPath, Vec<u8>, Vec<u8>, String);

    fn dbus_err(context: &str, err: zbus::Error) -> Error {
        Error::InvalidArgument(format!("Secret Service {context} failed: {err}"))
    }

    fn entropy_tag(entropy: &[u8; 16]) -> String {
        entropy.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Opens a "plain" (unencrypted transport) session. This crate relies on
    /// the session bus's own transport security, so it never negotiates the
    /// Diffie-Hellman algorithm Secret Service also offers.
    fn open_session(conn: &Connection) -> Result<OwnedObjectPath> {
        let proxy = Proxy::new(conn, DEST, SERVICE_PATH, SERVICE_IFACE)
            .map_err(|e| dbus_err("service proxy", e))?;
        let (_output, session): (OwnedValue, OwnedObjectPath) = proxy
            .call("OpenSession", &("plain", Value::from("")))
            .map_err(|e| dbus_err("OpenSession", e))?;
        Ok(session)
    }

    /// Stores the passphrase as an item in the default Secret Service
    /// collection, tagged by the hex entropy so `unprotect` can find it
    /// again; the value stamped onto `Passphrase::ciphertext` (after the
    /// marker byte) is that tag, not the secret itself, which never leaves
    /// the daemon's custody. Falls back to the weaker, marker-tagged XOR
    /// mask if no Secret Service daemon answers on the session bus
    /// (headless containers, minimal window managers).
    pub(super) fn protect(plaintext: &[u8], entropy: &[u8; 16]) -> Result<Vec<u8>> {
        let conn = match Connection::session() {
            Ok(conn) => conn,
            Err(_) => return Ok(xor_tagged(plaintext, entropy)),
        };
        match protect_via_secret_service(&conn, plaintext, entropy) {
            Ok(tag) => {
                let mut out = vec![MARKER_SECRET_SERVICE];
                out.extend(tag);
                Ok(out)
            }
            Err(err) => {
                log::warn!("{err}, falling back to XOR mask");
                Ok(xor_tagged(plaintext, entropy))
            }
        }
    }

    pub(super) fn xor_tagged(data: &[u8], entropy: &[u8; 16]) -> Vec<u8> {
        let mut out = vec![MARKER_XOR];
        out.extend(super::xor_mask::apply(data, entropy));
        out
    }

    fn protect_via_secret_service(
        conn: &Connection,
        plaintext: &[u8],
        entropy: &[u8; 16],
    ) -> Result<Vec<u8>> {
        let session = open_session(conn)?;
        let tag = entropy_tag(entropy);

        let mut attributes: HashMap<&str, &str> = HashMap::new();
        attributes.insert(ATTR_KEY, tag.as_str());

        let mut properties: HashMap<&str, Value> = HashMap::new();
        properties.insert(
            "org.freedesktop.Secret.Item.Label",
            Value::from("pwsafe3 passphrase"),
        );
        properties.insert(
            "org.freedesktop.Secret.Item.Attributes",
            Value::from(attributes),
        );

        let secret: SecretStruct = (session, Vec::new(), plaintext.to_vec(), "text/plain".into());

        let collection_path =
            ObjectPath::try_from(DEFAULT_COLLECTION).expect("well-formed static path");
        let collection = Proxy::new(conn, DEST, collection_path, COLLECTION_IFACE)
            .map_err(|e| dbus_err("collection proxy", e))?;
        let _: (OwnedObjectPath, OwnedObjectPath) = collection
            .call("CreateItem", &(properties, secret, true))
            .map_err(|e| dbus_err("CreateItem", e))?;
        Ok(tag.into_bytes())
    }

    /// Dispatches on the marker byte `protect` prefixed onto `ciphertext`:
    /// a Secret Service tag is looked up via `SearchItems` and its secret
    /// read over a fresh session, while an XOR-masked payload is unmasked
    /// directly. The marker means this never has to guess which custody
    /// mechanism produced a given `ciphertext` from D-Bus reachability
    /// alone, so a transiently unreachable daemon is reported as an error
    /// rather than silently unmasking a lookup tag as if it were data.
    pub(super) fn unprotect(ciphertext: &[u8], entropy: &[u8; 16]) -> Result<Vec<u8>> {
        let (marker, rest) = ciphertext
            .split_first()
            .ok_or_else(|| Error::InvalidArgument("empty passphrase ciphertext".into()))?;
        match *marker {
            MARKER_XOR => Ok(super::xor_mask::apply(rest, entropy)),
            MARKER_SECRET_SERVICE => {
                let conn = Connection::session()
                    .map_err(|e| dbus_err("session connect", e))?;
                unprotect_via_secret_service(&conn, rest)
            }
            other => Err(Error::InvalidArgument(format!(
                "unrecognized passphrase ciphertext marker {other}"
            ))),
        }
    }

    /// Looks up the single item tagged with `tag` via `SearchItems`.
    fn find_item(conn: &Connection, tag: &str) -> Result<OwnedObjectPath> {
        let mut attributes: HashMap<&str, &str> = HashMap::new();
        attributes.insert(ATTR_KEY, tag);

        let service = Proxy::new(conn, DEST, SERVICE_PATH, SERVICE_IFACE)
            .map_err(|e| dbus_err("service proxy", e))?;
        let (unlocked, _locked): (Vec<OwnedObjectPath>, Vec<OwnedObjectPath>) = service
            .call("SearchItems", &(attributes,))
            .map_err(|e| dbus_err("SearchItems", e))?;
        unlocked
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidArgument("no matching Secret Service item".into()))
    }

    fn unprotect_via_secret_service(conn: &Connection, tag: &[u8]) -> Result<Vec<u8>> {
        let tag = std::str::from_utf8(tag)
            .map_err(|_| Error::InvalidArgument("malformed Secret Service tag".into()))?;
        let item_path = find_item(conn, tag)?;

        let session = open_session(conn)?;
        let item = Proxy::new(conn, DEST, item_path, ITEM_IFACE)
            .map_err(|e| dbus_err("item proxy", e))?;
        let secret: SecretStruct = item
            .call("GetSecret", &(session,))
            .map_err(|e| dbus_err("GetSecret", e))?;
        Ok(secret.2)
    }

    /// Deletes the tagged item from the Secret Service, so rotating or
    /// dropping a `Passphrase` doesn't leave the old secret behind. A no-op
    /// for an XOR-masked `ciphertext` (nothing external was ever created).
    /// Best effort otherwise: no bus, no daemon, or an already-gone item is
    /// not reported.
    pub(super) fn forget(ciphertext: &[u8]) {
        let Some((&marker, rest)) = ciphertext.split_first() else {
            return;
        };
        if marker != MARKER_SECRET_SERVICE {
            return;
        }
        let Ok(tag) = std::str::from_utf8(rest) else {
            return;
        };
        let Ok(conn) = Connection::session() else {
            return;
        };
        let Ok(item_path) = find_item(&conn, tag) else {
            return;
        };
        if let Ok(item) = Proxy::new(&conn, DEST, item_path, ITEM_IFACE) {
            let _: std::result::Result<OwnedObjectPath, zbus::Error> = item.call("Delete", &());
        }
    }
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
mod backend {
    use crate::error::Result;

    pub(super) fn protect(plaintext: &[u8], entropy: &[u8; 16]) -> Result<Vec<u8>> {
        Ok(super::xor_mask::apply(plaintext, entropy))
    }

    pub(super) fn unprotect(ciphertext: &[u8], entropy: &[u8; 16]) -> Result<Vec<u8>> {
        Ok(super::xor_mask::apply(ciphertext, entropy))
    }

    /// No-op: the XOR mask is entirely in-process, nothing external to
    /// release.
    pub(super) fn forget(_ciphertext: &[u8]) {}
}

/// Weaker fallback threat model: an in-process XOR mask keyed by the
/// instance's entropy. Protects only against casual memory inspection, not
/// against a determined attacker with process access — documented per
/// §4.6's requirement to flag the weaker substitute explicitly.
#[allow(dead_code)]
mod xor_mask {
    pub(super) fn apply(data: &[u8], entropy: &[u8; 16]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, b)| b ^ entropy[i % entropy.len()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let p = Passphrase::new(b"hunter2").unwrap();
        let revealed = p.reveal().unwrap();
        assert_eq!(&**revealed, b"hunter2");
    }

    #[test]
    fn set_replaces_held_passphrase() {
        let mut p = Passphrase::new(b"first").unwrap();
        p.set(b"second").unwrap();
        assert_eq!(&**p.reveal().unwrap(), b"second");
    }

    #[test]
    fn xor_mask_round_trips() {
        let entropy = [9u8; 16];
        let masked = xor_mask::apply(b"hunter2", &entropy);
        assert_ne!(masked, b"hunter2");
        assert_eq!(xor_mask::apply(&masked, &entropy), b"hunter2");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_xor_fallback_ciphertext_is_marker_tagged_and_round_trips() {
        let entropy = [9u8; 16];
        let ciphertext = backend::xor_tagged(b"hunter2", &entropy);
        assert_eq!(ciphertext[0], backend::MARKER_XOR);
        assert_eq!(backend::unprotect(&ciphertext, &entropy).unwrap(), b"hunter2");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_unprotect_rejects_unknown_marker() {
        let entropy = [9u8; 16];
        let ciphertext = vec![0xFF, 0x00];
        assert!(backend::unprotect(&ciphertext, &entropy).is_err());
    }
}
