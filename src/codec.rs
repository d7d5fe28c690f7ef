// ── pwsafe3 / codec ──────────────────────────────────────────────────────────
//
// Parses and emits the authenticated V3 byte stream (§4.4): tag sanity
// checks, key unwrap, CBC body (de/en)cryption, length-type-value field
// framing with the "never lands on a 16-byte boundary" pad quirk, and the
// HMAC-SHA-256 computed over field *value* bytes only. This module owns the
// on-disk layout; `Document` owns orchestration (stamping, passphrase
// custody) around calls to `load`/`save`.

use std::io::Write;

use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use twofish::Twofish;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Error, FormatError, Result};
use crate::field::{Field, FieldTypeCode, HeaderType, RecordType};
use crate::keyschedule::{check_verifier, stretch_key, unwrap_key, verifier, wrap_key};

type TwofishCbcEnc = cbc::Encryptor<Twofish>;
type TwofishCbcDec = cbc::Decryptor<Twofish>;
type HmacSha256 = Hmac<Sha256>;

const TAG: u32 = 0x3353_5750;
const EOF: u32 = 0x464F_452D;
const MIN_CONTAINER_LEN: usize = 200;

/// The two fixed-size regions that bracket the ciphertext body.
const PREAMBLE_LEN: usize = 4 + 32 + 4 + 32 + 32 + 32 + 16;
const TRAILER_LEN: usize = 16 + 32;

fn eof_marker() -> [u8; 16] {
    let mut m = [0u8; 16];
    m[0..4].copy_from_slice(&TAG.to_le_bytes());
    m[4..8].copy_from_slice(&EOF.to_le_bytes());
    m[8..12].copy_from_slice(&TAG.to_le_bytes());
    m[12..16].copy_from_slice(&EOF.to_le_bytes());
    m
}

/// `((length + 5) / 16 + 1) * 16` — the field's `type` byte is treated as a
/// fifth byte of the length header, and the block always pads up to the
/// *next* boundary, never landing on one exactly.
fn block_size(length: usize) -> usize {
    ((length + 5) / 16 + 1) * 16
}

fn encode_field(type_code: u8, value: &[u8], rng: &mut impl RngCore, out: &mut Vec<u8>) {
    let total = block_size(value.len());
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.push(type_code);
    out.extend_from_slice(value);
    let pad_len = total - 5 - value.len();
    let pad_start = out.len();
    out.resize(pad_start + pad_len, 0);
    rng.fill_bytes(&mut out[pad_start..]);
}

fn decode_field(data: &[u8]) -> Result<(u8, &[u8], usize)> {
    if data.len() < 5 {
        return Err(Error::Format(FormatError::UnrecognizedFormat));
    }
    let length = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
    let type_code = data[4];
    let total = block_size(length);
    if data.len() < total {
        return Err(Error::Format(FormatError::UnrecognizedFormat));
    }
    Ok((type_code, &data[5..5 + length], total))
}

/// Everything recovered from a container's plaintext body, independent of
/// the `Document` shape that will be built from it.
#[derive(Debug)]
pub struct DecodedBody {
    pub headers: Vec<Field<HeaderType>>,
    pub entries: Vec<Vec<Field<RecordType>>>,
    pub iterations: u32,
}

/// Load algorithm, §4.4. `bytes` is the entire container file.
pub fn load(bytes: &[u8], passphrase: &[u8]) -> Result<DecodedBody> {
    let len = bytes.len();
    if len < MIN_CONTAINER_LEN || &bytes[0..4] != b"PWS3" {
        return Err(Error::Format(FormatError::UnrecognizedFormat));
    }
    if bytes[len - TRAILER_LEN..len - TRAILER_LEN + 16] != eof_marker() {
        return Err(Error::Format(FormatError::UnrecognizedFormat));
    }

    let salt: [u8; 32] = bytes[4..36].try_into().unwrap();
    let iterations = u32::from_le_bytes(bytes[36..40].try_into().unwrap());
    let h_p_prime: [u8; 32] = bytes[40..72].try_into().unwrap();
    let wrapped_k: [u8; 32] = bytes[72..104].try_into().unwrap();
    let wrapped_l: [u8; 32] = bytes[104..136].try_into().unwrap();
    let iv: [u8; 16] = bytes[136..PREAMBLE_LEN].try_into().unwrap();
    let ciphertext = &bytes[PREAMBLE_LEN..len - TRAILER_LEN];
    if ciphertext.len() % 16 != 0 {
        return Err(Error::Format(FormatError::UnrecognizedFormat));
    }

    let stretched = stretch_key(passphrase, &salt, iterations);
    check_verifier(&stretched, &h_p_prime)?;

    let k = unwrap_key(&stretched, &wrapped_k);
    let l = unwrap_key(&stretched, &wrapped_l);

    let mut body = Zeroizing::new(ciphertext.to_vec());
    let written = TwofishCbcDec::new(k.as_ref().into(), (&iv).into())
        .decrypt_padded_mut::<NoPadding>(&mut body)
        .map_err(|_| Error::Format(FormatError::UnrecognizedFormat))?
        .len();
    body.truncate(written);

    let mut mac =
        HmacSha256::new_from_slice(l.as_ref()).expect("any key length is valid for hmac");

    // Past this point the passphrase has already been verified against the
    // stored stretched-key check value, so the body decrypted correctly
    // under the right key. Any framing inconsistency found while walking
    // its fields can therefore only come from a tampered ciphertext byte
    // (CBC garbles the whole block it lands in), never from an honest
    // format mismatch — report it the same way the trailing HMAC compare
    // would: `AuthenticationMismatch`, not `UnrecognizedFormat`.
    let malformed = || Error::Crypto(CryptoError::AuthenticationMismatch);

    let mut cursor = 0usize;
    let mut headers = Vec::new();
    loop {
        let (type_code, value, consumed) = decode_field(&body[cursor..]).map_err(|_| malformed())?;
        mac.update(value);
        cursor += consumed;
        let ty = HeaderType::from(type_code);
        if ty.is_end_of_entry() {
            break;
        }
        headers.push(Field::new(ty, value.to_vec()));
    }
    let version_ok = headers.first().map_or(false, |f| {
        matches!(f.type_code(), HeaderType::Version)
            && f.as_version().map(|v| v >= 0x0300).unwrap_or(false)
    });
    if !version_ok {
        return Err(Error::Format(FormatError::UnsupportedVersion));
    }

    let mut entries = Vec::new();
    let mut current = Vec::new();
    while cursor < body.len() {
        let (type_code, value, consumed) = decode_field(&body[cursor..]).map_err(|_| malformed())?;
        mac.update(value);
        cursor += consumed;
        let ty = RecordType::from(type_code);
        if ty.is_end_of_entry() {
            entries.push(std::mem::take(&mut current));
            continue;
        }
        current.push(Field::new(ty, value.to_vec()));
    }

    mac.verify_slice(&bytes[len - (TRAILER_LEN - 16)..len])
        .map_err(|_| Error::Crypto(CryptoError::AuthenticationMismatch))?;

    log::info!(
        "loaded Password Safe V3 container: {} header field(s), {} entries",
        headers.len(),
        entries.len()
    );

    Ok(DecodedBody {
        headers,
        entries,
        iterations,
    })
}

/// Save algorithm, §4.4. Writes a complete container to `writer`. Caller is
/// responsible for clamping/stamping headers beforehand (`Document::save`).
pub fn save<W: Write>(
    writer: &mut W,
    headers: &[Field<HeaderType>],
    entries: &[Vec<Field<RecordType>>],
    passphrase: &[u8],
    iterations: u32,
) -> Result<()> {
    let mut rng = OsRng;

    let mut salt = [0u8; 32];
    rng.fill_bytes(&mut salt);
    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut iv);

    let mut k_bytes = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut *k_bytes);
    let mut l_bytes = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut *l_bytes);

    let stretched = stretch_key(passphrase, &salt, iterations);
    let h_p_prime = verifier(&stretched);
    let wrapped_k = wrap_key(&stretched, &k_bytes);
    let wrapped_l = wrap_key(&stretched, &l_bytes);

    let mut mac =
        HmacSha256::new_from_slice(l_bytes.as_ref()).expect("any key length is valid for hmac");
    let mut plaintext = Vec::new();

    for field in headers {
        mac.update(field.raw());
        encode_field(field.type_code().into(), field.raw(), &mut rng, &mut plaintext);
    }
    mac.update(&[]);
    encode_field(
        HeaderType::end_of_entry().into(),
        &[],
        &mut rng,
        &mut plaintext,
    );

    for record_set in entries {
        for field in record_set {
            mac.update(field.raw());
            encode_field(field.type_code().into(), field.raw(), &mut rng, &mut plaintext);
        }
        mac.update(&[]);
        encode_field(
            RecordType::end_of_entry().into(),
            &[],
            &mut rng,
            &mut plaintext,
        );
    }

    let mut plaintext = Zeroizing::new(plaintext);
    debug_assert_eq!(plaintext.len() % 16, 0, "every field block is 16-byte aligned");
    let plaintext_len = plaintext.len();
    TwofishCbcEnc::new(k_bytes.as_ref().into(), (&iv).into())
        .encrypt_padded_mut::<NoPadding>(&mut plaintext, plaintext_len)
        .expect("body length is already a multiple of the block size");

    writer.write_all(b"PWS3")?;
    writer.write_all(&salt)?;
    writer.write_all(&iterations.to_le_bytes())?;
    writer.write_all(&h_p_prime)?;
    writer.write_all(&wrapped_k)?;
    writer.write_all(&wrapped_l)?;
    writer.write_all(&iv)?;
    writer.write_all(&plaintext)?;
    writer.write_all(&eof_marker())?;
    writer.write_all(&mac.finalize().into_bytes())?;

    log::info!(
        "saved Password Safe V3 container: {} header field(s), {} entries, {} iterations",
        headers.len(),
        entries.len(),
        iterations
    );

    Ok(())
}
