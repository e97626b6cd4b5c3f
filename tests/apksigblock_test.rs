/*
 * Copyright (C) 2023 The Android Open Source Project
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! End-to-end tests over APKs synthesized at test time: a zip is written,
//! digested, signed with a fresh RSA key, and a signing block is spliced in
//! between the zip entries and the central directory.

use apksigblock::testing::{
    encode_digest_record, encode_sequence, encode_signature_record, encode_signed_data,
    encode_signed_data_v3, encode_signer, encode_signer_v3, encode_signing_block,
};
use apksigblock::{
    parse_apk, verify_apk, verify_scheme_block, ApkSections, BlockValue, SchemeVersion,
    VerificationError, APK_SIGNATURE_SCHEME_V2_BLOCK_ID, APK_SIGNATURE_SCHEME_V3_BLOCK_ID,
    VERITY_PADDING_BLOCK_ID,
};
use openssl::asn1::Asn1Time;
use openssl::hash::{Hasher, MessageDigest};
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::Signer as OpensslSigner;
use openssl::x509::X509Builder;
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;
use zip::{write::FileOptions, ZipWriter};

const EOCD_SIZE: usize = 22;
const RSA_PKCS1_SHA256: u32 = 0x0103;

fn base_zip() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("AndroidManifest.xml", FileOptions::default()).unwrap();
    writer.write_all(b"<manifest/>").unwrap();
    writer.start_file("assets/data.bin", FileOptions::default()).unwrap();
    writer.write_all(&[0x42u8; 2000]).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Offsets of the central directory and the EOCD in a plain zip.
fn zip_layout(zip: &[u8]) -> (usize, usize) {
    let eocd_offset = zip.len() - EOCD_SIZE;
    let cd_offset =
        u32::from_le_bytes(zip[eocd_offset + 16..eocd_offset + 20].try_into().unwrap()) as usize;
    (cd_offset, eocd_offset)
}

/// Reference 1 MiB chunked digest, computed independently of the library.
/// All windows in these tests are below 1 MiB, so each is a single chunk.
fn reference_chunked_sha256(windows: &[&[u8]]) -> Vec<u8> {
    let mut chunk_digests = Vec::new();
    for window in windows {
        let mut hasher = Hasher::new(MessageDigest::sha256()).unwrap();
        hasher.update(&[0xa5]).unwrap();
        hasher.update(&(window.len() as u32).to_le_bytes()).unwrap();
        hasher.update(window).unwrap();
        chunk_digests.extend_from_slice(hasher.finish().unwrap().as_ref());
    }
    let mut hasher = Hasher::new(MessageDigest::sha256()).unwrap();
    hasher.update(&[0x5a]).unwrap();
    hasher.update(&(windows.len() as u32).to_le_bytes()).unwrap();
    hasher.update(&chunk_digests).unwrap();
    hasher.finish().unwrap().as_ref().to_vec()
}

fn generate_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

fn self_signed_cert_der(key: &PKey<Private>) -> Vec<u8> {
    let mut builder = X509Builder::new().unwrap();
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build().to_der().unwrap()
}

fn sign_pkcs1_sha256(key: &PKey<Private>, data: &[u8]) -> Vec<u8> {
    let mut signer = OpensslSigner::new(MessageDigest::sha256(), key).unwrap();
    signer.set_rsa_padding(Padding::PKCS1).unwrap();
    signer.update(data).unwrap();
    signer.sign_to_vec().unwrap()
}

/// Builds the scheme block value: one signer declaring one chunked SHA-256
/// digest, with a real signature over the signed data.
fn scheme_value(key: &PKey<Private>, digest: &[u8], version: SchemeVersion) -> Vec<u8> {
    let cert = self_signed_cert_der(key);
    let digests = [encode_digest_record(RSA_PKCS1_SHA256, digest)];
    let signed_data = match version {
        SchemeVersion::V2 => encode_signed_data(&digests, &[&cert], &[]),
        SchemeVersion::V3 => encode_signed_data_v3(&digests, &[&cert], 24, 35, &[]),
    };
    let signature = encode_signature_record(RSA_PKCS1_SHA256, &sign_pkcs1_sha256(key, &signed_data));
    let public_key = key.public_key_to_der().unwrap();
    let signer = match version {
        SchemeVersion::V2 => encode_signer(&signed_data, &[signature], &public_key),
        SchemeVersion::V3 => encode_signer_v3(&signed_data, 24, 35, &[signature], &public_key),
    };
    encode_sequence(&[signer])
}

/// Splices a signing block into a plain zip before its central directory
/// and fixes up the EOCD's central-directory-offset field.
fn splice_signing_block(zip: &[u8], block: &[u8]) -> Vec<u8> {
    let (cd_offset, _) = zip_layout(zip);
    let mut apk = zip[..cd_offset].to_vec();
    apk.extend_from_slice(block);
    apk.extend_from_slice(&zip[cd_offset..]);
    let new_cd_offset = (cd_offset + block.len()) as u32;
    let field_offset = apk.len() - EOCD_SIZE + 16;
    apk[field_offset..field_offset + 4].copy_from_slice(&new_cd_offset.to_le_bytes());
    apk
}

fn write_temp_apk(apk: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(apk).unwrap();
    file.flush().unwrap();
    file
}

/// A signed APK whose signing block holds the given scheme pair plus a
/// verity padding pair before and an unknown pair after it.
fn signed_apk(key: &PKey<Private>, scheme_block_id: u32, version: SchemeVersion) -> Vec<u8> {
    let zip = base_zip();
    let (cd_offset, eocd_offset) = zip_layout(&zip);
    // After splicing, the digested windows are exactly the original zip:
    // the central directory is unchanged and the EOCD's offset field is
    // patched back to the signing-block offset before digesting.
    let digest = reference_chunked_sha256(&[
        &zip[..cd_offset],
        &zip[cd_offset..eocd_offset],
        &zip[eocd_offset..],
    ]);
    let block = encode_signing_block(&[
        (VERITY_PADDING_BLOCK_ID, vec![0u8; 16]),
        (scheme_block_id, scheme_value(key, &digest, version)),
        (0xdeadbeef, vec![1, 2, 3, 4]),
    ]);
    splice_signing_block(&zip, &block)
}

#[test]
fn parses_spliced_signing_block() {
    let key = generate_key();
    let apk = signed_apk(&key, APK_SIGNATURE_SCHEME_V2_BLOCK_ID, SchemeVersion::V2);
    let file = write_temp_apk(&apk);

    let block = parse_apk(file.path()).unwrap();
    assert_eq!(block.pairs.len(), 3);
    assert_eq!(block.pairs[0].id, VERITY_PADDING_BLOCK_ID);
    assert_eq!(block.pairs[0].value, BlockValue::VerityPadding);
    match &block.pairs[1].value {
        BlockValue::Scheme(scheme) => {
            assert_eq!(scheme.version, SchemeVersion::V2);
            assert_eq!(scheme.signers.len(), 1);
            assert_eq!(scheme.verified, None);
            let signer = &scheme.signers[0];
            assert_eq!(signer.signed_data.digests.len(), 1);
            assert_eq!(signer.signed_data.digests[0].signature_algorithm_id, RSA_PKCS1_SHA256);
        }
        other => panic!("expected a scheme block, got {:?}", other),
    }
    assert!(matches!(block.pairs[2].value, BlockValue::Unknown(_)));
}

#[test]
fn verifies_v2_signed_apk() {
    let key = generate_key();
    let apk = signed_apk(&key, APK_SIGNATURE_SCHEME_V2_BLOCK_ID, SchemeVersion::V2);
    let file = write_temp_apk(&apk);

    let results = verify_apk(file.path()).unwrap();
    assert_eq!(
        results,
        vec![
            (VERITY_PADDING_BLOCK_ID, None),
            (APK_SIGNATURE_SCHEME_V2_BLOCK_ID, Some(true)),
            (0xdeadbeef, None),
        ]
    );
}

#[test]
fn verifies_v3_signed_apk() {
    let key = generate_key();
    let apk = signed_apk(&key, APK_SIGNATURE_SCHEME_V3_BLOCK_ID, SchemeVersion::V3);
    let file = write_temp_apk(&apk);

    let block = parse_apk(file.path()).unwrap();
    match &block.pairs[1].value {
        BlockValue::Scheme(scheme) => {
            assert_eq!(scheme.signers[0].min_sdk, Some(24));
            assert_eq!(scheme.signers[0].max_sdk, Some(35));
        }
        other => panic!("expected a scheme block, got {:?}", other),
    }

    let results = verify_apk(file.path()).unwrap();
    assert_eq!(results[1], (APK_SIGNATURE_SCHEME_V3_BLOCK_ID, Some(true)));
}

#[test]
fn tampered_content_fails_verification() {
    let key = generate_key();
    let mut apk = signed_apk(&key, APK_SIGNATURE_SCHEME_V2_BLOCK_ID, SchemeVersion::V2);
    // Flip the last byte of the zip-entries section. The central directory
    // still parses, so this only shows up in the content digest.
    let zip = base_zip();
    let (cd_offset, _) = zip_layout(&zip);
    apk[cd_offset - 1] ^= 0xff;
    let file = write_temp_apk(&apk);

    let results = verify_apk(file.path()).unwrap();
    assert_eq!(results[1], (APK_SIGNATURE_SCHEME_V2_BLOCK_ID, Some(false)));
    // The other pairs are unaffected.
    assert_eq!(results[0], (VERITY_PADDING_BLOCK_ID, None));
    assert_eq!(results[2], (0xdeadbeef, None));
}

#[test]
fn tampered_signature_reports_invalid_signature() {
    let key = generate_key();
    let zip = base_zip();
    let (cd_offset, eocd_offset) = zip_layout(&zip);
    let digest = reference_chunked_sha256(&[
        &zip[..cd_offset],
        &zip[cd_offset..eocd_offset],
        &zip[eocd_offset..],
    ]);

    // Sign over different bytes than the signed data that lands in the block.
    let cert = self_signed_cert_der(&key);
    let signed_data = encode_signed_data(&[encode_digest_record(RSA_PKCS1_SHA256, &digest)], &[&cert], &[]);
    let mut bad_signature = sign_pkcs1_sha256(&key, &signed_data);
    bad_signature[0] ^= 0xff;
    let signer = encode_signer(
        &signed_data,
        &[encode_signature_record(RSA_PKCS1_SHA256, &bad_signature)],
        &key.public_key_to_der().unwrap(),
    );
    let block = encode_signing_block(&[(
        APK_SIGNATURE_SCHEME_V2_BLOCK_ID,
        encode_sequence(&[signer]),
    )]);
    let apk = splice_signing_block(&zip, &block);
    let file = write_temp_apk(&apk);

    let parsed = parse_apk(file.path()).unwrap();
    let scheme = match &parsed.pairs[0].value {
        BlockValue::Scheme(scheme) => scheme,
        other => panic!("expected a scheme block, got {:?}", other),
    };
    let mut sections = ApkSections::new(std::fs::File::open(file.path()).unwrap()).unwrap();
    let res = verify_scheme_block(scheme, &mut sections);
    assert!(matches!(res, Err(VerificationError::InvalidSignature)));
}

#[test]
fn wrong_declared_digest_reports_digest_mismatch() {
    let key = generate_key();
    let zip = base_zip();
    let wrong_digest = vec![0u8; 32];
    let block = encode_signing_block(&[(
        APK_SIGNATURE_SCHEME_V2_BLOCK_ID,
        scheme_value(&key, &wrong_digest, SchemeVersion::V2),
    )]);
    let apk = splice_signing_block(&zip, &block);
    let file = write_temp_apk(&apk);

    let parsed = parse_apk(file.path()).unwrap();
    let scheme = match &parsed.pairs[0].value {
        BlockValue::Scheme(scheme) => scheme,
        other => panic!("expected a scheme block, got {:?}", other),
    };
    let mut sections = ApkSections::new(std::fs::File::open(file.path()).unwrap()).unwrap();
    let res = verify_scheme_block(scheme, &mut sections);
    assert!(matches!(res, Err(VerificationError::DigestMismatch { .. })));
}
