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

//! Utilities for testing: encoders producing signing-block bytes for the
//! parser to chew on. The library itself never signs anything; these exist
//! so tests do not need binary fixtures checked in.

/// Asserts that `haystack` contains `needle`.
pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(haystack.contains(needle), "{} is not found in {}", needle, haystack);
}

fn length_prefixed(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Encodes a sequence: a length prefix over length-prefixed records.
pub fn encode_sequence(records: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    for record in records {
        body.extend_from_slice(&length_prefixed(record));
    }
    length_prefixed(&body)
}

/// Encodes one digest record: algorithm ID plus length-prefixed digest.
pub fn encode_digest_record(signature_algorithm_id: u32, digest: &[u8]) -> Vec<u8> {
    let mut out = signature_algorithm_id.to_le_bytes().to_vec();
    out.extend_from_slice(&length_prefixed(digest));
    out
}

/// Encodes one signature record: algorithm ID plus length-prefixed signature.
pub fn encode_signature_record(signature_algorithm_id: u32, signature: &[u8]) -> Vec<u8> {
    encode_digest_record(signature_algorithm_id, signature)
}

fn encode_attributes(attributes: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let records: Vec<Vec<u8>> = attributes
        .iter()
        .map(|(id, value)| {
            let mut record = id.to_le_bytes().to_vec();
            record.extend_from_slice(value);
            record
        })
        .collect();
    encode_sequence(&records)
}

/// Encodes a v2 signed-data blob from digest records, certificate DERs and
/// additional attributes.
pub fn encode_signed_data(
    digests: &[Vec<u8>],
    certificates: &[&[u8]],
    attributes: &[(u32, Vec<u8>)],
) -> Vec<u8> {
    let mut out = encode_sequence(digests);
    let certs: Vec<Vec<u8>> = certificates.iter().map(|c| c.to_vec()).collect();
    out.extend_from_slice(&encode_sequence(&certs));
    out.extend_from_slice(&encode_attributes(attributes));
    out
}

/// Encodes a v3 signed-data blob; v3 adds the SDK bounds between the
/// certificates and the attributes.
pub fn encode_signed_data_v3(
    digests: &[Vec<u8>],
    certificates: &[&[u8]],
    min_sdk: u32,
    max_sdk: u32,
    attributes: &[(u32, Vec<u8>)],
) -> Vec<u8> {
    let mut out = encode_sequence(digests);
    let certs: Vec<Vec<u8>> = certificates.iter().map(|c| c.to_vec()).collect();
    out.extend_from_slice(&encode_sequence(&certs));
    out.extend_from_slice(&min_sdk.to_le_bytes());
    out.extend_from_slice(&max_sdk.to_le_bytes());
    out.extend_from_slice(&encode_attributes(attributes));
    out
}

/// Encodes a v2 signer record.
pub fn encode_signer(signed_data: &[u8], signatures: &[Vec<u8>], public_key: &[u8]) -> Vec<u8> {
    let mut out = length_prefixed(signed_data);
    out.extend_from_slice(&encode_sequence(signatures));
    out.extend_from_slice(&length_prefixed(public_key));
    out
}

/// Encodes a v3 signer record; v3 adds the SDK bounds between the signed
/// data and the signatures.
pub fn encode_signer_v3(
    signed_data: &[u8],
    min_sdk: u32,
    max_sdk: u32,
    signatures: &[Vec<u8>],
    public_key: &[u8],
) -> Vec<u8> {
    let mut out = length_prefixed(signed_data);
    out.extend_from_slice(&min_sdk.to_le_bytes());
    out.extend_from_slice(&max_sdk.to_le_bytes());
    out.extend_from_slice(&encode_sequence(signatures));
    out.extend_from_slice(&length_prefixed(public_key));
    out
}

/// Encodes a complete APK Signing Block from ID-value pairs, twin size
/// fields and magic included.
pub fn encode_signing_block(pairs: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (id, value) in pairs {
        body.extend_from_slice(&(value.len() as u64 + 4).to_le_bytes());
        body.extend_from_slice(&id.to_le_bytes());
        body.extend_from_slice(value);
    }
    let size = (body.len() + 24) as u64;
    let mut out = size.to_le_bytes().to_vec();
    out.extend_from_slice(&body);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(b"APK Sig Block 42");
    out
}
