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

//! Decoder for APK Signature Scheme v2/v3 block values.
//!
//! The two scheme versions share one wire layout; v3 inserts a pair of
//! little-endian u32 SDK-version fields after the signed data at the signer
//! level and after the certificates inside the signed data.

use bytes::{Buf, Bytes};

use crate::bytes_ext::{
    ensure_remainder_is_zero, read_length_prefixed_slice, read_sequence, ReadFromBytes,
};
use crate::error::ParseError;

/// Additional-attribute ID of the v2 stripping protection attribute.
/// Parsed but not enforced.
pub const STRIPPING_PROTECTION_ATTR_ID: u32 = 0xbeeff00d;
/// Additional-attribute ID of the v3 proof-of-rotation struct.
/// Parsed but not enforced.
pub const PROOF_OF_ROTATION_STRUCT_ID: u32 = 0x3ba06f8c;

/// Version of an APK Signature Scheme block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemeVersion {
    /// APK Signature Scheme v2.
    V2,
    /// APK Signature Scheme v3, with per-signer SDK-version bounds.
    V3,
}

impl SchemeVersion {
    /// Numeric scheme version, as shown to users.
    pub fn number(self) -> u32 {
        match self {
            SchemeVersion::V2 => 2,
            SchemeVersion::V3 => 3,
        }
    }

    fn has_sdk_bounds(self) -> bool {
        self == SchemeVersion::V3
    }
}

/// One signer of a scheme block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signer {
    /// The decoded signed data of this signer.
    pub signed_data: SignedData,
    /// Minimum SDK version this signer applies to (v3 only).
    pub min_sdk: Option<u32>,
    /// Maximum SDK version this signer applies to (v3 only).
    pub max_sdk: Option<u32>,
    /// Signatures over the raw signed data bytes.
    pub signatures: Vec<Signature>,
    /// DER-encoded SubjectPublicKeyInfo of the signing key.
    pub public_key: PublicKey,
}

/// The signed-data section of a signer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedData {
    /// The exact sub-buffer the signatures are computed over. Kept verbatim;
    /// re-serializing the decoded fields would not be byte-identical in
    /// general and would break signature verification.
    pub raw: Bytes,
    /// Declared content digests, one per signature algorithm.
    pub digests: Vec<Digest>,
    /// DER-encoded X.509 certificate chain; the first entry holds the
    /// signing key.
    pub certificates: Vec<Certificate>,
    /// Minimum SDK version (v3 only); must match the signer-level value.
    pub min_sdk: Option<u32>,
    /// Maximum SDK version (v3 only); must match the signer-level value.
    pub max_sdk: Option<u32>,
    /// Additional attributes, opaque except for the two known IDs.
    pub additional_attributes: Vec<AdditionalAttribute>,
}

/// A declared content digest of the APK.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digest {
    /// Signature algorithm ID that selects hash and chunking strategy.
    pub signature_algorithm_id: u32,
    /// The digest bytes.
    pub digest: Bytes,
}

/// A signature over the raw signed data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Signature algorithm ID that selects hash and padding.
    pub signature_algorithm_id: u32,
    /// The signature bytes.
    pub signature: Bytes,
}

/// A DER-encoded X.509 certificate, kept opaque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    /// Raw DER bytes.
    pub der: Bytes,
}

/// A DER-encoded public key (SubjectPublicKeyInfo).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    /// Raw DER bytes.
    pub der: Bytes,
}

/// An ID-tagged additional attribute inside the signed data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdditionalAttribute {
    /// Attribute ID.
    pub id: u32,
    /// Opaque attribute value.
    pub value: Bytes,
}

impl AdditionalAttribute {
    /// Whether this is the v2 stripping protection attribute.
    pub fn is_stripping_protection(&self) -> bool {
        self.id == STRIPPING_PROTECTION_ATTR_ID
    }

    /// Whether this is the v3 proof-of-rotation struct.
    pub fn is_proof_of_rotation(&self) -> bool {
        self.id == PROOF_OF_ROTATION_STRUCT_ID
    }
}

/// Decodes a scheme block value into its signers. The value starts with a
/// 4-byte length that must account for the whole remainder.
pub(crate) fn decode_scheme(
    value: &Bytes,
    version: SchemeVersion,
) -> Result<Vec<Signer>, ParseError> {
    let mut buf = value.clone();
    let sequence_length = u32::read_from_bytes(&mut buf)? as usize;
    if sequence_length > buf.remaining() {
        return Err(ParseError::Truncated);
    }
    if sequence_length < buf.remaining() {
        return Err(ParseError::TrailingGarbage);
    }
    let mut signers = Vec::new();
    while buf.has_remaining() {
        let mut record = read_length_prefixed_slice(&mut buf)?;
        signers.push(decode_signer(&mut record, version)?);
    }
    Ok(signers)
}

fn decode_signer(buf: &mut Bytes, version: SchemeVersion) -> Result<Signer, ParseError> {
    let raw_signed_data = read_length_prefixed_slice(buf)?;
    let signed_data = decode_signed_data(&raw_signed_data, version)?;
    let (min_sdk, max_sdk) = read_sdk_bounds(buf, version)?;
    let signatures = read_sequence::<Signature>(buf)?;
    let public_key = PublicKey { der: read_length_prefixed_slice(buf)? };
    ensure_remainder_is_zero(buf)?;
    Ok(Signer { signed_data, min_sdk, max_sdk, signatures, public_key })
}

fn decode_signed_data(raw: &Bytes, version: SchemeVersion) -> Result<SignedData, ParseError> {
    let mut buf = raw.clone();
    let digests = read_sequence::<Digest>(&mut buf)?;
    let certificates = read_sequence::<Certificate>(&mut buf)?;
    let (min_sdk, max_sdk) = read_sdk_bounds(&mut buf, version)?;
    let additional_attributes = read_sequence::<AdditionalAttribute>(&mut buf)?;
    ensure_remainder_is_zero(&buf)?;
    Ok(SignedData {
        raw: raw.clone(),
        digests,
        certificates,
        min_sdk,
        max_sdk,
        additional_attributes,
    })
}

fn read_sdk_bounds(
    buf: &mut Bytes,
    version: SchemeVersion,
) -> Result<(Option<u32>, Option<u32>), ParseError> {
    if !version.has_sdk_bounds() {
        return Ok((None, None));
    }
    let min_sdk = u32::read_from_bytes(buf)?;
    let max_sdk = u32::read_from_bytes(buf)?;
    Ok((Some(min_sdk), Some(max_sdk)))
}

impl ReadFromBytes for Digest {
    fn read_from_bytes(buf: &mut Bytes) -> Result<Self, ParseError> {
        Ok(Self {
            signature_algorithm_id: u32::read_from_bytes(buf)?,
            digest: read_length_prefixed_slice(buf)?,
        })
    }
}

impl ReadFromBytes for Signature {
    fn read_from_bytes(buf: &mut Bytes) -> Result<Self, ParseError> {
        Ok(Self {
            signature_algorithm_id: u32::read_from_bytes(buf)?,
            signature: read_length_prefixed_slice(buf)?,
        })
    }
}

impl ReadFromBytes for Certificate {
    fn read_from_bytes(buf: &mut Bytes) -> Result<Self, ParseError> {
        let der = buf.split_to(buf.remaining());
        Ok(Self { der })
    }
}

impl ReadFromBytes for AdditionalAttribute {
    fn read_from_bytes(buf: &mut Bytes) -> Result<Self, ParseError> {
        let id = u32::read_from_bytes(buf)?;
        let value = buf.split_to(buf.remaining());
        Ok(Self { id, value })
    }
}
