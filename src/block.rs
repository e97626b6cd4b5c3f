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

//! Parser for the outer structure of the APK Signing Block.
//!
//! FORMAT:
//! OFFSET       DATA TYPE  DESCRIPTION
//! * @+0  bytes uint64:    size in bytes (excluding this field)
//! * @+8  bytes pairs:     uint64 length, uint32 ID, (length - 4) bytes value
//! * @-24 bytes uint64:    size in bytes (same as the one above)
//! * @-16 bytes uint128:   magic "APK Sig Block 42"

use bytes::{Buf, Bytes};
use log::warn;

use crate::error::ParseError;
use crate::scheme::{decode_scheme, SchemeVersion, Signer};

/// Pair ID of the APK Signature Scheme v2 block.
pub const APK_SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109871a;
/// Pair ID of the APK Signature Scheme v3 block.
pub const APK_SIGNATURE_SCHEME_V3_BLOCK_ID: u32 = 0xf05368c0;
/// Pair ID of the zero-filled padding block used for 4096-byte alignment.
pub const VERITY_PADDING_BLOCK_ID: u32 = 0x42726577;
/// Pair ID of the (opaque) dependency-info block.
pub const DEPENDENCY_INFO_BLOCK_ID: u32 = 0x504b4453;
/// Pair ID of the (opaque) Google Play frosting block.
pub const GOOGLE_PLAY_FROSTING_BLOCK_ID: u32 = 0x2146444e;

pub(crate) const APK_SIG_BLOCK_MAGIC: u128 = 0x3234206b636f6c4220676953204b5041;
pub(crate) const APK_SIG_BLOCK_MIN_SIZE: usize = 32;

/// A fully parsed APK Signing Block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApkSigningBlock {
    /// The ID-value pairs, in file order.
    pub pairs: Vec<Pair>,
}

/// One ID-value pair of the signing block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pair {
    /// The declared pair length (covers ID and value).
    pub length: u64,
    /// The pair ID selecting the value's interpretation.
    pub id: u32,
    /// The decoded value.
    pub value: BlockValue,
}

/// The decoded value of a pair, dispatched by its ID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockValue {
    /// An APK Signature Scheme v2 or v3 block.
    Scheme(SchemeBlock),
    /// Zero-filled padding keeping the central directory 4096-byte aligned.
    VerityPadding,
    /// Opaque dependency metadata added by build tools.
    DependencyInfo(Bytes),
    /// Opaque Google Play metadata.
    GooglePlayFrosting(Bytes),
    /// A pair with an ID this parser does not know.
    Unknown(Bytes),
}

/// A v2/v3 scheme block and the result of verifying it, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemeBlock {
    /// Scheme version.
    pub version: SchemeVersion,
    /// The signers; empty if the block failed to decode.
    pub signers: Vec<Signer>,
    /// `None` until verification runs; `Some(false)` straight from parsing
    /// when the block's own structure was malformed.
    pub verified: Option<bool>,
}

/// Parses a complete APK Signing Block, magic and size fields included.
///
/// Structural errors in the outer pair sequence abort the whole parse;
/// errors inside a single scheme block are contained to that block, which
/// comes back with no signers and `verified == Some(false)`.
pub fn parse_apk_signing_block(data: &[u8]) -> Result<ApkSigningBlock, ParseError> {
    if data.len() < APK_SIG_BLOCK_MIN_SIZE {
        return Err(ParseError::BadMagicOrSize);
    }
    let mut magic = &data[data.len() - 16..];
    let mut size_in_header = &data[..8];
    let mut size_in_footer = &data[data.len() - 24..data.len() - 16];
    let size_in_header = size_in_header.get_u64_le();
    let size_in_footer = size_in_footer.get_u64_le();
    if magic.get_u128_le() != APK_SIG_BLOCK_MAGIC
        || size_in_header != size_in_footer
        || size_in_header != (data.len() - 8) as u64
    {
        return Err(ParseError::BadMagicOrSize);
    }

    let buf = Bytes::copy_from_slice(data);
    let mut pairs_buf = buf.slice(8..buf.len() - 24);
    let mut pairs = Vec::new();
    while pairs_buf.has_remaining() {
        if pairs_buf.remaining() < 12 {
            return Err(ParseError::Truncated);
        }
        let length = pairs_buf.get_u64_le();
        if length < 4 || length > pairs_buf.remaining() as u64 {
            return Err(ParseError::Truncated);
        }
        let mut pair = pairs_buf.split_to(length as usize);
        let id = pair.get_u32_le();
        pairs.push(Pair { length, id, value: decode_block_value(id, pair)? });
    }
    Ok(ApkSigningBlock { pairs })
}

fn decode_block_value(id: u32, value: Bytes) -> Result<BlockValue, ParseError> {
    Ok(match id {
        APK_SIGNATURE_SCHEME_V2_BLOCK_ID => {
            BlockValue::Scheme(decode_scheme_block(&value, SchemeVersion::V2))
        }
        APK_SIGNATURE_SCHEME_V3_BLOCK_ID => {
            BlockValue::Scheme(decode_scheme_block(&value, SchemeVersion::V3))
        }
        VERITY_PADDING_BLOCK_ID => {
            if value.iter().any(|b| *b != 0) {
                return Err(ParseError::InvalidPadding);
            }
            BlockValue::VerityPadding
        }
        DEPENDENCY_INFO_BLOCK_ID => BlockValue::DependencyInfo(value),
        GOOGLE_PLAY_FROSTING_BLOCK_ID => BlockValue::GooglePlayFrosting(value),
        _ => BlockValue::Unknown(value),
    })
}

fn decode_scheme_block(value: &Bytes, version: SchemeVersion) -> SchemeBlock {
    match decode_scheme(value, version) {
        Ok(signers) => SchemeBlock { version, signers, verified: None },
        Err(e) => {
            warn!("v{} signature scheme block failed to decode: {}", version.number(), e);
            SchemeBlock { version, signers: Vec::new(), verified: Some(false) }
        }
    }
}

impl SchemeBlock {
    /// All signers decoded from the block.
    pub fn signers(&self) -> &[Signer] {
        &self.signers
    }
}
