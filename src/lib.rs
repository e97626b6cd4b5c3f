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

//! Parsing and verification of the APK Signing Block.
//!
//! The signing block sits between the zip entries and the central directory
//! of an APK and carries ID-value pairs, among them the APK Signature Scheme
//! v2 and v3 blocks. This crate parses the whole structure into typed values
//! and verifies scheme blocks against the file contents: content digests
//! (1 MiB chunked and fs-verity style) plus RSASSA-PKCS1-v1_5 signatures.
//!
//! Signing is out of scope; the crate only consumes existing blocks.

mod algorithms;
mod block;
mod bytes_ext;
mod digest;
mod error;
mod scheme;
mod verify;
mod ziputil;

#[allow(dead_code)]
pub mod testing;

use anyhow::Result;
use std::fs::File;
use std::path::Path;

pub use crate::algorithms::SignatureAlgorithmID;
pub use crate::block::{
    parse_apk_signing_block, ApkSigningBlock, BlockValue, Pair, SchemeBlock,
    APK_SIGNATURE_SCHEME_V2_BLOCK_ID, APK_SIGNATURE_SCHEME_V3_BLOCK_ID, DEPENDENCY_INFO_BLOCK_ID,
    GOOGLE_PLAY_FROSTING_BLOCK_ID, VERITY_PADDING_BLOCK_ID,
};
pub use crate::error::{ParseError, VerificationError};
pub use crate::scheme::{
    AdditionalAttribute, Certificate, Digest, PublicKey, SchemeVersion, SignedData, Signature,
    Signer, PROOF_OF_ROTATION_STRUCT_ID, STRIPPING_PROTECTION_ATTR_ID,
};
pub use crate::verify::{verify_scheme_block, verify_signer, verify_signing_block};
pub use crate::ziputil::{zip_sections, ApkSections, ZipSections};

/// Extracts and parses the APK Signing Block of the APK at `apk_path`.
/// Scheme blocks come back decoded but unverified.
pub fn parse_apk<P: AsRef<Path>>(apk_path: P) -> Result<ApkSigningBlock> {
    let apk = File::open(apk_path.as_ref())?;
    let mut sections = ApkSections::new(apk)?;
    let block = sections.signing_block()?;
    Ok(parse_apk_signing_block(&block)?)
}

/// Parses the APK at `apk_path` and verifies every scheme block it carries.
/// Returns `(pair ID, outcome)` in file order; `None` for non-scheme pairs.
pub fn verify_apk<P: AsRef<Path>>(apk_path: P) -> Result<Vec<(u32, Option<bool>)>> {
    let block = parse_apk(apk_path.as_ref())?;
    verify_signing_block(&block.pairs, apk_path)
}
