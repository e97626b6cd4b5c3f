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

//! Error types for APK Signing Block parsing and verification.
//!
//! The two enums are deliberately disjoint: `ParseError` means the input is
//! not a well-formed signing block, `VerificationError` means the block is
//! well-formed but a signer does not check out cryptographically.

use std::io;
use thiserror::Error;

/// Structural errors raised while decoding signing-block bytes or while
/// reading the APK for digest computation.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The twin size fields or the 16-byte magic of the signing block are wrong.
    #[error("APK Signing Block magic or size fields are invalid")]
    BadMagicOrSize,
    /// A length-prefixed field claims more bytes than are available.
    #[error("truncated data in APK Signing Block")]
    Truncated,
    /// The verity padding block contains non-zero bytes.
    #[error("verity padding block is not zero-filled")]
    InvalidPadding,
    /// Non-zero bytes remain after all declared fields of a record.
    #[error("trailing garbage after length-prefixed fields")]
    TrailingGarbage,
    /// Verity digests require the signing block to start on a 4096-byte boundary.
    #[error("APK Signing Block offset {0} is not a multiple of 4096")]
    MisalignedVerity(u32),
    /// Reading the APK failed.
    #[error("IO error")]
    Io(#[from] io::Error),
    /// The digest backend failed.
    #[error("OpenSSL failure")]
    Ssl(#[from] openssl::error::ErrorStack),
}

/// Semantic errors raised while verifying a signer against the APK contents.
/// These flip the owning scheme block to "not verified" and never abort
/// processing of sibling blocks.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The scheme block contains no signers.
    #[error("no signers")]
    EmptySigners,
    /// A signer carries no certificates.
    #[error("no certificates")]
    EmptyCertificates,
    /// A signer carries no digests.
    #[error("no digests")]
    EmptyDigests,
    /// A signer carries no signatures.
    #[error("no signatures")]
    EmptySignatures,
    /// The signer's public key does not match the first certificate.
    #[error("public key does not match the first certificate")]
    PublicKeyMismatch,
    /// Digests and signatures declare different signature algorithm ID sets.
    #[error("signature algorithm IDs of digests and signatures are not identical")]
    AlgorithmSetMismatch,
    /// A recomputed content digest differs from the declared one.
    #[error("digest mismatch: expected {expected}, got {got}")]
    DigestMismatch {
        /// Hex encoding of the digest declared in the signed data.
        expected: String,
        /// Hex encoding of the digest recomputed from the APK.
        got: String,
    },
    /// A signature did not verify over the signed data.
    #[error("signature is invalid")]
    InvalidSignature,
    /// The algorithm ID is not in the supported set (it may still be shown
    /// when dumping).
    #[error("unsupported signature algorithm: {0:#06x}")]
    UnsupportedAlgorithm(u32),
    /// Digest recomputation hit a structural problem (e.g. misaligned verity).
    #[error("cannot parse while verifying")]
    Parse(#[from] ParseError),
    /// Key or certificate decoding failed.
    #[error("OpenSSL failure")]
    Ssl(#[from] openssl::error::ErrorStack),
}
