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

//! Signature algorithm IDs used by APK Signature Scheme v2/v3.
//!
//! Every defined ID is recognized so it can be named when dumping a signing
//! block, but only the RSASSA-PKCS1-v1_5 family is in the supported set for
//! verification; the rest answer with `UnsupportedAlgorithm`.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use openssl::hash::MessageDigest;
use openssl::pkey::{self, PKey};
use openssl::rsa::Padding;
use openssl::sign::Verifier;

use crate::error::VerificationError;

/// A signature algorithm ID declared in a digest or signature record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum SignatureAlgorithmID {
    /// RSASSA-PSS with SHA2-256, 1 MiB chunked digest.
    RsaPssWithSha256 = 0x0101,
    /// RSASSA-PSS with SHA2-512, 1 MiB chunked digest.
    RsaPssWithSha512 = 0x0102,
    /// RSASSA-PKCS1-v1_5 with SHA2-256, 1 MiB chunked digest.
    RsaPkcs1V15WithSha256 = 0x0103,
    /// RSASSA-PKCS1-v1_5 with SHA2-512, 1 MiB chunked digest.
    RsaPkcs1V15WithSha512 = 0x0104,
    /// ECDSA with SHA2-256, 1 MiB chunked digest.
    EcdsaWithSha256 = 0x0201,
    /// ECDSA with SHA2-512, 1 MiB chunked digest.
    EcdsaWithSha512 = 0x0202,
    /// DSA with SHA2-256, 1 MiB chunked digest.
    DsaWithSha256 = 0x0301,
    /// RSASSA-PKCS1-v1_5 with SHA2-256, fs-verity style 4 KiB digest.
    VerityRsaPkcs1V15WithSha256 = 0x0421,
    /// ECDSA with SHA2-256, fs-verity style 4 KiB digest.
    VerityEcdsaWithSha256 = 0x0423,
    /// DSA with SHA2-256, fs-verity style 4 KiB digest.
    VerityDsaWithSha256 = 0x0425,
}

impl SignatureAlgorithmID {
    /// Looks up a declared algorithm ID; `None` for IDs that are not even
    /// recognized for display.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::from_u32(id)
    }

    /// The numeric ID as it appears on the wire.
    pub fn id(&self) -> u32 {
        *self as u32
    }

    /// Short human-readable name, for dumps.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithmID::RsaPssWithSha256 => "RSASSA-PSS with SHA2-256",
            SignatureAlgorithmID::RsaPssWithSha512 => "RSASSA-PSS with SHA2-512",
            SignatureAlgorithmID::RsaPkcs1V15WithSha256 => "RSASSA-PKCS1-v1_5 with SHA2-256",
            SignatureAlgorithmID::RsaPkcs1V15WithSha512 => "RSASSA-PKCS1-v1_5 with SHA2-512",
            SignatureAlgorithmID::EcdsaWithSha256 => "ECDSA with SHA2-256",
            SignatureAlgorithmID::EcdsaWithSha512 => "ECDSA with SHA2-512",
            SignatureAlgorithmID::DsaWithSha256 => "DSA with SHA2-256",
            SignatureAlgorithmID::VerityRsaPkcs1V15WithSha256 => {
                "RSASSA-PKCS1-v1_5 with SHA2-256 (verity)"
            }
            SignatureAlgorithmID::VerityEcdsaWithSha256 => "ECDSA with SHA2-256 (verity)",
            SignatureAlgorithmID::VerityDsaWithSha256 => "DSA with SHA2-256 (verity)",
        }
    }

    /// Whether verification is implemented for this algorithm.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            SignatureAlgorithmID::RsaPkcs1V15WithSha256
                | SignatureAlgorithmID::RsaPkcs1V15WithSha512
                | SignatureAlgorithmID::VerityRsaPkcs1V15WithSha256
        )
    }

    /// The content digest strategy this algorithm declares for the APK.
    pub(crate) fn content_digest_algorithm(&self) -> ContentDigestAlgorithm {
        match self {
            SignatureAlgorithmID::RsaPssWithSha256
            | SignatureAlgorithmID::RsaPkcs1V15WithSha256
            | SignatureAlgorithmID::EcdsaWithSha256
            | SignatureAlgorithmID::DsaWithSha256 => ContentDigestAlgorithm::ChunkedSha256,
            SignatureAlgorithmID::RsaPssWithSha512
            | SignatureAlgorithmID::RsaPkcs1V15WithSha512
            | SignatureAlgorithmID::EcdsaWithSha512 => ContentDigestAlgorithm::ChunkedSha512,
            SignatureAlgorithmID::VerityRsaPkcs1V15WithSha256
            | SignatureAlgorithmID::VerityEcdsaWithSha256
            | SignatureAlgorithmID::VerityDsaWithSha256 => {
                ContentDigestAlgorithm::VerityChunkedSha256
            }
        }
    }

    pub(crate) fn message_digest(&self) -> MessageDigest {
        match self {
            SignatureAlgorithmID::RsaPssWithSha512
            | SignatureAlgorithmID::RsaPkcs1V15WithSha512
            | SignatureAlgorithmID::EcdsaWithSha512 => MessageDigest::sha512(),
            _ => MessageDigest::sha256(),
        }
    }

    fn rsa_padding(&self) -> Padding {
        match self {
            SignatureAlgorithmID::RsaPssWithSha256 | SignatureAlgorithmID::RsaPssWithSha512 => {
                Padding::PKCS1_PSS
            }
            SignatureAlgorithmID::RsaPkcs1V15WithSha256
            | SignatureAlgorithmID::RsaPkcs1V15WithSha512
            | SignatureAlgorithmID::VerityRsaPkcs1V15WithSha256 => Padding::PKCS1,
            _ => Padding::NONE,
        }
    }

    /// Builds an OpenSSL verifier for this algorithm over the given key.
    pub(crate) fn new_verifier<'a>(
        &self,
        public_key: &'a PKey<pkey::Public>,
    ) -> Result<Verifier<'a>, VerificationError> {
        if !self.is_supported() {
            return Err(VerificationError::UnsupportedAlgorithm(self.id()));
        }
        if public_key.id() != pkey::Id::RSA {
            // A non-RSA key cannot validate an RSA signature.
            return Err(VerificationError::InvalidSignature);
        }
        let mut verifier = Verifier::new(self.message_digest(), public_key)?;
        verifier.set_rsa_padding(self.rsa_padding())?;
        Ok(verifier)
    }
}

/// The two-level digest strategies over the APK's content-bearing sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ContentDigestAlgorithm {
    ChunkedSha256,
    ChunkedSha512,
    VerityChunkedSha256,
}

impl ContentDigestAlgorithm {
    pub(crate) fn message_digest(&self) -> MessageDigest {
        match self {
            ContentDigestAlgorithm::ChunkedSha256
            | ContentDigestAlgorithm::VerityChunkedSha256 => MessageDigest::sha256(),
            ContentDigestAlgorithm::ChunkedSha512 => MessageDigest::sha512(),
        }
    }
}
