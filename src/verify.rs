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

//! Cryptographic verification of decoded signers against the APK contents.
//!
//! A signer passes when, in order:
//! 1. it has at least one certificate, digest and signature,
//! 2. its public key equals the first certificate's SubjectPublicKeyInfo,
//! 3. digests and signatures declare identical algorithm ID sets,
//! 4. every declared content digest matches a recomputation from the file,
//! 5. every signature verifies over the raw signed data.
//!
//! The first failing check decides the error; later checks do not run.

use anyhow::Result;
use log::warn;
use openssl::pkey::PKey;
use openssl::x509::X509;
use std::io::{Read, Seek};
use std::path::Path;

use crate::algorithms::SignatureAlgorithmID;
use crate::block::{BlockValue, Pair, SchemeBlock};
use crate::error::VerificationError;
use crate::scheme::Signer;
use crate::ziputil::ApkSections;

/// Verifies one signer against the APK the sections were opened over.
pub fn verify_signer<R: Read + Seek>(
    signer: &Signer,
    sections: &mut ApkSections<R>,
) -> Result<(), VerificationError> {
    let signed_data = &signer.signed_data;
    if signed_data.certificates.is_empty() {
        return Err(VerificationError::EmptyCertificates);
    }
    if signed_data.digests.is_empty() {
        return Err(VerificationError::EmptyDigests);
    }
    if signer.signatures.is_empty() {
        return Err(VerificationError::EmptySignatures);
    }

    // The key that made the signatures must be the key the first certificate
    // certifies, byte for byte in SubjectPublicKeyInfo form.
    let certificate = X509::from_der(&signed_data.certificates[0].der)?;
    let certified_key = certificate.public_key()?.public_key_to_der()?;
    if certified_key != signer.public_key.der.as_ref() {
        return Err(VerificationError::PublicKeyMismatch);
    }

    let mut digest_ids: Vec<u32> =
        signed_data.digests.iter().map(|d| d.signature_algorithm_id).collect();
    let mut signature_ids: Vec<u32> =
        signer.signatures.iter().map(|s| s.signature_algorithm_id).collect();
    digest_ids.sort_unstable();
    signature_ids.sort_unstable();
    if digest_ids != signature_ids {
        return Err(VerificationError::AlgorithmSetMismatch);
    }

    for digest in &signed_data.digests {
        let algorithm = lookup_supported(digest.signature_algorithm_id)?;
        let computed = sections.compute_digest(algorithm.content_digest_algorithm())?;
        if computed != digest.digest.as_ref() {
            return Err(VerificationError::DigestMismatch {
                expected: hex::encode(&digest.digest),
                got: hex::encode(&computed),
            });
        }
    }

    let public_key = PKey::public_key_from_der(&signer.public_key.der)?;
    for signature in &signer.signatures {
        let algorithm = lookup_supported(signature.signature_algorithm_id)?;
        let mut verifier = algorithm.new_verifier(&public_key)?;
        verifier.update(&signed_data.raw)?;
        if !verifier.verify(&signature.signature)? {
            return Err(VerificationError::InvalidSignature);
        }
    }
    Ok(())
}

fn lookup_supported(id: u32) -> Result<SignatureAlgorithmID, VerificationError> {
    SignatureAlgorithmID::from_id(id)
        .filter(|a| a.is_supported())
        .ok_or(VerificationError::UnsupportedAlgorithm(id))
}

/// Verifies every signer of a scheme block. A block with no signers fails.
pub fn verify_scheme_block<R: Read + Seek>(
    block: &SchemeBlock,
    sections: &mut ApkSections<R>,
) -> Result<(), VerificationError> {
    if block.signers.is_empty() {
        return Err(VerificationError::EmptySigners);
    }
    for signer in &block.signers {
        verify_signer(signer, sections)?;
    }
    Ok(())
}

/// Verifies every scheme block among the given pairs against the APK at
/// `apk_path`, returning `(pair ID, outcome)` in file order. Non-scheme
/// pairs come back with `None`; a scheme block that fails to verify yields
/// `Some(false)` and does not stop its siblings from being checked.
pub fn verify_signing_block<P: AsRef<Path>>(
    pairs: &[Pair],
    apk_path: P,
) -> Result<Vec<(u32, Option<bool>)>> {
    let apk = std::fs::File::open(apk_path.as_ref())?;
    let mut sections = ApkSections::new(apk)?;
    let mut results = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let outcome = match &pair.value {
            BlockValue::Scheme(block) => match verify_scheme_block(block, &mut sections) {
                Ok(()) => Some(true),
                Err(e) => {
                    warn!("v{} signature scheme block failed: {}", block.version.number(), e);
                    Some(false)
                }
            },
            _ => None,
        };
        results.push((pair.id, outcome));
    }
    Ok(results)
}
