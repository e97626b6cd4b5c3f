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

//! Whole-file content digests over the APK's content-bearing sections.
//!
//! Two strategies exist, selected by the signature algorithm ID:
//!
//! 1. Chunked: zip entries, central directory and EOCD are split into 1 MiB
//!    chunks; each chunk is hashed as `H(0xa5 || size || chunk)` and the
//!    concatenated chunk digests are hashed once more as
//!    `H(0x5a || count || digests)`.
//! 2. Verity: the same sections are split into 4 KiB blocks, each hashed
//!    with an 8-byte zero salt prepended, and the resulting digest stream is
//!    folded block-wise until one block remains; the file size (signing
//!    block excluded) is appended as a little-endian u64.
//!
//! In both cases the EOCD is digested with its central-directory-offset
//! field replaced by the signing-block offset, because inserting the signing
//! block shifts the real central directory.

use bytes::{BufMut, BytesMut};
use openssl::hash::{Hasher, MessageDigest};
use std::cmp::min;
use std::io::{Read, Seek, SeekFrom};

use crate::algorithms::ContentDigestAlgorithm;
use crate::error::ParseError;
use crate::ziputil::{set_central_directory_offset, ApkSections};

const CHUNK_SIZE_BYTES: u64 = 1024 * 1024;
const CHUNK_HEADER_TOP: u8 = 0x5a;
const CHUNK_HEADER_MID: u8 = 0xa5;

const VERITY_BLOCK_SIZE: usize = 4096;
const VERITY_SALT: [u8; 8] = [0u8; 8];

impl<R: Read + Seek> ApkSections<R> {
    /// Computes the content digest of this APK with the given strategy,
    /// reading the file in bounded windows.
    pub(crate) fn compute_digest(
        &mut self,
        algorithm: ContentDigestAlgorithm,
    ) -> Result<Vec<u8>, ParseError> {
        match algorithm {
            ContentDigestAlgorithm::ChunkedSha256 | ContentDigestAlgorithm::ChunkedSha512 => {
                self.chunked_digest(algorithm.message_digest())
            }
            ContentDigestAlgorithm::VerityChunkedSha256 => {
                self.verity_digest(algorithm.message_digest())
            }
        }
    }

    fn chunked_digest(&mut self, digest: MessageDigest) -> Result<Vec<u8>, ParseError> {
        let mut chunk_digests = BytesMut::new();
        let mut chunk_count = 0u32;
        let mut buf = vec![0u8; CHUNK_SIZE_BYTES as usize];

        let windows = [
            (0u64, self.signing_block_offset as u64),
            (self.central_directory_offset as u64, self.central_directory_size as u64),
        ];
        for &(offset, size) in &windows {
            self.inner.seek(SeekFrom::Start(offset))?;
            let mut remaining = size;
            while remaining > 0 {
                let chunk_size = min(CHUNK_SIZE_BYTES, remaining) as usize;
                self.inner.read_exact(&mut buf[..chunk_size])?;
                chunk_digests
                    .put_slice(&chunk_digest(digest, CHUNK_HEADER_MID, &buf[..chunk_size])?);
                chunk_count += 1;
                remaining -= chunk_size as u64;
            }
        }
        // The EOCD is patched in memory before digesting.
        for chunk in self.patched_eocd()?.chunks(CHUNK_SIZE_BYTES as usize) {
            chunk_digests.put_slice(&chunk_digest(digest, CHUNK_HEADER_MID, chunk)?);
            chunk_count += 1;
        }

        let mut hasher = Hasher::new(digest)?;
        hasher.update(&[CHUNK_HEADER_TOP])?;
        hasher.update(&chunk_count.to_le_bytes())?;
        hasher.update(&chunk_digests)?;
        Ok(hasher.finish()?.as_ref().to_vec())
    }

    fn verity_digest(&mut self, digest: MessageDigest) -> Result<Vec<u8>, ParseError> {
        if self.signing_block_offset % VERITY_BLOCK_SIZE as u32 != 0 {
            return Err(ParseError::MisalignedVerity(self.signing_block_offset));
        }

        // Level zero: block digests of the zip entries, then of the central
        // directory and patched EOCD, the latter zero-padded to a full block.
        let mut level = BytesMut::new();
        self.inner.seek(SeekFrom::Start(0))?;
        let mut block = [0u8; VERITY_BLOCK_SIZE];
        let mut remaining = self.signing_block_offset as u64;
        while remaining > 0 {
            // The region is block-aligned, so these reads are always full blocks.
            self.inner.read_exact(&mut block)?;
            level.put_slice(&salted_block_digest(digest, &block)?);
            remaining -= VERITY_BLOCK_SIZE as u64;
        }
        let mut tail = self.bytes(self.central_directory_offset, self.central_directory_size)?;
        tail.extend_from_slice(&self.patched_eocd()?);
        zero_pad_to_block(&mut tail);
        for chunk in tail.chunks(VERITY_BLOCK_SIZE) {
            level.put_slice(&salted_block_digest(digest, chunk)?);
        }

        // Fold the digest stream until it fits a single block.
        let mut data = level.to_vec();
        zero_pad_to_block(&mut data);
        while data.len() > VERITY_BLOCK_SIZE {
            let mut next = Vec::with_capacity(data.len() / VERITY_BLOCK_SIZE * 64);
            for chunk in data.chunks(VERITY_BLOCK_SIZE) {
                next.extend_from_slice(&salted_block_digest(digest, chunk)?);
            }
            zero_pad_to_block(&mut next);
            data = next;
        }

        let file_size = self.eocd_offset as u64 + self.eocd_size as u64;
        let digested_size = file_size - self.signing_block_size as u64;
        let mut result = salted_block_digest(digest, &data)?;
        result.extend_from_slice(&digested_size.to_le_bytes());
        Ok(result)
    }

    fn patched_eocd(&mut self) -> Result<Vec<u8>, ParseError> {
        let mut eocd = self.bytes(self.eocd_offset, self.eocd_size)?;
        set_central_directory_offset(&mut eocd, self.signing_block_offset)?;
        Ok(eocd)
    }
}

fn chunk_digest(digest: MessageDigest, header: u8, chunk: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut hasher = Hasher::new(digest)?;
    hasher.update(&[header])?;
    hasher.update(&(chunk.len() as u32).to_le_bytes())?;
    hasher.update(chunk)?;
    Ok(hasher.finish()?.as_ref().to_vec())
}

fn salted_block_digest(digest: MessageDigest, block: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut hasher = Hasher::new(digest)?;
    hasher.update(&VERITY_SALT)?;
    hasher.update(block)?;
    Ok(hasher.finish()?.as_ref().to_vec())
}

fn zero_pad_to_block(data: &mut Vec<u8>) {
    let remainder = data.len() % VERITY_BLOCK_SIZE;
    if remainder != 0 {
        data.resize(data.len() + VERITY_BLOCK_SIZE - remainder, 0);
    }
}
