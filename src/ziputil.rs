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

//! Locating the zip sections and the APK Signing Block within an APK.
//!
//! The APK has four major sections:
//!
//! | Zip contents | APK Signing Block | Central directory | EOCD |
//!
//! [`ApkSections`] carries the offset/size of every section except the zip
//! contents, along with the reader, and is what the digest engine and the
//! verifier operate on.

use anyhow::{anyhow, bail, ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Buf;
use std::io::{self, Read, Seek, SeekFrom};
use zip::ZipArchive;

use crate::block::{APK_SIG_BLOCK_MAGIC, APK_SIG_BLOCK_MIN_SIZE};
use crate::error::ParseError;

const EOCD_SIZE_WITHOUT_COMMENT: usize = 22;
const EOCD_CENTRAL_DIRECTORY_SIZE_FIELD_OFFSET: usize = 12;
const EOCD_CENTRAL_DIRECTORY_OFFSET_FIELD_OFFSET: usize = 16;
/// End of Central Directory signature
const EOCD_SIGNATURE: u32 = 0x06054b50;
const ZIP64_MARK: u32 = 0xffffffff;

/// Offsets and sizes of the central directory and the EOCD record.
#[derive(Debug, PartialEq, Eq)]
pub struct ZipSections {
    /// Where the central directory starts.
    pub central_directory_offset: u32,
    /// Size of the central directory in bytes.
    pub central_directory_size: u32,
    /// Where the EOCD record starts.
    pub eocd_offset: u32,
    /// Size of the EOCD record, comment included.
    pub eocd_size: u32,
}

/// Discovers the layout of a zip file.
pub fn zip_sections<R: Read + Seek>(mut reader: R) -> Result<(R, ZipSections)> {
    // Let the zip crate find the EOCD for us.
    let archive = ZipArchive::new(reader)?;
    let eocd_size = archive.comment().len() + EOCD_SIZE_WITHOUT_COMMENT;
    ensure!(archive.offset() == 0, "Invalid ZIP: offset should be 0, but {}.", archive.offset());
    reader = archive.into_inner();
    // The reader is left positioned at the EOCD after a successful open.
    let eocd_offset = reader.stream_position()? as u32;
    let mut eocd = vec![0u8; eocd_size];
    reader.read_exact(&mut eocd)?;
    ensure!(
        (&eocd[0..]).get_u32_le() == EOCD_SIGNATURE,
        "Invalid ZIP: EOCD not found where expected."
    );
    let (central_directory_size, central_directory_offset) = get_central_directory(&eocd)?;
    ensure!(
        central_directory_offset != ZIP64_MARK && central_directory_size != ZIP64_MARK,
        "Unsupported ZIP: ZIP64 is not supported."
    );
    ensure!(
        central_directory_offset + central_directory_size == eocd_offset,
        "Invalid ZIP: EOCD should follow CD with no extra data or overlap."
    );
    Ok((
        reader,
        ZipSections {
            central_directory_offset,
            central_directory_size,
            eocd_offset,
            eocd_size: eocd_size as u32,
        },
    ))
}

fn get_central_directory(buf: &[u8]) -> Result<(u32, u32)> {
    ensure!(buf.len() >= EOCD_SIZE_WITHOUT_COMMENT, "Invalid EOCD size: {}", buf.len());
    let mut buf = &buf[EOCD_CENTRAL_DIRECTORY_SIZE_FIELD_OFFSET..];
    let size = buf.get_u32_le();
    let offset = buf.get_u32_le();
    Ok((size, offset))
}

/// Overwrites the EOCD's central-directory-offset field. Digests are
/// computed as if this field held the signing-block offset, since inserting
/// the block moves the real central directory.
pub(crate) fn set_central_directory_offset(eocd: &mut [u8], value: u32) -> Result<(), ParseError> {
    if eocd.len() < EOCD_SIZE_WITHOUT_COMMENT {
        return Err(ParseError::Truncated);
    }
    eocd[EOCD_CENTRAL_DIRECTORY_OFFSET_FIELD_OFFSET..EOCD_CENTRAL_DIRECTORY_OFFSET_FIELD_OFFSET + 4]
        .copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// An opened APK with the signing block and zip sections located.
pub struct ApkSections<R> {
    pub(crate) inner: R,
    pub(crate) signing_block_offset: u32,
    pub(crate) signing_block_size: u32,
    pub(crate) central_directory_offset: u32,
    pub(crate) central_directory_size: u32,
    pub(crate) eocd_offset: u32,
    pub(crate) eocd_size: u32,
}

impl<R: Read + Seek> ApkSections<R> {
    /// Locates the signing block and zip sections of the given APK.
    pub fn new(reader: R) -> Result<ApkSections<R>> {
        let (mut reader, sections) = zip_sections(reader)?;
        let (signing_block_offset, signing_block_size) =
            find_signing_block(&mut reader, sections.central_directory_offset)?;
        Ok(ApkSections {
            inner: reader,
            signing_block_offset,
            signing_block_size,
            central_directory_offset: sections.central_directory_offset,
            central_directory_size: sections.central_directory_size,
            eocd_offset: sections.eocd_offset,
            eocd_size: sections.eocd_size,
        })
    }

    /// Where the signing block starts.
    pub fn signing_block_offset(&self) -> u32 {
        self.signing_block_offset
    }

    /// Reads the raw signing block, size fields and magic included.
    pub fn signing_block(&mut self) -> Result<Vec<u8>> {
        Ok(self.bytes(self.signing_block_offset, self.signing_block_size)?)
    }

    pub(crate) fn bytes(&mut self, offset: u32, size: u32) -> io::Result<Vec<u8>> {
        self.inner.seek(SeekFrom::Start(offset as u64))?;
        let mut buf = vec![0u8; size as usize];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn find_signing_block<R: Read + Seek>(
    reader: &mut R,
    central_directory_offset: u32,
) -> Result<(u32, u32)> {
    // FORMAT:
    // OFFSET       DATA TYPE  DESCRIPTION
    // * @+0  bytes uint64:    size in bytes (excluding this field)
    // * @+8  bytes payload
    // * @-24 bytes uint64:    size in bytes (same as the one above)
    // * @-16 bytes uint128:   magic
    ensure!(
        central_directory_offset >= APK_SIG_BLOCK_MIN_SIZE as u32,
        "APK too small for APK Signing Block. ZIP Central Directory offset: {}",
        central_directory_offset
    );
    reader.seek(SeekFrom::Start((central_directory_offset - 24) as u64))?;
    let size_in_footer = reader.read_u64::<LittleEndian>()? as u32;
    ensure!(
        reader.read_u128::<LittleEndian>()? == APK_SIG_BLOCK_MAGIC,
        "No APK Signing Block before ZIP Central Directory"
    );
    let total_size = size_in_footer + 8;
    let signing_block_offset = central_directory_offset
        .checked_sub(total_size)
        .ok_or_else(|| anyhow!("APK Signing Block size out of range: {}", size_in_footer))?;
    reader.seek(SeekFrom::Start(signing_block_offset as u64))?;
    let size_in_header = reader.read_u64::<LittleEndian>()? as u32;
    if size_in_header != size_in_footer {
        bail!(
            "APK Signing Block sizes in header and footer do not match: {} vs {}",
            size_in_header,
            size_in_footer
        );
    }
    Ok((signing_block_offset, total_size))
}
