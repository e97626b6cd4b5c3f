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

//! Helpers for the length-prefixed fields used throughout APK Signature
//! Scheme blocks. Every length prefix is a 4-byte little-endian integer.

use bytes::{Buf, Bytes};

use crate::error::ParseError;

/// A value decodable from the front of a byte buffer.
pub(crate) trait ReadFromBytes: Sized {
    fn read_from_bytes(buf: &mut Bytes) -> Result<Self, ParseError>;
}

impl ReadFromBytes for u32 {
    fn read_from_bytes(buf: &mut Bytes) -> Result<Self, ParseError> {
        if buf.remaining() < 4 {
            return Err(ParseError::Truncated);
        }
        Ok(buf.get_u32_le())
    }
}

/// Reads a 4-byte little-endian length, then exactly that many bytes.
pub(crate) fn read_length_prefixed_slice(buf: &mut Bytes) -> Result<Bytes, ParseError> {
    let length = u32::read_from_bytes(buf)? as usize;
    if buf.remaining() < length {
        return Err(ParseError::Truncated);
    }
    Ok(buf.split_to(length))
}

/// Reads a length-prefixed sequence of length-prefixed records. Each record
/// must be consumed exactly; leftover bytes mean its declared length lied.
pub(crate) fn read_sequence<T: ReadFromBytes>(buf: &mut Bytes) -> Result<Vec<T>, ParseError> {
    let mut sequence = read_length_prefixed_slice(buf)?;
    let mut items = Vec::new();
    while sequence.has_remaining() {
        let mut record = read_length_prefixed_slice(&mut sequence)?;
        items.push(T::read_from_bytes(&mut record)?);
        if record.has_remaining() {
            return Err(ParseError::TrailingGarbage);
        }
    }
    Ok(items)
}

/// Bytes left over after the known fields of a record must all be zero.
pub(crate) fn ensure_remainder_is_zero(buf: &Bytes) -> Result<(), ParseError> {
    if buf.iter().any(|b| *b != 0) {
        return Err(ParseError::TrailingGarbage);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_larger_than_remainder_is_truncated() {
        let mut buf = Bytes::from_static(&[0x05, 0x00, 0x00, 0x00, 0xaa, 0xbb]);
        let res = read_length_prefixed_slice(&mut buf);
        assert!(matches!(res, Err(ParseError::Truncated)));
    }

    #[test]
    fn record_with_unconsumed_bytes_is_trailing_garbage() {
        // One record of 8 bytes, of which the u32 payload only consumes 4.
        let mut buf = Bytes::from_static(&[
            0x0c, 0x00, 0x00, 0x00, // sequence length
            0x08, 0x00, 0x00, 0x00, // record length
            0x01, 0x00, 0x00, 0x00, 0xff, 0x00, 0x00, 0x00,
        ]);
        let res = read_sequence::<u32>(&mut buf);
        assert!(matches!(res, Err(ParseError::TrailingGarbage)));
    }

    #[test]
    fn reads_sequence_of_records() {
        let mut buf = Bytes::from_static(&[
            0x10, 0x00, 0x00, 0x00, // sequence length
            0x04, 0x00, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00, // record: 42
            0x04, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, // record: 7
        ]);
        assert_eq!(read_sequence::<u32>(&mut buf).unwrap(), vec![42, 7]);
        assert!(!buf.has_remaining());
    }
}
