//! Checked primitive reads and writes shared by the frame and argument
//! codecs. `bytes::Buf` panics on underflow, so every read goes through a
//! remaining-length check and surfaces a syntax error instead.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;

pub(crate) fn read_u8(src: &mut Bytes) -> Result<u8, Error> {
    if src.remaining() < 1 {
        return Err(Error::Syntax("unexpected end of payload"));
    }
    Ok(src.get_u8())
}

pub(crate) fn read_u16(src: &mut Bytes) -> Result<u16, Error> {
    if src.remaining() < 2 {
        return Err(Error::Syntax("unexpected end of payload"));
    }
    Ok(src.get_u16())
}

pub(crate) fn read_u32(src: &mut Bytes) -> Result<u32, Error> {
    if src.remaining() < 4 {
        return Err(Error::Syntax("unexpected end of payload"));
    }
    Ok(src.get_u32())
}

pub(crate) fn read_u64(src: &mut Bytes) -> Result<u64, Error> {
    if src.remaining() < 8 {
        return Err(Error::Syntax("unexpected end of payload"));
    }
    Ok(src.get_u64())
}

pub(crate) fn read_bytes(src: &mut Bytes, len: usize) -> Result<Bytes, Error> {
    if src.remaining() < len {
        return Err(Error::Syntax("unexpected end of payload"));
    }
    Ok(src.split_to(len))
}

/// Reads a u8-length-prefixed string.
pub(crate) fn read_short_str(src: &mut Bytes) -> Result<String, Error> {
    let len = read_u8(src)? as usize;
    let raw = read_bytes(src, len)?;
    String::from_utf8(raw.to_vec()).map_err(|_| Error::Syntax("short string is not utf-8"))
}

/// Reads a u32-length-prefixed byte string.
pub(crate) fn read_long_bytes(src: &mut Bytes) -> Result<Bytes, Error> {
    let len = read_u32(src)? as usize;
    read_bytes(src, len)
}

pub(crate) fn read_long_str(src: &mut Bytes) -> Result<String, Error> {
    let raw = read_long_bytes(src)?;
    String::from_utf8(raw.to_vec()).map_err(|_| Error::Syntax("long string is not utf-8"))
}

pub(crate) fn write_short_str(dst: &mut BytesMut, value: &str) -> Result<(), Error> {
    if value.len() > u8::MAX as usize {
        return Err(Error::ShortStringTooLong(value.len()));
    }
    dst.put_u8(value.len() as u8);
    dst.put_slice(value.as_bytes());
    Ok(())
}

pub(crate) fn write_long_str(dst: &mut BytesMut, value: &[u8]) {
    dst.put_u32(value.len() as u32);
    dst.put_slice(value);
}

/// Packs up to eight flags into one octet, lowest bit first, in the order
/// the method signature declares them.
pub(crate) fn pack_bits(bits: &[bool]) -> u8 {
    bits.iter()
        .enumerate()
        .fold(0u8, |acc, (i, set)| acc | ((*set as u8) << i))
}

pub(crate) fn bit(flags: u8, index: u8) -> bool {
    flags & (1 << index) != 0
}
