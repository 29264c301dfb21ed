//! Marshalling between the machine's linear memory and the chain's canonical
//! encodings.
//!
//! Fixed-width values (20-byte addresses, 32-byte words and hashes, 16-byte
//! value amounts) live in linear memory in the reverse byte order of the
//! chain's big-endian encoding, so reads and writes of those reverse the
//! payload. Variable-length buffers (call input, code, return data, log
//! payloads) are opaque and are copied without any reordering.

use crate::types::{Address, RuntimeError, Word, VALUE_SIZE};
use crate::ExecResult;
use anyhow::ensure;
use byteorder::{ByteOrder, LittleEndian};
use std::ops::Range;

/// Whether `[offset, offset + length)` lies within a buffer of `len` bytes.
/// Used where an out-of-range access must produce a result code rather than a
/// trap (contract creation).
pub fn in_bounds(buffer: &[u8], offset: u32, length: u32) -> bool {
    u64::from(offset) + u64::from(length) <= buffer.len() as u64
}

fn checked_range(len: usize, offset: u32, length: u32) -> ExecResult<Range<usize>> {
    ensure!(
        u64::from(offset) + u64::from(length) <= len as u64,
        RuntimeError::MemoryAccessOutOfBounds
    );
    let start = offset as usize;
    Ok(start..start + length as usize)
}

/// Read `length` raw bytes at `offset`. No reordering; also used to slice
/// host-side buffers (input, code, return data) with the same bounds
/// discipline.
pub fn read_bytes(buffer: &[u8], offset: u32, length: u32) -> ExecResult<Vec<u8>> {
    let range = checked_range(buffer.len(), offset, length)?;
    Ok(buffer[range].to_vec())
}

/// Write raw bytes at `offset`. No reordering.
pub fn write_bytes(buffer: &mut [u8], offset: u32, data: &[u8]) -> ExecResult<()> {
    ensure!(
        u64::from(offset) + data.len() as u64 <= buffer.len() as u64,
        RuntimeError::MemoryAccessOutOfBounds
    );
    let start = offset as usize;
    buffer[start..start + data.len()].copy_from_slice(data);
    Ok(())
}

fn read_reversed<const N: usize>(memory: &[u8], offset: u32) -> ExecResult<[u8; N]> {
    let range = checked_range(memory.len(), offset, N as u32)?;
    let mut out = [0u8; N];
    for (dst, src) in out.iter_mut().zip(memory[range].iter().rev()) {
        *dst = *src;
    }
    Ok(out)
}

fn write_reversed<const N: usize>(
    memory: &mut [u8],
    offset: u32,
    bytes: &[u8; N],
) -> ExecResult<()> {
    let range = checked_range(memory.len(), offset, N as u32)?;
    for (dst, src) in memory[range].iter_mut().zip(bytes.iter().rev()) {
        *dst = *src;
    }
    Ok(())
}

/// Read a 20-byte address stored at `offset`.
pub fn read_address(memory: &[u8], offset: u32) -> ExecResult<Address> {
    Ok(Address(read_reversed(memory, offset)?))
}

/// Write a 20-byte address at `offset`.
pub fn write_address(memory: &mut [u8], offset: u32, address: &Address) -> ExecResult<()> {
    write_reversed(memory, offset, &address.0)
}

/// Read a 32-byte word (storage path, storage value, topic, hash) at
/// `offset`.
pub fn read_word(memory: &[u8], offset: u32) -> ExecResult<Word> {
    Ok(Word(read_reversed(memory, offset)?))
}

/// Write a 32-byte word at `offset`.
pub fn write_word(memory: &mut [u8], offset: u32, word: &Word) -> ExecResult<()> {
    write_reversed(memory, offset, &word.0)
}

/// Read a 16-byte value amount at `offset`.
pub fn read_value(memory: &[u8], offset: u32) -> ExecResult<u128> {
    let range = checked_range(memory.len(), offset, VALUE_SIZE as u32)?;
    Ok(LittleEndian::read_u128(&memory[range]))
}

/// Write a 16-byte value amount at `offset`.
pub fn write_value(memory: &mut [u8], offset: u32, value: u128) -> ExecResult<()> {
    let range = checked_range(memory.len(), offset, VALUE_SIZE as u32)?;
    LittleEndian::write_u128(&mut memory[range], value);
    Ok(())
}
