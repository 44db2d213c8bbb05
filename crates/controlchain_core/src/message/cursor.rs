// Control Chain Rust Source Code File - See https://controlchain.audio for more info.
//
// Copyright 2016-2026 MOD Audio. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Little-endian cursor helpers shared by the payload codecs.

use crate::errors::ProtocolError;
use byteorder::{ByteOrder, LittleEndian};

pub(crate) struct ByteReader<'a> {
  data: &'a [u8],
  pos: usize,
}

impl<'a> ByteReader<'a> {
  pub fn new(data: &'a [u8]) -> Self {
    Self { data, pos: 0 }
  }

  fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], ProtocolError> {
    if self.pos + len > self.data.len() {
      return Err(ProtocolError::Truncated(field));
    }
    let slice = &self.data[self.pos..self.pos + len];
    self.pos += len;
    Ok(slice)
  }

  pub fn read_u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
    Ok(self.take(1, field)?[0])
  }

  pub fn read_u16(&mut self, field: &'static str) -> Result<u16, ProtocolError> {
    Ok(LittleEndian::read_u16(self.take(2, field)?))
  }

  pub fn read_u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
    Ok(LittleEndian::read_u32(self.take(4, field)?))
  }

  pub fn read_f32(&mut self, field: &'static str) -> Result<f32, ProtocolError> {
    Ok(LittleEndian::read_f32(self.take(4, field)?))
  }

  /// Length-prefixed string: one size byte, then that many UTF-8 bytes.
  pub fn read_string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
    let len = self.read_u8(field)? as usize;
    let bytes = self.take(len, field)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::BadString)
  }
}

pub(crate) struct ByteWriter {
  buffer: Vec<u8>,
}

impl ByteWriter {
  pub fn new() -> Self {
    Self { buffer: Vec::new() }
  }

  pub fn put_u8(&mut self, value: u8) {
    self.buffer.push(value);
  }

  pub fn put_u16(&mut self, value: u16) {
    self.buffer.extend_from_slice(&value.to_le_bytes());
  }

  pub fn put_u32(&mut self, value: u32) {
    self.buffer.extend_from_slice(&value.to_le_bytes());
  }

  pub fn put_f32(&mut self, value: f32) {
    self.buffer.extend_from_slice(&value.to_le_bytes());
  }

  /// Length-prefixed string. Labels longer than a size byte can carry are
  /// truncated at a character boundary rather than rejected; devices only
  /// have a couple of lines of display anyway.
  pub fn put_str(&mut self, value: &str) {
    let mut end = value.len().min(u8::MAX as usize);
    while !value.is_char_boundary(end) {
      end -= 1;
    }
    self.buffer.push(end as u8);
    self.buffer.extend_from_slice(&value.as_bytes()[..end]);
  }

  pub fn finish(self) -> Vec<u8> {
    self.buffer
  }
}
