use super::ProtocolError;

/// Growable output buffer for outgoing messages.
#[derive(Debug, Default)]
pub struct Writer {
  data: Vec<u8>,
}

impl Writer {
  pub fn new() -> Writer {
    Writer { data: Vec::new() }
  }

  pub fn write_u8(&mut self, value: u8) -> &mut Self {
    self.data.push(value);
    self
  }

  pub fn write_i8(&mut self, value: i8) -> &mut Self {
    self.write_u8(value as u8)
  }

  pub fn write_bool(&mut self, value: bool) -> &mut Self {
    self.write_u8(value as u8)
  }

  pub fn write_u16(&mut self, value: u16) -> &mut Self {
    self.data.extend_from_slice(&value.to_be_bytes());
    self
  }

  pub fn write_u32(&mut self, value: u32) -> &mut Self {
    self.data.extend_from_slice(&value.to_be_bytes());
    self
  }

  pub fn write_i32(&mut self, value: i32) -> &mut Self {
    self.data.extend_from_slice(&value.to_be_bytes());
    self
  }

  pub fn write_f32(&mut self, value: f32) -> &mut Self {
    self.data.extend_from_slice(&value.to_be_bytes());
    self
  }

  pub fn write_f64(&mut self, value: f64) -> &mut Self {
    self.data.extend_from_slice(&value.to_be_bytes());
    self
  }

  pub fn write_string(&mut self, value: &str) -> &mut Self {
    self.write_u32(value.len() as u32);
    self.data.extend_from_slice(value.as_bytes());
    self
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.data
  }
}

/// Bounds checked cursor over an incoming message.
/// A failed read never consumes anything.
pub struct Reader<'a> {
  data: &'a [u8],
  pos: usize,
}

impl<'a> Reader<'a> {
  pub fn new(data: &'a [u8]) -> Reader<'a> {
    Reader { data, pos: 0 }
  }

  pub fn remaining(&self) -> usize {
    self.data.len() - self.pos
  }

  pub fn position(&self) -> usize {
    self.pos
  }

  fn take(&mut self, needed: usize) -> Result<&'a [u8], ProtocolError> {
    let remaining = self.remaining();
    if needed > remaining {
      return Err(ProtocolError::UnexpectedEnd { needed, remaining });
    }
    let bytes = &self.data[self.pos..self.pos + needed];
    self.pos += needed;
    Ok(bytes)
  }

  fn take_array<T: Default + AsMut<[u8]>>(&mut self) -> Result<T, ProtocolError> {
    let mut array = T::default();
    let len = array.as_mut().len();
    array.as_mut().copy_from_slice(self.take(len)?);
    Ok(array)
  }

  pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
    Ok(self.take(1)?[0])
  }

  pub fn read_i8(&mut self) -> Result<i8, ProtocolError> {
    self.read_u8().map(|value| value as i8)
  }

  pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
    self.read_u8().map(|value| value != 0)
  }

  pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
    self.take_array().map(u16::from_be_bytes)
  }

  pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
    self.take_array().map(u32::from_be_bytes)
  }

  pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
    self.take_array().map(i32::from_be_bytes)
  }

  pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
    self.take_array().map(f32::from_be_bytes)
  }

  pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
    self.take_array().map(f64::from_be_bytes)
  }

  pub fn read_string(&mut self) -> Result<String, ProtocolError> {
    let start = self.pos;
    let len = self.read_u32()? as usize;
    match self.take(len) {
      Ok(bytes) => String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidString),
      Err(err) => {
        self.pos = start;
        Err(err)
      }
    }
  }

  /// Whatever is left in the message.
  pub fn read_rest(&mut self) -> &'a [u8] {
    let rest = &self.data[self.pos..];
    self.pos = self.data.len();
    rest
  }
}
