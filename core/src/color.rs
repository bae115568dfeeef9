use std::fmt;

/// Display color of a track, kept in whatever CSS notation the client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Color(String);

impl Color {
  pub fn new<T: Into<String>>(value: T) -> Color {
    Color(value.into())
  }

  pub fn from_rgb(r: u8, g: u8, b: u8) -> Color {
    Color(format!("#{:02x}{:02x}{:02x}", r, g, b))
  }

  pub fn as_str(&self) -> &str {
    self.0.as_str()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl Default for Color {
  fn default() -> Self {
    Color::from_rgb(0x7f, 0x7f, 0x7f)
  }
}

impl From<String> for Color {
  fn from(value: String) -> Self {
    Color(value)
  }
}

impl<'a> From<&'a str> for Color {
  fn from(value: &'a str) -> Self {
    Color(value.to_string())
  }
}

impl fmt::Display for Color {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod test {

  use super::Color;

  #[test]
  pub fn new() {
    let color = Color::new("red");
    assert_eq!(color.as_str(), "red");
    assert_eq!(color.to_string(), "red");
  }

  #[test]
  pub fn from_rgb() {
    let color = Color::from_rgb(10, 20, 255);
    assert_eq!(color.as_str(), "#0a14ff");
  }
}
