use core::fmt;

/// Class/instance/attribute triple addressing one attribute.
///
/// Instance 0 addresses the class itself (class-level attributes).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct AttributePath {
    pub class: u16,
    pub instance: u32,
    pub attribute: u16,
}

impl AttributePath {
    pub const fn new(class: u16, instance: u32, attribute: u16) -> Self {
        Self {
            class,
            instance,
            attribute,
        }
    }

    /// Path of a class-level attribute (instance 0).
    pub const fn class_attribute(class: u16, attribute: u16) -> Self {
        Self::new(class, 0, attribute)
    }

    pub fn is_class_level(&self) -> bool {
        self.instance == 0
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{class:02X}/{instance}/{attribute}",
            class = self.class,
            instance = self.instance,
            attribute = self.attribute
        )
    }
}

/// Network address of one device (IP, IP plus route, or a backend-specific name).
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
