//! Port types, handles, and peer-name helpers

use std::fmt;

/// Signal type of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    Audio,
    Midi,
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortType::Audio => write!(f, "audio"),
            PortType::Midi => write!(f, "midi"),
        }
    }
}

/// Direction of a port, seen from the client that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    In,
    Out,
}

impl PortDirection {
    /// Direction a port must have to be connected to one of this direction
    pub fn opposite(self) -> Self {
        match self {
            PortDirection::In => PortDirection::Out,
            PortDirection::Out => PortDirection::In,
        }
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::In => write!(f, "in"),
            PortDirection::Out => write!(f, "out"),
        }
    }
}

/// A registered port
///
/// Handed to the caller on registration and handed back to unregister, so
/// it is deliberately not `Clone`. `P` is the backend's own port object.
pub struct PortHandle<P> {
    short_name: String,
    full_name: String,
    kind: PortType,
    direction: PortDirection,
    port: P,
}

impl<P> PortHandle<P> {
    pub fn new(
        short_name: impl Into<String>,
        full_name: impl Into<String>,
        kind: PortType,
        direction: PortDirection,
        port: P,
    ) -> Self {
        Self {
            short_name: short_name.into(),
            full_name: full_name.into(),
            kind,
            direction,
            port,
        }
    }

    /// Name without the client prefix
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// `client:port` name as listed by the server
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> PortType {
        self.kind
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Backend port object
    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }
}

impl<P> fmt::Debug for PortHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortHandle")
            .field("full_name", &self.full_name)
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .finish()
    }
}

/// Full `client:port` name
pub fn full_port_name(client: &str, port: &str) -> String {
    format!("{}:{}", client, port)
}

/// Check if `peer` belongs to the other stereo channel than `local`
///
/// A local port ending in "right" skips peers ending in "left", and the
/// other way round. Case-insensitive and purely suffix based: ports named
/// "_L"/"_R", numbered ports, or surround layouts are never skipped.
pub fn skip_opposite_channel(local: &str, peer: &str) -> bool {
    let local = local.to_lowercase();
    let peer = peer.to_lowercase();
    (local.ends_with("right") && peer.ends_with("left"))
        || (local.ends_with("left") && peer.ends_with("right"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_direction() {
        assert_eq!(PortDirection::In.opposite(), PortDirection::Out);
        assert_eq!(PortDirection::Out.opposite(), PortDirection::In);
    }

    #[test]
    fn test_skip_opposite_channel() {
        assert!(skip_opposite_channel("zone:in_right", "synth:out_left"));
        assert!(skip_opposite_channel("zone:in_LEFT", "synth:out_Right"));
        assert!(!skip_opposite_channel("zone:in_left", "synth:out_left"));
        assert!(!skip_opposite_channel("zone:in_right", "system:capture_1"));
        // Literal suffixes only
        assert!(!skip_opposite_channel("zone:in_R", "synth:out_L"));
    }

    #[test]
    fn test_handle_accessors() {
        let handle = PortHandle::new(
            "in_left",
            "zone:in_left",
            PortType::Audio,
            PortDirection::In,
            7u32,
        );
        assert_eq!(handle.short_name(), "in_left");
        assert_eq!(handle.full_name(), "zone:in_left");
        assert_eq!(handle.kind(), PortType::Audio);
        assert_eq!(handle.into_port(), 7);
    }

    #[test]
    fn test_full_port_name() {
        assert_eq!(full_port_name("zone", "midi_in"), "zone:midi_in");
    }
}
