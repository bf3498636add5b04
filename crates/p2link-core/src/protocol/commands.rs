//! Protocol commands
//!
//! Defines the fixed frames sent to the furnace and the login identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::frame::{parse_hex, Frame, Repr};
use super::FrameError;

/// Requests sent by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Initialisation probe ('MA')
    InitProbe,

    /// Telemetry request ('M1')
    Telemetry,

    /// Status / clock request ('M2')
    Status,

    /// Follow-up request echoed after an 'M3' reply ('M3')
    Continuation,

    /// Acknowledge request closing the initialisation ('Rb')
    Acknowledge,
}

impl Command {
    /// Header bytes of the command
    pub fn header(&self) -> [u8; 2] {
        match self {
            Command::InitProbe => [b'M', b'A'],
            Command::Telemetry => [b'M', b'1'],
            Command::Status => [b'M', b'2'],
            Command::Continuation => [b'M', b'3'],
            Command::Acknowledge => [b'R', b'b'],
        }
    }

    /// Payload sent with the command
    pub fn payload(&self) -> &'static [u8] {
        match self {
            Command::Acknowledge => &[0x00, 0x00, 0x01],
            _ => &[0x01],
        }
    }

    /// Ready-to-send frame for the command
    pub fn frame(&self) -> Result<Frame, FrameError> {
        Frame::prepared(self.header(), self.payload())
    }

    /// Command whose header matches `header`
    pub fn from_header(header: &[u8]) -> Option<Self> {
        [
            Command::InitProbe,
            Command::Telemetry,
            Command::Status,
            Command::Continuation,
            Command::Acknowledge,
        ]
        .into_iter()
        .find(|c| c.header() == header)
    }
}

/// Identity used to log in to the furnace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum User {
    /// Installer access
    Plumber,
    /// End-user access
    Normal,
    /// Alternate end-user identifier
    #[serde(alias = "normal2")]
    NormalAlt,
    /// Service access
    #[default]
    Service,
}

impl User {
    /// Hex literal of the login frame
    pub fn literal(&self) -> &'static str {
        match self {
            User::Plumber => "52610300007B",
            User::Normal => "526103000001",
            User::NormalAlt => "5261030000F3",
            User::Service => "52610300FFF9",
        }
    }

    /// Login frame for this identity
    ///
    /// The literal carries header, size and data; the checksum is computed.
    pub fn frame(&self) -> Result<Frame, FrameError> {
        let bytes = parse_hex("user", self.literal())?;
        let (header, rest) = bytes.split_at(2);
        let mut frame = Frame::new();
        frame.set_header(Repr::RawBytes(header.to_vec()))?;
        frame.set_data_size(Repr::RawBytes(rest[..1].to_vec()), false)?;
        frame.set_data(Repr::RawBytes(rest[1..].to_vec()), true)?;
        frame.set_checksum(None, false)?;
        Ok(frame)
    }

    /// Name as accepted by [`User::from_str`]
    pub fn name(&self) -> &'static str {
        match self {
            User::Plumber => "plumber",
            User::Normal => "normal",
            User::NormalAlt => "normal_alt",
            User::Service => "service",
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for User {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plumber" => Ok(User::Plumber),
            "normal" => Ok(User::Normal),
            "normal_alt" | "normal2" => Ok(User::NormalAlt),
            "service" => Ok(User::Service),
            other => Err(format!("unknown user '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frames() {
        assert_eq!(Command::InitProbe.frame().unwrap().to_hex(), "4D4101010090");
        assert_eq!(Command::Acknowledge.frame().unwrap().to_hex(), "52620300000100B8");
        assert_eq!(Command::from_header(b"M3"), Some(Command::Continuation));
        assert_eq!(Command::from_header(&[0x41, 0x10]), None);
    }

    #[test]
    fn test_user_frames() {
        // The login frame is the literal followed by its checksum
        for user in [User::Plumber, User::Normal, User::NormalAlt, User::Service] {
            let frame = user.frame().unwrap();
            assert!(frame.is_valid());
            assert!(frame.to_hex().starts_with(user.literal()));
            assert_eq!(frame.data_size(), Some(3));
        }
        assert_eq!(User::Service.frame().unwrap().to_hex(), "52610300FFF902AE");
    }

    #[test]
    fn test_user_names() {
        assert_eq!("service".parse::<User>(), Ok(User::Service));
        assert_eq!("normal2".parse::<User>(), Ok(User::NormalAlt));
        assert_eq!("Plumber".parse::<User>(), Ok(User::Plumber));
        assert!("root".parse::<User>().is_err());
        assert_eq!(User::default(), User::Service);
    }
}
