//! Message vocabulary and wire framing for the supervisor/worker channel.
//!
//! Every message travels as the sole content of one fixed-size frame: the
//! canonical textual tag, NUL-padded to [`FRAME_LEN`]. There is no length
//! prefix and no escaping; a tag longer than the frame is silently truncated
//! rather than rejected. Decoding goes through the closed [`Message`]
//! vocabulary, so a truncated or foreign tag surfaces as "no message" for
//! the receiver to log and ignore, never as a transport error.

use std::fmt;
use std::io::{self, Read, Write};

use crate::core::config::FRAME_LEN;

/// The closed message vocabulary.
///
/// Directives flow supervisor → worker; reports flow worker → supervisor.
/// Messages carry no payload and no sequence number; the protocol assumes
/// exactly one outstanding request per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Directive: begin (or resume) the reporting cycle.
    Monitor,
    /// Directive: force the interface administratively up.
    SetLinkUp,
    /// Directive: terminate gracefully.
    ShutDown,
    /// Report: post-connect handshake; informational only.
    Ready,
    /// Report: acknowledges `Monitor`.
    Monitoring,
    /// Report: the interface left the "up" operational state.
    LinkDown,
    /// Report: acknowledges `Shut Down`.
    Done,
}

impl Message {
    /// Canonical wire tag for this message.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Monitor => "Monitor",
            Self::SetLinkUp => "Set Link Up",
            Self::ShutDown => "Shut Down",
            Self::Ready => "Ready",
            Self::Monitoring => "Monitoring",
            Self::LinkDown => "Link Down",
            Self::Done => "Done",
        }
    }

    /// Maps a wire tag back into the vocabulary. Unknown tags are `None`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Monitor" => Some(Self::Monitor),
            "Set Link Up" => Some(Self::SetLinkUp),
            "Shut Down" => Some(Self::ShutDown),
            "Ready" => Some(Self::Ready),
            "Monitoring" => Some(Self::Monitoring),
            "Link Down" => Some(Self::LinkDown),
            "Done" => Some(Self::Done),
            _ => None,
        }
    }

    /// Whether this message is a supervisor-to-worker directive.
    #[must_use]
    pub const fn is_directive(self) -> bool {
        matches!(self, Self::Monitor | Self::SetLinkUp | Self::ShutDown)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One wire frame: a NUL-padded textual tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Builds a frame from an arbitrary tag, padding with NULs and silently
    /// truncating anything beyond the frame size.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        let src = tag.as_bytes();
        let len = src.len().min(FRAME_LEN);
        bytes[..len].copy_from_slice(&src[..len]);
        Self { bytes }
    }

    /// The textual tag carried in the frame, up to the first NUL.
    #[must_use]
    pub fn tag(&self) -> String {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FRAME_LEN);
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }

    /// Decodes the frame against the closed vocabulary.
    #[must_use]
    pub fn message(&self) -> Option<Message> {
        Message::from_tag(&self.tag())
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        Self::from_tag(message.tag())
    }
}

/// Sends one message as a full frame.
pub fn write_message(writer: &mut impl Write, message: Message) -> io::Result<()> {
    write_frame(writer, &Frame::from(message))
}

/// Sends one raw frame.
pub fn write_frame(writer: &mut impl Write, frame: &Frame) -> io::Result<()> {
    writer.write_all(&frame.bytes)
}

/// Reads exactly one frame. A short read (peer closed mid-frame) is an
/// `UnexpectedEof` transport error.
pub fn read_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut bytes = [0u8; FRAME_LEN];
    reader.read_exact(&mut bytes)?;
    Ok(Frame { bytes })
}
