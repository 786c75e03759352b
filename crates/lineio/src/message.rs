use crate::error::LineError;

/// Width of the frame-count and per-frame length fields.
const LEN_FIELD_SIZE: usize = size_of::<u32>();

/// An opaque, length-delimited block of bytes; the atomic unit of a
/// [`Message`].
///
/// Integer constructors and accessors use the host byte order: messages
/// only ever travel between peers on the same machine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The frame interpreted as a fixed-width integer; `None` on a size
    /// mismatch.
    pub fn as_u8(&self) -> Option<u8> {
        self.data.as_slice().try_into().map(u8::from_ne_bytes).ok()
    }

    pub fn as_u16(&self) -> Option<u16> {
        self.data.as_slice().try_into().map(u16::from_ne_bytes).ok()
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.data.as_slice().try_into().map(u32::from_ne_bytes).ok()
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.data.as_slice().try_into().map(u64::from_ne_bytes).ok()
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl From<&[u8]> for Frame {
    fn from(data: &[u8]) -> Self {
        Self { data: data.to_vec() }
    }
}

impl From<&str> for Frame {
    fn from(value: &str) -> Self {
        Self { data: value.as_bytes().to_vec() }
    }
}

impl From<u8> for Frame {
    fn from(value: u8) -> Self {
        Self { data: value.to_ne_bytes().to_vec() }
    }
}

impl From<u16> for Frame {
    fn from(value: u16) -> Self {
        Self { data: value.to_ne_bytes().to_vec() }
    }
}

impl From<u32> for Frame {
    fn from(value: u32) -> Self {
        Self { data: value.to_ne_bytes().to_vec() }
    }
}

impl From<u64> for Frame {
    fn from(value: u64) -> Self {
        Self { data: value.to_ne_bytes().to_vec() }
    }
}

/// An ordered finite sequence of [`Frame`]s, delivered atomically by the
/// message protocol.
///
/// Serialised layout: a `u32` frame count, then per frame a `u32` length
/// followed by the payload bytes. All length fields are host-endian.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Frame>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn append_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Exact size of [`serialize`](Self::serialize) output.
    pub fn serialized_size(&self) -> usize {
        LEN_FIELD_SIZE + self.frames.iter().map(|f| LEN_FIELD_SIZE + f.len()).sum::<usize>()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        buf.extend_from_slice(&(self.frames.len() as u32).to_ne_bytes());
        for frame in &self.frames {
            buf.extend_from_slice(&(frame.len() as u32).to_ne_bytes());
            buf.extend_from_slice(frame.data());
        }
        buf
    }

    /// Rebuilds a message from a contiguous serialised buffer.
    ///
    /// Fails with [`LineError::MalformedMessage`] when a declared length
    /// would run past the end of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, LineError> {
        let (frame_count, mut rest) = take_u32(buf)?;
        let mut message = Self::new();
        for _ in 0..frame_count {
            let (frame_len, tail) = take_u32(rest)?;
            let frame_len = frame_len as usize;
            if tail.len() < frame_len {
                return Err(LineError::MalformedMessage);
            }
            message.append_frame(Frame::from(&tail[..frame_len]));
            rest = &tail[frame_len..];
        }
        Ok(message)
    }
}

fn take_u32(buf: &[u8]) -> Result<(u32, &[u8]), LineError> {
    if buf.len() < LEN_FIELD_SIZE {
        return Err(LineError::MalformedMessage);
    }
    let (raw, rest) = buf.split_at(LEN_FIELD_SIZE);
    Ok((u32::from_ne_bytes(raw.try_into().unwrap()), rest))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn serialized_layout() {
        let mut message = Message::new();
        message.append_frame(Frame::from(&b"\x01\x02\x03\x04"[..]));
        message.append_frame(Frame::from(&b"\x05\x06"[..]));

        let mut expected = Vec::new();
        expected.extend_from_slice(&2u32.to_ne_bytes());
        expected.extend_from_slice(&4u32.to_ne_bytes());
        expected.extend_from_slice(b"\x01\x02\x03\x04");
        expected.extend_from_slice(&2u32.to_ne_bytes());
        expected.extend_from_slice(b"\x05\x06");

        assert_eq!(message.serialized_size(), expected.len());
        assert_eq!(message.serialize(), expected);
    }

    #[test]
    fn buffer_roundtrip() {
        let mut message = Message::new();
        message.append_frame(Frame::from(0xdead_beef_u32));
        message.append_frame(Frame::from("hello"));
        message.append_frame(Frame::new(Vec::new()));

        let restored = Message::from_bytes(&message.serialize()).unwrap();
        assert_eq!(restored, message);
        assert_eq!(restored.frame(0).unwrap().as_u32(), Some(0xdead_beef));
        assert_eq!(restored.frame(1).unwrap().as_str(), Some("hello"));
        assert!(restored.frame(2).unwrap().is_empty());
        assert!(restored.frame(3).is_none());
    }

    #[test]
    fn overrunning_frame_length_is_rejected() {
        let mut message = Message::new();
        message.append_frame(Frame::from(&b"abcdef"[..]));
        let mut buf = message.serialize();

        // Inflate the declared length past the end of the buffer.
        buf[LEN_FIELD_SIZE..2 * LEN_FIELD_SIZE].copy_from_slice(&100u32.to_ne_bytes());
        assert!(matches!(Message::from_bytes(&buf), Err(LineError::MalformedMessage)));

        // A lying frame count runs out of bytes as well.
        let mut message = Message::new();
        message.append_frame(Frame::from(&b"x"[..]));
        let mut buf = message.serialize();
        buf[..LEN_FIELD_SIZE].copy_from_slice(&3u32.to_ne_bytes());
        assert!(matches!(Message::from_bytes(&buf), Err(LineError::MalformedMessage)));
    }

    #[test]
    fn typed_frame_accessors_check_width() {
        assert_eq!(Frame::from(7u16).as_u16(), Some(7));
        assert_eq!(Frame::from(7u16).as_u32(), None);
        assert_eq!(Frame::from(7u8).as_u8(), Some(7));
        assert_eq!(Frame::from(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Frame::from(&b"\xff\xfe"[..]).as_str(), None);
    }

    #[test]
    fn clear_resets_frames() {
        let mut message = Message::new();
        message.append_frame(Frame::from(1u8));
        assert_eq!(message.frame_count(), 1);
        message.clear();
        assert!(message.is_empty());
        assert_eq!(message.serialized_size(), LEN_FIELD_SIZE);
    }
}
