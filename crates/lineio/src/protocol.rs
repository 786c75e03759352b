use crate::error::LineError;
use crate::line::Line;
use crate::message::{Frame, Message};

/// Framed message codec over a borrowed [`Line`].
///
/// The codec holds no buffered bytes between calls: every message is either
/// drained completely or the call fails and the underlying stream must be
/// considered broken. Short reads and short writes are resumed internally.
pub struct MessageProtocol<'a> {
    line: &'a mut dyn Line,
}

impl<'a> MessageProtocol<'a> {
    pub fn new(line: &'a mut dyn Line) -> Self {
        Self { line }
    }

    /// Serialises the whole message and writes it, looping until the line
    /// has accepted every byte.
    pub fn send_message(&mut self, message: &Message) -> Result<(), LineError> {
        let buf = message.serialize();
        let mut sent = 0;
        while sent < buf.len() {
            match self.line.write(&buf[sent..])? {
                0 => return Err(LineError::ConnectionLost),
                n => sent += n,
            }
        }
        Ok(())
    }

    /// Reads one complete message: the frame count, then per frame a length
    /// field and exactly that many payload bytes.
    ///
    /// Any failure of the line aborts the whole message; a zero return
    /// (receive timeout) surfaces as [`LineError::Timeout`] since a partial
    /// message cannot be resumed across calls.
    pub fn read_message(&mut self) -> Result<Message, LineError> {
        let frame_count = self.read_u32()?;
        let mut message = Message::new();
        for _ in 0..frame_count {
            let frame_len = self.read_u32()? as usize;
            let mut data = vec![0; frame_len];
            self.read_full(&mut data)?;
            message.append_frame(Frame::from(data));
        }
        Ok(message)
    }

    fn read_u32(&mut self) -> Result<u32, LineError> {
        let mut raw = [0; 4];
        self.read_full(&mut raw)?;
        Ok(u32::from_ne_bytes(raw))
    }

    fn read_full(&mut self, buf: &mut [u8]) -> Result<(), LineError> {
        let mut have = 0;
        while have < buf.len() {
            match self.line.read(&mut buf[have..])? {
                0 => return Err(LineError::Timeout),
                n => have += n,
            }
        }
        Ok(())
    }
}
