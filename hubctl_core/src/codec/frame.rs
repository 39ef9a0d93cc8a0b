use crate::error::ValidationError;

/// Largest frame expressible with a single-byte length header.
pub const MAX_SHORT_FRAME: usize = 127;

/// One length-prefixed protocol message: `[length, hub_id, msg_type, ...]`.
///
/// `length` always equals the total byte count. Frames are immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Prepend the length byte to `payload` (hub id onwards).
    pub fn from_payload(payload: &[u8]) -> Result<Self, ValidationError> {
        let total = payload.len() + 1;
        if total > MAX_SHORT_FRAME {
            return Err(ValidationError::FrameTooLong(total));
        }
        let mut bytes = Vec::with_capacity(total);
        bytes.push(u8::try_from(total).map_err(|_| ValidationError::FrameTooLong(total))?);
        bytes.extend_from_slice(payload);
        Ok(Self(bytes))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_byte_counts_itself() {
        let f = Frame::from_payload(&[0x00, 0x02, 0x02]).unwrap();
        assert_eq!(f.as_bytes(), &[0x04, 0x00, 0x02, 0x02]);
        assert_eq!(f.len(), usize::from(f.as_bytes()[0]));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_SHORT_FRAME];
        assert_eq!(
            Frame::from_payload(&payload),
            Err(ValidationError::FrameTooLong(MAX_SHORT_FRAME + 1))
        );
    }
}
