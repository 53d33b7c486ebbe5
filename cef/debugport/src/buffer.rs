//! Fixed-capacity byte buffer with a valid-byte count

use cef_core::ErrorCode;

pub struct CefBuffer<const N: usize> {
    bytes: [u8; N],
    valid: usize,
}

impl<const N: usize> CefBuffer<N> {
    pub const fn new() -> Self {
        Self {
            bytes: [0; N],
            valid: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub const fn valid_bytes(&self) -> usize {
        self.valid
    }

    pub fn set_valid_bytes(&mut self, count: usize) -> Result<(), ErrorCode> {
        if count > N {
            return Err(ErrorCode::BufferValidBytesExceedsBufferSize);
        }
        self.valid = count;
        Ok(())
    }

    /// The valid part of the buffer
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.valid]
    }

    /// The whole storage, for producers that set the valid count afterwards
    pub fn storage_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    /// Replace the contents with `data`; never truncates
    pub fn fill_from(&mut self, data: &[u8]) -> Result<(), ErrorCode> {
        let dst = self
            .bytes
            .get_mut(..data.len())
            .ok_or(ErrorCode::BufferNotBigEnoughForPayload)?;
        dst.copy_from_slice(data);
        self.valid = data.len();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.valid = 0;
    }
}

impl<const N: usize> Default for CefBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bytes_bounded_by_capacity() {
        let mut buffer: CefBuffer<8> = CefBuffer::new();
        assert!(buffer.set_valid_bytes(8).is_ok());
        assert_eq!(
            buffer.set_valid_bytes(9),
            Err(ErrorCode::BufferValidBytesExceedsBufferSize)
        );
        assert_eq!(buffer.valid_bytes(), 8);
    }

    #[test]
    fn test_fill_never_truncates() {
        let mut buffer: CefBuffer<4> = CefBuffer::new();
        buffer.fill_from(&[1, 2, 3]).unwrap();
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);

        assert_eq!(
            buffer.fill_from(&[0; 5]),
            Err(ErrorCode::BufferNotBigEnoughForPayload)
        );
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
    }
}
