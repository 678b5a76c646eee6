//! A dynamic byte buffer supporting append, insert-at-offset, and resize.
//!
//! Used for the bytecode code stream and the PC-to-line table. A thin
//! newtype over `Vec<u8>` rather than a raw `Vec` so call sites read as
//! "the code stream" instead of "a vec of bytes."

#[derive(Debug, Default, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        ByteBuffer { data: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        ByteBuffer {
            data: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn push_u8(&mut self, byte: u8) {
        self.data.push(byte);
    }

    pub fn append_u32_be(&mut self, word: u32) {
        self.append(&word.to_be_bytes());
    }

    /// Insert `bytes` at `offset`, shifting everything after it forward.
    pub fn insert_at(&mut self, offset: usize, bytes: &[u8]) {
        self.data.splice(offset..offset, bytes.iter().copied());
    }

    /// Overwrite `len` bytes starting at `offset` with new content of the
    /// same length (used to patch a previously emitted jump offset).
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn resize(&mut self, new_len: usize, fill: u8) {
        self.data.resize(new_len, fill);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn read_u32_be(&self, offset: usize) -> u32 {
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        u32::from_be_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_back() {
        let mut buf = ByteBuffer::new();
        buf.append_u32_be(0xdead_beef);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.read_u32_be(0), 0xdead_beef);
    }

    #[test]
    fn patch_overwrites_in_place() {
        let mut buf = ByteBuffer::new();
        buf.append_u32_be(0);
        buf.patch(0, &42u32.to_be_bytes());
        assert_eq!(buf.read_u32_be(0), 42);
    }

    #[test]
    fn insert_shifts_tail() {
        let mut buf = ByteBuffer::new();
        buf.append(&[1, 2, 3]);
        buf.insert_at(1, &[9, 9]);
        assert_eq!(buf.as_slice(), &[1, 9, 9, 2, 3]);
    }
}
