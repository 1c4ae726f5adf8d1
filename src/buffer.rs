/// A pair of reusable buffers for X Protocol frame I/O.
///
/// A `Session` uses a single `BufferSet` for all its operations so that
/// steady-state traffic does not allocate.
#[derive(Debug)]
pub struct BufferSet {
    /// General-purpose read buffer.
    /// Bytes are valid until the next `recv`.
    pub read_buffer: Vec<u8>,

    /// General-purpose write buffer.
    /// Layout: `[5-byte header space][payload]`. The header is overwritten
    /// in place once the payload length is known, matching spec.md §4.2.
    pub write_buffer: Vec<u8>,
}

impl BufferSet {
    /// Create a new empty buffer set.
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::new(),
            write_buffer: vec![0; 5],
        }
    }

    /// Clear the write buffer, reserve 5 bytes for the header, and return mutable access.
    #[inline]
    pub fn new_write_buffer(&mut self) -> &mut Vec<u8> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(&[0_u8; 5]);
        &mut self.write_buffer
    }

    /// Get the payload length (total buffer length minus the 5-byte header).
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.write_buffer.len().saturating_sub(5)
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
