//! Typed, cursor-addressed view over a contiguous byte region.
//!
//! [`ByteBuffer`] carries a `(position, limit, capacity)` cursor and a current
//! [`Endian`]; every multi-byte accessor honors the configured order. Relative
//! accessors advance `position`; absolute accessors take an explicit offset.
//! Any access that would cross `limit` fails with
//! [`EvioError::OutOfBounds`](crate::EvioError::OutOfBounds).

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{EvioError, Result};

// ---------------------------------------------------------------------------
// Word padding
// ---------------------------------------------------------------------------

/// Bytes needed to round `n` up to the next 4-byte boundary (0–3).
#[inline]
pub fn pad4(n: usize) -> usize {
    (4 - n % 4) % 4
}

// ---------------------------------------------------------------------------
// Byte order
// ---------------------------------------------------------------------------

/// Runtime byte-order selector dispatching to the `byteorder` backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    /// The order of the machine running this code.
    #[inline]
    pub fn native() -> Endian {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    /// The opposite order.
    #[inline]
    pub fn swapped(self) -> Endian {
        match self {
            Endian::Big => Endian::Little,
            Endian::Little => Endian::Big,
        }
    }

    #[inline]
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Big => BigEndian::read_u16(buf),
            Endian::Little => LittleEndian::read_u16(buf),
        }
    }

    #[inline]
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Big => BigEndian::read_u32(buf),
            Endian::Little => LittleEndian::read_u32(buf),
        }
    }

    #[inline]
    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Big => BigEndian::read_u64(buf),
            Endian::Little => LittleEndian::read_u64(buf),
        }
    }

    #[inline]
    pub fn read_f32(self, buf: &[u8]) -> f32 {
        f32::from_bits(self.read_u32(buf))
    }

    #[inline]
    pub fn read_f64(self, buf: &[u8]) -> f64 {
        f64::from_bits(self.read_u64(buf))
    }

    #[inline]
    pub fn write_u16(self, buf: &mut [u8], v: u16) {
        match self {
            Endian::Big => BigEndian::write_u16(buf, v),
            Endian::Little => LittleEndian::write_u16(buf, v),
        }
    }

    #[inline]
    pub fn write_u32(self, buf: &mut [u8], v: u32) {
        match self {
            Endian::Big => BigEndian::write_u32(buf, v),
            Endian::Little => LittleEndian::write_u32(buf, v),
        }
    }

    #[inline]
    pub fn write_u64(self, buf: &mut [u8], v: u64) {
        match self {
            Endian::Big => BigEndian::write_u64(buf, v),
            Endian::Little => LittleEndian::write_u64(buf, v),
        }
    }

    #[inline]
    pub fn write_f32(self, buf: &mut [u8], v: f32) {
        self.write_u32(buf, v.to_bits());
    }

    #[inline]
    pub fn write_f64(self, buf: &mut [u8], v: f64) {
        self.write_u64(buf, v.to_bits());
    }
}

// ---------------------------------------------------------------------------
// ByteBuffer
// ---------------------------------------------------------------------------

/// Growable-at-construction, fixed-at-use byte region with cursor state.
///
/// Invariant: `position <= limit <= capacity`.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    order: Endian,
}

impl ByteBuffer {
    /// Allocates a zeroed buffer of `capacity` bytes; `limit == capacity`.
    pub fn new(capacity: usize) -> ByteBuffer {
        ByteBuffer {
            data: vec![0u8; capacity],
            position: 0,
            limit: capacity,
            order: Endian::Big,
        }
    }

    /// Wraps an existing byte vector; `limit == capacity`, position 0.
    pub fn wrap(data: Vec<u8>) -> ByteBuffer {
        let limit = data.len();
        ByteBuffer {
            data,
            position: 0,
            limit,
            order: Endian::Big,
        }
    }

    // ── Cursor state ──────────────────────────────────────────────────────

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.limit {
            return Err(EvioError::OutOfBounds {
                offset: position,
                length: 0,
                limit: self.limit,
            });
        }
        self.position = position;
        Ok(())
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit > self.capacity() {
            return Err(EvioError::OutOfBounds {
                offset: limit,
                length: 0,
                limit: self.capacity(),
            });
        }
        self.limit = limit;
        if self.position > limit {
            self.position = limit;
        }
        Ok(())
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    #[inline]
    pub fn order(&self) -> Endian {
        self.order
    }

    pub fn set_order(&mut self, order: Endian) {
        self.order = order;
    }

    /// Position to 0, limit to capacity.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity();
    }

    /// Limit to current position, position to 0. Switches fill → drain.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// Position to 0, limit untouched.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Moves `position..limit` to the front, position to the remainder length,
    /// limit to capacity. Switches drain → fill keeping unread bytes.
    pub fn compact(&mut self) {
        let remaining = self.remaining();
        self.data.copy_within(self.position..self.limit, 0);
        self.position = remaining;
        self.limit = self.capacity();
    }

    // ── Views ─────────────────────────────────────────────────────────────

    /// Borrows `position..limit`.
    pub fn slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Mutably borrows `position..limit`.
    pub fn slice_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.position..self.limit]
    }

    /// Borrows the full backing region.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutably borrows the full backing region.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Independent copy with the same storage contents, cursor, and order.
    pub fn duplicate(&self) -> ByteBuffer {
        self.clone()
    }

    /// Consumes the buffer, returning the backing vector.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    // ── Bounds checking ───────────────────────────────────────────────────

    #[inline]
    fn check(&self, offset: usize, length: usize) -> Result<()> {
        if offset + length > self.limit {
            return Err(EvioError::OutOfBounds {
                offset,
                length,
                limit: self.limit,
            });
        }
        Ok(())
    }

    // ── Absolute accessors ────────────────────────────────────────────────

    pub fn get_u8_at(&self, offset: usize) -> Result<u8> {
        self.check(offset, 1)?;
        Ok(self.data[offset])
    }

    pub fn get_u16_at(&self, offset: usize) -> Result<u16> {
        self.check(offset, 2)?;
        Ok(self.order.read_u16(&self.data[offset..]))
    }

    pub fn get_u32_at(&self, offset: usize) -> Result<u32> {
        self.check(offset, 4)?;
        Ok(self.order.read_u32(&self.data[offset..]))
    }

    pub fn get_u64_at(&self, offset: usize) -> Result<u64> {
        self.check(offset, 8)?;
        Ok(self.order.read_u64(&self.data[offset..]))
    }

    pub fn get_f32_at(&self, offset: usize) -> Result<f32> {
        Ok(f32::from_bits(self.get_u32_at(offset)?))
    }

    pub fn get_f64_at(&self, offset: usize) -> Result<f64> {
        Ok(f64::from_bits(self.get_u64_at(offset)?))
    }

    pub fn put_u8_at(&mut self, offset: usize, v: u8) -> Result<()> {
        self.check(offset, 1)?;
        self.data[offset] = v;
        Ok(())
    }

    pub fn put_u16_at(&mut self, offset: usize, v: u16) -> Result<()> {
        self.check(offset, 2)?;
        self.order.write_u16(&mut self.data[offset..], v);
        Ok(())
    }

    pub fn put_u32_at(&mut self, offset: usize, v: u32) -> Result<()> {
        self.check(offset, 4)?;
        self.order.write_u32(&mut self.data[offset..], v);
        Ok(())
    }

    pub fn put_u64_at(&mut self, offset: usize, v: u64) -> Result<()> {
        self.check(offset, 8)?;
        self.order.write_u64(&mut self.data[offset..], v);
        Ok(())
    }

    pub fn put_f32_at(&mut self, offset: usize, v: f32) -> Result<()> {
        self.put_u32_at(offset, v.to_bits())
    }

    pub fn put_f64_at(&mut self, offset: usize, v: f64) -> Result<()> {
        self.put_u64_at(offset, v.to_bits())
    }

    // ── Relative accessors ────────────────────────────────────────────────

    pub fn get_u8(&mut self) -> Result<u8> {
        let v = self.get_u8_at(self.position)?;
        self.position += 1;
        Ok(v)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let v = self.get_u16_at(self.position)?;
        self.position += 2;
        Ok(v)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let v = self.get_u32_at(self.position)?;
        self.position += 4;
        Ok(v)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let v = self.get_u64_at(self.position)?;
        self.position += 8;
        Ok(v)
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.get_u32()?))
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.get_u64()?))
    }

    /// Copies `dst.len()` bytes from the current position.
    pub fn get_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check(self.position, dst.len())?;
        dst.copy_from_slice(&self.data[self.position..self.position + dst.len()]);
        self.position += dst.len();
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.put_u8_at(self.position, v)?;
        self.position += 1;
        Ok(())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<()> {
        self.put_u16_at(self.position, v)?;
        self.position += 2;
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<()> {
        self.put_u32_at(self.position, v)?;
        self.position += 4;
        Ok(())
    }

    pub fn put_u64(&mut self, v: u64) -> Result<()> {
        self.put_u64_at(self.position, v)?;
        self.position += 8;
        Ok(())
    }

    pub fn put_f32(&mut self, v: f32) -> Result<()> {
        self.put_u32(v.to_bits())
    }

    pub fn put_f64(&mut self, v: f64) -> Result<()> {
        self.put_u64(v.to_bits())
    }

    /// Appends `src` at the current position.
    pub fn put_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.check(self.position, src.len())?;
        self.data[self.position..self.position + src.len()].copy_from_slice(src);
        self.position += src.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad4_table() {
        assert_eq!(pad4(0), 0);
        assert_eq!(pad4(1), 3);
        assert_eq!(pad4(2), 2);
        assert_eq!(pad4(3), 1);
        assert_eq!(pad4(4), 0);
        assert_eq!(pad4(17), 3);
    }

    #[test]
    fn relative_round_trip_both_orders() {
        for order in [Endian::Big, Endian::Little] {
            let mut b = ByteBuffer::new(32);
            b.set_order(order);
            b.put_u32(0xc0da0100).unwrap();
            b.put_u16(0x1234).unwrap();
            b.put_u8(0xab).unwrap();
            b.put_f64(std::f64::consts::PI).unwrap();
            b.flip();
            assert_eq!(b.get_u32().unwrap(), 0xc0da0100);
            assert_eq!(b.get_u16().unwrap(), 0x1234);
            assert_eq!(b.get_u8().unwrap(), 0xab);
            assert_eq!(b.get_f64().unwrap(), std::f64::consts::PI);
            assert_eq!(b.remaining(), 0);
        }
    }

    #[test]
    fn order_affects_layout() {
        let mut b = ByteBuffer::new(4);
        b.set_order(Endian::Big);
        b.put_u32_at(0, 0x01020304).unwrap();
        assert_eq!(b.as_bytes(), &[1, 2, 3, 4]);
        b.set_order(Endian::Little);
        b.put_u32_at(0, 0x01020304).unwrap();
        assert_eq!(b.as_bytes(), &[4, 3, 2, 1]);
    }

    #[test]
    fn limit_is_enforced() {
        let mut b = ByteBuffer::new(8);
        b.set_limit(6).unwrap();
        assert!(b.put_u32_at(4, 1).is_err());
        assert!(b.put_u16_at(4, 1).is_ok());
        b.set_position(6).unwrap();
        assert!(matches!(
            b.get_u8(),
            Err(EvioError::OutOfBounds { limit: 6, .. })
        ));
    }

    #[test]
    fn flip_rewind_clear() {
        let mut b = ByteBuffer::new(16);
        b.put_u32(7).unwrap();
        b.flip();
        assert_eq!((b.position(), b.limit()), (0, 4));
        assert_eq!(b.get_u32().unwrap(), 7);
        b.rewind();
        assert_eq!(b.position(), 0);
        b.clear();
        assert_eq!((b.position(), b.limit()), (0, 16));
    }

    #[test]
    fn compact_keeps_unread_tail() {
        let mut b = ByteBuffer::new(8);
        b.put_bytes(&[1, 2, 3, 4, 5, 6]).unwrap();
        b.flip();
        let mut two = [0u8; 2];
        b.get_bytes(&mut two).unwrap();
        b.compact();
        assert_eq!(b.position(), 4);
        assert_eq!(&b.as_bytes()[..4], &[3, 4, 5, 6]);
    }

    #[test]
    fn duplicate_is_independent() {
        let mut a = ByteBuffer::new(8);
        a.put_u32(1).unwrap();
        let mut d = a.duplicate();
        d.put_u32(2).unwrap();
        assert_eq!(a.position(), 4);
        assert_eq!(d.position(), 8);
    }
}
