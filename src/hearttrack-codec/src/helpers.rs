type Result<T> = std::result::Result<T, BufferTooShort>;

#[derive(Debug)]
pub struct BufferTooShort;

/// Little-endian cursor over a byte image. Each read consumes from the front.
pub trait BufferReader {
    fn read<const N: usize>(&mut self) -> Result<[u8; N]>;

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read::<1>()?[0])
    }
    fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read()?))
    }
    fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read()?))
    }
    fn read_f32_le(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read()?))
    }
}

impl<'a> BufferReader for &'a [u8] {
    fn read<const N: usize>(&mut self) -> Result<[u8; N]> {
        let buf: &'a [u8] = *self;
        let (head, rest) = buf.split_first_chunk::<N>().ok_or(BufferTooShort)?;
        *self = rest;
        Ok(*head)
    }
}
