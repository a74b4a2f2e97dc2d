//! 比特流读写器.
//!
//! 在借用的字节流之上提供按位读写能力, 是两个熵编码后端共用的基础设施.
//!
//! 按大端位序 (MSB first) 存取: 每个字节内高位在前, 刷新时尾字节用 0 填充.
//! 码流本身不做字节填充转义, 边界由容器头部确定.

use std::io::{Read, Write};

use crate::{LfifError, LfifResult};

/// 比特流写入器
///
/// 向底层字节槽按位写入数据, 使用大端位序 (MSB first).
///
/// # 示例
/// ```
/// use lfif_core::bitstream::OBitstream;
///
/// let mut buf = Vec::new();
/// let mut bs = OBitstream::new(&mut buf);
/// bs.put_bits(0b1011, 4).unwrap();
/// bs.put_bits(0b0001, 4).unwrap();
/// bs.flush().unwrap();
/// assert_eq!(buf, vec![0b10110001]);
/// ```
pub struct OBitstream<W: Write> {
    /// 底层字节槽
    sink: W,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl<W: Write> OBitstream<W> {
    /// 创建比特流写入器, 借用底层字节槽
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 写入 1 个位
    pub fn put_bit(&mut self, bit: u32) -> LfifResult<()> {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count >= 8 {
            self.sink.write_all(&[self.current_byte])?;
            self.current_byte = 0;
            self.bit_count = 0;
        }
        Ok(())
    }

    /// 写入 N 个位 (最多 64 位)
    ///
    /// 值的低 N 位被写入, 高位在前.
    pub fn put_bits(&mut self, value: u64, n: u32) -> LfifResult<()> {
        debug_assert!(n <= 64, "put_bits: n={} 超过 64 位", n);

        for shift in (0..n).rev() {
            self.put_bit((value >> shift) as u32 & 1)?;
        }
        Ok(())
    }

    /// 对齐到字节边界并下推缓冲的尾字节 (用 0 填充)
    ///
    /// 不再写入新位时幂等.
    pub fn flush(&mut self) -> LfifResult<()> {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.current_byte <<= pad;
            self.sink.write_all(&[self.current_byte])?;
            self.current_byte = 0;
            self.bit_count = 0;
        }
        Ok(())
    }
}

/// 比特流读取器
///
/// 从底层字节源按位读取数据, 与 [`OBitstream`] 对应.
pub struct IBitstream<R: Read> {
    /// 底层字节源
    source: R,
    /// 当前字节
    current_byte: u8,
    /// 当前字节中剩余未读的位数 (0-8)
    bits_left: u8,
}

impl<R: Read> IBitstream<R> {
    /// 创建比特流读取器, 借用底层字节源
    pub fn new(source: R) -> Self {
        Self {
            source,
            current_byte: 0,
            bits_left: 0,
        }
    }

    /// 读取 1 个位
    ///
    /// 在预期位数之前遇到 EOF 时返回 [`LfifError::Eof`].
    pub fn get_bit(&mut self) -> LfifResult<u32> {
        if self.bits_left == 0 {
            let mut buf = [0u8; 1];
            let n = self.source.read(&mut buf)?;
            if n == 0 {
                return Err(LfifError::Eof);
            }
            self.current_byte = buf[0];
            self.bits_left = 8;
        }

        self.bits_left -= 1;
        Ok(u32::from((self.current_byte >> self.bits_left) & 1))
    }

    /// 读取 1 个位, EOF 时返回 0
    ///
    /// 算术解码器重归一化可能越过编码器实际写入的最后一位,
    /// 读到的是刷新时的 0 填充, 因此 EOF 在此路径上不是错误.
    pub fn get_bit_or_zero(&mut self) -> LfifResult<u32> {
        match self.get_bit() {
            Ok(bit) => Ok(bit),
            Err(LfifError::Eof) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// 读取 N 个位 (最多 64 位), 高位在前
    pub fn get_bits(&mut self, n: u32) -> LfifResult<u64> {
        debug_assert!(n <= 64, "get_bits: n={} 超过 64 位", n);

        let mut result = 0u64;
        for _ in 0..n {
            result = (result << 1) | u64::from(self.get_bit()?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_bits_basic() {
        let mut buf = Vec::new();
        let mut bs = OBitstream::new(&mut buf);
        bs.put_bits(0b1011, 4).unwrap();
        bs.put_bits(0b0001, 4).unwrap();
        bs.flush().unwrap();
        assert_eq!(buf, vec![0b10110001]);
    }

    #[test]
    fn test_flush_pads_with_zeros() {
        let mut buf = Vec::new();
        let mut bs = OBitstream::new(&mut buf);
        bs.put_bits(0b101, 3).unwrap();
        bs.flush().unwrap();
        bs.flush().unwrap();
        assert_eq!(buf, vec![0b10100000], "刷新应幂等且用 0 填充尾字节");
    }

    #[test]
    fn test_get_bits_basic() {
        let data = [0b10110001u8, 0b01010101];
        let mut bs = IBitstream::new(&data[..]);
        assert_eq!(bs.get_bit().unwrap(), 1);
        assert_eq!(bs.get_bit().unwrap(), 0);
        assert_eq!(bs.get_bits(2).unwrap(), 0b11);
        assert_eq!(bs.get_bits(4).unwrap(), 0b0001);
        assert_eq!(bs.get_bits(8).unwrap(), 0b01010101);
    }

    #[test]
    fn test_eof_error() {
        let data = [0xFFu8];
        let mut bs = IBitstream::new(&data[..]);
        bs.get_bits(8).unwrap();
        assert!(matches!(bs.get_bit(), Err(LfifError::Eof)));
        assert_eq!(bs.get_bit_or_zero().unwrap(), 0);
    }

    #[test]
    fn test_roundtrip() {
        let mut buf = Vec::new();
        let mut bs = OBitstream::new(&mut buf);
        bs.put_bits(0b10110, 5).unwrap();
        bs.put_bits(0xAB, 8).unwrap();
        bs.put_bits(0x1234_5678_9ABC, 48).unwrap();
        bs.flush().unwrap();

        let mut bs = IBitstream::new(&buf[..]);
        assert_eq!(bs.get_bits(5).unwrap(), 0b10110);
        assert_eq!(bs.get_bits(8).unwrap(), 0xAB);
        assert_eq!(bs.get_bits(48).unwrap(), 0x1234_5678_9ABC);
    }
}
