//! 二值算术编解码引擎 (CABAC).
//!
//! H.264/H.265 M-coder 常量: 64 档概率状态表, range 初值 510,
//! 编码端 9 位阈值重归一化加滞留位 (outstanding bits), 解码端预读 9 位.
//! 这些常量与上下文初值 (状态 0 / MPS 0) 是编解码双方的互操作契约.
//!
//! 原语: `encode_bit` 按上下文概率编码并更新状态, `encode_bypass`
//! 以固定 1/2 概率编码, `terminate` 写出终结符并刷出寄存器.

use std::io::{Read, Write};

use lfif_core::bitstream::{IBitstream, OBitstream};
use lfif_core::LfifResult;

/// LPS 区间宽度表, 按 (概率状态, range 高 2 位) 索引 (H.265 表 9-43)
static LPS_RANGE: [[u8; 4]; 64] = [
    [128, 176, 208, 240],
    [128, 167, 197, 227],
    [128, 158, 187, 216],
    [123, 150, 178, 205],
    [116, 142, 169, 195],
    [111, 135, 160, 185],
    [105, 128, 152, 175],
    [100, 122, 144, 166],
    [95, 116, 137, 158],
    [90, 110, 130, 150],
    [85, 104, 123, 142],
    [81, 99, 117, 135],
    [77, 94, 111, 128],
    [73, 89, 105, 122],
    [69, 85, 100, 116],
    [66, 80, 95, 110],
    [62, 76, 90, 104],
    [59, 72, 86, 99],
    [56, 69, 81, 94],
    [53, 65, 77, 89],
    [51, 62, 73, 85],
    [48, 59, 69, 80],
    [46, 56, 66, 76],
    [43, 53, 63, 72],
    [41, 50, 59, 69],
    [39, 48, 56, 65],
    [37, 45, 54, 62],
    [35, 43, 51, 59],
    [33, 41, 48, 56],
    [32, 39, 46, 53],
    [30, 37, 43, 50],
    [29, 35, 41, 48],
    [27, 33, 39, 45],
    [26, 31, 37, 43],
    [24, 30, 35, 41],
    [23, 28, 33, 39],
    [22, 27, 32, 37],
    [21, 26, 30, 35],
    [20, 24, 29, 33],
    [19, 23, 27, 31],
    [18, 22, 26, 30],
    [17, 21, 25, 28],
    [16, 20, 23, 27],
    [15, 19, 22, 25],
    [14, 18, 21, 24],
    [14, 17, 20, 23],
    [13, 16, 19, 22],
    [12, 15, 18, 21],
    [12, 14, 17, 20],
    [11, 14, 16, 19],
    [11, 13, 15, 18],
    [10, 12, 15, 17],
    [10, 12, 14, 16],
    [9, 11, 13, 15],
    [9, 11, 12, 14],
    [8, 10, 12, 14],
    [8, 9, 11, 13],
    [7, 9, 11, 12],
    [7, 9, 10, 12],
    [7, 8, 10, 11],
    [6, 8, 9, 11],
    [6, 7, 9, 10],
    [6, 7, 8, 9],
    [2, 2, 2, 2],
];

/// MPS 路径的状态转移
static TRANS_MPS: [u8; 64] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50,
    51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

/// LPS 路径的状态转移
static TRANS_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12, 13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21,
    21, 22, 22, 23, 24, 24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33, 33, 33, 34,
    34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

/// 上下文模型 (概率状态 + 最可能符号)
#[derive(Debug, Clone, Copy)]
pub struct ContextModel {
    /// 概率状态索引 (0-63)
    state: u8,
    /// 最可能符号 (0 或 1)
    mps: u8,
}

impl ContextModel {
    /// 创建初始上下文 (状态 0, MPS 0, 即等概率附近)
    pub fn new() -> Self {
        Self { state: 0, mps: 0 }
    }

    /// 重置到初始状态
    pub fn reset(&mut self) {
        self.state = 0;
        self.mps = 0;
    }
}

impl Default for ContextModel {
    fn default() -> Self {
        Self::new()
    }
}

/// 算术编码器
pub struct CabacEncoder {
    /// low 寄存器
    low: u32,
    /// range 寄存器 (9 位, 初值 510)
    range: u32,
    /// 滞留位计数
    outstanding: u64,
    /// 首个输出位被抑制 (解码端预读 9 位与之配对)
    first_bit: bool,
}

impl CabacEncoder {
    /// 创建编码器
    pub fn new() -> Self {
        Self {
            low: 0,
            range: 510,
            outstanding: 0,
            first_bit: true,
        }
    }

    /// 按上下文编码一个二值符号
    pub fn encode_bit<W: Write>(
        &mut self,
        bitstream: &mut OBitstream<W>,
        ctx: &mut ContextModel,
        bit: bool,
    ) -> LfifResult<()> {
        let quarter = ((self.range >> 6) & 3) as usize;
        let lps = u32::from(LPS_RANGE[ctx.state as usize][quarter]);
        self.range -= lps;

        if bit == (ctx.mps != 0) {
            ctx.state = TRANS_MPS[ctx.state as usize];
        } else {
            self.low += self.range;
            self.range = lps;
            if ctx.state == 0 {
                ctx.mps ^= 1;
            }
            ctx.state = TRANS_LPS[ctx.state as usize];
        }

        self.renorm(bitstream)
    }

    /// 以固定 1/2 概率编码一个二值符号 (旁路)
    pub fn encode_bypass<W: Write>(
        &mut self,
        bitstream: &mut OBitstream<W>,
        bit: bool,
    ) -> LfifResult<()> {
        self.low <<= 1;
        if bit {
            self.low += self.range;
        }

        if self.low >= 0x400 {
            self.put(bitstream, 1)?;
            self.low -= 0x400;
        } else if self.low < 0x200 {
            self.put(bitstream, 0)?;
        } else {
            self.outstanding += 1;
            self.low -= 0x200;
        }
        Ok(())
    }

    /// 写出终结符并刷出寄存器
    ///
    /// 之后不可再编码; 底层位流仍需由调用方 flush 对齐.
    pub fn terminate<W: Write>(&mut self, bitstream: &mut OBitstream<W>) -> LfifResult<()> {
        self.range -= 2;
        self.low += self.range;
        self.range = 2;
        self.renorm(bitstream)?;

        self.put(bitstream, (self.low >> 9) & 1)?;
        bitstream.put_bits(u64::from(((self.low >> 7) & 3) | 1), 2)?;
        Ok(())
    }

    fn renorm<W: Write>(&mut self, bitstream: &mut OBitstream<W>) -> LfifResult<()> {
        while self.range < 0x100 {
            if self.low >= 0x200 {
                self.put(bitstream, 1)?;
                self.low -= 0x200;
            } else if self.low < 0x100 {
                self.put(bitstream, 0)?;
            } else {
                self.outstanding += 1;
                self.low -= 0x100;
            }
            self.low <<= 1;
            self.range <<= 1;
        }
        Ok(())
    }

    fn put<W: Write>(&mut self, bitstream: &mut OBitstream<W>, bit: u32) -> LfifResult<()> {
        if self.first_bit {
            self.first_bit = false;
        } else {
            bitstream.put_bit(bit)?;
        }
        while self.outstanding > 0 {
            bitstream.put_bit(1 - bit)?;
            self.outstanding -= 1;
        }
        Ok(())
    }
}

impl Default for CabacEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// 算术解码器
pub struct CabacDecoder {
    /// value 寄存器 (9 位窗口)
    value: u32,
    /// range 寄存器
    range: u32,
}

impl CabacDecoder {
    /// 创建解码器并从位流预读 9 位
    pub fn new<R: Read>(bitstream: &mut IBitstream<R>) -> LfifResult<Self> {
        let mut value = 0u32;
        for _ in 0..9 {
            value = (value << 1) | bitstream.get_bit_or_zero()?;
        }
        Ok(Self { value, range: 510 })
    }

    /// 按上下文解码一个二值符号
    pub fn decode_bit<R: Read>(
        &mut self,
        bitstream: &mut IBitstream<R>,
        ctx: &mut ContextModel,
    ) -> LfifResult<bool> {
        let quarter = ((self.range >> 6) & 3) as usize;
        let lps = u32::from(LPS_RANGE[ctx.state as usize][quarter]);
        self.range -= lps;

        let bit;
        if self.value < self.range {
            bit = ctx.mps != 0;
            ctx.state = TRANS_MPS[ctx.state as usize];
        } else {
            self.value -= self.range;
            self.range = lps;
            bit = ctx.mps == 0;
            if ctx.state == 0 {
                ctx.mps ^= 1;
            }
            ctx.state = TRANS_LPS[ctx.state as usize];
        }

        self.renorm(bitstream)?;
        Ok(bit)
    }

    /// 解码一个旁路符号
    pub fn decode_bypass<R: Read>(&mut self, bitstream: &mut IBitstream<R>) -> LfifResult<bool> {
        self.value = (self.value << 1) | bitstream.get_bit_or_zero()?;
        if self.value >= self.range {
            self.value -= self.range;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// 解码终结符, 返回是否已终结
    pub fn decode_terminate<R: Read>(
        &mut self,
        bitstream: &mut IBitstream<R>,
    ) -> LfifResult<bool> {
        self.range -= 2;
        if self.value >= self.range {
            Ok(true)
        } else {
            self.renorm(bitstream)?;
            Ok(false)
        }
    }

    fn renorm<R: Read>(&mut self, bitstream: &mut IBitstream<R>) -> LfifResult<()> {
        while self.range < 0x100 {
            self.range <<= 1;
            self.value = (self.value << 1) | bitstream.get_bit_or_zero()?;
        }
        Ok(())
    }
}
