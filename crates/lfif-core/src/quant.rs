//! 量化表.
//!
//! 每个文件维护两个实例: 亮度表 (通道 0) 与色度表 (通道 1、2 共用).
//! 基表取 JPEG Annex K 的 8×8 矩阵, 按模 64 平铺到 Bᴰ 个系数,
//! 再重标定到表的整数范围; 质量参数在 [1,100] 内按 JPEG 规则缩放.

use std::io::{Read, Write};

use crate::geometry;
use crate::{LfifError, LfifResult};

/// JPEG Annex K 亮度基表
const BASE_LUMA: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// JPEG Annex K 色度基表
const BASE_CHROMA: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99, //
    18, 21, 26, 66, 99, 99, 99, 99, //
    24, 26, 56, 99, 99, 99, 99, 99, //
    47, 66, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// 量化表
///
/// Bᴰ 个正整数除子, 索引方式与块相同. 字节宽度 1 时取值 ≤255,
/// 字节宽度 2 时 ≤65535.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    /// 逐系数除子
    values: Vec<u32>,
    /// 序列化时每个条目占用的字节数 (1 或 2)
    byte_width: u8,
}

impl QuantTable {
    /// 从 Annex K 亮度基表构造
    pub fn base_luma(shape: &[usize], byte_width: u8) -> Self {
        Self::from_base(&BASE_LUMA, shape, byte_width)
    }

    /// 从 Annex K 色度基表构造
    pub fn base_chroma(shape: &[usize], byte_width: u8) -> Self {
        Self::from_base(&BASE_CHROMA, shape, byte_width)
    }

    /// 基表按模 64 平铺, 重标定到 `2^(8·w − 1)` 量级并夹取到 [1, max]
    fn from_base(base: &[u16; 64], shape: &[usize], byte_width: u8) -> Self {
        debug_assert!(byte_width == 1 || byte_width == 2);
        let size = geometry::block_size(shape);
        let max = Self::max_value(byte_width) as f64;
        let scale = (1u64 << (byte_width as u32 * 8 - 1)) as f64;

        let values = (0..size)
            .map(|i| {
                let v = f64::from(base[i % 64]) / 255.0 * scale;
                v.clamp(1.0, max) as u32
            })
            .collect();

        Self { values, byte_width }
    }

    /// 字节宽度对应的最大条目值
    pub fn max_value(byte_width: u8) -> u32 {
        (1u32 << (byte_width as u32 * 8)) - 1
    }

    /// 按质量参数缩放, `quality ∈ [1, 100]`
    ///
    /// 缩放系数: q < 50 时为 50/q, 否则 (100−q)/50. 条目夹取到 [1, max].
    pub fn scale_by_quality(&mut self, quality: u8) {
        let q = f64::from(quality);
        let coef = if quality < 50 { 50.0 / q } else { (100.0 - q) / 50.0 };
        let max = f64::from(Self::max_value(self.byte_width));

        for v in self.values.iter_mut() {
            *v = (f64::from(*v) * coef).clamp(1.0, max) as u32;
        }
    }

    /// 量化: `Q[i] = round(X[i] / table[i])`, 结果夹取到 ±max_amplitude
    pub fn quantize(&self, dct: &[f32], out: &mut [i64], max_amplitude: i64) {
        debug_assert_eq!(dct.len(), self.values.len());
        for (i, &coeff) in dct.iter().enumerate() {
            let q = (f64::from(coeff) / f64::from(self.values[i])).round() as i64;
            out[i] = q.clamp(-max_amplitude, max_amplitude);
        }
    }

    /// 反量化: `X̃[i] = Q[i] · table[i]`
    pub fn dequantize(&self, quantized: &[i64], out: &mut [f32]) {
        debug_assert_eq!(quantized.len(), self.values.len());
        for (i, &q) in quantized.iter().enumerate() {
            out[i] = (q * i64::from(self.values[i])) as f32;
        }
    }

    /// 序列化: 逐条目按字节宽度小端写出
    pub fn write_to<W: Write>(&self, output: &mut W) -> LfifResult<()> {
        for &v in &self.values {
            match self.byte_width {
                1 => output.write_all(&[v as u8])?,
                _ => output.write_all(&(v as u16).to_le_bytes())?,
            }
        }
        Ok(())
    }

    /// 反序列化: 读取 `block_size(shape)` 个条目
    pub fn read_from<R: Read>(input: &mut R, shape: &[usize], byte_width: u8) -> LfifResult<Self> {
        let size = geometry::block_size(shape);
        let mut values = Vec::with_capacity(size);
        for _ in 0..size {
            let v = match byte_width {
                1 => {
                    let mut buf = [0u8; 1];
                    input.read_exact(&mut buf)?;
                    u32::from(buf[0])
                }
                _ => {
                    let mut buf = [0u8; 2];
                    input.read_exact(&mut buf)?;
                    u32::from(u16::from_le_bytes(buf))
                }
            };
            if v == 0 {
                return Err(LfifError::InvalidData("量化表条目为 0".into()));
            }
            values.push(v);
        }
        Ok(Self { values, byte_width })
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 表是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_tables_in_range() {
        for table in [
            QuantTable::base_luma(&[8, 8], 1),
            QuantTable::base_chroma(&[8, 8], 1),
            QuantTable::base_luma(&[8, 8, 8], 2),
        ] {
            let max = QuantTable::max_value(table.byte_width);
            assert!(table.values.iter().all(|&v| v >= 1 && v <= max));
        }
    }

    #[test]
    fn test_base_tiles_modulo_64() {
        let t2 = QuantTable::base_luma(&[8, 8], 1);
        let t3 = QuantTable::base_luma(&[8, 8, 8], 1);
        assert_eq!(t3.len(), 512);
        for i in 0..512 {
            assert_eq!(t3.values[i], t2.values[i % 64], "三维表应为二维表的平铺");
        }
    }

    #[test]
    fn test_quality_scaling_monotonic() {
        // 质量越低除子越大
        let mut low = QuantTable::base_luma(&[8, 8], 1);
        let mut high = QuantTable::base_luma(&[8, 8], 1);
        low.scale_by_quality(10);
        high.scale_by_quality(90);
        for i in 0..64 {
            assert!(low.values[i] >= high.values[i]);
        }

        // q = 100 时所有条目夹取到 1 (无损量化)
        let mut best = QuantTable::base_luma(&[8, 8], 1);
        best.scale_by_quality(100);
        assert!(best.values.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_quantize_dequantize() {
        let mut table = QuantTable::base_luma(&[8, 8], 1);
        table.scale_by_quality(50);

        let dct: Vec<f32> = (0..64).map(|i| (i as f32 - 32.0) * 17.5).collect();
        let mut q = vec![0i64; 64];
        let mut restored = vec![0.0f32; 64];
        table.quantize(&dct, &mut q, 2047);
        table.dequantize(&q, &mut restored);

        for i in 0..64 {
            let step = table.values[i] as f32;
            assert!(
                (restored[i] - dct[i]).abs() <= step / 2.0 + 1e-3,
                "反量化误差超过半步长: {} vs {}",
                restored[i],
                dct[i],
            );
        }
    }

    #[test]
    fn test_serialization_roundtrip() {
        for byte_width in [1u8, 2] {
            let mut table = QuantTable::base_chroma(&[8, 8], byte_width);
            table.scale_by_quality(37);

            let mut buf = Vec::new();
            table.write_to(&mut buf).unwrap();
            assert_eq!(buf.len(), 64 * byte_width as usize);

            let restored = QuantTable::read_from(&mut &buf[..], &[8, 8], byte_width).unwrap();
            assert_eq!(table, restored);
        }
    }
}
