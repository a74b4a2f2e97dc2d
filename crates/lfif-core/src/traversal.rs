//! 遍历表 (系数扫描顺序).
//!
//! 由参考块驱动的系数重排: 参考块是全图所有量化块绝对值之和,
//! 遍历表按参考幅度降序排列系数, 把高能量系数集中到扫描前端,
//! 最大化 EOB 截断收益. 每个文件两个实例 (亮度、色度共用).

use std::io::{Read, Write};

use crate::{LfifError, LfifResult};

/// 遍历表
///
/// {0,…,Bᴰ−1} 的置换: 扫描位置 k 处存放块内平坦索引 `order[k]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalTable {
    /// 扫描位置 → 块内索引
    order: Vec<usize>,
}

impl TraversalTable {
    /// 恒等遍历 (扫描顺序即存储顺序)
    pub fn identity(size: usize) -> Self {
        Self {
            order: (0..size).collect(),
        }
    }

    /// 由参考块构造: 参考幅度降序, 平局按平坦索引升序
    pub fn from_reference(reference: &[u64]) -> Self {
        let mut order: Vec<usize> = (0..reference.len()).collect();
        order.sort_by(|&a, &b| reference[b].cmp(&reference[a]).then(a.cmp(&b)));
        Self { order }
    }

    /// 表长度
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// 表是否为空
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 扫描位置 k 对应的块内索引
    pub fn index_at(&self, k: usize) -> usize {
        self.order[k]
    }

    /// 按扫描顺序重排块: `out[k] = block[order[k]]`
    pub fn traverse(&self, block: &[i64], out: &mut [i64]) {
        debug_assert_eq!(block.len(), self.order.len());
        for (k, &index) in self.order.iter().enumerate() {
            out[k] = block[index];
        }
    }

    /// 逆重排: `out[order[k]] = scanned[k]`
    pub fn detraverse(&self, scanned: &[i64], out: &mut [i64]) {
        debug_assert_eq!(scanned.len(), self.order.len());
        for (k, &index) in self.order.iter().enumerate() {
            out[index] = scanned[k];
        }
    }

    /// 每个条目的序列化字节数: `⌈⌈log₂ size⌉ / 8⌉`
    pub fn entry_width(size: usize) -> usize {
        let bits = (usize::BITS - (size - 1).leading_zeros()).max(1);
        bits.div_ceil(8) as usize
    }

    /// 序列化: 逐条目按小端写出
    pub fn write_to<W: Write>(&self, output: &mut W) -> LfifResult<()> {
        let width = Self::entry_width(self.order.len());
        for &index in &self.order {
            output.write_all(&index.to_le_bytes()[..width])?;
        }
        Ok(())
    }

    /// 反序列化并校验置换性质
    pub fn read_from<R: Read>(input: &mut R, size: usize) -> LfifResult<Self> {
        let width = Self::entry_width(size);
        let mut order = Vec::with_capacity(size);
        let mut seen = vec![false; size];

        for _ in 0..size {
            let mut buf = [0u8; 8];
            input.read_exact(&mut buf[..width])?;
            let index = u64::from_le_bytes(buf) as usize;
            if index >= size || seen[index] {
                return Err(LfifError::InvalidData(format!(
                    "遍历表不是 [0, {}) 的置换",
                    size,
                )));
            }
            seen[index] = true;
            order.push(index);
        }

        Ok(Self { order })
    }
}

/// 累加参考块: `reference[i] += |quantized[i]|`
pub fn accumulate_reference(quantized: &[i64], reference: &mut [u64]) {
    debug_assert_eq!(quantized.len(), reference.len());
    for (i, &q) in quantized.iter().enumerate() {
        reference[i] += q.unsigned_abs();
    }
}
