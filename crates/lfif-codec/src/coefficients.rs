//! CABAC 对角扫描系数编码.
//!
//! 量化块 (或预测残差) 按对角线顺序整块扫描, 块结束隐含在系数计数中:
//!
//! 1. 逐对角线编码 "对角线内有非零" 标志; 置位时再对对角线扫描向量中的
//!    每个位置编码逐系数显著性位, 上下文索引在阈值 `⌊对角线数/2⌋` 以上折叠.
//! 2. 对每个显著系数编码幅度 (截断一元前缀 + 0 阶指数哥伦布旁路余项)
//!    与符号 (旁路位).
//!
//! 上下文组按通道类划分 (亮度 / 色度共用), 在同一图像内跨块持续自适应,
//! 图像边界处重置.

use std::io::{Read, Write};

use lfif_core::bitstream::{IBitstream, OBitstream};
use lfif_core::LfifResult;

use crate::cabac::{CabacDecoder, CabacEncoder, ContextModel};

/// 幅度一元前缀的上下文数量, 同时是前缀截断点
pub const MAGNITUDE_PREFIX_CONTEXTS: usize = 3;

/// 预测类型一元码的上下文数量
pub const PREDICTION_TYPE_CONTEXTS: usize = 4;

/// 一个通道类的对角扫描上下文组
pub struct DiagonalContexts {
    /// 逐对角线 "有非零系数" 上下文
    sig_diagonal: Vec<ContextModel>,
    /// 逐系数显著性上下文 (对角线索引在阈值以上折叠)
    sig_coefficient: Vec<ContextModel>,
    /// 幅度一元前缀上下文 (末档兼作逃逸到旁路的指示)
    magnitude: [ContextModel; MAGNITUDE_PREFIX_CONTEXTS],
    /// 预测类型一元前缀上下文
    prediction_type: [ContextModel; PREDICTION_TYPE_CONTEXTS],
}

impl DiagonalContexts {
    /// 按对角线数量与折叠阈值创建上下文组
    pub fn new(num_diagonals: usize, threshold: usize) -> Self {
        Self {
            sig_diagonal: vec![ContextModel::new(); num_diagonals],
            sig_coefficient: vec![ContextModel::new(); threshold + 1],
            magnitude: [ContextModel::new(); MAGNITUDE_PREFIX_CONTEXTS],
            prediction_type: [ContextModel::new(); PREDICTION_TYPE_CONTEXTS],
        }
    }

    /// 图像边界处重置所有上下文
    pub fn reset(&mut self) {
        for ctx in self
            .sig_diagonal
            .iter_mut()
            .chain(self.sig_coefficient.iter_mut())
            .chain(self.magnitude.iter_mut())
            .chain(self.prediction_type.iter_mut())
        {
            ctx.reset();
        }
    }
}

/// 编码一个量化块
pub fn encode_block<W: Write>(
    cabac: &mut CabacEncoder,
    bitstream: &mut OBitstream<W>,
    contexts: &mut DiagonalContexts,
    scan: &[Vec<usize>],
    threshold: usize,
    block: &[i64],
) -> LfifResult<()> {
    // 第一遍: 显著性图
    for (d, diagonal) in scan.iter().enumerate() {
        let any_significant = diagonal.iter().any(|&i| block[i] != 0);
        cabac.encode_bit(bitstream, &mut contexts.sig_diagonal[d], any_significant)?;

        if any_significant {
            let ctx_index = d.min(threshold);
            for &i in diagonal {
                cabac.encode_bit(
                    bitstream,
                    &mut contexts.sig_coefficient[ctx_index],
                    block[i] != 0,
                )?;
            }
        }
    }

    // 第二遍: 显著系数的幅度与符号
    for diagonal in scan {
        for &i in diagonal {
            if block[i] != 0 {
                encode_magnitude(cabac, bitstream, contexts, block[i].unsigned_abs())?;
                cabac.encode_bypass(bitstream, block[i] < 0)?;
            }
        }
    }

    Ok(())
}

/// 解码一个量化块
pub fn decode_block<R: Read>(
    cabac: &mut CabacDecoder,
    bitstream: &mut IBitstream<R>,
    contexts: &mut DiagonalContexts,
    scan: &[Vec<usize>],
    threshold: usize,
    block: &mut [i64],
) -> LfifResult<()> {
    block.fill(0);

    // 第一遍: 显著性图 (显著位置先以 1 标记)
    for (d, diagonal) in scan.iter().enumerate() {
        if cabac.decode_bit(bitstream, &mut contexts.sig_diagonal[d])? {
            let ctx_index = d.min(threshold);
            for &i in diagonal {
                if cabac.decode_bit(bitstream, &mut contexts.sig_coefficient[ctx_index])? {
                    block[i] = 1;
                }
            }
        }
    }

    // 第二遍: 幅度与符号
    for diagonal in scan {
        for &i in diagonal {
            if block[i] != 0 {
                let magnitude = decode_magnitude(cabac, bitstream, contexts)? as i64;
                let negative = cabac.decode_bypass(bitstream)?;
                block[i] = if negative { -magnitude } else { magnitude };
            }
        }
    }

    Ok(())
}

/// 编码幅度 m ≥ 1: v = m−1 的截断一元前缀 + EG0 旁路余项
fn encode_magnitude<W: Write>(
    cabac: &mut CabacEncoder,
    bitstream: &mut OBitstream<W>,
    contexts: &mut DiagonalContexts,
    magnitude: u64,
) -> LfifResult<()> {
    let v = magnitude - 1;
    for k in 0..MAGNITUDE_PREFIX_CONTEXTS as u64 {
        let more = v > k;
        cabac.encode_bit(bitstream, &mut contexts.magnitude[k as usize], more)?;
        if !more {
            return Ok(());
        }
    }
    encode_exp_golomb(cabac, bitstream, v - MAGNITUDE_PREFIX_CONTEXTS as u64)
}

/// 解码幅度
fn decode_magnitude<R: Read>(
    cabac: &mut CabacDecoder,
    bitstream: &mut IBitstream<R>,
    contexts: &mut DiagonalContexts,
) -> LfifResult<u64> {
    let mut v = 0u64;
    for k in 0..MAGNITUDE_PREFIX_CONTEXTS {
        if cabac.decode_bit(bitstream, &mut contexts.magnitude[k])? {
            v += 1;
        } else {
            return Ok(v + 1);
        }
    }
    Ok(v + decode_exp_golomb(cabac, bitstream)? + 1)
}

/// 0 阶指数哥伦布 (旁路位): n 个 1 前缀, 0 终止, n 位余项
fn encode_exp_golomb<W: Write>(
    cabac: &mut CabacEncoder,
    bitstream: &mut OBitstream<W>,
    value: u64,
) -> LfifResult<()> {
    let mut n = 0u32;
    while value + 1 >= 2u64 << n {
        cabac.encode_bypass(bitstream, true)?;
        n += 1;
    }
    cabac.encode_bypass(bitstream, false)?;

    let rest = value + 1 - (1 << n);
    for shift in (0..n).rev() {
        cabac.encode_bypass(bitstream, (rest >> shift) & 1 != 0)?;
    }
    Ok(())
}

/// 解码 0 阶指数哥伦布
fn decode_exp_golomb<R: Read>(
    cabac: &mut CabacDecoder,
    bitstream: &mut IBitstream<R>,
) -> LfifResult<u64> {
    let mut n = 0u32;
    while cabac.decode_bypass(bitstream)? {
        n += 1;
    }
    let mut rest = 0u64;
    for _ in 0..n {
        rest = (rest << 1) | u64::from(cabac.decode_bypass(bitstream)?);
    }
    Ok((1u64 << n) - 1 + rest)
}

/// 编码预测类型: 截断一元码, 上下文在第 4 档折叠
pub fn encode_prediction_type<W: Write>(
    cabac: &mut CabacEncoder,
    bitstream: &mut OBitstream<W>,
    contexts: &mut DiagonalContexts,
    prediction_type: u64,
    num_types: u64,
) -> LfifResult<()> {
    for k in 0..num_types - 1 {
        let ctx_index = (k as usize).min(PREDICTION_TYPE_CONTEXTS - 1);
        let more = prediction_type > k;
        cabac.encode_bit(bitstream, &mut contexts.prediction_type[ctx_index], more)?;
        if !more {
            break;
        }
    }
    Ok(())
}

/// 解码预测类型
pub fn decode_prediction_type<R: Read>(
    cabac: &mut CabacDecoder,
    bitstream: &mut IBitstream<R>,
    contexts: &mut DiagonalContexts,
    num_types: u64,
) -> LfifResult<u64> {
    let mut prediction_type = 0u64;
    for k in 0..num_types - 1 {
        let ctx_index = (k as usize).min(PREDICTION_TYPE_CONTEXTS - 1);
        if cabac.decode_bit(bitstream, &mut contexts.prediction_type[ctx_index])? {
            prediction_type += 1;
        } else {
            break;
        }
    }
    Ok(prediction_type)
}
