//! N 维离散余弦变换 (DCT-II / IDCT).
//!
//! 一维核按 JPEG 非归一化约定: 正变换 DC 项除以 √2, 其余不缩放;
//! 反变换同样只对 DC 项除以 √2. 因此裸核往返后每轴增益 B/2.
//! 量化表按此约定标定, 驱动层包装通过固定缩放因子把往返增益归一.
//!
//! D 维变换可分离: 沿各轴依次应用一维变换, 正变换从轴 D−1 到轴 0,
//! 反变换相反. 变换经由中间缓冲完成, 不做原地变换.

use std::f32::consts::FRAC_1_SQRT_2;

use crate::geometry;

/// N 维 DCT 变换上下文
///
/// 按块形状预计算各轴的余弦查找表与驱动层缩放因子.
pub struct Dct {
    /// 块形状 (各轴边长)
    shape: Vec<usize>,
    /// 块内样本总数
    size: usize,
    /// 各轴余弦查找表, `cos[axis][u * n + x] = cos((2x+1)uπ / 2n)`
    cos: Vec<Vec<f32>>,
    /// 正变换缩放: `Π 1/√Bᵢ`
    forward_scale: f32,
    /// 反变换缩放: `Π 2/√Bᵢ`, 与正变换缩放一起抵消裸核的 `(B/2)^D` 往返增益
    inverse_scale: f32,
}

impl Dct {
    /// 按块形状构造变换上下文
    pub fn new(shape: &[usize]) -> Self {
        let cos = shape
            .iter()
            .map(|&n| {
                let mut table = vec![0.0f32; n * n];
                for u in 0..n {
                    for x in 0..n {
                        let angle =
                            ((2 * x + 1) * u) as f64 * std::f64::consts::PI / (2 * n) as f64;
                        table[u * n + x] = angle.cos() as f32;
                    }
                }
                table
            })
            .collect();

        let mut forward_scale = 1.0f64;
        let mut inverse_scale = 1.0f64;
        for &n in shape {
            forward_scale /= (n as f64).sqrt();
            inverse_scale *= 2.0 / (n as f64).sqrt();
        }

        Self {
            shape: shape.to_vec(),
            size: geometry::block_size(shape),
            cos,
            forward_scale: forward_scale as f32,
            inverse_scale: inverse_scale as f32,
        }
    }

    /// 块内样本总数
    pub fn size(&self) -> usize {
        self.size
    }

    /// 裸正变换: 沿轴 D−1 … 0 依次应用一维 DCT-II, 无缩放
    pub fn forward_raw(&self, input: &[f32], output: &mut [f32]) {
        self.apply(input, output, true);
    }

    /// 裸反变换: 沿轴 0 … D−1 依次应用一维 IDCT, 无缩放
    ///
    /// `inverse_raw(forward_raw(x))` 每轴放大 B/2.
    pub fn inverse_raw(&self, input: &[f32], output: &mut [f32]) {
        self.apply(input, output, false);
    }

    /// 驱动层正变换 (含缩放), 与 [`Dct::inverse`] 互为精确逆
    pub fn forward(&self, input: &[f32], output: &mut [f32]) {
        self.forward_raw(input, output);
        for v in output.iter_mut() {
            *v *= self.forward_scale;
        }
    }

    /// 驱动层反变换 (含缩放)
    pub fn inverse(&self, input: &[f32], output: &mut [f32]) {
        self.inverse_raw(input, output);
        for v in output.iter_mut() {
            *v *= self.inverse_scale;
        }
    }

    fn apply(&self, input: &[f32], output: &mut [f32], forward: bool) {
        debug_assert_eq!(input.len(), self.size);
        debug_assert_eq!(output.len(), self.size);

        let d = self.shape.len();
        let mut cur = input.to_vec();
        let mut next = vec![0.0f32; self.size];

        let axes: Vec<usize> = if forward {
            (0..d).rev().collect()
        } else {
            (0..d).collect()
        };

        for axis in axes {
            self.apply_axis(axis, &cur, &mut next, forward);
            std::mem::swap(&mut cur, &mut next);
        }

        output.copy_from_slice(&cur);
    }

    /// 对沿 `axis` 的每条一维序列应用一维变换
    fn apply_axis(&self, axis: usize, src: &[f32], dst: &mut [f32], forward: bool) {
        let n = self.shape[axis];
        let s = geometry::stride(&self.shape, axis);
        let table = &self.cos[axis];
        let outer = self.size / (s * n);

        for hi in 0..outer {
            for lo in 0..s {
                let base = hi * s * n + lo;
                if forward {
                    // X[0] = Σ x[i] / √2, X[u] = Σ x[i]·cos((2i+1)uπ/2n)
                    let mut dc = 0.0f32;
                    for x in 0..n {
                        dc += src[base + x * s];
                    }
                    dst[base] = dc * FRAC_1_SQRT_2;

                    for u in 1..n {
                        let mut acc = 0.0f32;
                        for x in 0..n {
                            acc += src[base + x * s] * table[u * n + x];
                        }
                        dst[base + u * s] = acc;
                    }
                } else {
                    // y[x] = X[0]/√2 + Σ_{u≥1} X[u]·cos((2x+1)uπ/2n)
                    let dc = src[base] * FRAC_1_SQRT_2;
                    for x in 0..n {
                        let mut acc = dc;
                        for u in 1..n {
                            acc += src[base + u * s] * table[u * n + x];
                        }
                        dst[base + x * s] = acc;
                    }
                }
            }
        }
    }
}
