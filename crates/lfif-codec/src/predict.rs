//! D 维方向性帧内预测.
//!
//! 由已重建的邻域样本外推当前块. 预测类型字母表为 `T = 2^D + 1`:
//! 类型 0 不预测, 类型 1 为 DC (各侧超平面样本均值), 类型 2…2^D 按
//! 方向向量 `dir ∈ {0,1}^D \ {0}` (二进制升序) 做角度外推: 块内每个
//! 位置沿 −dir 步进到第一次越过块边界的侧样本.
//!
//! 侧样本读取遵循固定边界策略 (编解码双方的位精确契约):
//! 1. 所有轴都无邻块时整块预测为 0;
//! 2. 坐标 ≥ Bᵢ 且该轴有邻块时夹取到 Bᵢ−1;
//! 3. 坐标为负且该轴有邻块时保留 (跨块读取);
//! 4. 坐标为负且该轴无邻块时夹取到 0;
//! 5. 最后换算为全局坐标并夹取到图像未对齐边界内.
//!
//! 残差 `输入块 − 预测块` 进入变换; 解码端在反变换后加回预测.

use lfif_core::geometry;

/// 预测类型数量: `2^D + 1`
pub fn num_prediction_types(d: usize) -> u64 {
    (1u64 << d) + 1
}

/// 侧样本读取器
///
/// 持有当前块在网格中的位置与逐轴邻块可用性, 按边界策略把相对当前块
/// 原点的整型偏移翻译为重建平面中的样本.
struct SideSampleGetter<'a> {
    shape: &'a [usize],
    img_dims: &'a [u64],
    /// 块对齐的重建平面 (各轴尺寸为 grid[i] · shape[i])
    plane: &'a [f32],
    aligned_dims: Vec<usize>,
    block_pos: Vec<usize>,
    neighbour: Vec<bool>,
}

impl<'a> SideSampleGetter<'a> {
    fn new(
        shape: &'a [usize],
        grid: &'a [usize],
        img_dims: &'a [u64],
        plane: &'a [f32],
        block_index: usize,
    ) -> Self {
        let d = shape.len();
        let mut block_pos = vec![0usize; d];
        geometry::position(grid, block_index, &mut block_pos);
        let neighbour = block_pos.iter().map(|&p| p > 0).collect();
        let aligned_dims = grid.iter().zip(shape.iter()).map(|(&g, &s)| g * s).collect();

        Self {
            shape,
            img_dims,
            plane,
            aligned_dims,
            block_pos,
            neighbour,
        }
    }

    /// 是否存在任何邻块
    fn any_neighbour(&self) -> bool {
        self.neighbour.iter().any(|&n| n)
    }

    /// 按边界策略读取相对偏移处的样本
    fn sample(&self, offset: &[i64]) -> f32 {
        let d = self.shape.len();
        let mut index = 0usize;
        for i in (0..d).rev() {
            let side = self.shape[i] as i64;
            let mut o = offset[i];
            if o >= side && self.neighbour[i] {
                o = side - 1;
            }
            if o < 0 && !self.neighbour[i] {
                o = 0;
            }

            let global = (self.block_pos[i] as i64 * side + o)
                .clamp(0, self.img_dims[i] as i64 - 1) as usize;
            index = index * self.aligned_dims[i] + global;
        }
        self.plane[index]
    }
}

/// 生成一个块的预测
///
/// `plane` 为该通道当前图像的块对齐重建平面.
pub fn predict_block(
    prediction: &mut [f32],
    shape: &[usize],
    grid: &[usize],
    img_dims: &[u64],
    plane: &[f32],
    block_index: usize,
    prediction_type: u64,
) {
    let d = shape.len();
    let getter = SideSampleGetter::new(shape, grid, img_dims, plane, block_index);

    if prediction_type == 0 || !getter.any_neighbour() {
        prediction.fill(0.0);
        return;
    }

    if prediction_type == 1 {
        // DC: D 个侧超平面样本的均值
        let mut sum = 0.0f64;
        let mut count = 0usize;
        let mut offset = vec![0i64; d];
        for axis in 0..d {
            let mut face_shape = shape.to_vec();
            face_shape[axis] = 1;
            geometry::for_each_position(&face_shape, |pos| {
                for i in 0..d {
                    offset[i] = pos[i] as i64;
                }
                offset[axis] = -1;
                sum += f64::from(getter.sample(&offset));
                count += 1;
            });
        }
        prediction.fill((sum / count as f64) as f32);
        return;
    }

    // 角度外推: 沿 −dir 步进到第一个越界侧样本
    let direction = prediction_type - 1;
    let mut offset = vec![0i64; d];
    let mut k = 0usize;
    geometry::for_each_position(shape, |pos| {
        let steps = (0..d)
            .filter(|&i| direction >> i & 1 != 0)
            .map(|i| pos[i] as i64 + 1)
            .min()
            .unwrap_or(1);
        for i in 0..d {
            offset[i] = pos[i] as i64 - steps * (direction >> i & 1) as i64;
        }
        prediction[k] = getter.sample(&offset);
        k += 1;
    });
}

/// 编码端预测类型选择: 残差绝对值和最小者, 并列取较小类型
pub fn choose_prediction_type(
    input: &[f32],
    shape: &[usize],
    grid: &[usize],
    img_dims: &[u64],
    plane: &[f32],
    block_index: usize,
) -> u64 {
    let d = shape.len();
    let mut best_type = 0u64;
    let mut best_cost: f64 = input.iter().map(|&v| f64::from(v.abs())).sum();

    let mut prediction = vec![0.0f32; input.len()];
    for t in 1..num_prediction_types(d) {
        predict_block(&mut prediction, shape, grid, img_dims, plane, block_index, t);
        let cost: f64 = input
            .iter()
            .zip(prediction.iter())
            .map(|(&a, &p)| f64::from((a - p).abs()))
            .sum();
        if cost < best_cost {
            best_cost = cost;
            best_type = t;
        }
    }
    best_type
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_prediction_types() {
        assert_eq!(num_prediction_types(2), 5);
        assert_eq!(num_prediction_types(3), 9);
        assert_eq!(num_prediction_types(4), 17);
    }

    #[test]
    fn test_corner_block_predicts_zero() {
        // 原点角块无任何邻块: 所有类型都应给出零块
        let shape = [8usize, 8];
        let grid = [2usize, 2];
        let img_dims = [16u64, 16];
        let plane: Vec<f32> = (0..256).map(|i| i as f32).collect();

        let mut prediction = vec![9.0f32; 64];
        for t in 0..num_prediction_types(2) {
            predict_block(&mut prediction, &shape, &grid, &img_dims, &plane, 0, t);
            assert!(
                prediction.iter().all(|&v| v == 0.0),
                "类型 {} 在角块应预测 0",
                t,
            );
        }
    }

    #[test]
    fn test_horizontal_extrapolation() {
        // 块 (1,0): 仅轴 0 有邻块, 方向 dir=(1,0) (类型 2) 应复制左侧列
        let shape = [8usize, 8];
        let grid = [2usize, 1];
        let img_dims = [16u64, 8];
        let mut plane = vec![0.0f32; 128];
        for y in 0..8 {
            plane[y * 16 + 7] = 10.0 + y as f32; // 左邻块最右列
        }

        let mut prediction = vec![0.0f32; 64];
        predict_block(&mut prediction, &shape, &grid, &img_dims, &plane, 1, 2);
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(
                    prediction[y * 8 + x],
                    10.0 + y as f32,
                    "位置 ({},{}) 应复制左侧列",
                    x,
                    y,
                );
            }
        }
    }

    #[test]
    fn test_dc_prediction_constant_neighbourhood() {
        // 邻域为常数 42 时 DC 预测应为 42
        let shape = [8usize, 8];
        let grid = [2usize, 2];
        let img_dims = [16u64, 16];
        let plane = vec![42.0f32; 256];

        let mut prediction = vec![0.0f32; 64];
        predict_block(&mut prediction, &shape, &grid, &img_dims, &plane, 3, 1);
        for &v in &prediction {
            assert!((v - 42.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_choose_prefers_matching_direction() {
        // 左邻块最右列的行渐变延伸到当前块: 水平外推代价应为 0
        let shape = [8usize, 8];
        let grid = [2usize, 1];
        let img_dims = [16u64, 8];
        let mut plane = vec![0.0f32; 128];
        let mut input = vec![0.0f32; 64];
        for y in 0..8 {
            plane[y * 16 + 7] = y as f32 * 3.0;
            for x in 0..8 {
                input[y * 8 + x] = y as f32 * 3.0;
            }
        }

        let chosen = choose_prediction_type(&input, &shape, &grid, &img_dims, &plane, 1);
        assert_eq!(chosen, 2, "应选中水平外推");
    }
}
