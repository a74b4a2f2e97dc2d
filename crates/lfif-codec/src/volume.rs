//! 块化: 图像平面与超立方体块之间的样本搬运.
//!
//! 块索引按 `block_dims` 的字典序平铺图像; 右/下边缘块通过边界复制
//! 取样 (读取时各轴夹取到图像范围内), 写回时越界位置直接跳过.

use lfif_core::geometry;

/// 派生块网格尺寸: `block_dims[i] = ⌈img_dims[i] / Bᵢ⌉`
pub fn block_dims(img_dims: &[u64], shape: &[usize]) -> Vec<usize> {
    img_dims
        .iter()
        .zip(shape.iter())
        .map(|(&dim, &side)| (dim as usize).div_ceil(side))
        .collect()
}

/// 从平面收集一个块, 越界位置按边界复制
///
/// `dims` 为平面的各轴尺寸 (与 `plane` 的布局一致, 轴 0 最快).
pub fn get_block(
    plane: &[f32],
    dims: &[u64],
    shape: &[usize],
    grid: &[usize],
    block_index: usize,
    out: &mut [f32],
) {
    let d = shape.len();
    let mut block_pos = vec![0usize; d];
    geometry::position(grid, block_index, &mut block_pos);

    let mut global = vec![0usize; d];
    let mut k = 0usize;
    geometry::for_each_position(shape, |pos| {
        for i in 0..d {
            let g = block_pos[i] * shape[i] + pos[i];
            global[i] = g.min(dims[i] as usize - 1);
        }
        let mut index = 0usize;
        for i in (0..d).rev() {
            index = index * dims[i] as usize + global[i];
        }
        out[k] = plane[index];
        k += 1;
    });
}

/// 把一个块写回平面, 越界位置跳过
pub fn put_block(
    block: &[f32],
    dims: &[u64],
    shape: &[usize],
    grid: &[usize],
    block_index: usize,
    plane: &mut [f32],
) {
    let d = shape.len();
    let mut block_pos = vec![0usize; d];
    geometry::position(grid, block_index, &mut block_pos);

    let mut k = 0usize;
    geometry::for_each_position(shape, |pos| {
        let sample = block[k];
        k += 1;

        let mut index = 0usize;
        for i in (0..d).rev() {
            let g = block_pos[i] * shape[i] + pos[i];
            if g >= dims[i] as usize {
                return;
            }
            index = index * dims[i] as usize + g;
        }
        plane[index] = sample;
    });
}
