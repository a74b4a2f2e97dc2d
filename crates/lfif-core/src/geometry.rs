//! N 维块几何.
//!
//! 超立方体块的步长、线性化与对角线枚举. 块内样本按字典序连续存放,
//! 轴 0 变化最快: `index = Σᵢ posᵢ · Πⱼ<ᵢ Bⱼ`.

/// 块内样本总数 (各轴边长之积)
pub fn block_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// 轴 `axis` 的步长 (之前所有轴边长之积)
pub fn stride(shape: &[usize], axis: usize) -> usize {
    shape[..axis].iter().product()
}

/// 位置向量线性化为平坦索引
pub fn linearize(shape: &[usize], pos: &[usize]) -> usize {
    let mut index = 0;
    for i in (0..shape.len()).rev() {
        index = index * shape[i] + pos[i];
    }
    index
}

/// 平坦索引分解为位置向量
pub fn position(shape: &[usize], index: usize, pos: &mut [usize]) {
    let mut rest = index;
    for (i, &side) in shape.iter().enumerate() {
        pos[i] = rest % side;
        rest /= side;
    }
}

/// 按字典序 (轴 0 最快) 遍历形状内的所有位置
pub fn for_each_position<F: FnMut(&[usize])>(shape: &[usize], mut callback: F) {
    let size = block_size(shape);
    let mut pos = vec![0usize; shape.len()];
    for _ in 0..size {
        callback(&pos);
        for i in 0..shape.len() {
            pos[i] += 1;
            if pos[i] < shape[i] {
                break;
            }
            pos[i] = 0;
        }
    }
}

/// 对角线数量: `1 + Σ (Bᵢ − 1)`
pub fn num_diagonals(shape: &[usize]) -> usize {
    1 + shape.iter().map(|&side| side - 1).sum::<usize>()
}

/// 构造对角线扫描表
///
/// 第 `d` 条对角线包含所有坐标和为 `d` 的位置的平坦索引,
/// 每条对角线内按平坦索引升序排列. 此顺序是编解码双方的契约.
pub fn diagonal_scan(shape: &[usize]) -> Vec<Vec<usize>> {
    let mut scan = vec![Vec::new(); num_diagonals(shape)];
    let mut pos = vec![0usize; shape.len()];
    for index in 0..block_size(shape) {
        position(shape, index, &mut pos);
        let diagonal: usize = pos.iter().sum();
        scan[diagonal].push(index);
    }
    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_and_size() {
        let shape = [8, 4, 2];
        assert_eq!(block_size(&shape), 64);
        assert_eq!(stride(&shape, 0), 1);
        assert_eq!(stride(&shape, 1), 8);
        assert_eq!(stride(&shape, 2), 32);
    }

    #[test]
    fn test_linearize_position_roundtrip() {
        let shape = [8, 4, 2];
        let mut pos = [0usize; 3];
        for index in 0..block_size(&shape) {
            position(&shape, index, &mut pos);
            assert_eq!(linearize(&shape, &pos), index);
        }
    }

    #[test]
    fn test_for_each_position_order() {
        let shape = [2, 2];
        let mut visited = Vec::new();
        for_each_position(&shape, |pos| visited.push(pos.to_vec()));
        assert_eq!(
            visited,
            vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]],
            "轴 0 应变化最快",
        );
    }

    #[test]
    fn test_num_diagonals() {
        assert_eq!(num_diagonals(&[8, 8]), 15);
        assert_eq!(num_diagonals(&[8, 8, 8]), 22);
        assert_eq!(num_diagonals(&[4, 8]), 11);
    }

    #[test]
    fn test_diagonal_scan_is_partition() {
        let shape = [8, 8];
        let scan = diagonal_scan(&shape);
        assert_eq!(scan.len(), 15);

        let mut seen = vec![false; 64];
        let mut pos = [0usize; 2];
        for (d, diagonal) in scan.iter().enumerate() {
            for &index in diagonal {
                assert!(!seen[index], "索引 {} 出现在多条对角线上", index);
                seen[index] = true;
                position(&shape, index, &mut pos);
                assert_eq!(pos[0] + pos[1], d);
            }
        }
        assert!(seen.iter().all(|&v| v), "扫描表应覆盖所有索引");
    }

    #[test]
    fn test_diagonal_scan_first_entries() {
        // 8x8 块: 对角线 1 = {索引 1 (1,0), 索引 8 (0,1)}, 平坦索引升序
        let scan = diagonal_scan(&[8, 8]);
        assert_eq!(scan[0], vec![0]);
        assert_eq!(scan[1], vec![1, 8]);
        assert_eq!(scan[2], vec![2, 9, 16]);
    }
}
