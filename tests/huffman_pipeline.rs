//! Huffman 后端集成测试.
//!
//! 内存中构造图像体 → 编码 → 解码 → 对比往返结果.

use std::io::Cursor;

use lfif_codec::decoder::{read_header, LfifDecoder};
use lfif_codec::encoder::{EncoderConfig, LfifEncoder};

/// 内存图像体: (D+1) 维样本三元组容器
struct Volume {
    dims: Vec<u64>,
    data: Vec<[f32; 3]>,
}

impl Volume {
    fn new(dims: &[u64]) -> Self {
        let total: u64 = dims.iter().product();
        Self {
            dims: dims.to_vec(),
            data: vec![[0.0; 3]; total as usize],
        }
    }

    fn index(&self, pos: &[usize]) -> usize {
        let mut index = 0usize;
        for i in (0..self.dims.len()).rev() {
            index = index * self.dims[i] as usize + pos[i];
        }
        index
    }

    fn fill<F: FnMut(&[usize]) -> [f32; 3]>(dims: &[u64], mut f: F) -> Self {
        let mut volume = Self::new(dims);
        let usize_dims: Vec<usize> = dims.iter().map(|&d| d as usize).collect();
        let mut pos = vec![0usize; dims.len()];
        for i in 0..volume.data.len() {
            let mut rest = i;
            for (axis, &side) in usize_dims.iter().enumerate() {
                pos[axis] = rest % side;
                rest /= side;
            }
            volume.data[i] = f(&pos);
        }
        volume
    }
}

fn roundtrip(cfg: EncoderConfig, input: &Volume) -> (Volume, usize, usize) {
    let mut encoder = LfifEncoder::new(cfg.clone()).unwrap();
    let bytes = encoder.encode(|pos| input.data[input.index(pos)]).unwrap();

    let mut cursor = Cursor::new(&bytes[..]);
    let meta = read_header(&mut cursor).unwrap();
    let header_len = cursor.position() as usize;
    let payload_len = bytes.len() - header_len;

    let mut decoder = LfifDecoder::new(meta).unwrap();
    let mut output = Volume::new(&cfg.img_dims);
    decoder
        .decode(&mut cursor, |pos, triplet| {
            let index = output.index(pos);
            output.data[index] = triplet;
        })
        .unwrap();
    (output, header_len, payload_len)
}

/// 亮度通道 PSNR (dB)
fn psnr_luma(a: &Volume, b: &Volume, max: f64) -> f64 {
    let mse: f64 = a
        .data
        .iter()
        .zip(b.data.iter())
        .map(|(x, y)| {
            let diff = f64::from(x[0]) - f64::from(y[0]);
            diff * diff
        })
        .sum::<f64>()
        / a.data.len() as f64;
    10.0 * (max * max / mse.max(1e-9)).log10()
}

fn config(img_dims: &[u64], block_shape: &[usize], quality: u8) -> EncoderConfig {
    EncoderConfig {
        block_shape: block_shape.to_vec(),
        img_dims: img_dims.to_vec(),
        quality,
        color_depth: 8,
        use_huffman: true,
        use_prediction: false,
        use_shift: true,
    }
}

#[test]
fn test_常数灰度块_无损往返() {
    // 8x8 常数灰 128: 平移后全零, 量化层以下无损, 负载极小
    let dims = [8u64, 8, 1];
    let input = Volume::fill(&dims, |_| [128.0, 0.0, 0.0]);
    let (output, _, payload_len) = roundtrip(config(&dims, &[8, 8], 50), &input);

    for (a, b) in input.data.iter().zip(output.data.iter()) {
        for c in 0..3 {
            assert!(
                (a[c] - b[c]).abs() < 1e-3,
                "常数块应精确往返: {} vs {}",
                a[c],
                b[c],
            );
        }
    }
    assert!(payload_len < 30, "负载 {} 字节应小于 30", payload_len);
}

#[test]
fn test_渐变图像_高质量() {
    // 16x16 渐变 x+y, q=80: PSNR 应超过 40 dB
    let dims = [16u64, 16, 1];
    let input = Volume::fill(&dims, |pos| [(pos[0] + pos[1]) as f32, 0.0, 0.0]);
    let (output, _, _) = roundtrip(config(&dims, &[8, 8], 80), &input);

    let psnr = psnr_luma(&input, &output, 255.0);
    assert!(psnr > 40.0, "PSNR {:.2} dB 应大于 40", psnr);
}

#[test]
fn test_非对齐尺寸_边界复制() {
    // 9x9 图像: 块网格 2x2, 边界复制不得污染界内像素
    let dims = [9u64, 9, 1];
    let input = Volume::fill(&dims, |pos| {
        [(pos[0] * 11 + pos[1] * 7) as f32 % 200.0, 10.0, -10.0]
    });

    let cfg = config(&dims, &[8, 8], 75);
    let mut encoder = LfifEncoder::new(cfg.clone()).unwrap();
    let bytes = encoder.encode(|pos| input.data[input.index(pos)]).unwrap();

    let mut cursor = Cursor::new(&bytes[..]);
    let meta = read_header(&mut cursor).unwrap();
    let mut decoder = LfifDecoder::new(meta).unwrap();
    assert_eq!(decoder.block_dims(), &[2, 2]);

    let mut visited = vec![0u32; 81];
    let mut output = Volume::new(&dims);
    decoder
        .decode(&mut cursor, |pos, triplet| {
            assert!(pos[0] < 9 && pos[1] < 9, "像素汇收到越界位置 {:?}", pos);
            visited[pos[1] * 9 + pos[0]] += 1;
            let index = output.index(pos);
            output.data[index] = triplet;
        })
        .unwrap();

    assert!(visited.iter().all(|&v| v == 1), "每个界内像素应恰好推送一次");
    let psnr = psnr_luma(&input, &output, 255.0);
    assert!(psnr > 30.0, "PSNR {:.2} dB 过低", psnr);
}

#[test]
fn test_多图像_多通道往返() {
    // 4 幅 16x16 视图, 三通道各异
    let dims = [16u64, 16, 4];
    let input = Volume::fill(&dims, |pos| {
        let (x, y, view) = (pos[0] as f32, pos[1] as f32, pos[2] as f32);
        [
            128.0 + 40.0 * ((x + view) * 0.3).sin(),
            20.0 * (y * 0.2).cos(),
            -15.0 + x * 0.5,
        ]
    });
    let (output, _, _) = roundtrip(config(&dims, &[8, 8], 70), &input);

    let psnr = psnr_luma(&input, &output, 255.0);
    assert!(psnr > 35.0, "PSNR {:.2} dB 过低", psnr);
}

#[test]
fn test_编码确定性() {
    let dims = [16u64, 16, 2];
    let input = Volume::fill(&dims, |pos| {
        [((pos[0] * 31 + pos[1] * 17 + pos[2] * 5) % 256) as f32, 0.0, 0.0]
    });

    let mut enc1 = LfifEncoder::new(config(&dims, &[8, 8], 60)).unwrap();
    let bytes1 = enc1.encode(|pos| input.data[input.index(pos)]).unwrap();
    let mut enc2 = LfifEncoder::new(config(&dims, &[8, 8], 60)).unwrap();
    let bytes2 = enc2.encode(|pos| input.data[input.index(pos)]).unwrap();
    assert_eq!(bytes1, bytes2, "相同输入与配置应产生相同码流");
}

#[test]
fn test_量化层不动点() {
    // 解码结果再编码一次应收敛 (量化层以下精确往返)
    let dims = [16u64, 16, 1];
    let input = Volume::fill(&dims, |pos| {
        [((pos[0] * pos[1]) % 256) as f32, (pos[0] % 32) as f32, 0.0]
    });
    let cfg = config(&dims, &[8, 8], 55);
    let (first, _, _) = roundtrip(cfg.clone(), &input);
    let (second, _, _) = roundtrip(cfg, &first);

    for (a, b) in first.data.iter().zip(second.data.iter()) {
        for c in 0..3 {
            assert!(
                (a[c] - b[c]).abs() < 2e-2,
                "不动点偏移: {} vs {}",
                a[c],
                b[c],
            );
        }
    }
}

#[test]
fn test_十位深往返() {
    // 10 位样本 → 16 位量化表条目. 表按 2^15 量级标定, 对 10 位内容
    // 量化偏粗, 高质量下平滑信号仍应保真
    let dims = [8u64, 8, 1];
    let mut cfg = config(&dims, &[8, 8], 98);
    cfg.color_depth = 10;
    let input = Volume::fill(&dims, |pos| {
        [(pos[0] * 60 + pos[1] * 30) as f32, 0.0, 0.0]
    });
    let (output, _, _) = roundtrip(cfg, &input);

    let psnr = psnr_luma(&input, &output, 1023.0);
    assert!(psnr > 30.0, "10 位 PSNR {:.2} dB 过低", psnr);
}

#[test]
fn test_截断负载报错() {
    let dims = [16u64, 16, 1];
    let input = Volume::fill(&dims, |pos| {
        [((pos[0] * 37 + pos[1] * 3) % 256) as f32, 5.0, -5.0]
    });
    let mut encoder = LfifEncoder::new(config(&dims, &[8, 8], 50)).unwrap();
    let bytes = encoder.encode(|pos| input.data[input.index(pos)]).unwrap();

    let mut cursor = Cursor::new(&bytes[..]);
    let meta = read_header(&mut cursor).unwrap();
    let header_len = cursor.position() as usize;

    // 只保留负载的前几个字节
    let truncated = &bytes[..header_len + 2];
    let mut cursor = Cursor::new(&truncated[header_len..]);
    let mut decoder = LfifDecoder::new(meta).unwrap();
    let result = decoder.decode(&mut cursor, |_, _| {});
    assert!(result.is_err(), "截断的码流应报错");
}
