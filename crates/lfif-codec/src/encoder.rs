//! LFIF 编码器驱动.
//!
//! 每文件生命周期: 构造时校验配置并按质量缩放量化表; 编码时逐图像
//! 拉取像素三元组、均值平移、块化、正向 DCT、量化, 然后按后端分流:
//!
//! - Huffman: 全量量化后累计参考块 → 构造遍历表 → DC 差分 → 游程
//!   编码 → 统计符号权重 → 生成四张规范码表 → 写头部与负载;
//! - CABAC: 逐块 (可选预测残差) 对角扫描编码, 上下文按图像边界重置,
//!   全部图像编码完毕后写终结符.
//!
//! 每个实例自包含, 像素源在调用期间被借用.

use bytes::Bytes;
use log::debug;

use lfif_core::bitstream::OBitstream;
use lfif_core::{geometry, runlength, traversal, Dct, LfifError, LfifResult, QuantTable};

use crate::cabac::CabacEncoder;
use crate::coefficients::{self, DiagonalContexts};
use crate::container::{self, HeaderSpec};
use crate::huffman::{HuffmanTable, HuffmanWeights};
use crate::predict;
use crate::volume;

/// 编码配置
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// 各轴块边长 (长度 D ∈ {2,3,4}, 典型值 8)
    pub block_shape: Vec<usize>,
    /// 图像尺寸, 末轴为图像数量 (长度 D+1)
    pub img_dims: Vec<u64>,
    /// 质量参数, 1..=100
    pub quality: u8,
    /// 每通道样本位深, 1..=16
    pub color_depth: u8,
    /// 熵编码后端: true 为 Huffman, false 为 CABAC
    pub use_huffman: bool,
    /// 帧内预测 (仅 CABAC)
    pub use_prediction: bool,
    /// 均值平移
    pub use_shift: bool,
}

/// LFIF 编码器
pub struct LfifEncoder {
    cfg: EncoderConfig,
    /// 维度 D
    d: usize,
    /// 块内样本数
    block_size: usize,
    /// 块网格尺寸
    grid: Vec<usize>,
    /// 每图像块数
    blocks_cnt: usize,
    /// 幅度位宽
    amp_bits: u32,
    /// 类别位宽
    class_bits: u32,
    /// 量化表 [亮度, 色度]
    quant_tables: [QuantTable; 2],
    /// 均值平移参数 [亮度, 色度]
    shift_param: [u64; 2],
    /// DCT 上下文
    dct: Dct,
}

/// 通道 → 表索引的静态映射: {0→0, 1→1, 2→1}
fn channel_class(channel: usize) -> usize {
    usize::from(channel != 0)
}

impl LfifEncoder {
    /// 校验配置并构造编码器
    pub fn new(cfg: EncoderConfig) -> LfifResult<Self> {
        let d = cfg.block_shape.len();
        if !(2..=4).contains(&d) {
            return Err(LfifError::InvalidArgument(format!(
                "维度 {} 不在 2..=4 内",
                d,
            )));
        }
        if cfg.block_shape.iter().any(|&side| side < 2) {
            return Err(LfifError::InvalidArgument("块边长必须 ≥ 2".into()));
        }
        if !(1..=100).contains(&cfg.quality) {
            return Err(LfifError::InvalidQuality(cfg.quality));
        }
        if cfg.color_depth == 0 || cfg.color_depth > 16 {
            return Err(LfifError::InvalidArgument(format!(
                "位深 {} 不在 1..=16 内",
                cfg.color_depth,
            )));
        }
        if cfg.img_dims.len() != d + 1 {
            return Err(LfifError::InvalidDimensions(format!(
                "img_dims 长度 {} 应为 {}",
                cfg.img_dims.len(),
                d + 1,
            )));
        }
        if cfg.img_dims.iter().any(|&dim| dim == 0) {
            return Err(LfifError::InvalidDimensions(format!("{:?}", cfg.img_dims)));
        }
        if cfg.use_huffman && cfg.use_prediction {
            return Err(LfifError::InvalidArgument(
                "预测仅与 CABAC 后端组合有效".into(),
            ));
        }

        let byte_width = container::quant_byte_width(cfg.color_depth);
        let mut quant_tables = [
            QuantTable::base_luma(&cfg.block_shape, byte_width),
            QuantTable::base_chroma(&cfg.block_shape, byte_width),
        ];
        quant_tables[0].scale_by_quality(cfg.quality);
        quant_tables[1].scale_by_quality(cfg.quality);

        let block_size = geometry::block_size(&cfg.block_shape);
        let grid = volume::block_dims(&cfg.img_dims[..d], &cfg.block_shape);
        let blocks_cnt = grid.iter().product();
        let amp_bits = runlength::amp_bits(block_size, cfg.color_depth, d);
        let shift = 1u64 << (cfg.color_depth - 1);

        debug!(
            "打开 LFIF 编码器: D={}, 块={:?}, 质量={}, 后端={}, 每图像 {} 块",
            d,
            cfg.block_shape,
            cfg.quality,
            if cfg.use_huffman { "huffman" } else { "cabac" },
            blocks_cnt,
        );

        Ok(Self {
            d,
            block_size,
            grid,
            blocks_cnt,
            amp_bits,
            class_bits: runlength::class_bits(amp_bits),
            quant_tables,
            shift_param: [shift, 0],
            dct: Dct::new(&cfg.block_shape),
            cfg,
        })
    }

    /// 编码整个图像体, 返回完整容器字节
    ///
    /// `puller` 以 (D+1) 维索引返回一个已完成色彩变换的样本三元组.
    pub fn encode<F: FnMut(&[usize]) -> [f32; 3]>(&mut self, puller: F) -> LfifResult<Bytes> {
        let mut output = Vec::new();
        if self.cfg.use_huffman {
            self.encode_huffman(&mut output, puller)?;
        } else {
            self.encode_cabac(&mut output, puller)?;
        }
        debug!("编码完成: {} 字节", output.len());
        Ok(Bytes::from(output))
    }

    /// 拉取一幅图像的三个通道平面并做均值平移
    fn pull_planes<F: FnMut(&[usize]) -> [f32; 3]>(
        &self,
        image: usize,
        puller: &mut F,
    ) -> [Vec<f32>; 3] {
        let dims: Vec<usize> = self.cfg.img_dims[..self.d]
            .iter()
            .map(|&dim| dim as usize)
            .collect();
        let pixels: usize = dims.iter().product();
        let mut planes = [
            vec![0.0f32; pixels],
            vec![0.0f32; pixels],
            vec![0.0f32; pixels],
        ];

        let (shift_luma, shift_chroma) = self.shifts();
        let mut full_pos = vec![0usize; self.d + 1];
        full_pos[self.d] = image;
        let mut index = 0usize;
        geometry::for_each_position(&dims, |pos| {
            full_pos[..self.d].copy_from_slice(pos);
            let triplet = puller(&full_pos);
            planes[0][index] = triplet[0] - shift_luma;
            planes[1][index] = triplet[1] - shift_chroma;
            planes[2][index] = triplet[2] - shift_chroma;
            index += 1;
        });
        planes
    }

    fn shifts(&self) -> (f32, f32) {
        if self.cfg.use_shift {
            (self.shift_param[0] as f32, self.shift_param[1] as f32)
        } else {
            (0.0, 0.0)
        }
    }

    fn max_amplitude(&self) -> i64 {
        (1i64 << self.amp_bits) - 1
    }

    fn header_spec<'a>(
        &'a self,
        traversal_tables: Option<&'a [lfif_core::TraversalTable; 2]>,
        huffman_tables: Option<&'a [[HuffmanTable; 2]; 2]>,
    ) -> HeaderSpec<'a> {
        HeaderSpec {
            block_shape: &self.cfg.block_shape,
            color_depth: self.cfg.color_depth,
            img_dims: &self.cfg.img_dims,
            use_huffman: self.cfg.use_huffman,
            use_prediction: self.cfg.use_prediction,
            use_shift: self.cfg.use_shift,
            shift_param: self.shift_param,
            quant_tables: &self.quant_tables,
            traversal_tables,
            huffman_tables,
        }
    }

    /// Huffman 后端编码
    fn encode_huffman<F: FnMut(&[usize]) -> [f32; 3]>(
        &self,
        output: &mut Vec<u8>,
        mut puller: F,
    ) -> LfifResult<()> {
        let images = self.cfg.img_dims[self.d] as usize;
        let total_blocks = images * self.blocks_cnt;
        let size = self.block_size;

        // 第一阶段: 全量量化并累计参考块
        let mut quantized: [Vec<i64>; 3] = [
            vec![0i64; total_blocks * size],
            vec![0i64; total_blocks * size],
            vec![0i64; total_blocks * size],
        ];
        let mut reference = [vec![0u64; size], vec![0u64; size]];

        let mut input_block = vec![0.0f32; size];
        let mut dct_block = vec![0.0f32; size];
        let mut quantized_block = vec![0i64; size];

        for image in 0..images {
            let planes = self.pull_planes(image, &mut puller);
            for block in 0..self.blocks_cnt {
                for channel in 0..3 {
                    let class = channel_class(channel);
                    volume::get_block(
                        &planes[channel],
                        &self.cfg.img_dims[..self.d],
                        &self.cfg.block_shape,
                        &self.grid,
                        block,
                        &mut input_block,
                    );
                    self.dct.forward(&input_block, &mut dct_block);
                    self.quant_tables[class].quantize(
                        &dct_block,
                        &mut quantized_block,
                        self.max_amplitude(),
                    );
                    traversal::accumulate_reference(&quantized_block, &mut reference[class]);

                    let offset = (image * self.blocks_cnt + block) * size;
                    quantized[channel][offset..offset + size].copy_from_slice(&quantized_block);
                }
            }
        }

        // 第二阶段: 参考块 → 遍历表
        let traversal_tables = [
            lfif_core::TraversalTable::from_reference(&reference[0]),
            lfif_core::TraversalTable::from_reference(&reference[1]),
        ];

        // 第三阶段: DC 差分 → 遍历 → 游程编码 → 符号权重
        let mut weights = [
            [HuffmanWeights::new(), HuffmanWeights::new()],
            [HuffmanWeights::new(), HuffmanWeights::new()],
        ];
        let mut previous_dc = [0i64; 3];
        let mut scanned = vec![0i64; size];
        let mut all_pairs = Vec::with_capacity(total_blocks * 3);

        for block in 0..total_blocks {
            for channel in 0..3 {
                let class = channel_class(channel);
                let offset = block * size;
                let quantized_block = &mut quantized[channel][offset..offset + size];

                runlength::diff_encode_dc(&mut quantized_block[0], &mut previous_dc[channel]);
                traversal_tables[class].traverse(quantized_block, &mut scanned);
                let pairs = runlength::encode_block(&scanned, self.class_bits);

                weights[class][0].tally(pairs[0].symbol(self.class_bits));
                for pair in &pairs[1..] {
                    weights[class][1].tally(pair.symbol(self.class_bits));
                }
                all_pairs.push(pairs);
            }
        }

        // 第四阶段: 规范码表
        let huffman_tables = [
            [
                HuffmanTable::from_weights(&weights[0][0]),
                HuffmanTable::from_weights(&weights[0][1]),
            ],
            [
                HuffmanTable::from_weights(&weights[1][0]),
                HuffmanTable::from_weights(&weights[1][1]),
            ],
        ];

        // 头部 + 负载
        container::write_header(
            output,
            &self.header_spec(Some(&traversal_tables), Some(&huffman_tables)),
        )?;

        let mut bitstream = OBitstream::new(&mut *output);
        for (index, pairs) in all_pairs.iter().enumerate() {
            let class = channel_class(index % 3);
            crate::huffman::encode_pair(
                &pairs[0],
                &huffman_tables[class][0],
                self.class_bits,
                &mut bitstream,
            )?;
            for pair in &pairs[1..] {
                crate::huffman::encode_pair(
                    pair,
                    &huffman_tables[class][1],
                    self.class_bits,
                    &mut bitstream,
                )?;
            }
        }
        bitstream.flush()
    }

    /// CABAC 后端编码
    fn encode_cabac<F: FnMut(&[usize]) -> [f32; 3]>(
        &self,
        output: &mut Vec<u8>,
        mut puller: F,
    ) -> LfifResult<()> {
        container::write_header(output, &self.header_spec(None, None))?;

        let images = self.cfg.img_dims[self.d] as usize;
        let size = self.block_size;
        let shape = &self.cfg.block_shape;
        let num_diagonals = geometry::num_diagonals(shape);
        let threshold = num_diagonals / 2;
        let scan = geometry::diagonal_scan(shape);
        let num_types = predict::num_prediction_types(self.d);

        let mut contexts = [
            DiagonalContexts::new(num_diagonals, threshold),
            DiagonalContexts::new(num_diagonals, threshold),
        ];

        // 块对齐的重建平面 (仅预测路径需要)
        let aligned_dims: Vec<u64> = self
            .grid
            .iter()
            .zip(shape.iter())
            .map(|(&g, &s)| (g * s) as u64)
            .collect();
        let aligned_total: u64 = aligned_dims.iter().product();
        let mut reconstructed: [Vec<f32>; 3] = if self.cfg.use_prediction {
            [
                vec![0.0f32; aligned_total as usize],
                vec![0.0f32; aligned_total as usize],
                vec![0.0f32; aligned_total as usize],
            ]
        } else {
            [Vec::new(), Vec::new(), Vec::new()]
        };

        let mut bitstream = OBitstream::new(&mut *output);
        let mut cabac = CabacEncoder::new();

        let mut input_block = vec![0.0f32; size];
        let mut prediction = vec![0.0f32; size];
        let mut residual = vec![0.0f32; size];
        let mut dct_block = vec![0.0f32; size];
        let mut quantized_block = vec![0i64; size];
        let mut reconstructed_block = vec![0.0f32; size];

        for image in 0..images {
            contexts[0].reset();
            contexts[1].reset();
            if self.cfg.use_prediction {
                for plane in reconstructed.iter_mut() {
                    plane.fill(0.0);
                }
            }

            let planes = self.pull_planes(image, &mut puller);
            for block in 0..self.blocks_cnt {
                let mut prediction_type = 0u64;
                if self.cfg.use_prediction {
                    volume::get_block(
                        &planes[0],
                        &self.cfg.img_dims[..self.d],
                        shape,
                        &self.grid,
                        block,
                        &mut input_block,
                    );
                    prediction_type = predict::choose_prediction_type(
                        &input_block,
                        shape,
                        &self.grid,
                        &self.cfg.img_dims[..self.d],
                        &reconstructed[0],
                        block,
                    );
                    coefficients::encode_prediction_type(
                        &mut cabac,
                        &mut bitstream,
                        &mut contexts[0],
                        prediction_type,
                        num_types,
                    )?;
                }

                for channel in 0..3 {
                    let class = channel_class(channel);
                    volume::get_block(
                        &planes[channel],
                        &self.cfg.img_dims[..self.d],
                        shape,
                        &self.grid,
                        block,
                        &mut input_block,
                    );

                    if self.cfg.use_prediction {
                        predict::predict_block(
                            &mut prediction,
                            shape,
                            &self.grid,
                            &self.cfg.img_dims[..self.d],
                            &reconstructed[channel],
                            block,
                            prediction_type,
                        );
                        for i in 0..size {
                            residual[i] = input_block[i] - prediction[i];
                        }
                    } else {
                        residual.copy_from_slice(&input_block);
                    }

                    self.dct.forward(&residual, &mut dct_block);
                    self.quant_tables[class].quantize(
                        &dct_block,
                        &mut quantized_block,
                        self.max_amplitude(),
                    );
                    coefficients::encode_block(
                        &mut cabac,
                        &mut bitstream,
                        &mut contexts[class],
                        &scan,
                        threshold,
                        &quantized_block,
                    )?;

                    if self.cfg.use_prediction {
                        // 编码端按解码链路重建, 保证预测参考一致
                        self.quant_tables[class].dequantize(&quantized_block, &mut dct_block);
                        self.dct.inverse(&dct_block, &mut reconstructed_block);
                        for i in 0..size {
                            reconstructed_block[i] += prediction[i];
                        }
                        volume::put_block(
                            &reconstructed_block,
                            &aligned_dims,
                            shape,
                            &self.grid,
                            block,
                            &mut reconstructed[channel],
                        );
                    }
                }
            }
        }

        cabac.terminate(&mut bitstream)?;
        bitstream.flush()
    }
}
