//! LFIF 解码器驱动.
//!
//! 与编码器互为对偶: 读入头部元数据后逐图像、逐块、逐通道解码,
//! 反量化、反 DCT、(可选) 加回预测, 再把块内界内像素连同均值平移
//! 推给像素汇.

use std::io::Read;

use log::debug;

use lfif_core::bitstream::IBitstream;
use lfif_core::{geometry, runlength, Dct, LfifError, LfifResult, RunLengthPair};

use crate::cabac::CabacDecoder;
use crate::coefficients::{self, DiagonalContexts};
use crate::container::ContainerMeta;
use crate::huffman;
use crate::predict;
use crate::volume;

/// 从字节流读入容器头部
///
/// 读取位置停在负载起点, 随后交给 [`LfifDecoder::decode`].
pub fn read_header<R: Read>(input: &mut R) -> LfifResult<ContainerMeta> {
    crate::container::read_header(input)
}

/// LFIF 解码器
pub struct LfifDecoder {
    meta: ContainerMeta,
    /// 维度 D
    d: usize,
    /// 块内样本数
    block_size: usize,
    /// 块网格尺寸
    grid: Vec<usize>,
    /// 每图像块数
    blocks_cnt: usize,
    /// 类别位宽
    class_bits: u32,
    /// DCT 上下文
    dct: Dct,
}

fn channel_class(channel: usize) -> usize {
    usize::from(channel != 0)
}

impl LfifDecoder {
    /// 校验元数据并构造解码器
    pub fn new(meta: ContainerMeta) -> LfifResult<Self> {
        let d = meta.block_shape.len();
        if !(2..=4).contains(&d) {
            return Err(LfifError::InvalidDimensions(format!("维度 {}", d)));
        }
        if meta.img_dims.len() != d + 1 || meta.img_dims.iter().any(|&dim| dim == 0) {
            return Err(LfifError::InvalidDimensions(format!("{:?}", meta.img_dims)));
        }
        if meta.use_huffman
            && (meta.traversal_tables.is_none() || meta.huffman_decoders.is_none())
        {
            return Err(LfifError::InvalidData("Huffman 模式缺少码表".into()));
        }

        let block_size = geometry::block_size(&meta.block_shape);
        if meta.quant_tables.iter().any(|t| t.len() != block_size) {
            return Err(LfifError::InvalidData("量化表长度与块形状不符".into()));
        }

        let grid = volume::block_dims(&meta.img_dims[..d], &meta.block_shape);
        let blocks_cnt = grid.iter().product();
        let amp_bits = runlength::amp_bits(block_size, meta.color_depth, d);

        debug!(
            "打开 LFIF 解码器: D={}, 块={:?}, 图像尺寸={:?}, 后端={}",
            d,
            meta.block_shape,
            meta.img_dims,
            if meta.use_huffman { "huffman" } else { "cabac" },
        );

        Ok(Self {
            d,
            block_size,
            grid,
            blocks_cnt,
            class_bits: runlength::class_bits(amp_bits),
            dct: Dct::new(&meta.block_shape),
            meta,
        })
    }

    /// 解码后的块网格尺寸
    pub fn block_dims(&self) -> &[usize] {
        &self.grid
    }

    /// 容器元数据
    pub fn meta(&self) -> &ContainerMeta {
        &self.meta
    }

    /// 解码整个图像体
    ///
    /// `pusher` 以 (D+1) 维索引接收一个样本三元组.
    pub fn decode<R: Read, F: FnMut(&[usize], [f32; 3])>(
        &mut self,
        input: &mut R,
        pusher: F,
    ) -> LfifResult<()> {
        if self.meta.use_huffman {
            self.decode_huffman(input, pusher)
        } else {
            self.decode_cabac(input, pusher)
        }
    }

    fn shifts(&self) -> (f32, f32) {
        if self.meta.use_shift {
            (
                self.meta.shift_param[0] as f32,
                self.meta.shift_param[1] as f32,
            )
        } else {
            (0.0, 0.0)
        }
    }

    /// 把三个通道块的界内像素推给像素汇
    fn push_block<F: FnMut(&[usize], [f32; 3])>(
        &self,
        channel_blocks: &[Vec<f32>; 3],
        image: usize,
        block: usize,
        pusher: &mut F,
    ) {
        let (shift_luma, shift_chroma) = self.shifts();
        let mut block_pos = vec![0usize; self.d];
        geometry::position(&self.grid, block, &mut block_pos);

        let mut full_pos = vec![0usize; self.d + 1];
        full_pos[self.d] = image;
        let mut k = 0usize;
        geometry::for_each_position(&self.meta.block_shape, |pos| {
            let index = k;
            k += 1;
            for i in 0..self.d {
                let g = block_pos[i] * self.meta.block_shape[i] + pos[i];
                if g >= self.meta.img_dims[i] as usize {
                    return;
                }
                full_pos[i] = g;
            }
            pusher(
                &full_pos,
                [
                    channel_blocks[0][index] + shift_luma,
                    channel_blocks[1][index] + shift_chroma,
                    channel_blocks[2][index] + shift_chroma,
                ],
            );
        });
    }

    /// Huffman 后端解码
    fn decode_huffman<R: Read, F: FnMut(&[usize], [f32; 3])>(
        &mut self,
        input: &mut R,
        mut pusher: F,
    ) -> LfifResult<()> {
        let images = self.meta.img_dims[self.d] as usize;
        let size = self.block_size;
        let traversal = self
            .meta
            .traversal_tables
            .as_ref()
            .ok_or_else(|| LfifError::InvalidData("Huffman 模式缺少遍历表".into()))?;
        let decoders = self
            .meta
            .huffman_decoders
            .as_ref()
            .ok_or_else(|| LfifError::InvalidData("Huffman 模式缺少码表".into()))?;

        let mut bitstream = IBitstream::new(input);
        let mut previous_dc = [0i64; 3];

        let mut scanned = vec![0i64; size];
        let mut quantized_block = vec![0i64; size];
        let mut dct_block = vec![0.0f32; size];
        let mut channel_blocks = [
            vec![0.0f32; size],
            vec![0.0f32; size],
            vec![0.0f32; size],
        ];

        for image in 0..images {
            for block in 0..self.blocks_cnt {
                for channel in 0..3 {
                    let class = channel_class(channel);

                    // DC 对 + AC 对直到 EOB 或块填满
                    let mut pairs = vec![huffman::decode_pair(
                        &decoders[class][0],
                        self.class_bits,
                        &mut bitstream,
                    )?];
                    let mut filled = 1usize;
                    while filled < size {
                        let pair: RunLengthPair = huffman::decode_pair(
                            &decoders[class][1],
                            self.class_bits,
                            &mut bitstream,
                        )?;
                        let is_eob = pair.is_eob();
                        if !is_eob {
                            filled += pair.zeroes as usize + 1;
                        }
                        pairs.push(pair);
                        if is_eob {
                            break;
                        }
                    }

                    runlength::decode_block(&pairs, &mut scanned)?;
                    traversal[class].detraverse(&scanned, &mut quantized_block);
                    runlength::diff_decode_dc(
                        &mut quantized_block[0],
                        &mut previous_dc[channel],
                    );
                    self.meta.quant_tables[class].dequantize(&quantized_block, &mut dct_block);
                    self.dct.inverse(&dct_block, &mut channel_blocks[channel]);
                }

                self.push_block(&channel_blocks, image, block, &mut pusher);
            }
        }

        Ok(())
    }

    /// CABAC 后端解码
    fn decode_cabac<R: Read, F: FnMut(&[usize], [f32; 3])>(
        &mut self,
        input: &mut R,
        mut pusher: F,
    ) -> LfifResult<()> {
        let images = self.meta.img_dims[self.d] as usize;
        let size = self.block_size;
        let shape = &self.meta.block_shape;
        let num_diagonals = geometry::num_diagonals(shape);
        let threshold = num_diagonals / 2;
        let scan = geometry::diagonal_scan(shape);
        let num_types = predict::num_prediction_types(self.d);
        let use_prediction = self.meta.use_prediction;

        let mut contexts = [
            DiagonalContexts::new(num_diagonals, threshold),
            DiagonalContexts::new(num_diagonals, threshold),
        ];

        let aligned_dims: Vec<u64> = self
            .grid
            .iter()
            .zip(shape.iter())
            .map(|(&g, &s)| (g * s) as u64)
            .collect();
        let aligned_total: u64 = aligned_dims.iter().product();
        let mut reconstructed: [Vec<f32>; 3] = if use_prediction {
            [
                vec![0.0f32; aligned_total as usize],
                vec![0.0f32; aligned_total as usize],
                vec![0.0f32; aligned_total as usize],
            ]
        } else {
            [Vec::new(), Vec::new(), Vec::new()]
        };

        let mut bitstream = IBitstream::new(input);
        let mut cabac = CabacDecoder::new(&mut bitstream)?;

        let mut prediction = vec![0.0f32; size];
        let mut quantized_block = vec![0i64; size];
        let mut dct_block = vec![0.0f32; size];
        let mut channel_blocks = [
            vec![0.0f32; size],
            vec![0.0f32; size],
            vec![0.0f32; size],
        ];

        for image in 0..images {
            contexts[0].reset();
            contexts[1].reset();
            if use_prediction {
                for plane in reconstructed.iter_mut() {
                    plane.fill(0.0);
                }
            }

            for block in 0..self.blocks_cnt {
                let mut prediction_type = 0u64;
                if use_prediction {
                    prediction_type = coefficients::decode_prediction_type(
                        &mut cabac,
                        &mut bitstream,
                        &mut contexts[0],
                        num_types,
                    )?;
                }

                for channel in 0..3 {
                    let class = channel_class(channel);
                    coefficients::decode_block(
                        &mut cabac,
                        &mut bitstream,
                        &mut contexts[class],
                        &scan,
                        threshold,
                        &mut quantized_block,
                    )?;
                    self.meta.quant_tables[class].dequantize(&quantized_block, &mut dct_block);
                    self.dct.inverse(&dct_block, &mut channel_blocks[channel]);

                    if use_prediction {
                        predict::predict_block(
                            &mut prediction,
                            shape,
                            &self.grid,
                            &self.meta.img_dims[..self.d],
                            &reconstructed[channel],
                            block,
                            prediction_type,
                        );
                        for i in 0..size {
                            channel_blocks[channel][i] += prediction[i];
                        }
                        volume::put_block(
                            &channel_blocks[channel],
                            &aligned_dims,
                            shape,
                            &self.grid,
                            block,
                            &mut reconstructed[channel],
                        );
                    }
                }

                self.push_block(&channel_blocks, image, block, &mut pusher);
            }
        }

        if !cabac.decode_terminate(&mut bitstream)? {
            return Err(LfifError::InvalidData("码流未以终结符结束".into()));
        }
        Ok(())
    }
}
