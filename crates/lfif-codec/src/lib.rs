//! # lfif-codec
//!
//! LFIF 光场图像编解码器: 把一组相关的二维视图视作 N 维体
//! (N ∈ {2,3,4}), 用 JPEG 的 N 维推广进行有损压缩. 块级 N 维 DCT、
//! 量化、参考块驱动的系数遍历与游程编码之上提供两个熵编码后端:
//! 规范 Huffman 与带上下文建模的对角扫描二值算术编码 (CABAC),
//! 后者可叠加 D 维方向性帧内预测.
//!
//! ## 使用示例
//!
//! ```rust
//! use lfif_codec::encoder::{EncoderConfig, LfifEncoder};
//! use lfif_codec::decoder::{read_header, LfifDecoder};
//!
//! // 16x16 单幅灰度渐变, 8 位
//! let cfg = EncoderConfig {
//!     block_shape: vec![8, 8],
//!     img_dims: vec![16, 16, 1],
//!     quality: 80,
//!     color_depth: 8,
//!     use_huffman: true,
//!     use_prediction: false,
//!     use_shift: true,
//! };
//! let mut encoder = LfifEncoder::new(cfg).unwrap();
//! let bytes = encoder
//!     .encode(|pos| [(pos[0] + pos[1]) as f32, 0.0, 0.0])
//!     .unwrap();
//!
//! let mut reader = &bytes[..];
//! let meta = read_header(&mut reader).unwrap();
//! let mut decoder = LfifDecoder::new(meta).unwrap();
//! decoder.decode(&mut reader, |_pos, _triplet| {}).unwrap();
//! ```

pub mod cabac;
pub mod coefficients;
pub mod container;
pub mod decoder;
pub mod encoder;
pub mod huffman;
pub mod predict;
pub mod volume;

// 重导出常用类型
pub use cabac::{CabacDecoder, CabacEncoder, ContextModel};
pub use container::ContainerMeta;
pub use decoder::{read_header, LfifDecoder};
pub use encoder::{EncoderConfig, LfifEncoder};
pub use huffman::{HuffmanDecoder, HuffmanTable, HuffmanWeights};
