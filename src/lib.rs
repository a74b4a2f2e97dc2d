//! # LFIF
//!
//! 光场图像 (plenoptic imagery) 压缩编解码框架, 纯 Rust 实现.
//!
//! LFIF 把一组相关的二维视图视作单个 N 维体 (N ∈ {2,3,4}), 用 JPEG 的
//! N 维推广压缩: DCT、量化、Z 字遍历、游程编码与熵编码全部从二维块
//! 扩展到 D 维超立方体, 借助视角轴上的相关性获得增益.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use lfif::codec::encoder::{EncoderConfig, LfifEncoder};
//!
//! let cfg = EncoderConfig {
//!     block_shape: vec![8, 8, 8],
//!     img_dims: vec![512, 384, 8, 8],
//!     quality: 75,
//!     color_depth: 8,
//!     use_huffman: false,
//!     use_prediction: true,
//!     use_shift: true,
//! };
//! let mut encoder = LfifEncoder::new(cfg).unwrap();
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `lfif-core` | 位流、块几何、DCT、量化、遍历、游程编码 |
//! | `lfif-codec` | Huffman/CABAC 熵编码、帧内预测、容器与驱动 |

/// 核心基础设施 (位流、几何、变换、量化)
pub use lfif_core as core;

/// 编解码器 (熵编码后端、预测、容器、驱动)
pub use lfif_codec as codec;

/// 获取 LFIF 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
