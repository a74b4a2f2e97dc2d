//! # lfif-core
//!
//! LFIF 编解码核心库, 提供位流读写、N 维块几何、DCT 变换、
//! 量化表、遍历表与游程编码等基础设施.
//!
//! 本 crate 不依赖熵编码后端, 为 `lfif-codec` 提供底层构件.

pub mod bitstream;
pub mod dct;
pub mod error;
pub mod geometry;
pub mod quant;
pub mod runlength;
pub mod traversal;

// 重导出常用类型
pub use bitstream::{IBitstream, OBitstream};
pub use dct::Dct;
pub use error::{LfifError, LfifResult};
pub use quant::QuantTable;
pub use runlength::RunLengthPair;
pub use traversal::TraversalTable;
